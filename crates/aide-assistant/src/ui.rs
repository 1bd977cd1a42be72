//! Terminal presentation for the assistant reply frame.

use std::io::{self, Write};

const CYAN: &str = "\x1b[36m";
const GREY: &str = "\x1b[38;5;250m";
const RESET: &str = "\x1b[0m";

const FRAME_TOP: &str = "┌── AIDE ───────────────────────────────────────────";
const FRAME_BOTTOM: &str = "└───────────────────────────────────────────────────";

/// Print the reply frame header and switch to the body color. Streamed
/// tokens are printed between this and [`end_assistant`].
pub fn begin_assistant() {
    println!("\n{CYAN}{FRAME_TOP}{RESET}");
    print!("{GREY}");
    let _ = io::stdout().flush();
}

pub fn end_assistant() {
    println!("{RESET}");
    println!("{CYAN}{FRAME_BOTTOM}{RESET}\n");
}

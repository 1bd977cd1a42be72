mod llm;
mod prompt;
mod route;
mod session;
mod tools;
mod ui;

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use aide_api::Memory;
use anyhow::Result;
use clap::Parser;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use crate::llm::LlmClient;
use crate::prompt::{build_final_prompt, SYSTEM_PROMPT};
use crate::route::{parse_route, wants_files, wants_papers, wants_wiki, ToolRoute};
use crate::session::{ChatMessage, SessionLog};
use crate::tools::ToolClient;

#[derive(Debug, Parser)]
#[command(name = "aide")]
#[command(about = "Personal assistant CLI with durable conversational memory")]
struct Cli {
    /// Prompt text (or a tool prefix: wiki/papers/files/tools <query>).
    text: Vec<String>,

    /// Max results requested per retrieval tool.
    #[arg(long, default_value_t = 2)]
    max_results: usize,

    /// Print evidence blocks before the answer.
    #[arg(long)]
    show_evidence: bool,

    /// Disable keyword auto-detection of tools in chat mode.
    #[arg(long)]
    no_auto_tools: bool,

    /// Interactive chat (REPL).
    #[arg(long)]
    chat: bool,

    /// Persist chat history to a session transcript file.
    #[arg(long)]
    persist: bool,

    /// Session name for --persist.
    #[arg(long, default_value = "default")]
    session: String,

    /// Clear the session transcript and exit.
    #[arg(long)]
    clear: bool,

    /// Enable the SQLite long-term memory.
    #[arg(long)]
    mem: bool,

    /// Memory database path (default: ~/.aide/memory.db).
    #[arg(long, env = "AIDE_MEM_DB")]
    mem_db: Option<PathBuf>,

    /// Memory user namespace.
    #[arg(long, env = "AIDE_USER", default_value = "JD")]
    user: String,

    /// How many memory records to inject into each prompt.
    #[arg(long, env = "AIDE_MEM_INJECT", default_value_t = 20)]
    inject: usize,

    /// Only inject explicitly remembered items, not chat transcript.
    #[arg(long)]
    remembered_only: bool,

    /// Generation backend base URL (Ollama-compatible).
    #[arg(long, env = "AIDE_LLM_BASE", default_value = "http://127.0.0.1:11434")]
    llm_base: String,

    /// Model name passed to the generation backend.
    #[arg(long, env = "AIDE_MODEL", default_value = "llama3.1:8b")]
    model: String,

    /// Offline encyclopedia proxy base URL.
    #[arg(long, env = "AIDE_WIKI_BASE", default_value = "http://127.0.0.1:8092")]
    wiki_base: String,

    /// Paper-search proxy URL.
    #[arg(long, env = "AIDE_PAPERS_URL", default_value = "http://127.0.0.1:8093/search/")]
    papers_url: String,

    /// File-corpus search URL.
    #[arg(long, env = "AIDE_FILES_URL", default_value = "http://127.0.0.1:8000/search/")]
    files_url: String,

    /// HTTP timeout in seconds for tool calls.
    #[arg(long, env = "AIDE_HTTP_TIMEOUT", default_value_t = 6.0)]
    http_timeout: f64,
}

struct Assistant {
    llm: LlmClient,
    tools: ToolClient,
    memory: Option<Memory>,
    user: String,
    inject: usize,
    remembered_only: bool,
    max_results: usize,
    show_evidence: bool,
    auto_tools: bool,
}

impl Assistant {
    /// Answer one query: build the memory block, gather tool evidence,
    /// assemble the final prompt, and stream the generation to the terminal.
    fn run_one(&self, raw_query: &str, history: &[ChatMessage]) -> Result<String> {
        let (tool_route, query) = parse_route(raw_query);
        let memory_block = self.memory_block();

        let mut evidence = Vec::new();
        if matches!(tool_route, ToolRoute::Wiki | ToolRoute::All) {
            evidence.push(self.tools.wiki_search(&query, self.max_results));
        }
        if matches!(tool_route, ToolRoute::Papers | ToolRoute::All) {
            evidence.push(self.tools.paper_search(&query, self.max_results));
        }
        if matches!(tool_route, ToolRoute::Files | ToolRoute::All) {
            evidence.push(self.tools.file_search(&query, self.max_results));
        }
        if tool_route == ToolRoute::Chat && self.auto_tools {
            let capped = self.max_results.min(2);
            if wants_papers(&query) {
                evidence.push(self.tools.paper_search(&query, capped));
            }
            if wants_files(&query) {
                evidence.push(self.tools.file_search(&query, capped));
            }
            if wants_wiki(&query) {
                evidence.push(self.tools.wiki_search(&query, capped));
            }
        }

        if self.show_evidence && !evidence.is_empty() {
            println!("{}", evidence.join("\n"));
            println!("\n{}\n", "=".repeat(60));
        }

        let final_prompt = build_final_prompt(&query, &evidence, history, &memory_block);

        ui::begin_assistant();
        let result = self.llm.generate(&final_prompt, SYSTEM_PROMPT, |chunk| {
            print!("{chunk}");
            let _ = std::io::stdout().flush();
        });
        ui::end_assistant();

        Ok(result?)
    }

    /// Render the injection block for this request. Memory faults degrade to
    /// an empty block with a warning so the conversation keeps going.
    fn memory_block(&self) -> String {
        let Some(memory) = self.memory.as_ref() else {
            return String::new();
        };
        match memory.memory_block(&self.user, self.inject, !self.remembered_only, true) {
            Ok(block) => block,
            Err(err) => {
                tracing::warn!("could not build memory block: {err}");
                String::new()
            }
        }
    }

    /// Record one conversational turn. Store failures are reported but
    /// never abort the conversation.
    fn store_turn(&self, role: &str, content: &str) {
        let Some(memory) = self.memory.as_ref() else {
            return;
        };
        if let Err(err) = memory.store(&self.user, role, content, "chat") {
            eprintln!("WARNING: could not store {role} message to memory: {err}");
        }
    }
}

fn default_mem_db() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".aide").join("memory.db")
}

fn default_sessions_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".aide").join("sessions")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let sessions = SessionLog::new(default_sessions_dir());

    if cli.clear {
        sessions.clear(&cli.session)?;
        println!("Cleared session: {}", cli.session);
        return Ok(());
    }

    let timeout = Duration::from_secs_f64(cli.http_timeout.clamp(0.1, 600.0));
    let assistant = Assistant {
        llm: LlmClient::new(&cli.llm_base, &cli.model, timeout),
        tools: ToolClient::new(&cli.wiki_base, &cli.papers_url, &cli.files_url, timeout),
        memory: cli.mem.then(|| {
            Memory::new(cli.mem_db.clone().unwrap_or_else(default_mem_db))
        }),
        user: cli.user.clone(),
        inject: cli.inject,
        remembered_only: cli.remembered_only,
        max_results: cli.max_results,
        show_evidence: cli.show_evidence,
        auto_tools: !cli.no_auto_tools,
    };

    if cli.chat {
        return repl(&assistant, &cli, &sessions);
    }

    let raw = cli.text.join(" ").trim().to_string();
    if raw.is_empty() {
        println!(
            "Usage: aide <question> | aide wiki <q> | aide papers <q> | aide files <q> | aide --chat"
        );
        std::process::exit(1);
    }

    let history = if cli.persist { sessions.load(&cli.session) } else { Vec::new() };
    assistant.store_turn("user", &raw);
    let answer = assistant.run_one(&raw, &history)?;
    assistant.store_turn("assistant", &answer);
    Ok(())
}

fn repl(assistant: &Assistant, cli: &Cli, sessions: &SessionLog) -> Result<()> {
    let mut editor = rustyline::DefaultEditor::new()?;
    let mut history: Vec<ChatMessage> =
        if cli.persist { sessions.load(&cli.session) } else { Vec::new() };

    println!(
        "aide chat. Prefixes: wiki: / papers: / files: / tools:.  \
         Type 'exit' to quit.  Type ':clear' to clear.\n\
         Memory commands: 'remember this: ...' | 'forget that: ...' | ':mem' | ':memsearch <q>' | ':forget <id>'"
    );

    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(err) => return Err(err.into()),
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(input);
        let lowered = input.to_lowercase();

        if lowered == "exit" || lowered == "quit" {
            break;
        }

        if input == ":clear" || input == "clear" {
            if cli.persist {
                sessions.clear(&cli.session)?;
                println!("Cleared session: {}", cli.session);
            } else {
                println!("Cleared in-memory history.");
            }
            history = Vec::new();
            continue;
        }

        if handle_memory_command(assistant, input, &lowered) {
            continue;
        }

        let user_message = ChatMessage { role: "user".to_string(), content: input.to_string() };
        if cli.persist {
            sessions.append(&cli.session, &user_message)?;
            history = sessions.load(&cli.session);
        } else {
            history.push(user_message);
        }
        assistant.store_turn("user", input);

        let answer = match assistant.run_one(input, &history) {
            Ok(answer) => answer,
            Err(err) => {
                eprintln!("ERROR: {err:#}");
                continue;
            }
        };

        let assistant_message =
            ChatMessage { role: "assistant".to_string(), content: answer.clone() };
        if cli.persist {
            sessions.append(&cli.session, &assistant_message)?;
            history = sessions.load(&cli.session);
        } else {
            history.push(assistant_message);
        }
        assistant.store_turn("assistant", &answer);
    }

    Ok(())
}

/// Handle the REPL's memory commands. Returns true when the input was a
/// command (handled or refused), false when it is an ordinary query.
fn handle_memory_command(assistant: &Assistant, input: &str, lowered: &str) -> bool {
    const DISABLED: &str = "Memory is disabled. Start with: aide --chat --mem";

    if lowered.starts_with("remember this:") {
        let content = input.split_once(':').map(|(_, rest)| rest.trim()).unwrap_or("");
        match assistant.memory.as_ref() {
            None => println!("{DISABLED}"),
            Some(memory) if !content.is_empty() => match memory.remember(&assistant.user, content)
            {
                Ok(_) => println!("remembered."),
                Err(err) => eprintln!("ERROR remembering: {err}"),
            },
            Some(_) => {}
        }
        return true;
    }

    if lowered.starts_with("forget that:") {
        let keyword = input.split_once(':').map(|(_, rest)| rest.trim()).unwrap_or("");
        match assistant.memory.as_ref() {
            None => println!("{DISABLED}"),
            Some(memory) if !keyword.is_empty() => {
                match memory.forget_keyword(&assistant.user, keyword) {
                    Ok(count) => println!("forgot {count} item(s) matching: {keyword}"),
                    Err(err) => eprintln!("ERROR forgetting: {err}"),
                }
            }
            Some(_) => {}
        }
        return true;
    }

    if lowered == ":mem" {
        match assistant.memory.as_ref() {
            None => println!("{DISABLED}"),
            Some(memory) => match memory.recent(&assistant.user, assistant.inject, false, None) {
                Ok(rows) if rows.is_empty() => println!("(no memory)"),
                Ok(rows) => {
                    for row in rows.iter().rev() {
                        println!("[{}] {}/{}: {}", row.id, row.role, row.kind, row.content);
                    }
                }
                Err(err) => eprintln!("ERROR: {err}"),
            },
        }
        return true;
    }

    if lowered.starts_with(":memsearch ") {
        let query = input.split_once(' ').map(|(_, rest)| rest.trim()).unwrap_or("");
        match assistant.memory.as_ref() {
            None => println!("{DISABLED}"),
            Some(memory) => match memory.search(&assistant.user, query, 20, false, None) {
                Ok(rows) if rows.is_empty() => println!("(no matches)"),
                Ok(rows) => {
                    for row in rows.iter().rev() {
                        println!("[{}] {}/{}: {}", row.id, row.role, row.kind, row.content);
                    }
                }
                Err(err) => eprintln!("ERROR: {err}"),
            },
        }
        return true;
    }

    if let Some(raw_id) = lowered.strip_prefix(":forget ") {
        match assistant.memory.as_ref() {
            None => println!("{DISABLED}"),
            Some(memory) => match raw_id.trim().parse::<i64>() {
                Ok(id) => match memory.forget_id(&assistant.user, id) {
                    Ok(count) => println!("forgot {count} row(s) with id={id}"),
                    Err(err) => eprintln!("ERROR: {err}"),
                },
                Err(err) => eprintln!("ERROR: invalid id: {err}"),
            },
        }
        return true;
    }

    false
}

//! Flat-file session transcripts (one JSON message per line).

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

pub struct SessionLog {
    dir: PathBuf,
}

impl SessionLog {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.jsonl"))
    }

    /// Load a session transcript. A missing file is an empty session and
    /// unparsable lines are skipped, so a corrupted transcript degrades
    /// instead of wedging the REPL.
    #[must_use]
    pub fn load(&self, name: &str) -> Vec<ChatMessage> {
        let Ok(file) = fs::File::open(self.path(name)) else {
            return Vec::new();
        };

        BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .filter_map(|line| {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    return None;
                }
                serde_json::from_str::<ChatMessage>(trimmed).ok()
            })
            .collect()
    }

    /// Append one message to the transcript, creating the session directory
    /// on first use.
    ///
    /// # Errors
    /// Returns an error when the directory or file cannot be written.
    pub fn append(&self, name: &str, message: &ChatMessage) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut file =
            OpenOptions::new().create(true).append(true).open(self.path(name))?;
        let line = serde_json::to_string(message)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Remove the transcript file, when present.
    ///
    /// # Errors
    /// Returns an error when an existing file cannot be removed.
    pub fn clear(&self, name: &str) -> io::Result<()> {
        let path = self.path(name);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    fn temp_log(prefix: &str) -> SessionLog {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
            .as_nanos();
        SessionLog::new(std::env::temp_dir().join(format!("{prefix}-{now}")))
    }

    #[test]
    fn append_then_load_round_trips_in_order() -> io::Result<()> {
        let log = temp_log("aide-session");
        log.append("default", &ChatMessage { role: "user".into(), content: "hi".into() })?;
        log.append("default", &ChatMessage { role: "assistant".into(), content: "hello".into() })?;

        let messages = log.load("default");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].content, "hello");

        log.clear("default")?;
        assert!(log.load("default").is_empty());
        let _ = fs::remove_dir_all(&log.dir);
        Ok(())
    }

    #[test]
    fn load_skips_corrupted_lines_and_missing_files() -> io::Result<()> {
        let log = temp_log("aide-session-corrupt");
        assert!(log.load("nope").is_empty());

        fs::create_dir_all(&log.dir)?;
        fs::write(
            log.path("broken"),
            "{\"role\":\"user\",\"content\":\"kept\"}\nnot json\n\n",
        )?;
        let messages = log.load("broken");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "kept");

        let _ = fs::remove_dir_all(&log.dir);
        Ok(())
    }
}

//! Retrieval tool callers and evidence normalization.
//!
//! Every tool call renders to a short textual evidence block, including on
//! failure, so the caller can always concatenate whatever came back.

use std::time::Duration;

use serde_json::Value;

const MAX_EVIDENCE_ITEMS: usize = 5;
const SNIPPET_CHAR_CAP: usize = 900;
const PREVIEW_CHAR_CAP: usize = 1_200;
const ERROR_CHAR_CAP: usize = 2_000;

pub struct ToolClient {
    agent: ureq::Agent,
    wiki_base: String,
    papers_url: String,
    files_url: String,
}

impl ToolClient {
    #[must_use]
    pub fn new(wiki_base: &str, papers_url: &str, files_url: &str, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            wiki_base: wiki_base.trim_end_matches('/').to_string(),
            papers_url: papers_url.to_string(),
            files_url: files_url.to_string(),
        }
    }

    /// Query the offline encyclopedia mirror.
    #[must_use]
    pub fn wiki_search(&self, query: &str, max_results: usize) -> String {
        let url = format!("{}/search", self.wiki_base);
        let call = self
            .agent
            .get(&url)
            .query("q", query)
            .query("max_results", &max_results.to_string())
            .call();
        Self::render_response("wiki", call)
    }

    /// Query the paper-search proxy.
    #[must_use]
    pub fn paper_search(&self, query: &str, max_results: usize) -> String {
        self.post_search("papers", &self.papers_url, query, max_results)
    }

    /// Query the full-text file-corpus search.
    #[must_use]
    pub fn file_search(&self, query: &str, max_results: usize) -> String {
        self.post_search("files", &self.files_url, query, max_results)
    }

    fn post_search(&self, tool: &str, url: &str, query: &str, max_results: usize) -> String {
        let call = self
            .agent
            .post(url)
            .send_json(serde_json::json!({ "query": query, "max_results": max_results }));
        Self::render_response(tool, call)
    }

    fn render_response(tool: &str, call: Result<ureq::Response, ureq::Error>) -> String {
        match call {
            Ok(response) => match response.into_string() {
                Ok(body) => normalize_results(tool, &body),
                Err(err) => format!("[{tool}] ERROR reading response: {err}"),
            },
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                format!("[{tool}] ERROR {code}: {}", truncate_chars(&body, ERROR_CHAR_CAP))
            }
            Err(err) => format!("[{tool}] ERROR: {err}"),
        }
    }
}

/// Normalize a tool response into a numbered evidence block.
///
/// The expected shape is `{"results": [{identifier, content}, ...]}` with a
/// few tolerated aliases for both fields; anything else falls back to a raw
/// preview so evidence is never silently dropped.
#[must_use]
pub fn normalize_results(tool: &str, raw: &str) -> String {
    let Ok(data) = serde_json::from_str::<Value>(raw) else {
        return format!("[{tool}] Non-JSON response:\n{}", truncate_chars(raw, ERROR_CHAR_CAP));
    };

    let Some(results) = data.get("results") else {
        let preview = truncate_chars(&data.to_string(), PREVIEW_CHAR_CAP);
        return format!("[{tool}] JSON (no 'results' key):\n{preview}");
    };

    let items = match results.as_array() {
        Some(items) if !items.is_empty() => items,
        _ => return format!("[{tool}] No results."),
    };

    let mut lines = vec![format!("[{tool}] Top results:")];
    for (index, item) in items.iter().take(MAX_EVIDENCE_ITEMS).enumerate() {
        let (identifier, snippet) = match item {
            Value::Object(fields) => {
                let identifier = ["identifier", "file_path", "file", "id", "title"]
                    .iter()
                    .find_map(|key| fields.get(*key).and_then(Value::as_str))
                    .unwrap_or("unknown");
                let content = ["content", "text", "snippet"]
                    .iter()
                    .find_map(|key| fields.get(*key).and_then(Value::as_str))
                    .unwrap_or("");
                (identifier.to_string(), content.trim().replace('\r', ""))
            }
            other => ("result".to_string(), other.to_string().trim().replace('\r', "")),
        };

        let snippet = truncate_chars(&snippet, SNIPPET_CHAR_CAP);
        lines.push(format!("{}. {identifier}\n{snippet}", index + 1));
    }

    lines.join("\n")
}

fn truncate_chars(text: &str, cap: usize) -> String {
    if text.chars().count() <= cap {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(cap).collect();
    clipped.push('…');
    clipped
}

//! Query routing: explicit tool prefixes plus keyword auto-detection.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolRoute {
    Chat,
    Wiki,
    Papers,
    Files,
    All,
}

/// Split an input into a tool route and the remaining query. Accepts both
/// the head-word form (`wiki moons of jupiter`) and the colon form
/// (`wiki: moons of jupiter`); anything unrecognized is plain chat.
#[must_use]
pub fn parse_route(input: &str) -> (ToolRoute, String) {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return (ToolRoute::Chat, String::new());
    }

    let (head, tail) = match trimmed.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, tail.trim()),
        None => (trimmed, ""),
    };
    let head = head.trim_end_matches(':').to_ascii_lowercase();

    let route = match head.as_str() {
        "wiki" | "wikipedia" | "encyclopedia" => ToolRoute::Wiki,
        "papers" | "paper" | "arxiv" => ToolRoute::Papers,
        "files" | "corpus" => ToolRoute::Files,
        "tools" | "all" => ToolRoute::All,
        _ => return (ToolRoute::Chat, trimmed.to_string()),
    };

    (route, tail.to_string())
}

#[must_use]
pub fn wants_papers(query: &str) -> bool {
    contains_any(query, &["paper", "arxiv", "preprint", "doi", "published", "research", "study"])
}

#[must_use]
pub fn wants_files(query: &str) -> bool {
    contains_any(query, &["my files", "my notes", "corpus", "local docs"])
}

#[must_use]
pub fn wants_wiki(query: &str) -> bool {
    contains_any(query, &["who is", "what is", "history", "definition", "wikipedia", "wiki"])
}

fn contains_any(query: &str, needles: &[&str]) -> bool {
    let lowered = query.to_lowercase();
    needles.iter().any(|needle| lowered.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_head_word_and_colon_prefixes() {
        assert_eq!(parse_route("wiki moons of jupiter"), (ToolRoute::Wiki, "moons of jupiter".to_string()));
        assert_eq!(parse_route("wiki: moons of jupiter"), (ToolRoute::Wiki, "moons of jupiter".to_string()));
        assert_eq!(parse_route("papers: attention"), (ToolRoute::Papers, "attention".to_string()));
        assert_eq!(parse_route("files release checklist"), (ToolRoute::Files, "release checklist".to_string()));
        assert_eq!(parse_route("tools everything"), (ToolRoute::All, "everything".to_string()));
    }

    #[test]
    fn unprefixed_input_is_chat_with_the_text_intact() {
        assert_eq!(
            parse_route("how do I tune WAL checkpoints?"),
            (ToolRoute::Chat, "how do I tune WAL checkpoints?".to_string())
        );
        assert_eq!(parse_route("   "), (ToolRoute::Chat, String::new()));
    }

    #[test]
    fn auto_detection_matches_keywords_case_insensitively() {
        assert!(wants_papers("any Preprint on speculative decoding?"));
        assert!(wants_wiki("What is a lock-free queue"));
        assert!(wants_files("search my notes for the deploy runbook"));
        assert!(!wants_papers("hello there"));
    }
}

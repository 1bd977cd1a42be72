//! Prompt assembly: system prompt, memory framing, and the final prompt
//! layout sent to the generation backend.

use crate::session::ChatMessage;

pub const SYSTEM_PROMPT: &str = "You are Aide, an offline personal technical assistant with a single user.

You have access to a persistent long-term memory of prior conversations and
explicitly remembered facts, injected below when available. Use it for
continuity and personalization, and say when a recollection is vague rather
than presenting it with certainty.

Rules:
- Prefer accuracy over creativity for technical and factual questions.
- Use tool evidence when it is provided; never invent tool output, and only
  cite a source that appears in this session's evidence.
- If a question needs external facts and the evidence is insufficient, say
  so plainly instead of guessing.
- When you answer from your own knowledge or reasoning, label it as such.
- Keep shell commands copy/paste-ready.
- Long-term memory may be outdated; if it conflicts with the current input,
  ask for clarification.
- When you used a tool, include a short Evidence section with what you
  retrieved.";

const MEMORY_HEADER: &str = "Long-term memory (local store). Use this for continuity:";

/// How many trailing conversation turns are replayed into the prompt.
const HISTORY_WINDOW: usize = 12;

/// Frame the injector's record lines with the memory header. Empty in,
/// empty out.
#[must_use]
pub fn frame_memory_block(block: &str) -> String {
    if block.trim().is_empty() {
        return String::new();
    }
    format!("{MEMORY_HEADER}\n{block}")
}

/// Assemble the final prompt from the memory block, replayed history, tool
/// evidence, and the user's question. With no context at all, the prompt
/// collapses to the bare question plus a short instruction footer.
#[must_use]
pub fn build_final_prompt(
    user_query: &str,
    evidence_blocks: &[String],
    history: &[ChatMessage],
    memory_block: &str,
) -> String {
    let evidence_text = evidence_blocks.join("\n\n").trim().to_string();
    let history_text = history
        .iter()
        .rev()
        .take(HISTORY_WINDOW)
        .rev()
        .map(|message| format!("{}: {}", message.role.to_uppercase(), message.content))
        .collect::<Vec<_>>()
        .join("\n");
    let memory_text = frame_memory_block(memory_block);

    if evidence_text.is_empty() && history_text.is_empty() && memory_text.is_empty() {
        return format!(
            "User question:\n{user_query}\n\n\
             Instructions:\n\
             - If you need tools to answer accurately, say so.\n\
             - Otherwise answer normally."
        );
    }

    let mut sections = Vec::new();
    if !memory_text.is_empty() {
        sections.push(memory_text);
    }
    sections.push(format!("Conversation (most recent last):\n{history_text}"));
    sections.push(format!("Evidence (retrieved via tools):\n{evidence_text}"));
    sections.push(format!("User question:\n{user_query}"));
    sections.push(
        "Instructions:\n\
         - Use long-term memory for continuity, without claiming certainty when it is vague.\n\
         - Use the evidence above when relevant.\n\
         - Use the conversation context for continuity.\n\
         - If the question needs external facts and the evidence is insufficient, say so.\n\
         - If you use your own reasoning or knowledge, label it."
            .to_string(),
    );

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(role: &str, content: &str) -> ChatMessage {
        ChatMessage { role: role.to_string(), content: content.to_string() }
    }

    #[test]
    fn bare_question_gets_the_short_form() {
        let prompt = build_final_prompt("hello", &[], &[], "");
        assert!(prompt.starts_with("User question:\nhello"));
        assert!(!prompt.contains("Evidence"));
        assert!(!prompt.contains(MEMORY_HEADER));
    }

    #[test]
    fn full_prompt_orders_memory_history_evidence_question() {
        let evidence = vec!["[wiki] Top results:\n1. articles/moon\nThe moon.".to_string()];
        let history = vec![message("user", "hi"), message("assistant", "hello")];
        let prompt =
            build_final_prompt("tell me more", &evidence, &history, "- USER (chat): hi");

        let memory_at = prompt.find(MEMORY_HEADER);
        let history_at = prompt.find("Conversation (most recent last):");
        let evidence_at = prompt.find("Evidence (retrieved via tools):");
        let question_at = prompt.find("User question:");
        assert!(memory_at < history_at);
        assert!(history_at < evidence_at);
        assert!(evidence_at < question_at);
        assert!(prompt.contains("USER: hi"));
        assert!(prompt.contains("ASSISTANT: hello"));
    }

    #[test]
    fn history_is_windowed_to_the_most_recent_turns() {
        let history: Vec<ChatMessage> =
            (0..30).map(|i| message("user", &format!("turn {i}"))).collect();
        let prompt = build_final_prompt("q", &[], &history, "");
        assert!(!prompt.contains("turn 17"));
        assert!(prompt.contains("turn 18"));
        assert!(prompt.contains("turn 29"));
    }
}

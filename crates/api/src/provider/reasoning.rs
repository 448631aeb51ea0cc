//! Chain-of-thought extraction for reasoning-capable models
//!
//! Reasoning models are asked (via system prompt) to wrap their thinking in
//! `<think>...</think>` ahead of the final answer. After the stream finishes
//! the block is split out, broken into steps on blank lines, and stored
//! separately from the answer.

/// System prompt prepended for reasoning-capable models
pub const REASONING_SYSTEM_PROMPT: &str = "You are a helpful AI assistant that provides clear, step-by-step reasoning before giving your final answer.\n\
When reasoning:\n\
1. Break down your thinking into clear, numbered steps\n\
2. Each step should build on the previous one\n\
3. Keep your reasoning concise and focused\n\
4. End your reasoning with a clear conclusion\n\
5. Then provide your final answer\n\
\n\
Format your response like this:\n\
<think>\n\
1. First step of reasoning\n\
2. Second step of reasoning\n\
3. Final step of reasoning\n\
</think>\n\
\n\
Your final answer here.";

/// Whether a model name marks the model as reasoning-capable.
/// Case-insensitive substring match against the configured keyword list.
pub fn is_reasoning_model(model_name: &str, keywords: &[String]) -> bool {
    let lower = model_name.to_lowercase();
    keywords.iter().any(|keyword| lower.contains(keyword.as_str()))
}

/// Split a completion into (reasoning, answer).
///
/// Returns `None` for the reasoning when the text carries no `<think>` block
/// or the block is empty. An unterminated block is treated as absent rather
/// than swallowing the whole answer.
pub fn split_reasoning(text: &str) -> (Option<String>, String) {
    let Some(start) = text.find("<think>") else {
        return (None, text.trim().to_string());
    };
    let Some(end) = text[start..].find("</think>").map(|i| start + i) else {
        return (None, text.trim().to_string());
    };

    let reasoning = text[start + "<think>".len()..end].trim();
    let answer = format!(
        "{}{}",
        &text[..start],
        &text[end + "</think>".len()..]
    );
    let answer = answer.trim().to_string();

    if reasoning.is_empty() {
        (None, answer)
    } else {
        (Some(reasoning.to_string()), answer)
    }
}

/// Break reasoning text into ordered steps on blank lines
pub fn split_steps(reasoning: &str) -> Vec<String> {
    reasoning
        .split("\n\n")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords() -> Vec<String> {
        vec![
            "reason".to_string(),
            "thinking".to_string(),
            "deepseek-r1".to_string(),
        ]
    }

    #[test]
    fn test_reasoning_model_detection() {
        let kw = keywords();
        assert!(is_reasoning_model("Reasoning", &kw));
        assert!(is_reasoning_model("deepseek/DeepSeek-R1", &kw));
        assert!(is_reasoning_model("my-thinking-model", &kw));
        assert!(!is_reasoning_model("Fast", &kw));
        assert!(!is_reasoning_model("gpt-4o", &kw));
    }

    #[test]
    fn test_split_reasoning() {
        let (reasoning, answer) =
            split_reasoning("<think>1. Consider X\n\n2. Therefore Y</think>\n\nThe answer is Y.");
        assert_eq!(reasoning.as_deref(), Some("1. Consider X\n\n2. Therefore Y"));
        assert_eq!(answer, "The answer is Y.");
    }

    #[test]
    fn test_no_reasoning_block() {
        let (reasoning, answer) = split_reasoning("Just a plain answer.");
        assert_eq!(reasoning, None);
        assert_eq!(answer, "Just a plain answer.");
    }

    #[test]
    fn test_unterminated_block_left_alone() {
        let (reasoning, answer) = split_reasoning("<think>never closed... the answer");
        assert_eq!(reasoning, None);
        assert_eq!(answer, "<think>never closed... the answer");
    }

    #[test]
    fn test_empty_block() {
        let (reasoning, answer) = split_reasoning("<think>  </think>Answer.");
        assert_eq!(reasoning, None);
        assert_eq!(answer, "Answer.");
    }

    #[test]
    fn test_split_steps_round_trip() {
        let steps = split_steps("s1\n\ns2\n\ns3");
        assert_eq!(steps, vec!["s1", "s2", "s3"]);
        // Joining back with blank lines reproduces the stored form
        assert_eq!(steps.join("\n\n"), "s1\n\ns2\n\ns3");
    }

    #[test]
    fn test_split_steps_skips_blank_runs() {
        let steps = split_steps("s1\n\n\n\n  \n\ns2");
        assert_eq!(steps, vec!["s1", "s2"]);
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub fn truncate_string(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut truncated = String::new();
    for ch in text.chars() {
        if truncated.len() + ch.len_utf8() > max_bytes {
            break;
        }
        truncated.push(ch);
    }
    truncated
}

/// Strip markdown code fences around a JSON payload, if any.
pub fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let start = start + 7;
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let start = start + 3;
        // Skip language identifier if present
        let start = text[start..]
            .find('\n')
            .map(|i| start + i + 1)
            .unwrap_or(start);
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    text
}

/// Cooperative cancellation flag shared between the driver and a stage.
///
/// Stages poll it between discrete units of work (files, attempts,
/// candidates) and stop before starting the next unit.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_plain() {
        let text = r#"{"candidates": []}"#;
        assert_eq!(extract_json(text), r#"{"candidates": []}"#);
    }

    #[test]
    fn extract_json_with_fences() {
        let text = "Here you go:\n```json\n{\"candidates\": []}\n```\n";
        assert_eq!(extract_json(text), r#"{"candidates": []}"#);

        let plain = "```\n{\"candidates\": []}\n```";
        assert_eq!(extract_json(plain), r#"{"candidates": []}"#);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_string("héllo", 2), "h");
        assert_eq!(truncate_string("short", 10), "short");
    }

    #[test]
    fn cancellation_is_shared_between_clones() {
        let cancel = Cancellation::new();
        let observer = cancel.clone();
        assert!(!observer.is_cancelled());
        cancel.cancel();
        assert!(observer.is_cancelled());
    }
}

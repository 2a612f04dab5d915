//! Incremental JSON object extraction
//!
//! Bracket-matching scanner used in two places: splitting a provider's
//! streamed NDJSON body into complete objects, and pulling the first
//! balanced `{...}` span out of chatty model output.
//! - Buffer: 1MB maximum
//! - Algorithm: O(n) single pass bracket matching, string-aware

use crate::errors::{AgentError, Result};

/// Maximum buffer size (1MB)
pub const MAX_BUFFER_SIZE: usize = 1_048_576;

/// Incremental JSON parser
#[derive(Debug)]
pub struct JsonParser {
    /// Accumulation buffer
    buffer: Vec<u8>,

    /// Maximum buffer size
    max_buffer_size: usize,
}

impl JsonParser {
    /// Create new JSON parser with default settings
    pub fn new() -> Self {
        Self::with_capacity(MAX_BUFFER_SIZE)
    }

    /// Create parser with custom buffer capacity
    pub fn with_capacity(max_buffer_size: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            max_buffer_size,
        }
    }

    /// Add bytes to parser and attempt to extract one complete JSON object
    ///
    /// ```text
    /// depth ← 0, start ← None
    /// for each byte bᵢ outside string literals:
    ///   '{' : if depth = 0 { start ← i }; depth ← depth + 1
    ///   '}' : depth ← depth - 1; if depth = 0 return B[start..=i]
    /// ```
    pub fn add_bytes(&mut self, bytes: &[u8]) -> Result<Option<String>> {
        self.feed(bytes)?;
        self.next_object()
    }

    /// Append bytes without extracting anything
    pub fn feed(&mut self, bytes: &[u8]) -> Result<()> {
        if self.buffer.len() + bytes.len() > self.max_buffer_size {
            return Err(AgentError::JsonParseError(format!(
                "Buffer overflow: {} bytes exceeds maximum {}",
                self.buffer.len() + bytes.len(),
                self.max_buffer_size
            )));
        }

        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Extract the next complete object already sitting in the buffer
    pub fn next_object(&mut self) -> Result<Option<String>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match find_complete_object(&self.buffer)? {
            Some((start, end)) => {
                let json_str = String::from_utf8_lossy(&self.buffer[start..=end]).to_string();
                self.buffer.drain(..=end);
                Ok(Some(json_str))
            }
            None => Ok(None),
        }
    }

    /// Get current buffer size
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.iter().all(|b| b.is_ascii_whitespace())
    }
}

impl Default for JsonParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Return the first balanced `{...}` span of `text`, ignoring braces inside
/// string literals. Stray closing braces before the first `{` are skipped.
pub fn first_balanced_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let from = bytes.iter().position(|&b| b == b'{')?;
    match find_complete_object(&bytes[from..]) {
        Ok(Some((start, end))) => text.get(from + start..=from + end),
        _ => None,
    }
}

/// Bracket matching over raw bytes. Multi-byte UTF-8 sequences never
/// collide with the ASCII delimiters, so byte offsets are char boundaries.
fn find_complete_object(buffer: &[u8]) -> Result<Option<(usize, usize)>> {
    let mut depth: i32 = 0;
    let mut start: Option<usize> = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, &byte) in buffer.iter().enumerate() {
        if escape_next {
            escape_next = false;
            continue;
        }

        if byte == b'\\' && in_string {
            escape_next = true;
            continue;
        }

        if byte == b'"' {
            // Quotes only matter once an object has opened
            if start.is_some() {
                in_string = !in_string;
            }
            continue;
        }

        if in_string {
            continue;
        }

        match byte {
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' => {
                if depth == 0 {
                    if start.is_none() {
                        continue;
                    }
                    return Err(AgentError::JsonParseError(
                        "Mismatched braces: too many closing braces".to_string(),
                    ));
                }
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start {
                        return Ok(Some((s, i)));
                    }
                }
            }
            _ => {}
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_json_extraction() {
        let mut parser = JsonParser::new();

        let json = r#"{"message": {"content": "公文"}, "done": false}"#;
        let result = parser.add_bytes(json.as_bytes()).unwrap();

        assert_eq!(result.unwrap(), json);
    }

    #[test]
    fn test_incremental_json_extraction() {
        let mut parser = JsonParser::new();

        parser.add_bytes(br#"{"message":"#).unwrap();
        assert!(parser.add_bytes(br#" {"content": "a"}"#).unwrap().is_none());

        let result = parser.add_bytes(br#", "done": true}"#).unwrap();
        assert!(result.is_some());
    }

    #[test]
    fn test_split_multibyte_character() {
        let mut parser = JsonParser::new();
        let json = r#"{"content": "工務局"}"#.as_bytes();
        let (head, tail) = json.split_at(15);

        assert!(parser.add_bytes(head).unwrap().is_none());
        let result = parser.add_bytes(tail).unwrap().unwrap();
        assert!(result.contains("工務局"));
    }

    #[test]
    fn test_braces_in_strings() {
        let mut parser = JsonParser::new();

        let json = r#"{"message": "This has {braces} inside"}"#;
        let result = parser.add_bytes(json.as_bytes()).unwrap();
        assert_eq!(result.unwrap(), json);
    }

    #[test]
    fn test_escaped_quotes() {
        let mut parser = JsonParser::new();

        let json = r#"{"message": "Quote: \"Hello\""}"#;
        let result = parser.add_bytes(json.as_bytes()).unwrap();
        assert_eq!(result.unwrap(), json);
    }

    #[test]
    fn test_ndjson_lines() {
        let mut parser = JsonParser::new();

        let data = "{\"first\": 1}\n{\"second\": 2}\n";
        let first = parser.add_bytes(data.as_bytes()).unwrap();
        assert_eq!(first.unwrap(), r#"{"first": 1}"#);

        let second = parser.next_object().unwrap();
        assert_eq!(second.unwrap(), r#"{"second": 2}"#);

        assert!(parser.next_object().unwrap().is_none());
        assert!(parser.is_empty());
    }

    #[test]
    fn test_buffer_overflow() {
        let mut parser = JsonParser::with_capacity(100);

        let result = parser.add_bytes(&[b'a'; 150]);
        assert!(matches!(result.unwrap_err(), AgentError::JsonParseError(_)));
    }

    #[test]
    fn test_clear() {
        let mut parser = JsonParser::new();

        parser.add_bytes(b"{\"partial\": ").unwrap();
        assert!(!parser.is_empty());

        parser.clear();
        assert_eq!(parser.buffer_size(), 0);
    }

    #[test]
    fn test_first_balanced_object_in_prose() {
        let text = "Sure! Here is the plan: {\"reasoning\": \"x\", \"tool_calls\": [{\"name\": \"a\"}]} hope it helps }";
        let span = first_balanced_object(text).unwrap();
        assert!(span.starts_with('{'));
        assert!(span.ends_with("]}"));
        assert!(serde_json::from_str::<serde_json::Value>(span).is_ok());
    }

    #[test]
    fn test_first_balanced_object_absent() {
        assert!(first_balanced_object("no json here").is_none());
        assert!(first_balanced_object("{ never closed").is_none());
    }
}

//! Answer sanitizing
//!
//! Removes model "thinking" from synthesized answers:
//! - `<think>...</think>` blocks, including tags split across chunks
//! - meta-commentary lines before the first real line of the answer
//!   ("好的，讓我...", "Let me think", "根據工具結果，我將...")
//!
//! `StreamSanitizer` works chunk by chunk and holds back only what could
//! still turn out to be a tag or a meta line; `sanitize_answer` applies the
//! same rules to a complete string.

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Leading lines starting with these (lowercased, trimmed) are dropped
const META_PREFIXES: &[&str] = &[
    "好的，讓我",
    "好的,讓我",
    "好的，我來",
    "好的，我將",
    "讓我來",
    "讓我先",
    "讓我想",
    "我需要先",
    "根據工具結果，我將",
    "根據工具結果,我將",
    "根據以上工具結果，我將",
    "首先，我需要",
    "let me",
    "okay, let me",
    "ok, let me",
    "alright, let me",
    "i will now",
    "thinking:",
];

fn is_meta_line(line: &str) -> bool {
    let line = line.trim().to_lowercase();
    META_PREFIXES.iter().any(|p| line.starts_with(p))
}

/// Could more text still make `partial` a meta line?
fn could_be_meta(partial: &str) -> bool {
    let partial = partial.trim_start().to_lowercase();
    META_PREFIXES
        .iter()
        .any(|p| p.starts_with(partial.as_str()) || partial.starts_with(p))
}

/// Length of the longest suffix of `text` that is a proper prefix of `tag`
fn partial_tag_len(text: &str, tag: &str) -> usize {
    (1..tag.len())
        .rev()
        .find(|&k| text.ends_with(&tag[..k]))
        .unwrap_or(0)
}

/// Incremental sanitizer for streamed answers
#[derive(Debug, Default)]
pub struct StreamSanitizer {
    /// Unprocessed text that may hold a partial think tag
    pending: String,
    in_think: bool,
    /// Still before the first kept line
    leading_done: bool,
    /// Current leading line, held until it is known not to be meta
    line: String,
}

impl StreamSanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns the text that is safe to emit now
    pub fn push(&mut self, chunk: &str) -> String {
        self.pending.push_str(chunk);
        let visible = self.strip_think();
        self.filter_leading(&visible)
    }

    /// Flush whatever is still held back at end of stream
    pub fn finish(&mut self) -> String {
        let mut rest = String::new();
        if !self.in_think {
            rest = std::mem::take(&mut self.pending);
        }
        self.pending.clear();

        let mut out = self.filter_leading(&rest);
        if !self.leading_done {
            let line = std::mem::take(&mut self.line);
            if !line.trim().is_empty() && !is_meta_line(&line) {
                out.push_str(line.trim_start());
            }
            self.leading_done = true;
        }
        out
    }

    fn strip_think(&mut self) -> String {
        let mut visible = String::new();
        loop {
            if self.in_think {
                match self.pending.find(THINK_CLOSE) {
                    Some(pos) => {
                        self.pending.drain(..pos + THINK_CLOSE.len());
                        self.in_think = false;
                    }
                    None => {
                        let keep = partial_tag_len(&self.pending, THINK_CLOSE);
                        let cut = self.pending.len() - keep;
                        self.pending.drain(..cut);
                        return visible;
                    }
                }
            } else {
                match self.pending.find(THINK_OPEN) {
                    Some(pos) => {
                        visible.push_str(&self.pending[..pos]);
                        self.pending.drain(..pos + THINK_OPEN.len());
                        self.in_think = true;
                    }
                    None => {
                        let keep = partial_tag_len(&self.pending, THINK_OPEN);
                        let cut = self.pending.len() - keep;
                        visible.push_str(&self.pending[..cut]);
                        self.pending.drain(..cut);
                        return visible;
                    }
                }
            }
        }
    }

    fn filter_leading(&mut self, text: &str) -> String {
        if self.leading_done {
            return text.to_string();
        }

        self.line.push_str(text);
        loop {
            match self.line.find('\n') {
                Some(pos) => {
                    let line: String = self.line.drain(..=pos).collect();
                    if line.trim().is_empty() || is_meta_line(&line) {
                        continue;
                    }
                    self.leading_done = true;
                    let mut out = line.trim_start().to_string();
                    out.push_str(&std::mem::take(&mut self.line));
                    return out;
                }
                None => {
                    if self.line.trim().is_empty() || could_be_meta(&self.line) {
                        return String::new();
                    }
                    self.leading_done = true;
                    return std::mem::take(&mut self.line).trim_start().to_string();
                }
            }
        }
    }
}

/// Sanitize a complete answer
pub fn sanitize_answer(text: &str) -> String {
    // A closing tag without an opening one means everything before it was thinking
    let text = match (text.find(THINK_OPEN), text.find(THINK_CLOSE)) {
        (None, Some(close)) => &text[close + THINK_CLOSE.len()..],
        (Some(open), Some(close)) if close < open => &text[close + THINK_CLOSE.len()..],
        _ => text,
    };

    let mut sanitizer = StreamSanitizer::new();
    let mut out = sanitizer.push(text);
    out.push_str(&sanitizer.finish());
    out.trim().to_string()
}

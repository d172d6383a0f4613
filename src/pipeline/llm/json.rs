//! Tolerant JSON recovery for model output.
//!
//! Model replies may arrive wrapped in prose or code fences, or be cut off
//! mid-array when the token budget runs out. The ladder here is: strict
//! parse, then the outermost `{...}` span, then a streaming scan that pulls
//! complete objects out of a named array and ignores a truncated tail.

use serde_json::Value;

/// Strict parse, then outermost-object parse. Returns `None` when neither works.
pub fn parse_json_object(text: &str) -> Option<Value> {
    let trimmed = strip_code_fence(text.trim());
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        if v.is_object() {
            return Some(v);
        }
    }
    let span = outermost_object(trimmed)?;
    serde_json::from_str::<Value>(span).ok().filter(Value::is_object)
}

/// Span from the first `{` to the last `}`.
pub fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Stream the complete top-level objects out of the array under `key`.
///
/// Honors string quoting and backslash escapes so braces inside strings do
/// not confuse the depth count. Objects that fail to parse are skipped, and
/// an unterminated trailing object is dropped.
pub fn lenient_array_objects(text: &str, key: &str) -> Vec<Value> {
    let needle = format!("\"{key}\"");
    let Some(key_pos) = text.find(&needle) else {
        return Vec::new();
    };
    let after_key = &text[key_pos + needle.len()..];
    let Some(bracket) = after_key.find('[') else {
        return Vec::new();
    };
    let body = &after_key[bracket + 1..];

    let mut objects = Vec::new();
    let mut scanner = BraceScanner::default();
    let mut start: Option<usize> = None;

    for (i, ch) in body.char_indices() {
        match scanner.feed(ch) {
            ScanEvent::Open if scanner.depth == 1 => start = Some(i),
            ScanEvent::Close if scanner.depth == 0 => {
                if let Some(s) = start.take() {
                    if let Ok(v) = serde_json::from_str::<Value>(&body[s..=i]) {
                        objects.push(v);
                    }
                }
            }
            ScanEvent::ArrayEnd if scanner.depth == 0 => break,
            _ => {}
        }
    }
    objects
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim().strip_suffix("```").unwrap_or(rest).trim()
}

#[derive(Debug, PartialEq)]
enum ScanEvent {
    Open,
    Close,
    ArrayEnd,
    Other,
}

/// Tracks object depth while skipping over string contents.
#[derive(Default)]
struct BraceScanner {
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl BraceScanner {
    fn feed(&mut self, ch: char) -> ScanEvent {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if ch == '\\' {
                self.escaped = true;
            } else if ch == '"' {
                self.in_string = false;
            }
            return ScanEvent::Other;
        }
        match ch {
            '"' => {
                self.in_string = true;
                ScanEvent::Other
            }
            '{' => {
                self.depth += 1;
                ScanEvent::Open
            }
            '}' if self.depth > 0 => {
                self.depth -= 1;
                ScanEvent::Close
            }
            ']' => ScanEvent::ArrayEnd,
            _ => ScanEvent::Other,
        }
    }
}

//! Log formatting for game text, so room descriptions and raw server output
//! stay on one log line and free of terminal color codes.

use std::fmt::Write;

/// Default preview length for game text in logs.
pub const MAX_PREVIEW: usize = 120;

/// Escape game text for single-line logging, truncated to [`MAX_PREVIEW`] chars.
pub fn escape_log(s: &str) -> String {
    escape_log_max(s, MAX_PREVIEW)
}

/// Like [`escape_log`] with an explicit limit.
///
/// ANSI color sequences (`ESC [ ... letter`) are dropped, newlines and other
/// control characters are escaped, and anything past `max_chars` becomes `…`.
pub fn escape_log_max(s: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(s.len().min(max_chars) + 8);
    let mut chars = s.chars().peekable();
    let mut count = 0;
    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for c in chars.by_ref() {
                if c.is_ascii_alphabetic() {
                    break;
                }
            }
            continue;
        }
        if count >= max_chars {
            out.push('…');
            break;
        }
        count += 1;
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

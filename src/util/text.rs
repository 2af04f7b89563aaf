use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ELLIPSIS: &str = "...";

/// Removes control characters and ANSI escape sequences from provider text.
///
/// Article titles and extracts come from a third party and may end up in a
/// terminal (the headless harness) or a log line. Tab, newline and carriage
/// return survive; everything else below 0x20, DEL, and `ESC [ ... final`
/// CSI runs are dropped.
///
/// Returns `Cow::Borrowed` when nothing needs stripping.
///
/// ```
/// use wikiscroll::util::strip_control_chars;
///
/// assert_eq!(strip_control_chars("Plain title"), "Plain title");
/// assert_eq!(strip_control_chars("\x1b[31mRed\x1b[0m"), "Red");
/// ```
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            if chars.peek() == Some(&'[') {
                chars.next();
                // CSI: parameters until a final byte in 0x40..=0x7e
                for p in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&p) {
                        break;
                    }
                }
            }
            continue;
        }
        if !is_stripped(c) {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

fn is_stripped(c: char) -> bool {
    c == '\x7f' || (c.is_ascii_control() && !matches!(c, '\t' | '\n' | '\r'))
}

/// Truncates `s` to at most `max_width` terminal columns, appending "..."
/// when text was cut and there is room for it.
///
/// ```
/// use wikiscroll::util::truncate_to_width;
///
/// assert_eq!(truncate_to_width("Short", 10), "Short");
/// assert_eq!(truncate_to_width("Hello World", 8), "Hello...");
/// ```
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if UnicodeWidthStr::width(s) <= max_width {
        return Cow::Borrowed(s);
    }

    let budget = if max_width > ELLIPSIS.len() {
        max_width - ELLIPSIS.len()
    } else {
        max_width
    };

    let mut used = 0;
    let mut cut = 0;
    for (idx, c) in s.char_indices() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        cut = idx + c.len_utf8();
    }

    if max_width > ELLIPSIS.len() {
        Cow::Owned(format!("{}{}", &s[..cut], ELLIPSIS))
    } else {
        Cow::Owned(s[..cut].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_is_borrowed() {
        assert!(matches!(
            strip_control_chars("Quantum Computing"),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn test_strips_csi_and_controls() {
        assert_eq!(strip_control_chars("a\x1b[1;32mb\x1b[0mc"), "abc");
        assert_eq!(strip_control_chars("bell\x07 del\x7f"), "bell del");
    }

    #[test]
    fn test_preserves_whitespace_controls() {
        assert_eq!(strip_control_chars("line\tone\r\nline two"), "line\tone\r\nline two");
    }

    #[test]
    fn test_bare_escape_dropped() {
        assert_eq!(strip_control_chars("x\x1by"), "xy");
    }

    #[test]
    fn test_truncate_ascii() {
        assert_eq!(truncate_to_width("Hello World", 8), "Hello...");
        assert_eq!(truncate_to_width("12345", 5), "12345");
    }

    #[test]
    fn test_truncate_wide_chars() {
        // Each CJK character is two columns wide
        assert_eq!(truncate_to_width("日本語テキスト", 7), "日本...");
    }

    #[test]
    fn test_truncate_narrow_widths() {
        assert_eq!(truncate_to_width("Test", 0), "");
        assert_eq!(truncate_to_width("Testing", 2), "Te");
        assert_eq!(truncate_to_width("Testing", 3), "Tes");
    }
}

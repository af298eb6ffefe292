use std::borrow::Cow;

/// Returns the first line of `s` (everything before the first `\n`).
///
/// A trailing `\r` from CRLF text is dropped as well.
pub fn first_line(s: &str) -> &str {
    let line = s.split('\n').next().unwrap_or("");
    line.strip_suffix('\r').unwrap_or(line)
}

/// Truncates `s` to at most `max_chars` Unicode scalar values.
///
/// Unlike a byte slice this never splits a multi-byte character, which
/// matters for the Cyrillic text most VK walls carry. No ellipsis is
/// appended.
///
/// Returns `Cow::Borrowed` when the string already fits.
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => Cow::Owned(s[..byte_idx].to_owned()),
        None => Cow::Borrowed(s),
    }
}

/// Removes characters that XML 1.0 does not allow in character data.
///
/// quick-xml escapes markup but happily writes raw C0 control characters,
/// which makes most feed readers reject the whole document. Strips:
/// - C0 controls except tab, newline and carriage return
/// - the non-characters U+FFFE and U+FFFF
///
/// Returns `Cow::Borrowed` when nothing needs to be removed (common case).
pub fn strip_xml_invalid_chars(s: &str) -> Cow<'_, str> {
    fn is_invalid(c: char) -> bool {
        matches!(c, '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{fffe}' | '\u{ffff}')
    }

    if !s.chars().any(is_invalid) {
        return Cow::Borrowed(s);
    }

    Cow::Owned(s.chars().filter(|&c| !is_invalid(c)).collect())
}

//! Parsing of bulk-import text.
//!
//! One source per line, `<url-or-id>[#optional title]`. Lines that start
//! with `#` are comments. Only the first `#` splits, so titles may contain
//! further `#` characters.

/// One non-comment line of import text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportLine {
    /// 1-based line number in the original text.
    pub line_no: usize,
    pub identifier: String,
    pub title: Option<String>,
}

pub fn parse_import_lines(text: &str) -> Vec<ImportLine> {
    text.lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let (identifier, title) = match line.split_once('#') {
                Some((id, title)) => (id.trim(), Some(title.trim())),
                None => (line, None),
            };
            Some(ImportLine {
                line_no: idx + 1,
                identifier: identifier.to_string(),
                title: title.filter(|t| !t.is_empty()).map(str::to_string),
            })
        })
        .collect()
}

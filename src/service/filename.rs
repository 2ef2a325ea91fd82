//! Filename sanitization for object keys and scratch paths

/// Reduce `filename` to a flat, ASCII-only name safe to use as a local path
/// component and an object key.
///
/// Non-ASCII characters are dropped, path separators become word breaks,
/// whitespace runs collapse into `_`, anything outside `[A-Za-z0-9_.-]` is
/// removed, and leading/trailing `.` and `_` are trimmed. The result may be
/// empty.
pub fn secure_filename(filename: &str) -> String {
    let flattened: String = filename
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");

    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// `photo.jpg` -> `photo_compressed.jpg`
pub fn compressed_filename(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}_compressed.{ext}"),
        None => format!("{filename}_compressed"),
    }
}

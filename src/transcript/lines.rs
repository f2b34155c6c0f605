// src/transcript/lines.rs
// Splits the raw buffer into candidate lines.

/// Complete lines only: text after the last line-feed is still being
/// streamed and stays invisible until its terminator arrives.
pub fn extract_lines(buffer: &str) -> Vec<&str> {
    match buffer.rfind('\n') {
        Some(end) => split_trimmed(&buffer[..end]),
        None => Vec::new(),
    }
}

/// Every line, including an unterminated tail. Used once the stream has ended.
pub fn extract_all_lines(buffer: &str) -> Vec<&str> {
    split_trimmed(buffer)
}

fn split_trimmed(text: &str) -> Vec<&str> {
    text.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

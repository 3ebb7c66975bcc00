//! Word-window chunking for document ingestion.
//!
//! Splits source text into overlapping fixed-size word windows; each window
//! is embedded independently before being added to the index.

/// Split `text` into windows of `chunk_size` words, stepping by
/// `chunk_size - overlap`. An overlap at or above the window size is clamped
/// so the walk always advances.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let end = (start + chunk_size).min(words.len());
        chunks.push(words[start..end].join(" "));
        start += step;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", 10, 2).is_empty());
        assert!(chunk_text("   \n\t  ", 10, 2).is_empty());
    }

    #[test]
    fn test_single_window() {
        let chunks = chunk_text("one two three", 10, 2);
        assert_eq!(chunks, vec!["one two three"]);
    }

    #[test]
    fn test_windows_overlap() {
        let text = "w1 w2 w3 w4 w5 w6";
        let chunks = chunk_text(text, 4, 2);
        assert_eq!(chunks[0], "w1 w2 w3 w4");
        assert_eq!(chunks[1], "w3 w4 w5 w6");
        // Consecutive windows share the overlap words.
        assert!(chunks[0].ends_with("w3 w4"));
        assert!(chunks[1].starts_with("w3 w4"));
    }

    #[test]
    fn test_no_overlap_partitions_words() {
        let chunks = chunk_text("a b c d e", 2, 0);
        assert_eq!(chunks, vec!["a b", "c d", "e"]);
    }

    #[test]
    fn test_degenerate_overlap_still_terminates() {
        // overlap >= chunk_size would never advance without the clamp.
        let chunks = chunk_text("a b c", 2, 5);
        assert_eq!(chunks, vec!["a b", "b c", "c"]);
    }

    #[test]
    fn test_normalizes_whitespace() {
        let chunks = chunk_text("a\n b\t\tc", 3, 0);
        assert_eq!(chunks, vec!["a b c"]);
    }
}

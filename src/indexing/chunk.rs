//! Deterministic text chunking for long source objects.
//!
//! A long lesson becomes several documents; the split must be byte-stable so
//! re-indexing unchanged content produces identical chunk bodies and
//! therefore identical embeddings.

/// Split `text` into chunks of at most `max_chars` characters with
/// `overlap` characters of context carried between consecutive chunks.
///
/// Breaks at the last whitespace inside the window when one exists past its
/// midpoint, so words are not cut mid-token unless a single word exceeds the
/// window. Whole-character (not byte) boundaries throughout.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    let max_chars = max_chars.max(1);
    // Overlap must leave room for forward progress.
    let overlap = overlap.min(max_chars / 2);

    if chars.len() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let hard_end = (start + max_chars).min(chars.len());
        let end = if hard_end == chars.len() {
            hard_end
        } else {
            // Prefer a whitespace break in the back half of the window.
            let window = &chars[start..hard_end];
            match window
                .iter()
                .rposition(|c| c.is_whitespace())
                .filter(|pos| *pos > max_chars / 2)
            {
                Some(pos) => start + pos,
                None => hard_end,
            }
        };
        chunks.push(chars[start..end].iter().collect::<String>());
        if end == chars.len() {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }
    chunks
}

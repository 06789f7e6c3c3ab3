//! Fixed-window chunker by character count with overlap (§4.5.1). Pure and
//! allocation-light: no sentence or token boundary awareness, by design —
//! the retriever is robust to mid-sentence cuts.

#[derive(Debug, Clone, Copy)]
pub struct ChunkParams {
    pub window: usize,
    pub overlap: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            window: 800,
            overlap: 100,
        }
    }
}

impl ChunkParams {
    pub fn new(window: usize, overlap: usize) -> Self {
        debug_assert!(window > 0, "window must be > 0");
        debug_assert!(overlap < window, "overlap must be < window");
        Self { window, overlap }
    }
}

/// Splits `text` into ordered, possibly-overlapping windows. The last chunk
/// may be shorter than `window`. Operates on `char` boundaries (not bytes)
/// so multi-byte UTF-8 content is never split mid-codepoint.
pub fn chunk_text(text: &str, params: ChunkParams) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    let stride = params.window - params.overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let end = (start + params.window).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += stride;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_ceil_n_over_stride_chunks_with_short_last_chunk() {
        let text = "a".repeat(1000);
        let chunks = chunk_text(&text, ChunkParams::new(500, 50));
        // stride = 450; windows start at 0, 450, 900 -> 3 chunks.
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 500);
        assert_eq!(chunks[1].len(), 500);
        assert_eq!(chunks[2].len(), 100); // chars 900..1000
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk_text("", ChunkParams::default()).is_empty());
    }

    #[test]
    fn input_shorter_than_window_yields_one_chunk() {
        let chunks = chunk_text("hello", ChunkParams::new(500, 50));
        assert_eq!(chunks, vec!["hello".to_string()]);
    }

    #[test]
    fn overlap_is_respected_between_adjacent_chunks() {
        let text = "0123456789";
        let chunks = chunk_text(text, ChunkParams::new(6, 2));
        // stride = 4: [0..6), [4..10)
        assert_eq!(chunks, vec!["012345".to_string(), "456789".to_string()]);
    }
}

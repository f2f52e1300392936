//! Paragraph-aligned document chunking.

use serde::{Deserialize, Serialize};

/// Default upper bound on words per chunk.
pub const DEFAULT_MAX_WORDS: usize = 1500;

/// Hex characters kept from the content hash.
const CHUNK_ID_LEN: usize = 16;

/// A slice of a document submitted to the extractor as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Zero-based position in the document.
    pub index: usize,
    /// Stable content id derived from the index and text.
    pub id: String,
    /// Chunk text, paragraphs joined by blank lines.
    pub text: String,
    /// Whitespace-separated words in `text`.
    pub word_count: usize,
}

impl Chunk {
    fn new(index: usize, text: String, word_count: usize) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(index as u64).to_le_bytes());
        hasher.update(text.as_bytes());
        let hash = hasher.finalize();
        let id = hash.to_hex()[..CHUNK_ID_LEN].to_string();

        Self {
            index,
            id,
            text,
            word_count,
        }
    }
}

/// Splits `text` into chunks of whole paragraphs.
///
/// Paragraphs are separated by one or more blank lines. A chunk grows until
/// the next paragraph would push it past `max_words`; a paragraph that is
/// larger than the limit on its own becomes a chunk by itself.
///
/// # Examples
///
/// ```
/// use lorekeeper::extraction::chunk_document;
///
/// let chunks = chunk_document("one two\n\nthree four\n\nfive", 4);
/// assert_eq!(chunks.len(), 2);
/// assert_eq!(chunks[0].text, "one two\n\nthree four");
/// assert_eq!(chunks[1].text, "five");
/// ```
#[must_use]
pub fn chunk_document(text: &str, max_words: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut buffer: Vec<String> = Vec::new();
    let mut buffer_words = 0;

    for paragraph in paragraphs(text) {
        let words = paragraph.split_whitespace().count();

        // Flush before the paragraph that would overflow the chunk.
        if !buffer.is_empty() && buffer_words + words > max_words {
            chunks.push(Chunk::new(chunks.len(), buffer.join("\n\n"), buffer_words));
            buffer.clear();
            buffer_words = 0;
        }

        buffer.push(paragraph);
        buffer_words += words;
    }

    if !buffer.is_empty() {
        chunks.push(Chunk::new(chunks.len(), buffer.join("\n\n"), buffer_words));
    }

    chunks
}

fn paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }

    paragraphs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_has_no_chunks() {
        assert!(chunk_document("", 10).is_empty());
        assert!(chunk_document("\n\n  \n", 10).is_empty());
    }

    #[test]
    fn test_paragraphs_accumulate_until_limit() {
        let text = "a b c\n\nd e\n\nf g h i\n\nj";
        let chunks = chunk_document(text, 5);

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a b c\n\nd e", "f g h i\n\nj"]);
        assert_eq!(chunks[0].word_count, 5);
        assert_eq!(chunks[1].index, 1);
    }

    #[test]
    fn test_oversized_paragraph_is_never_split() {
        let text = "short\n\none two three four five six seven\n\ntail";
        let chunks = chunk_document(text, 3);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].text, "one two three four five six seven");
        assert_eq!(chunks[1].word_count, 7);
    }

    #[test]
    fn test_crlf_and_whitespace_only_separators() {
        let text = "Mara rode north.\r\nShe did not look back.\r\n   \r\n\r\nGreywater burned.";
        let chunks = chunk_document(text, 100);

        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].text,
            "Mara rode north.\nShe did not look back.\n\nGreywater burned."
        );
    }

    #[test]
    fn test_chunk_ids_are_stable_and_position_dependent() {
        let a = chunk_document("same\n\nsame", 1);
        let b = chunk_document("same\n\nsame", 1);

        assert_eq!(a[0].id, b[0].id);
        assert_ne!(a[0].id, a[1].id);
        assert_eq!(a[0].id.len(), CHUNK_ID_LEN);
    }
}

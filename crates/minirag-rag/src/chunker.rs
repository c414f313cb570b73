//! Recursive character chunking of document pages

use minirag_core::{Chunk, DocumentPage, Error, Result};

/// Separators tried in order; the empty separator means "split into characters".
const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Splits text into windows of at most `chunk_size` characters, carrying up
/// to `chunk_overlap` characters of context from one window into the next.
///
/// Lengths are counted in Unicode scalar values.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_size <= chunk_overlap {
            return Err(Error::Configuration(format!(
                "chunk size ({}) must be positive and larger than the overlap ({})",
                chunk_size, chunk_overlap
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split one text into trimmed, non-empty chunks
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        // First separator present in the text wins; "" always matches.
        let mut separator: &str = "";
        let mut rest: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() || text.contains(candidate.as_str()) {
                separator = candidate.as_str();
                rest = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut good = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                chunks.extend(self.merge(&good));
                good.clear();
            }
            if rest.is_empty() {
                if let Some(piece) = clean(&piece) {
                    chunks.push(piece);
                }
            } else {
                chunks.extend(self.split_recursive(&piece, rest));
            }
        }

        if !good.is_empty() {
            chunks.extend(self.merge(&good));
        }
        chunks
    }

    /// Greedily merge small pieces into windows, sliding with overlap.
    fn merge(&self, pieces: &[String]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: Vec<&str> = Vec::new();
        let mut window_len = 0usize;
        let mut start = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            if window_len + len > self.chunk_size && start < window.len() {
                if let Some(chunk) = clean(&window[start..].concat()) {
                    chunks.push(chunk);
                }
                while start < window.len()
                    && (window_len > self.chunk_overlap
                        || window_len + len > self.chunk_size)
                {
                    window_len -= char_len(window[start]);
                    start += 1;
                }
            }
            window.push(piece);
            window_len += len;
        }

        if let Some(chunk) = clean(&window[start..].concat()) {
            chunks.push(chunk);
        }
        chunks
    }
}

fn clean(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Split on `separator`, keeping it at the start of the following piece.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }

    let mut pieces = Vec::new();
    let mut last = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > last {
            pieces.push(text[last..idx].to_string());
        }
        last = idx;
    }
    if last < text.len() {
        pieces.push(text[last..].to_string());
    }
    pieces.retain(|p| !p.is_empty());
    pieces
}

/// Chunk a document page by page.
///
/// Each page's metadata is copied onto its chunks and `order` runs from 1
/// across the whole document.
pub fn chunk_pages(
    splitter: &TextSplitter,
    project_id: &str,
    asset_id: &str,
    pages: &[DocumentPage],
) -> Vec<Chunk> {
    pages
        .iter()
        .flat_map(|page| {
            splitter
                .split_text(&page.text)
                .into_iter()
                .map(move |text| (text, page.metadata.clone()))
        })
        .enumerate()
        .map(|(i, (text, metadata))| Chunk {
            text,
            metadata,
            order: i + 1,
            project_id: project_id.to_string(),
            asset_id: asset_id.to_string(),
        })
        .collect()
}

/// Processing entry point: chunk a loaded document for a project.
///
/// Empty input yields no chunks. Non-empty input that yields no chunks
/// (whitespace only) is a processing failure.
pub fn process_document(
    project_id: &str,
    asset_id: &str,
    pages: &[DocumentPage],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>> {
    let splitter = TextSplitter::new(chunk_size, chunk_overlap)?;
    if pages.is_empty() {
        return Ok(Vec::new());
    }

    let chunks = chunk_pages(&splitter, project_id, asset_id, pages);
    if chunks.is_empty() {
        tracing::error!(project_id, asset_id, "document produced no chunks");
        return Err(Error::Processing(format!(
            "no chunks were produced for asset {}",
            asset_id
        )));
    }

    tracing::info!(
        project_id,
        asset_id,
        pages = pages.len(),
        chunks = chunks.len(),
        "document chunked"
    );
    Ok(chunks)
}

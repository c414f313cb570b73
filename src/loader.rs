//! Loading plain-text assets into document pages

use anyhow::{Context, Result, bail};
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use minirag_core::DocumentPage;

const SUPPORTED_EXTENSIONS: [&str; 2] = ["txt", "md"];

static TRAILING_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+\n").expect("valid trailing-space pattern"));

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Asset id of a file: its file name
pub fn asset_id(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read a UTF-8 text file as a single page.
///
/// Line endings are normalised and trailing blanks dropped; the page carries
/// `source` and `loaded_at` metadata. A file with only whitespace is an
/// error, not an empty document.
pub fn load_file(path: &Path) -> Result<Vec<DocumentPage>> {
    if !is_supported(path) {
        bail!(
            "unsupported file type: {} (expected one of {:?})",
            path.display(),
            SUPPORTED_EXTENSIONS
        );
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let text = TRAILING_SPACE
        .replace_all(&raw.replace("\r\n", "\n"), "\n")
        .into_owned();

    if text.trim().is_empty() {
        tracing::warn!(path = %path.display(), "file has no text content");
        bail!("no text content to process in {}", path.display());
    }

    let page = DocumentPage::new(text)
        .with_metadata("source", serde_json::json!(path.display().to_string()))
        .with_metadata("loaded_at", serde_json::json!(chrono::Utc::now().to_rfc3339()));
    Ok(vec![page])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_loads_text_file_as_one_page() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        write!(file, "Tesla   \r\nwas an inventor.\t\n").unwrap();

        let pages = load_file(file.path()).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].text, "Tesla\nwas an inventor.\n");
        assert_eq!(
            pages[0].metadata["source"],
            serde_json::json!(file.path().display().to_string())
        );
        assert!(pages[0].metadata.contains_key("loaded_at"));
    }

    #[test]
    fn test_blank_file_is_a_processing_failure() {
        let mut file = tempfile::Builder::new().suffix(".md").tempfile().unwrap();
        write!(file, "  \r\n\n\t ").unwrap();
        let err = load_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("no text content"));

        let empty = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        assert!(load_file(empty.path()).is_err());
    }

    #[test]
    fn test_rejects_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        assert!(load_file(file.path()).is_err());
        assert!(!is_supported(Path::new("notes")));
        assert!(is_supported(Path::new("README.MD")));
    }

    #[test]
    fn test_asset_id_is_file_name() {
        assert_eq!(asset_id(Path::new("/data/docs/tesla.txt")), "tesla.txt");
    }
}

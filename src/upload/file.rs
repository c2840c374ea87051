//! The document chosen for upload.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// A file picked by the user, held in memory until it is submitted.
///
/// Cloning is cheap; the contents are shared.
#[derive(Clone, PartialEq, Eq)]
pub struct SelectedFile {
    name: String,
    contents: Arc<[u8]>,
}

impl SelectedFile {
    /// Wrap in-memory contents under the given file name.
    pub fn new(name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            contents: Arc::from(contents.into()),
        }
    }

    /// Read a file from disk, keeping its file name.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map_or_else(|| "document.pdf".to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self::new(name, contents))
    }

    /// File name sent with the upload.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw contents.
    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    /// Whether the file has no contents.
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// MIME type guessed from the file name.
    pub fn mime_type(&self) -> String {
        mime_guess::from_path(&self.name)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }
}

impl fmt::Debug for SelectedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedFile")
            .field("name", &self.name)
            .field("len", &self.contents.len())
            .finish()
    }
}

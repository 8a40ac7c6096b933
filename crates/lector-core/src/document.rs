//! Document loading: plain text and markdown always, PDF behind the
//! `pdf` feature.

use std::path::Path;
use std::pin::Pin;

use crate::error::DocumentError;

/// Default maximum file size: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Extracted text plus the metadata the pipeline keeps per document.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub content: String,
    pub source_name: String,
    pub content_type: String,
    /// Char offsets in `content` where page 2, 3, ... begin. Empty when
    /// the format has no page structure.
    pub page_offsets: Vec<usize>,
}

pub trait DocumentLoader: Send + Sync {
    fn load(
        &self,
        path: &Path,
    ) -> Pin<Box<dyn Future<Output = Result<LoadedDocument, DocumentError>> + Send + '_>>;

    fn supported_extensions(&self) -> &[&str];
}

/// Pick a loader by file extension.
///
/// # Errors
///
/// Returns [`DocumentError::UnsupportedFormat`] for extensions no loader
/// claims.
pub fn loader_for(path: &Path) -> Result<Box<dyn DocumentLoader>, DocumentError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "txt" | "md" | "markdown" => Ok(Box::new(TextLoader::default())),
        #[cfg(feature = "pdf")]
        "pdf" => Ok(Box::new(PdfLoader::default())),
        other => Err(DocumentError::UnsupportedFormat(other.to_owned())),
    }
}

fn source_name_of(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or_else(|| path.display().to_string(), ToOwned::to_owned)
}

pub struct TextLoader {
    pub max_file_size: u64,
}

impl Default for TextLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DocumentLoader for TextLoader {
    fn load(
        &self,
        path: &Path,
    ) -> Pin<Box<dyn Future<Output = Result<LoadedDocument, DocumentError>> + Send + '_>> {
        let path = path.to_path_buf();
        let max_size = self.max_file_size;
        Box::pin(async move {
            let path = std::fs::canonicalize(&path)?;

            let meta = tokio::fs::metadata(&path).await?;
            if meta.len() > max_size {
                return Err(DocumentError::FileTooLarge(meta.len()));
            }

            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            let content_type = match ext {
                "md" | "markdown" => "text/markdown",
                _ => "text/plain",
            };

            let content = tokio::fs::read_to_string(&path).await?;

            Ok(LoadedDocument {
                content,
                source_name: source_name_of(&path),
                content_type: content_type.to_owned(),
                page_offsets: Vec::new(),
            })
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["txt", "md", "markdown"]
    }
}

#[cfg(feature = "pdf")]
pub struct PdfLoader {
    pub max_file_size: u64,
}

#[cfg(feature = "pdf")]
impl Default for PdfLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

#[cfg(feature = "pdf")]
impl DocumentLoader for PdfLoader {
    fn load(
        &self,
        path: &Path,
    ) -> Pin<Box<dyn Future<Output = Result<LoadedDocument, DocumentError>> + Send + '_>> {
        let path = path.to_path_buf();
        let max_size = self.max_file_size;
        Box::pin(async move {
            let path = std::fs::canonicalize(&path)?;

            let meta = tokio::fs::metadata(&path).await?;
            if meta.len() > max_size {
                return Err(DocumentError::FileTooLarge(meta.len()));
            }

            let source_name = source_name_of(&path);
            let path_buf = path.clone();
            let (content, page_offsets) = tokio::task::spawn_blocking(move || {
                let pages = pdf_extract::extract_text_by_pages(&path_buf)
                    .map_err(|e| DocumentError::Pdf(e.to_string()))?;
                Ok::<_, DocumentError>(join_pages(&pages))
            })
            .await
            .map_err(|e| DocumentError::Io(std::io::Error::other(e)))??;

            Ok(LoadedDocument {
                content,
                source_name,
                content_type: "application/pdf".to_owned(),
                page_offsets,
            })
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["pdf"]
    }
}

/// Concatenate page texts with a paragraph break between pages, recording
/// the char offset where each page after the first begins.
#[cfg(feature = "pdf")]
fn join_pages(pages: &[String]) -> (String, Vec<usize>) {
    let mut content = String::new();
    let mut offsets = Vec::new();
    let mut char_len = 0usize;

    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            content.push_str("\n\n");
            char_len += 2;
            offsets.push(char_len);
        }
        content.push_str(page);
        char_len += page.chars().count();
    }

    (content, offsets)
}

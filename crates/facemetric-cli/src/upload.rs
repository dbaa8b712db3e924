//! Upload preview widget: pick a local image file and preview it as a
//! data URL.
//!
//! Mirrors a file-input-and-preview surface: selections whose declared media
//! type is not `image/*` are dropped without an error, and a valid selection
//! replaces the previous preview wholesale. There is no explicit clear.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::path::{Path, PathBuf};

/// Characters of the encoded value shown in the textual preview.
const PREVIEW_CHARS: usize = 200;

// The size limit is display copy only; nothing enforces it.
const UPLOAD_PROMPT: &str = "Click to upload an image\nPNG, JPG, GIF up to 10MB";

/// A file-selection event: a declared media type plus the file to read.
#[derive(Debug, Clone)]
pub struct FileSelection {
    pub media_type: String,
    pub path: PathBuf,
}

impl FileSelection {
    /// Build a selection from a local path, deriving the declared media type
    /// from the file extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let media_type = media_type_for(&path).to_string();
        Self { media_type, path }
    }
}

/// Declared media type for a path, by extension.
fn media_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// At most one previewed image, held as a `data:` URL.
#[derive(Debug, Default)]
pub struct UploadPreview {
    image_data: Option<String>,
}

impl UploadPreview {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current encoded value, if an image has been selected.
    pub fn image_data(&self) -> Option<&str> {
        self.image_data.as_deref()
    }

    /// Handle a file selection.
    ///
    /// Absent selections, non-image media types, and unreadable files are
    /// ignored without surfacing an error; a valid selection replaces any
    /// previous preview. When selections overlap, the later completion wins.
    pub async fn handle_selection(&mut self, selection: Option<FileSelection>) {
        let Some(selection) = selection else {
            return;
        };
        if !selection.media_type.starts_with("image/") {
            return;
        }

        let bytes = match tokio::fs::read(&selection.path).await {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::debug!(path = %selection.path.display(), %error, "ignoring unreadable selection");
                return;
            }
        };

        self.image_data = Some(format!(
            "data:{};base64,{}",
            selection.media_type,
            BASE64.encode(&bytes)
        ));
    }

    /// Text rendering: the upload prompt while empty; otherwise the stored
    /// confirmation, the inline image, and the first [`PREVIEW_CHARS`]
    /// characters of the encoded value followed by an ellipsis.
    pub fn render(&self) -> String {
        match &self.image_data {
            None => UPLOAD_PROMPT.to_string(),
            Some(data) => {
                let cut = data.len().min(PREVIEW_CHARS);
                format!(
                    "Image stored successfully!\n[inline image, {} encoded bytes]\nImage data preview:\n{}...",
                    data.len(),
                    &data[..cut]
                )
            }
        }
    }
}

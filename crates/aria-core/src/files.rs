use serde::{Deserialize, Serialize};

/// Coarse file classification used by prompts and the speech pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Image,
    Audio,
    Other,
}

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "webp", "bmp"];
const AUDIO_EXTENSIONS: [&str; 5] = ["mp3", "wav", "ogg", "m4a", "aac"];

impl FileKind {
    /// Classify by filename extension (case-insensitive).
    pub fn from_filename(filename: &str) -> Self {
        let ext = filename
            .rsplit_once('.')
            .map(|(_, e)| e.to_ascii_lowercase())
            .unwrap_or_default();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            FileKind::Image
        } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            FileKind::Audio
        } else {
            FileKind::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Image => "image",
            FileKind::Audio => "audio",
            FileKind::Other => "other",
        }
    }
}

/// A file attached to a user turn.
///
/// `bytes` is populated only at ingress and is stripped before the state is
/// snapshotted or persisted — it is excluded from serialization entirely, so
/// no snapshot format can ever contain the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub filename: String,
    pub kind: FileKind,
    pub mime: String,
    pub size: u64,
    #[serde(skip)]
    pub bytes: Option<Vec<u8>>,
    /// Filled by the decision node's input-processing step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FileDescriptor {
    /// Build an ingress descriptor from raw upload data.
    pub fn from_upload(filename: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        let filename = filename.into();
        Self {
            kind: FileKind::from_filename(&filename),
            mime: mime.into(),
            size: bytes.len() as u64,
            bytes: Some(bytes),
            description: None,
            filename,
        }
    }

    /// Drop the raw payload, keeping metadata only.
    pub fn strip_bytes(&mut self) {
        self.bytes = None;
    }

    /// Filename extension including the dot, e.g. ".jpg".
    pub fn extension(&self) -> String {
        self.filename
            .rsplit_once('.')
            .map(|(_, e)| format!(".{e}"))
            .unwrap_or_default()
    }
}

/// Human-readable one-liner for the `file_info` extra, e.g.
/// `"2 file(s) attached (.jpg, .png)"`. Empty when no files are attached.
pub fn summarize_files(files: &[FileDescriptor]) -> String {
    if files.is_empty() {
        return String::new();
    }
    let extensions: Vec<String> = files.iter().map(|f| f.extension()).collect();
    format!(
        "{} file(s) attached ({})",
        files.len(),
        extensions.join(", ")
    )
}

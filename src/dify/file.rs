//! Uploaded-file metadata and type classification.

use serde::{Deserialize, Serialize};

/// Descriptor of a file uploaded to the agent platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub extension: String,
    pub mime_type: String,
    pub created_by: String,
    pub created_at: i64,
}

/// File kind accepted by the agent platform, resolved by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Document,
    Image,
    Audio,
    Video,
}

impl FileType {
    pub const ALL: [FileType; 4] = [
        FileType::Document,
        FileType::Image,
        FileType::Audio,
        FileType::Video,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Document => "document",
            FileType::Image => "image",
            FileType::Audio => "audio",
            FileType::Video => "video",
        }
    }

    /// Extensions accepted for this kind (upper-case, no dot)
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            FileType::Document => &[
                "TXT", "MD", "MARKDOWN", "PDF", "HTML", "XLSX", "XLS", "DOCX", "CSV", "EML",
                "MSG", "PPTX", "PPT", "XML", "EPUB",
            ],
            FileType::Image => &["JPG", "JPEG", "PNG", "GIF", "WEBP", "SVG"],
            FileType::Audio => &["MP3", "M4A", "WAV", "WEBM", "AMR"],
            FileType::Video => &["MP4", "MOV", "MPEG", "MPGA"],
        }
    }

    /// Classify an extension (case-insensitive, leading dot tolerated).
    pub fn from_extension(extension: &str) -> Option<FileType> {
        let ext = extension.trim_start_matches('.').to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.extensions().contains(&ext.as_str()))
    }

    pub fn from_meta(meta: &FileMeta) -> Option<FileType> {
        Self::from_extension(&meta.extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_extension() {
        assert_eq!(FileType::from_extension("pdf"), Some(FileType::Document));
        assert_eq!(FileType::from_extension(".PNG"), Some(FileType::Image));
        assert_eq!(FileType::from_extension("mp3"), Some(FileType::Audio));
        assert_eq!(FileType::from_extension("MOV"), Some(FileType::Video));
        assert_eq!(FileType::from_extension("exe"), None);
    }

    #[test]
    fn test_webm_is_audio_not_video() {
        // WEBM sits in the audio table upstream.
        assert_eq!(FileType::from_extension("webm"), Some(FileType::Audio));
    }

    #[test]
    fn test_from_meta() {
        let meta = FileMeta {
            id: "f1".to_string(),
            name: "notes.md".to_string(),
            size: 128,
            extension: "md".to_string(),
            mime_type: "text/markdown".to_string(),
            created_by: "tester".to_string(),
            created_at: 1705395332,
        };
        assert_eq!(FileType::from_meta(&meta), Some(FileType::Document));
    }
}

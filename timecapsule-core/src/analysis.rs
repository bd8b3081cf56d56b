//! Descriptive file classification.
//!
//! Nothing here feeds authorization or decryption; the analysis is stored
//! alongside a capsule so clients can show what is inside before unlock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use timecapsule_crypto::encoding::base64_bytes;

const DEFAULT_MIME: &str = "application/octet-stream";
const ENTROPY_SAMPLE: usize = 1024;
const SIGNATURE_WINDOW: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Video,
    Audio,
    Image,
    Document,
    Archive,
    Code,
    Other,
}

impl FileCategory {
    pub fn is_multimedia(self) -> bool {
        matches!(self, Self::Video | Self::Audio | Self::Image)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Compression {
    Compressed,
    Uncompressed,
    CodecCompressed,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAnalysis {
    pub mime_type: String,
    pub category: FileCategory,
    /// Format detected from magic bytes, or `"unknown"`.
    pub signature: String,
    pub is_multimedia: bool,
    pub compression: Compression,
    pub size: u64,
    /// Shannon entropy of the first KiB in bits per byte, two decimals.
    pub entropy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub name: String,
    /// Type declared by the uploader, falling back to the detected type.
    pub original_type: String,
    pub detected_type: String,
    pub category: FileCategory,
    pub size: u64,
    /// Hex SHA-256 of the content.
    pub hash: String,
    pub uploaded_at: DateTime<Utc>,
    pub signature: String,
    pub is_multimedia: bool,
    pub compression: Compression,
}

/// The plaintext that gets sealed into a capsule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePackage {
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
    pub metadata: FileMetadata,
    pub analysis: FileAnalysis,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FileAnalyzer;

impl FileAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, buffer: &[u8], file_name: &str) -> FileAnalysis {
        let extension = extension_of(file_name);
        let mime_type = mime_for_extension(&extension).unwrap_or(DEFAULT_MIME);
        let category = categorize(mime_type, &extension);
        let signature = detect_signature(buffer);
        let compression = compression_of(signature, mime_type);

        FileAnalysis {
            mime_type: mime_type.to_string(),
            category,
            signature: signature.to_string(),
            is_multimedia: category.is_multimedia(),
            compression,
            size: buffer.len() as u64,
            entropy: entropy(&buffer[..buffer.len().min(ENTROPY_SAMPLE)]),
        }
    }

    /// Builds the sealed payload for `buffer`.
    pub fn package(
        &self,
        buffer: &[u8],
        file_name: &str,
        file_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> FilePackage {
        let analysis = self.classify(buffer, file_name);
        let metadata = FileMetadata {
            name: file_name.to_string(),
            original_type: file_type
                .filter(|t| !t.is_empty())
                .unwrap_or(&analysis.mime_type)
                .to_string(),
            detected_type: analysis.mime_type.clone(),
            category: analysis.category,
            size: analysis.size,
            hash: hex::encode(Sha256::digest(buffer)),
            uploaded_at: now,
            signature: analysis.signature.clone(),
            is_multimedia: analysis.is_multimedia,
            compression: analysis.compression,
        };
        FilePackage {
            content: buffer.to_vec(),
            metadata,
            analysis,
        }
    }
}

fn extension_of(file_name: &str) -> String {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext {
        "mp4" => "video/mp4",
        "m4v" => "video/x-m4v",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        "3gp" => "video/3gpp",

        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "aac" => "audio/aac",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        "wma" => "audio/x-ms-wma",
        "opus" => "audio/opus",

        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",

        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "odt" => "application/vnd.oasis.opendocument.text",
        "rtf" => "application/rtf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "json" => "application/json",
        "xml" => "application/xml",

        "zip" => "application/zip",
        "rar" => "application/vnd.rar",
        "7z" => "application/x-7z-compressed",
        "tar" => "application/x-tar",
        "gz" => "application/gzip",
        "bz2" => "application/x-bzip2",

        "js" => "application/javascript",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "py" => "text/x-python",
        "java" => "text/x-java-source",
        "c" | "cpp" => "text/x-c",
        "php" => "application/x-httpd-php",
        "rb" => "application/x-ruby",
        _ => return None,
    };
    Some(mime)
}

/// First match wins. Source files are `code` even when their MIME type is
/// textual; any other `text/*` lands in `document`.
fn categorize(mime: &str, ext: &str) -> FileCategory {
    const VIDEO: &[&str] = &["mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v", "3gp"];
    const AUDIO: &[&str] = &["mp3", "wav", "flac", "aac", "ogg", "m4a", "wma", "opus"];
    const IMAGE: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff", "svg", "ico"];
    const DOCUMENT: &[&str] = &["pdf", "doc", "docx", "txt", "rtf", "odt", "pages"];
    const ARCHIVE: &[&str] = &["zip", "rar", "7z", "tar", "gz", "bz2"];
    const CODE: &[&str] = &["js", "html", "css", "py", "java", "cpp", "c", "php", "rb"];

    if mime.starts_with("video/") || VIDEO.contains(&ext) {
        FileCategory::Video
    } else if mime.starts_with("audio/") || AUDIO.contains(&ext) {
        FileCategory::Audio
    } else if mime.starts_with("image/") || IMAGE.contains(&ext) {
        FileCategory::Image
    } else if DOCUMENT.contains(&ext) || mime.contains("document") {
        FileCategory::Document
    } else if ARCHIVE.contains(&ext) || mime.contains("archive") || mime.contains("compressed") {
        FileCategory::Archive
    } else if CODE.contains(&ext) {
        FileCategory::Code
    } else if mime.contains("text") {
        FileCategory::Document
    } else {
        FileCategory::Other
    }
}

/// Magic-byte prefixes, checked in order against the first eight bytes.
const SIGNATURES: &[(&[u8], &str)] = &[
    (&[0xFF, 0xD8, 0xFF], "JPEG"),
    (&[0x89, 0x50, 0x4E, 0x47], "PNG"),
    (b"GIF8", "GIF"),
    (b"RIFF", "RIFF"),
    (&[0x49, 0x49, 0x2A, 0x00], "TIFF"),
    (&[0x4D, 0x4D, 0x00, 0x2A], "TIFF"),
    (&[0x1A, 0x45, 0xDF, 0xA3], "WEBM/MKV"),
    (&[0x46, 0x4C, 0x56, 0x01], "FLV"),
    (&[0x30, 0x26, 0xB2, 0x75], "WMV"),
    (b"ID3", "MP3"),
    (b"fLaC", "FLAC"),
    (b"OggS", "OGG"),
    (b"%PDF", "PDF"),
    (&[0xD0, 0xCF, 0x11, 0xE0], "MS Office"),
    (&[0x50, 0x4B, 0x03, 0x04], "ZIP"),
    (&[0x7F, 0x45, 0x4C, 0x46], "ELF"),
    (&[0x4D, 0x5A, 0x90, 0x00], "EXE"),
    (&[0x1F, 0x8B, 0x08], "GZIP"),
    (&[0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x00], "RAR"),
    (b"BM", "BMP"),
];

fn detect_signature(buffer: &[u8]) -> &'static str {
    if buffer.len() < 4 {
        return "unknown";
    }
    let head = &buffer[..buffer.len().min(SIGNATURE_WINDOW)];
    // ISO base media files (MP4, MOV, M4A) carry `ftyp` after the box size.
    if head.get(4..8) == Some(b"ftyp".as_slice()) {
        return "MP4/MOV";
    }
    SIGNATURES
        .iter()
        .find(|(magic, _)| head.starts_with(magic))
        .map_or("unknown", |&(_, name)| name)
}

fn compression_of(signature: &str, mime: &str) -> Compression {
    const COMPRESSED: &[&str] = &["GZIP", "ZIP", "RAR", "FLAC", "WEBP", "PNG"];
    const UNCOMPRESSED: &[&str] = &["BMP", "WAV", "TIFF"];

    if COMPRESSED.iter().any(|s| signature.contains(s)) {
        Compression::Compressed
    } else if UNCOMPRESSED.iter().any(|s| signature.contains(s)) {
        Compression::Uncompressed
    } else if mime.contains("video") || mime.contains("audio") {
        Compression::CodecCompressed
    } else {
        Compression::Unknown
    }
}

/// Shannon entropy in bits per byte, rounded to two decimals.
fn entropy(sample: &[u8]) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }
    let mut counts = [0usize; 256];
    for &b in sample {
        counts[b as usize] += 1;
    }
    let len = sample.len() as f64;
    let bits: f64 = counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / len;
            -p * p.log2()
        })
        .sum();
    (bits * 100.0).round() / 100.0
}

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::settings::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MimeType {
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/webp")]
    Webp,
}

impl MimeType {
    pub fn as_str(self) -> &'static str {
        match self {
            MimeType::Png => "image/png",
            MimeType::Jpeg => "image/jpeg",
            MimeType::Webp => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            MimeType::Png => "png",
            MimeType::Jpeg => "jpg",
            MimeType::Webp => "webp",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path
            .extension()
            .and_then(|value| value.to_str())
            .map(str::to_ascii_lowercase)?;
        match ext.as_str() {
            "png" => Some(MimeType::Png),
            "jpg" | "jpeg" => Some(MimeType::Jpeg),
            "webp" => Some(MimeType::Webp),
            _ => None,
        }
    }

    /// Identifies the container from its magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(MimeType::Png);
        }
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(MimeType::Jpeg);
        }
        if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            return Some(MimeType::Webp);
        }
        None
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MimeType {
    type Err = ParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "image/png" => Ok(MimeType::Png),
            "image/jpeg" | "image/jpg" => Ok(MimeType::Jpeg),
            "image/webp" => Ok(MimeType::Webp),
            _ => Err(ParseError::MimeType(raw.trim().to_string())),
        }
    }
}

/// Encoded image bytes carried as base64 text plus their mime type.
///
/// Payloads are immutable once built; the pipeline hands them around by
/// clone and never rewrites the data in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePayload {
    data: String,
    mime_type: MimeType,
}

impl ImagePayload {
    pub fn from_bytes(bytes: &[u8], mime_type: MimeType) -> Self {
        Self {
            data: BASE64.encode(bytes),
            mime_type,
        }
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn mime_type(&self) -> MimeType {
        self.mime_type
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(self.data.as_bytes())
    }

    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.data.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn short_digest(&self) -> String {
        self.digest()[..12].to_string()
    }
}

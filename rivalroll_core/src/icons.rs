use std::collections::BTreeMap;

use base64::prelude::*;
use serde::{Deserialize, Serialize};

/// Storage key of the persisted icon map.
pub const ICONS_KEY: &str = "mr_custom_icons";

/// Character name → image data URL. Purely cosmetic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomIconMap(BTreeMap<String, String>);

impl CustomIconMap {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Returns the previous icon, if any.
    pub fn set(&mut self, name: impl Into<String>, data_url: impl Into<String>) -> Option<String> {
        self.0.insert(name.into(), data_url.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, BASE64_STANDARD.encode(bytes))
}

/// Best guess at an image MIME type from the leading magic bytes.
pub fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => Some("image/png"),
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [b'G', b'I', b'F', b'8', ..] => Some("image/gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let mut icons = CustomIconMap::default();
        assert!(icons.set("Hela", "data:image/png;base64,AA==").is_none());
        assert_eq!(icons.get("Hela"), Some("data:image/png;base64,AA=="));
        assert!(icons.set("Hela", "x").is_some());
        assert_eq!(icons.remove("Hela").as_deref(), Some("x"));
        assert!(icons.is_empty());
    }

    #[test]
    fn serializes_as_plain_object() {
        let mut icons = CustomIconMap::default();
        icons.set("Thor", "data:x");
        assert_eq!(serde_json::to_string(&icons).unwrap(), r#"{"Thor":"data:x"}"#);
    }

    #[test]
    fn data_url_and_sniffing() {
        assert_eq!(to_data_url("image/png", b"hi"), "data:image/png;base64,aGk=");
        assert_eq!(sniff_image_mime(&[0x89, b'P', b'N', b'G', 0x0D]), Some("image/png"));
        assert_eq!(sniff_image_mime(b"RIFF\0\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff_image_mime(b"text"), None);
    }
}

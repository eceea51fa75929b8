//! Messages of the `images.Manage` RPC service.

use serde::{Deserialize, Serialize};

/// An image as exchanged by `Fetch` and `Upload`.
///
/// Every field defaults to empty when absent from the request body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Image {
    /// Stable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// MIME type, e.g. `image/png`.
    pub content_type: String,
    /// Location of the image bytes.
    pub url: String,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_default_to_empty() {
        let Ok(image) = serde_json::from_str::<Image>(r#"{"id":"img-1"}"#) else {
            panic!("valid image json");
        };
        assert_eq!(image.id, "img-1");
        assert!(image.name.is_empty());
        assert!(image.url.is_empty());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let json = r#"{"id":"img-1","width":640}"#;
        assert!(serde_json::from_str::<Image>(json).is_ok());
    }
}

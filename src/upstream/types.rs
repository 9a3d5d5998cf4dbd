use serde::Deserialize;

use crate::error::Result;
use crate::pin::version::{normalize_tag, Version};

/// GitHub release metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
}

impl Release {
    /// The release version with any tag prefix removed.
    pub fn version(&self) -> Result<Version> {
        normalize_tag(&self.tag_name)?.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_parses_minimal_payload() {
        let release: Release = serde_json::from_str(r#"{"tag_name": "v0.135.0"}"#).unwrap();
        assert!(!release.draft);
        assert_eq!(release.html_url, None);
        assert_eq!(release.version().unwrap(), Version::new(0, 135, 0));
    }

    #[test]
    fn test_release_requires_tag_name() {
        assert!(serde_json::from_str::<Release>(r#"{"name": "v0.135.0"}"#).is_err());
    }

    #[test]
    fn test_release_with_unusable_tag() {
        let release: Release = serde_json::from_str(r#"{"tag_name": "nightly"}"#).unwrap();
        assert!(release.version().is_err());
    }
}

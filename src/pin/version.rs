use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// A dotted release version such as `0.134.0` or `0.135.0-rc.1`.
///
/// Ordering is numeric on `major.minor.patch`. A pre-release sorts before
/// the release with the same numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Option<String>,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: None,
        }
    }
}

/// Strip a release tag down to its version, e.g. `v0.135.0` or `rust-v1.2.3`.
pub fn normalize_tag(tag: &str) -> Result<String> {
    let tag = tag.trim();
    let start = tag
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| AppError::VersionParse(format!("tag `{tag}` contains no version")))?;
    Ok(tag[start..].to_string())
}

impl FromStr for Version {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim();
        let invalid = || AppError::VersionParse(format!("`{raw}` is not a release version"));

        // Build metadata never participates in ordering
        let without_build = raw.split_once('+').map_or(raw, |(v, _)| v);
        let (core, pre) = match without_build.split_once('-') {
            Some((core, pre)) if !pre.is_empty() => (core, Some(pre.to_string())),
            Some(_) => return Err(invalid()),
            None => (without_build, None),
        };

        let parts = core
            .split('.')
            .map(|p| p.parse::<u64>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>>>()?;

        let (major, minor, patch) = match parts.as_slice() {
            [major, minor] => (*major, *minor, 0),
            [major, minor, patch] => (*major, *minor, *patch),
            _ => return Err(invalid()),
        };

        Ok(Self {
            major,
            minor,
            patch,
            pre,
        })
    }
}

impl TryFrom<String> for Version {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_plain_release() {
        assert_eq!(v("0.134.0"), Version::new(0, 134, 0));
        assert_eq!(v(" 1.2.3 \n"), Version::new(1, 2, 3));
    }

    #[test]
    fn test_parse_two_components() {
        assert_eq!(v("0.134"), Version::new(0, 134, 0));
    }

    #[test]
    fn test_parse_prerelease_and_build_metadata() {
        let parsed = v("0.135.0-rc.1+extended");
        assert_eq!(parsed.pre.as_deref(), Some("rc.1"));
        assert_eq!(parsed.to_string(), "0.135.0-rc.1");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Version>().is_err());
        assert!("latest".parse::<Version>().is_err());
        assert!("1".parse::<Version>().is_err());
        assert!("1.2.3.4".parse::<Version>().is_err());
        assert!("1.2.3-".parse::<Version>().is_err());
        assert!("v1.2.3".parse::<Version>().is_err());
    }

    #[test]
    fn test_ordering_is_numeric_not_lexical() {
        // "0.99.0" > "0.135.0" as strings, but not as versions
        assert!(v("0.135.0") > v("0.99.0"));
        assert!(v("1.0.0") > v("0.999.999"));
        assert!(v("0.134.1") > v("0.134.0"));
    }

    #[test]
    fn test_prerelease_sorts_before_release() {
        assert!(v("0.135.0-rc.1") < v("0.135.0"));
        assert!(v("0.135.0-rc.1") > v("0.134.0"));
        assert!(v("0.135.0-rc.1") < v("0.135.0-rc.2"));
    }

    #[test]
    fn test_normalize_tag_strips_prefix() {
        assert_eq!(normalize_tag("v0.135.0").unwrap(), "0.135.0");
        assert_eq!(normalize_tag("rust-v1.2.3").unwrap(), "1.2.3");
        assert_eq!(normalize_tag("0.135.0").unwrap(), "0.135.0");
        assert!(normalize_tag("nightly").is_err());
    }

    #[test]
    fn test_serde_uses_string_form() {
        let json = serde_json::to_string(&v("0.135.0")).unwrap();
        assert_eq!(json, "\"0.135.0\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v("0.135.0"));
        assert!(serde_json::from_str::<Version>("\"nope\"").is_err());
    }
}

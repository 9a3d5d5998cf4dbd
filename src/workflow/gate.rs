use std::cmp::Ordering;

use crate::pin::version::Version;

/// What to do with a pinned/remote version pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    UpToDate,
    RemoteOlder,
    Upgrade,
}

/// Compare by version ordering so an older tag can never pass as an update.
pub fn decide(pinned: &Version, remote: &Version) -> Decision {
    match remote.cmp(pinned) {
        Ordering::Equal => Decision::UpToDate,
        Ordering::Less => Decision::RemoteOlder,
        Ordering::Greater => Decision::Upgrade,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_equal_versions_are_up_to_date() {
        assert_eq!(decide(&v("0.134.0"), &v("0.134.0")), Decision::UpToDate);
        assert_eq!(decide(&v("0.134"), &v("0.134.0")), Decision::UpToDate);
    }

    #[test]
    fn test_newer_remote_upgrades() {
        assert_eq!(decide(&v("0.134.0"), &v("0.135.0")), Decision::Upgrade);
        assert_eq!(decide(&v("0.99.0"), &v("0.100.0")), Decision::Upgrade);
    }

    #[test]
    fn test_lexically_different_but_older_remote_does_not_upgrade() {
        assert_eq!(decide(&v("0.135.0"), &v("0.99.9")), Decision::RemoteOlder);
        assert_eq!(decide(&v("0.135.0"), &v("0.135.0-rc.1")), Decision::RemoteOlder);
    }
}

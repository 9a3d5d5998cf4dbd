use serde::Deserialize;

/// Webhook event parsed from the payload based on the X-GitHub-Event header.
#[derive(Debug)]
pub enum WebhookEvent {
    Release(ReleaseEvent),
    Ping,
    Unsupported(String),
}

#[derive(Debug, Deserialize)]
pub struct ReleaseEvent {
    pub action: String,
    pub release: ReleasePayload,
    pub repository: RepositoryPayload,
}

#[derive(Debug, Deserialize)]
pub struct ReleasePayload {
    pub tag_name: String,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    pub html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RepositoryPayload {
    pub full_name: String,
}

impl ReleaseEvent {
    /// `published` fires for new releases, `released` when a pre-release is promoted.
    pub fn is_publication(&self) -> bool {
        matches!(self.action.as_str(), "published" | "released")
    }
}

impl WebhookEvent {
    pub fn parse(event_type: &str, payload: &[u8]) -> Result<Self, serde_json::Error> {
        match event_type {
            "release" => {
                let event: ReleaseEvent = serde_json::from_slice(payload)?;
                Ok(WebhookEvent::Release(event))
            }
            "ping" => Ok(WebhookEvent::Ping),
            other => Ok(WebhookEvent::Unsupported(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_release_event() {
        let payload = br#"{
            "action": "published",
            "release": {"tag_name": "v0.135.0", "draft": false, "prerelease": false,
                        "html_url": "https://github.com/gohugoio/hugo/releases/tag/v0.135.0"},
            "repository": {"full_name": "gohugoio/hugo", "id": 1}
        }"#;

        match WebhookEvent::parse("release", payload).unwrap() {
            WebhookEvent::Release(event) => {
                assert!(event.is_publication());
                assert_eq!(event.release.tag_name, "v0.135.0");
                assert_eq!(event.repository.full_name, "gohugoio/hugo");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_created_is_not_a_publication() {
        let payload = br#"{"action": "created", "release": {"tag_name": "v1.0.0"},
                           "repository": {"full_name": "a/b"}}"#;
        let WebhookEvent::Release(event) = WebhookEvent::parse("release", payload).unwrap() else {
            panic!("expected release event");
        };
        assert!(!event.is_publication());
    }

    #[test]
    fn test_other_events_are_unsupported() {
        assert!(matches!(
            WebhookEvent::parse("push", b"{}").unwrap(),
            WebhookEvent::Unsupported(t) if t == "push"
        ));
        assert!(matches!(WebhookEvent::parse("ping", b"{}").unwrap(), WebhookEvent::Ping));
    }

    #[test]
    fn test_malformed_release_payload_is_an_error() {
        assert!(WebhookEvent::parse("release", b"{\"action\": 1}").is_err());
    }
}

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;

use crate::config::GitHubAppConfig;
use crate::error::{AppError, Result};

#[derive(Debug, Serialize)]
struct JwtClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

/// Mint the short-lived RS256 JWT a GitHub App exchanges for an installation token.
pub fn generate_app_jwt(app: &GitHubAppConfig) -> Result<String> {
    let key_pem = std::fs::read(&app.private_key_path).map_err(|e| {
        AppError::Config(format!(
            "Failed to read private key at {}: {e}",
            app.private_key_path.display()
        ))
    })?;

    let encoding_key = EncodingKey::from_rsa_pem(&key_pem)
        .map_err(|e| AppError::Config(format!("Invalid RSA private key: {e}")))?;

    let now = chrono::Utc::now().timestamp();
    let claims = JwtClaims {
        iat: now - 60,      // clock drift allowance
        exp: now + 10 * 60, // GitHub's maximum
        iss: app.app_id.to_string(),
    };

    encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
        .map_err(|e| AppError::Config(format!("Failed to generate JWT: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_a_config_error() {
        let app = GitHubAppConfig {
            app_id: 1,
            private_key_path: "/nonexistent/key.pem".into(),
            installation_id: 2,
        };
        let err = generate_app_jwt(&app).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_garbage_key_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("key.pem");
        std::fs::write(&path, "not a key").unwrap();
        let app = GitHubAppConfig {
            app_id: 1,
            private_key_path: path,
            installation_id: 2,
        };
        assert!(generate_app_jwt(&app).is_err());
    }
}

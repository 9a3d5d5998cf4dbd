use std::path::{Path, PathBuf};

use reqwest::Client;

use crate::build::step::substitute;
use crate::error::{AppError, Result};
use crate::pin::version::Version;

/// Operating-system label used in release artifact names.
pub fn runner_os(override_os: Option<&str>) -> String {
    override_os.unwrap_or(std::env::consts::OS).to_string()
}

/// Architecture label used in release artifact names (Go naming).
pub fn runner_arch(override_arch: Option<&str>) -> String {
    if let Some(arch) = override_arch {
        return arch.to_string();
    }
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
    .to_string()
}

pub fn artifact_url(template: &str, version: &Version, os: &str, arch: &str) -> String {
    let version = version.to_string();
    substitute(
        template,
        &[("version", version.as_str()), ("os", os), ("arch", arch)],
    )
}

/// Download `url` into `dir`, naming the file after the last URL segment.
pub async fn download(client: &Client, url: &str, dir: &Path) -> Result<PathBuf> {
    let segment = url
        .split(['?', '#'])
        .next()
        .and_then(|u| u.rsplit('/').next())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Build(format!("Cannot derive artifact name from {url}")))?;
    let file_name = urlencoding::decode(segment)
        .map_err(|e| AppError::Build(format!("Invalid artifact name in {url}: {e}")))?
        .into_owned();
    if file_name.contains('/') || file_name == ".." {
        return Err(AppError::Build(format!("Refusing artifact name {file_name}")));
    }

    tracing::info!(url, "Downloading release artifact");

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::Build(format!(
            "Artifact download {url} returned {status}"
        )));
    }
    let bytes = response.bytes().await?;

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(file_name);
    tokio::fs::write(&path, &bytes).await?;

    tracing::info!(path = %path.display(), bytes = bytes.len(), "Artifact downloaded");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_artifact_url_for_hugo_deb() {
        let url = artifact_url(
            "https://github.com/gohugoio/hugo/releases/download/v{version}/hugo_extended_{version}_{os}-{arch}.deb",
            &Version::new(0, 135, 0),
            "linux",
            "amd64",
        );
        assert_eq!(
            url,
            "https://github.com/gohugoio/hugo/releases/download/v0.135.0/hugo_extended_0.135.0_linux-amd64.deb"
        );
    }

    #[test]
    fn test_runner_labels_respect_overrides() {
        assert_eq!(runner_os(Some("Linux")), "Linux");
        assert_eq!(runner_arch(Some("arm64")), "arm64");
        assert!(!runner_arch(None).is_empty());
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/download/hugo_0.135.0.deb"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"deb".to_vec()))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let url = format!("{}/download/hugo_0.135.0.deb", server.uri());
        let path = download(&Client::new(), &url, tmp.path()).await.unwrap();

        assert_eq!(path.file_name().unwrap(), "hugo_0.135.0.deb");
        assert_eq!(std::fs::read(&path).unwrap(), b"deb");
    }

    #[tokio::test]
    async fn test_download_not_found_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let url = format!("{}/download/missing.deb", server.uri());
        let err = download(&Client::new(), &url, tmp.path()).await.unwrap_err();
        assert!(matches!(err, AppError::Build(_)));
    }
}

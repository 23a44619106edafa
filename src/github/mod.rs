// src/github/mod.rs

//! Release resolution against the GitHub REST API
//!
//! Read-only: repository references are parsed locally, release metadata is
//! fetched and deserialized, and assets are streamed to disk. Nothing here
//! retries; failures go back to the caller as `TransportError`.

pub mod release;

pub use release::{Architecture, PackageType, Release, ReleaseAsset, RepoInfo};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::worker::{self, CancelToken, Progress, ProgressSink};
use regex::Regex;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

const DOWNLOAD_CHUNK: usize = 64 * 1024;

static URL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"github\.com/([^/]+)/([^/]+?)(?:\.git)?(?:/.*)?$").ok());
static SHORT_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^([^/]+)/([^/]+)$").ok());

/// Split a repository URL or `owner/repo` string into its two parts
///
/// Never touches the network.
pub fn parse_repo_reference(input: &str) -> Result<(String, String)> {
    let input = input.trim();

    for pattern in [&URL_PATTERN, &SHORT_PATTERN] {
        let Some(re) = LazyLock::force(pattern).as_ref() else {
            continue;
        };
        if let Some(caps) = re.captures(input) {
            let owner = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let repo = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            if !owner.is_empty() && !repo.is_empty() {
                return Ok((owner.to_string(), repo.to_string()));
            }
        }
    }

    Err(Error::ParseError(format!(
        "Could not parse GitHub repository from: {}",
        input
    )))
}

/// Blocking client for the release API
pub struct GitHubClient {
    client: Client,
    api_base: String,
}

impl GitHubClient {
    /// Create a client for `api_base`, optionally authenticated
    pub fn new(api_base: &str, token: Option<&str>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| Error::ParseError(format!("Invalid API token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .user_agent(concat!("autonomix/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.api_base, config.token.as_deref())
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Latest published release, or `None` when the repository has none
    pub fn fetch_latest_release(&self, owner: &str, repo: &str) -> Result<Option<Release>> {
        let url = format!("{}/repos/{}/{}/releases/latest", self.api_base, owner, repo);
        debug!("Fetching latest release from {}", url);

        let response = self.send(self.client.get(&url), &url)?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("No releases published for {}/{}", owner, repo);
            return Ok(None);
        }

        let release: Release = parse_json(check_status(response, &url)?, &url)?;
        debug!("Latest release of {}/{} is {}", owner, repo, release.tag_name);
        Ok(Some(release))
    }

    /// Every release, newest first as the API orders them
    ///
    /// Drafts are always dropped; prereleases only when `include_prerelease`
    /// is false.
    pub fn fetch_all_releases(
        &self,
        owner: &str,
        repo: &str,
        include_prerelease: bool,
    ) -> Result<Vec<Release>> {
        let url = format!("{}/repos/{}/{}/releases", self.api_base, owner, repo);
        debug!("Fetching releases from {}", url);

        let response = check_status(self.send(self.client.get(&url), &url)?, &url)?;
        let releases: Vec<Release> = parse_json(response, &url)?;

        Ok(releases
            .into_iter()
            .filter(|r| !r.draft)
            .filter(|r| include_prerelease || !r.is_prerelease)
            .collect())
    }

    /// Newest release honoring the prerelease preference
    pub fn fetch_newest_release(
        &self,
        owner: &str,
        repo: &str,
        include_prerelease: bool,
    ) -> Result<Option<Release>> {
        if include_prerelease {
            Ok(self.fetch_all_releases(owner, repo, true)?.into_iter().next())
        } else {
            self.fetch_latest_release(owner, repo)
        }
    }

    pub fn fetch_repo_info(&self, owner: &str, repo: &str) -> Result<RepoInfo> {
        let url = format!("{}/repos/{}/{}", self.api_base, owner, repo);
        let response = check_status(self.send(self.client.get(&url), &url)?, &url)?;
        parse_json(response, &url)
    }

    /// Stream an asset into `dest_dir/<asset.name>`
    ///
    /// Progress is reported after every chunk when the total size is known.
    /// A set `cancel` flag aborts between chunks and removes the partial
    /// file. A published SHA-256 digest is verified before returning.
    pub fn download_asset(
        &self,
        asset: &ReleaseAsset,
        dest_dir: &Path,
        progress: Option<&ProgressSink>,
        cancel: Option<&CancelToken>,
    ) -> Result<PathBuf> {
        let file_name = Path::new(&asset.name)
            .file_name()
            .ok_or_else(|| Error::ParseError(format!("Invalid asset name: {}", asset.name)))?;
        let dest_path = dest_dir.join(file_name);

        self.download_url(&asset.download_url, &dest_path, progress, cancel)?;

        if let Some(expected) = asset.sha256() {
            if let Err(e) = verify_checksum(&dest_path, expected) {
                let _ = fs::remove_file(&dest_path);
                return Err(e);
            }
        }

        Ok(dest_path)
    }

    /// Stream any URL to `dest_path` through a `.part` file
    pub fn download_url(
        &self,
        url: &str,
        dest_path: &Path,
        progress: Option<&ProgressSink>,
        cancel: Option<&CancelToken>,
    ) -> Result<()> {
        info!("Downloading {} to {}", url, dest_path.display());

        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut response = check_status(self.send(self.client.get(url), url)?, url)?;
        let total = response.content_length().unwrap_or(0);

        let mut part_name = dest_path.as_os_str().to_os_string();
        part_name.push(".part");
        let part_path = PathBuf::from(part_name);

        match stream_to_file(&mut response, &part_path, total, progress, cancel) {
            Ok(received) => {
                fs::rename(&part_path, dest_path)?;
                info!("Downloaded {} bytes to {}", received, dest_path.display());
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&part_path);
                Err(e)
            }
        }
    }

    fn send(&self, request: RequestBuilder, url: &str) -> Result<Response> {
        request
            .send()
            .map_err(|e| Error::TransportError(format!("Request to {} failed: {}", url, e)))
    }
}

fn stream_to_file(
    response: &mut Response,
    part_path: &Path,
    total: u64,
    progress: Option<&ProgressSink>,
    cancel: Option<&CancelToken>,
) -> Result<u64> {
    let mut file = File::create(part_path)?;
    let mut buf = vec![0u8; DOWNLOAD_CHUNK];
    let mut received: u64 = 0;

    loop {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            warn!("Download cancelled after {} bytes", received);
            return Err(Error::Cancelled);
        }

        let n = match response.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::TransportError(format!("Download interrupted: {}", e))),
        };

        file.write_all(&buf[..n])?;
        received += n as u64;

        if total > 0 {
            worker::report(progress, Progress::Downloading { received, total });
        }
    }

    file.flush()?;
    Ok(received)
}

fn check_status(response: Response, url: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    Err(Error::TransportError(format!(
        "HTTP {} from {}: {}",
        status,
        url,
        body.trim()
    )))
}

fn parse_json<T: DeserializeOwned>(response: Response, url: &str) -> Result<T> {
    response
        .json()
        .map_err(|e| Error::TransportError(format!("Invalid JSON from {}: {}", url, e)))
}

/// Verify file checksum matches expected value
fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    use sha2::{Digest, Sha256};

    debug!("Verifying checksum for {}", path.display());

    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;

    let actual = format!("{:x}", hasher.finalize());

    if !actual.eq_ignore_ascii_case(expected) {
        return Err(Error::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        });
    }

    debug!("Checksum verified: {}", expected);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    const RELEASE_JSON: &str = r#"{
        "tag_name": "v1.0",
        "name": "First",
        "published_at": "2024-05-01T00:00:00Z",
        "body": "",
        "prerelease": false,
        "draft": false,
        "html_url": "https://github.com/octo/tool/releases/tag/v1.0",
        "assets": [{
            "name": "tool_1.0_amd64.deb",
            "browser_download_url": "https://example.invalid/tool_1.0_amd64.deb",
            "size": 4,
            "content_type": "application/octet-stream"
        }]
    }"#;

    #[test]
    fn test_parse_repo_reference() {
        let cases = [
            ("https://github.com/octo/tool", ("octo", "tool")),
            ("https://github.com/octo/tool.git", ("octo", "tool")),
            ("https://github.com/octo/tool/releases/latest", ("octo", "tool")),
            ("git@github.com/octo/tool.git", ("octo", "tool")),
            ("octo/tool", ("octo", "tool")),
            ("  octo/tool  ", ("octo", "tool")),
        ];
        for (input, (owner, repo)) in cases {
            let parsed = parse_repo_reference(input).unwrap();
            assert_eq!(parsed, (owner.to_string(), repo.to_string()), "{}", input);
        }
    }

    #[test]
    fn test_parse_repo_reference_rejects_garbage() {
        for input in ["", "tool", "https://gitlab.com/octo", "a/b/c"] {
            assert!(
                matches!(parse_repo_reference(input), Err(Error::ParseError(_))),
                "{}",
                input
            );
        }
    }

    #[test]
    fn test_latest_release_sends_headers() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/repos/octo/tool/releases/latest")
            .match_header("accept", "application/vnd.github+json")
            .match_header("x-github-api-version", "2022-11-28")
            .match_header("authorization", "Bearer sekrit")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(RELEASE_JSON)
            .create();

        let client = GitHubClient::new(&server.url(), Some("sekrit")).unwrap();
        let release = client.fetch_latest_release("octo", "tool").unwrap().unwrap();

        mock.assert();
        assert_eq!(release.version(), "1.0");
        assert_eq!(release.title(), "First");
    }

    #[test]
    fn test_latest_release_404_is_none() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/repos/octo/empty/releases/latest")
            .with_status(404)
            .with_body(r#"{"message":"Not Found"}"#)
            .create();

        let client = GitHubClient::new(&server.url(), None).unwrap();
        assert!(client.fetch_latest_release("octo", "empty").unwrap().is_none());
    }

    #[test]
    fn test_server_error_is_transport_error() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/repos/octo/tool/releases/latest")
            .with_status(500)
            .with_body("oops")
            .create();

        let client = GitHubClient::new(&server.url(), None).unwrap();
        let err = client.fetch_latest_release("octo", "tool").unwrap_err();
        match err {
            Error::TransportError(msg) => assert!(msg.contains("500") && msg.contains("oops")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_all_releases_filters_prerelease_and_draft() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/repos/octo/tool/releases")
            .with_status(200)
            .with_body(
                r#"[
                    {"tag_name": "v3.0-rc1", "prerelease": true, "assets": []},
                    {"tag_name": "v2.9", "draft": true, "assets": []},
                    {"tag_name": "v2.0", "assets": []}
                ]"#,
            )
            .expect(3)
            .create();

        let client = GitHubClient::new(&server.url(), None).unwrap();

        let stable = client.fetch_all_releases("octo", "tool", false).unwrap();
        assert_eq!(stable.len(), 1);
        assert_eq!(stable[0].version(), "2.0");

        let all = client.fetch_all_releases("octo", "tool", true).unwrap();
        let versions: Vec<String> = all.iter().map(|r| r.version()).collect();
        assert_eq!(versions, vec!["3.0-rc1", "2.0"]);

        let newest = client.fetch_newest_release("octo", "tool", true).unwrap().unwrap();
        assert_eq!(newest.version(), "3.0-rc1");
    }

    #[test]
    fn test_fetch_repo_info() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/repos/octo/tool")
            .with_status(200)
            .with_body(
                r#"{"name": "tool", "full_name": "octo/tool",
                    "description": "A tool", "html_url": "https://github.com/octo/tool"}"#,
            )
            .create();

        let client = GitHubClient::new(&server.url(), None).unwrap();
        let info = client.fetch_repo_info("octo", "tool").unwrap();
        assert_eq!(info.full_name, "octo/tool");
        assert_eq!(info.description.as_deref(), Some("A tool"));
    }

    fn asset_for(server: &mockito::Server, name: &str, digest: Option<&str>) -> ReleaseAsset {
        ReleaseAsset {
            name: name.to_string(),
            download_url: format!("{}/download/{}", server.url(), name),
            size_bytes: 0,
            content_type: String::new(),
            digest: digest.map(str::to_string),
        }
    }

    #[test]
    fn test_download_reports_monotonic_progress() {
        let mut server = mockito::Server::new();
        let body = vec![7u8; DOWNLOAD_CHUNK * 2 + 10];
        server
            .mock("GET", "/download/tool.AppImage")
            .with_status(200)
            .with_body(body.clone())
            .create();

        let dir = tempfile::tempdir().unwrap();
        let client = GitHubClient::new(&server.url(), None).unwrap();
        let (tx, rx) = mpsc::channel();
        let asset = asset_for(&server, "tool.AppImage", None);

        let path = client.download_asset(&asset, dir.path(), Some(&tx), None).unwrap();
        drop(tx);

        assert_eq!(fs::read(&path).unwrap(), body);
        assert!(!dir.path().join("tool.AppImage.part").exists());

        let mut last = 0;
        let mut events = 0;
        for event in rx {
            if let Progress::Downloading { received, total } = event {
                assert!(received >= last);
                assert_eq!(total, body.len() as u64);
                last = received;
                events += 1;
            }
        }
        assert!(events > 0);
        assert_eq!(last, body.len() as u64);
    }

    #[test]
    fn test_download_without_content_length() {
        let mut server = mockito::Server::new();
        let body = vec![3u8; DOWNLOAD_CHUNK + 100];
        let chunks = body.clone();
        server
            .mock("GET", "/download/tool.deb")
            .with_status(200)
            .with_chunked_body(move |w| w.write_all(&chunks))
            .create();

        let dir = tempfile::tempdir().unwrap();
        let client = GitHubClient::new(&server.url(), None).unwrap();
        let (tx, rx) = mpsc::channel();
        let asset = asset_for(&server, "tool.deb", None);

        let path = client.download_asset(&asset, dir.path(), Some(&tx), None).unwrap();
        drop(tx);

        assert_eq!(fs::read(&path).unwrap(), body);
        assert_eq!(rx.iter().count(), 0);
    }

    #[test]
    fn test_download_cancelled_removes_partial() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/download/tool.deb")
            .with_status(200)
            .with_body(vec![1u8; 1024])
            .create();

        let dir = tempfile::tempdir().unwrap();
        let client = GitHubClient::new(&server.url(), None).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let asset = asset_for(&server, "tool.deb", None);
        let err = client
            .download_asset(&asset, dir.path(), None, Some(&cancel))
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert!(!dir.path().join("tool.deb").exists());
        assert!(!dir.path().join("tool.deb.part").exists());
    }

    #[test]
    fn test_download_checksum_mismatch() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/download/tool.rpm")
            .with_status(200)
            .with_body("abc")
            .create();

        let dir = tempfile::tempdir().unwrap();
        let client = GitHubClient::new(&server.url(), None).unwrap();

        // sha256("abc")
        let good = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        let asset = asset_for(&server, "tool.rpm", Some(&format!("sha256:{}", good)));
        assert!(client.download_asset(&asset, dir.path(), None, None).is_ok());

        let asset = asset_for(&server, "tool.rpm", Some("sha256:00"));
        let err = client.download_asset(&asset, dir.path(), None, None).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
        assert!(!dir.path().join("tool.rpm").exists());
    }
}

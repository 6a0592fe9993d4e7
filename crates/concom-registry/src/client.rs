//! HTTP artifact client.
//!
//! Artifacts are served by the registry as gzipped tarballs at
//! `/v1/artifacts/<path>/<tag>/archive`. Executable pulls pass the target
//! platform as query parameters so the registry can hand back the right
//! build; policy bundles are platform-neutral. The archive is unpacked
//! into a temporary sibling of the destination and renamed into place, so
//! a torn download never leaves a half-populated cache entry.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{ResolveError, ResolveResult};
use crate::reference::RegistryRef;

/// Timeout applied to one artifact download.
const PULL_TIMEOUT: Duration = Duration::from_secs(120);

const USER_AGENT_VALUE: &str = concat!("concom-registry/", env!("CARGO_PKG_VERSION"));

/// Target platform tuple for executable pulls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    /// The platform this agent is running on.
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Allow plain-HTTP registries beyond loopback hosts.
    pub allow_http: bool,
}

/// Pulls artifact archives from a registry host.
#[derive(Debug, Clone)]
pub struct ArtifactClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl ArtifactClient {
    pub fn new(config: ClientConfig) -> ResolveResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(PULL_TIMEOUT)
            .user_agent(USER_AGENT_VALUE)
            .build()
            .map_err(|e| ResolveError::FetchFailed {
                reference: String::new(),
                reason: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { client, config })
    }

    /// Pull the referenced artifact and unpack it into `dest`.
    pub async fn pull(
        &self,
        reference: &RegistryRef,
        dest: &Path,
        platform: Option<&Platform>,
    ) -> ResolveResult<()> {
        let url = self.archive_url(reference, platform);
        debug!(url = %url, dest = %dest.display(), "pulling artifact");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| fetch_failed(reference, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_failed(
                reference,
                format!("registry answered {status}"),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| fetch_failed(reference, e.to_string()))?;

        unpack_archive(reference, body.to_vec(), dest).await?;

        info!(reference = %reference, dest = %dest.display(), "artifact pulled");
        Ok(())
    }

    fn archive_url(&self, reference: &RegistryRef, platform: Option<&Platform>) -> String {
        let scheme = if self.config.allow_http || is_loopback(&reference.host) {
            "http"
        } else {
            "https"
        };
        let mut url = format!(
            "{scheme}://{}/v1/artifacts/{}/{}/archive",
            reference.host, reference.path, reference.tag
        );
        if let Some(platform) = platform {
            url.push_str(&format!("?os={}&arch={}", platform.os, platform.arch));
        }
        url
    }
}

fn is_loopback(host: &str) -> bool {
    let name = host.split(':').next().unwrap_or(host);
    name == "localhost" || name == "127.0.0.1"
}

fn fetch_failed(reference: &RegistryRef, reason: String) -> ResolveError {
    ResolveError::FetchFailed {
        reference: reference.to_string(),
        reason,
    }
}

/// Unpack a gzipped tarball next to `dest` and rename it into place.
async fn unpack_archive(reference: &RegistryRef, body: Vec<u8>, dest: &Path) -> ResolveResult<()> {
    let parent = dest
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    tokio::fs::create_dir_all(&parent)
        .await
        .map_err(|e| archive_failed(reference, format!("creating {}: {e}", parent.display())))?;

    let reference = reference.clone();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let staging = tempfile::tempdir_in(&parent)
            .map_err(|e| archive_failed(&reference, format!("creating staging dir: {e}")))?;

        let decoder = flate2::read::GzDecoder::new(body.as_slice());
        let mut archive = tar::Archive::new(decoder);
        archive
            .unpack(staging.path())
            .map_err(|e| archive_failed(&reference, e.to_string()))?;

        // Replace any previous content atomically.
        if dest.exists() {
            std::fs::remove_dir_all(&dest)
                .map_err(|e| archive_failed(&reference, format!("clearing {}: {e}", dest.display())))?;
        }
        std::fs::rename(staging.keep(), &dest)
            .map_err(|e| archive_failed(&reference, format!("moving into {}: {e}", dest.display())))
    })
    .await
    .map_err(|e| ResolveError::Archive {
        reference: String::new(),
        reason: format!("unpack task failed: {e}"),
    })?
}

fn archive_failed(reference: &RegistryRef, reason: String) -> ResolveError {
    ResolveError::Archive {
        reference: reference.to_string(),
        reason,
    }
}

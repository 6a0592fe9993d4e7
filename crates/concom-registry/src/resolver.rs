//! The artifact resolver.
//!
//! Resolution order, first match wins:
//!
//! 1. the source names an existing readable file: use it as-is;
//! 2. reading it failed for a reason other than "not found": IO error;
//! 3. the source parses strictly as `repository:tag`: pull into the
//!    cache and return the kind-specific subpath;
//! 4. anything else: unknown reference shape.
//!
//! Within one agent run a source resolves at most once: later calls hit
//! the resolved map, and concurrent calls for the same source are
//! serialized by a per-source lock so a pull cannot race itself.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::client::{ArtifactClient, ClientConfig, Platform};
use crate::error::{ResolveError, ResolveResult};
use crate::reference::RegistryRef;
use crate::report::{ReportStep, ResolveReport};
use crate::{PLUGIN_CACHE_DIR, POLICY_CACHE_DIR};

/// What kind of artifact a source names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// A plugin executable; pulled for this agent's platform.
    Plugin,
    /// A policy bundle; platform-neutral.
    Policy,
}

impl ArtifactKind {
    fn cache_dir(self) -> &'static str {
        match self {
            Self::Plugin => PLUGIN_CACHE_DIR,
            Self::Policy => POLICY_CACHE_DIR,
        }
    }

    /// Entry inside a pulled artifact directory that callers receive.
    fn entry(self) -> &'static str {
        match self {
            Self::Plugin => "plugin",
            Self::Policy => "policies",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::Plugin => "plugin",
            Self::Policy => "policy bundle",
        }
    }
}

/// Outcome of one resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub path: PathBuf,
    pub report: ResolveReport,
}

/// Resolves artifact sources to local paths, with a per-run cache.
pub struct ArtifactResolver {
    base_dir: PathBuf,
    client: ArtifactClient,
    platform: Platform,
    resolved: RwLock<HashMap<String, PathBuf>>,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ArtifactResolver {
    /// A resolver caching under `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> ResolveResult<Self> {
        Ok(Self {
            base_dir: base_dir.into(),
            client: ArtifactClient::new(ClientConfig::default())?,
            platform: Platform::current(),
            resolved: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    /// A resolver caching under the user's home directory.
    pub fn with_default_base() -> ResolveResult<Self> {
        let base = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(base)
    }

    /// Override the platform used for executable pulls.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Resolve a source string to a local path.
    pub async fn resolve(&self, source: &str, kind: ArtifactKind) -> ResolveResult<Resolution> {
        if let Some(path) = self.resolved.read().await.get(source) {
            let mut report = ResolveReport::new(kind.describe(), source);
            report.push(ReportStep::new(
                "Cache hit",
                format!("{} already resolved to {}", kind.describe(), path.display()),
            ));
            return Ok(Resolution {
                path: path.clone(),
                report,
            });
        }

        // One pull per source at a time; losers of the race see the
        // winner's entry when they re-check.
        let gate = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight
                .entry(source.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = gate.lock().await;

        if let Some(path) = self.resolved.read().await.get(source) {
            let mut report = ResolveReport::new(kind.describe(), source);
            report.push(ReportStep::new(
                "Cache hit",
                format!("{} already resolved to {}", kind.describe(), path.display()),
            ));
            return Ok(Resolution {
                path: path.clone(),
                report,
            });
        }

        let resolution = self.resolve_uncached(source, kind).await?;
        self.resolved
            .write()
            .await
            .insert(source.to_string(), resolution.path.clone());
        Ok(resolution)
    }

    async fn resolve_uncached(&self, source: &str, kind: ArtifactKind) -> ResolveResult<Resolution> {
        let mut report = ResolveReport::new(kind.describe(), source);
        debug!(source, kind = kind.describe(), "checking for source");

        match tokio::fs::File::open(source).await {
            Ok(_) => {
                debug!(source, "found source locally, using local file");
                report.push(ReportStep::new(
                    "Found locally",
                    format!("{} found locally at {source}", kind.describe()),
                ));
                return Ok(Resolution {
                    path: PathBuf::from(source),
                    report,
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                report.push(ReportStep::new(
                    "Read error",
                    format!("error reading {source}: {err}"),
                ));
                return Err(ResolveError::Io {
                    path: source.to_string(),
                    source: err,
                });
            }
        }

        let reference = RegistryRef::parse(source)?;
        report.push(ReportStep::new(
            "Registry reference",
            format!("source parses as registry reference {reference}"),
        ));

        let dest = self
            .base_dir
            .join(kind.cache_dir())
            .join(&reference.path)
            .join(&reference.tag);
        let entry = dest.join(kind.entry());

        if entry_exists(&entry).await {
            debug!(source, entry = %entry.display(), "reusing previously pulled artifact");
            report.push(ReportStep::new(
                "Reused",
                format!("previously pulled artifact reused at {}", entry.display()),
            ));
            return Ok(Resolution { path: entry, report });
        }

        let platform = match kind {
            ArtifactKind::Plugin => Some(&self.platform),
            ArtifactKind::Policy => None,
        };
        self.client.pull(&reference, &dest, platform).await?;

        if !entry_exists(&entry).await {
            return Err(ResolveError::MissingEntry {
                reference: reference.to_string(),
                expected: kind.entry().to_string(),
            });
        }

        report.push(ReportStep::new(
            "Downloaded",
            format!("downloaded artifact to destination {}", entry.display()),
        ));
        Ok(Resolution { path: entry, report })
    }

    /// Look up an already-resolved source without touching the network.
    pub async fn lookup(&self, source: &str) -> Option<PathBuf> {
        self.resolved.read().await.get(source).cloned()
    }
}

async fn entry_exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_local_file_resolves_to_itself() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"#!/bin/sh\n").unwrap();
        let source = file.path().to_str().unwrap().to_string();

        let resolver = ArtifactResolver::new(tempfile::tempdir().unwrap().path()).unwrap();
        let resolution = resolver.resolve(&source, ArtifactKind::Plugin).await.unwrap();
        assert_eq!(resolution.path, file.path());
        assert!(resolution
            .report
            .steps
            .iter()
            .any(|s| s.title == "Found locally"));
    }

    #[tokio::test]
    async fn test_unknown_shape_is_rejected() {
        let resolver = ArtifactResolver::new(tempfile::tempdir().unwrap().path()).unwrap();
        let err = resolver
            .resolve("/does/not/exist/plugin", ArtifactKind::Plugin)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::UnknownRefShape { .. }));
    }

    #[tokio::test]
    async fn test_second_resolution_is_a_cache_hit() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"bundle").unwrap();
        let source = file.path().to_str().unwrap().to_string();

        let resolver = ArtifactResolver::new(tempfile::tempdir().unwrap().path()).unwrap();
        let first = resolver.resolve(&source, ArtifactKind::Policy).await.unwrap();
        let second = resolver.resolve(&source, ArtifactKind::Policy).await.unwrap();
        assert_eq!(first.path, second.path);
        assert!(second.report.steps.iter().any(|s| s.title == "Cache hit"));
        assert_eq!(resolver.lookup(&source).await, Some(first.path));
    }
}

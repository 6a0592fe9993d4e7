//! Strict registry reference parsing.
//!
//! A registry reference is `repository:tag`, where the repository begins
//! with an explicit registry host (`registry.example`, `localhost:5000`)
//! followed by one or more path segments. The parse is deterministic and
//! strict: the resolver has already ruled out local files before it runs,
//! and anything this parser rejects is an unknown reference shape.

use crate::error::{ResolveError, ResolveResult};

/// A parsed `repository:tag` registry reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryRef {
    /// Registry host, possibly with a port (`registry.example:5000`).
    pub host: String,
    /// Repository path below the host (`org/ssh-plugin`).
    pub path: String,
    /// Tag identifying the artifact version.
    pub tag: String,
}

impl RegistryRef {
    /// Parse a source string as a strict registry reference.
    pub fn parse(source: &str) -> ResolveResult<Self> {
        let reject = || ResolveError::UnknownRefShape {
            reference: source.to_string(),
        };

        // The tag is everything after the last colon, which must come
        // after the last path separator (a colon before that is a port).
        let colon = source.rfind(':').ok_or_else(reject)?;
        let (repository, tag) = (&source[..colon], &source[colon + 1..]);
        if repository.is_empty() || !is_valid_tag(tag) {
            return Err(reject());
        }
        if let Some(slash) = source.rfind('/') {
            if slash > colon {
                return Err(reject());
            }
        }

        let mut segments = repository.split('/');
        let host = segments.next().ok_or_else(reject)?;
        if !is_registry_host(host) {
            return Err(reject());
        }

        let path_segments: Vec<&str> = segments.collect();
        if path_segments.is_empty() || !path_segments.iter().all(|s| is_valid_path_segment(s)) {
            return Err(reject());
        }

        Ok(Self {
            host: host.to_string(),
            path: path_segments.join("/"),
            tag: tag.to_string(),
        })
    }

    /// The repository with its host, as written in the source.
    pub fn repository(&self) -> String {
        format!("{}/{}", self.host, self.path)
    }
}

impl std::fmt::Display for RegistryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}:{}", self.host, self.path, self.tag)
    }
}

/// A host is explicit: it contains a dot or a port, or is `localhost`.
fn is_registry_host(host: &str) -> bool {
    if host.is_empty() {
        return false;
    }
    let (name, port) = match host.split_once(':') {
        Some((name, port)) => (name, Some(port)),
        None => (host, None),
    };
    if let Some(port) = port {
        if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
    }
    let name_ok = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-');
    name_ok && (name.contains('.') || port.is_some() || name == "localhost")
}

fn is_valid_path_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'-' | b'_' | b'.'))
}

fn is_valid_tag(tag: &str) -> bool {
    if tag.is_empty() || tag.len() > 128 {
        return false;
    }
    let mut bytes = tag.bytes();
    let first = bytes.next().unwrap_or(b'-');
    if !(first.is_ascii_alphanumeric() || first == b'_') {
        return false;
    }
    tag.bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_path_tag() {
        let parsed = RegistryRef::parse("registry.example/org/ssh-plugin:v1.2.0").unwrap();
        assert_eq!(parsed.host, "registry.example");
        assert_eq!(parsed.path, "org/ssh-plugin");
        assert_eq!(parsed.tag, "v1.2.0");
        assert_eq!(parsed.repository(), "registry.example/org/ssh-plugin");
    }

    #[test]
    fn test_parse_host_with_port() {
        let parsed = RegistryRef::parse("localhost:5000/ssh-plugin:latest").unwrap();
        assert_eq!(parsed.host, "localhost:5000");
        assert_eq!(parsed.path, "ssh-plugin");
        assert_eq!(parsed.tag, "latest");
    }

    #[test]
    fn test_parse_ip_host_with_port() {
        let parsed = RegistryRef::parse("127.0.0.1:39999/policies/ssh:v1").unwrap();
        assert_eq!(parsed.host, "127.0.0.1:39999");
        assert_eq!(parsed.path, "policies/ssh");
    }

    #[test]
    fn test_rejects_missing_tag() {
        // The port colon must not be mistaken for a tag separator.
        assert!(RegistryRef::parse("registry.example:5000/repo").is_err());
        assert!(RegistryRef::parse("registry.example/repo").is_err());
    }

    #[test]
    fn test_rejects_bare_name() {
        assert!(RegistryRef::parse("ssh-plugin:v1").is_err());
        assert!(RegistryRef::parse("/usr/local/bin/plugin").is_err());
        assert!(RegistryRef::parse("./plugin").is_err());
    }

    #[test]
    fn test_rejects_hostless_path() {
        assert!(RegistryRef::parse("org/ssh-plugin:v1").is_err());
    }

    #[test]
    fn test_rejects_empty_and_invalid_tags() {
        assert!(RegistryRef::parse("registry.example/repo:").is_err());
        assert!(RegistryRef::parse("registry.example/repo:-bad").is_err());
        assert!(RegistryRef::parse("registry.example/repo:has space").is_err());
    }

    #[test]
    fn test_rejects_uppercase_path() {
        assert!(RegistryRef::parse("registry.example/Org/Plugin:v1").is_err());
    }
}

//! Upstream destination identity.

use std::hash::{Hash, Hasher};

use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("url '{0}' has no host")]
    MissingHost(String),
    #[error("url '{0}' has no port and its scheme has no default")]
    MissingPort(String),
}

/// A logical upstream destination: scheme, host and port.
///
/// Scheme and host are lowercased on construction. Two keys are equal when
/// their canonical `scheme://host:port` forms are equal.
#[derive(Debug, Clone)]
pub struct RouteKey {
    scheme: String,
    host: String,
    port: u16,
    canonical: String,
}

impl RouteKey {
    pub fn new(scheme: &str, host: &str, port: u16) -> Self {
        let scheme = scheme.to_ascii_lowercase();
        let host = host.to_ascii_lowercase();
        let canonical = format!("{scheme}://{host}:{port}");
        Self {
            scheme,
            host,
            port,
            canonical,
        }
    }

    /// Derive the route of an upstream URL. Path, query and credentials are ignored.
    pub fn from_url(url: &Url) -> Result<Self, RouteError> {
        let host = url
            .host_str()
            .ok_or_else(|| RouteError::MissingHost(url.to_string()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| RouteError::MissingPort(url.to_string()))?;
        Ok(Self::new(url.scheme(), host, port))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn as_str(&self) -> &str {
        &self.canonical
    }
}

impl PartialEq for RouteKey {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for RouteKey {}

impl Hash for RouteKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl std::fmt::Display for RouteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_form_is_case_insensitive() {
        let a = RouteKey::new("HTTP", "Backend.Local", 8080);
        let b = RouteKey::new("http", "backend.local", 8080);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "http://backend.local:8080");
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn port_and_scheme_distinguish_routes() {
        let plain = RouteKey::new("http", "api", 80);
        assert_ne!(plain, RouteKey::new("http", "api", 81));
        assert_ne!(plain, RouteKey::new("https", "api", 80));
    }

    #[test]
    fn url_uses_default_port() {
        let url = Url::parse("https://Example.com/v1/items?x=1").unwrap();
        let route = RouteKey::from_url(&url).unwrap();
        assert_eq!(route.as_str(), "https://example.com:443");
        assert_eq!(route.port(), 443);
    }

    #[test]
    fn url_without_default_port_is_rejected() {
        let url = Url::parse("redis://cache").unwrap();
        assert!(matches!(
            RouteKey::from_url(&url),
            Err(RouteError::MissingPort(_))
        ));
    }
}

//! Status channel address derivation.
//!
//! The channel URL is `<scheme>://<host>/api/v1/ws`, where the scheme follows
//! the security of the origin the client was loaded from (`wss` for secure,
//! `ws` otherwise) and the host is the origin's host unless an override is
//! configured.

use anidl_core::prelude::*;
use url::Url;

/// Fixed, versioned path of the daemon's event stream.
pub const STATUS_CHANNEL_PATH: &str = "/api/v1/ws";

/// Scheme and host of the origin the client runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOrigin {
    pub secure: bool,
    /// `host[:port]`
    pub host: String,
}

impl PageOrigin {
    pub fn new(secure: bool, host: impl Into<String>) -> Self {
        Self {
            secure,
            host: host.into(),
        }
    }

    /// Build an origin from an `http(s)://` or `ws(s)://` URL.
    pub fn from_url(raw: &str) -> Result<Self> {
        let url = Url::parse(raw)
            .map_err(|e| Error::invalid_address(format!("'{}': {}", raw, e)))?;
        let secure = match url.scheme() {
            "https" | "wss" => true,
            "http" | "ws" => false,
            other => {
                return Err(Error::invalid_address(format!(
                    "'{}': unsupported scheme '{}'",
                    raw, other
                )))
            }
        };
        Ok(Self {
            secure,
            host: host_with_port(&url, raw)?,
        })
    }

    fn ws_scheme(&self) -> &'static str {
        if self.secure {
            "wss"
        } else {
            "ws"
        }
    }
}

/// Capability that reports the current origin.
///
/// Injected into [`StatusChannelClient`](super::StatusChannelClient) so the
/// address can be derived without ambient global state.
pub trait AddressResolver: Send + Sync {
    fn origin(&self) -> PageOrigin;
}

/// Resolver that always reports the same origin, typically built from config.
#[derive(Debug, Clone)]
pub struct StaticOrigin(PageOrigin);

impl StaticOrigin {
    pub fn new(origin: PageOrigin) -> Self {
        Self(origin)
    }

    pub fn from_url(raw: &str) -> Result<Self> {
        PageOrigin::from_url(raw).map(Self)
    }
}

impl AddressResolver for StaticOrigin {
    fn origin(&self) -> PageOrigin {
        self.0.clone()
    }
}

/// Derive the status channel URL.
///
/// `host_override` may be a bare `host[:port]` or a full URL; only its host
/// and port are used. An empty override counts as absent.
pub fn status_channel_url(origin: &PageOrigin, host_override: Option<&str>) -> Result<String> {
    let host = match host_override.map(str::trim).filter(|h| !h.is_empty()) {
        Some(raw) => override_host(raw)?,
        None => origin.host.clone(),
    };

    if host.is_empty() {
        return Err(Error::invalid_address("origin has no host"));
    }

    Ok(format!(
        "{}://{}{}",
        origin.ws_scheme(),
        host,
        STATUS_CHANNEL_PATH
    ))
}

fn override_host(raw: &str) -> Result<String> {
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("ws://{}", raw.trim_end_matches('/'))
    };
    let url = Url::parse(&candidate)
        .map_err(|e| Error::invalid_address(format!("host override '{}': {}", raw, e)))?;
    host_with_port(&url, raw)
}

fn host_with_port(url: &Url, raw: &str) -> Result<String> {
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| Error::invalid_address(format!("'{}' has no host", raw)))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_origin_uses_ws() {
        let origin = PageOrigin::new(false, "localhost:8091");
        assert_eq!(
            status_channel_url(&origin, None).unwrap(),
            "ws://localhost:8091/api/v1/ws"
        );
    }

    #[test]
    fn test_secure_origin_uses_wss() {
        let origin = PageOrigin::new(true, "anime.example.com");
        assert_eq!(
            status_channel_url(&origin, None).unwrap(),
            "wss://anime.example.com/api/v1/ws"
        );
    }

    #[test]
    fn test_override_host_keeps_origin_scheme() {
        let origin = PageOrigin::new(true, "page.example.com");
        assert_eq!(
            status_channel_url(&origin, Some("10.0.0.5:8091")).unwrap(),
            "wss://10.0.0.5:8091/api/v1/ws"
        );
    }

    #[test]
    fn test_override_full_url_uses_only_host_and_port() {
        let origin = PageOrigin::new(false, "page.example.com");
        assert_eq!(
            status_channel_url(&origin, Some("https://nas.local:9000/some/path")).unwrap(),
            "ws://nas.local:9000/api/v1/ws"
        );
    }

    #[test]
    fn test_empty_override_falls_back_to_origin_host() {
        let origin = PageOrigin::new(false, "localhost:8091");
        assert_eq!(
            status_channel_url(&origin, Some("  ")).unwrap(),
            "ws://localhost:8091/api/v1/ws"
        );
    }

    #[test]
    fn test_origin_from_url() {
        let origin = PageOrigin::from_url("http://localhost:8091").unwrap();
        assert_eq!(origin, PageOrigin::new(false, "localhost:8091"));

        let origin = PageOrigin::from_url("https://example.com/ui/").unwrap();
        assert_eq!(origin, PageOrigin::new(true, "example.com"));
    }

    #[test]
    fn test_origin_from_url_rejects_unknown_scheme() {
        let err = PageOrigin::from_url("ftp://example.com").unwrap_err();
        assert!(matches!(err, Error::InvalidAddress { .. }));
    }

    #[test]
    fn test_origin_without_host_is_rejected() {
        let origin = PageOrigin::new(false, "");
        assert!(status_channel_url(&origin, None).is_err());
    }

    #[test]
    fn test_static_origin_resolver() {
        let resolver = StaticOrigin::from_url("wss://daemon.lan").unwrap();
        assert_eq!(resolver.origin(), PageOrigin::new(true, "daemon.lan"));
    }
}

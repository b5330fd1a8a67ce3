//! Server capability discovery.
//!
//! Before dialing, the client asks `GET <base>/info` which transports and
//! properties the server supports.
//!
//! # Format
//!
//! ```json
//! {
//!   "websocket": true,
//!   "cookie_needed": false,
//!   "origins": ["*:*"],
//!   "entropy": 1234567890
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// ServerInfo
// ============================================================================

/// Capabilities reported by a server's `/info` endpoint.
///
/// Missing fields decode to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerInfo {
    /// Whether the websocket transport is available.
    pub websocket: bool,

    /// Whether the server requires a session cookie.
    pub cookie_needed: bool,

    /// Origins the server accepts.
    pub origins: Vec<String>,

    /// Server supplied entropy.
    pub entropy: i64,
}

// ============================================================================
// Address Normalization
// ============================================================================

/// Normalizes a base address for HTTP use.
///
/// `ws` becomes `http`; `wss` and a missing scheme become `https`.
///
/// # Errors
///
/// - [`Error::NoAddress`] if `address` is empty
/// - [`Error::InvalidAddress`] if it cannot be parsed
pub fn http_base(address: &str) -> Result<Url> {
    if address.is_empty() {
        return Err(Error::NoAddress);
    }

    let parsed = if address.contains("://") {
        Url::parse(address)
    } else {
        Url::parse(&format!("https://{address}"))
    };
    let mut url = parsed.map_err(|e| Error::invalid_address(address, e.to_string()))?;

    let scheme = match url.scheme() {
        "ws" => Some("http"),
        "wss" => Some("https"),
        "http" | "https" => None,
        other => {
            return Err(Error::invalid_address(
                address,
                format!("unsupported scheme '{other}'"),
            ));
        }
    };

    if let Some(scheme) = scheme
        && url.set_scheme(scheme).is_err()
    {
        return Err(Error::invalid_address(address, "cannot rewrite scheme"));
    }

    Ok(url)
}

/// Returns the `/info` endpoint below a base URL.
#[must_use]
pub fn info_url(base: &Url) -> Url {
    let mut url = base.clone();
    let path = format!("{}/info", base.path().trim_end_matches('/'));
    url.set_path(&path);
    url
}

// ============================================================================
// Fetching
// ============================================================================

/// Fetches the server capabilities for `address`.
///
/// Returns the capabilities together with the normalized base URL the
/// transports should dial.
///
/// # Errors
///
/// - [`Error::NoAddress`] / [`Error::InvalidAddress`] for a bad address
/// - [`Error::Http`] on network failure or an undecodable body
pub async fn fetch_server_info(http: &reqwest::Client, address: &str) -> Result<(ServerInfo, Url)> {
    let base = http_base(address)?;
    let url = info_url(&base);

    debug!(%url, "Fetching server info");

    let info = http.get(url).send().await?.json::<ServerInfo>().await?;

    debug!(
        websocket = info.websocket,
        cookie_needed = info.cookie_needed,
        "Server info received"
    );

    Ok((info, base))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_info_decode() {
        let info: ServerInfo = serde_json::from_str(
            r#"{"websocket":true,"cookie_needed":false,"origins":["*:*"],"entropy":42}"#,
        )
        .unwrap();

        assert!(info.websocket);
        assert!(!info.cookie_needed);
        assert_eq!(info.origins, vec!["*:*"]);
        assert_eq!(info.entropy, 42);
    }

    #[test]
    fn test_server_info_missing_fields() {
        let info: ServerInfo = serde_json::from_str(r#"{"websocket":false}"#).unwrap();
        assert_eq!(info, ServerInfo::default());
    }

    #[test]
    fn test_http_base_rewrites_scheme() {
        assert_eq!(
            http_base("ws://example.com/sockjs").unwrap().as_str(),
            "http://example.com/sockjs"
        );
        assert_eq!(
            http_base("wss://example.com/sockjs").unwrap().as_str(),
            "https://example.com/sockjs"
        );
        assert_eq!(
            http_base("example.com:8080/sockjs").unwrap().as_str(),
            "https://example.com:8080/sockjs"
        );
        assert_eq!(
            http_base("http://127.0.0.1:8008/sockjs").unwrap().as_str(),
            "http://127.0.0.1:8008/sockjs"
        );
    }

    #[test]
    fn test_http_base_rejects_bad_addresses() {
        assert!(matches!(http_base(""), Err(Error::NoAddress)));
        assert!(matches!(
            http_base("ftp://example.com"),
            Err(Error::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_info_url() {
        let base = Url::parse("http://example.com/sockjs").unwrap();
        assert_eq!(info_url(&base).as_str(), "http://example.com/sockjs/info");

        let base = Url::parse("http://example.com/sockjs/").unwrap();
        assert_eq!(info_url(&base).as_str(), "http://example.com/sockjs/info");

        let base = Url::parse("http://example.com").unwrap();
        assert_eq!(info_url(&base).as_str(), "http://example.com/info");
    }
}

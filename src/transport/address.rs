//! Transport endpoint addresses.
//!
//! Both transports address one session as
//! `<scheme>://<host>/<path>/<server_id>/<session_id>` and append their own
//! suffix (`/websocket`, `/xhr`, `/xhr_send`).

// ============================================================================
// Imports
// ============================================================================

use url::{Position, Url};

use crate::error::{Error, Result};
use crate::identifiers::{ServerId, SessionId};

// ============================================================================
// Address Builder
// ============================================================================

/// Builds the session address shared by both transports.
///
/// Query and fragment of `base` are dropped. A base without a scheme
/// produces a scheme-less address.
///
/// # Errors
///
/// - [`Error::InvalidAddress`] if `base` cannot be parsed
/// - [`Error::MissingIdentifier`] if either id is empty
pub fn transport_address(base: &str, server_id: &ServerId, session_id: &SessionId) -> Result<String> {
    let (scheme, host, path) = if base.contains("://") {
        let url = Url::parse(base).map_err(|e| Error::invalid_address(base, e.to_string()))?;
        (
            Some(url.scheme().to_string()),
            url[Position::BeforeHost..Position::AfterPort].to_string(),
            url.path().to_string(),
        )
    } else {
        (None, String::new(), base.to_string())
    };

    if server_id.is_empty() {
        return Err(Error::missing_identifier("server id"));
    }
    if session_id.is_empty() {
        return Err(Error::missing_identifier("session id"));
    }

    let joined = join_segments([
        host.as_str(),
        path.as_str(),
        server_id.as_str(),
        session_id.as_str(),
    ]);

    Ok(match scheme {
        Some(scheme) => format!("{scheme}://{joined}"),
        None => joined,
    })
}

/// Joins path pieces with single slashes, dropping empty segments.
fn join_segments<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .flat_map(|part| part.split('/'))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (ServerId, SessionId) {
        (ServerId::new("123"), SessionId::new("abc"))
    }

    #[test]
    fn test_absolute_address() {
        let (server, session) = ids();
        assert_eq!(
            transport_address("http://127.0.0.1:8008/sockjs", &server, &session).unwrap(),
            "http://127.0.0.1:8008/sockjs/123/abc"
        );
    }

    #[test]
    fn test_trailing_slash_and_query_dropped() {
        let (server, session) = ids();
        assert_eq!(
            transport_address("https://example.com/sockjs/?t=1", &server, &session).unwrap(),
            "https://example.com/sockjs/123/abc"
        );
    }

    #[test]
    fn test_root_path() {
        let (server, session) = ids();
        assert_eq!(
            transport_address("ws://example.com", &server, &session).unwrap(),
            "ws://example.com/123/abc"
        );
    }

    #[test]
    fn test_relative_address() {
        let (server, session) = ids();
        assert_eq!(
            transport_address("example.com/sockjs", &server, &session).unwrap(),
            "example.com/sockjs/123/abc"
        );
    }

    #[test]
    fn test_missing_ids() {
        let (server, session) = ids();
        let err = transport_address("http://example.com", &ServerId::new(""), &session).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingIdentifier { name: "server id" }
        ));

        let err = transport_address("http://example.com", &server, &SessionId::new("")).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingIdentifier { name: "session id" }
        ));
    }

    #[test]
    fn test_invalid_base() {
        let (server, session) = ids();
        assert!(matches!(
            transport_address("http://[::1", &server, &session),
            Err(Error::InvalidAddress { .. })
        ));
    }
}

//! Identity resolution at connect time.
//!
//! Authentication lives outside the push layer. An [`IdentityResolver`] is
//! the seam where the surrounding system hands over the identity a
//! connection belongs to; the default [`QueryIdentity`] reads it from the
//! connect URI without verification.

use pushline_protocol::UserId;
use url::form_urlencoded;

/// Default query parameter carrying the user identity.
pub const DEFAULT_IDENTITY_PARAM: &str = "userId";

/// What is known about a connection request before the upgrade completes.
#[derive(Debug, Clone, Default)]
pub struct ConnectRequest {
    /// Raw query string, without the leading `?`.
    pub query: Option<String>,
    /// Value of the `Authorization` header, if any.
    pub authorization: Option<String>,
}

impl ConnectRequest {
    /// Build a request from a URI or path such as `/?userId=2`.
    #[must_use]
    pub fn from_uri(uri: &str) -> Self {
        Self {
            query: uri.split_once('?').map(|(_, q)| q.to_string()),
            authorization: None,
        }
    }

    /// Attach an `Authorization` header value.
    #[must_use]
    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    /// First value of a query parameter.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

/// Resolves a connection request to a user identity.
pub trait IdentityResolver: Send + Sync {
    /// Resolve the identity, or `None` if the request carries none.
    ///
    /// A `None` connection is still accepted and tracked for liveness but is
    /// unreachable as a delivery target.
    fn resolve(&self, request: &ConnectRequest) -> Option<UserId>;

    /// Whether resolved identities are verified credentials.
    fn is_verified(&self) -> bool {
        false
    }

    /// Resolver name for logs.
    fn name(&self) -> &'static str;
}

/// Trusts the identity carried in a query parameter.
#[derive(Debug, Clone)]
pub struct QueryIdentity {
    param: String,
}

impl QueryIdentity {
    /// Read the identity from `param`.
    #[must_use]
    pub fn new(param: impl Into<String>) -> Self {
        Self {
            param: param.into(),
        }
    }

    /// The parameter name.
    #[must_use]
    pub fn param(&self) -> &str {
        &self.param
    }
}

impl Default for QueryIdentity {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTITY_PARAM)
    }
}

impl IdentityResolver for QueryIdentity {
    fn resolve(&self, request: &ConnectRequest) -> Option<UserId> {
        request
            .query_param(&self.param)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(UserId::from)
    }

    fn name(&self) -> &'static str {
        "query"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_identity() {
        let resolver = QueryIdentity::default();

        let request = ConnectRequest::from_uri("/?userId=2");
        assert_eq!(resolver.resolve(&request), Some(UserId::new("2")));

        let request = ConnectRequest::from_uri("/ws?foo=bar&userId=abc%20def&userId=ignored");
        assert_eq!(resolver.resolve(&request), Some(UserId::new("abc def")));
    }

    #[test]
    fn test_absent_or_empty_identity() {
        let resolver = QueryIdentity::default();

        for uri in ["/", "/?", "/?userId=", "/?userid=2", "/?userId=%20"] {
            assert_eq!(resolver.resolve(&ConnectRequest::from_uri(uri)), None, "{}", uri);
        }
        assert_eq!(resolver.resolve(&ConnectRequest::default()), None);
    }

    #[test]
    fn test_custom_param() {
        let resolver = QueryIdentity::new("uid");
        let request = ConnectRequest::from_uri("/ws?uid=77&userId=1");
        assert_eq!(resolver.resolve(&request), Some(UserId::new("77")));
        assert!(!resolver.is_verified());
    }

    #[test]
    fn test_authorization_is_carried() {
        let request = ConnectRequest::from_uri("/ws").with_authorization("Bearer abc");
        assert_eq!(request.authorization.as_deref(), Some("Bearer abc"));
        assert_eq!(request.query, None);
    }
}

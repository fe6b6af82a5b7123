/// Authenticated caller, as resolved by the outer authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Short user name with any realm stripped (`alice`).
    pub id: String,
    /// Kerberos-style realm, when the remote user carried one (`EXAMPLE.COM`).
    pub realm: Option<String>,
}

impl Principal {
    /// Parses a remote-user string such as `alice@EXAMPLE.COM`.
    ///
    /// Returns `None` for an empty user name.
    #[must_use]
    pub fn from_remote_user(remote_user: &str) -> Option<Self> {
        let remote_user = remote_user.trim();
        let (id, realm) = match remote_user.split_once('@') {
            Some((id, realm)) if !realm.is_empty() => (id, Some(realm.to_string())),
            Some((id, _)) => (id, None),
            None => (remote_user, None),
        };
        if id.is_empty() {
            return None;
        }
        Some(Self {
            id: id.to_string(),
            realm,
        })
    }
}

/// Per-request context handed to every procedure.
///
/// Carries caller identity and the request id used to correlate logs.
/// Built fresh for each request and never shared between requests.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Value of the `X-Request-Id` header assigned at the HTTP edge.
    pub request_id: String,
    /// Authenticated caller, if the outer layer supplied one.
    pub principal: Option<Principal>,
}

impl RequestContext {
    #[must_use]
    pub fn new(request_id: impl Into<String>, principal: Option<Principal>) -> Self {
        Self {
            request_id: request_id.into(),
            principal,
        }
    }

    /// The caller's short user name, if authenticated.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.principal.as_ref().map(|p| p.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_user_realm_is_stripped() {
        let principal = Principal::from_remote_user("alice@EXAMPLE.COM").unwrap();
        assert_eq!(principal.id, "alice");
        assert_eq!(principal.realm.as_deref(), Some("EXAMPLE.COM"));
    }

    #[test]
    fn remote_user_without_realm() {
        let principal = Principal::from_remote_user("bob").unwrap();
        assert_eq!(principal.id, "bob");
        assert!(principal.realm.is_none());
    }

    #[test]
    fn empty_remote_user_is_anonymous() {
        assert!(Principal::from_remote_user("").is_none());
        assert!(Principal::from_remote_user("@EXAMPLE.COM").is_none());
    }

    #[test]
    fn context_exposes_user_name() {
        let ctx = RequestContext::new("req-1", Principal::from_remote_user("carol@X"));
        assert_eq!(ctx.user(), Some("carol"));
        assert_eq!(RequestContext::default().user(), None);
    }
}

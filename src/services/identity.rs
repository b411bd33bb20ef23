use std::collections::BTreeSet;

use axum::http::HeaderMap;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const PERMISSIONS_HEADER: &str = "x-user-permissions";
/// Lets the caller see PII unmasked
pub const UNMASK_PERMISSION: &str = "pii:unmask";

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub permissions: BTreeSet<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            permissions: BTreeSet::new(),
        }
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    pub fn can_unmask(&self) -> bool {
        self.permissions.contains(UNMASK_PERMISSION)
    }
}

/// Resolves the caller of an HTTP request; `None` means unauthorized
pub trait IdentityProvider: Send + Sync {
    fn identify(&self, headers: &HeaderMap) -> Option<Identity>;
}

/// Trusts identity headers set by an upstream gateway
pub struct HeaderIdentityProvider;

impl IdentityProvider for HeaderIdentityProvider {
    fn identify(&self, headers: &HeaderMap) -> Option<Identity> {
        let user_id = headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())?;

        let permissions = headers
            .get(PERMISSIONS_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Some(Identity {
            user_id: user_id.to_string(),
            permissions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_missing_or_blank_user_is_rejected() {
        let provider = HeaderIdentityProvider;
        assert!(provider.identify(&HeaderMap::new()).is_none());

        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("   "));
        assert!(provider.identify(&headers).is_none());
    }

    #[test]
    fn test_permissions_are_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("analyst-7"));
        headers.insert(PERMISSIONS_HEADER, HeaderValue::from_static("reports:read, pii:unmask,"));

        let identity = HeaderIdentityProvider.identify(&headers).unwrap();
        assert_eq!(identity.user_id, "analyst-7");
        assert_eq!(identity.permissions.len(), 2);
        assert!(identity.can_unmask());
    }

    #[test]
    fn test_no_permissions_cannot_unmask() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("analyst-7"));
        let identity = HeaderIdentityProvider.identify(&headers).unwrap();
        assert!(!identity.can_unmask());
    }
}

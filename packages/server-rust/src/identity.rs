//! Resolves the [`Scope`] and authenticates a request from its HTTP headers.

use axum::http::HeaderMap;
use kvstore_core::{Scope, StoreError};
use subtle::ConstantTimeEq;

use crate::config::AppConfig;

const TENANT_HEADER: &str = "x-tenant-id";
const NAMESPACE_HEADER: &str = "x-namespace";
const USER_HEADER: &str = "x-user-id";
const AUTHORIZATION_HEADER: &str = "authorization";

/// Produces a [`Scope`] for an incoming request, enforcing authentication.
pub trait IdentityResolver: Send + Sync {
    /// Authenticates `headers` and resolves the scope they describe.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unauthorized`] if a bearer token is configured
    /// and `headers` does not carry a matching `Authorization` header, or
    /// [`StoreError::Validation`] if the resolved scope has an empty
    /// component.
    fn resolve(&self, headers: &HeaderMap) -> Result<Scope, StoreError>;
}

/// Default [`IdentityResolver`]: scope headers with configured fallbacks,
/// plus a static bearer token check.
pub struct HeaderIdentityResolver {
    default_tenant: String,
    default_namespace: String,
    auth_token: Option<String>,
}

impl HeaderIdentityResolver {
    /// Builds a resolver from the process configuration.
    #[must_use]
    pub fn new(config: &AppConfig) -> Self {
        Self {
            default_tenant: config.default_tenant.clone(),
            default_namespace: config.default_namespace.clone(),
            auth_token: config.auth_token.clone(),
        }
    }

    fn check_bearer_token(&self, headers: &HeaderMap) -> Result<(), StoreError> {
        let Some(expected) = &self.auth_token else {
            return Ok(());
        };
        let presented = headers
            .get(AUTHORIZATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        match presented {
            Some(token) if bool::from(token.as_bytes().ct_eq(expected.as_bytes())) => Ok(()),
            _ => Err(StoreError::Unauthorized),
        }
    }

    fn header_or_default<'a>(headers: &'a HeaderMap, name: &str, default: &'a str) -> &'a str {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or(default)
    }
}

impl IdentityResolver for HeaderIdentityResolver {
    fn resolve(&self, headers: &HeaderMap) -> Result<Scope, StoreError> {
        self.check_bearer_token(headers)?;

        let tenant_id = Self::header_or_default(headers, TENANT_HEADER, &self.default_tenant);
        let namespace = Self::header_or_default(headers, NAMESPACE_HEADER, &self.default_namespace);
        let user_id = headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| StoreError::validation("x-user-id header is required"))?;

        Scope::new(tenant_id, namespace, user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn resolver(auth_token: Option<&str>) -> HeaderIdentityResolver {
        let mut config = AppConfig::for_tests();
        config.auth_token = auth_token.map(str::to_string);
        HeaderIdentityResolver::new(&config)
    }

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn resolves_scope_from_headers() {
        let resolver = resolver(None);
        let scope = resolver
            .resolve(&headers(&[
                (TENANT_HEADER, "acme"),
                (NAMESPACE_HEADER, "prefs"),
                (USER_HEADER, "u1"),
            ]))
            .unwrap();
        assert_eq!(scope.tenant_id, "acme");
        assert_eq!(scope.namespace, "prefs");
        assert_eq!(scope.user_id, "u1");
    }

    #[test]
    fn falls_back_to_configured_defaults() {
        let resolver = resolver(None);
        let scope = resolver.resolve(&headers(&[(USER_HEADER, "u1")])).unwrap();
        assert_eq!(scope.tenant_id, "default");
        assert_eq!(scope.namespace, "default");
    }

    #[test]
    fn missing_user_header_is_a_validation_error() {
        let resolver = resolver(None);
        let err = resolver.resolve(&headers(&[])).unwrap_err();
        assert_eq!(err.code(), kvstore_core::ErrorCode::Validation);
    }

    #[test]
    fn auth_disabled_when_no_token_configured() {
        let resolver = resolver(None);
        assert!(resolver.resolve(&headers(&[(USER_HEADER, "u1")])).is_ok());
    }

    #[test]
    fn rejects_missing_bearer_token_when_configured() {
        let resolver = resolver(Some("secret"));
        let err = resolver
            .resolve(&headers(&[(USER_HEADER, "u1")]))
            .unwrap_err();
        assert_eq!(err.code(), kvstore_core::ErrorCode::Unauthorized);
    }

    #[test]
    fn rejects_wrong_bearer_token() {
        let resolver = resolver(Some("secret"));
        let err = resolver
            .resolve(&headers(&[
                (USER_HEADER, "u1"),
                (AUTHORIZATION_HEADER, "Bearer wrong"),
            ]))
            .unwrap_err();
        assert_eq!(err.code(), kvstore_core::ErrorCode::Unauthorized);
    }

    #[test]
    fn accepts_matching_bearer_token() {
        let resolver = resolver(Some("secret"));
        let scope = resolver
            .resolve(&headers(&[
                (USER_HEADER, "u1"),
                (AUTHORIZATION_HEADER, "Bearer secret"),
            ]))
            .unwrap();
        assert_eq!(scope.user_id, "u1");
    }
}

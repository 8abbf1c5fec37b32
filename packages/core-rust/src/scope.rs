//! The isolation boundary for every stored item.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Three-level tenancy scope that namespaces every key.
///
/// Two scopes differing in any component are fully isolated: a read under
/// one scope never observes an item written under another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub tenant_id: String,
    pub namespace: String,
    pub user_id: String,
}

impl Scope {
    /// Creates a scope, rejecting empty components.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if any component is empty.
    pub fn new(
        tenant_id: impl Into<String>,
        namespace: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let scope = Self {
            tenant_id: tenant_id.into(),
            namespace: namespace.into(),
            user_id: user_id.into(),
        };
        scope.validate()?;
        Ok(scope)
    }

    /// Checks that all three components are non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] naming the first empty component.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.tenant_id.is_empty() {
            return Err(StoreError::validation("scope.tenantId must not be empty"));
        }
        if self.namespace.is_empty() {
            return Err(StoreError::validation("scope.namespace must not be empty"));
        }
        if self.user_id.is_empty() {
            return Err(StoreError::validation("scope.userId must not be empty"));
        }
        Ok(())
    }

    /// Renders the scope as a stable, delimiter-safe prefix for backend keys.
    ///
    /// Used by the key-value backend to compose `t:<tenant>:n:<namespace>:u:<user>:k:<key>`.
    #[must_use]
    pub fn backend_prefix(&self) -> String {
        format!(
            "t:{}:n:{}:u:{}:k:",
            self.tenant_id, self.namespace, self.user_id
        )
    }
}

//! Size and count bounds enforced by [`crate::service::validation`].

use crate::config::AppConfig;

/// Validated request-size and request-count bounds.
///
/// Constructed once from [`AppConfig`] at startup and shared (by value; it
/// is small and `Copy`) with every request.
#[derive(Debug, Clone, Copy)]
pub struct ServiceLimits {
    /// Maximum key length, in bytes.
    pub max_key_length: usize,
    /// Maximum value size, in bytes of canonical JSON.
    pub max_value_bytes: usize,
    /// Maximum number of entries in one batch get/put request.
    pub max_batch_size: usize,
    /// Default and maximum `limit` for a `list` request.
    pub max_list_limit: usize,
}

impl From<&AppConfig> for ServiceLimits {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_key_length: config.max_key_length,
            max_value_bytes: config.max_value_bytes,
            max_batch_size: config.max_batch_size,
            max_list_limit: config.max_list_limit,
        }
    }
}

impl ServiceLimits {
    /// Bounds matching [`AppConfig::for_tests`].
    #[must_use]
    pub fn for_tests() -> Self {
        Self::from(&AppConfig::for_tests())
    }
}

//! Error types for pet-dispatch.

use thiserror::Error;

use pet_core::ConfigError;

/// All errors that can arise from dispatch and webhook-relay parsing.
///
/// Per-backend execution failures never surface here; they are recorded
/// inside the aggregate report so sibling backends keep running.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Backend selection failed (unknown backend name in the request).
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A webhook payload could not be parsed.
    #[error("invalid {format} payload: {source}")]
    Payload {
        format: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The notification's user agent matched no known hook format.
    #[error("unknown webhook user agent '{user_agent}'")]
    UnknownUserAgent { user_agent: String },
}

//! Domain errors for the Courtside engine.
//!
//! Pipelines never surface agent, contract or budget failures as `Err`; those
//! are folded into the terminal artifact's stop reason. What remains here is
//! the sanitized transport failure that crosses the agent port.

use thiserror::Error;

/// Maximum length of any provider error message that may reach a log line or
/// a caller.
pub const SAFE_MESSAGE_MAX_CHARS: usize = 240;

/// Classification of a failed agent call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The call exceeded the role's timeout.
    Timeout,
    /// Connection-level failure before a response arrived.
    Network,
    /// The provider answered with a non-2xx status.
    Status(u16),
    /// The response body did not have the expected envelope.
    InvalidResponse,
    /// Live transport selected while outbound network access is disabled.
    NetworkDisabled,
    /// Transport is missing credentials or other required settings.
    NotConfigured,
    /// The role's configuration does not grant the capability the step needs.
    MissingCapability,
    /// Replay fixture missing, unreadable or refusing to overwrite.
    Replay,
    /// Failure injected by a fixture transport.
    Injected,
    /// The run was cancelled while the call was in flight.
    Cancelled,
}

/// A sanitized transport failure.
///
/// The message is assembled only from static text and numeric detail, then
/// truncated to [`SAFE_MESSAGE_MAX_CHARS`]. Upstream text (error bodies, raw
/// responses) is never stored; callers attach its fingerprint instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    kind: ProviderErrorKind,
    message: String,
    fingerprint: Option<String>,
}

impl ProviderError {
    /// Build an error, truncating the message.
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: truncate_chars(&message.into(), SAFE_MESSAGE_MAX_CHARS),
            fingerprint: None,
        }
    }

    /// Attach the fingerprint of upstream text that motivated this error.
    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    /// The call exceeded `timeout_ms`.
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::new(
            ProviderErrorKind::Timeout,
            format!("agent call timed out after {timeout_ms}ms"),
        )
    }

    /// Non-2xx response.
    pub fn status(status: u16) -> Self {
        Self::new(
            ProviderErrorKind::Status(status),
            format!("provider returned HTTP {status}"),
        )
    }

    /// The run was cancelled mid-call.
    pub fn cancelled() -> Self {
        Self::new(ProviderErrorKind::Cancelled, "run cancelled")
    }

    /// Failure class.
    pub const fn kind(&self) -> ProviderErrorKind {
        self.kind
    }

    /// Sanitized message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Fingerprint of the upstream text, if any.
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    /// Whether the call timed out.
    pub const fn is_timeout(&self) -> bool {
        matches!(self.kind, ProviderErrorKind::Timeout)
    }
}

/// Truncate to at most `max` characters, respecting UTF-8 boundaries.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

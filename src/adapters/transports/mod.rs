//! Agent transports: live provider, deterministic fixtures, and recorded
//! replays, all behind [`AgentTransport`](crate::domain::ports::AgentTransport).

pub mod fixture;
pub mod live;
pub mod registry;
pub mod replay;

pub use fixture::{canned_response, FixtureReply, FixtureTransport, RecordedCall};
pub use live::LiveTransport;
pub use registry::build_transport;
pub use replay::{ReplayEntry, ReplayTransport};

/// Token estimate for transports that don't report usage: `ceil(chars / 4)`.
pub fn estimate_tokens(text: &str) -> u64 {
    let chars = text.chars().count() as u64;
    chars.div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}

//! Observable session phase.

use std::fmt;

use crate::error::IdpStage;

/// Where the session currently is in the authentication flow.
///
/// Published through [`IdpSession::subscribe_phase`](super::IdpSession::subscribe_phase).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionPhase {
    /// No flow in progress and no token obtained by this session.
    #[default]
    Idle,
    /// Loading the discovery document.
    Discovering,
    /// A challenge is pending.
    ChallengeRequested,
    /// The pending challenge has been signed.
    ChallengeSigned,
    /// The signed challenge is being submitted.
    Verifying,
    /// The authorization code is being exchanged.
    Exchanging,
    /// A token was obtained and stored.
    Authenticated,
    /// The token is being renewed.
    Refreshing,
    /// Waiting for an insurer app to return.
    ExternalAuthPending,
    /// The last flow step failed.
    Failed(IdpStage),
}

impl SessionPhase {
    /// Returns `true` while a flow step is running or awaiting input.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        !matches!(self, Self::Idle | Self::Authenticated | Self::Failed(_))
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Discovering => f.write_str("discovering"),
            Self::ChallengeRequested => f.write_str("challenge requested"),
            Self::ChallengeSigned => f.write_str("challenge signed"),
            Self::Verifying => f.write_str("verifying"),
            Self::Exchanging => f.write_str("exchanging"),
            Self::Authenticated => f.write_str("authenticated"),
            Self::Refreshing => f.write_str("refreshing"),
            Self::ExternalAuthPending => f.write_str("external authentication pending"),
            Self::Failed(stage) => write!(f, "{stage} failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight() {
        assert!(!SessionPhase::Idle.is_in_flight());
        assert!(SessionPhase::ChallengeRequested.is_in_flight());
        assert!(SessionPhase::ExternalAuthPending.is_in_flight());
        assert!(!SessionPhase::Failed(IdpStage::Verify).is_in_flight());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            SessionPhase::Failed(IdpStage::Refresh).to_string(),
            "refresh failed"
        );
    }
}

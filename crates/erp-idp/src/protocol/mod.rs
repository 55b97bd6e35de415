//! IDP wire types.

mod challenge;
mod discovery;
mod ext_auth;
mod pairing;
mod token;

pub use challenge::{
    ChallengeClaims, ChallengeResponse, IdpChallenge, IdpChallengeSession, NestedChallenge,
    SignedChallenge, UserConsent,
};
pub use discovery::{DiscoveryDocument, Jwk};
pub use ext_auth::{ExtAuthChallengeSession, KkAppDirectory, KkAppEntry};
pub use pairing::{
    AuthenticationData, DATA_VERSION, DeviceInformation, DeviceType, PairingData, PairingEntries,
    PairingEntry, PairingSession, RegistrationData, SignedAuthenticationData,
};
pub use token::{ExchangeToken, IdTokenClaims, IdpToken, TokenResponse};

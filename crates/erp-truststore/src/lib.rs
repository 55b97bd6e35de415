//! Trust anchors and certificate chain validation.
//!
//! Server certificates presented during the IDP handshake are only trusted
//! when they chain to a configured anchor set:
//!
//! - [`TrustAnchor`] - a pinned root certificate
//! - [`TrustStore`] - anchors plus intermediates, OpenSSL chain building
//! - [`CertList`] - the distributed certificate list document
//! - [`TrustStoreSession`] - the async validation service with caching and reset
//!
//! Validation is fail-closed: a certificate that does not chain, or whose
//! chain contains an expired link, is rejected, and failures to obtain
//! trust material are errors rather than a pass.

pub mod anchor;
pub mod cert_list;
pub mod certificate;
pub mod config;
pub mod error;
pub mod session;
pub mod store;

pub use anchor::TrustAnchor;
pub use cert_list::CertList;
pub use config::TrustStoreConfig;
pub use error::TrustStoreError;
pub use session::{DefaultTrustStoreSession, StaticTrustStoreSession, TrustStoreSession};
pub use store::TrustStore;

pub use openssl::x509::{X509, X509Ref};

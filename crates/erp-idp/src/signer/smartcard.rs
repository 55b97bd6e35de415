//! Health card signing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{BrainpoolP256r1Signer, JwtSigner, SignatureError};
use crate::jwt::Algorithm;

/// PIN attempts before a card blocks.
const PIN_ATTEMPTS: u8 = 3;

/// A health card with a brainpoolP256r1 authentication key.
///
/// Card communication (NFC, PC/SC) is provided by the host. Errors map to
/// [`SignatureError`]: a wrong PIN reports the remaining attempts, a
/// removed card reports `CardRemoved`.
#[async_trait]
pub trait HealthCard: Send + Sync {
    /// Verifies the user PIN.
    async fn verify_pin(&self, pin: &str) -> Result<(), SignatureError>;

    /// Reads the DER authentication certificate.
    async fn read_auth_certificate(&self) -> Result<Vec<u8>, SignatureError>;

    /// Signs the SHA-256 hash of `message` with the authentication key.
    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignatureError>;
}

/// `BP256R1` signer backed by a [`HealthCard`].
pub struct SmartcardSigner<C> {
    card: C,
    certificate: Vec<u8>,
}

impl<C: HealthCard> SmartcardSigner<C> {
    /// Unlocks `card` with `pin` and reads its certificate.
    ///
    /// # Errors
    ///
    /// Returns the card's error if the PIN is rejected or the card is gone.
    pub async fn open(card: C, pin: &str) -> Result<Self, SignatureError> {
        card.verify_pin(pin).await?;
        let certificate = card.read_auth_certificate().await?;
        Ok(Self { card, certificate })
    }

    /// The DER authentication certificate.
    #[must_use]
    pub fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    /// The underlying card.
    #[must_use]
    pub fn card(&self) -> &C {
        &self.card
    }
}

#[async_trait]
impl<C: HealthCard> JwtSigner for SmartcardSigner<C> {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Bp256r1
    }

    fn certificates(&self) -> Vec<Vec<u8>> {
        vec![self.certificate.clone()]
    }

    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignatureError> {
        self.card.sign(message).await
    }
}

// =============================================================================
// Simulated card
// =============================================================================

/// A [`HealthCard`] backed by a software key.
///
/// Mirrors card behavior that matters to callers: PIN retry counting and
/// blocking, removal, and slow responses.
pub struct SimulatedHealthCard {
    key: BrainpoolP256r1Signer,
    certificate: Vec<u8>,
    pin: String,
    retries: Mutex<u8>,
    present: AtomicBool,
    response_delay: Option<Duration>,
}

impl SimulatedHealthCard {
    /// Creates a card for `key`, which must carry a certificate.
    ///
    /// # Errors
    ///
    /// Returns `SignatureError::InvalidKey` if `key` has no certificate.
    pub fn new(key: BrainpoolP256r1Signer, pin: impl Into<String>) -> Result<Self, SignatureError> {
        let certificate = key
            .certificates()
            .into_iter()
            .next()
            .ok_or_else(|| SignatureError::invalid_key("simulated card needs a certificate"))?;
        Ok(Self {
            key,
            certificate,
            pin: pin.into(),
            retries: Mutex::new(PIN_ATTEMPTS),
            present: AtomicBool::new(true),
            response_delay: None,
        })
    }

    /// Delays every signature by `delay`.
    #[must_use]
    pub fn with_response_delay(mut self, delay: Duration) -> Self {
        self.response_delay = Some(delay);
        self
    }

    /// Simulates pulling the card.
    pub fn remove(&self) {
        self.present.store(false, Ordering::SeqCst);
    }

    /// Simulates putting the card back.
    pub fn insert(&self) {
        self.present.store(true, Ordering::SeqCst);
    }

    fn ensure_present(&self) -> Result<(), SignatureError> {
        if self.present.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SignatureError::CardRemoved)
        }
    }
}

#[async_trait]
impl HealthCard for SimulatedHealthCard {
    async fn verify_pin(&self, pin: &str) -> Result<(), SignatureError> {
        self.ensure_present()?;
        let mut retries = self.retries.lock().await;
        if *retries == 0 {
            return Err(SignatureError::PinBlocked);
        }
        if pin == self.pin {
            *retries = PIN_ATTEMPTS;
            return Ok(());
        }
        *retries -= 1;
        if *retries == 0 {
            tracing::warn!("simulated card PIN blocked");
            Err(SignatureError::PinBlocked)
        } else {
            Err(SignatureError::WrongPin {
                retries_left: *retries,
            })
        }
    }

    async fn read_auth_certificate(&self) -> Result<Vec<u8>, SignatureError> {
        self.ensure_present()?;
        Ok(self.certificate.clone())
    }

    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignatureError> {
        self.ensure_present()?;
        if let Some(delay) = self.response_delay {
            tokio::time::sleep(delay).await;
            self.ensure_present()?;
        }
        self.key.sign(message).await
    }
}

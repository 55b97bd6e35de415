//! In-memory storage.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ExtAuthRequestStorage, PairingRecord, PairingStorage, StorageError, TokenStorage};
use crate::protocol::{ExtAuthChallengeSession, IdpToken};

/// Profile used by [`MemoryStore::default_profile`].
pub const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, Default)]
struct Slots {
    token: Option<IdpToken>,
    ext_auth: HashMap<String, ExtAuthChallengeSession>,
    pairing: Option<PairingRecord>,
}

/// Shared in-memory storage for any number of profiles.
///
/// Each profile is isolated: tokens, pending requests and pairings of one
/// profile are never visible through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    profiles: Arc<RwLock<HashMap<String, Slots>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle scoped to `profile`.
    #[must_use]
    pub fn profile(&self, profile: impl Into<String>) -> ProfileStore {
        ProfileStore {
            profiles: self.profiles.clone(),
            profile: profile.into(),
        }
    }

    /// A handle scoped to the default profile.
    #[must_use]
    pub fn default_profile(&self) -> ProfileStore {
        self.profile(DEFAULT_PROFILE)
    }

    /// Names of profiles that hold any data.
    pub async fn profiles(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

/// One profile of a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct ProfileStore {
    profiles: Arc<RwLock<HashMap<String, Slots>>>,
    profile: String,
}

impl ProfileStore {
    /// The profile name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.profile
    }

    async fn read<T>(&self, f: impl FnOnce(&Slots) -> T) -> T {
        let profiles = self.profiles.read().await;
        match profiles.get(&self.profile) {
            Some(slots) => f(slots),
            None => f(&Slots::default()),
        }
    }

    async fn write<T>(&self, f: impl FnOnce(&mut Slots) -> T) -> T {
        let mut profiles = self.profiles.write().await;
        f(profiles.entry(self.profile.clone()).or_default())
    }
}

#[async_trait]
impl TokenStorage for ProfileStore {
    async fn token(&self) -> Result<Option<IdpToken>, StorageError> {
        Ok(self.read(|slots| slots.token.clone()).await)
    }

    async fn set_token(&self, token: IdpToken) -> Result<(), StorageError> {
        self.write(|slots| slots.token = Some(token)).await;
        Ok(())
    }

    async fn clear_token(&self) -> Result<(), StorageError> {
        self.write(|slots| slots.token = None).await;
        Ok(())
    }
}

#[async_trait]
impl ExtAuthRequestStorage for ProfileStore {
    async fn ext_auth_request(
        &self,
        state: &str,
    ) -> Result<Option<ExtAuthChallengeSession>, StorageError> {
        Ok(self.read(|slots| slots.ext_auth.get(state).cloned()).await)
    }

    async fn set_ext_auth_request(
        &self,
        request: ExtAuthChallengeSession,
    ) -> Result<(), StorageError> {
        self.write(|slots| slots.ext_auth.insert(request.state.clone(), request))
            .await;
        Ok(())
    }

    async fn remove_ext_auth_request(&self, state: &str) -> Result<(), StorageError> {
        self.write(|slots| slots.ext_auth.remove(state)).await;
        Ok(())
    }

    async fn pending_ext_auth_requests(&self) -> Result<Vec<ExtAuthChallengeSession>, StorageError> {
        Ok(self
            .read(|slots| slots.ext_auth.values().cloned().collect())
            .await)
    }
}

#[async_trait]
impl PairingStorage for ProfileStore {
    async fn pairing(&self) -> Result<Option<PairingRecord>, StorageError> {
        Ok(self.read(|slots| slots.pairing.clone()).await)
    }

    async fn set_pairing(&self, record: PairingRecord) -> Result<(), StorageError> {
        self.write(|slots| slots.pairing = Some(record)).await;
        Ok(())
    }

    async fn clear_pairing(&self) -> Result<(), StorageError> {
        self.write(|slots| slots.pairing = None).await;
        Ok(())
    }
}

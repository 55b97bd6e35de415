//! Per-profile JSON file storage.
//!
//! Layout under the profile directory:
//!
//! ```text
//! token.json      current token set
//! ext_auth.json   pending external authentication requests, keyed by state
//! pairing.json    device pairing record
//! ```

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use erp_idp::{
    ExtAuthChallengeSession, ExtAuthRequestStorage, IdpToken, PairingRecord, PairingStorage,
    StorageError, TokenStorage,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

const TOKEN_FILE: &str = "token.json";
const EXT_AUTH_FILE: &str = "ext_auth.json";
const PAIRING_FILE: &str = "pairing.json";

type ExtAuthRequests = BTreeMap<String, ExtAuthChallengeSession>;

#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    // Serializes read-modify-write of the ext auth map.
    ext_auth: Mutex<()>,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ext_auth: Mutex::new(()),
        }
    }

    async fn read<T: DeserializeOwned>(&self, file: &str) -> Result<Option<T>, StorageError> {
        let path = self.dir.join(file);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::backend(format!("{}: {e}", path.display()))),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StorageError::serialization(format!("{}: {e}", path.display())))
    }

    async fn write<T: Serialize>(&self, file: &str, value: &T) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| StorageError::serialization(e.to_string()))?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StorageError::backend(format!("{}: {e}", self.dir.display())))?;

        // Write to a sibling and rename so readers never see a partial file.
        let path = self.dir.join(file);
        let tmp = self.dir.join(format!(".{file}.tmp"));
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| StorageError::backend(format!("{}: {e}", tmp.display())))?;
        restrict_permissions(&tmp).await?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StorageError::backend(format!("{}: {e}", path.display())))
    }

    async fn remove(&self, file: &str) -> Result<(), StorageError> {
        let path = self.dir.join(file);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::backend(format!("{}: {e}", path.display()))),
        }
    }

    async fn ext_auth_requests(&self) -> Result<ExtAuthRequests, StorageError> {
        Ok(self.read(EXT_AUTH_FILE).await?.unwrap_or_default())
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .map_err(|e| StorageError::backend(format!("{}: {e}", path.display())))
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<(), StorageError> {
    Ok(())
}

#[async_trait]
impl TokenStorage for FileStore {
    async fn token(&self) -> Result<Option<IdpToken>, StorageError> {
        self.read(TOKEN_FILE).await
    }

    async fn set_token(&self, token: IdpToken) -> Result<(), StorageError> {
        self.write(TOKEN_FILE, &token).await
    }

    async fn clear_token(&self) -> Result<(), StorageError> {
        self.remove(TOKEN_FILE).await
    }
}

#[async_trait]
impl ExtAuthRequestStorage for FileStore {
    async fn ext_auth_request(
        &self,
        state: &str,
    ) -> Result<Option<ExtAuthChallengeSession>, StorageError> {
        Ok(self.ext_auth_requests().await?.remove(state))
    }

    async fn set_ext_auth_request(
        &self,
        request: ExtAuthChallengeSession,
    ) -> Result<(), StorageError> {
        let _guard = self.ext_auth.lock().await;
        let mut requests = self.ext_auth_requests().await?;
        requests.insert(request.state.clone(), request);
        self.write(EXT_AUTH_FILE, &requests).await
    }

    async fn remove_ext_auth_request(&self, state: &str) -> Result<(), StorageError> {
        let _guard = self.ext_auth.lock().await;
        let mut requests = self.ext_auth_requests().await?;
        if requests.remove(state).is_none() {
            return Ok(());
        }
        if requests.is_empty() {
            self.remove(EXT_AUTH_FILE).await
        } else {
            self.write(EXT_AUTH_FILE, &requests).await
        }
    }

    async fn pending_ext_auth_requests(&self) -> Result<Vec<ExtAuthChallengeSession>, StorageError> {
        Ok(self.ext_auth_requests().await?.into_values().collect())
    }
}

#[async_trait]
impl PairingStorage for FileStore {
    async fn pairing(&self) -> Result<Option<PairingRecord>, StorageError> {
        self.read(PAIRING_FILE).await
    }

    async fn set_pairing(&self, record: PairingRecord) -> Result<(), StorageError> {
        self.write(PAIRING_FILE, &record).await
    }

    async fn clear_pairing(&self) -> Result<(), StorageError> {
        self.remove(PAIRING_FILE).await
    }
}

#[cfg(test)]
mod tests {
    use erp_idp::{KkAppEntry, PkceVerifier};
    use time::macros::datetime;

    use super::*;

    fn token() -> IdpToken {
        IdpToken {
            access_token: "access".to_string(),
            id_token: "id".to_string(),
            sso_token: Some("sso".to_string()),
            expires: datetime!(2030-01-01 0:00 UTC),
            token_type: "Bearer".to_string(),
        }
    }

    fn request(state: &str) -> ExtAuthChallengeSession {
        ExtAuthChallengeSession {
            state: state.to_string(),
            verifier_code: PkceVerifier::generate(),
            nonce: "nonce".to_string(),
            entry: KkAppEntry {
                name: "Gematik KK".to_string(),
                identifier: "kkv.app".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_token_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let profile_dir = dir.path().join("default");
        let store = FileStore::new(&profile_dir);

        assert!(store.token().await.unwrap().is_none());
        store.set_token(token()).await.unwrap();
        assert_eq!(store.token().await.unwrap(), Some(token()));

        // A second handle on the same directory sees the same token.
        let other = FileStore::new(&profile_dir);
        assert_eq!(other.token().await.unwrap(), Some(token()));

        store.clear_token().await.unwrap();
        store.clear_token().await.unwrap();
        assert!(other.token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ext_auth_requests() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.set_ext_auth_request(request("a")).await.unwrap();
        store.set_ext_auth_request(request("b")).await.unwrap();
        assert_eq!(store.pending_ext_auth_requests().await.unwrap().len(), 2);
        assert_eq!(
            store.ext_auth_request("a").await.unwrap().map(|r| r.state),
            Some("a".to_string())
        );

        store.remove_ext_auth_request("a").await.unwrap();
        store.remove_ext_auth_request("unknown").await.unwrap();
        assert!(store.ext_auth_request("a").await.unwrap().is_none());
        store.remove_ext_auth_request("b").await.unwrap();
        assert!(!dir.path().join(EXT_AUTH_FILE).exists());
    }

    #[tokio::test]
    async fn test_pairing_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let record = PairingRecord {
            key_tag: "tag".to_string(),
            key_identifier: "kid".to_string(),
            auth_certificate: vec![0x30, 0x82, 0x01],
        };

        store.set_pairing(record.clone()).await.unwrap();
        assert_eq!(store.pairing().await.unwrap(), Some(record));
        store.clear_pairing().await.unwrap();
        assert!(store.pairing().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TOKEN_FILE), b"{not json").unwrap();
        let store = FileStore::new(dir.path());

        let err = store.token().await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}

// API key lifecycle for the text-generation provider
//
// The key is resolved once (environment first, then the host key store),
// cached, invalidated when the provider rejects it, and re-resolved on the
// next request. A key rejected by the provider is never re-resolved; only a
// freshly selected key replaces it.
//
// The host key store is the OS keychain (macOS Keychain, Windows Credential
// Manager, the kernel keyring on Linux). Store calls block, so the store is
// read once and its contents cached; re-resolution never touches it.

use crate::error::CredentialError;
use keyring::Entry;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};

const SERVICE_NAME: &str = "com.research-librarian.app";
const API_KEY_NAME: &str = "gemini_api_key";

/// Persistent storage for a selected key
pub trait SecretStore: Send + Sync {
    fn load(&self) -> Result<Option<String>, CredentialError>;
    fn save(&self, key: &str) -> Result<(), CredentialError>;
    fn clear(&self) -> Result<(), CredentialError>;
}

/// OS keychain backed store
pub struct KeychainStore {
    service: String,
}

impl KeychainStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: &str) -> Self {
        KeychainStore {
            service: service.to_string(),
        }
    }

    fn entry(&self) -> Result<Entry, CredentialError> {
        Ok(Entry::new(&self.service, API_KEY_NAME)?)
    }
}

impl Default for KeychainStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for KeychainStore {
    fn load(&self) -> Result<Option<String>, CredentialError> {
        match self.entry()?.get_password() {
            Ok(key) => Ok(Some(key)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str) -> Result<(), CredentialError> {
        self.entry()?.set_password(key)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store, used when the keychain is disabled and in tests
#[derive(Default)]
pub struct MemoryStore {
    key: Mutex<Option<String>>,
}

impl SecretStore for MemoryStore {
    fn load(&self) -> Result<Option<String>, CredentialError> {
        Ok(self.key.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, key: &str) -> Result<(), CredentialError> {
        *self.key.lock().unwrap_or_else(PoisonError::into_inner) = Some(key.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        *self.key.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Where the active key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    Environment,
    KeyStore,
    Selected,
}

#[derive(Debug, Default)]
struct CredentialState {
    resolved: bool,
    /// Key store contents; `None` until the store has been read
    stored: Option<Option<String>>,
    active: Option<(String, KeySource)>,
    rejected: Vec<String>,
}

pub struct CredentialManager {
    env_key: Option<String>,
    store: Option<Box<dyn SecretStore>>,
    state: Mutex<CredentialState>,
}

impl CredentialManager {
    /// `store` is the host key-selection capability; `None` when the host
    /// offers none.
    pub fn new(env_key: Option<String>, store: Option<Box<dyn SecretStore>>) -> Self {
        let env_key = env_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        CredentialManager {
            env_key,
            store,
            state: Mutex::new(CredentialState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, CredentialState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a host key store exists at all
    pub fn host_selection_available(&self) -> bool {
        self.store.is_some()
    }

    /// Blocking read of the key store. Called without the state lock held.
    fn read_store(&self) -> Option<String> {
        let store = self.store.as_ref()?;
        match store.load() {
            Ok(key) => key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()),
            Err(e) => {
                tracing::warn!("Failed to read API key from key store: {}", e);
                None
            }
        }
    }

    /// Read the key store, then resolve from the environment or the stored
    /// key and cache the result. Returns where the key came from.
    pub fn resolve(&self) -> Option<KeySource> {
        let stored = self.read_store();
        let mut state = self.state();
        state.stored = Some(stored);
        Self::resolve_locked(&mut state, self.env_key.as_deref())
    }

    fn resolve_locked(state: &mut CredentialState, env_key: Option<&str>) -> Option<KeySource> {
        let usable = |key: &str| !state.rejected.iter().any(|r| r == key);

        let found = env_key
            .filter(|k| usable(*k))
            .map(|k| (k.to_string(), KeySource::Environment))
            .or_else(|| {
                state
                    .stored
                    .as_ref()
                    .and_then(|stored| stored.as_deref())
                    .filter(|k| usable(*k))
                    .map(|k| (k.to_string(), KeySource::KeyStore))
            });

        match &found {
            Some((_, source)) => tracing::debug!("API key resolved from {:?}", source),
            None => tracing::info!("No API key configured"),
        }

        state.resolved = true;
        state.active = found;
        state.active.as_ref().map(|(_, source)| *source)
    }

    /// The cached key, resolving first if the cache is cold. The key store
    /// is read here only if nothing has read it yet.
    pub fn api_key(&self) -> Option<String> {
        let unread = {
            let state = self.state();
            !state.resolved && state.stored.is_none()
        };
        let loaded = if unread { Some(self.read_store()) } else { None };

        let mut state = self.state();
        if state.stored.is_none() {
            state.stored = loaded;
        }
        if !state.resolved {
            Self::resolve_locked(&mut state, self.env_key.as_deref());
        }
        state.active.as_ref().map(|(key, _)| key.clone())
    }

    pub fn has_selected_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    pub fn active_source(&self) -> Option<KeySource> {
        self.state().active.as_ref().map(|(_, source)| *source)
    }

    /// Accept a key chosen through the host's selection flow. Persisting is
    /// best effort; the key is usable for this process either way. Writes to
    /// the key store, so async callers should run it on a blocking thread.
    pub fn open_select_key(&self, key: &str) -> Result<(), CredentialError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(CredentialError::EmptyKey);
        }
        if !key.starts_with("AIza") {
            tracing::debug!("Selected key does not look like a Google API key");
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.save(key) {
                tracing::warn!("Failed to persist API key: {}", e);
            }
        }

        let mut state = self.state();
        state.resolved = true;
        state.stored = Some(Some(key.to_string()));
        state.rejected.retain(|r| r != key);
        state.active = Some((key.to_string(), KeySource::Selected));
        tracing::info!("API key selected");
        Ok(())
    }

    /// Drop the cached key after the provider refused it
    pub fn invalidate(&self) {
        let mut state = self.state();
        if let Some((key, source)) = state.active.take() {
            tracing::warn!("Invalidating API key from {:?}", source);
            state.rejected.push(key);
        }
        state.resolved = false;
    }

    /// Forget the key entirely, including the persisted copy
    pub fn forget(&self) -> Result<(), CredentialError> {
        if let Some(store) = &self.store {
            store.clear()?;
        }
        let mut state = self.state();
        state.stored = Some(None);
        if let Some((key, _)) = state.active.take() {
            // An environment key would otherwise come straight back
            state.rejected.push(key);
        }
        state.resolved = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Shares one `MemoryStore` between managers and counts reads
    #[derive(Clone, Default)]
    struct SharedStore {
        inner: Arc<MemoryStore>,
        loads: Arc<AtomicUsize>,
    }

    impl SecretStore for SharedStore {
        fn load(&self) -> Result<Option<String>, CredentialError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load()
        }

        fn save(&self, key: &str) -> Result<(), CredentialError> {
            self.inner.save(key)
        }

        fn clear(&self) -> Result<(), CredentialError> {
            self.inner.clear()
        }
    }

    fn memory_store(key: Option<&str>) -> Option<Box<dyn SecretStore>> {
        let store = MemoryStore::default();
        if let Some(key) = key {
            store.save(key).unwrap();
        }
        Some(Box::new(store))
    }

    #[test]
    fn test_environment_key_wins() {
        let manager = CredentialManager::new(Some("AIza-env".to_string()), memory_store(Some("AIza-stored")));
        assert_eq!(manager.resolve(), Some(KeySource::Environment));
        assert_eq!(manager.api_key().as_deref(), Some("AIza-env"));
    }

    #[test]
    fn test_falls_back_to_key_store() {
        let manager = CredentialManager::new(Some("   ".to_string()), memory_store(Some("AIza-stored")));
        assert_eq!(manager.api_key().as_deref(), Some("AIza-stored"));
        assert_eq!(manager.active_source(), Some(KeySource::KeyStore));
    }

    #[test]
    fn test_absent_key_is_recoverable() {
        let manager = CredentialManager::new(None, None);
        assert!(!manager.has_selected_api_key());
        assert!(!manager.host_selection_available());
        assert!(manager.open_select_key("AIza-new").is_ok());
        assert!(manager.has_selected_api_key());
        assert_eq!(manager.active_source(), Some(KeySource::Selected));
    }

    #[test]
    fn test_select_rejects_blank_key() {
        let manager = CredentialManager::new(None, memory_store(None));
        assert!(matches!(manager.open_select_key("  "), Err(CredentialError::EmptyKey)));
        assert!(!manager.has_selected_api_key());
    }

    #[test]
    fn test_invalidate_skips_rejected_key_on_reresolve() {
        let manager = CredentialManager::new(Some("AIza-bad".to_string()), memory_store(Some("AIza-good")));
        assert_eq!(manager.api_key().as_deref(), Some("AIza-bad"));

        manager.invalidate();
        assert_eq!(manager.api_key().as_deref(), Some("AIza-good"));

        manager.invalidate();
        assert_eq!(manager.api_key(), None);

        manager.open_select_key("AIza-bad").unwrap();
        assert_eq!(manager.api_key().as_deref(), Some("AIza-bad"));
    }

    #[test]
    fn test_selected_key_is_persisted() {
        let store = SharedStore::default();
        let manager = CredentialManager::new(None, Some(Box::new(store.clone())));
        manager.open_select_key(" AIza-persist ").unwrap();

        // A fresh manager over the same store sees the selected key
        let restarted = CredentialManager::new(None, Some(Box::new(store)));
        assert_eq!(restarted.resolve(), Some(KeySource::KeyStore));
        assert_eq!(restarted.api_key().as_deref(), Some("AIza-persist"));

        restarted.invalidate();
        // The rejected key is the persisted one, so nothing is left
        assert_eq!(restarted.api_key(), None);
    }

    #[test]
    fn test_key_store_is_read_once() {
        let store = SharedStore::default();
        store.save("AIza-stored").unwrap();
        let manager = CredentialManager::new(Some("AIza-env".to_string()), Some(Box::new(store.clone())));

        manager.resolve();
        for _ in 0..5 {
            assert!(manager.has_selected_api_key());
        }
        manager.invalidate();
        assert_eq!(manager.api_key().as_deref(), Some("AIza-stored"));
        manager.invalidate();
        assert_eq!(manager.api_key(), None);
        assert!(!manager.has_selected_api_key());

        assert_eq!(store.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lazy_resolution_reads_store_once() {
        let store = SharedStore::default();
        let manager = CredentialManager::new(None, Some(Box::new(store.clone())));

        assert_eq!(manager.api_key(), None);
        manager.invalidate();
        assert_eq!(manager.api_key(), None);
        assert_eq!(store.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_keychain_keeps_key_across_stores() {
        let service = "com.research-librarian.test";
        let writer = KeychainStore::with_service(service);
        if let Err(e) = writer.save("AIza-keychain-test") {
            // No usable keychain on this host (e.g. a sandboxed CI runner)
            eprintln!("skipping keychain round trip: {}", e);
            return;
        }

        let reader = KeychainStore::with_service(service);
        let loaded = reader.load();
        reader.clear().unwrap();

        assert_eq!(loaded.unwrap().as_deref(), Some("AIza-keychain-test"));
        assert_eq!(KeychainStore::with_service(service).load().unwrap(), None);
    }

    #[test]
    fn test_forget_clears_everything() {
        let manager = CredentialManager::new(Some("AIza-env".to_string()), memory_store(Some("AIza-stored")));
        assert!(manager.has_selected_api_key());
        manager.forget().unwrap();
        assert!(!manager.has_selected_api_key());
    }
}

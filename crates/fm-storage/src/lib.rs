use fm_api_types::Session;
use std::cell::RefCell;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

pub const WALLET_ADDRESS_KEY: &str = "walletAddress";
pub const CONTRACT_BALANCE_KEY: &str = "contractBalance";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("storage is unavailable: {0}")]
    Unavailable(String),
    #[error("failed to read '{key}': {reason}")]
    Read { key: String, reason: String },
    #[error("failed to write '{key}': {reason}")]
    Write { key: String, reason: String },
}

/// Synchronous string key-value store (`localStorage` in the browser).
pub trait KeyValueBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    entries: RefCell<BTreeMap<String, String>>,
}

impl InMemoryBackend {
    pub fn keys(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }
}

impl KeyValueBackend for InMemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .borrow_mut()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

impl<B: KeyValueBackend + ?Sized> KeyValueBackend for std::rc::Rc<B> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

/// Durable mirror of the wallet session.
///
/// Owns exactly two keys under its namespace; `clear` never touches
/// anything else in the backend.
pub struct SessionStore<B> {
    backend: B,
    namespace: String,
}

impl<B: KeyValueBackend> SessionStore<B> {
    pub fn new(backend: B, namespace: &str) -> Self {
        Self {
            backend,
            namespace: namespace.to_owned(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn key(&self, name: &str) -> String {
        format!("{}:{}", self.namespace, name)
    }

    pub fn save(&self, session: &Session) -> Result<(), StorageError> {
        self.backend
            .set(&self.key(WALLET_ADDRESS_KEY), &session.wallet_address)?;
        self.backend
            .set(&self.key(CONTRACT_BALANCE_KEY), &session.cached_balance_ether)?;
        debug!(namespace = %self.namespace, "session saved");
        Ok(())
    }

    /// `None` when no address was persisted.
    pub fn load(&self) -> Result<Option<Session>, StorageError> {
        let wallet_address = self
            .backend
            .get(&self.key(WALLET_ADDRESS_KEY))?
            .unwrap_or_default();
        let cached_balance_ether = self
            .backend
            .get(&self.key(CONTRACT_BALANCE_KEY))?
            .unwrap_or_default();

        if wallet_address.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(Session {
            wallet_address,
            connected: true,
            cached_balance_ether,
        }))
    }

    /// Cached balance even when no address is stored.
    pub fn cached_balance(&self) -> Result<Option<String>, StorageError> {
        Ok(self
            .backend
            .get(&self.key(CONTRACT_BALANCE_KEY))?
            .filter(|balance| !balance.is_empty()))
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.backend.remove(&self.key(WALLET_ADDRESS_KEY))?;
        self.backend.remove(&self.key(CONTRACT_BALANCE_KEY))?;
        debug!(namespace = %self.namespace, "session cleared");
        Ok(())
    }
}

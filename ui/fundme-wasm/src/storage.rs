//! `localStorage` backend for the session store.

use fm_storage::{KeyValueBackend, StorageError};

fn storage() -> Result<web_sys::Storage, StorageError> {
    let window = web_sys::window().ok_or_else(|| StorageError::Unavailable("no window".into()))?;
    window
        .local_storage()
        .map_err(|e| StorageError::Unavailable(format!("{e:?}")))?
        .ok_or_else(|| StorageError::Unavailable("localStorage disabled".into()))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStorageBackend;

impl KeyValueBackend for LocalStorageBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        storage()?.get_item(key).map_err(|e| StorageError::Read {
            key: key.to_owned(),
            reason: format!("{e:?}"),
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        storage()?.set_item(key, value).map_err(|e| StorageError::Write {
            key: key.to_owned(),
            reason: format!("{e:?}"),
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        storage()?.remove_item(key).map_err(|e| StorageError::Write {
            key: key.to_owned(),
            reason: format!("{e:?}"),
        })
    }
}

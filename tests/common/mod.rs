#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use tollgate::{
    Capabilities, CodecError, CredentialCodec, CredentialStore, MemoryCredentialStore, Principal,
    StoreError,
};

/// Wraps a [`MemoryCredentialStore`], counting lookups and simulating outages.
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryCredentialStore,
    calls: AtomicUsize,
    down: AtomicBool,
}

impl CountingStore {
    pub fn with_principal(id: &str, token: Option<&str>, caps: &[&str]) -> Self {
        let store = CountingStore::default();
        store.inner.upsert(Principal {
            id: id.to_string(),
            current_token: token.map(str::to_string),
            capabilities: caps.iter().copied().collect::<Capabilities>(),
        });
        store
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

impl CredentialStore for CountingStore {
    fn lookup(&self, principal_id: &str) -> Result<Option<Principal>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        self.inner.lookup(principal_id)
    }
}

/// Tokens look like `<principal>:<serial>`.
#[derive(Default)]
pub struct ColonCodec {
    expired: Mutex<HashSet<String>>,
}

impl ColonCodec {
    pub fn expire(&self, token: &str) {
        self.expired.lock().unwrap().insert(token.to_string());
    }
}

impl CredentialCodec for ColonCodec {
    fn is_expired(&self, token: &str) -> bool {
        self.expired.lock().unwrap().contains(token)
    }

    fn subject(&self, token: &str) -> Result<String, CodecError> {
        token
            .split_once(':')
            .map(|(subject, _)| subject.to_string())
            .ok_or_else(|| CodecError(format!("no subject in {} byte token", token.len())))
    }
}

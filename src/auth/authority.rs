//! Contracts of the collaborators behind the authentication gate.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, StoreError};

/// The set of capabilities (authorities) granted to a principal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(BTreeSet<String>);

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, capability: &str) -> bool {
        self.0.contains(capability)
    }

    pub fn insert(&mut self, capability: impl Into<String>) -> bool {
        self.0.insert(capability.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for Capabilities {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Capabilities(iter.into_iter().map(Into::into).collect())
    }
}

/// A principal as recorded by the authoritative store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    /// The most recently issued token, if the principal has logged in.
    pub current_token: Option<String>,
    pub capabilities: Capabilities,
}

/// The authoritative, slower credential store.
///
/// Must reflect the most recently issued token for each principal.  Any
/// timeout belongs to the implementation; the gate imposes none.
pub trait CredentialStore: Send + Sync + 'static {
    /// `Ok(None)` when the principal does not exist.
    fn lookup(&self, principal_id: &str) -> Result<Option<Principal>, StoreError>;
}

/// Opaque token capability: expiry check and subject extraction.
pub trait CredentialCodec: Send + Sync + 'static {
    /// `true` if the token's own validity period has ended.
    fn is_expired(&self, token: &str) -> bool;

    /// The principal a token claims to belong to.
    fn subject(&self, token: &str) -> Result<String, CodecError>;
}

/// A [`CredentialStore`] held in process memory.
///
/// Stands in for a database in tests and small deployments.
#[derive(Default)]
pub struct MemoryCredentialStore {
    principals: RwLock<HashMap<String, Principal>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a principal.
    pub fn upsert(&self, principal: Principal) {
        self.principals
            .write()
            .insert(principal.id.clone(), principal);
    }

    /// Records a newly issued token.  Returns `false` for unknown principals.
    pub fn issue_token(&self, principal_id: &str, token: impl Into<String>) -> bool {
        match self.principals.write().get_mut(principal_id) {
            Some(p) => {
                p.current_token = Some(token.into());
                true
            }
            None => false,
        }
    }

    /// Clears the issued token.
    pub fn revoke_token(&self, principal_id: &str) {
        if let Some(p) = self.principals.write().get_mut(principal_id) {
            p.current_token = None;
        }
    }

    pub fn remove(&self, principal_id: &str) -> Option<Principal> {
        self.principals.write().remove(principal_id)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn lookup(&self, principal_id: &str) -> Result<Option<Principal>, StoreError> {
        Ok(self.principals.read().get(principal_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_collect_and_query() {
        let caps: Capabilities = ["ADMIN", "STAFF", "ADMIN"].into_iter().collect();
        assert_eq!(caps.len(), 2);
        assert!(caps.contains("STAFF"));
        assert_eq!(caps.iter().collect::<Vec<_>>(), vec!["ADMIN", "STAFF"]);
    }

    #[test]
    fn memory_store_tracks_issued_tokens() {
        let store = MemoryCredentialStore::new();
        store.upsert(Principal {
            id: "alice".into(),
            current_token: None,
            capabilities: Capabilities::new(),
        });

        assert!(store.issue_token("alice", "t1"));
        assert!(!store.issue_token("bob", "t1"));
        let alice = store.lookup("alice").unwrap().unwrap();
        assert_eq!(alice.current_token.as_deref(), Some("t1"));

        store.revoke_token("alice");
        assert_eq!(store.lookup("alice").unwrap().unwrap().current_token, None);
        assert!(store.lookup("bob").unwrap().is_none());
    }
}

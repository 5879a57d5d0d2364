//! Cache-first credential verification.

mod authority;
mod credential_cache;
mod gate;

pub use authority::{
    Capabilities, CredentialCodec, CredentialStore, MemoryCredentialStore, Principal,
};
pub use credential_cache::{CachedCredential, CredentialCache};
pub use gate::AuthenticationGate;

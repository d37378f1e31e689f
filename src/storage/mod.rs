//! Credential Storage
//!
//! This module provides:
//!
//! - **Key-Value Storage**: in-memory and file-backed string storage
//! - **Credential Store**: session persistence over a key-value backend

pub mod credentials;
pub mod kv;

pub use credentials::{
    CredentialStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_ID_KEY, USER_KEY,
};
pub use kv::{FileKeyValueStorage, InMemoryKeyValueStorage, KeyValueStorage};

#[cfg(test)]
pub use kv::MockKeyValueStorage;

//! plak - manage SSH server profiles, hosts-file domains and SSH keys
//!
//! The record stores keep the files they edit intact:
//! - `~/.ssh/config` `Host` stanzas are added and removed as whole blocks
//! - hosts-file aliases are added and removed one at a time
//! - key pairs are listed, inspected, generated and deleted as file pairs
//!
//! Anything a store does not understand is written back exactly as it was read.

pub mod cli;
pub mod config;
pub mod error;
pub mod ssh;
pub mod store;

pub use error::{PlakError, Result};

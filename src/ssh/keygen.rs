//! `ssh-keygen` invocations: key generation and fingerprint inspection

use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use zeroize::Zeroizing;

use crate::error::{PlakError, Result};
use crate::store::KeyDetails;

pub const KEYGEN: &str = "ssh-keygen";

/// Default RSA modulus size
pub const DEFAULT_RSA_BITS: u32 = 4096;

/// Key algorithms offered for generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyType {
    Rsa,
    #[default]
    Ed25519,
    Ecdsa,
    Dsa,
}

impl KeyType {
    pub const ALL: [KeyType; 4] = [KeyType::Rsa, KeyType::Ed25519, KeyType::Ecdsa, KeyType::Dsa];

    pub fn as_str(self) -> &'static str {
        match self {
            KeyType::Rsa => "rsa",
            KeyType::Ed25519 => "ed25519",
            KeyType::Ecdsa => "ecdsa",
            KeyType::Dsa => "dsa",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = PlakError;

    fn from_str(s: &str) -> Result<Self> {
        KeyType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PlakError::InvalidEntry(format!("unknown key type '{s}'")))
    }
}

/// Parameters for a new key pair
#[derive(Clone)]
pub struct KeyGenRequest {
    /// File name inside the key directory (e.g., "id_ed25519")
    pub name: String,
    pub key_type: KeyType,
    /// Only passed for RSA keys
    pub bits: Option<u32>,
    /// Empty for an unprotected key
    pub passphrase: Zeroizing<String>,
    pub comment: Option<String>,
}

impl fmt::Debug for KeyGenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyGenRequest")
            .field("name", &self.name)
            .field("key_type", &self.key_type)
            .field("bits", &self.bits)
            .field("passphrase", &if self.passphrase.is_empty() { "" } else { "***" })
            .field("comment", &self.comment)
            .finish()
    }
}

impl KeyGenRequest {
    pub fn new(name: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            name: name.into(),
            key_type,
            bits: (key_type == KeyType::Rsa).then_some(DEFAULT_RSA_BITS),
            passphrase: Zeroizing::new(String::new()),
            comment: None,
        }
    }

    pub fn with_bits(mut self, bits: u32) -> Self {
        self.bits = Some(bits);
        self
    }

    pub fn with_passphrase(mut self, passphrase: Zeroizing<String>) -> Self {
        self.passphrase = passphrase;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Arguments for `ssh-keygen` writing the pair to `path`
    pub fn args(&self, path: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-q".into(), "-t".into(), self.key_type.as_str().into()];
        if let (KeyType::Rsa, Some(bits)) = (self.key_type, self.bits) {
            args.push("-b".into());
            args.push(bits.to_string().into());
        }
        args.push("-f".into());
        args.push(path.into());
        args.push("-N".into());
        args.push(self.passphrase.as_str().into());
        if let Some(comment) = &self.comment {
            args.push("-C".into());
            args.push(comment.into());
        }
        args
    }
}

/// Arguments for `ssh-keygen -l`
pub fn fingerprint_args(path: &Path) -> Vec<OsString> {
    vec!["-l".into(), "-f".into(), path.into()]
}

/// Parse `ssh-keygen -l` output: `<bits> <fingerprint> <comment...> (<TYPE>)`
pub fn parse_fingerprint(output: &str) -> Option<KeyDetails> {
    let line = output.lines().find(|l| !l.trim().is_empty())?.trim();
    let mut tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 3 {
        return None;
    }

    let key_type = tokens
        .pop()?
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))?
        .to_string();
    let bit_length = tokens[0].parse().ok();
    let fingerprint = tokens[1].to_string();
    let comment = tokens[2..].join(" ");

    Some(KeyDetails {
        key_type,
        bit_length,
        fingerprint,
        comment,
    })
}

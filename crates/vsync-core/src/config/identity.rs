//! Active/passive identity configuration
//!
//! Each identity is given either as a keypair file (the 64-byte JSON array
//! written by the validator keygen tool) or directly as a base58 public key.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const KEYPAIR_LEN: usize = 64;
const PUBKEY_LEN: usize = 32;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentitiesConfig {
    /// Path to the active keypair file
    #[serde(default)]
    pub active: Option<String>,
    /// Path to the passive keypair file
    #[serde(default)]
    pub passive: Option<String>,
    #[serde(default)]
    pub active_pubkey: Option<String>,
    #[serde(default)]
    pub passive_pubkey: Option<String>,
}

/// Public keys of the configured pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identities {
    pub active: String,
    pub passive: String,
}

impl Identities {
    pub fn is_same(&self) -> bool {
        self.active == self.passive
    }
}

impl IdentitiesConfig {
    pub fn resolve(&self) -> Result<Identities> {
        Ok(Identities {
            active: resolve_one(
                "validator.identities.active",
                self.active.as_deref(),
                self.active_pubkey.as_deref(),
            )?,
            passive: resolve_one(
                "validator.identities.passive",
                self.passive.as_deref(),
                self.passive_pubkey.as_deref(),
            )?,
        })
    }
}

fn resolve_one(field: &str, keypair: Option<&str>, pubkey: Option<&str>) -> Result<String> {
    let keypair = keypair.map(str::trim).filter(|s| !s.is_empty());
    let pubkey = pubkey.map(str::trim).filter(|s| !s.is_empty());

    match (keypair, pubkey) {
        (Some(_), Some(_)) => Err(Error::config(
            field,
            "set either a keypair file or a public key, not both",
        )),
        (Some(path), None) => pubkey_from_keypair_file(Path::new(path))
            .map_err(|reason| Error::config(field, format!("{path}: {reason}"))),
        (None, Some(key)) => {
            validate_pubkey(key).map_err(|reason| Error::config(format!("{field}_pubkey"), reason))?;
            Ok(key.to_string())
        }
        (None, None) => Err(Error::config(
            field,
            "a keypair file or a public key is required",
        )),
    }
}

/// Base58 public key of a keypair file
pub fn pubkey_from_keypair_file(path: &Path) -> std::result::Result<String, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let bytes: Vec<u8> =
        serde_json::from_str(&content).map_err(|e| format!("not a keypair file: {e}"))?;
    pubkey_from_keypair_bytes(&bytes)
}

/// The public half of a 64-byte keypair is its last 32 bytes
pub fn pubkey_from_keypair_bytes(bytes: &[u8]) -> std::result::Result<String, String> {
    if bytes.len() != KEYPAIR_LEN {
        return Err(format!(
            "expected {KEYPAIR_LEN} bytes, found {}",
            bytes.len()
        ));
    }
    Ok(bs58::encode(&bytes[PUBKEY_LEN..]).into_string())
}

fn validate_pubkey(key: &str) -> std::result::Result<(), String> {
    let decoded = bs58::decode(key)
        .into_vec()
        .map_err(|e| format!("invalid base58 public key: {e}"))?;
    if decoded.len() != PUBKEY_LEN {
        return Err(format!(
            "public key decodes to {} bytes, expected {PUBKEY_LEN}",
            decoded.len()
        ));
    }
    Ok(())
}

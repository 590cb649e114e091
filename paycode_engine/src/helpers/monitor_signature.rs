//! # Monitor message signatures
//!
//! Monitor agents run on a device that watches for incoming payment notifications. They talk to the server over a
//! plain, unauthenticated transport, so every message carries a signature computed with the shared secret of the
//! merchant account the agent belongs to.
//!
//! ## Message format
//!
//! The signature is the lowercase hex MD5 digest of the signed field values concatenated in a fixed order, followed by
//! the secret. There are no separators.
//!
//! ```text
//!    heartbeat:  md5({t}{secret})
//!    push:       md5({type}{price}{t}{secret})
//! ```
//!
//! where `t` is the agent's timestamp string and `type` and `price` are the raw strings the agent sent. Fields are
//! signed exactly as received, so `1.10` and `1.1` produce different signatures.
//!
//! Signatures are compared by exact string equality. Nothing stops a captured message from being replayed; there is
//! no freshness window on `t`.

use paycode_common::Secret;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("The message signature is missing")]
    MissingSignature,
    #[error("The message signature does not match")]
    Mismatch,
}

/// Computes the expected signature over `fields` (in order) and the secret.
pub fn signature_for(fields: &[&str], secret: &Secret<String>) -> String {
    let mut message = fields.concat();
    message.push_str(secret.reveal());
    format!("{:x}", md5::compute(message.as_bytes()))
}

/// Checks `provided` against the signature recomputed from `fields` and the secret.
pub fn verify_signature(fields: &[&str], provided: &str, secret: &Secret<String>) -> Result<(), SignatureError> {
    if provided.is_empty() {
        return Err(SignatureError::MissingSignature);
    }
    if signature_for(fields, secret) == provided {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

pub fn heartbeat_signature(t: &str, secret: &Secret<String>) -> String {
    signature_for(&[t], secret)
}

pub fn push_signature(kind: &str, price: &str, t: &str, secret: &Secret<String>) -> String {
    signature_for(&[kind, price, t], secret)
}

pub fn verify_heartbeat(t: &str, provided: &str, secret: &Secret<String>) -> Result<(), SignatureError> {
    verify_signature(&[t], provided, secret)
}

pub fn verify_push(
    kind: &str,
    price: &str,
    t: &str,
    provided: &str,
    secret: &Secret<String>,
) -> Result<(), SignatureError> {
    verify_signature(&[kind, price, t], provided, secret)
}

//! Challenge-response authentication primitives
//!
//! The verifier issues a fresh random nonce, the prover signs the exact nonce
//! bytes with its Ed25519 secret key and replies `"<signature>,<nonce>"`,
//! with the signature in standard base64. The verifier rejects the reply
//! unless the echoed nonce matches the one it just issued and the signature
//! verifies against the stored public key.
//!
//! Each side owns one half of the key pair: the server only ever holds a
//! [`PublicKey`], the client only ever holds a [`SecretKey`].

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ct_protocol::{DIGEST_LEN, NONCE_LEN};
use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::AuthError;

/// Separator between signature and echoed nonce in an auth reply
pub const REPLY_SEPARATOR: char = ',';

/// Produces signatures over challenge nonces (client side)
pub trait Signer: Send + Sync {
    /// Sign `message`, returning the signature in its text form
    fn sign(&self, message: &[u8]) -> String;
}

/// Checks signatures over challenge nonces (server side)
pub trait Verifier: Send + Sync {
    /// Whether `signature` is a valid signature of `message`
    fn verify(&self, signature: &str, message: &[u8]) -> bool;
}

/// Ed25519 secret key held by the client
pub struct SecretKey(SigningKey);

impl SecretKey {
    /// Build a key from a raw 32-byte seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self(SigningKey::from_bytes(seed))
    }

    /// Derive a key deterministically from a passphrase
    ///
    /// The seed is the SHA-256 digest of the passphrase, so the same
    /// passphrase always unlocks the same key pair.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let seed: [u8; 32] = Sha256::digest(passphrase.as_bytes()).into();
        Self::from_seed(&seed)
    }

    /// The matching public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SecretKey").field(&"<redacted>").finish()
    }
}

impl Signer for SecretKey {
    fn sign(&self, message: &[u8]) -> String {
        sign(message, self)
    }
}

/// Ed25519 public key held by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Parse a base64-encoded 32-byte key
    pub fn from_base64(text: &str) -> Result<Self, AuthError> {
        let bytes = BASE64
            .decode(text.trim())
            .map_err(|e| AuthError::InvalidPublicKey(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AuthError::InvalidPublicKey(format!("expected 32 bytes, got {}", bytes.len())))?;
        let key =
            VerifyingKey::from_bytes(&bytes).map_err(|e| AuthError::InvalidPublicKey(e.to_string()))?;
        Ok(Self(key))
    }

    /// Base64 text form
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0.as_bytes())
    }
}

impl FromStr for PublicKey {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64(s)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl Verifier for PublicKey {
    fn verify(&self, signature: &str, message: &[u8]) -> bool {
        verify(signature, message, self)
    }
}

/// Sign `message` with `key`, returning a base64 signature
pub fn sign(message: &[u8], key: &SecretKey) -> String {
    use ed25519_dalek::Signer as _;
    BASE64.encode(key.0.sign(message).to_bytes())
}

/// Verify a base64 `signature` of `message` against `key`
///
/// Malformed signatures are simply invalid.
pub fn verify(signature: &str, message: &[u8], key: &PublicKey) -> bool {
    use ed25519_dalek::Verifier as _;
    let Ok(bytes) = BASE64.decode(signature) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&bytes) else {
        return false;
    };
    key.0.verify(message, &signature).is_ok()
}

/// SHA-256 digest of a password, the reply to a password prompt
pub fn password_digest(password: &str) -> [u8; DIGEST_LEN] {
    Sha256::digest(password.as_bytes()).into()
}

/// Generate a random printable nonce of [`NONCE_LEN`] characters
pub fn random_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}

/// Build the prover's reply to a challenge nonce
pub fn respond(nonce: &str, signer: &dyn Signer) -> String {
    format!("{}{}{}", signer.sign(nonce.as_bytes()), REPLY_SEPARATOR, nonce)
}

/// A single outstanding challenge
///
/// Verification consumes the challenge, so a nonce can never be checked
/// twice.
#[derive(Debug)]
pub struct Challenge {
    nonce: String,
}

impl Challenge {
    /// Issue a fresh challenge
    pub fn new() -> Self {
        Self {
            nonce: random_nonce(),
        }
    }

    /// The nonce to send to the prover
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// Check a `"<signature>,<nonce>"` reply against this challenge
    pub fn verify(self, reply: &str, verifier: &dyn Verifier) -> bool {
        let reply = reply.trim_end_matches(['\r', '\n']);
        let Some((signature, echoed)) = reply.split_once(REPLY_SEPARATOR) else {
            tracing::debug!("Auth reply has no separator");
            return false;
        };

        if !constant_time_eq(echoed.as_bytes(), self.nonce.as_bytes()) {
            tracing::debug!("Auth reply echoed a different nonce");
            return false;
        }

        verifier.verify(signature, self.nonce.as_bytes())
    }
}

impl Default for Challenge {
    fn default() -> Self {
        Self::new()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_matching_keys() {
        let secret = SecretKey::from_passphrase("correct horse");
        let public = secret.public_key();

        for _ in 0..8 {
            let nonce = random_nonce();
            let signature = sign(nonce.as_bytes(), &secret);
            assert!(verify(&signature, nonce.as_bytes(), &public));
        }
    }

    #[test]
    fn test_verify_rejects_other_key() {
        let secret = SecretKey::from_passphrase("correct horse");
        let other = SecretKey::from_passphrase("battery staple").public_key();

        let nonce = random_nonce();
        let signature = sign(nonce.as_bytes(), &secret);
        assert!(!verify(&signature, nonce.as_bytes(), &other));
    }

    #[test]
    fn test_verify_rejects_garbage_signature() {
        let public = SecretKey::from_passphrase("x").public_key();
        assert!(!verify("not base64!", b"msg", &public));
        assert!(!verify("AAAA", b"msg", &public));
    }

    #[test]
    fn test_passphrase_derivation_is_deterministic() {
        let a = SecretKey::from_passphrase("same").public_key();
        let b = SecretKey::from_passphrase("same").public_key();
        assert_eq!(a, b);
    }

    #[test]
    fn test_public_key_text_roundtrip() {
        let public = SecretKey::from_passphrase("roundtrip").public_key();
        let parsed: PublicKey = public.to_base64().parse().unwrap();
        assert_eq!(parsed, public);
    }

    #[test]
    fn test_public_key_rejects_wrong_length() {
        let result = PublicKey::from_base64(&BASE64.encode([7u8; 16]));
        assert!(matches!(result, Err(AuthError::InvalidPublicKey(_))));
    }

    #[test]
    fn test_nonce_shape() {
        let nonce = random_nonce();
        assert_eq!(nonce.len(), NONCE_LEN);
        assert!(nonce.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(nonce, random_nonce());
    }

    #[test]
    fn test_challenge_accepts_valid_reply() {
        let secret = SecretKey::from_passphrase("prover");
        let challenge = Challenge::new();
        let reply = respond(challenge.nonce(), &secret);
        assert!(challenge.verify(&reply, &secret.public_key()));
    }

    #[test]
    fn test_challenge_rejects_replayed_reply() {
        let secret = SecretKey::from_passphrase("prover");
        let public = secret.public_key();

        let first = Challenge::new();
        let stale_reply = respond(first.nonce(), &secret);
        assert!(first.verify(&stale_reply, &public));

        let second = Challenge::new();
        assert!(!second.verify(&stale_reply, &public));
    }

    #[test]
    fn test_challenge_rejects_mismatched_echo() {
        let secret = SecretKey::from_passphrase("prover");
        let challenge = Challenge::new();
        let signature = sign(challenge.nonce().as_bytes(), &secret);
        let reply = format!("{},{}", signature, random_nonce());
        assert!(!challenge.verify(&reply, &secret.public_key()));
    }

    #[test]
    fn test_challenge_rejects_malformed_reply() {
        let public = SecretKey::from_passphrase("prover").public_key();
        assert!(!Challenge::new().verify("no separator here", &public));
    }

    #[test]
    fn test_password_digest_len() {
        assert_eq!(password_digest("hunter2").len(), DIGEST_LEN);
        assert_ne!(password_digest("a"), password_digest("b"));
    }
}

//! RSA public key reconstruction from JWK key material.
//!
//! An RSA JWK carries its public key as two base64url (no padding) fields:
//! `n`, the big-endian modulus, and `e`, the big-endian public exponent.

use crate::errors::AuthError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::DecodingKey;
use std::fmt;

/// An RSA public key decoded from a key set.
///
/// Keeps the raw big-endian components next to the verification key built
/// from them, so the key can be re-encoded and compared.
#[derive(Clone)]
pub struct RsaPublicKey {
    modulus: Vec<u8>,
    exponent: Vec<u8>,
    decoding_key: DecodingKey,
}

impl RsaPublicKey {
    /// Big-endian modulus bytes, exactly as decoded.
    pub fn modulus(&self) -> &[u8] {
        &self.modulus
    }

    /// Big-endian public exponent bytes, exactly as decoded.
    pub fn exponent(&self) -> &[u8] {
        &self.exponent
    }

    /// The public exponent as an integer, if it fits in 64 bits.
    ///
    /// No upper bound is enforced when decoding; callers that need the
    /// numeric value get `None` for exponents wider than `u64`.
    pub fn public_exponent(&self) -> Option<u64> {
        let significant: Vec<u8> = self
            .exponent
            .iter()
            .copied()
            .skip_while(|b| *b == 0)
            .collect();
        if significant.len() > 8 {
            return None;
        }
        Some(
            significant
                .iter()
                .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)),
        )
    }

    /// Modulus re-encoded as base64url without padding.
    pub fn modulus_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.modulus)
    }

    /// Exponent re-encoded as base64url without padding.
    pub fn exponent_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.exponent)
    }

    /// Verification key for `jsonwebtoken`.
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for RsaPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaPublicKey")
            .field("modulus_bits", &(self.modulus.len() * 8))
            .field("public_exponent", &self.public_exponent())
            .finish()
    }
}

/// Build an RSA public key from base64url-encoded modulus and exponent.
///
/// # Errors
///
/// Returns `AuthError::Decoding` if either component is not valid
/// base64url without padding.
pub fn decode_rsa_public_key(n_b64url: &str, e_b64url: &str) -> Result<RsaPublicKey, AuthError> {
    let modulus = URL_SAFE_NO_PAD
        .decode(n_b64url)
        .map_err(|e| AuthError::Decoding(format!("invalid modulus encoding: {e}")))?;
    let exponent = URL_SAFE_NO_PAD
        .decode(e_b64url)
        .map_err(|e| AuthError::Decoding(format!("invalid exponent encoding: {e}")))?;

    let decoding_key = DecodingKey::from_rsa_raw_components(&modulus, &exponent);

    Ok(RsaPublicKey {
        modulus,
        exponent,
        decoding_key,
    })
}

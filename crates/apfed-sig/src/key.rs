//! RSA key loading and the key validity predicate: only extractable RSA
//! keys with modulus ≥ 2048 bits and SHA-256 hashing are accepted.

use apfed_error::{ApfedError, Result};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};

pub const MIN_MODULUS_BITS: usize = 2048;

pub fn load_public_key(pem: &str) -> Result<RsaPublicKey> {
    let key = RsaPublicKey::from_public_key_pem(pem.trim())
        .map_err(|e| ApfedError::unsupported_key("could not parse RSA public key").with_source(e))?;
    validate_public_key(&key)?;
    Ok(key)
}

pub fn load_private_key(pem: &str) -> Result<RsaPrivateKey> {
    let key = RsaPrivateKey::from_pkcs8_pem(pem.trim())
        .map_err(|e| ApfedError::unsupported_key("could not parse RSA private key").with_source(e))?;
    validate_public_key(&key.to_public_key())?;
    Ok(key)
}

/// The key validity predicate from the signature component design: reject
/// anything below 2048-bit modulus with `UnsupportedKey`.
pub fn validate_public_key(key: &RsaPublicKey) -> Result<()> {
    let bits = key.size() * 8;
    if bits < MIN_MODULUS_BITS {
        return Err(ApfedError::unsupported_key(format!(
            "RSA modulus too small: {bits} bits, require >= {MIN_MODULUS_BITS}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::EncodePrivateKey;
    use rsa::pkcs8::LineEnding;

    fn make_key(bits: usize) -> RsaPrivateKey {
        let mut rng = rand::thread_rng();
        RsaPrivateKey::new(&mut rng, bits).unwrap()
    }

    #[test]
    fn accepts_2048_bit_key() {
        let key = make_key(2048);
        let pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();
        assert!(load_private_key(&pem).is_ok());
    }

    #[test]
    fn rejects_undersized_key() {
        let key = make_key(1024);
        let pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let err = load_private_key(&pem).unwrap_err();
        assert_eq!(err.code(), apfed_error::ErrorCode::UnsupportedKey);
    }
}

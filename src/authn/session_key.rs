use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::errors::{Error, Result};

/// Bit size of per-instance session keys.
pub const SESSION_KEY_BITS: usize = 2048;

/// RSA keypair generated once per authenticator instance.
///
/// Used to sign the certificate signing request for platform-identity login
/// and as the private half of the resulting mutual-TLS identity.
pub struct SessionKey {
    private_key: RsaPrivateKey,
}

impl SessionKey {
    pub fn generate() -> Result<Self> {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, SESSION_KEY_BITS)
            .map_err(|e| Error::internal(format!("failed to generate session key: {}", e)))?;
        Ok(Self { private_key })
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// PKCS#8 PEM encoding of the private key.
    pub fn private_key_pem(&self) -> Result<Zeroizing<String>> {
        self.private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| Error::internal(format!("failed to encode session key: {}", e)))
    }

    /// Hex SHA-256 of the DER public key, safe to log.
    pub fn fingerprint(&self) -> Result<String> {
        let der = self
            .private_key
            .to_public_key()
            .to_public_key_der()
            .map_err(|e| Error::internal(format!("failed to encode public key: {}", e)))?;
        Ok(hex::encode(Sha256::digest(der.as_bytes())))
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey").field("bits", &SESSION_KEY_BITS).finish_non_exhaustive()
    }
}

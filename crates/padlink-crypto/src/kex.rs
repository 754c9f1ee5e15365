//! P-256 key agreement and key derivation.
//!
//! Public keys travel as 64 raw bytes `X || Y` (big-endian, 32 bytes each).
//! Both sides derive
//! `HKDF-SHA256(salt = peer_pub || local_pub, ikm = ecdh, info = "", L = 36)`
//! where "peer" is the pad and "local" is the host; swapping the salt order
//! yields keys the pad will not accept.

use hkdf::Hkdf;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{ecdh, PublicKey, SecretKey};
use rand_core::OsRng;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::key_material::{KeyMaterial, KEY_MATERIAL_LEN};

pub const RAW_PUBLIC_KEY_LEN: usize = 64;
/// SEC1 tag for an uncompressed point.
const UNCOMPRESSED_POINT_TAG: u8 = 0x04;

pub type RawPublicKey = [u8; RAW_PUBLIC_KEY_LEN];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KexError {
    #[error("invalid public key: expected 64 raw bytes of a P-256 point")]
    InvalidPublicKey,
    #[error("key derivation failed")]
    Derivation,
}

/// Ephemeral local key pair for one handshake.
///
/// The secret scalar is zeroized on drop by `p256::SecretKey`.
pub struct LocalKeyPair {
    secret: SecretKey,
    public_raw: RawPublicKey,
}

impl LocalKeyPair {
    /// Fresh key pair from the OS RNG.
    pub fn generate() -> Self {
        Self::from_secret(SecretKey::random(&mut OsRng))
    }

    /// Wrap an existing secret. Used for fixed-key tests and simulators.
    pub fn from_secret(secret: SecretKey) -> Self {
        let public_raw = encode_public_key(&secret.public_key());
        Self { secret, public_raw }
    }

    pub fn public_raw(&self) -> &RawPublicKey {
        &self.public_raw
    }

    /// ECDH with the peer's raw public key; returns the 32-byte x-coordinate.
    pub fn diffie_hellman(&self, peer_raw: &[u8]) -> Result<Zeroizing<[u8; 32]>, KexError> {
        let peer = decode_public_key(peer_raw)?;
        let shared = ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), peer.as_affine());

        let mut out = Zeroizing::new([0u8; 32]);
        out.copy_from_slice(shared.raw_secret_bytes().as_slice());
        Ok(out)
    }

    /// ECDH followed by HKDF, with this pair as the local side.
    pub fn derive_key_material(&self, peer_raw: &[u8]) -> Result<KeyMaterial, KexError> {
        let peer_pub: RawPublicKey = peer_raw.try_into().map_err(|_| KexError::InvalidPublicKey)?;
        let shared = self.diffie_hellman(&peer_pub)?;
        derive_key_material(&shared[..], &peer_pub, &self.public_raw)
    }
}

impl std::fmt::Debug for LocalKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeyPair")
            .field("public_raw", &hex::encode(&self.public_raw[..4]))
            .finish_non_exhaustive()
    }
}

/// `X || Y` of an uncompressed SEC1 point, without the `0x04` tag.
pub fn encode_public_key(key: &PublicKey) -> RawPublicKey {
    let point = key.to_encoded_point(false);
    let mut raw = [0u8; RAW_PUBLIC_KEY_LEN];
    // Uncompressed points are always 65 bytes: tag + 32 + 32.
    raw.copy_from_slice(&point.as_bytes()[1..]);
    raw
}

/// Parse 64 raw bytes back into a curve point.
pub fn decode_public_key(raw: &[u8]) -> Result<PublicKey, KexError> {
    if raw.len() != RAW_PUBLIC_KEY_LEN {
        return Err(KexError::InvalidPublicKey);
    }
    let mut sec1 = [0u8; RAW_PUBLIC_KEY_LEN + 1];
    sec1[0] = UNCOMPRESSED_POINT_TAG;
    sec1[1..].copy_from_slice(raw);
    PublicKey::from_sec1_bytes(&sec1).map_err(|_| KexError::InvalidPublicKey)
}

/// HKDF-SHA256 expansion of the shared secret into 36 bytes of key material.
pub fn derive_key_material(
    shared_secret: &[u8],
    peer_pub: &RawPublicKey,
    local_pub: &RawPublicKey,
) -> Result<KeyMaterial, KexError> {
    let mut salt = [0u8; RAW_PUBLIC_KEY_LEN * 2];
    salt[..RAW_PUBLIC_KEY_LEN].copy_from_slice(peer_pub);
    salt[RAW_PUBLIC_KEY_LEN..].copy_from_slice(local_pub);

    let hk = Hkdf::<Sha256>::new(Some(&salt), shared_secret);
    let mut okm = [0u8; KEY_MATERIAL_LEN];
    hk.expand(&[], &mut okm).map_err(|_| KexError::Derivation)?;

    Ok(KeyMaterial::from_bytes(okm))
}

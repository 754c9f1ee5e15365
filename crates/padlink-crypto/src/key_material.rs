//! Symmetric key material shared with one peripheral.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of the AES-256 key at the front of the key material.
pub const AES_KEY_LEN: usize = 32;
/// Length of the nonce prefix that follows the AES key.
pub const NONCE_PREFIX_LEN: usize = 4;
/// Total HKDF output length.
pub const KEY_MATERIAL_LEN: usize = AES_KEY_LEN + NONCE_PREFIX_LEN;

/// 36 bytes produced by the handshake: `aes_key(32) || nonce_prefix(4)`.
///
/// Never persisted. The bytes are wiped when the value is dropped, and
/// `Debug` does not print them.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    aes_key: [u8; AES_KEY_LEN],
    nonce_prefix: [u8; NONCE_PREFIX_LEN],
}

impl KeyMaterial {
    pub fn from_bytes(mut bytes: [u8; KEY_MATERIAL_LEN]) -> Self {
        let mut aes_key = [0u8; AES_KEY_LEN];
        let mut nonce_prefix = [0u8; NONCE_PREFIX_LEN];
        aes_key.copy_from_slice(&bytes[..AES_KEY_LEN]);
        nonce_prefix.copy_from_slice(&bytes[AES_KEY_LEN..]);
        bytes.zeroize();
        Self {
            aes_key,
            nonce_prefix,
        }
    }

    /// Build from a slice; `None` unless it is exactly 36 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; KEY_MATERIAL_LEN] = bytes.try_into().ok()?;
        Some(Self::from_bytes(bytes))
    }

    pub fn aes_key(&self) -> &[u8; AES_KEY_LEN] {
        &self.aes_key
    }

    pub fn nonce_prefix(&self) -> &[u8; NONCE_PREFIX_LEN] {
        &self.nonce_prefix
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_layout() {
        let mut raw = [0u8; KEY_MATERIAL_LEN];
        for (i, b) in raw.iter_mut().enumerate() {
            *b = i as u8;
        }
        let km = KeyMaterial::from_bytes(raw);

        assert_eq!(km.aes_key()[0], 0);
        assert_eq!(km.aes_key()[31], 31);
        assert_eq!(km.nonce_prefix(), &[32, 33, 34, 35]);
    }

    #[test]
    fn test_from_slice_rejects_wrong_length() {
        assert!(KeyMaterial::from_slice(&[0u8; 35]).is_none());
        assert!(KeyMaterial::from_slice(&[0u8; 37]).is_none());
        assert!(KeyMaterial::from_slice(&[0u8; 36]).is_some());
    }

    #[test]
    fn test_debug_hides_bytes() {
        let km = KeyMaterial::from_bytes([0xAB; KEY_MATERIAL_LEN]);
        let printed = format!("{km:?}");
        assert!(!printed.contains("171"));
        assert_eq!(printed, "KeyMaterial { .. }");
    }

    #[test]
    fn test_zeroize_clears_bytes() {
        let mut km = KeyMaterial::from_bytes([0x5A; KEY_MATERIAL_LEN]);
        km.zeroize();
        assert_eq!(km.aes_key(), &[0u8; AES_KEY_LEN]);
        assert_eq!(km.nonce_prefix(), &[0u8; NONCE_PREFIX_LEN]);
    }
}

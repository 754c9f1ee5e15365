
#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use crate::ccm::{build_nonce, cbc_mac_tag, seal};
    use crate::counter_window::{CounterObservation, CounterWindow};
    use crate::key_material::KeyMaterial;
    use crate::packet::{decrypt, DecryptError, MIN_PACKET_LEN};

    fn key_from(seed: [u8; 32], prefix: [u8; 4]) -> KeyMaterial {
        let mut raw = [0u8; 36];
        raw[..32].copy_from_slice(&seed);
        raw[32..].copy_from_slice(&prefix);
        KeyMaterial::from_bytes(raw)
    }

    proptest! {
        // Tag determinism
        #[test]
        fn test_tag_is_deterministic(
            key in any::<[u8; 32]>(),
            nonce in any::<[u8; 8]>(),
            plaintext in proptest::collection::vec(any::<u8>(), 0..64)
        ) {
            prop_assert_eq!(
                cbc_mac_tag(&key, &nonce, &plaintext),
                cbc_mac_tag(&key, &nonce, &plaintext)
            );
        }

        // Seal then decrypt recovers the plaintext and authenticates
        #[test]
        fn test_sealed_packets_authenticate(
            seed in any::<[u8; 32]>(),
            prefix in any::<[u8; 4]>(),
            counter in any::<[u8; 4]>(),
            plaintext in proptest::collection::vec(any::<u8>(), 0..48)
        ) {
            let key = key_from(seed, prefix);
            let packet = seal(&key, counter, &plaintext);
            prop_assert_eq!(packet.len(), plaintext.len() + MIN_PACKET_LEN);

            let out = decrypt(&key, &packet).unwrap();
            prop_assert!(out.authentic);
            prop_assert_eq!(out.plaintext, plaintext);
        }

        // Any single bit flip anywhere in the packet breaks authenticity
        #[test]
        fn test_single_bit_flip_is_detected(
            seed in any::<[u8; 32]>(),
            prefix in any::<[u8; 4]>(),
            counter in any::<[u8; 4]>(),
            plaintext in proptest::collection::vec(any::<u8>(), 1..32),
            position in any::<prop::sample::Index>(),
            bit in 0u8..8
        ) {
            let key = key_from(seed, prefix);
            let mut packet = seal(&key, counter, &plaintext);
            let idx = position.index(packet.len());
            packet[idx] ^= 1 << bit;

            prop_assert!(!decrypt(&key, &packet).unwrap().authentic);
        }

        // Changing the nonce prefix (i.e. the key material) breaks authenticity
        #[test]
        fn test_nonce_prefix_change_is_detected(
            seed in any::<[u8; 32]>(),
            prefix in any::<[u8; 4]>(),
            flip in 0usize..32,
            plaintext in proptest::collection::vec(any::<u8>(), 0..32)
        ) {
            let key = key_from(seed, prefix);
            let packet = seal(&key, [1, 0, 0, 0], &plaintext);

            let mut other_prefix = prefix;
            other_prefix[flip / 8] ^= 1 << (flip % 8);
            let other = key_from(seed, other_prefix);

            prop_assert!(!decrypt(&other, &packet).unwrap().authentic);
        }

        // Short packets never panic
        #[test]
        fn test_short_packets_are_rejected(
            bytes in proptest::collection::vec(any::<u8>(), 0..MIN_PACKET_LEN)
        ) {
            let key = key_from([0u8; 32], [0u8; 4]);
            prop_assert_eq!(
                decrypt(&key, &bytes),
                Err(DecryptError::TooShort { len: bytes.len() })
            );
        }

        // Arbitrary input of valid length decrypts without panicking
        #[test]
        fn test_arbitrary_packets_do_not_panic(
            bytes in proptest::collection::vec(any::<u8>(), MIN_PACKET_LEN..80)
        ) {
            let key = key_from([9u8; 32], [1, 2, 3, 4]);
            prop_assert!(decrypt(&key, &bytes).is_ok());
        }

        // Nonce layout
        #[test]
        fn test_nonce_concatenation(prefix in any::<[u8; 4]>(), counter in any::<[u8; 4]>()) {
            let nonce = build_nonce(&prefix, &counter);
            prop_assert_eq!(&nonce[..4], &prefix[..]);
            prop_assert_eq!(&nonce[4..], &counter[..]);
        }

        // Every counter is fresh exactly once while it stays in the window
        #[test]
        fn test_counter_window_first_sight_is_fresh(
            counters in proptest::collection::vec(0u32..512, 1..200)
        ) {
            let mut window = CounterWindow::new();
            let mut seen = std::collections::HashSet::new();

            for c in counters {
                let expected = if seen.insert(c) {
                    CounterObservation::Fresh
                } else {
                    CounterObservation::Repeated
                };
                prop_assert_eq!(window.observe(c), expected);
            }
            prop_assert_eq!(window.distinct(), seen.len() as u64);
        }
    }
}

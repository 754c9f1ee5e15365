
#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use crate::buttons::{decode, encode, read_varint, Button};
    use crate::session::{PacketOutcome, SessionInput, SessionMachine};
    use padlink_crypto::ccm::seal;
    use padlink_crypto::KeyMaterial;

    fn button() -> impl Strategy<Value = Button> {
        prop::sample::select(Button::ALL.to_vec())
    }

    fn subscribed(key: [u8; 36]) -> SessionMachine {
        let mut machine = SessionMachine::new();
        machine.handle(SessionInput::Connect).unwrap();
        machine.handle(SessionInput::GattReady).unwrap();
        machine
            .handle(SessionInput::HandshakeSucceeded(KeyMaterial::from_bytes(key)))
            .unwrap();
        machine
    }

    proptest! {
        // Decoder never panics and never consumes past the input
        #[test]
        fn test_decode_arbitrary_payload(payload in proptest::collection::vec(any::<u8>(), 0..64)) {
            let state = decode(&payload);
            prop_assert!(state.len() <= Button::ALL.len());

            let (_, used) = read_varint(&payload);
            prop_assert!(used <= payload.len());
        }

        // Encoded fields decode back, last write wins
        #[test]
        fn test_encoded_fields_decode(fields in proptest::collection::vec((button(), any::<u64>()), 0..12)) {
            let state = decode(&encode(&fields));
            for (button, _) in &fields {
                let last = fields.iter().rev().find(|(b, _)| b == button).map(|(_, v)| *v);
                prop_assert_eq!(state.get(*button), last);
            }
        }

        // Garbage notifications never produce events or change state
        #[test]
        fn test_garbage_never_emits(
            key in proptest::collection::vec(any::<u8>(), 36),
            packets in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..40), 1..20)
        ) {
            let key: [u8; 36] = key.try_into().unwrap();
            let mut machine = subscribed(key);
            for packet in &packets {
                let outcome = machine.on_notification(packet);
                let is_rejection = matches!(
                    outcome,
                    PacketOutcome::AuthFailed { .. } | PacketOutcome::Malformed { .. }
                );
                prop_assert!(is_rejection);
            }
            prop_assert_eq!(machine.stats().events_emitted, 0);
            prop_assert_eq!(machine.stats().packets_received, packets.len() as u64);
        }

        // Repeating the same report never emits twice
        #[test]
        fn test_same_report_is_idempotent(
            fields in proptest::collection::vec((button(), 0u64..3), 1..8)
        ) {
            let key = [7u8; 36];
            let mut machine = subscribed(key);
            let mut plaintext = vec![0x07];
            plaintext.extend(encode(&fields));

            let material = KeyMaterial::from_bytes(key);
            machine.on_notification(&seal(&material, 1u32.to_le_bytes(), &plaintext));
            let second = machine.on_notification(&seal(&material, 2u32.to_le_bytes(), &plaintext));
            prop_assert_eq!(second, PacketOutcome::Buttons(vec![]));
        }
    }
}

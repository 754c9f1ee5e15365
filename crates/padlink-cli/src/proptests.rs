//! Property-based tests for padlink-cli

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::inspect::{decode_payload, parse_hex, parse_key_material, InputError};
    use crate::output::{OutputFormat, OutputFormatter};

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        // Any 36 bytes are accepted as key material, in either hex case.
        #[test]
        fn test_key_material_accepts_any_36_bytes(
            bytes in prop::collection::vec(any::<u8>(), 36),
            upper in any::<bool>()
        ) {
            let mut text = hex::encode(&bytes);
            if upper {
                text = text.to_uppercase();
            }
            let key = parse_key_material(&text).unwrap();
            prop_assert_eq!(&key.aes_key()[..], &bytes[..32]);
            prop_assert_eq!(&key.nonce_prefix()[..], &bytes[32..]);
        }

        #[test]
        fn test_key_material_rejects_other_lengths(
            bytes in prop::collection::vec(any::<u8>(), 0..80)
        ) {
            prop_assume!(bytes.len() != 36);
            let err = parse_key_material(&hex::encode(&bytes)).unwrap_err();
            let is_length_error = matches!(err, InputError::KeyLength { len, .. } if len == bytes.len());
            prop_assert!(is_length_error);
        }

        // Separators never change the parsed bytes.
        #[test]
        fn test_separators_are_ignored(bytes in prop::collection::vec(any::<u8>(), 1..40)) {
            let spaced = bytes
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(":");
            prop_assert_eq!(parse_hex(&spaced).unwrap(), bytes);
        }

        // Every payload renders as valid JSON.
        #[test]
        fn test_decode_output_is_valid_json(payload in prop::collection::vec(any::<u8>(), 0..64)) {
            let formatter = OutputFormatter::new(OutputFormat::Json, false);
            let output = formatter.format_decode(&decode_payload(&payload));
            let value: serde_json::Value = serde_json::from_str(&output).unwrap();
            prop_assert_eq!(&value["success"], &serde_json::Value::Bool(true));
        }
    }
}

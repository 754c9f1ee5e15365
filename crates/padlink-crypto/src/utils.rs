//! Constant-time comparison helpers, used for tag checks.

use constant_time_eq::constant_time_eq;

/// Compare two byte slices in constant time.
///
/// Slices of different length compare unequal.
///
/// ```rust
/// use padlink_crypto::utils::constant_time_compare;
///
/// assert!(constant_time_compare(b"tag!", b"tag!"));
/// assert!(!constant_time_compare(b"tag!", b"tag?"));
/// ```
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    constant_time_eq(a, b)
}

/// Compare two fixed-size arrays in constant time.
///
/// ```rust
/// use padlink_crypto::utils::constant_time_compare_array;
///
/// assert!(constant_time_compare_array(&[1u8, 2, 3, 4], &[1, 2, 3, 4]));
/// assert!(!constant_time_compare_array(&[1u8, 2, 3, 4], &[1, 2, 3, 5]));
/// ```
pub fn constant_time_compare_array<const N: usize>(a: &[u8; N], b: &[u8; N]) -> bool {
    constant_time_eq(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_compare_different_length() {
        assert!(!constant_time_compare(&[1, 2, 3], &[1, 2, 3, 4]));
    }

    #[test]
    fn test_tag_sized_compare() {
        let tag = [0xDE, 0xAD, 0xBE, 0xEF];
        assert!(constant_time_compare_array(&tag, &[0xDE, 0xAD, 0xBE, 0xEF]));

        for i in 0..4 {
            let mut other = tag;
            other[i] ^= 0x80;
            assert!(!constant_time_compare_array(&tag, &other));
        }
    }
}

//! Property tests for index arguments

use proptest::prelude::*;
use sysplug_filter::{parse_index, IndexError};

proptest! {
    #[test]
    fn canonical_numbers_round_trip(n in any::<u64>()) {
        prop_assert_eq!(parse_index(&n.to_string()), Ok(n));
    }

    #[test]
    fn leading_zeros_are_rejected(n in any::<u64>(), zeros in 1usize..4) {
        let text = format!("{}{}", "0".repeat(zeros), n);
        prop_assert_eq!(parse_index(&text), Err(IndexError::LeadingZero));
    }

    #[test]
    fn non_digits_are_rejected(prefix in "[0-9]{0,5}", bad in "[^0-9]", suffix in "[0-9a-z]{0,5}") {
        let text = format!("{}{}{}", prefix, bad, suffix);
        prop_assert_eq!(parse_index(&text), Err(IndexError::NotDigits));
    }

    #[test]
    fn numbers_beyond_64_bits_overflow(extra in 1u32..1000) {
        let text = (u128::from(u64::MAX) + u128::from(extra)).to_string();
        prop_assert_eq!(parse_index(&text), Err(IndexError::Overflow));
    }
}

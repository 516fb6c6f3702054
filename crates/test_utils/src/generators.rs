//! Property-Based Test Generators
//!
//! proptest strategies for claim states and amounts, and `fake`-backed
//! realistic values for example-based tests.

use fake::Fake;
use proptest::prelude::*;
use rust_decimal::Decimal;

use core_kernel::Amount;
use domain_claims::ClaimStatus;

/// Strategy over every claim status
pub fn claim_status_strategy() -> impl Strategy<Value = ClaimStatus> {
    prop::sample::select(ClaimStatus::ALL.to_vec())
}

/// Strategy for ordered (from, to) status pairs, including self-pairs
pub fn status_pair_strategy() -> impl Strategy<Value = (ClaimStatus, ClaimStatus)> {
    (claim_status_strategy(), claim_status_strategy())
}

/// Strategy for positive amounts between 0.01 and 99,999,999.99
pub fn positive_amount_strategy() -> impl Strategy<Value = Amount> {
    (1i64..10_000_000_000i64).prop_map(Amount::from_cents)
}

/// A plausible ICD-10 style diagnosis code, e.g. `K35.80`
pub fn fake_diagnosis_code() -> String {
    let letter = char::from(b'A' + (0..26u8).fake::<u8>());
    let category: u8 = (0..100u8).fake();
    let subcategory: u8 = (0..100u8).fake();
    format!("{}{:02}.{}", letter, category, subcategory)
}

/// A positive amount with cents, up to 25,000.00
pub fn fake_amount() -> Amount {
    let cents: i64 = (100..2_500_000i64).fake();
    Amount::new(Decimal::new(cents, 2))
}

/// A free-text treatment type
pub fn fake_treatment_type() -> String {
    const TREATMENTS: [&str; 5] = ["chemotherapy", "physiotherapy", "dialysis", "surgery", "radiotherapy"];
    TREATMENTS[(0..TREATMENTS.len()).fake::<usize>()].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_values_are_valid() {
        for _ in 0..50 {
            let code = fake_diagnosis_code();
            assert!(!code.is_empty() && code.len() <= 50);
            assert!(fake_amount().is_positive());
        }
    }

    proptest! {
        #[test]
        fn prop_generated_amounts_are_positive(amount in positive_amount_strategy()) {
            prop_assert!(amount.is_positive());
        }
    }
}

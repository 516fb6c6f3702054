//! Custom Test Assertions
//!
//! Assertion helpers for domain errors and claims that print the offending
//! value instead of a bare `assertion failed`.

use core_kernel::DomainError;
use domain_claims::{Claim, ClaimStatus};

/// Asserts that `result` failed with the given HTTP status code
///
/// # Panics
///
/// Panics if `result` is `Ok` or carries a different status
pub fn assert_domain_error<T: std::fmt::Debug>(result: &Result<T, DomainError>, status_code: u16) {
    match result {
        Ok(value) => panic!("Expected error with status {}, got Ok({:?})", status_code, value),
        Err(err) => assert_eq!(
            err.status_code(),
            status_code,
            "Expected status {}, got {}: {}",
            status_code,
            err.status_code(),
            err
        ),
    }
}

/// Asserts that `result` failed with the given machine error code
pub fn assert_error_code<T: std::fmt::Debug>(result: &Result<T, DomainError>, error_code: &str) {
    match result {
        Ok(value) => panic!("Expected error {}, got Ok({:?})", error_code, value),
        Err(err) => assert_eq!(
            err.error_code(),
            error_code,
            "Expected error code {}, got {}: {}",
            error_code,
            err.error_code(),
            err
        ),
    }
}

/// Asserts every claim is in `status`
pub fn assert_all_in_status(claims: &[Claim], status: ClaimStatus) {
    for claim in claims {
        assert_eq!(
            claim.status, status,
            "Claim {} is {}, expected {}",
            claim.id, claim.status, status
        );
    }
}

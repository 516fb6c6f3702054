//! Pre-built Test Fixtures
//!
//! Tenant identities for each role and fixed timestamps, so tests read as
//! "an admin of org A" rather than a wall of constructors.

use chrono::{DateTime, TimeZone, Utc};
use core_kernel::{Amount, OrganizationId, Role, TenantContext, UserId};
use rust_decimal_macros::dec;

/// Tenant identities
pub struct TenantFixtures;

impl TenantFixtures {
    /// An admin of `organization_id` with a fresh user id
    pub fn admin(organization_id: OrganizationId) -> TenantContext {
        TenantContext::new(organization_id, UserId::new(), Role::Admin)
    }

    pub fn processor(organization_id: OrganizationId) -> TenantContext {
        TenantContext::new(organization_id, UserId::new(), Role::Processor)
    }

    pub fn provider(organization_id: OrganizationId) -> TenantContext {
        TenantContext::new(organization_id, UserId::new(), Role::Provider)
    }

    pub fn patient(organization_id: OrganizationId) -> TenantContext {
        TenantContext::new(organization_id, UserId::new(), Role::Patient)
    }

    /// The same user acting under a different role
    pub fn as_role(ctx: &TenantContext, role: Role) -> TenantContext {
        TenantContext::new(ctx.organization_id, ctx.user_id, role)
    }
}

/// Fixed timestamps
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// Admission of the standard scenario (Mar 1, 2024 08:00 UTC)
    pub fn admission() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    /// Treatment start, two days after admission
    pub fn treatment() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 3, 10, 30, 0).unwrap()
    }

    /// Discharge, a week after admission
    pub fn discharge() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 8, 16, 0, 0).unwrap()
    }
}

/// Claim amounts
pub struct AmountFixtures;

impl AmountFixtures {
    pub fn standard() -> Amount {
        Amount::new(dec!(1250.00))
    }

    pub fn small() -> Amount {
        Amount::new(dec!(75.50))
    }

    pub fn large() -> Amount {
        Amount::new(dec!(48000.00))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_fixtures() {
        let org = OrganizationId::new();
        assert!(TenantFixtures::admin(org).is_admin());
        assert_eq!(TenantFixtures::patient(org).role, Role::Patient);

        let provider = TenantFixtures::provider(org);
        let same_user = TenantFixtures::as_role(&provider, Role::Patient);
        assert_eq!(same_user.user_id, provider.user_id);
    }

    #[test]
    fn test_scenario_is_chronological() {
        assert!(TemporalFixtures::admission() < TemporalFixtures::treatment());
        assert!(TemporalFixtures::treatment() < TemporalFixtures::discharge());
    }
}

//! Cache key scheme for claims
//!
//! ```text
//! claim:{orgId}:{claimId}          single claim
//! claims:{orgId}:{filterString}    one list query
//! ```
//!
//! Every key embeds the organization id, so tenants never share an entry.
//! All list entries of a tenant share the `claims:{orgId}:` prefix and are
//! invalidated together.

use core_kernel::{ClaimId, OrganizationId};
use crate::query::ClaimQuery;

/// Cache type label for single-claim entries
pub const CLAIM_CACHE: &str = "claim";
/// Cache type label for list entries
pub const CLAIMS_LIST_CACHE: &str = "claims_list";

pub fn claim_key(organization_id: OrganizationId, claim_id: ClaimId) -> String {
    format!("claim:{}:{}", organization_id.as_uuid(), claim_id.as_uuid())
}

/// Prefix shared by every list entry of a tenant
pub fn claims_list_prefix(organization_id: OrganizationId) -> String {
    format!("claims:{}:", organization_id.as_uuid())
}

pub fn claims_list_key(organization_id: OrganizationId, query: &ClaimQuery) -> String {
    format!("{}{}", claims_list_prefix(organization_id), query.cache_filter_string())
}

//! Role-based access rules for claims
//!
//! | role      | create | read           | update         | bulk | list scope           |
//! |-----------|--------|----------------|----------------|------|----------------------|
//! | admin     | yes    | any            | any            | yes  | all                  |
//! | processor | yes    | assigned to me | assigned to me | no   | assigned to me       |
//! | provider  | yes    | my claims      | never          | no   | provider = me        |
//! | patient   | no     | my claims      | never          | no   | patient = me         |

use core_kernel::{DomainError, Role, TenantContext};
use crate::claim::Claim;
use crate::query::ClaimQuery;

pub fn check_create(ctx: &TenantContext) -> Result<(), DomainError> {
    match ctx.role {
        Role::Admin | Role::Processor | Role::Provider => Ok(()),
        Role::Patient => Err(DomainError::forbidden("You cannot create claims")),
    }
}

pub fn check_read(ctx: &TenantContext, claim: &Claim) -> Result<(), DomainError> {
    match ctx.role {
        Role::Admin => Ok(()),
        Role::Processor if claim.assigned_processor_id == Some(ctx.user_id) => Ok(()),
        Role::Processor => Err(DomainError::forbidden("You can only view claims assigned to you")),
        Role::Provider if claim.provider_id == ctx.user_id => Ok(()),
        Role::Patient if claim.patient_id == ctx.user_id => Ok(()),
        Role::Provider | Role::Patient => Err(DomainError::forbidden("You can only view your own claims")),
    }
}

pub fn check_update(ctx: &TenantContext, claim: &Claim) -> Result<(), DomainError> {
    match ctx.role {
        Role::Admin => Ok(()),
        Role::Processor if claim.assigned_processor_id == Some(ctx.user_id) => Ok(()),
        Role::Processor => Err(DomainError::forbidden("You can only update claims assigned to you")),
        Role::Provider | Role::Patient => Err(DomainError::forbidden("You cannot update claims")),
    }
}

pub fn check_bulk_update(ctx: &TenantContext) -> Result<(), DomainError> {
    if ctx.is_admin() {
        return Ok(());
    }
    Err(DomainError::forbidden("Only admins can perform bulk status updates"))
}

/// Forces the caller's own identity onto a list query
///
/// Forced filters replace whatever the caller supplied for the patient,
/// provider and processor fields.
pub fn scope_query(ctx: &TenantContext, mut query: ClaimQuery) -> ClaimQuery {
    match ctx.role {
        Role::Admin => {}
        Role::Processor => {
            query.assigned_processor_id = Some(ctx.user_id);
            query.patient_id = None;
            query.provider_id = None;
        }
        Role::Provider => {
            query.provider_id = Some(ctx.user_id);
            query.patient_id = None;
            query.assigned_processor_id = None;
        }
        Role::Patient => {
            query.patient_id = Some(ctx.user_id);
            query.provider_id = None;
            query.assigned_processor_id = None;
        }
    }
    query
}

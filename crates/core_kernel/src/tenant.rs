//! Per-operation tenant scope
//!
//! A `TenantContext` is bound for the duration of one logical operation
//! (an inbound request or one job execution) with [`scope`]. Anything
//! running inside that future can read it with [`current`] without the
//! value being threaded through every call.
//!
//! The binding is task-local: concurrently running operations each observe
//! only their own value. A task spawned with `tokio::spawn` does not inherit
//! the scope and must bind its own.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;

use crate::error::DomainError;
use crate::identifiers::{OrganizationId, UserId};

tokio::task_local! {
    static TENANT: TenantContext;
}

/// Role of the acting user within its organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Processor,
    Provider,
    Patient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Processor => "processor",
            Role::Provider => "provider",
            Role::Patient => "patient",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "processor" => Ok(Role::Processor),
            "provider" => Ok(Role::Provider),
            "patient" => Ok(Role::Patient),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Identity of the caller for one logical operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub organization_id: OrganizationId,
    pub user_id: UserId,
    pub role: Role,
}

impl TenantContext {
    pub fn new(organization_id: OrganizationId, user_id: UserId, role: Role) -> Self {
        Self {
            organization_id,
            user_id,
            role,
        }
    }

    /// The identity background jobs run under
    pub fn system(organization_id: OrganizationId) -> Self {
        Self::new(organization_id, UserId::SYSTEM, Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Runs `fut` with `ctx` bound as the current tenant
pub async fn scope<F>(ctx: TenantContext, fut: F) -> F::Output
where
    F: Future,
{
    TENANT.scope(ctx, fut).await
}

/// Returns the tenant bound to the running operation
///
/// # Errors
///
/// Returns `DomainError::Unauthorized` when no scope has been established.
pub fn current() -> Result<TenantContext, DomainError> {
    TENANT
        .try_with(|ctx| ctx.clone())
        .map_err(|_| DomainError::unauthorized("Tenant context not established"))
}

/// Returns the bound tenant, if any
pub fn try_current() -> Option<TenantContext> {
    TENANT.try_with(|ctx| ctx.clone()).ok()
}

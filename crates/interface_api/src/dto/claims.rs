//! Claims DTOs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use core_kernel::{Amount, ClaimId, UserId};
use domain_claims::{
    query::DEFAULT_LIMIT, AuditAction, Claim, ClaimAudit, ClaimChanges, ClaimQuery, ClaimStatus,
    NewClaim, Page, SortField, SortOrder,
};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateClaimRequest {
    pub patient_id: Uuid,
    pub provider_id: Uuid,
    #[validate(length(min = 1, max = 50))]
    pub diagnosis_code: String,
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
    pub assigned_processor_id: Option<Uuid>,
}

impl From<CreateClaimRequest> for NewClaim {
    fn from(request: CreateClaimRequest) -> Self {
        NewClaim {
            patient_id: UserId::from_uuid(request.patient_id),
            provider_id: UserId::from_uuid(request.provider_id),
            diagnosis_code: request.diagnosis_code,
            amount: Amount::new(request.amount),
            assigned_processor_id: request.assigned_processor_id.map(UserId::from_uuid),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "at_least_one_change"))]
pub struct UpdateClaimRequest {
    pub status: Option<ClaimStatus>,
    pub assigned_processor_id: Option<Uuid>,
    #[validate(length(min = 1, max = 50))]
    pub diagnosis_code: Option<String>,
    #[validate(custom(function = "positive_amount"))]
    pub amount: Option<Decimal>,
}

impl From<UpdateClaimRequest> for ClaimChanges {
    fn from(request: UpdateClaimRequest) -> Self {
        ClaimChanges {
            status: request.status,
            assigned_processor_id: request.assigned_processor_id.map(UserId::from_uuid),
            diagnosis_code: request.diagnosis_code,
            amount: request.amount.map(Amount::new),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BulkStatusUpdateRequest {
    #[validate(length(min = 1, max = 100))]
    pub claim_ids: Vec<Uuid>,
    pub status: ClaimStatus,
}

impl BulkStatusUpdateRequest {
    pub fn ids(&self) -> Vec<ClaimId> {
        self.claim_ids.iter().copied().map(ClaimId::from_uuid).collect()
    }
}

/// Query string of `GET /api/claims`
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "ordered_ranges"))]
pub struct ListClaimsParams {
    pub status: Option<ClaimStatus>,
    pub patient_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
    pub assigned_processor_id: Option<Uuid>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    #[validate(custom(function = "positive_amount"))]
    pub min_amount: Option<Decimal>,
    #[validate(custom(function = "positive_amount"))]
    pub max_amount: Option<Decimal>,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub sort_by: Option<SortField>,
    pub sort_order: Option<SortOrder>,
}

impl From<ListClaimsParams> for ClaimQuery {
    fn from(params: ListClaimsParams) -> Self {
        ClaimQuery {
            status: params.status,
            patient_id: params.patient_id.map(UserId::from_uuid),
            provider_id: params.provider_id.map(UserId::from_uuid),
            assigned_processor_id: params.assigned_processor_id.map(UserId::from_uuid),
            from_date: params.from_date,
            to_date: params.to_date,
            min_amount: params.min_amount.map(Amount::new),
            max_amount: params.max_amount.map(Amount::new),
            limit: params.limit.unwrap_or(DEFAULT_LIMIT),
            offset: params.offset.unwrap_or(0),
            sort_by: params.sort_by.unwrap_or_default(),
            sort_order: params.sort_order.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub patient_id: Uuid,
    pub provider_id: Uuid,
    pub diagnosis_code: String,
    pub amount: Decimal,
    pub status: ClaimStatus,
    pub assigned_processor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Claim> for ClaimResponse {
    fn from(claim: Claim) -> Self {
        ClaimResponse {
            id: *claim.id.as_uuid(),
            organization_id: *claim.organization_id.as_uuid(),
            patient_id: *claim.patient_id.as_uuid(),
            provider_id: *claim.provider_id.as_uuid(),
            diagnosis_code: claim.diagnosis_code,
            amount: claim.amount.value(),
            status: claim.status,
            assigned_processor_id: claim.assigned_processor_id.map(|id| *id.as_uuid()),
            created_at: claim.created_at,
            updated_at: claim.updated_at,
        }
    }
}

/// Listing response: the page fields at the top level
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimPageResponse {
    pub data: Vec<ClaimResponse>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub has_more: bool,
}

impl From<Page<Claim>> for ClaimPageResponse {
    fn from(page: Page<Claim>) -> Self {
        ClaimPageResponse {
            data: page.data.into_iter().map(ClaimResponse::from).collect(),
            total: page.total,
            limit: page.limit,
            offset: page.offset,
            has_more: page.has_more,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResponse {
    pub id: Uuid,
    pub claim_id: Uuid,
    pub action: AuditAction,
    pub changed_by: Uuid,
    pub changed_at: DateTime<Utc>,
    pub old_values: Option<Value>,
    pub new_values: Value,
}

impl From<ClaimAudit> for AuditResponse {
    fn from(audit: ClaimAudit) -> Self {
        AuditResponse {
            id: *audit.id.as_uuid(),
            claim_id: *audit.claim_id.as_uuid(),
            action: audit.action,
            changed_by: *audit.changed_by.as_uuid(),
            changed_at: audit.changed_at,
            old_values: audit.old_values,
            new_values: audit.new_values,
        }
    }
}

/// Validation error with a client-facing message
pub(crate) fn rule(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    error
}

fn positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_sign_positive() && !amount.is_zero() {
        Ok(())
    } else {
        Err(rule("positive", "Amount must be positive"))
    }
}

fn at_least_one_change(request: &UpdateClaimRequest) -> Result<(), ValidationError> {
    let empty = request.status.is_none()
        && request.assigned_processor_id.is_none()
        && request.diagnosis_code.is_none()
        && request.amount.is_none();
    if empty {
        return Err(rule("empty_update", "At least one field must be provided for update"));
    }
    Ok(())
}

fn ordered_ranges(params: &ListClaimsParams) -> Result<(), ValidationError> {
    if let (Some(min), Some(max)) = (params.min_amount, params.max_amount) {
        if min > max {
            return Err(rule("amount_range", "minAmount must be less than or equal to maxAmount"));
        }
    }
    if let (Some(from), Some(to)) = (params.from_date, params.to_date) {
        if from > to {
            return Err(rule("date_range", "fromDate must be before or equal to toDate"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn create_request(amount: Decimal, diagnosis_code: &str) -> CreateClaimRequest {
        CreateClaimRequest {
            patient_id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            diagnosis_code: diagnosis_code.to_string(),
            amount,
            assigned_processor_id: None,
        }
    }

    #[test]
    fn test_create_rules() {
        assert!(create_request(dec!(10.00), "J45.909").validate().is_ok());

        let errors = create_request(dec!(0), "J45.909").validate().unwrap_err();
        assert!(errors.field_errors().contains_key("amount"));

        let errors = create_request(dec!(-5), "").validate().unwrap_err();
        assert!(errors.field_errors().contains_key("amount"));
        assert!(errors.field_errors().contains_key("diagnosis_code"));

        assert!(create_request(dec!(1), &"X".repeat(51)).validate().is_err());
    }

    #[test]
    fn test_empty_update_is_rejected() {
        let request: UpdateClaimRequest = serde_json::from_str("{}").unwrap();
        assert!(request.validate().is_err());

        let request: UpdateClaimRequest = serde_json::from_str(r#"{"status":"under_review"}"#).unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(ClaimChanges::from(request), ClaimChanges::status(ClaimStatus::UnderReview));
    }

    #[test]
    fn test_bulk_id_bounds() {
        let request = BulkStatusUpdateRequest {
            claim_ids: vec![],
            status: ClaimStatus::Approved,
        };
        assert!(request.validate().is_err());

        let request = BulkStatusUpdateRequest {
            claim_ids: (0..101).map(|_| Uuid::new_v4()).collect(),
            status: ClaimStatus::Approved,
        };
        assert!(request.validate().is_err());

        let request = BulkStatusUpdateRequest {
            claim_ids: vec![Uuid::new_v4(); 100],
            status: ClaimStatus::Approved,
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_list_ranges() {
        let params = ListClaimsParams {
            min_amount: Some(dec!(500)),
            max_amount: Some(dec!(100)),
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let now = Utc::now();
        let params = ListClaimsParams {
            from_date: Some(now),
            to_date: Some(now - Duration::days(1)),
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = ListClaimsParams {
            limit: Some(101),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_list_defaults() {
        let query = ClaimQuery::from(ListClaimsParams::default());
        assert_eq!(query, ClaimQuery::default());
    }
}

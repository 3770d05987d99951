use crate::entities::wallet_passes;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Shared lifecycle status for a member's wallet passes. One field governs
/// both platforms; regenerating one platform's pass does not clear the
/// other's identifiers.
#[derive(
    Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(None)")]
pub enum PassStatus {
    #[sea_orm(string_value = "active")]
    #[serde(rename = "active")]
    Active,
    #[sea_orm(string_value = "pending")]
    #[serde(rename = "pending")]
    Pending,
    #[sea_orm(string_value = "expired")]
    #[serde(rename = "expired")]
    Expired,
    #[sea_orm(string_value = "revoked")]
    #[serde(rename = "revoked")]
    Revoked,
}

impl std::fmt::Display for PassStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PassStatus::Active => write!(f, "active"),
            PassStatus::Pending => write!(f, "pending"),
            PassStatus::Expired => write!(f, "expired"),
            PassStatus::Revoked => write!(f, "revoked"),
        }
    }
}

#[derive(
    Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(None)")]
pub enum EmailStatus {
    #[sea_orm(string_value = "sent")]
    #[serde(rename = "sent")]
    Sent,
    #[sea_orm(string_value = "failed")]
    #[serde(rename = "failed")]
    Failed,
}

/// Outcome of one platform's generation attempt. A failure on one platform
/// never blocks the other, so both are reported side by side.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PassGenerationResponse {
    pub member_id: i64,
    pub member_code: String,
    pub apple_pass_url: Option<String>,
    pub apple_error: Option<String>,
    pub google_pass_url: Option<String>,
    pub google_error: Option<String>,
    pub status: PassStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    Revoked,
    NothingToRevoke,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PassRecordResponse {
    pub id: i64,
    pub member_id: i64,
    pub apple_serial_number: Option<String>,
    pub apple_pass_path: Option<String>,
    pub google_object_id: Option<String>,
    pub google_class_id: Option<String>,
    pub google_pass_url: Option<String>,
    pub barcode_data: Option<String>,
    pub status: PassStatus,
    pub is_apple_added: bool,
    pub is_google_added: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<wallet_passes::Model> for PassRecordResponse {
    fn from(p: wallet_passes::Model) -> Self {
        Self {
            id: p.id,
            member_id: p.member_id,
            apple_serial_number: p.apple_serial_number,
            apple_pass_path: p.apple_pass_path,
            google_object_id: p.google_object_id,
            google_class_id: p.google_class_id,
            google_pass_url: p.google_pass_url,
            barcode_data: p.barcode_data,
            status: p.status,
            is_apple_added: p.is_apple_added,
            is_google_added: p.is_google_added,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MemberIdRequest {
    pub member_id: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdatePassStatusRequest {
    pub member_id: i64,
    pub status: PassStatus,
}

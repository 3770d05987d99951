use crate::entities::members;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(None)")]
pub enum MemberStatus {
    #[sea_orm(string_value = "active")]
    #[serde(rename = "active")]
    Active,
    #[sea_orm(string_value = "inactive")]
    #[serde(rename = "inactive")]
    Inactive,
    #[sea_orm(string_value = "deleted")]
    #[serde(rename = "deleted")]
    Deleted,
}

impl MemberStatus {
    /// Status label as shown on the card, e.g. "Active".
    pub fn capitalized(&self) -> &'static str {
        match self {
            MemberStatus::Active => "Active",
            MemberStatus::Inactive => "Inactive",
            MemberStatus::Deleted => "Deleted",
        }
    }
}

impl std::fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberStatus::Active => write!(f, "active"),
            MemberStatus::Inactive => write!(f, "inactive"),
            MemberStatus::Deleted => write!(f, "deleted"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateMemberRequest {
    #[schema(example = "Ada")]
    pub first_name: String,
    #[schema(example = "Lovelace")]
    pub last_name: String,
    #[schema(example = "ada@example.com")]
    pub email: String,
    #[schema(example = "+1 555 123 4567")]
    pub mobile: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateMemberRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub status: Option<MemberStatus>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MemberResponse {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub email: String,
    pub mobile: String,
    pub member_code: String,
    pub status: MemberStatus,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<members::Model> for MemberResponse {
    fn from(m: members::Model) -> Self {
        let full_name = m.full_name();
        Self {
            id: m.id,
            first_name: m.first_name,
            last_name: m.last_name,
            full_name,
            email: m.email,
            mobile: m.mobile,
            member_code: m.member_code,
            status: m.status,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MemberStatistics {
    pub total_members: i64,
    pub active_members: i64,
    pub inactive_members: i64,
    pub today_registrations: i64,
    pub this_week_registrations: i64,
    pub this_month_registrations: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MemberListQuery {
    pub search: Option<String>,
    pub status: Option<MemberStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

use crate::config::BrandingConfig;
use crate::entities::{members, wallet_passes};
use crate::error::{AppError, AppResult};
use crate::models::{
    CreateMemberRequest, MemberListQuery, MemberResponse, MemberStatistics, MemberStatus,
    PaginatedResponse, PaginationParams, UpdateMemberRequest,
};
use crate::utils::{code_pattern, format_mobile_number, next_member_code, validate_mobile_number};
use chrono::{Datelike, Duration, Utc};
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};

#[derive(Clone)]
pub struct MemberService {
    db: DatabaseConnection,
    branding: BrandingConfig,
}

impl MemberService {
    pub fn new(db: DatabaseConnection, branding: BrandingConfig) -> Self {
        Self { db, branding }
    }

    /// Registers a new member, assigning the next code in this year's
    /// sequence. Code assignment happens inside a transaction; the
    /// read-last-then-increment scheme assumes registrations are serialized
    /// at the database level.
    pub async fn create_member(&self, request: CreateMemberRequest) -> AppResult<members::Model> {
        let first_name = request.first_name.trim().to_string();
        let last_name = request.last_name.trim().to_string();
        if first_name.is_empty() || last_name.is_empty() {
            return Err(AppError::ValidationError(
                "First and last name are required".to_string(),
            ));
        }

        let email = request.email.trim().to_lowercase();
        validate_email(&email)?;

        let mobile = format_mobile_number(&request.mobile);
        validate_mobile_number(&mobile)?;

        let existing = members::Entity::find()
            .filter(members::Column::Email.eq(&email))
            .one(&self.db)
            .await?;
        if existing.is_some() {
            return Err(AppError::ValidationError(
                "Email is already registered".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let year = Utc::now().year();
        let prefix = self.branding.member_id_prefix.clone();
        let last = members::Entity::find()
            .filter(members::Column::MemberCode.like(code_pattern(&prefix, year)))
            .order_by_desc(members::Column::MemberCode)
            .one(&txn)
            .await?;
        let member_code = next_member_code(&prefix, year, last.as_ref().map(|m| m.member_code.as_str()));

        let now = Utc::now();
        // The email pre-check above is advisory; a concurrent registration
        // can still hit the unique index, which must surface as a
        // validation error rather than a plain database failure.
        let member = members::ActiveModel {
            first_name: Set(first_name),
            last_name: Set(last_name),
            email: Set(email),
            mobile: Set(mobile),
            member_code: Set(member_code.clone()),
            status: Set(MemberStatus::Active),
            created_at: Set(Some(now)),
            updated_at: Set(Some(now)),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(unique_violation_to_validation)?;

        txn.commit().await?;

        log::info!("Registered member {} ({})", member_code, member.email);
        Ok(member)
    }

    /// Fetches a member by id. Soft-deleted members are treated as gone.
    pub async fn get_member(&self, member_id: i64) -> AppResult<members::Model> {
        members::Entity::find_by_id(member_id)
            .filter(members::Column::Status.ne(MemberStatus::Deleted))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Member {member_id} not found")))
    }

    pub async fn get_member_by_code(&self, member_code: &str) -> AppResult<members::Model> {
        members::Entity::find()
            .filter(members::Column::MemberCode.eq(member_code))
            .filter(members::Column::Status.ne(MemberStatus::Deleted))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Member {member_code} not found")))
    }

    pub async fn update_member(
        &self,
        member_id: i64,
        request: UpdateMemberRequest,
    ) -> AppResult<members::Model> {
        let member = self.get_member(member_id).await?;
        let mut active: members::ActiveModel = member.into();

        if let Some(first_name) = request.first_name {
            let first_name = first_name.trim().to_string();
            if first_name.is_empty() {
                return Err(AppError::ValidationError(
                    "First name cannot be empty".to_string(),
                ));
            }
            active.first_name = Set(first_name);
        }
        if let Some(last_name) = request.last_name {
            let last_name = last_name.trim().to_string();
            if last_name.is_empty() {
                return Err(AppError::ValidationError(
                    "Last name cannot be empty".to_string(),
                ));
            }
            active.last_name = Set(last_name);
        }
        if let Some(email) = request.email {
            let email = email.trim().to_lowercase();
            validate_email(&email)?;
            let taken = members::Entity::find()
                .filter(members::Column::Email.eq(&email))
                .filter(members::Column::Id.ne(member_id))
                .one(&self.db)
                .await?;
            if taken.is_some() {
                return Err(AppError::ValidationError(
                    "Email is already registered".to_string(),
                ));
            }
            active.email = Set(email);
        }
        if let Some(mobile) = request.mobile {
            let mobile = format_mobile_number(&mobile);
            validate_mobile_number(&mobile)?;
            active.mobile = Set(mobile);
        }
        if let Some(status) = request.status {
            active.status = Set(status);
        }
        active.updated_at = Set(Some(Utc::now()));

        active
            .update(&self.db)
            .await
            .map_err(unique_violation_to_validation)
    }

    /// Soft-deletes a member and removes their pass bundle from disk. The
    /// pass record itself stays (and is cascaded only on hard delete).
    pub async fn delete_member(&self, member_id: i64) -> AppResult<()> {
        let member = self.get_member(member_id).await?;

        let pass = wallet_passes::Entity::find()
            .filter(wallet_passes::Column::MemberId.eq(member_id))
            .one(&self.db)
            .await?;
        if let Some(pass) = pass
            && let Some(path) = pass.apple_pass_path
            && let Err(e) = std::fs::remove_file(&path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            log::warn!("Could not remove pass bundle {path}: {e}");
        }

        let mut active: members::ActiveModel = member.into();
        active.status = Set(MemberStatus::Deleted);
        active.updated_at = Set(Some(Utc::now()));
        active.update(&self.db).await?;

        log::info!("Deleted member {member_id}");
        Ok(())
    }

    pub async fn list_members(
        &self,
        query: MemberListQuery,
    ) -> AppResult<PaginatedResponse<MemberResponse>> {
        let params = PaginationParams::new(query.page, query.per_page);

        let mut condition = Condition::all();
        condition = match query.status {
            Some(status) => condition.add(members::Column::Status.eq(status)),
            None => condition.add(members::Column::Status.ne(MemberStatus::Deleted)),
        };
        if let Some(search) = query.search.filter(|s| !s.trim().is_empty()) {
            let term = search.trim().to_string();
            condition = condition.add(
                Condition::any()
                    .add(members::Column::FirstName.contains(&term))
                    .add(members::Column::LastName.contains(&term))
                    .add(members::Column::Email.contains(&term))
                    .add(members::Column::MemberCode.contains(&term)),
            );
        }

        let total = members::Entity::find()
            .filter(condition.clone())
            .count(&self.db)
            .await? as i64;

        let rows = members::Entity::find()
            .filter(condition)
            .order_by_desc(members::Column::CreatedAt)
            .offset(params.get_offset())
            .limit(params.get_limit())
            .all(&self.db)
            .await?;

        let items = rows.into_iter().map(MemberResponse::from).collect();
        Ok(PaginatedResponse::new(items, &params, total))
    }

    pub async fn get_statistics(&self) -> AppResult<MemberStatistics> {
        let not_deleted = members::Column::Status.ne(MemberStatus::Deleted);

        let total_members = members::Entity::find()
            .filter(not_deleted.clone())
            .count(&self.db)
            .await? as i64;
        let active_members = members::Entity::find()
            .filter(members::Column::Status.eq(MemberStatus::Active))
            .count(&self.db)
            .await? as i64;
        let inactive_members = members::Entity::find()
            .filter(members::Column::Status.eq(MemberStatus::Inactive))
            .count(&self.db)
            .await? as i64;

        let now = Utc::now();
        let today_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or(now);
        let week_start = now - Duration::days(7);
        let month_start = now - Duration::days(30);

        let registrations_since = |since| {
            members::Entity::find()
                .filter(not_deleted.clone())
                .filter(members::Column::CreatedAt.gte(since))
                .count(&self.db)
        };
        let today_registrations = registrations_since(today_start).await? as i64;
        let this_week_registrations = registrations_since(week_start).await? as i64;
        let this_month_registrations = registrations_since(month_start).await? as i64;

        Ok(MemberStatistics {
            total_members,
            active_members,
            inactive_members,
            today_registrations,
            this_week_registrations,
            this_month_registrations,
        })
    }
}

fn unique_violation_to_validation(e: sea_orm::DbErr) -> AppError {
    match e.sql_err() {
        Some(sea_orm::SqlErr::UniqueConstraintViolation(_)) => AppError::ValidationError(
            "Email or member code is already registered".to_string(),
        ),
        _ => e.into(),
    }
}

fn validate_email(email: &str) -> AppResult<()> {
    let email_regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
    if !email_regex.is_match(email) {
        return Err(AppError::ValidationError(
            "Invalid email format".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;

    async fn setup() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        db
    }

    fn service(db: DatabaseConnection) -> MemberService {
        MemberService::new(db, BrandingConfig::default())
    }

    fn request(email: &str) -> CreateMemberRequest {
        CreateMemberRequest {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: email.to_string(),
            mobile: "+1 555 123 4567".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_codes() {
        let svc = service(setup().await);
        let year = Utc::now().year();

        let first = svc.create_member(request("a@example.com")).await.unwrap();
        let second = svc.create_member(request("b@example.com")).await.unwrap();

        assert_eq!(first.member_code, format!("PMC-{year}-000001"));
        assert_eq!(second.member_code, format!("PMC-{year}-000002"));
        assert_eq!(first.mobile, "+15551234567");
        assert_eq!(first.status, MemberStatus::Active);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_email() {
        let svc = service(setup().await);
        svc.create_member(request("a@example.com")).await.unwrap();

        let err = svc.create_member(request("a@example.com")).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let svc = service(setup().await);

        let mut bad_email = request("not-an-email");
        bad_email.email = "not-an-email".to_string();
        assert!(svc.create_member(bad_email).await.is_err());

        let mut bad_mobile = request("c@example.com");
        bad_mobile.mobile = "123".to_string();
        assert!(svc.create_member(bad_mobile).await.is_err());
    }

    #[tokio::test]
    async fn test_unique_violation_surfaces_as_validation_error() {
        // The pre-insert email check is advisory; when a row slips past it
        // and trips the unique index inside the transaction, the caller
        // must still see a validation error, not a database error.
        let db = setup().await;
        let svc = service(db.clone());
        let year = Utc::now().year();

        let seed = |email: &str, code: &str| members::ActiveModel {
            first_name: Set("Ada".to_string()),
            last_name: Set("Lovelace".to_string()),
            email: Set(email.to_string()),
            mobile: Set("+15551234567".to_string()),
            member_code: Set(code.to_string()),
            status: Set(MemberStatus::Active),
            ..Default::default()
        };
        seed("a@example.com", &format!("PMC-{year}-000001"))
            .insert(&db)
            .await
            .unwrap();
        // Sorts after the numeric codes but carries no parsable sequence,
        // so the next assigned code collides with the existing 000001.
        seed("b@example.com", &format!("PMC-{year}-zzzzzz"))
            .insert(&db)
            .await
            .unwrap();

        let err = svc.create_member(request("c@example.com")).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_update_member() {
        let svc = service(setup().await);
        let member = svc.create_member(request("a@example.com")).await.unwrap();

        let updated = svc
            .update_member(
                member.id,
                UpdateMemberRequest {
                    first_name: Some("Augusta".to_string()),
                    last_name: None,
                    email: None,
                    mobile: None,
                    status: Some(MemberStatus::Inactive),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.first_name, "Augusta");
        assert_eq!(updated.status, MemberStatus::Inactive);
        // The member code never changes on update.
        assert_eq!(updated.member_code, member.member_code);
    }

    #[tokio::test]
    async fn test_delete_is_soft_and_hides_member() {
        let svc = service(setup().await);
        let member = svc.create_member(request("a@example.com")).await.unwrap();

        svc.delete_member(member.id).await.unwrap();

        let err = svc.get_member(member.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let listed = svc
            .list_members(MemberListQuery {
                search: None,
                status: None,
                page: None,
                per_page: None,
            })
            .await
            .unwrap();
        assert_eq!(listed.pagination.total, 0);
    }

    #[tokio::test]
    async fn test_list_members_search() {
        let svc = service(setup().await);
        svc.create_member(request("ada@example.com")).await.unwrap();
        let mut other = request("grace@example.com");
        other.first_name = "Grace".to_string();
        other.last_name = "Hopper".to_string();
        svc.create_member(other).await.unwrap();

        let found = svc
            .list_members(MemberListQuery {
                search: Some("Hopper".to_string()),
                status: None,
                page: None,
                per_page: None,
            })
            .await
            .unwrap();
        assert_eq!(found.items.len(), 1);
        assert_eq!(found.items[0].last_name, "Hopper");
    }

    #[tokio::test]
    async fn test_statistics() {
        let svc = service(setup().await);
        svc.create_member(request("a@example.com")).await.unwrap();
        let b = svc.create_member(request("b@example.com")).await.unwrap();
        svc.update_member(
            b.id,
            UpdateMemberRequest {
                first_name: None,
                last_name: None,
                email: None,
                mobile: None,
                status: Some(MemberStatus::Inactive),
            },
        )
        .await
        .unwrap();

        let stats = svc.get_statistics().await.unwrap();
        assert_eq!(stats.total_members, 2);
        assert_eq!(stats.active_members, 1);
        assert_eq!(stats.inactive_members, 1);
        assert_eq!(stats.today_registrations, 2);
    }
}

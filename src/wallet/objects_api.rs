//! HTTP seam for the Google Wallet objects API.
//!
//! The pass builder talks to the API through the [`WalletObjectsApi`]
//! trait so tests can substitute an in-memory implementation. The real
//! client authenticates with a service-account JWT-bearer grant and
//! caches the resulting access token until shortly before expiry.

use crate::config::GoogleWalletConfig;
use crate::error::{AppError, AppResult};
use crate::wallet::ServiceAccountKey;
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;

const WALLET_ISSUER_SCOPE: &str = "https://www.googleapis.com/auth/wallet_object.issuer";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Outcome of a read against the remote API. Lookup failures other than
/// "not found" carry the reason so callers can decide whether to proceed.
#[derive(Debug, Clone)]
pub enum LookupOutcome {
    Found(Value),
    NotFound,
    Error(String),
}

#[async_trait]
pub trait WalletObjectsApi: Send + Sync {
    async fn get_class(&self, class_id: &str) -> LookupOutcome;
    async fn insert_class(&self, class: &Value) -> AppResult<Value>;
    async fn get_object(&self, object_id: &str) -> LookupOutcome;
    async fn insert_object(&self, object: &Value) -> AppResult<Value>;
    async fn update_object(&self, object_id: &str, object: &Value) -> AppResult<Value>;
    async fn patch_object(&self, object_id: &str, patch: &Value) -> AppResult<Value>;
}

struct CachedToken {
    access_token: String,
    expires_at: i64,
}

#[derive(Debug, Serialize)]
struct GrantClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

pub struct WalletObjectsClient {
    client: reqwest::Client,
    base_url: String,
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    token: Mutex<Option<CachedToken>>,
}

impl WalletObjectsClient {
    pub fn new(config: &GoogleWalletConfig, key: ServiceAccountKey) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            key,
            signing_key,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> AppResult<String> {
        let mut cached = self.token.lock().await;
        let now = Utc::now().timestamp();
        if let Some(token) = cached.as_ref()
            && token.expires_at > now + 60
        {
            return Ok(token.access_token.clone());
        }

        let claims = GrantClaims {
            iss: &self.key.client_email,
            scope: WALLET_ISSUER_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let assertion =
            jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)?;

        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApiError(format!(
                "Token endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response.json().await?;
        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at: now + token.expires_in,
        });
        Ok(access_token)
    }

    async fn lookup(&self, path: &str) -> LookupOutcome {
        let token = match self.access_token().await {
            Ok(t) => t,
            Err(e) => return LookupOutcome::Error(e.to_string()),
        };

        let url = format!("{}{path}", self.base_url);
        let response = match self.client.get(&url).bearer_auth(token).send().await {
            Ok(r) => r,
            Err(e) => return LookupOutcome::Error(e.to_string()),
        };

        let status = response.status();
        let body: Value = match response.json().await {
            Ok(v) => v,
            Err(_) if status == reqwest::StatusCode::NOT_FOUND => return LookupOutcome::NotFound,
            Err(e) => return LookupOutcome::Error(e.to_string()),
        };

        if status.is_success() {
            return LookupOutcome::Found(body);
        }
        if is_not_found(status, &body) {
            return LookupOutcome::NotFound;
        }
        LookupOutcome::Error(format!("{status}: {body}"))
    }

    async fn mutate(
        &self,
        method: reqwest::Method,
        path: &str,
        payload: &Value,
    ) -> AppResult<Value> {
        let token = self.access_token().await?;
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .request(method, &url)
            .bearer_auth(token)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApiError(format!(
                "Wallet API returned {status} for {path}: {body}"
            )));
        }
        Ok(response.json().await?)
    }
}

/// The API reports missing resources either with a bare 404 or with an
/// error payload whose reason is `classNotFound` / `resourceNotFound`.
fn is_not_found(status: reqwest::StatusCode, body: &Value) -> bool {
    if status == reqwest::StatusCode::NOT_FOUND {
        return true;
    }
    body["error"]["errors"]
        .as_array()
        .map(|errors| {
            errors.iter().any(|e| {
                matches!(
                    e["reason"].as_str(),
                    Some("classNotFound") | Some("resourceNotFound")
                )
            })
        })
        .unwrap_or(false)
}

#[async_trait]
impl WalletObjectsApi for WalletObjectsClient {
    async fn get_class(&self, class_id: &str) -> LookupOutcome {
        self.lookup(&format!("/genericClass/{class_id}")).await
    }

    async fn insert_class(&self, class: &Value) -> AppResult<Value> {
        self.mutate(reqwest::Method::POST, "/genericClass", class)
            .await
    }

    async fn get_object(&self, object_id: &str) -> LookupOutcome {
        self.lookup(&format!("/genericObject/{object_id}")).await
    }

    async fn insert_object(&self, object: &Value) -> AppResult<Value> {
        self.mutate(reqwest::Method::POST, "/genericObject", object)
            .await
    }

    async fn update_object(&self, object_id: &str, object: &Value) -> AppResult<Value> {
        self.mutate(
            reqwest::Method::PUT,
            &format!("/genericObject/{object_id}"),
            object,
        )
        .await
    }

    async fn patch_object(&self, object_id: &str, patch: &Value) -> AppResult<Value> {
        self.mutate(
            reqwest::Method::PATCH,
            &format!("/genericObject/{object_id}"),
            patch,
        )
        .await
    }
}

#[cfg(test)]
pub mod testing {
    //! In-memory stand-in for the remote API, with call counters.

    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    pub struct FakeWalletApi {
        pub classes: StdMutex<HashMap<String, Value>>,
        pub objects: StdMutex<HashMap<String, Value>>,
        pub insert_class_calls: AtomicUsize,
        pub insert_object_calls: AtomicUsize,
        pub update_object_calls: AtomicUsize,
        pub patch_object_calls: AtomicUsize,
        /// When set, every lookup reports this error instead of answering.
        pub lookup_error: StdMutex<Option<String>>,
    }

    impl FakeWalletApi {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn object(&self, object_id: &str) -> Option<Value> {
            self.objects.lock().unwrap().get(object_id).cloned()
        }

        pub fn object_count(&self) -> usize {
            self.objects.lock().unwrap().len()
        }

        fn id_of(value: &Value) -> String {
            value["id"].as_str().unwrap_or_default().to_string()
        }
    }

    #[async_trait]
    impl WalletObjectsApi for FakeWalletApi {
        async fn get_class(&self, class_id: &str) -> LookupOutcome {
            if let Some(msg) = self.lookup_error.lock().unwrap().clone() {
                return LookupOutcome::Error(msg);
            }
            match self.classes.lock().unwrap().get(class_id) {
                Some(class) => LookupOutcome::Found(class.clone()),
                None => LookupOutcome::NotFound,
            }
        }

        async fn insert_class(&self, class: &Value) -> AppResult<Value> {
            self.insert_class_calls.fetch_add(1, Ordering::SeqCst);
            self.classes
                .lock()
                .unwrap()
                .insert(Self::id_of(class), class.clone());
            Ok(class.clone())
        }

        async fn get_object(&self, object_id: &str) -> LookupOutcome {
            if let Some(msg) = self.lookup_error.lock().unwrap().clone() {
                return LookupOutcome::Error(msg);
            }
            match self.objects.lock().unwrap().get(object_id) {
                Some(object) => LookupOutcome::Found(object.clone()),
                None => LookupOutcome::NotFound,
            }
        }

        async fn insert_object(&self, object: &Value) -> AppResult<Value> {
            self.insert_object_calls.fetch_add(1, Ordering::SeqCst);
            self.objects
                .lock()
                .unwrap()
                .insert(Self::id_of(object), object.clone());
            Ok(object.clone())
        }

        async fn update_object(&self, object_id: &str, object: &Value) -> AppResult<Value> {
            self.update_object_calls.fetch_add(1, Ordering::SeqCst);
            self.objects
                .lock()
                .unwrap()
                .insert(object_id.to_string(), object.clone());
            Ok(object.clone())
        }

        async fn patch_object(&self, object_id: &str, patch: &Value) -> AppResult<Value> {
            self.patch_object_calls.fetch_add(1, Ordering::SeqCst);
            let mut objects = self.objects.lock().unwrap();
            let object = objects.get_mut(object_id).ok_or_else(|| {
                AppError::ExternalApiError(format!("No object {object_id} to patch"))
            })?;
            if let (Some(target), Some(fields)) = (object.as_object_mut(), patch.as_object()) {
                for (k, v) in fields {
                    target.insert(k.clone(), v.clone());
                }
            }
            Ok(object.clone())
        }
    }

    #[test]
    fn test_is_not_found_detection() {
        let not_found_body = serde_json::json!({
            "error": {"code": 404, "errors": [{"reason": "classNotFound"}]}
        });
        assert!(is_not_found(reqwest::StatusCode::BAD_REQUEST, &not_found_body));
        assert!(is_not_found(
            reqwest::StatusCode::NOT_FOUND,
            &Value::Null
        ));

        let other_error = serde_json::json!({
            "error": {"code": 403, "errors": [{"reason": "forbidden"}]}
        });
        assert!(!is_not_found(reqwest::StatusCode::FORBIDDEN, &other_error));
    }
}

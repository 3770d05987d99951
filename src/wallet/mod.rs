pub mod apple;
pub mod google;
pub mod objects_api;

pub use apple::*;
pub use google::*;
pub use objects_api::*;

use crate::error::{AppError, AppResult};
use serde::Deserialize;

/// Service-account credential used for Platform-B API auth and token
/// signing. Loaded once at startup and injected where needed.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl ServiceAccountKey {
    pub fn from_file(path: &str) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!(
                "Google Wallet service account file not found at {path}: {e}"
            ))
        })?;

        let key: ServiceAccountKey = serde_json::from_str(&raw)
            .map_err(|e| AppError::ConfigError(format!("Invalid service account file: {e}")))?;

        if key.client_email.is_empty() || key.private_key.is_empty() {
            return Err(AppError::ConfigError(
                "Service account file is missing client_email or private_key".to_string(),
            ));
        }

        Ok(key)
    }
}

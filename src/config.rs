use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub apple: AppleWalletConfig,
    pub google: GoogleWalletConfig,
    #[serde(default)]
    pub branding: BrandingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppleWalletConfig {
    pub team_id: String,
    pub pass_type_id: String,
    pub organization_name: String,

    pub certificate_path: String,
    pub certificate_password: String,
    pub wwdr_certificate_path: String,

    pub template_path: String,
    pub output_path: String,
    /// Parent directory for per-build scratch directories. Defaults to the
    /// system temp dir when empty.
    #[serde(default)]
    pub temp_path: String,

    #[serde(default = "default_pass_description")]
    pub description: String,
    #[serde(default = "default_logo_text")]
    pub logo_text: String,
    #[serde(default = "default_barcode_format")]
    pub barcode_format: String,
    #[serde(default = "default_barcode_encoding")]
    pub barcode_encoding: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleWalletConfig {
    pub issuer_id: String,
    pub class_id: String,
    pub service_account_file: String,

    #[serde(default = "default_wallet_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_save_url_prefix")]
    pub save_url_prefix: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    pub issuer_name: String,
    pub card_title: String,
    #[serde(default = "default_hex_background_color")]
    pub hex_background_color: String,
    #[serde(default)]
    pub logo_url: String,
    #[serde(default)]
    pub logo_description: String,
    #[serde(default)]
    pub hero_image_url: String,
    #[serde(default)]
    pub hero_image_description: String,
    #[serde(default)]
    pub wide_image_url: String,
    #[serde(default)]
    pub wide_image_description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandingConfig {
    pub organization_name: String,
    pub member_id_prefix: String,
    pub support_email: String,
    pub support_phone: String,
    pub website: String,
    pub background_color: String,
    pub text_color: String,
    pub label_color: String,
}

impl Default for BrandingConfig {
    fn default() -> Self {
        Self {
            organization_name: "Premium Membership Club".to_string(),
            member_id_prefix: "PMC".to_string(),
            support_email: "support@premiumclub.com".to_string(),
            support_phone: "+1 (555) 123-4567".to_string(),
            website: "https://www.premiumclub.com".to_string(),
            background_color: "#0f172a".to_string(),
            text_color: "#ffffff".to_string(),
            label_color: "#94a3b8".to_string(),
        }
    }
}

fn default_pass_description() -> String {
    "Membership Card".to_string()
}

fn default_logo_text() -> String {
    "Premium Member".to_string()
}

fn default_barcode_format() -> String {
    "PKBarcodeFormatQR".to_string()
}

fn default_barcode_encoding() -> String {
    "iso-8859-1".to_string()
}

fn default_wallet_api_base_url() -> String {
    "https://walletobjects.googleapis.com/walletobjects/v1".to_string()
}

fn default_save_url_prefix() -> String {
    "https://pay.google.com/gp/v/save/".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_hex_background_color() -> String {
    "#1e3a8a".to_string()
}

impl Config {
    pub fn from_toml() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // Read the config file when present; otherwise build entirely from
        // environment variables and defaults.
        let config_result = std::fs::read_to_string(&config_path);

        let mut config: Config = match config_result {
            Ok(config_str) => {
                toml::from_str(&config_str).map_err(|e| format!("Failed to parse {config_path}: {e}"))?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fn get_env(name: &str) -> Option<String> {
                    env::var(name).ok()
                }
                fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
                    env::var(name)
                        .ok()
                        .and_then(|v| v.parse::<T>().ok())
                        .unwrap_or(default)
                }

                // The database URL has no sensible default.
                let database_url = get_env("DATABASE_URL")
                    .ok_or("DATABASE_URL is not set and no config.toml was found")?;

                Config {
                    server: ServerConfig {
                        host: get_env("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                        port: get_env_parse("SERVER_PORT", 8080u16),
                    },
                    database: DatabaseConfig {
                        url: database_url,
                        max_connections: get_env_parse("DB_MAX_CONNECTIONS", 10u32),
                    },
                    apple: AppleWalletConfig {
                        team_id: get_env("APPLE_WALLET_TEAM_ID").unwrap_or_default(),
                        pass_type_id: get_env("APPLE_WALLET_PASS_TYPE_ID").unwrap_or_default(),
                        organization_name: get_env("APPLE_WALLET_ORG_NAME")
                            .unwrap_or_else(|| "Premium Membership Club".to_string()),
                        certificate_path: get_env("APPLE_WALLET_CERT_PATH").unwrap_or_default(),
                        certificate_password: get_env("APPLE_WALLET_CERT_PASSWORD")
                            .unwrap_or_default(),
                        wwdr_certificate_path: get_env("APPLE_WALLET_WWDR_CERT_PATH")
                            .unwrap_or_default(),
                        template_path: get_env("APPLE_WALLET_TEMPLATE_PATH")
                            .unwrap_or_else(|| "storage/templates/apple-pass".to_string()),
                        output_path: get_env("APPLE_WALLET_OUTPUT_PATH")
                            .unwrap_or_else(|| "storage/passes/apple".to_string()),
                        temp_path: get_env("APPLE_WALLET_TEMP_PATH").unwrap_or_default(),
                        description: default_pass_description(),
                        logo_text: default_logo_text(),
                        barcode_format: default_barcode_format(),
                        barcode_encoding: default_barcode_encoding(),
                    },
                    google: GoogleWalletConfig {
                        issuer_id: get_env("GOOGLE_WALLET_ISSUER_ID").unwrap_or_default(),
                        class_id: get_env("GOOGLE_WALLET_CLASS_ID").unwrap_or_default(),
                        service_account_file: get_env("GOOGLE_WALLET_SERVICE_ACCOUNT_FILE")
                            .unwrap_or_default(),
                        api_base_url: default_wallet_api_base_url(),
                        save_url_prefix: default_save_url_prefix(),
                        request_timeout_secs: get_env_parse("GOOGLE_WALLET_TIMEOUT_SECS", 15u64),
                        issuer_name: get_env("GOOGLE_WALLET_ISSUER_NAME")
                            .unwrap_or_else(|| "Premium Membership Club".to_string()),
                        card_title: get_env("GOOGLE_WALLET_CARD_TITLE")
                            .unwrap_or_else(|| "Member Card".to_string()),
                        hex_background_color: default_hex_background_color(),
                        logo_url: get_env("GOOGLE_WALLET_LOGO_URL").unwrap_or_default(),
                        logo_description: get_env("GOOGLE_WALLET_LOGO_DESCRIPTION")
                            .unwrap_or_default(),
                        hero_image_url: get_env("GOOGLE_WALLET_HERO_IMAGE_URL").unwrap_or_default(),
                        hero_image_description: get_env("GOOGLE_WALLET_HERO_IMAGE_DESCRIPTION")
                            .unwrap_or_default(),
                        wide_image_url: get_env("GOOGLE_WALLET_WIDE_IMAGE_URL").unwrap_or_default(),
                        wide_image_description: get_env("GOOGLE_WALLET_WIDE_IMAGE_DESCRIPTION")
                            .unwrap_or_default(),
                    },
                    branding: BrandingConfig::default(),
                }
            }
            Err(e) => {
                return Err(format!("Failed to read config file {config_path}: {e}").into());
            }
        };

        // Environment variables override file values as well.
        if let Ok(v) = env::var("SERVER_HOST") {
            config.server.host = v;
        }
        if let Ok(v) = env::var("SERVER_PORT")
            && let Ok(p) = v.parse()
        {
            config.server.port = p;
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            config.database.url = v;
        }
        if let Ok(v) = env::var("DB_MAX_CONNECTIONS")
            && let Ok(mc) = v.parse()
        {
            config.database.max_connections = mc;
        }
        if let Ok(v) = env::var("APPLE_WALLET_TEAM_ID") {
            config.apple.team_id = v;
        }
        if let Ok(v) = env::var("APPLE_WALLET_PASS_TYPE_ID") {
            config.apple.pass_type_id = v;
        }
        if let Ok(v) = env::var("APPLE_WALLET_ORG_NAME") {
            config.apple.organization_name = v;
        }
        if let Ok(v) = env::var("APPLE_WALLET_CERT_PATH") {
            config.apple.certificate_path = v;
        }
        if let Ok(v) = env::var("APPLE_WALLET_CERT_PASSWORD") {
            config.apple.certificate_password = v;
        }
        if let Ok(v) = env::var("APPLE_WALLET_WWDR_CERT_PATH") {
            config.apple.wwdr_certificate_path = v;
        }
        if let Ok(v) = env::var("APPLE_WALLET_TEMPLATE_PATH") {
            config.apple.template_path = v;
        }
        if let Ok(v) = env::var("APPLE_WALLET_OUTPUT_PATH") {
            config.apple.output_path = v;
        }
        if let Ok(v) = env::var("APPLE_WALLET_TEMP_PATH") {
            config.apple.temp_path = v;
        }
        if let Ok(v) = env::var("GOOGLE_WALLET_ISSUER_ID") {
            config.google.issuer_id = v;
        }
        if let Ok(v) = env::var("GOOGLE_WALLET_CLASS_ID") {
            config.google.class_id = v;
        }
        if let Ok(v) = env::var("GOOGLE_WALLET_SERVICE_ACCOUNT_FILE") {
            config.google.service_account_file = v;
        }
        if let Ok(v) = env::var("GOOGLE_WALLET_ISSUER_NAME") {
            config.google.issuer_name = v;
        }
        if let Ok(v) = env::var("GOOGLE_WALLET_CARD_TITLE") {
            config.google.card_title = v;
        }
        if let Ok(v) = env::var("ORG_NAME") {
            config.branding.organization_name = v;
        }
        if let Ok(v) = env::var("MEMBER_ID_PREFIX") {
            config.branding.member_id_prefix = v;
        }
        if let Ok(v) = env::var("ORG_SUPPORT_EMAIL") {
            config.branding.support_email = v;
        }
        if let Ok(v) = env::var("ORG_WEBSITE") {
            config.branding.website = v;
        }

        Ok(config)
    }
}

//! Signed `.pkpass` bundle generation.
//!
//! A bundle is a zip archive containing a `pass.json` descriptor, the
//! template images, a SHA-1 manifest of every bundled file and a detached
//! PKCS#7 signature over that manifest. Assembly happens inside a scratch
//! directory that is removed whether the build succeeds or fails.

use crate::config::{AppleWalletConfig, BrandingConfig};
use crate::entities::members;
use crate::error::{AppError, AppResult};
use chrono::Utc;
use openssl::pkcs12::Pkcs12;
use openssl::pkcs7::{Pkcs7, Pkcs7Flags};
use openssl::stack::Stack;
use openssl::x509::X509;
use serde::Serialize;
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Result of a successful bundle build.
#[derive(Debug, Clone)]
pub struct AppleBundle {
    pub serial_number: String,
    pub pkpass_path: PathBuf,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PassDescriptor {
    format_version: u32,
    pass_type_identifier: String,
    serial_number: String,
    team_identifier: String,
    organization_name: String,
    description: String,
    logo_text: String,
    background_color: String,
    foreground_color: String,
    label_color: String,
    barcodes: Vec<BarcodeDescriptor>,
    // Single-barcode key kept alongside `barcodes` for older wallet
    // versions that predate the array form.
    barcode: BarcodeDescriptor,
    generic: GenericLayout,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct BarcodeDescriptor {
    format: String,
    message: String,
    message_encoding: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenericLayout {
    primary_fields: Vec<PassField>,
    secondary_fields: Vec<PassField>,
    auxiliary_fields: Vec<PassField>,
    back_fields: Vec<PassField>,
}

#[derive(Debug, Serialize)]
struct PassField {
    key: String,
    label: String,
    value: String,
}

impl PassField {
    fn new(key: &str, label: &str, value: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            value: value.into(),
        }
    }
}

/// Converts `#RRGGBB` to the `rgb(r, g, b)` form the descriptor expects.
/// Malformed components fall back to 0 rather than failing the build.
pub fn hex_to_rgb(hex: &str) -> String {
    let hex = hex.trim_start_matches('#');
    let component = |range: std::ops::Range<usize>| -> u8 {
        hex.get(range)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .unwrap_or(0)
    };
    format!(
        "rgb({}, {}, {})",
        component(0..2),
        component(2..4),
        component(4..6)
    )
}

fn generate_serial_number() -> String {
    format!("PASS-{}", Uuid::new_v4())
}

#[derive(Clone)]
pub struct ApplePassBuilder {
    config: AppleWalletConfig,
    branding: BrandingConfig,
}

impl ApplePassBuilder {
    pub fn new(config: AppleWalletConfig, branding: BrandingConfig) -> Self {
        Self { config, branding }
    }

    /// Builds a signed bundle for the member and writes it to the output
    /// directory as `{member_code}.pkpass`.
    pub fn build(&self, member: &members::Model) -> AppResult<AppleBundle> {
        let serial_number = generate_serial_number();
        let descriptor = self.build_descriptor(member, &serial_number);

        let workdir = self.create_workdir()?;
        // The TempDir guard cleans up the scratch directory on every exit
        // path, including signing failures.
        let pkpass_path = self.assemble(workdir.path(), &descriptor, member)?;

        log::info!(
            "Built Apple pass {} for member {}",
            serial_number,
            member.member_code
        );

        Ok(AppleBundle {
            serial_number,
            pkpass_path,
        })
    }

    fn create_workdir(&self) -> AppResult<tempfile::TempDir> {
        let dir = if self.config.temp_path.is_empty() {
            tempfile::tempdir()?
        } else {
            fs::create_dir_all(&self.config.temp_path)?;
            tempfile::tempdir_in(&self.config.temp_path)?
        };
        Ok(dir)
    }

    fn build_descriptor(&self, member: &members::Model, serial_number: &str) -> PassDescriptor {
        let barcode = BarcodeDescriptor {
            format: self.config.barcode_format.clone(),
            message: member.member_code.clone(),
            message_encoding: self.config.barcode_encoding.clone(),
        };

        let member_since = member
            .created_at
            .unwrap_or_else(Utc::now)
            .format("%B %-d, %Y")
            .to_string();

        PassDescriptor {
            format_version: 1,
            pass_type_identifier: self.config.pass_type_id.clone(),
            serial_number: serial_number.to_string(),
            team_identifier: self.config.team_id.clone(),
            organization_name: self.config.organization_name.clone(),
            description: self.config.description.clone(),
            logo_text: self.config.logo_text.clone(),
            background_color: hex_to_rgb(&self.branding.background_color),
            foreground_color: hex_to_rgb(&self.branding.text_color),
            label_color: hex_to_rgb(&self.branding.label_color),
            barcodes: vec![barcode.clone()],
            barcode,
            generic: GenericLayout {
                primary_fields: vec![PassField::new("member", "MEMBER", member.full_name())],
                secondary_fields: vec![PassField::new(
                    "member_id",
                    "MEMBER ID",
                    member.member_code.clone(),
                )],
                auxiliary_fields: vec![PassField::new(
                    "status",
                    "STATUS",
                    member.status.capitalized(),
                )],
                back_fields: vec![
                    PassField::new("since", "Member Since", member_since),
                    PassField::new("email", "Email", member.email.clone()),
                    PassField::new("mobile", "Mobile", member.mobile.clone()),
                    PassField::new(
                        "support",
                        "Support",
                        format!(
                            "{} | {}",
                            self.branding.support_email, self.branding.support_phone
                        ),
                    ),
                    PassField::new("website", "Website", self.branding.website.clone()),
                ],
            },
        }
    }

    fn assemble(
        &self,
        dir: &Path,
        descriptor: &PassDescriptor,
        member: &members::Model,
    ) -> AppResult<PathBuf> {
        let pass_json = serde_json::to_vec_pretty(descriptor)?;
        fs::write(dir.join("pass.json"), &pass_json)?;

        self.copy_template_images(dir)?;

        let manifest = build_manifest(dir)?;
        let manifest_json = serde_json::to_vec(&manifest)?;
        fs::write(dir.join("manifest.json"), &manifest_json)?;

        let signature = self.sign_manifest(&manifest_json)?;
        fs::write(dir.join("signature"), &signature)?;

        self.package(dir, &member.member_code)
    }

    fn copy_template_images(&self, dir: &Path) -> AppResult<()> {
        let template_dir = Path::new(&self.config.template_path);
        if !template_dir.is_dir() {
            return Err(AppError::ConfigError(format!(
                "Pass template directory not found at {}",
                self.config.template_path
            )));
        }

        let mut copied = 0usize;
        for entry in fs::read_dir(template_dir)? {
            let entry = entry?;
            let path = entry.path();
            let is_png = path
                .extension()
                .map(|e| e.eq_ignore_ascii_case("png"))
                .unwrap_or(false);
            if path.is_file() && is_png {
                fs::copy(&path, dir.join(entry.file_name()))?;
                copied += 1;
            }
        }

        if copied == 0 {
            return Err(AppError::ConfigError(format!(
                "Pass template directory {} contains no images",
                self.config.template_path
            )));
        }

        Ok(())
    }

    /// Signs the manifest with the pass certificate, attaching the issuer
    /// intermediate so wallets can verify the chain. The signature is a
    /// detached PKCS#7 structure in raw DER form.
    fn sign_manifest(&self, manifest_json: &[u8]) -> AppResult<Vec<u8>> {
        let cert_path = Path::new(&self.config.certificate_path);
        if !cert_path.is_file() {
            return Err(AppError::SigningError(format!(
                "Pass signing certificate not found at {}",
                self.config.certificate_path
            )));
        }
        let wwdr_path = Path::new(&self.config.wwdr_certificate_path);
        if !wwdr_path.is_file() {
            return Err(AppError::SigningError(format!(
                "WWDR intermediate certificate not found at {}",
                self.config.wwdr_certificate_path
            )));
        }

        let pkcs12 = Pkcs12::from_der(&fs::read(cert_path)?)?;
        let parsed = pkcs12.parse2(&self.config.certificate_password).map_err(|_| {
            AppError::SigningError(
                "Failed to open pass certificate; check the configured password".to_string(),
            )
        })?;
        let cert = parsed.cert.ok_or_else(|| {
            AppError::SigningError("Certificate bundle contains no signing certificate".to_string())
        })?;
        let pkey = parsed.pkey.ok_or_else(|| {
            AppError::SigningError("Certificate bundle contains no private key".to_string())
        })?;

        let wwdr_bytes = fs::read(wwdr_path)?;
        let wwdr =
            X509::from_pem(&wwdr_bytes).or_else(|_| X509::from_der(&wwdr_bytes))?;
        let mut chain = Stack::new()?;
        chain.push(wwdr)?;

        let pkcs7 = Pkcs7::sign(
            &cert,
            &pkey,
            &chain,
            manifest_json,
            Pkcs7Flags::BINARY | Pkcs7Flags::DETACHED,
        )?;
        Ok(pkcs7.to_der()?)
    }

    fn package(&self, dir: &Path, member_code: &str) -> AppResult<PathBuf> {
        fs::create_dir_all(&self.config.output_path)?;
        let pkpass_path = Path::new(&self.config.output_path).join(format!("{member_code}.pkpass"));

        let file = fs::File::create(&pkpass_path)?;
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        let mut names: Vec<_> = fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .map(|e| e.file_name())
            .collect();
        names.sort();

        for name in names {
            let contents = fs::read(dir.join(&name))?;
            zip.start_file(name.to_string_lossy(), options)?;
            zip.write_all(&contents)?;
        }
        zip.finish()?;

        Ok(pkpass_path)
    }
}

/// SHA-1 digest of every file in the scratch directory, keyed by file name.
fn build_manifest(dir: &Path) -> AppResult<BTreeMap<String, String>> {
    let mut manifest = BTreeMap::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let contents = fs::read(&path)?;
        let digest = Sha1::digest(&contents);
        manifest.insert(
            entry.file_name().to_string_lossy().into_owned(),
            hex::encode(digest),
        );
    }
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MemberStatus;
    use std::collections::HashSet;
    use std::io::Read;

    fn testdata(rel: &str) -> String {
        format!("{}/testdata/{rel}", env!("CARGO_MANIFEST_DIR"))
    }

    fn test_member() -> members::Model {
        members::Model {
            id: 1,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            mobile: "+15551234567".to_string(),
            member_code: "PMC-2024-000001".to_string(),
            status: MemberStatus::Active,
            created_at: Some("2024-01-02T00:00:00Z".parse().unwrap()),
            updated_at: None,
        }
    }

    fn test_config(output: &Path, temp: &Path) -> AppleWalletConfig {
        AppleWalletConfig {
            team_id: "TEAM123456".to_string(),
            pass_type_id: "pass.com.premiumclub.membership".to_string(),
            organization_name: "Premium Membership Club".to_string(),
            certificate_path: testdata("certs/pass-signer.p12"),
            certificate_password: "password".to_string(),
            wwdr_certificate_path: testdata("certs/wwdr.pem"),
            template_path: testdata("templates/apple-pass"),
            output_path: output.to_string_lossy().into_owned(),
            temp_path: temp.to_string_lossy().into_owned(),
            description: "Membership Card".to_string(),
            logo_text: "Premium Member".to_string(),
            barcode_format: "PKBarcodeFormatQR".to_string(),
            barcode_encoding: "iso-8859-1".to_string(),
        }
    }

    fn test_builder(output: &Path, temp: &Path) -> ApplePassBuilder {
        ApplePassBuilder::new(test_config(output, temp), BrandingConfig::default())
    }

    #[test]
    fn test_hex_to_rgb() {
        assert_eq!(hex_to_rgb("#0f172a"), "rgb(15, 23, 42)");
        assert_eq!(hex_to_rgb("ffffff"), "rgb(255, 255, 255)");
        assert_eq!(hex_to_rgb("#fff"), "rgb(255, 0, 0)");
        assert_eq!(hex_to_rgb("nonsense"), "rgb(0, 0, 0)");
    }

    #[test]
    fn test_serial_numbers_are_unique() {
        let serials: HashSet<_> = (0..10_000).map(|_| generate_serial_number()).collect();
        assert_eq!(serials.len(), 10_000);
        assert!(serials.iter().all(|s| s.starts_with("PASS-")));
    }

    #[test]
    fn test_descriptor_layout() {
        let out = tempfile::tempdir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let builder = test_builder(out.path(), tmp.path());
        let descriptor = builder.build_descriptor(&test_member(), "PASS-abc");

        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["formatVersion"], 1);
        assert_eq!(json["serialNumber"], "PASS-abc");
        assert_eq!(json["teamIdentifier"], "TEAM123456");
        assert_eq!(json["backgroundColor"], "rgb(15, 23, 42)");
        // Both the modern array form and the legacy single key are present.
        assert_eq!(json["barcodes"][0]["message"], "PMC-2024-000001");
        assert_eq!(json["barcode"]["format"], "PKBarcodeFormatQR");
        assert_eq!(json["generic"]["primaryFields"][0]["value"], "Ada Lovelace");
        assert_eq!(json["generic"]["auxiliaryFields"][0]["value"], "Active");
        assert_eq!(json["generic"]["backFields"][0]["value"], "January 2, 2024");
    }

    #[test]
    fn test_build_produces_verifiable_bundle() {
        let out = tempfile::tempdir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let builder = test_builder(out.path(), tmp.path());

        let bundle = builder.build(&test_member()).unwrap();
        assert!(bundle.pkpass_path.ends_with("PMC-2024-000001.pkpass"));

        let file = fs::File::open(&bundle.pkpass_path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let names: HashSet<String> = archive.file_names().map(str::to_string).collect();
        assert!(names.contains("pass.json"));
        assert!(names.contains("manifest.json"));
        assert!(names.contains("signature"));
        assert!(names.contains("logo.png"));

        // The manifest digest for pass.json must match its contents.
        let mut pass_json = Vec::new();
        archive
            .by_name("pass.json")
            .unwrap()
            .read_to_end(&mut pass_json)
            .unwrap();
        let mut manifest_json = String::new();
        archive
            .by_name("manifest.json")
            .unwrap()
            .read_to_string(&mut manifest_json)
            .unwrap();
        let manifest: BTreeMap<String, String> = serde_json::from_str(&manifest_json).unwrap();
        assert_eq!(
            manifest["pass.json"],
            hex::encode(Sha1::digest(&pass_json))
        );
        // The signature itself is not part of the manifest.
        assert!(!manifest.contains_key("signature"));

        // Detached PKCS#7 in DER starts with a SEQUENCE tag.
        let mut signature = Vec::new();
        archive
            .by_name("signature")
            .unwrap()
            .read_to_end(&mut signature)
            .unwrap();
        assert_eq!(signature[0], 0x30);
    }

    #[test]
    fn test_scratch_dir_removed_on_signing_failure() {
        let out = tempfile::tempdir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let mut config = test_config(out.path(), tmp.path());
        config.wwdr_certificate_path = "/nonexistent/wwdr.pem".to_string();
        let builder = ApplePassBuilder::new(config, BrandingConfig::default());

        let err = builder.build(&test_member()).unwrap_err();
        assert!(matches!(err, AppError::SigningError(_)));

        // No scratch directories may survive the failed build.
        let leftovers = fs::read_dir(tmp.path()).unwrap().count();
        assert_eq!(leftovers, 0);
        // And no partial output either.
        let outputs = fs::read_dir(out.path()).unwrap().count();
        assert_eq!(outputs, 0);
    }
}

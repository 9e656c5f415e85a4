use crate::types::{
    AssetRole, CampaignDraft, FundingType, LocalAsset, TreasuryState, ValidationError,
    ValidationField,
};
use crate::units::NativeAmount;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const MIB: u64 = 1024 * 1024;

/// Business rules applied to a campaign draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    /// Treasury grants above this amount require a KYC-verified address.
    pub kyc_threshold: NativeAmount,
    /// Description limit, counted in Unicode code points.
    pub max_description_chars: usize,
    pub max_hero_bytes: u64,
    pub hero_mime_types: Vec<String>,
    pub max_document_bytes: u64,
    pub document_mime_types: Vec<String>,
    /// Currency symbol used in messages.
    pub currency_symbol: String,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            kyc_threshold: NativeAmount::from_units(5),
            max_description_chars: 100,
            max_hero_bytes: 5 * MIB,
            hero_mime_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "video/mp4".to_string(),
            ],
            max_document_bytes: 10 * MIB,
            document_mime_types: vec![
                "application/pdf".to_string(),
                "application/msword".to_string(),
            ],
            currency_symbol: "ETH".to_string(),
        }
    }
}

/// Field-level errors for one draft snapshot. Empty means the draft may be submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: BTreeSet<ValidationError>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn for_field(&self, field: ValidationField) -> Vec<&ValidationError> {
        self.errors.iter().filter(|e| e.field == field).collect()
    }

    pub fn has_field(&self, field: ValidationField) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    pub fn into_vec(self) -> Vec<ValidationError> {
        self.errors.into_iter().collect()
    }

    fn push(&mut self, field: ValidationField, message: impl Into<String>) {
        self.errors.insert(ValidationError::new(field, message));
    }
}

/// Deterministic draft validator.
///
/// Every rule is evaluated independently so the caller sees all violations at once.
#[derive(Debug, Clone, Default)]
pub struct ValidationEngine {
    policy: ValidationPolicy,
}

impl ValidationEngine {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    pub fn validate(&self, draft: &CampaignDraft, treasury: &TreasuryState) -> ValidationReport {
        let mut report = ValidationReport::default();
        let symbol = &self.policy.currency_symbol;

        if draft.name.is_empty() {
            report.push(ValidationField::Name, "Project name is required");
        }

        match NativeAmount::parse(&draft.funding_goal) {
            Ok(amount) if !amount.is_zero() => {
                if draft.funding_type == FundingType::TreasuryGrant {
                    self.check_treasury_grant(amount, treasury, &mut report);
                }
            }
            _ => report.push(
                ValidationField::FundingAmount,
                format!("Enter a valid {symbol} amount (e.g., 1.5)"),
            ),
        }

        if draft.description.is_empty() {
            report.push(ValidationField::Description, "Description is required");
        } else if draft.description.chars().count() > self.policy.max_description_chars {
            report.push(
                ValidationField::Description,
                format!("Max {} characters", self.policy.max_description_chars),
            );
        }

        if let Some(hero) = draft.asset(AssetRole::Hero) {
            self.check_hero(hero, &mut report);
        }
        if let Some(document) = draft.asset(AssetRole::Document) {
            self.check_document(document, &mut report);
        }

        report
    }

    fn check_treasury_grant(
        &self,
        amount: NativeAmount,
        treasury: &TreasuryState,
        report: &mut ValidationReport,
    ) {
        let symbol = &self.policy.currency_symbol;

        if amount > self.policy.kyc_threshold && !treasury.kyc_verified {
            report.push(
                ValidationField::FundingAmount,
                format!(
                    "KYC required for Treasury Grants over {} {symbol}",
                    short_amount(self.policy.kyc_threshold)
                ),
            );
        }

        if let Some(available) = treasury.available_funds {
            if amount > available {
                report.push(
                    ValidationField::FundingAmount,
                    format!(
                        "Exceeds available treasury funds ({} {symbol})",
                        available.to_fixed(2)
                    ),
                );
            }
        }
    }

    fn check_hero(&self, hero: &LocalAsset, report: &mut ValidationReport) {
        let allowed = self
            .policy
            .hero_mime_types
            .iter()
            .any(|mime| mime.eq_ignore_ascii_case(&hero.mime_type));
        if !allowed || hero.size_bytes > self.policy.max_hero_bytes {
            report.push(
                ValidationField::HeroMedia,
                format!(
                    "Upload a JPEG/PNG image or MP4 video (max {}MB)",
                    self.policy.max_hero_bytes / MIB
                ),
            );
        }
    }

    fn check_document(&self, document: &LocalAsset, report: &mut ValidationReport) {
        let allowed = self
            .policy
            .document_mime_types
            .iter()
            .any(|mime| mime.eq_ignore_ascii_case(&document.mime_type));
        if !allowed {
            report.push(
                ValidationField::File,
                "Only PDF or Word documents are allowed",
            );
        }
        if document.size_bytes > self.policy.max_document_bytes {
            report.push(
                ValidationField::File,
                format!(
                    "File must be under {}MB",
                    self.policy.max_document_bytes / MIB
                ),
            );
        }
    }
}

fn short_amount(amount: NativeAmount) -> String {
    let text = amount.to_string();
    text.strip_suffix(".0").map(str::to_string).unwrap_or(text)
}

//! The certification domain model: applications, documents, module fields,
//! and the append-only audit trail.
//!
//! An application moves `draft → in_progress → under_review` and terminates
//! in `approved` or `rejected`. The terminal states lock the record: no
//! module or document mutation is permitted afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a certification application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    InProgress,
    UnderReview,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    /// Terminal states lock the application against further edits.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::InProgress => "in_progress",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "in_progress" => Some(Self::InProgress),
            "under_review" => Some(Self::UnderReview),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of certification being applied for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificationType {
    Standard,
    Organic,
    Sustainable,
    Gmp,
}

impl CertificationType {
    pub const ALL: [CertificationType; 4] =
        [Self::Standard, Self::Organic, Self::Sustainable, Self::Gmp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Organic => "organic",
            Self::Sustainable => "sustainable",
            Self::Gmp => "gmp",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(Self::Standard),
            "organic" => Some(Self::Organic),
            "sustainable" => Some(Self::Sustainable),
            "gmp" => Some(Self::Gmp),
            _ => None,
        }
    }
}

impl std::fmt::Display for CertificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A certification application — the case being processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: ApplicationStatus,
    pub certification_type: CertificationType,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// OCR/extraction status of an attached document.
///
/// `Audited` supersedes `Completed` when a human-review flag is raised;
/// it blocks certification until resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Audited,
}

impl OcrStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Audited => "audited",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "audited" => Some(Self::Audited),
            _ => None,
        }
    }
}

impl std::fmt::Display for OcrStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document categories accepted for a certification application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    FinancialStatement,
    TaxReturn,
    BankStatement,
    LandDeed,
    InsuranceCertificate,
    BusinessLicense,
    EnvironmentalPermit,
    ComplianceCertificate,
    Other,
}

impl DocumentType {
    pub const ALL: [DocumentType; 9] = [
        Self::FinancialStatement,
        Self::TaxReturn,
        Self::BankStatement,
        Self::LandDeed,
        Self::InsuranceCertificate,
        Self::BusinessLicense,
        Self::EnvironmentalPermit,
        Self::ComplianceCertificate,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FinancialStatement => "financial_statement",
            Self::TaxReturn => "tax_return",
            Self::BankStatement => "bank_statement",
            Self::LandDeed => "land_deed",
            Self::InsuranceCertificate => "insurance_certificate",
            Self::BusinessLicense => "business_license",
            Self::EnvironmentalPermit => "environmental_permit",
            Self::ComplianceCertificate => "compliance_certificate",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }

    /// Human-readable label, e.g. "Financial Statement".
    pub fn display_name(&self) -> String {
        self.as_str()
            .split('_')
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field extracted from a document by the OCR pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedField {
    pub name: String,
    pub value: String,
    pub confidence: f64,
}

/// Extraction results written back by the external OCR worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    #[serde(default)]
    pub fields: Vec<ExtractedField>,

    #[serde(default)]
    pub processing_time_secs: f64,

    #[serde(default)]
    pub page_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub confidence_avg: f64,

    /// Error message when OCR failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A file attached to an application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub application_id: Uuid,
    pub document_type: DocumentType,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub storage_path: String,
    pub ocr_status: OcrStatus,
    pub extraction: Option<ExtractionMetadata>,
    pub needs_audit: bool,
    pub audit_reason: Option<String>,
    pub audit_requested_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One of the five fixed certification data modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertModule {
    Financial,
    Compliance,
    Operations,
    Sustainability,
    Risk,
}

impl CertModule {
    pub const ALL: [CertModule; 5] = [
        Self::Financial,
        Self::Compliance,
        Self::Operations,
        Self::Sustainability,
        Self::Risk,
    ];

    /// Module number 1–5. The mapping is fixed: 1=financial, 2=compliance,
    /// 3=operations, 4=sustainability, 5=risk.
    pub fn number(&self) -> u8 {
        match self {
            Self::Financial => 1,
            Self::Compliance => 2,
            Self::Operations => 3,
            Self::Sustainability => 4,
            Self::Risk => 5,
        }
    }

    pub fn from_number(n: i64) -> Option<Self> {
        match n {
            1 => Some(Self::Financial),
            2 => Some(Self::Compliance),
            3 => Some(Self::Operations),
            4 => Some(Self::Sustainability),
            5 => Some(Self::Risk),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Financial => "financial",
            Self::Compliance => "compliance",
            Self::Operations => "operations",
            Self::Sustainability => "sustainability",
            Self::Risk => "risk",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.name() == s)
    }

    /// Human-readable label, e.g. "Financial Information".
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Financial => "Financial Information",
            Self::Compliance => "Compliance Records",
            Self::Operations => "Operations Data",
            Self::Sustainability => "Sustainability Practices",
            Self::Risk => "Risk Management",
        }
    }
}

impl std::fmt::Display for CertModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Provenance of a module field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Extracted by the OCR pipeline; confidence may be < 1.0.
    OcrExtracted,
    /// First entered by a human or the agent; always full confidence.
    ProxyEntered,
    /// Overwrote an existing value; always full confidence.
    ProxyEdited,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OcrExtracted => "ocr_extracted",
            Self::ProxyEntered => "proxy_entered",
            Self::ProxyEdited => "proxy_edited",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ocr_extracted" => Some(Self::OcrExtracted),
            "proxy_entered" => Some(Self::ProxyEntered),
            "proxy_edited" => Some(Self::ProxyEdited),
            _ => None,
        }
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A human-review marker on a module field. Stored as a first-class
/// attribute next to the value — flagging never rewrites the value itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditFlag {
    pub reason: String,
    pub requested_at: DateTime<Utc>,
}

/// One structured datum inside a certification module.
///
/// Unique per (application, module, field_id): updates overwrite in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleField {
    pub id: Uuid,
    pub application_id: Uuid,
    pub module: CertModule,
    pub field_id: String,
    pub value: String,
    pub data_source: DataSource,
    pub confidence: f64,
    pub audit_flag: Option<AuditFlag>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only log row recording one state-changing action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditTrailEntry {
    pub id: Uuid,
    pub application_id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    pub field_ref: Option<String>,
    pub new_value: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A user account resolved by email. Account provisioning lives in the
/// authentication system, outside this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
}

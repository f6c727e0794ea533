use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImportFormat {
    #[serde(rename = "WBR")]
    Wbr,
    #[serde(rename = "MIS")]
    Mis,
}

impl ImportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wbr => "WBR",
            Self::Mis => "MIS",
        }
    }

    /// Tag stamped on clients created by an import of this format.
    pub fn client_tag(&self) -> &'static str {
        match self {
            Self::Wbr => "WBR_IMPORT",
            Self::Mis => "MIS_IMPORT",
        }
    }
}

impl fmt::Display for ImportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "WBR" => Ok(Self::Wbr),
            "MIS" => Ok(Self::Mis),
            other => Err(anyhow::anyhow!("Unknown import format: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStatus {
    Pending,
    Processing,
    Completed,
    Partial,
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Partial => "PARTIAL",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Partial | Self::Failed)
    }

    /// PENDING -> PROCESSING -> one of the terminal states. A run that has not
    /// reached PROCESSING can still be failed outright.
    pub fn can_transition_to(&self, next: ImportStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Processing) => true,
            (Self::Pending, Self::Failed) => true,
            (Self::Processing, next) => next.is_terminal(),
            _ => false,
        }
    }

    /// Terminal status of a run once every group has been processed.
    pub fn derive(error_count: usize, imported_clients: usize) -> Self {
        if error_count == 0 {
            Self::Completed
        } else if imported_clients == 0 {
            Self::Failed
        } else {
            Self::Partial
        }
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "PARTIAL" => Ok(Self::Partial),
            "FAILED" => Ok(Self::Failed),
            other => Err(anyhow::anyhow!("Unknown import status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorKind {
    EmptyFile,
    MissingColumns,
    MissingRequiredFields,
    InvalidUnits,
    MalformedRow,
    ClientFailed,
    HoldingFailed,
    RunFailed,
}

impl ParseErrorKind {
    /// Row-level rejections. File-level and run-level kinds do not consume a data row.
    pub fn rejects_row(&self) -> bool {
        matches!(
            self,
            Self::MissingRequiredFields | Self::InvalidUnits | Self::MalformedRow
        )
    }
}

/// One entry of an import's error list. Row 0 is reserved for file-level errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    pub row: usize,
    pub field: String,
    pub message: String,
    pub kind: ParseErrorKind,
}

impl RowError {
    pub fn new(row: usize, field: impl Into<String>, message: impl Into<String>, kind: ParseErrorKind) -> Self {
        Self {
            row,
            field: field.into(),
            message: message.into(),
            kind,
        }
    }

    pub fn file_level(field: impl Into<String>, message: impl Into<String>, kind: ParseErrorKind) -> Self {
        Self::new(0, field, message, kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WbrRecord {
    pub row: usize,
    pub amc_code: String,
    pub amc_name: String,
    pub folio_no: String,
    pub investor_name: String,
    pub pan: String,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub scheme_name: String,
    pub isin: Option<String>,
    pub amfi_code: Option<String>,
    pub units: Decimal,
    pub nav: Decimal,
    pub nav_date: NaiveDateTime,
    pub current_value: Decimal,
    pub cost_value: Option<Decimal>,
    pub dividend_option: Option<String>,
    pub plan_type: Option<String>,
    pub broker_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MisRecord {
    pub row: usize,
    pub fund_name: String,
    pub scheme_name: String,
    pub folio_no: String,
    pub investor_name: String,
    pub pan: String,
    pub mobile: Option<String>,
    pub email: Option<String>,
    pub units: Decimal,
    pub amount: Decimal,
    pub current_value: Decimal,
    pub isin: Option<String>,
    pub arn_no: Option<String>,
    pub sub_arn: Option<String>,
    /// Parse-time timestamp; MIS exports carry no valuation date.
    pub as_of: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format")]
pub enum ParsedRecord {
    #[serde(rename = "WBR")]
    Wbr(WbrRecord),
    #[serde(rename = "MIS")]
    Mis(MisRecord),
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() { None } else { Some(s) }
}

impl ParsedRecord {
    pub fn format(&self) -> ImportFormat {
        match self {
            Self::Wbr(_) => ImportFormat::Wbr,
            Self::Mis(_) => ImportFormat::Mis,
        }
    }

    pub fn row(&self) -> usize {
        match self {
            Self::Wbr(r) => r.row,
            Self::Mis(r) => r.row,
        }
    }

    pub fn investor_name(&self) -> &str {
        match self {
            Self::Wbr(r) => &r.investor_name,
            Self::Mis(r) => &r.investor_name,
        }
    }

    pub fn pan(&self) -> Option<&str> {
        match self {
            Self::Wbr(r) => non_empty(&r.pan),
            Self::Mis(r) => non_empty(&r.pan),
        }
    }

    pub fn scheme_name(&self) -> &str {
        match self {
            Self::Wbr(r) => &r.scheme_name,
            Self::Mis(r) => &r.scheme_name,
        }
    }

    pub fn isin(&self) -> Option<&str> {
        match self {
            Self::Wbr(r) => r.isin.as_deref(),
            Self::Mis(r) => r.isin.as_deref(),
        }
    }

    pub fn registrar_code(&self) -> Option<&str> {
        match self {
            Self::Wbr(r) => r.amfi_code.as_deref(),
            Self::Mis(_) => None,
        }
    }

    pub fn folio_no(&self) -> &str {
        match self {
            Self::Wbr(r) => &r.folio_no,
            Self::Mis(r) => &r.folio_no,
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            Self::Wbr(r) => r.email.as_deref(),
            Self::Mis(r) => r.email.as_deref(),
        }
    }

    pub fn mobile(&self) -> Option<&str> {
        match self {
            Self::Wbr(r) => r.mobile.as_deref(),
            Self::Mis(r) => r.mobile.as_deref(),
        }
    }

    pub fn units(&self) -> Decimal {
        match self {
            Self::Wbr(r) => r.units,
            Self::Mis(r) => r.units,
        }
    }

    /// Price per unit as printed on the row, if the format reports one.
    pub fn reported_nav(&self) -> Option<Decimal> {
        match self {
            Self::Wbr(r) => Some(r.nav),
            Self::Mis(_) => None,
        }
    }

    pub fn invested_value(&self) -> Decimal {
        match self {
            Self::Wbr(r) => r.cost_value.unwrap_or(Decimal::ZERO),
            Self::Mis(r) => r.amount,
        }
    }

    pub fn current_value(&self) -> Decimal {
        match self {
            Self::Wbr(r) => r.current_value,
            Self::Mis(r) => r.current_value,
        }
    }

    pub fn valued_at(&self) -> NaiveDateTime {
        match self {
            Self::Wbr(r) => r.nav_date,
            Self::Mis(r) => r.as_of,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParseOutcome {
    pub records: Vec<ParsedRecord>,
    pub errors: Vec<RowError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KycStatus {
    Pending,
    Verified,
    Rejected,
}

impl KycStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Verified => "VERIFIED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl FromStr for KycStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "VERIFIED" => Ok(Self::Verified),
            "REJECTED" => Ok(Self::Rejected),
            other => Err(anyhow::anyhow!("Unknown KYC status: {}", other)),
        }
    }
}

/// Fields used when the client directory has to create a new client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSeed {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub kyc_status: KycStatus,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub advisor_id: String,
    pub name: String,
    pub pan: Option<String>,
    pub email: String,
    pub phone: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub kyc_status: KycStatus,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedClient {
    pub client: Client,
    pub created: bool,
}

/// A scheme plan as known to the fund directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemeRef {
    pub plan_id: String,
    pub scheme_name: Option<String>,
    pub isin: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetClass {
    Equity,
    Debt,
    Hybrid,
    Other,
    Unknown,
}

impl AssetClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equity => "Equity",
            Self::Debt => "Debt",
            Self::Hybrid => "Hybrid",
            Self::Other => "Other",
            Self::Unknown => "Unknown",
        }
    }
}

impl FromStr for AssetClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Equity" => Ok(Self::Equity),
            "Debt" => Ok(Self::Debt),
            "Hybrid" => Ok(Self::Hybrid),
            "Other" => Ok(Self::Other),
            "Unknown" => Ok(Self::Unknown),
            other => Err(anyhow::anyhow!("Unknown asset class: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingInput {
    pub client_id: String,
    pub scheme_plan_id: Option<String>,
    pub fund_name: String,
    pub fund_scheme_code: String,
    pub fund_category: String,
    pub asset_class: AssetClass,
    pub folio_number: String,
    pub units: Decimal,
    pub avg_nav: Decimal,
    pub current_nav: Decimal,
    pub invested_value: Decimal,
    pub current_value: Decimal,
    pub absolute_gain: Decimal,
    pub absolute_gain_pct: Decimal,
    pub last_txn_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub id: String,
    #[serde(flatten)]
    pub details: HoldingInput,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewImportRun {
    pub advisor_id: String,
    pub format: ImportFormat,
    pub file_name: String,
    pub file_size: u64,
    pub total_records: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRun {
    pub id: String,
    pub advisor_id: String,
    pub format: ImportFormat,
    pub file_name: String,
    pub file_size: u64,
    pub status: ImportStatus,
    pub total_records: usize,
    pub imported_clients: usize,
    pub imported_holdings: usize,
    pub skipped_records: usize,
    pub error_records: usize,
    pub errors: Vec<RowError>,
    pub created_at: DateTime<Utc>,
}

/// Counters and errors accumulated while processing one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub status: ImportStatus,
    pub imported_clients: usize,
    pub imported_holdings: usize,
    pub skipped_records: usize,
    pub errors: Vec<RowError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunUpdate {
    Finished(RunOutcome),
    /// Run-level failure: status forced to FAILED, error list replaced.
    Aborted(RowError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRunSummary {
    pub id: String,
    pub format: ImportFormat,
    pub file_name: String,
    pub file_size: u64,
    pub status: ImportStatus,
    pub total_records: usize,
    pub imported_clients: usize,
    pub imported_holdings: usize,
    pub skipped_records: usize,
    pub error_records: usize,
    pub created_at: DateTime<Utc>,
}

impl From<&ImportRun> for ImportRunSummary {
    fn from(run: &ImportRun) -> Self {
        Self {
            id: run.id.clone(),
            format: run.format,
            file_name: run.file_name.clone(),
            file_size: run.file_size,
            status: run.status,
            total_records: run.total_records,
            imported_clients: run.imported_clients,
            imported_holdings: run.imported_holdings,
            skipped_records: run.skipped_records,
            error_records: run.error_records,
            created_at: run.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_derivation_table() {
        assert_eq!(ImportStatus::derive(0, 0), ImportStatus::Completed);
        assert_eq!(ImportStatus::derive(0, 3), ImportStatus::Completed);
        assert_eq!(ImportStatus::derive(2, 1), ImportStatus::Partial);
        assert_eq!(ImportStatus::derive(1, 0), ImportStatus::Failed);
    }

    #[test]
    fn test_status_transitions() {
        assert!(ImportStatus::Pending.can_transition_to(ImportStatus::Processing));
        assert!(ImportStatus::Processing.can_transition_to(ImportStatus::Partial));
        assert!(ImportStatus::Processing.can_transition_to(ImportStatus::Failed));
        assert!(!ImportStatus::Processing.can_transition_to(ImportStatus::Pending));
        assert!(!ImportStatus::Completed.can_transition_to(ImportStatus::Failed));
        assert!(!ImportStatus::Pending.can_transition_to(ImportStatus::Completed));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            ImportStatus::Pending,
            ImportStatus::Processing,
            ImportStatus::Completed,
            ImportStatus::Partial,
            ImportStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ImportStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("wbr".parse::<ImportFormat>().unwrap(), ImportFormat::Wbr);
        assert_eq!(" MIS ".parse::<ImportFormat>().unwrap(), ImportFormat::Mis);
        assert!("xlsx".parse::<ImportFormat>().is_err());
    }
}

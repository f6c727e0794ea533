use anyhow::{Result, anyhow};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::grouper::RecordGroup;
use crate::models::{AssetClass, ClientSeed, KycStatus, ParsedRecord, ResolvedClient, SchemeRef};
use crate::store::{ClientDirectory, SchemeDirectory};

static REGISTRAR_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d+)").unwrap());

/// Registrar codes are numeric; trailing junk after the leading digits is ignored.
pub fn parse_registrar_code(raw: &str) -> Option<i64> {
    REGISTRAR_CODE_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Case-insensitive substring match in fixed priority order; first match wins.
pub fn infer_asset_class(category: &str) -> AssetClass {
    let lower = category.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["equity", "elss"]) {
        AssetClass::Equity
    } else if has(&["debt", "gilt", "liquid", "money market"]) {
        AssetClass::Debt
    } else if has(&["hybrid", "balanced", "multi asset"]) {
        AssetClass::Hybrid
    } else {
        AssetClass::Other
    }
}

/// One step of the scheme lookup cascade.
#[async_trait]
pub trait SchemeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// The row value this strategy looks the scheme up by.
    fn matched_key<'a>(&self, record: &'a ParsedRecord) -> Option<&'a str>;

    async fn resolve(&self, record: &ParsedRecord, schemes: &dyn SchemeDirectory) -> Result<Option<SchemeRef>>;
}

pub struct ByIsin;

#[async_trait]
impl SchemeStrategy for ByIsin {
    fn name(&self) -> &'static str {
        "isin"
    }

    fn matched_key<'a>(&self, record: &'a ParsedRecord) -> Option<&'a str> {
        record.isin()
    }

    async fn resolve(&self, record: &ParsedRecord, schemes: &dyn SchemeDirectory) -> Result<Option<SchemeRef>> {
        match record.isin() {
            Some(isin) => schemes.find_scheme_by_isin(isin).await,
            None => Ok(None),
        }
    }
}

pub struct ByRegistrarCode;

#[async_trait]
impl SchemeStrategy for ByRegistrarCode {
    fn name(&self) -> &'static str {
        "registrar_code"
    }

    fn matched_key<'a>(&self, record: &'a ParsedRecord) -> Option<&'a str> {
        record.registrar_code()
    }

    async fn resolve(&self, record: &ParsedRecord, schemes: &dyn SchemeDirectory) -> Result<Option<SchemeRef>> {
        let Some(raw) = record.registrar_code() else {
            return Ok(None);
        };
        match parse_registrar_code(raw) {
            Some(code) => schemes.find_scheme_by_registrar_code(code).await,
            None => {
                debug!("Row {}: registrar code '{}' is not numeric", record.row(), raw);
                Ok(None)
            }
        }
    }
}

/// Scheme fields carried onto a holding, resolved or not.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemeIdentity {
    pub plan_id: Option<String>,
    pub fund_name: String,
    pub scheme_code: String,
    pub category: String,
    pub asset_class: AssetClass,
}

impl SchemeIdentity {
    pub fn unresolved(record: &ParsedRecord) -> Self {
        Self {
            plan_id: None,
            fund_name: record.scheme_name().to_string(),
            scheme_code: fallback_scheme_code(record),
            category: "Unknown".to_string(),
            asset_class: AssetClass::Unknown,
        }
    }

    /// The plan's own ISIN wins as the scheme code; otherwise the row value the
    /// scheme was matched by.
    pub fn resolved(record: &ParsedRecord, scheme: SchemeRef, matched_key: Option<&str>) -> Self {
        let category = scheme.category.unwrap_or_else(|| "Unknown".to_string());
        let asset_class = infer_asset_class(&category);
        let scheme_code = scheme
            .isin
            .or_else(|| matched_key.map(str::to_string))
            .unwrap_or_else(|| fallback_scheme_code(record));
        Self {
            plan_id: Some(scheme.plan_id),
            fund_name: scheme.scheme_name.unwrap_or_else(|| record.scheme_name().to_string()),
            scheme_code,
            category,
            asset_class,
        }
    }
}

fn fallback_scheme_code(record: &ParsedRecord) -> String {
    record
        .isin()
        .or_else(|| record.registrar_code())
        .unwrap_or("IMPORTED")
        .to_string()
}

pub fn default_strategies() -> Vec<Box<dyn SchemeStrategy>> {
    vec![Box::new(ByIsin), Box::new(ByRegistrarCode)]
}

pub struct IdentityResolver {
    clients: Arc<dyn ClientDirectory>,
    schemes: Arc<dyn SchemeDirectory>,
    strategies: Vec<Box<dyn SchemeStrategy>>,
    placeholder_domain: String,
}

impl IdentityResolver {
    pub fn new(
        clients: Arc<dyn ClientDirectory>,
        schemes: Arc<dyn SchemeDirectory>,
        placeholder_domain: impl Into<String>,
    ) -> Self {
        Self::with_strategies(clients, schemes, placeholder_domain, default_strategies())
    }

    pub fn with_strategies(
        clients: Arc<dyn ClientDirectory>,
        schemes: Arc<dyn SchemeDirectory>,
        placeholder_domain: impl Into<String>,
        strategies: Vec<Box<dyn SchemeStrategy>>,
    ) -> Self {
        Self {
            clients,
            schemes,
            strategies,
            placeholder_domain: placeholder_domain.into(),
        }
    }

    /// Seed fields come from the first record of the group.
    pub fn client_seed(&self, record: &ParsedRecord) -> ClientSeed {
        let email = record
            .email()
            .map(str::to_string)
            .unwrap_or_else(|| self.placeholder_email());
        let (city, state, pincode) = match record {
            ParsedRecord::Wbr(r) => (r.city.clone(), r.state.clone(), r.pincode.clone()),
            ParsedRecord::Mis(_) => (None, None, None),
        };
        ClientSeed {
            name: record.investor_name().to_string(),
            email,
            phone: record.mobile().unwrap_or("N/A").to_string(),
            city,
            state,
            pincode,
            kyc_status: KycStatus::Pending,
            tags: vec![record.format().client_tag().to_string()],
        }
    }

    fn placeholder_email(&self) -> String {
        let token = Uuid::new_v4().simple().to_string();
        format!("import-{}@{}", &token[..8], self.placeholder_domain)
    }

    pub async fn resolve_client(&self, advisor_id: &str, group: &RecordGroup) -> Result<ResolvedClient> {
        let first = group
            .first()
            .ok_or_else(|| anyhow!("Group {} has no records", group.key))?;
        let seed = self.client_seed(first);
        self.clients.find_or_create_client(advisor_id, first.pan(), &seed).await
    }

    /// Tries each strategy in order and stops at the first hit.
    pub async fn resolve_scheme(&self, record: &ParsedRecord) -> Result<SchemeIdentity> {
        for strategy in &self.strategies {
            if let Some(scheme) = strategy.resolve(record, self.schemes.as_ref()).await? {
                debug!(
                    "Row {}: scheme {} resolved by {}",
                    record.row(),
                    scheme.plan_id,
                    strategy.name()
                );
                return Ok(SchemeIdentity::resolved(record, scheme, strategy.matched_key(record)));
            }
        }
        Ok(SchemeIdentity::unresolved(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WbrRecord;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    #[test]
    fn test_infer_asset_class() {
        assert_eq!(infer_asset_class("Large & Mid Cap Equity"), AssetClass::Equity);
        assert_eq!(infer_asset_class("ELSS"), AssetClass::Equity);
        assert_eq!(infer_asset_class("Liquid Fund"), AssetClass::Debt);
        assert_eq!(infer_asset_class("Gilt Fund with 10 year constant duration"), AssetClass::Debt);
        assert_eq!(infer_asset_class("MONEY MARKET"), AssetClass::Debt);
        assert_eq!(infer_asset_class("Balanced Advantage"), AssetClass::Hybrid);
        assert_eq!(infer_asset_class("Multi Asset Allocation"), AssetClass::Hybrid);
        assert_eq!(infer_asset_class("Commodity"), AssetClass::Other);
    }

    #[test]
    fn test_infer_asset_class_priority() {
        // equity outranks hybrid, debt outranks hybrid
        assert_eq!(infer_asset_class("Equity Hybrid"), AssetClass::Equity);
        assert_eq!(infer_asset_class("Conservative Hybrid Debt"), AssetClass::Debt);
    }

    #[test]
    fn test_parse_registrar_code() {
        assert_eq!(parse_registrar_code("118989"), Some(118989));
        assert_eq!(parse_registrar_code(" 120503-G"), Some(120503));
        assert_eq!(parse_registrar_code("N/A"), None);
    }

    fn wbr(isin: Option<&str>, amfi_code: Option<&str>) -> ParsedRecord {
        ParsedRecord::Wbr(WbrRecord {
            row: 2,
            amc_code: String::new(),
            amc_name: String::new(),
            folio_no: "F1".to_string(),
            investor_name: "Asha".to_string(),
            pan: "ABCDE1234F".to_string(),
            email: None,
            mobile: None,
            address: None,
            city: Some("Pune".to_string()),
            state: None,
            pincode: None,
            scheme_name: "Row Scheme".to_string(),
            isin: isin.map(str::to_string),
            amfi_code: amfi_code.map(str::to_string),
            units: dec!(10),
            nav: dec!(12),
            nav_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            current_value: dec!(120),
            cost_value: None,
            dividend_option: None,
            plan_type: None,
            broker_code: None,
        })
    }

    #[derive(Default)]
    struct FakeSchemes {
        calls: Mutex<Vec<String>>,
        isin_hit: bool,
        code_hit: bool,
    }

    #[async_trait]
    impl SchemeDirectory for FakeSchemes {
        async fn find_scheme_by_isin(&self, isin: &str) -> Result<Option<SchemeRef>> {
            self.calls.lock().unwrap().push(format!("isin:{}", isin));
            Ok(self.isin_hit.then(|| SchemeRef {
                plan_id: "plan-isin".to_string(),
                scheme_name: Some("Alpha Bluechip".to_string()),
                isin: Some(isin.to_string()),
                category: Some("Large Cap Equity".to_string()),
            }))
        }

        async fn find_scheme_by_registrar_code(&self, code: i64) -> Result<Option<SchemeRef>> {
            self.calls.lock().unwrap().push(format!("code:{}", code));
            Ok(self.code_hit.then(|| SchemeRef {
                plan_id: "plan-code".to_string(),
                scheme_name: Some("Beta Liquid".to_string()),
                isin: None,
                category: Some("Liquid".to_string()),
            }))
        }
    }

    struct NoClients;

    #[async_trait]
    impl ClientDirectory for NoClients {
        async fn find_or_create_client(&self, _: &str, _: Option<&str>, _: &ClientSeed) -> Result<ResolvedClient> {
            Err(anyhow!("not used"))
        }
    }

    fn resolver(schemes: Arc<FakeSchemes>) -> IdentityResolver {
        IdentityResolver::new(Arc::new(NoClients), schemes, "import.placeholder")
    }

    #[tokio::test]
    async fn test_isin_match_stops_the_cascade() {
        let schemes = Arc::new(FakeSchemes { isin_hit: true, code_hit: true, ..Default::default() });
        let identity = resolver(schemes.clone())
            .resolve_scheme(&wbr(Some("INF000A01010"), Some("118989")))
            .await
            .unwrap();
        assert_eq!(identity.plan_id.as_deref(), Some("plan-isin"));
        assert_eq!(identity.fund_name, "Alpha Bluechip");
        assert_eq!(identity.asset_class, AssetClass::Equity);
        assert_eq!(*schemes.calls.lock().unwrap(), vec!["isin:INF000A01010"]);
    }

    #[tokio::test]
    async fn test_registrar_code_used_after_isin_miss() {
        let schemes = Arc::new(FakeSchemes { code_hit: true, ..Default::default() });
        let identity = resolver(schemes.clone())
            .resolve_scheme(&wbr(Some("INF000A01010"), Some("118989")))
            .await
            .unwrap();
        assert_eq!(identity.plan_id.as_deref(), Some("plan-code"));
        assert_eq!(identity.category, "Liquid");
        assert_eq!(identity.asset_class, AssetClass::Debt);
        // plan has no ISIN of its own, so the code it was found by is kept
        assert_eq!(identity.scheme_code, "118989");
        assert_eq!(*schemes.calls.lock().unwrap(), vec!["isin:INF000A01010", "code:118989"]);
    }

    #[tokio::test]
    async fn test_registrar_code_hit_without_row_isin() {
        let schemes = Arc::new(FakeSchemes { code_hit: true, ..Default::default() });
        let identity = resolver(schemes.clone())
            .resolve_scheme(&wbr(None, Some("120503-G")))
            .await
            .unwrap();
        assert_eq!(identity.plan_id.as_deref(), Some("plan-code"));
        assert_eq!(identity.scheme_code, "120503-G");
        assert_eq!(*schemes.calls.lock().unwrap(), vec!["code:120503"]);
    }

    #[tokio::test]
    async fn test_unresolved_scheme_falls_back_to_unknown() {
        let schemes = Arc::new(FakeSchemes::default());
        let identity = resolver(schemes.clone()).resolve_scheme(&wbr(None, None)).await.unwrap();
        assert_eq!(identity.plan_id, None);
        assert_eq!(identity.fund_name, "Row Scheme");
        assert_eq!(identity.scheme_code, "IMPORTED");
        assert_eq!(identity.category, "Unknown");
        assert_eq!(identity.asset_class, AssetClass::Unknown);
        assert!(schemes.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_client_seed_uses_placeholder_email() {
        let r = resolver(Arc::new(FakeSchemes::default()));
        let seed = r.client_seed(&wbr(None, None));
        assert_eq!(seed.name, "Asha");
        assert_eq!(seed.phone, "N/A");
        assert_eq!(seed.city.as_deref(), Some("Pune"));
        assert_eq!(seed.kyc_status, KycStatus::Pending);
        assert_eq!(seed.tags, vec!["WBR_IMPORT"]);
        assert!(seed.email.starts_with("import-"));
        assert!(seed.email.ends_with("@import.placeholder"));
        assert_eq!(seed.email.len(), "import-".len() + 8 + "@import.placeholder".len());
    }
}

use chrono::NaiveDateTime;

use super::{RegistrarRecord, number_or_zero, parse_date, parse_number, required_fields};
use crate::headers::{CanonicalField, ColumnMap};
use crate::models::{ParsedRecord, RowError, WbrRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WbrField {
    AmcCode,
    AmcName,
    FolioNo,
    InvestorName,
    Pan,
    Email,
    Mobile,
    Address,
    City,
    State,
    Pincode,
    SchemeName,
    Isin,
    AmfiCode,
    Units,
    Nav,
    NavDate,
    CurrentValue,
    CostValue,
    DividendOption,
    PlanType,
    BrokerCode,
}

// WBR exports differ between registrar releases; every known spelling is listed.
const WBR_ALIASES: &[(&str, WbrField)] = &[
    ("AMC_CODE", WbrField::AmcCode),
    ("AMC CODE", WbrField::AmcCode),
    ("AMC_NAME", WbrField::AmcName),
    ("AMC NAME", WbrField::AmcName),
    ("FOLIO_NO", WbrField::FolioNo),
    ("FOLIO NO", WbrField::FolioNo),
    ("FOLIO", WbrField::FolioNo),
    ("INVESTOR_NAME", WbrField::InvestorName),
    ("INVESTOR NAME", WbrField::InvestorName),
    ("NAME", WbrField::InvestorName),
    ("PAN", WbrField::Pan),
    ("PAN_NO", WbrField::Pan),
    ("EMAIL", WbrField::Email),
    ("EMAIL_ID", WbrField::Email),
    ("MOBILE", WbrField::Mobile),
    ("MOBILE_NO", WbrField::Mobile),
    ("ADDRESS", WbrField::Address),
    ("CITY", WbrField::City),
    ("STATE", WbrField::State),
    ("PINCODE", WbrField::Pincode),
    ("PIN_CODE", WbrField::Pincode),
    ("SCHEME_NAME", WbrField::SchemeName),
    ("SCHEME NAME", WbrField::SchemeName),
    ("SCHEME", WbrField::SchemeName),
    ("ISIN", WbrField::Isin),
    ("ISIN_NO", WbrField::Isin),
    ("AMFI_CODE", WbrField::AmfiCode),
    ("AMFI CODE", WbrField::AmfiCode),
    ("UNITS", WbrField::Units),
    ("NAV", WbrField::Nav),
    ("NAV_DATE", WbrField::NavDate),
    ("NAV DATE", WbrField::NavDate),
    ("CURRENT_VALUE", WbrField::CurrentValue),
    ("CURRENT VALUE", WbrField::CurrentValue),
    ("MARKET_VALUE", WbrField::CurrentValue),
    ("COST_VALUE", WbrField::CostValue),
    ("COST VALUE", WbrField::CostValue),
    ("COST", WbrField::CostValue),
    ("DIVIDEND_OPTION", WbrField::DividendOption),
    ("DIVIDEND OPTION", WbrField::DividendOption),
    ("PLAN_TYPE", WbrField::PlanType),
    ("PLAN TYPE", WbrField::PlanType),
    ("BROKER_CODE", WbrField::BrokerCode),
    ("BROKER CODE", WbrField::BrokerCode),
    ("ARN", WbrField::BrokerCode),
    ("ARN_NO", WbrField::BrokerCode),
];

const WBR_FIELDS: &[WbrField] = &[
    WbrField::AmcCode,
    WbrField::AmcName,
    WbrField::FolioNo,
    WbrField::InvestorName,
    WbrField::Pan,
    WbrField::Email,
    WbrField::Mobile,
    WbrField::Address,
    WbrField::City,
    WbrField::State,
    WbrField::Pincode,
    WbrField::SchemeName,
    WbrField::Isin,
    WbrField::AmfiCode,
    WbrField::Units,
    WbrField::Nav,
    WbrField::NavDate,
    WbrField::CurrentValue,
    WbrField::CostValue,
    WbrField::DividendOption,
    WbrField::PlanType,
    WbrField::BrokerCode,
];

impl CanonicalField for WbrField {
    fn name(&self) -> &'static str {
        match self {
            Self::AmcCode => "amc_code",
            Self::AmcName => "amc_name",
            Self::FolioNo => "folio_no",
            Self::InvestorName => "investor_name",
            Self::Pan => "pan",
            Self::Email => "email",
            Self::Mobile => "mobile",
            Self::Address => "address",
            Self::City => "city",
            Self::State => "state",
            Self::Pincode => "pincode",
            Self::SchemeName => "scheme_name",
            Self::Isin => "isin",
            Self::AmfiCode => "amfi_code",
            Self::Units => "units",
            Self::Nav => "nav",
            Self::NavDate => "nav_date",
            Self::CurrentValue => "current_value",
            Self::CostValue => "cost_value",
            Self::DividendOption => "dividend_option",
            Self::PlanType => "plan_type",
            Self::BrokerCode => "broker_code",
        }
    }

    fn all() -> &'static [Self] {
        WBR_FIELDS
    }

    fn required() -> &'static [Self] {
        &[Self::InvestorName, Self::Pan, Self::SchemeName, Self::Units]
    }

    fn builtin_aliases() -> &'static [(&'static str, Self)] {
        WBR_ALIASES
    }
}

pub struct WbrRow(pub WbrRecord);

impl RegistrarRecord for WbrRow {
    type Field = WbrField;

    fn from_row(
        row: usize,
        columns: &ColumnMap<WbrField>,
        values: &[String],
        now: NaiveDateTime,
    ) -> Result<Self, RowError> {
        let get = |field: WbrField| columns.value(field, values);
        let text = |field: WbrField| columns.text(field, values);

        let (investor_name, scheme_name, units) = required_fields(
            row,
            get(WbrField::InvestorName),
            get(WbrField::SchemeName),
            get(WbrField::Units),
        )?;

        // unparseable dates fall back to parse time like absent ones
        let nav_date = get(WbrField::NavDate).and_then(parse_date).unwrap_or(now);

        Ok(WbrRow(WbrRecord {
            row,
            amc_code: text(WbrField::AmcCode).unwrap_or_default(),
            amc_name: text(WbrField::AmcName).unwrap_or_default(),
            folio_no: text(WbrField::FolioNo).unwrap_or_default(),
            investor_name,
            pan: text(WbrField::Pan).unwrap_or_default(),
            email: text(WbrField::Email),
            mobile: text(WbrField::Mobile),
            address: text(WbrField::Address),
            city: text(WbrField::City),
            state: text(WbrField::State),
            pincode: text(WbrField::Pincode),
            scheme_name,
            isin: text(WbrField::Isin),
            amfi_code: text(WbrField::AmfiCode),
            units,
            nav: number_or_zero(get(WbrField::Nav)),
            nav_date,
            current_value: number_or_zero(get(WbrField::CurrentValue)),
            cost_value: get(WbrField::CostValue).and_then(parse_number),
            dividend_option: text(WbrField::DividendOption),
            plan_type: text(WbrField::PlanType),
            broker_code: text(WbrField::BrokerCode),
        }))
    }

    fn into_parsed(self) -> ParsedRecord {
        ParsedRecord::Wbr(self.0)
    }
}

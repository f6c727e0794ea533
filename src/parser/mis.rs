use chrono::NaiveDateTime;

use super::{RegistrarRecord, number_or_zero, required_fields};
use crate::headers::{CanonicalField, ColumnMap};
use crate::models::{MisRecord, ParsedRecord, RowError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MisField {
    FundName,
    SchemeName,
    FolioNo,
    InvestorName,
    Pan,
    Mobile,
    Email,
    Units,
    Amount,
    CurrentValue,
    Isin,
    ArnNo,
    SubArn,
}

const MIS_ALIASES: &[(&str, MisField)] = &[
    ("FUND", MisField::FundName),
    ("FUND_NAME", MisField::FundName),
    ("FUND NAME", MisField::FundName),
    ("AMC", MisField::FundName),
    ("SCHEME", MisField::SchemeName),
    ("SCHEME_NAME", MisField::SchemeName),
    ("SCHEME NAME", MisField::SchemeName),
    ("FOLIO_NO", MisField::FolioNo),
    ("FOLIO NO", MisField::FolioNo),
    ("FOLIO", MisField::FolioNo),
    ("NAME", MisField::InvestorName),
    ("INVESTOR_NAME", MisField::InvestorName),
    ("INVESTOR NAME", MisField::InvestorName),
    ("PAN", MisField::Pan),
    ("PAN_NO", MisField::Pan),
    ("MOBILE_NO", MisField::Mobile),
    ("MOBILE", MisField::Mobile),
    ("EMAIL", MisField::Email),
    ("EMAIL_ID", MisField::Email),
    ("UNITS", MisField::Units),
    ("AMOUNT", MisField::Amount),
    ("COST", MisField::Amount),
    ("COST_VALUE", MisField::Amount),
    ("CURRENT_VALUE", MisField::CurrentValue),
    ("CURRENT VALUE", MisField::CurrentValue),
    ("MARKET_VALUE", MisField::CurrentValue),
    ("ISIN", MisField::Isin),
    ("ISIN_NO", MisField::Isin),
    ("ARN_NO", MisField::ArnNo),
    ("ARN", MisField::ArnNo),
    ("ARN NO", MisField::ArnNo),
    ("SUB_ARN", MisField::SubArn),
    ("SUB ARN", MisField::SubArn),
    ("SUB_BROKER", MisField::SubArn),
];

const MIS_FIELDS: &[MisField] = &[
    MisField::FundName,
    MisField::SchemeName,
    MisField::FolioNo,
    MisField::InvestorName,
    MisField::Pan,
    MisField::Mobile,
    MisField::Email,
    MisField::Units,
    MisField::Amount,
    MisField::CurrentValue,
    MisField::Isin,
    MisField::ArnNo,
    MisField::SubArn,
];

impl CanonicalField for MisField {
    fn name(&self) -> &'static str {
        match self {
            Self::FundName => "fund_name",
            Self::SchemeName => "scheme_name",
            Self::FolioNo => "folio_no",
            Self::InvestorName => "investor_name",
            Self::Pan => "pan",
            Self::Mobile => "mobile",
            Self::Email => "email",
            Self::Units => "units",
            Self::Amount => "amount",
            Self::CurrentValue => "current_value",
            Self::Isin => "isin",
            Self::ArnNo => "arn_no",
            Self::SubArn => "sub_arn",
        }
    }

    fn all() -> &'static [Self] {
        MIS_FIELDS
    }

    fn required() -> &'static [Self] {
        &[Self::InvestorName, Self::SchemeName, Self::Units]
    }

    fn builtin_aliases() -> &'static [(&'static str, Self)] {
        MIS_ALIASES
    }
}

pub struct MisRow(pub MisRecord);

impl RegistrarRecord for MisRow {
    type Field = MisField;

    fn from_row(
        row: usize,
        columns: &ColumnMap<MisField>,
        values: &[String],
        now: NaiveDateTime,
    ) -> Result<Self, RowError> {
        let get = |field: MisField| columns.value(field, values);
        let text = |field: MisField| columns.text(field, values);

        let (investor_name, scheme_name, units) = required_fields(
            row,
            get(MisField::InvestorName),
            get(MisField::SchemeName),
            get(MisField::Units),
        )?;

        Ok(MisRow(MisRecord {
            row,
            fund_name: text(MisField::FundName).unwrap_or_default(),
            scheme_name,
            folio_no: text(MisField::FolioNo).unwrap_or_default(),
            investor_name,
            pan: text(MisField::Pan).unwrap_or_default(),
            mobile: text(MisField::Mobile),
            email: text(MisField::Email),
            units,
            amount: number_or_zero(get(MisField::Amount)),
            current_value: number_or_zero(get(MisField::CurrentValue)),
            isin: text(MisField::Isin),
            arn_no: text(MisField::ArnNo),
            sub_arn: text(MisField::SubArn),
            as_of: now,
        }))
    }

    fn into_parsed(self) -> ParsedRecord {
        ParsedRecord::Mis(self.0)
    }
}

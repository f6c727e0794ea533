use anyhow::{Result, anyhow};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

use crate::models::{Holding, HoldingInput, ParsedRecord};
use crate::resolver::SchemeIdentity;
use crate::store::HoldingStore;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Returns `(absolute_gain, absolute_gain_pct)`, or `None` when the gain does
/// not fit in a `Decimal`. The percentage is 0 when nothing was invested.
pub fn derive_gain(invested: Decimal, current: Decimal) -> Option<(Decimal, Decimal)> {
    let gain = current.checked_sub(invested)?;
    let pct = if invested > Decimal::ZERO {
        gain.checked_div(invested)
            .and_then(|ratio| ratio.checked_mul(HUNDRED))
            .unwrap_or(Decimal::ZERO)
    } else {
        Decimal::ZERO
    };
    Some((gain, pct))
}

fn per_unit(value: Decimal, units: Decimal) -> Option<Decimal> {
    if value > Decimal::ZERO {
        value.checked_div(units)
    } else {
        None
    }
}

/// Cost per unit, falling back to the price printed on the row.
pub fn average_nav(record: &ParsedRecord) -> Decimal {
    per_unit(record.invested_value(), record.units())
        .or_else(|| record.reported_nav())
        .unwrap_or(Decimal::ZERO)
}

/// Reported price when the format has one, else implied by current value.
pub fn current_nav(record: &ParsedRecord) -> Decimal {
    record
        .reported_nav()
        .or_else(|| per_unit(record.current_value(), record.units()))
        .unwrap_or(Decimal::ZERO)
}

pub fn build_holding(client_id: &str, record: &ParsedRecord, scheme: SchemeIdentity) -> Result<HoldingInput> {
    let invested_value = record.invested_value();
    let current_value = record.current_value();
    let (absolute_gain, absolute_gain_pct) = derive_gain(invested_value, current_value).ok_or_else(|| {
        anyhow!(
            "Gain out of range: current value {} against invested {}",
            current_value,
            invested_value
        )
    })?;
    let folio = record.folio_no().trim();

    Ok(HoldingInput {
        client_id: client_id.to_string(),
        scheme_plan_id: scheme.plan_id,
        fund_name: scheme.fund_name,
        fund_scheme_code: scheme.scheme_code,
        fund_category: scheme.category,
        asset_class: scheme.asset_class,
        folio_number: if folio.is_empty() { "N/A".to_string() } else { folio.to_string() },
        units: record.units(),
        avg_nav: average_nav(record),
        current_nav: current_nav(record),
        invested_value,
        current_value,
        absolute_gain,
        absolute_gain_pct,
        last_txn_date: record.valued_at(),
    })
}

pub struct HoldingMaterializer {
    holdings: Arc<dyn HoldingStore>,
}

impl HoldingMaterializer {
    pub fn new(holdings: Arc<dyn HoldingStore>) -> Self {
        Self { holdings }
    }

    pub async fn materialize(
        &self,
        client_id: &str,
        record: &ParsedRecord,
        scheme: SchemeIdentity,
    ) -> Result<Holding> {
        let input = build_holding(client_id, record, scheme)?;
        let holding = self.holdings.create_holding(&input).await?;
        debug!("Row {}: holding {} written for {}", record.row(), holding.id, input.fund_name);
        Ok(holding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetClass, MisRecord, WbrRecord};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn wbr(units: Decimal, nav: Decimal, cost: Option<Decimal>, current: Decimal) -> ParsedRecord {
        ParsedRecord::Wbr(WbrRecord {
            row: 2,
            amc_code: "B".to_string(),
            amc_name: "Alpha AMC".to_string(),
            folio_no: "  ".to_string(),
            investor_name: "Asha".to_string(),
            pan: "ABCDE1234F".to_string(),
            email: None,
            mobile: None,
            address: None,
            city: None,
            state: None,
            pincode: None,
            scheme_name: "Alpha Bluechip".to_string(),
            isin: None,
            amfi_code: None,
            units,
            nav,
            nav_date: NaiveDate::from_ymd_opt(2025, 3, 31).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            current_value: current,
            cost_value: cost,
            dividend_option: None,
            plan_type: None,
            broker_code: None,
        })
    }

    fn mis(units: Decimal, amount: Decimal, current: Decimal) -> ParsedRecord {
        ParsedRecord::Mis(MisRecord {
            row: 3,
            fund_name: "Beta AMC".to_string(),
            scheme_name: "Beta Liquid".to_string(),
            folio_no: "77".to_string(),
            investor_name: "Kiran".to_string(),
            pan: String::new(),
            mobile: None,
            email: None,
            units,
            amount,
            current_value: current,
            isin: None,
            arn_no: None,
            sub_arn: None,
            as_of: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
        })
    }

    #[test]
    fn test_derive_gain() {
        let (gain, pct) = derive_gain(dec!(100000), dec!(115000)).unwrap();
        assert_eq!(gain, dec!(15000));
        assert_eq!(pct, dec!(15));
    }

    #[test]
    fn test_derive_gain_without_investment() {
        let (gain, pct) = derive_gain(dec!(0), dec!(500)).unwrap();
        assert_eq!(gain, dec!(500));
        assert_eq!(pct, dec!(0));

        let (loss, pct) = derive_gain(dec!(200), dec!(150)).unwrap();
        assert_eq!(loss, dec!(-50));
        assert_eq!(pct, dec!(-25));
    }

    #[test]
    fn test_derive_gain_out_of_range() {
        assert_eq!(derive_gain(Decimal::MIN, Decimal::MAX), None);
        assert_eq!(derive_gain(Decimal::MAX, Decimal::MIN), None);
        let (gain, pct) = derive_gain(Decimal::MAX, Decimal::MAX).unwrap();
        assert_eq!(gain, Decimal::ZERO);
        assert_eq!(pct, Decimal::ZERO);
    }

    #[test]
    fn test_build_holding_rejects_gain_overflow() {
        let record = wbr(dec!(1), dec!(1), Some(Decimal::MIN), Decimal::MAX);
        let err = build_holding("client-1", &record, SchemeIdentity::unresolved(&record)).unwrap_err();
        assert!(err.to_string().starts_with("Gain out of range"));
    }

    #[test]
    fn test_wbr_average_nav_prefers_cost() {
        assert_eq!(average_nav(&wbr(dec!(100), dec!(12), Some(dec!(1000)), dec!(1200))), dec!(10));
        assert_eq!(average_nav(&wbr(dec!(100), dec!(12), None, dec!(1200))), dec!(12));
        assert_eq!(current_nav(&wbr(dec!(100), dec!(12), None, dec!(1200))), dec!(12));
    }

    #[test]
    fn test_mis_navs_are_implied_by_values() {
        let record = mis(dec!(50), dec!(500), dec!(600));
        assert_eq!(average_nav(&record), dec!(10));
        assert_eq!(current_nav(&record), dec!(12));

        let empty = mis(dec!(50), dec!(0), dec!(0));
        assert_eq!(average_nav(&empty), dec!(0));
        assert_eq!(current_nav(&empty), dec!(0));
    }

    #[test]
    fn test_build_holding_fills_defaults() {
        let record = wbr(dec!(10), dec!(11.5), Some(dec!(100)), dec!(115));
        let holding = build_holding("client-1", &record, SchemeIdentity::unresolved(&record)).unwrap();
        assert_eq!(holding.client_id, "client-1");
        assert_eq!(holding.folio_number, "N/A");
        assert_eq!(holding.fund_name, "Alpha Bluechip");
        assert_eq!(holding.fund_scheme_code, "IMPORTED");
        assert_eq!(holding.fund_category, "Unknown");
        assert_eq!(holding.asset_class, AssetClass::Unknown);
        assert_eq!(holding.absolute_gain, dec!(15));
        assert_eq!(holding.absolute_gain_pct, dec!(15));
        assert_eq!(holding.last_txn_date, record.valued_at());
        assert_eq!(holding.scheme_plan_id, None);
    }
}

use std::collections::HashMap;

use crate::models::ParsedRecord;

/// All rows of one investor within a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordGroup {
    pub key: String,
    pub records: Vec<ParsedRecord>,
}

impl RecordGroup {
    pub fn first(&self) -> Option<&ParsedRecord> {
        self.records.first()
    }

    pub fn first_row(&self) -> usize {
        self.records.first().map(|r| r.row()).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// PAN when present, else the raw investor name. Two PAN-less investors with the
/// same name share a key and end up as one client.
pub fn group_key(record: &ParsedRecord) -> String {
    match record.pan() {
        Some(pan) => pan.to_string(),
        None => record.investor_name().to_string(),
    }
}

/// Buckets records by investor, keeping groups in first-seen order.
pub fn group_records(records: Vec<ParsedRecord>) -> Vec<RecordGroup> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<RecordGroup> = Vec::new();

    for record in records {
        let key = group_key(&record);
        match positions.get(&key) {
            Some(&idx) => groups[idx].records.push(record),
            None => {
                positions.insert(key.clone(), groups.len());
                groups.push(RecordGroup {
                    key,
                    records: vec![record],
                });
            }
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MisRecord;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn record(row: usize, name: &str, pan: &str) -> ParsedRecord {
        ParsedRecord::Mis(MisRecord {
            row,
            fund_name: String::new(),
            scheme_name: format!("Scheme {}", row),
            folio_no: String::new(),
            investor_name: name.to_string(),
            pan: pan.to_string(),
            mobile: None,
            email: None,
            units: dec!(1),
            amount: dec!(0),
            current_value: dec!(0),
            isin: None,
            arn_no: None,
            sub_arn: None,
            as_of: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
        })
    }

    #[test]
    fn test_same_pan_groups_together_in_any_order() {
        let rows = vec![
            record(2, "Asha Rao", "ABCDE1234F"),
            record(3, "Ravi Iyer", "PQRSX9876K"),
            record(4, "A. Rao", "ABCDE1234F"),
        ];
        let mut reversed = rows.clone();
        reversed.reverse();

        for input in [rows, reversed] {
            let groups = group_records(input);
            assert_eq!(groups.len(), 2);
            let asha = groups.iter().find(|g| g.key == "ABCDE1234F").unwrap();
            let mut asha_rows: Vec<usize> = asha.records.iter().map(|r| r.row()).collect();
            asha_rows.sort();
            assert_eq!(asha_rows, vec![2, 4]);
        }
    }

    #[test]
    fn test_groups_keep_first_seen_order() {
        let groups = group_records(vec![
            record(2, "Zed", "ZZZZZ0000Z"),
            record(3, "Amy", "AAAAA0000A"),
            record(4, "Zed", "ZZZZZ0000Z"),
        ]);
        let keys: Vec<&str> = groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["ZZZZZ0000Z", "AAAAA0000A"]);
        assert_eq!(groups[0].first_row(), 2);
    }

    #[test]
    fn test_name_fallback_merges_same_named_investors() {
        let groups = group_records(vec![record(2, "Priya", ""), record(3, "Priya", "")]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "Priya");
        assert_eq!(groups[0].len(), 2);
    }

    #[test]
    fn test_pan_row_and_name_row_stay_apart() {
        let groups = group_records(vec![record(2, "Priya", "ABCDE1234F"), record(3, "Priya", "")]);
        assert_eq!(groups.len(), 2);
    }
}

use indexmap::IndexMap;

use crate::{AggregatedRecord, Record};

/// Grouping key: (payer name, category, detail), compared byte for byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AggregationKey<'a> {
    pub payer_name: &'a str,
    pub category: &'a str,
    pub detail: &'a str,
}

impl<'a> AggregationKey<'a> {
    pub fn of(record: &'a Record) -> Self {
        Self {
            payer_name: &record.payer_name,
            category: &record.category,
            detail: &record.detail,
        }
    }
}

impl AggregatedRecord {
    fn first_seen(record: &Record) -> Self {
        Self {
            category: record.category.clone(),
            detail: record.detail.clone(),
            payment_amount: 0,
            withholding_tax: 0,
            payer_address: record.payer_address.clone(),
            payer_name: record.payer_name.clone(),
            payer_tel: record.payer_tel.clone(),
            count: 0,
        }
    }
}

/// Merge records with the same [`AggregationKey`], in first-seen order.
pub fn aggregate(records: &[Record]) -> Vec<AggregatedRecord> {
    let mut groups: IndexMap<AggregationKey<'_>, AggregatedRecord> = IndexMap::new();

    for record in records {
        let entry = groups
            .entry(AggregationKey::of(record))
            .or_insert_with(|| AggregatedRecord::first_seen(record));
        entry.payment_amount = entry.payment_amount.saturating_add(record.payment_amount);
        entry.withholding_tax = entry.withholding_tax.saturating_add(record.withholding_tax);
        entry.count += 1;
    }

    groups.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_all;
    use crate::RawRecord;

    fn record(payer: &str, category: &str, detail: &str, amount: i64, tax: i64) -> Record {
        Record {
            category: category.into(),
            detail: detail.into(),
            payment_amount: amount,
            withholding_tax: tax,
            payer_address: format!("{payer} address"),
            payer_name: payer.into(),
            payer_tel: "03-0000-0000".into(),
        }
    }

    fn sorted(mut v: Vec<AggregatedRecord>) -> Vec<AggregatedRecord> {
        v.sort_by(|a, b| {
            (&a.payer_name, &a.category, &a.detail).cmp(&(&b.payer_name, &b.category, &b.detail))
        });
        v
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(aggregate(&[]).is_empty());
    }

    #[test]
    fn duplicate_keys_are_summed_with_null_tax() {
        let raw: Vec<RawRecord> = serde_json::from_str(
            r#"[
                {"payer_name": "A", "category": "X", "detail": "Y", "payment_amount": 100, "withholding_tax": 10},
                {"payer_name": "A", "category": "X", "detail": "Y", "payment_amount": 200, "withholding_tax": null}
            ]"#,
        )
        .unwrap();
        let out = aggregate(&normalize_all(raw));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payment_amount, 300);
        assert_eq!(out[0].withholding_tax, 10);
        assert_eq!(out[0].count, 2);
    }

    #[test]
    fn output_is_in_first_seen_order() {
        let records = vec![
            record("B", "X", "Y", 1, 0),
            record("A", "X", "Y", 1, 0),
            record("B", "X", "Y", 1, 0),
            record("C", "X", "Y", 1, 0),
        ];
        let names: Vec<_> = aggregate(&records)
            .into_iter()
            .map(|r| r.payer_name)
            .collect();
        assert_eq!(names, vec!["B", "A", "C"]);
    }

    #[test]
    fn key_is_case_and_whitespace_sensitive() {
        let records = vec![
            record("A", "X", "Y", 1, 0),
            record("a", "X", "Y", 1, 0),
            record("A ", "X", "Y", 1, 0),
            record("A", "X", "Y ", 1, 0),
        ];
        assert_eq!(aggregate(&records).len(), 4);
    }

    #[test]
    fn contact_fields_come_from_first_occurrence() {
        let mut first = record("A", "X", "Y", 100, 10);
        first.payer_address = "Tokyo".into();
        first.payer_tel = "03-1111-1111".into();
        let mut second = record("A", "X", "Y", 50, 5);
        second.payer_address = "Osaka".into();
        second.payer_tel = "06-2222-2222".into();

        let out = aggregate(&[first, second]);
        assert_eq!(out[0].payer_address, "Tokyo");
        assert_eq!(out[0].payer_tel, "03-1111-1111");
        assert_eq!(out[0].payment_amount, 150);
    }

    #[test]
    fn counts_sum_to_input_length() {
        let records = vec![
            record("A", "X", "Y", 1, 0),
            record("A", "X", "Z", 2, 0),
            record("B", "X", "Y", 3, 0),
            record("A", "X", "Y", 4, 0),
            record("A", "X", "Z", 5, 0),
        ];
        let total: usize = aggregate(&records).iter().map(|r| r.count).sum();
        assert_eq!(total, records.len());
    }

    #[test]
    fn reordering_input_keeps_sums_and_counts() {
        let records = vec![
            record("A", "X", "Y", 100, 10),
            record("B", "X", "Y", 200, 20),
            record("A", "X", "Y", 300, 30),
            record("B", "W", "Y", 400, 40),
        ];
        let mut reversed = records.clone();
        reversed.reverse();
        assert_eq!(sorted(aggregate(&records)), sorted(aggregate(&reversed)));
    }

    #[test]
    fn reaggregating_single_count_groups_keeps_sums() {
        let records = vec![
            record("A", "X", "Y", 100, 10),
            record("B", "X", "Y", 200, 20),
        ];
        let once = aggregate(&records);
        assert!(once.iter().all(|r| r.count == 1));

        let as_records: Vec<Record> = once
            .iter()
            .map(|a| Record {
                category: a.category.clone(),
                detail: a.detail.clone(),
                payment_amount: a.payment_amount,
                withholding_tax: a.withholding_tax,
                payer_address: a.payer_address.clone(),
                payer_name: a.payer_name.clone(),
                payer_tel: a.payer_tel.clone(),
            })
            .collect();
        assert_eq!(aggregate(&as_records), once);
    }
}

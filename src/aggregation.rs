use crate::models::{AggregatedCosts, CostEntry, CostRecord};
use rust_decimal::Decimal;
use std::collections::HashMap;

pub fn aggregate(records: &[CostRecord], threshold_min: Decimal) -> AggregatedCosts {
    let mut order: Vec<&str> = Vec::new();
    let mut sums: HashMap<&str, Decimal> = HashMap::new();

    for record in records {
        let key = record.dimension_key.as_str();
        let sum = sums.entry(key).or_insert_with(|| {
            order.push(key);
            Decimal::ZERO
        });
        *sum = sum.saturating_add(record.amount);
    }

    let entries = order
        .into_iter()
        .filter_map(|key| {
            let amount = sums.remove(key)?;
            (amount >= threshold_min).then(|| CostEntry {
                key: key.to_string(),
                amount,
            })
        })
        .collect();

    AggregatedCosts::from_entries(entries)
}

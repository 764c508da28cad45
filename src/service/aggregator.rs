use crate::models::{Aggregation, Deal, LineItem, MonthBucket, MonthKey, SkippedPayment};
use std::collections::BTreeMap;

/// 按月聚合回款
///
/// 每笔日期有效的回款恰好落入一个月份桶，并按所属 deal 当前阶段
/// 计入 closed 或 open。日期无法解析的回款被跳过并记入 `skipped`。
/// `only_with_purchase_order` 为真时，未关联采购订单的回款不参与聚合。
pub fn aggregate(deals: &[Deal], only_with_purchase_order: bool) -> Aggregation {
    let mut months: BTreeMap<MonthKey, MonthBucket> = BTreeMap::new();
    let mut skipped = Vec::new();

    for deal in deals {
        for payment in &deal.payments {
            if only_with_purchase_order && !payment.has_purchase_order() {
                continue;
            }

            let Some(date) = payment.parsed_date() else {
                tracing::debug!(
                    "Deal {} payment {} has unparsable date {:?}, skipping",
                    deal.id,
                    payment.id,
                    payment.date
                );
                skipped.push(SkippedPayment {
                    deal_id: deal.id,
                    payment_id: payment.id,
                    label: payment.label.clone(),
                    date: payment.date.clone(),
                });
                continue;
            };

            let key = MonthKey::from_date(date);
            months
                .entry(key)
                .or_insert_with(|| MonthBucket::new(key))
                .push(LineItem::new(deal, payment));
        }
    }

    if !skipped.is_empty() {
        tracing::warn!("{} payments skipped due to invalid dates", skipped.len());
    }

    Aggregation {
        months: months.into_values().collect(),
        skipped,
    }
}

/// 聚合结果中出现的年份 (升序、去重)
pub fn years(months: &[MonthBucket]) -> Vec<i32> {
    let mut years: Vec<i32> = months.iter().map(|m| m.key.year()).collect();
    years.dedup();
    years
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Payment, Stage};
    use bigdecimal::{BigDecimal, Zero};

    fn payment(id: i64, date: &str, amount: i64) -> Payment {
        Payment {
            id,
            label: format!("Milestone {}", id),
            date: date.to_string(),
            amount: BigDecimal::from(amount),
            purchase_order_id: None,
        }
    }

    fn deal(id: i64, client: &str, stage: Stage, payments: Vec<Payment>) -> Deal {
        Deal {
            id,
            client: client.to_string(),
            stage,
            industry: None,
            deal_type: None,
            deal_size: None,
            probability: 50,
            next_step: None,
            decision_maker: None,
            payments,
            purchase_orders: Vec::new(),
        }
    }

    #[test]
    fn buckets_by_calendar_month_in_ascending_order() {
        let deals = vec![deal(
            1,
            "Acme",
            Stage::Proposal,
            vec![
                payment(1, "2025-03-31", 300),
                payment(2, "2025-01-01", 100),
                payment(3, "2025-03-01", 50),
            ],
        )];

        let result = aggregate(&deals, false);
        let keys: Vec<String> = result.months.iter().map(|m| m.key.to_string()).collect();
        assert_eq!(keys, vec!["2025-01", "2025-03"]);
        assert_eq!(result.months[1].open, BigDecimal::from(350));
        assert_eq!(result.months[1].items.len(), 2);
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn closed_stage_goes_to_closed_total_only() {
        let deals = vec![
            deal(1, "Acme", Stage::Closed, vec![payment(1, "2025-02-10", 700)]),
            deal(2, "Globex", Stage::Prospecting, vec![payment(2, "2025-02-11", 300)]),
        ];

        let result = aggregate(&deals, false);
        assert_eq!(result.months.len(), 1);
        let bucket = &result.months[0];
        assert_eq!(bucket.closed, BigDecimal::from(700));
        assert_eq!(bucket.open, BigDecimal::from(300));
        assert_eq!(bucket.items[0].client, "Acme");
        assert_eq!(bucket.items[1].deal_id, 2);
    }

    #[test]
    fn unparsable_dates_are_reported_not_aggregated() {
        let deals = vec![deal(
            7,
            "Initech",
            Stage::Conversation,
            vec![payment(1, "not-a-date", 999), payment(2, "2025-05-05", 10)],
        )];

        let result = aggregate(&deals, false);
        assert_eq!(result.months.len(), 1);
        assert_eq!(result.months[0].open, BigDecimal::from(10));
        assert!(result.months[0].items.iter().all(|i| i.payment_id != 1));
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].deal_id, 7);
        assert_eq!(result.skipped[0].date, "not-a-date");
    }

    #[test]
    fn deals_without_payments_contribute_nothing() {
        let deals = vec![deal(1, "Acme", Stage::Closed, Vec::new())];
        let result = aggregate(&deals, false);
        assert!(result.months.is_empty());
    }

    #[test]
    fn negative_amounts_offset_totals() {
        let deals = vec![deal(
            1,
            "Acme",
            Stage::Proposal,
            vec![payment(1, "2025-06-01", 500), payment(2, "2025-06-15", -500)],
        )];

        let result = aggregate(&deals, false);
        assert!(result.months[0].open.is_zero());
        assert_eq!(result.months[0].items.len(), 2);
    }

    #[test]
    fn purchase_order_filter_applies_during_aggregation() {
        let mut linked = payment(1, "2025-01-10", 100);
        linked.purchase_order_id = Some(42);
        let deals = vec![deal(
            1,
            "Acme",
            Stage::Proposal,
            vec![linked, payment(2, "2025-02-10", 200)],
        )];

        let result = aggregate(&deals, true);
        assert_eq!(result.months.len(), 1);
        assert_eq!(result.months[0].key.to_string(), "2025-01");
        assert_eq!(result.months[0].items[0].purchase_order_id, Some(42));
    }

    #[test]
    fn years_are_distinct_and_sorted() {
        let deals = vec![deal(
            1,
            "Acme",
            Stage::Proposal,
            vec![
                payment(1, "2026-01-01", 1),
                payment(2, "2025-11-01", 1),
                payment(3, "2025-12-01", 1),
            ],
        )];
        let result = aggregate(&deals, false);
        assert_eq!(years(&result.months), vec![2025, 2026]);
    }
}

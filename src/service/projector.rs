use crate::models::{
    ForecastConfig, ForecastDefaults, ForecastTotals, MonthBucket, Projection, ResolvedPeriod,
    ValueMode,
};

/// 在月度桶上应用筛选并计算期间合计
///
/// 1. 按 deal 类型与采购订单筛选明细，由剩余明细重算每月 closed/open
/// 2. 按期间保留月份 (闭区间)
/// 3. 按取值口径汇总
pub fn project(months: &[MonthBucket], config: &ForecastConfig) -> Projection {
    let period = config
        .period
        .resolve(&ForecastDefaults::from_months(months));
    let deal_type = config.deal_type_filter();
    let only_with_po = config.only_with_purchase_order;

    let filtered: Vec<MonthBucket> = months
        .iter()
        .map(|bucket| {
            bucket.retain_items(|item| {
                let type_matches = deal_type.map_or(true, |tag| item.deal_type.as_deref() == Some(tag));
                let po_matches = !only_with_po || item.purchase_order_id.is_some();
                type_matches && po_matches
            })
        })
        .collect();

    let months = filter_period(filtered, &period);
    let totals = totals(&months, config.value_mode);

    Projection {
        months,
        totals,
        period,
    }
}

/// 保留落在区间内的月份
pub fn filter_period(months: Vec<MonthBucket>, period: &ResolvedPeriod) -> Vec<MonthBucket> {
    months
        .into_iter()
        .filter(|bucket| period.contains(bucket.key))
        .collect()
}

/// 期间合计，等于各月同口径取值之和
pub fn totals(months: &[MonthBucket], value_mode: ValueMode) -> ForecastTotals {
    let mut totals = ForecastTotals::default();
    for bucket in months {
        let (closed, open) = bucket.values(value_mode);
        totals.closed += closed;
        totals.open += open;
    }
    totals
}

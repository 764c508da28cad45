use crate::db::queries_forecast;
use crate::error::{AppError, Result};
use crate::models::{Deal, ForecastConfig, ForecastView, MonthSummary};
use crate::service::aggregator::{aggregate, years};
use crate::service::deals::load_deals;
use crate::service::projector::project;
use chrono::{Datelike, Months, NaiveDate};
use sqlx::PgPool;

/// 聚合 + 投影
///
/// 纯函数，无内部状态，可被多个请求并发调用。
pub fn build_view(deals: &[Deal], config: &ForecastConfig) -> ForecastView {
    let aggregation = aggregate(deals, config.only_with_purchase_order);
    let projection = project(&aggregation.months, config);

    ForecastView {
        years: years(&aggregation.months),
        months: projection.months,
        totals: projection.totals,
        period: projection.period,
        skipped: aggregation.skipped,
    }
}

/// 数据库汇总的默认窗口: 两个月前的月初到十三个月后的月初
pub fn default_summary_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let month_start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap_or(today);
    let from = month_start
        .checked_sub_months(Months::new(2))
        .unwrap_or(month_start);
    let to = month_start
        .checked_add_months(Months::new(13))
        .unwrap_or(month_start);
    (from, to)
}

/// 预测服务
pub struct ForecastService {
    pool: PgPool,
}

impl ForecastService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 加载全部 deal 后计算预测视图
    pub async fn view(&self, config: &ForecastConfig) -> Result<ForecastView> {
        let deals = load_deals(&self.pool).await?;
        let view = build_view(&deals, config);
        tracing::info!(
            "Forecast view: {} deals, {} months in period, {} skipped payments",
            deals.len(),
            view.months.len(),
            view.skipped.len()
        );
        Ok(view)
    }

    /// 数据库侧按月汇总
    pub async fn month_summary(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        only_with_purchase_order: bool,
    ) -> Result<Vec<MonthSummary>> {
        if from > to {
            return Err(AppError::Validation(format!(
                "from ({}) must not be after to ({})",
                from, to
            )));
        }
        let rows =
            queries_forecast::query_month_summary(&self.pool, from, to, only_with_purchase_order)
                .await?;
        tracing::debug!("Month summary {}..{}: {} rows", from, to, rows.len());
        Ok(rows)
    }
}

use crate::error::{AppError, Result};
use crate::models::{
    parse_payment_date, Deal, ForecastConfig, ForecastView, Half, MonthKey, MonthSummary,
    PeriodFilter, ValueMode,
};
use crate::service::export::view_to_csv;
use crate::service::{build_view, default_summary_window, ForecastService};
use axum::{
    extract::{Json, Query, State},
    http::header,
    response::IntoResponse,
};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use std::sync::Arc;

/// `/forecast` 查询参数
#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(default)]
    pub only_po: bool,
}

/// `/forecast/view` 与 `/forecast/export` 查询参数
#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    pub mode: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub year: Option<i32>,
    pub half: Option<u8>,
    pub deal_type: Option<String>,
    #[serde(default)]
    pub only_po: bool,
    pub value_mode: Option<String>,
}

impl ViewQuery {
    pub fn into_config(self) -> Result<ForecastConfig> {
        let period = match self.mode.as_deref().unwrap_or("custom") {
            "custom" => PeriodFilter::Custom {
                from: parse_month(self.from.as_deref())?,
                to: parse_month(self.to.as_deref())?,
            },
            "semester" => PeriodFilter::Semester {
                year: self.year,
                half: Half::try_from(self.half.unwrap_or(1)).map_err(AppError::Validation)?,
            },
            "year" => PeriodFilter::Year { year: self.year },
            other => {
                return Err(AppError::Validation(format!(
                    "unknown mode {:?}, expected custom, semester or year",
                    other
                )))
            }
        };

        let value_mode = match self.value_mode.as_deref().unwrap_or("gross") {
            "gross" => ValueMode::Gross,
            "expected" => ValueMode::Expected,
            other => {
                return Err(AppError::Validation(format!(
                    "unknown value_mode {:?}, expected gross or expected",
                    other
                )))
            }
        };

        Ok(ForecastConfig {
            period,
            deal_type: self.deal_type,
            only_with_purchase_order: self.only_po,
            value_mode,
        })
    }
}

fn parse_month(raw: Option<&str>) -> Result<Option<MonthKey>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => raw
            .parse::<MonthKey>()
            .map(Some)
            .map_err(|e| AppError::Validation(e.to_string())),
        None => Ok(None),
    }
}

fn parse_day(raw: Option<&str>, fallback: NaiveDate) -> Result<NaiveDate> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_payment_date(raw)
            .ok_or_else(|| AppError::Validation(format!("invalid date: {}", raw))),
        None => Ok(fallback),
    }
}

/// 数据库侧按月汇总
pub async fn month_summary(
    State(service): State<Arc<ForecastService>>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<Vec<MonthSummary>>> {
    let (default_from, default_to) = default_summary_window(Local::now().date_naive());
    let from = parse_day(query.from.as_deref(), default_from)?;
    let to = parse_day(query.to.as_deref(), default_to)?;
    Ok(Json(service.month_summary(from, to, query.only_po).await?))
}

/// 基于已存储 deal 的预测视图
pub async fn forecast_view(
    State(service): State<Arc<ForecastService>>,
    Query(query): Query<ViewQuery>,
) -> Result<Json<ForecastView>> {
    let config = query.into_config()?;
    Ok(Json(service.view(&config).await?))
}

/// 预测明细 CSV 导出
pub async fn export_csv(
    State(service): State<Arc<ForecastService>>,
    Query(query): Query<ViewQuery>,
) -> Result<impl IntoResponse> {
    let config = query.into_config()?;
    let view = service.view(&config).await?;
    let body = view_to_csv(&view)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"forecast.csv\""),
        ],
        body,
    ))
}

/// 请求体: 对传入的 deal 直接计算预测 (不访问数据库)
#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub deals: Vec<Deal>,
    #[serde(default)]
    pub config: ForecastConfig,
}

pub async fn preview(Json(req): Json<PreviewRequest>) -> Json<ForecastView> {
    Json(build_view(&req.deals, &req.config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_means_custom_gross_unbounded() {
        let config = ViewQuery::default().into_config().unwrap();
        assert_eq!(config, ForecastConfig::default());
    }

    #[test]
    fn semester_query_builds_semester_filter() {
        let query = ViewQuery {
            mode: Some("semester".into()),
            year: Some(2025),
            half: Some(2),
            value_mode: Some("expected".into()),
            only_po: true,
            ..Default::default()
        };
        let config = query.into_config().unwrap();
        assert_eq!(
            config.period,
            PeriodFilter::Semester {
                year: Some(2025),
                half: Half::Second
            }
        );
        assert_eq!(config.value_mode, ValueMode::Expected);
        assert!(config.only_with_purchase_order);
    }

    #[test]
    fn rejects_bad_values() {
        let bad_half = ViewQuery {
            mode: Some("semester".into()),
            half: Some(3),
            ..Default::default()
        };
        assert!(matches!(bad_half.into_config(), Err(AppError::Validation(_))));

        let bad_month = ViewQuery {
            from: Some("2025-1".into()),
            ..Default::default()
        };
        assert!(bad_month.into_config().is_err());

        let bad_mode = ViewQuery {
            mode: Some("quarter".into()),
            ..Default::default()
        };
        assert!(bad_mode.into_config().is_err());
    }
}

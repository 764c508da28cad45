use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::deal::required_text;
use crate::error::AppError;

/// 回款节点
///
/// `date` 保留原始字符串；无法解析的日期在聚合时被跳过而不是报错。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub label: String,
    pub date: String,
    pub amount: BigDecimal,
    #[serde(default)]
    pub purchase_order_id: Option<i64>,
}

impl Payment {
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        parse_payment_date(&self.date)
    }

    pub fn has_purchase_order(&self) -> bool {
        self.purchase_order_id.is_some()
    }
}

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        Self {
            id: row.id,
            label: row.label,
            date: row.date.format("%Y-%m-%d").to_string(),
            amount: row.amount,
            purchase_order_id: row.purchase_order_id,
        }
    }
}

/// 解析回款日期
///
/// 接受 `YYYY-MM-DD`、RFC 3339 时间戳以及不带时区的 `YYYY-MM-DDTHH:MM:SS[.fff]`，
/// 时间部分直接丢弃。
pub fn parse_payment_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|ts| ts.date())
}

/// payments 表
#[derive(Debug, Clone, FromRow)]
pub struct PaymentRow {
    pub id: i64,
    pub deal_id: i64,
    pub label: String,
    pub date: NaiveDate,
    pub amount: BigDecimal,
    pub purchase_order_id: Option<i64>,
}

/// 请求体: 新增回款
#[derive(Debug, Clone, Deserialize)]
pub struct NewPayment {
    pub label: String,
    pub date: String,
    pub amount: BigDecimal,
}

impl NewPayment {
    /// 校验后返回解析好的日期
    pub fn validate(&self) -> Result<NaiveDate, AppError> {
        required_text("label", &self.label)?;
        validate_amount(&self.amount)?;
        parse_required_date(&self.date)
    }
}

/// 请求体: 部分更新回款
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentPatch {
    pub label: Option<String>,
    pub date: Option<String>,
    pub amount: Option<BigDecimal>,
}

/// 校验后的回款更新
#[derive(Debug, Clone, Default)]
pub struct PaymentChanges {
    pub label: Option<String>,
    pub date: Option<NaiveDate>,
    pub amount: Option<BigDecimal>,
}

impl PaymentPatch {
    pub fn validate(self) -> Result<PaymentChanges, AppError> {
        let label = match self.label {
            Some(label) => Some(required_text("label", &label)?),
            None => None,
        };
        let date = match self.date {
            Some(raw) => Some(parse_required_date(&raw)?),
            None => None,
        };
        if let Some(amount) = &self.amount {
            validate_amount(amount)?;
        }
        Ok(PaymentChanges {
            label,
            date,
            amount: self.amount,
        })
    }
}

fn validate_amount(amount: &BigDecimal) -> Result<(), AppError> {
    if *amount < BigDecimal::zero() {
        return Err(AppError::Validation(format!(
            "amount must not be negative, got {}",
            amount
        )));
    }
    Ok(())
}

fn parse_required_date(raw: &str) -> Result<NaiveDate, AppError> {
    parse_payment_date(raw).ok_or_else(|| AppError::Validation(format!("invalid date: {}", raw)))
}

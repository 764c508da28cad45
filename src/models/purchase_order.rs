use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

use super::deal::required_text;
use crate::error::AppError;

/// 默认账期 (天)
pub const DEFAULT_PAYMENT_TERMS: i32 = 30;

/// 票据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderKind {
    #[serde(rename = "NF")]
    Nf,
    Invoice,
}

impl PurchaseOrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseOrderKind::Nf => "NF",
            PurchaseOrderKind::Invoice => "Invoice",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown purchase order type: {0}")]
pub struct UnknownPurchaseOrderKind(pub String);

impl FromStr for PurchaseOrderKind {
    type Err = UnknownPurchaseOrderKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NF" => Ok(PurchaseOrderKind::Nf),
            "Invoice" => Ok(PurchaseOrderKind::Invoice),
            other => Err(UnknownPurchaseOrderKind(other.to_string())),
        }
    }
}

impl TryFrom<String> for PurchaseOrderKind {
    type Error = UnknownPurchaseOrderKind;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 采购订单，挂在 deal 下，可关联多笔回款
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: i64,
    pub deal_id: i64,
    pub number: String,
    #[serde(rename = "type")]
    pub kind: PurchaseOrderKind,
    pub payment_terms: i32,
    #[serde(default)]
    pub payment_ids: Vec<i64>,
}

impl PurchaseOrder {
    pub fn from_row(row: PurchaseOrderRow, payment_ids: Vec<i64>) -> Self {
        Self {
            id: row.id,
            deal_id: row.deal_id,
            number: row.number,
            kind: row.kind,
            payment_terms: row.payment_terms,
            payment_ids,
        }
    }
}

/// purchase_orders 表
#[derive(Debug, Clone, FromRow)]
pub struct PurchaseOrderRow {
    pub id: i64,
    pub deal_id: i64,
    pub number: String,
    #[sqlx(try_from = "String")]
    pub kind: PurchaseOrderKind,
    pub payment_terms: i32,
}

/// 请求体: 新建采购订单
#[derive(Debug, Clone, Deserialize)]
pub struct NewPurchaseOrder {
    pub deal_id: i64,
    pub number: String,
    #[serde(rename = "type")]
    pub kind: PurchaseOrderKind,
    #[serde(default = "default_payment_terms")]
    pub payment_terms: i32,
    #[serde(default)]
    pub payment_ids: Vec<i64>,
}

fn default_payment_terms() -> i32 {
    DEFAULT_PAYMENT_TERMS
}

impl NewPurchaseOrder {
    pub fn normalized(mut self) -> Result<Self, AppError> {
        if self.deal_id <= 0 {
            return Err(AppError::Validation("deal_id must be positive".into()));
        }
        self.number = required_text("number", &self.number)?;
        validate_terms(self.payment_terms)?;
        validate_payment_ids(&self.payment_ids)?;
        Ok(self)
    }
}

/// 请求体: 更新采购订单；`payment_ids` 存在时整体替换关联集合
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PurchaseOrderPatch {
    pub number: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<PurchaseOrderKind>,
    pub payment_terms: Option<i32>,
    pub payment_ids: Option<Vec<i64>>,
}

impl PurchaseOrderPatch {
    pub fn normalized(mut self) -> Result<Self, AppError> {
        if let Some(number) = &self.number {
            self.number = Some(required_text("number", number)?);
        }
        if let Some(terms) = self.payment_terms {
            validate_terms(terms)?;
        }
        if let Some(ids) = &self.payment_ids {
            validate_payment_ids(ids)?;
        }
        Ok(self)
    }
}

fn validate_terms(terms: i32) -> Result<(), AppError> {
    if terms < 0 {
        return Err(AppError::Validation("payment_terms must not be negative".into()));
    }
    Ok(())
}

fn validate_payment_ids(ids: &[i64]) -> Result<(), AppError> {
    if ids.iter().any(|id| *id <= 0) {
        return Err(AppError::Validation("payment_ids must be positive".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_uses_the_wire_names() {
        let po: NewPurchaseOrder =
            serde_json::from_str(r#"{"deal_id": 3, "number": " 4500012 ", "type": "NF"}"#).unwrap();
        let po = po.normalized().unwrap();
        assert_eq!(po.kind, PurchaseOrderKind::Nf);
        assert_eq!(po.number, "4500012");
        assert_eq!(po.payment_terms, DEFAULT_PAYMENT_TERMS);
        assert!(po.payment_ids.is_empty());
    }

    #[test]
    fn rejects_negative_terms() {
        let patch = PurchaseOrderPatch {
            payment_terms: Some(-5),
            ..Default::default()
        };
        assert!(patch.normalized().is_err());
    }
}

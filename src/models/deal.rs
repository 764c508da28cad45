use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use super::payment::{NewPayment, Payment};
use super::purchase_order::PurchaseOrder;
use crate::error::AppError;

/// 缺省成交概率 (%)
///
/// 新建 deal 与预览输入缺少 probability 时均按 50 处理，expected 口径下
/// 此类 open 回款计入一半金额，而不是按 0 计。
pub const DEFAULT_PROBABILITY: i32 = 50;

/// 销售阶段 (有序): Prospecting → Conversation → Proposal → Closed
///
/// 聚合时只区分 Closed 与其它阶段。旧前端使用的葡语名称在输入时仍被接受。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    #[default]
    #[serde(alias = "PROSPECCAO")]
    Prospecting,
    #[serde(alias = "CONVERSA")]
    Conversation,
    #[serde(alias = "PROPOSTA")]
    Proposal,
    #[serde(alias = "FECHADO")]
    Closed,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Prospecting,
        Stage::Conversation,
        Stage::Proposal,
        Stage::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Prospecting => "PROSPECTING",
            Stage::Conversation => "CONVERSATION",
            Stage::Proposal => "PROPOSAL",
            Stage::Closed => "CLOSED",
        }
    }

    /// 终态: 回款已确定，计入 closed
    pub fn is_closed(&self) -> bool {
        matches!(self, Stage::Closed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown stage: {0}")]
pub struct UnknownStage(pub String);

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PROSPECTING" | "PROSPECCAO" => Ok(Stage::Prospecting),
            "CONVERSATION" | "CONVERSA" => Ok(Stage::Conversation),
            "PROPOSAL" | "PROPOSTA" => Ok(Stage::Proposal),
            "CLOSED" | "FECHADO" => Ok(Stage::Closed),
            _ => Err(UnknownStage(s.to_string())),
        }
    }
}

impl TryFrom<String> for Stage {
    type Error = UnknownStage;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 规模分档
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum DealSize {
    Small,
    Mid,
    Enterprise,
}

impl DealSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealSize::Small => "SMALL",
            DealSize::Mid => "MID",
            DealSize::Enterprise => "ENTERPRISE",
        }
    }
}

impl fmt::Display for DealSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown deal size: {0}, expected SMALL, MID or ENTERPRISE")]
pub struct UnknownDealSize(pub String);

impl FromStr for DealSize {
    type Err = UnknownDealSize;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SMALL" => Ok(DealSize::Small),
            "MID" => Ok(DealSize::Mid),
            "ENTERPRISE" => Ok(DealSize::Enterprise),
            _ => Err(UnknownDealSize(s.to_string())),
        }
    }
}

impl TryFrom<String> for DealSize {
    type Error = UnknownDealSize;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 销售机会 (聚合根)，payments 与 purchase_orders 不独立存在
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub id: i64,
    pub client: String,
    #[serde(default)]
    pub stage: Stage,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub deal_type: Option<String>,
    #[serde(default)]
    pub deal_size: Option<DealSize>,
    #[serde(default = "default_probability")]
    pub probability: i32,
    #[serde(default)]
    pub next_step: Option<String>,
    #[serde(default)]
    pub decision_maker: Option<String>,
    #[serde(default)]
    pub payments: Vec<Payment>,
    #[serde(default)]
    pub purchase_orders: Vec<PurchaseOrder>,
}

fn default_probability() -> i32 {
    DEFAULT_PROBABILITY
}

impl Deal {
    pub fn from_row(row: DealRow) -> Self {
        Self {
            id: row.id,
            client: row.client,
            stage: row.stage,
            industry: row.industry,
            deal_type: row.deal_type,
            // 列上有 CHECK 约束
            deal_size: row.deal_size.as_deref().and_then(|size| size.parse().ok()),
            probability: row.probability,
            next_step: row.next_step,
            decision_maker: row.decision_maker,
            payments: Vec::new(),
            purchase_orders: Vec::new(),
        }
    }
}

/// deals 表
#[derive(Debug, Clone, FromRow)]
pub struct DealRow {
    pub id: i64,
    pub client: String,
    #[sqlx(try_from = "String")]
    pub stage: Stage,
    pub industry: Option<String>,
    pub deal_type: Option<String>,
    pub deal_size: Option<String>,
    pub probability: i32,
    pub next_step: Option<String>,
    pub decision_maker: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 请求体: 新建 deal (可附带初始 payments)
#[derive(Debug, Clone, Deserialize)]
pub struct NewDeal {
    pub client: String,
    #[serde(default)]
    pub stage: Stage,
    pub industry: Option<String>,
    pub deal_type: Option<String>,
    pub deal_size: Option<DealSize>,
    #[serde(default = "default_probability")]
    pub probability: i32,
    pub next_step: Option<String>,
    pub decision_maker: Option<String>,
    #[serde(default)]
    pub payments: Vec<NewPayment>,
}

impl NewDeal {
    /// 校验并规范化 (trim 文本字段，空串视为缺省)
    pub fn normalized(mut self) -> Result<Self, AppError> {
        self.client = required_text("client", &self.client)?;
        validate_probability(self.probability)?;
        self.industry = optional_text(self.industry);
        self.deal_type = optional_text(self.deal_type);
        self.next_step = optional_text(self.next_step);
        self.decision_maker = optional_text(self.decision_maker);
        for payment in &self.payments {
            payment.validate()?;
        }
        Ok(self)
    }
}

/// 请求体: 部分更新 deal，缺省字段保持不变
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DealPatch {
    pub client: Option<String>,
    pub stage: Option<Stage>,
    pub industry: Option<String>,
    pub deal_type: Option<String>,
    pub deal_size: Option<DealSize>,
    pub probability: Option<i32>,
    pub next_step: Option<String>,
    pub decision_maker: Option<String>,
}

impl DealPatch {
    pub fn normalized(mut self) -> Result<Self, AppError> {
        if let Some(client) = &self.client {
            self.client = Some(required_text("client", client)?);
        }
        if let Some(probability) = self.probability {
            validate_probability(probability)?;
        }
        self.industry = optional_text(self.industry);
        self.deal_type = optional_text(self.deal_type);
        self.next_step = optional_text(self.next_step);
        self.decision_maker = optional_text(self.decision_maker);
        Ok(self)
    }
}

pub(crate) fn required_text(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_probability(probability: i32) -> Result<(), AppError> {
    if !(0..=100).contains(&probability) {
        return Err(AppError::Validation(format!(
            "probability must be between 0 and 100, got {}",
            probability
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_accepts_legacy_names() {
        let stage: Stage = serde_json::from_str("\"FECHADO\"").unwrap();
        assert_eq!(stage, Stage::Closed);
        assert_eq!("proposta".parse::<Stage>().unwrap(), Stage::Proposal);
        assert_eq!(serde_json::to_string(&Stage::Conversation).unwrap(), "\"CONVERSATION\"");
    }

    #[test]
    fn stages_are_ordered_along_the_pipeline() {
        assert!(Stage::Prospecting < Stage::Conversation);
        assert!(Stage::Proposal < Stage::Closed);
        assert_eq!(Stage::ALL.iter().filter(|s| s.is_closed()).count(), 1);
    }

    #[test]
    fn new_deal_trims_and_checks_fields() {
        let deal: NewDeal = serde_json::from_str(
            r#"{"client": "  Acme  ", "industry": " ", "probability": 70}"#,
        )
        .unwrap();
        let deal = deal.normalized().unwrap();
        assert_eq!(deal.client, "Acme");
        assert_eq!(deal.industry, None);
        assert_eq!(deal.stage, Stage::Prospecting);

        let blank: NewDeal = serde_json::from_str(r#"{"client": "   "}"#).unwrap();
        assert!(matches!(blank.normalized(), Err(AppError::Validation(_))));

        let too_likely: NewDeal =
            serde_json::from_str(r#"{"client": "Acme", "probability": 101}"#).unwrap();
        assert!(too_likely.normalized().is_err());
    }

    #[test]
    fn deal_size_is_normalized_on_create_and_patch() {
        let deal: NewDeal = serde_json::from_str(
            r#"{"client": "Acme", "deal_size": " enterprise "}"#,
        )
        .unwrap();
        assert_eq!(deal.normalized().unwrap().deal_size, Some(DealSize::Enterprise));

        let patch: DealPatch = serde_json::from_str(r#"{"deal_size": "Mid"}"#).unwrap();
        assert_eq!(patch.normalized().unwrap().deal_size, Some(DealSize::Mid));

        let plain: NewDeal = serde_json::from_str(r#"{"client": "Acme"}"#).unwrap();
        assert_eq!(plain.deal_size, None);

        assert!(serde_json::from_str::<NewDeal>(r#"{"client": "Acme", "deal_size": "HUGE"}"#).is_err());
        assert_eq!(serde_json::to_string(&DealSize::Small).unwrap(), "\"SMALL\"");
        assert_eq!("small".parse::<DealSize>().unwrap().as_str(), "SMALL");
    }

    #[test]
    fn missing_probability_defaults_to_fifty() {
        let deal: Deal = serde_json::from_str(r#"{"id": 1, "client": "Acme"}"#).unwrap();
        assert_eq!(deal.probability, DEFAULT_PROBABILITY);
        assert!(deal.payments.is_empty());
    }
}

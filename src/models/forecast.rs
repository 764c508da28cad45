use bigdecimal::{BigDecimal, Zero};
use chrono::{Datelike, NaiveDate};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use super::deal::{Deal, Stage};
use super::payment::Payment;

/// 月份键 `YYYY-MM`
///
/// 排序按 (年, 月)，与零填充字符串的字典序一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) && (0..=9999).contains(&year) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    /// 截断到所在月份
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// 展示用标签，如 `Jan 2025`
    pub fn label(&self) -> String {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .map(|first| first.format("%b %Y").to_string())
            .unwrap_or_else(|| self.to_string())
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid month key {0:?}, expected YYYY-MM")]
pub struct InvalidMonthKey(pub String);

impl FromStr for MonthKey {
    type Err = InvalidMonthKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidMonthKey(s.to_string());
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        MonthKey::new(year, month).ok_or_else(invalid)
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// 月度明细行，携带渲染所需的全部来源信息 (无需回查 deal)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub deal_id: i64,
    pub client: String,
    pub deal_type: Option<String>,
    pub payment_id: i64,
    pub label: String,
    pub amount: BigDecimal,
    pub stage: Stage,
    pub date: String,
    pub probability: i32,
    pub purchase_order_id: Option<i64>,
}

impl LineItem {
    pub fn new(deal: &Deal, payment: &Payment) -> Self {
        Self {
            deal_id: deal.id,
            client: deal.client.clone(),
            deal_type: deal.deal_type.clone(),
            payment_id: payment.id,
            label: payment.label.clone(),
            amount: payment.amount.clone(),
            stage: deal.stage,
            date: payment.date.clone(),
            probability: deal.probability,
            purchase_order_id: payment.purchase_order_id,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.stage.is_closed()
    }

    /// 期望值: closed 全额计入，其它按 probability/100 折算
    pub fn expected_amount(&self) -> BigDecimal {
        if self.is_closed() {
            self.amount.clone()
        } else {
            &self.amount * BigDecimal::from(self.probability) / BigDecimal::from(100)
        }
    }
}

/// 月度汇总桶
///
/// `closed`/`open` 为原始金额，`expected_*` 为按概率折算后的金额
/// (closed 明细始终全额)。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthBucket {
    pub key: MonthKey,
    pub label: String,
    pub closed: BigDecimal,
    pub open: BigDecimal,
    #[serde(default)]
    pub expected_closed: BigDecimal,
    #[serde(default)]
    pub expected_open: BigDecimal,
    pub items: Vec<LineItem>,
}

impl MonthBucket {
    pub fn new(key: MonthKey) -> Self {
        Self {
            key,
            label: key.label(),
            closed: BigDecimal::zero(),
            open: BigDecimal::zero(),
            expected_closed: BigDecimal::zero(),
            expected_open: BigDecimal::zero(),
            items: Vec::new(),
        }
    }

    pub fn push(&mut self, item: LineItem) {
        if item.is_closed() {
            self.closed += &item.amount;
            self.expected_closed += item.expected_amount();
        } else {
            self.open += &item.amount;
            self.expected_open += item.expected_amount();
        }
        self.items.push(item);
    }

    /// 按取值口径返回本月 (closed, open)
    pub fn values(&self, value_mode: ValueMode) -> (&BigDecimal, &BigDecimal) {
        match value_mode {
            ValueMode::Gross => (&self.closed, &self.open),
            ValueMode::Expected => (&self.expected_closed, &self.expected_open),
        }
    }

    /// 按条件保留明细，并由保留的明细重新计算 closed/open
    pub fn retain_items<F>(&self, mut keep: F) -> MonthBucket
    where
        F: FnMut(&LineItem) -> bool,
    {
        let mut bucket = MonthBucket::new(self.key);
        for item in self.items.iter().filter(|item| keep(item)) {
            bucket.push(item.clone());
        }
        bucket
    }
}

/// 日期无法解析而被跳过的回款
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedPayment {
    pub deal_id: i64,
    pub payment_id: i64,
    pub label: String,
    pub date: String,
}

/// 聚合结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct Aggregation {
    pub months: Vec<MonthBucket>,
    pub skipped: Vec<SkippedPayment>,
}

/// 半年
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Half {
    First,
    Second,
}

impl Half {
    pub fn months(&self) -> (u32, u32) {
        match self {
            Half::First => (1, 6),
            Half::Second => (7, 12),
        }
    }
}

impl TryFrom<u8> for Half {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Half::First),
            2 => Ok(Half::Second),
            other => Err(format!("half must be 1 or 2, got {}", other)),
        }
    }
}

impl From<Half> for u8 {
    fn from(half: Half) -> u8 {
        match half {
            Half::First => 1,
            Half::Second => 2,
        }
    }
}

/// 期间筛选
///
/// 缺省的边界/年份由数据本身推导，见 [`ForecastDefaults`]。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum PeriodFilter {
    Custom {
        #[serde(default)]
        from: Option<MonthKey>,
        #[serde(default)]
        to: Option<MonthKey>,
    },
    Semester {
        #[serde(default)]
        year: Option<i32>,
        half: Half,
    },
    Year {
        #[serde(default)]
        year: Option<i32>,
    },
}

impl Default for PeriodFilter {
    fn default() -> Self {
        PeriodFilter::Custom { from: None, to: None }
    }
}

impl PeriodFilter {
    pub fn resolve(&self, defaults: &ForecastDefaults) -> ResolvedPeriod {
        match self {
            PeriodFilter::Custom { from, to } => ResolvedPeriod {
                from: from.or(defaults.from),
                to: to.or(defaults.to),
            },
            PeriodFilter::Semester { year, half } => {
                let (first, last) = half.months();
                ResolvedPeriod::within_year(year.or(defaults.year), first, last)
            }
            PeriodFilter::Year { year } => {
                ResolvedPeriod::within_year(year.or(defaults.year), 1, 12)
            }
        }
    }
}

/// 解析后的闭区间，缺省边界表示不限
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPeriod {
    pub from: Option<MonthKey>,
    pub to: Option<MonthKey>,
}

impl ResolvedPeriod {
    fn within_year(year: Option<i32>, first: u32, last: u32) -> Self {
        match year {
            Some(year) => Self {
                from: MonthKey::new(year, first),
                to: MonthKey::new(year, last),
            },
            None => Self::default(),
        }
    }

    pub fn contains(&self, key: MonthKey) -> bool {
        self.from.map_or(true, |from| key >= from) && self.to.map_or(true, |to| key <= to)
    }
}

/// 取值口径
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueMode {
    #[default]
    Gross,
    Expected,
}

/// 预测视图配置，由展示层每次变更时整体传入
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    #[serde(default)]
    pub period: PeriodFilter,
    /// `None` 或 `"ALL"` 表示不过滤
    #[serde(default)]
    pub deal_type: Option<String>,
    #[serde(default)]
    pub only_with_purchase_order: bool,
    #[serde(default)]
    pub value_mode: ValueMode,
}

impl ForecastConfig {
    pub fn deal_type_filter(&self) -> Option<&str> {
        self.deal_type
            .as_deref()
            .map(str::trim)
            .filter(|tag| !tag.is_empty() && !tag.eq_ignore_ascii_case("all"))
    }
}

/// 由聚合结果推导的默认值: 最早到最晚月份、最早年份
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForecastDefaults {
    pub from: Option<MonthKey>,
    pub to: Option<MonthKey>,
    pub year: Option<i32>,
}

impl ForecastDefaults {
    /// `months` 需按月份升序
    pub fn from_months(months: &[MonthBucket]) -> Self {
        let from = months.first().map(|m| m.key);
        Self {
            from,
            to: months.last().map(|m| m.key),
            year: from.map(|key| key.year()),
        }
    }
}

/// 期间合计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastTotals {
    pub closed: BigDecimal,
    pub open: BigDecimal,
}

impl Default for ForecastTotals {
    fn default() -> Self {
        Self {
            closed: BigDecimal::zero(),
            open: BigDecimal::zero(),
        }
    }
}

/// 过滤投影结果
#[derive(Debug, Clone, Serialize)]
pub struct Projection {
    pub months: Vec<MonthBucket>,
    pub totals: ForecastTotals,
    pub period: ResolvedPeriod,
}

/// 完整预测视图 (聚合 + 投影)
#[derive(Debug, Clone, Serialize)]
pub struct ForecastView {
    pub months: Vec<MonthBucket>,
    pub totals: ForecastTotals,
    pub period: ResolvedPeriod,
    pub years: Vec<i32>,
    pub skipped: Vec<SkippedPayment>,
}

/// SQL 按月汇总行
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MonthSummary {
    pub key: String,
    pub closed: BigDecimal,
    pub open: BigDecimal,
}

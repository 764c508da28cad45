pub mod deal;
pub mod forecast;
pub mod payment;
pub mod purchase_order;

pub use deal::{Deal, DealPatch, DealRow, DealSize, NewDeal, Stage, DEFAULT_PROBABILITY};
pub use forecast::{
    Aggregation, ForecastConfig, ForecastDefaults, ForecastTotals, ForecastView, Half,
    LineItem, MonthBucket, MonthKey, MonthSummary, PeriodFilter, Projection, ResolvedPeriod,
    SkippedPayment, ValueMode,
};
pub use payment::{parse_payment_date, NewPayment, Payment, PaymentChanges, PaymentPatch, PaymentRow};
pub use purchase_order::{
    NewPurchaseOrder, PurchaseOrder, PurchaseOrderKind, PurchaseOrderPatch, PurchaseOrderRow,
};

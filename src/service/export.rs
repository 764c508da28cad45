use crate::error::{AppError, Result};
use crate::models::ForecastView;
use csv::Writer;

const HEADER: [&str; 11] = [
    "month",
    "deal_id",
    "client",
    "deal_type",
    "label",
    "date",
    "stage",
    "probability",
    "amount",
    "expected_amount",
    "purchase_order_id",
];

/// 将预测视图的明细导出为 CSV (每行一笔回款)
pub fn view_to_csv(view: &ForecastView) -> Result<Vec<u8>> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(HEADER)?;

    for bucket in &view.months {
        let month = bucket.key.to_string();
        for item in &bucket.items {
            writer.write_record([
                month.clone(),
                item.deal_id.to_string(),
                item.client.clone(),
                item.deal_type.clone().unwrap_or_default(),
                item.label.clone(),
                item.date.clone(),
                item.stage.to_string(),
                item.probability.to_string(),
                item.amount.to_string(),
                item.expected_amount().to_string(),
                item.purchase_order_id.map(|id| id.to_string()).unwrap_or_default(),
            ])?;
        }
    }

    writer
        .into_inner()
        .map_err(|e| AppError::Csv(e.into_error().into()))
}

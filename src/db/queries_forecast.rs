use crate::models::{MonthSummary, Stage};
use chrono::NaiveDate;
use sqlx::PgPool;

/// 按月汇总回款 (数据库侧聚合)
/// closed: 终态 deal 的回款；open: 其余阶段
pub async fn query_month_summary(
    pool: &PgPool,
    from: NaiveDate,
    to: NaiveDate,
    only_with_purchase_order: bool,
) -> Result<Vec<MonthSummary>, sqlx::Error> {
    sqlx::query_as::<_, MonthSummary>(
        r#"
        SELECT
            to_char(date_trunc('month', p.date), 'YYYY-MM') AS key,
            COALESCE(SUM(CASE WHEN d.stage = $4 THEN p.amount ELSE 0 END), 0) AS closed,
            COALESCE(SUM(CASE WHEN d.stage <> $4 THEN p.amount ELSE 0 END), 0) AS open
        FROM payments p
        INNER JOIN deals d ON d.id = p.deal_id
        WHERE p.date BETWEEN $1 AND $2
          AND (NOT $3 OR p.purchase_order_id IS NOT NULL)
        GROUP BY 1
        ORDER BY 1
        "#,
    )
    .bind(from)
    .bind(to)
    .bind(only_with_purchase_order)
    .bind(Stage::Closed.as_str())
    .fetch_all(pool)
    .await
}

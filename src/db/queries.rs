use crate::models::{
    DealPatch, DealRow, NewDeal, NewPurchaseOrder, PaymentChanges, PaymentRow, PurchaseOrderPatch,
    PurchaseOrderRow,
};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use sqlx::{PgConnection, PgPool};

const DEAL_COLUMNS: &str = "id, client, stage, industry, deal_type, deal_size, probability, next_step, decision_maker, created_at";

/// 查询全部 deal (最新优先)
pub async fn list_deals(pool: &PgPool) -> Result<Vec<DealRow>, sqlx::Error> {
    sqlx::query_as::<_, DealRow>(&format!(
        "SELECT {} FROM deals ORDER BY created_at DESC, id DESC",
        DEAL_COLUMNS
    ))
    .fetch_all(pool)
    .await
}

/// 查询单个 deal
pub async fn get_deal(pool: &PgPool, deal_id: i64) -> Result<Option<DealRow>, sqlx::Error> {
    sqlx::query_as::<_, DealRow>(&format!("SELECT {} FROM deals WHERE id = $1", DEAL_COLUMNS))
        .bind(deal_id)
        .fetch_optional(pool)
        .await
}

/// 查询全部回款 (按 deal、日期排序)
pub async fn list_payments(pool: &PgPool) -> Result<Vec<PaymentRow>, sqlx::Error> {
    sqlx::query_as::<_, PaymentRow>(
        r#"
        SELECT id, deal_id, label, date, amount, purchase_order_id
        FROM payments
        ORDER BY deal_id, date, id
        "#,
    )
    .fetch_all(pool)
    .await
}

/// 查询某个 deal 的回款
pub async fn list_payments_for_deal(
    pool: &PgPool,
    deal_id: i64,
) -> Result<Vec<PaymentRow>, sqlx::Error> {
    sqlx::query_as::<_, PaymentRow>(
        r#"
        SELECT id, deal_id, label, date, amount, purchase_order_id
        FROM payments
        WHERE deal_id = $1
        ORDER BY date, id
        "#,
    )
    .bind(deal_id)
    .fetch_all(pool)
    .await
}

/// 查询全部采购订单
pub async fn list_purchase_orders(pool: &PgPool) -> Result<Vec<PurchaseOrderRow>, sqlx::Error> {
    sqlx::query_as::<_, PurchaseOrderRow>(
        r#"
        SELECT id, deal_id, number, kind, payment_terms
        FROM purchase_orders
        ORDER BY deal_id, id
        "#,
    )
    .fetch_all(pool)
    .await
}

/// 查询某个 deal 的采购订单
pub async fn list_purchase_orders_for_deal(
    pool: &PgPool,
    deal_id: i64,
) -> Result<Vec<PurchaseOrderRow>, sqlx::Error> {
    sqlx::query_as::<_, PurchaseOrderRow>(
        r#"
        SELECT id, deal_id, number, kind, payment_terms
        FROM purchase_orders
        WHERE deal_id = $1
        ORDER BY id
        "#,
    )
    .bind(deal_id)
    .fetch_all(pool)
    .await
}

/// 插入 deal
pub async fn insert_deal(conn: &mut PgConnection, deal: &NewDeal) -> Result<DealRow, sqlx::Error> {
    sqlx::query_as::<_, DealRow>(&format!(
        r#"
        INSERT INTO deals (client, stage, industry, deal_type, probability, next_step, decision_maker, deal_size)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {}
        "#,
        DEAL_COLUMNS
    ))
    .bind(&deal.client)
    .bind(deal.stage.as_str())
    .bind(&deal.industry)
    .bind(&deal.deal_type)
    .bind(deal.probability)
    .bind(&deal.next_step)
    .bind(&deal.decision_maker)
    .bind(deal.deal_size.map(|size| size.as_str()))
    .fetch_one(&mut *conn)
    .await
}

/// 部分更新 deal，缺省字段保持原值
pub async fn update_deal(
    pool: &PgPool,
    deal_id: i64,
    patch: &DealPatch,
) -> Result<Option<DealRow>, sqlx::Error> {
    sqlx::query_as::<_, DealRow>(&format!(
        r#"
        UPDATE deals SET
            client = COALESCE($2, client),
            stage = COALESCE($3, stage),
            industry = COALESCE($4, industry),
            deal_type = COALESCE($5, deal_type),
            probability = COALESCE($6, probability),
            next_step = COALESCE($7, next_step),
            decision_maker = COALESCE($8, decision_maker),
            deal_size = COALESCE($9, deal_size)
        WHERE id = $1
        RETURNING {}
        "#,
        DEAL_COLUMNS
    ))
    .bind(deal_id)
    .bind(&patch.client)
    .bind(patch.stage.map(|s| s.as_str()))
    .bind(&patch.industry)
    .bind(&patch.deal_type)
    .bind(patch.probability)
    .bind(&patch.next_step)
    .bind(&patch.decision_maker)
    .bind(patch.deal_size.map(|size| size.as_str()))
    .fetch_optional(pool)
    .await
}

/// 删除 deal (回款与采购订单级联删除)，返回删除行数
pub async fn delete_deal(pool: &PgPool, deal_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM deals WHERE id = $1")
        .bind(deal_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// 插入回款
pub async fn insert_payment(
    conn: &mut PgConnection,
    deal_id: i64,
    label: &str,
    date: NaiveDate,
    amount: &BigDecimal,
) -> Result<PaymentRow, sqlx::Error> {
    sqlx::query_as::<_, PaymentRow>(
        r#"
        INSERT INTO payments (deal_id, label, date, amount)
        VALUES ($1, $2, $3, $4)
        RETURNING id, deal_id, label, date, amount, purchase_order_id
        "#,
    )
    .bind(deal_id)
    .bind(label)
    .bind(date)
    .bind(amount)
    .fetch_one(&mut *conn)
    .await
}

/// 部分更新回款
pub async fn update_payment(
    pool: &PgPool,
    payment_id: i64,
    changes: &PaymentChanges,
) -> Result<Option<PaymentRow>, sqlx::Error> {
    sqlx::query_as::<_, PaymentRow>(
        r#"
        UPDATE payments SET
            label = COALESCE($2, label),
            date = COALESCE($3, date),
            amount = COALESCE($4, amount)
        WHERE id = $1
        RETURNING id, deal_id, label, date, amount, purchase_order_id
        "#,
    )
    .bind(payment_id)
    .bind(&changes.label)
    .bind(changes.date)
    .bind(&changes.amount)
    .fetch_optional(pool)
    .await
}

/// 删除回款，返回删除行数
pub async fn delete_payment(pool: &PgPool, payment_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM payments WHERE id = $1")
        .bind(payment_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// 删除某个 deal 的全部回款
pub async fn delete_payments_for_deal(
    conn: &mut PgConnection,
    deal_id: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM payments WHERE deal_id = $1")
        .bind(deal_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// 插入采购订单
pub async fn insert_purchase_order(
    conn: &mut PgConnection,
    po: &NewPurchaseOrder,
) -> Result<PurchaseOrderRow, sqlx::Error> {
    sqlx::query_as::<_, PurchaseOrderRow>(
        r#"
        INSERT INTO purchase_orders (deal_id, number, kind, payment_terms)
        VALUES ($1, $2, $3, $4)
        RETURNING id, deal_id, number, kind, payment_terms
        "#,
    )
    .bind(po.deal_id)
    .bind(&po.number)
    .bind(po.kind.as_str())
    .bind(po.payment_terms)
    .fetch_one(&mut *conn)
    .await
}

/// 更新采购订单字段 (不含关联回款)
pub async fn update_purchase_order(
    conn: &mut PgConnection,
    po_id: i64,
    patch: &PurchaseOrderPatch,
) -> Result<Option<PurchaseOrderRow>, sqlx::Error> {
    sqlx::query_as::<_, PurchaseOrderRow>(
        r#"
        UPDATE purchase_orders SET
            number = COALESCE($2, number),
            kind = COALESCE($3, kind),
            payment_terms = COALESCE($4, payment_terms)
        WHERE id = $1
        RETURNING id, deal_id, number, kind, payment_terms
        "#,
    )
    .bind(po_id)
    .bind(&patch.number)
    .bind(patch.kind.map(|k| k.as_str()))
    .bind(patch.payment_terms)
    .fetch_optional(&mut *conn)
    .await
}

/// 删除采购订单 (关联回款置空，不删除)
pub async fn delete_purchase_order(pool: &PgPool, po_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM purchase_orders WHERE id = $1")
        .bind(po_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// 将同一 deal 下的回款关联到采购订单，返回更新行数
pub async fn link_payments(
    conn: &mut PgConnection,
    po_id: i64,
    deal_id: i64,
    payment_ids: &[i64],
) -> Result<u64, sqlx::Error> {
    if payment_ids.is_empty() {
        return Ok(0);
    }
    let result = sqlx::query(
        r#"
        UPDATE payments SET purchase_order_id = $1
        WHERE id = ANY($2) AND deal_id = $3
        "#,
    )
    .bind(po_id)
    .bind(payment_ids)
    .bind(deal_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// 回款当前关联的采购订单，仅限属于该 deal 的回款
pub async fn list_payment_links(
    conn: &mut PgConnection,
    deal_id: i64,
    payment_ids: &[i64],
) -> Result<Vec<(i64, Option<i64>)>, sqlx::Error> {
    sqlx::query_as::<_, (i64, Option<i64>)>(
        "SELECT id, purchase_order_id FROM payments WHERE id = ANY($1) AND deal_id = $2 ORDER BY id",
    )
    .bind(payment_ids)
    .bind(deal_id)
    .fetch_all(&mut *conn)
    .await
}

/// 解除采购订单的全部回款关联
pub async fn unlink_payments(conn: &mut PgConnection, po_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE payments SET purchase_order_id = NULL WHERE purchase_order_id = $1")
        .bind(po_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// 采购订单关联的回款 ID
pub async fn list_payment_ids_for_purchase_order(
    conn: &mut PgConnection,
    po_id: i64,
) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT id FROM payments WHERE purchase_order_id = $1 ORDER BY date, id",
    )
    .bind(po_id)
    .fetch_all(&mut *conn)
    .await
}

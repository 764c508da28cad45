use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::{
    Deal, DealPatch, DealRow, NewDeal, NewPayment, NewPurchaseOrder, Payment, PaymentPatch,
    PaymentRow, PurchaseOrder, PurchaseOrderPatch, PurchaseOrderRow,
};
use indexmap::IndexMap;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;

/// Deal / 回款 / 采购订单的增删改查
pub struct DealService {
    pool: PgPool,
}

impl DealService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 查询全部 deal，附带回款与采购订单
    pub async fn list_deals(&self) -> Result<Vec<Deal>> {
        load_deals(&self.pool).await
    }

    pub async fn get_deal(&self, deal_id: i64) -> Result<Deal> {
        let row = queries::get_deal(&self.pool, deal_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Deal {}", deal_id)))?;
        self.hydrate(row).await
    }

    /// 新建 deal，初始回款在同一事务中写入
    pub async fn create_deal(&self, deal: NewDeal) -> Result<Deal> {
        let deal = deal.normalized()?;
        let mut dates = Vec::with_capacity(deal.payments.len());
        for payment in &deal.payments {
            dates.push(payment.validate()?);
        }

        let mut tx = self.pool.begin().await?;
        let row = queries::insert_deal(&mut tx, &deal).await?;
        for (payment, date) in deal.payments.iter().zip(dates) {
            queries::insert_payment(&mut tx, row.id, payment.label.trim(), date, &payment.amount)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(
            "Deal {} created for client {} with {} payments",
            row.id,
            row.client,
            deal.payments.len()
        );
        self.hydrate(row).await
    }

    pub async fn update_deal(&self, deal_id: i64, patch: DealPatch) -> Result<Deal> {
        let patch = patch.normalized()?;
        let row = queries::update_deal(&self.pool, deal_id, &patch)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Deal {}", deal_id)))?;
        if let Some(stage) = patch.stage {
            tracing::info!("Deal {} moved to {}", deal_id, stage);
        }
        self.hydrate(row).await
    }

    pub async fn delete_deal(&self, deal_id: i64) -> Result<()> {
        if queries::delete_deal(&self.pool, deal_id).await? == 0 {
            return Err(AppError::NotFound(format!("Deal {}", deal_id)));
        }
        tracing::info!("Deal {} deleted", deal_id);
        Ok(())
    }

    pub async fn add_payment(&self, deal_id: i64, payment: NewPayment) -> Result<Payment> {
        let date = payment.validate()?;
        self.ensure_deal_exists(deal_id).await?;

        let mut conn = self.pool.acquire().await?;
        let row = queries::insert_payment(&mut conn, deal_id, payment.label.trim(), date, &payment.amount)
            .await?;
        Ok(row.into())
    }

    pub async fn update_payment(&self, payment_id: i64, patch: PaymentPatch) -> Result<Payment> {
        let changes = patch.validate()?;
        let row = queries::update_payment(&self.pool, payment_id, &changes)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment {}", payment_id)))?;
        Ok(row.into())
    }

    pub async fn delete_payment(&self, payment_id: i64) -> Result<()> {
        if queries::delete_payment(&self.pool, payment_id).await? == 0 {
            return Err(AppError::NotFound(format!("Payment {}", payment_id)));
        }
        Ok(())
    }

    /// 原子替换某个 deal 的全部回款
    pub async fn replace_payments(&self, deal_id: i64, payments: Vec<NewPayment>) -> Result<()> {
        let mut dates = Vec::with_capacity(payments.len());
        for payment in &payments {
            dates.push(payment.validate()?);
        }
        self.ensure_deal_exists(deal_id).await?;

        let mut tx = self.pool.begin().await?;
        let removed = queries::delete_payments_for_deal(&mut tx, deal_id).await?;
        for (payment, date) in payments.iter().zip(dates) {
            queries::insert_payment(&mut tx, deal_id, payment.label.trim(), date, &payment.amount)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(
            "Deal {} payments replaced: {} removed, {} inserted",
            deal_id,
            removed,
            payments.len()
        );
        Ok(())
    }

    pub async fn create_purchase_order(&self, po: NewPurchaseOrder) -> Result<PurchaseOrder> {
        let po = po.normalized()?;
        self.ensure_deal_exists(po.deal_id).await?;

        let mut tx = self.pool.begin().await?;
        let row = queries::insert_purchase_order(&mut tx, &po).await?;
        link_exactly(&mut tx, row.id, row.deal_id, &po.payment_ids).await?;
        let payment_ids = queries::list_payment_ids_for_purchase_order(&mut tx, row.id).await?;
        tx.commit().await?;

        tracing::info!("Purchase order {} ({}) created for deal {}", row.id, row.number, row.deal_id);
        Ok(PurchaseOrder::from_row(row, payment_ids))
    }

    /// 更新采购订单；给出 payment_ids 时整体替换关联
    pub async fn update_purchase_order(
        &self,
        po_id: i64,
        patch: PurchaseOrderPatch,
    ) -> Result<PurchaseOrder> {
        let patch = patch.normalized()?;

        let mut tx = self.pool.begin().await?;
        let row = queries::update_purchase_order(&mut tx, po_id, &patch)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Purchase order {}", po_id)))?;
        if let Some(ids) = &patch.payment_ids {
            queries::unlink_payments(&mut tx, po_id).await?;
            link_exactly(&mut tx, po_id, row.deal_id, ids).await?;
        }
        let payment_ids = queries::list_payment_ids_for_purchase_order(&mut tx, po_id).await?;
        tx.commit().await?;

        Ok(PurchaseOrder::from_row(row, payment_ids))
    }

    pub async fn delete_purchase_order(&self, po_id: i64) -> Result<()> {
        if queries::delete_purchase_order(&self.pool, po_id).await? == 0 {
            return Err(AppError::NotFound(format!("Purchase order {}", po_id)));
        }
        Ok(())
    }

    async fn ensure_deal_exists(&self, deal_id: i64) -> Result<()> {
        match queries::get_deal(&self.pool, deal_id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::NotFound(format!("Deal {}", deal_id))),
        }
    }

    async fn hydrate(&self, row: DealRow) -> Result<Deal> {
        let (payments, purchase_orders) = futures::try_join!(
            queries::list_payments_for_deal(&self.pool, row.id),
            queries::list_purchase_orders_for_deal(&self.pool, row.id),
        )?;
        let deal_id = row.id;
        assemble_deals(vec![row], payments, purchase_orders)
            .pop()
            .ok_or_else(|| AppError::NotFound(format!("Deal {}", deal_id)))
    }
}

/// 一次性加载全部 deal (三条查询并发执行)
pub async fn load_deals(pool: &PgPool) -> Result<Vec<Deal>> {
    let (deals, payments, purchase_orders) = futures::try_join!(
        queries::list_deals(pool),
        queries::list_payments(pool),
        queries::list_purchase_orders(pool),
    )?;
    Ok(assemble_deals(deals, payments, purchase_orders))
}

/// 将行数据组装为聚合根，保持 deal 的查询顺序
///
/// 找不到所属 deal 的回款/采购订单被丢弃。
pub fn assemble_deals(
    deals: Vec<DealRow>,
    payments: Vec<PaymentRow>,
    purchase_orders: Vec<PurchaseOrderRow>,
) -> Vec<Deal> {
    let mut by_id: IndexMap<i64, Deal> = deals
        .into_iter()
        .map(|row| (row.id, Deal::from_row(row)))
        .collect();

    let mut po_payments: HashMap<i64, Vec<i64>> = HashMap::new();
    for row in payments {
        if let Some(po_id) = row.purchase_order_id {
            po_payments.entry(po_id).or_default().push(row.id);
        }
        if let Some(deal) = by_id.get_mut(&row.deal_id) {
            deal.payments.push(row.into());
        }
    }

    for row in purchase_orders {
        let payment_ids = po_payments.remove(&row.id).unwrap_or_default();
        if let Some(deal) = by_id.get_mut(&row.deal_id) {
            deal.purchase_orders.push(PurchaseOrder::from_row(row, payment_ids));
        }
    }

    by_id.into_values().collect()
}

/// 关联回款，任何一笔不属于该 deal 时整体失败
///
/// 已挂在同一 deal 其它采购订单下的回款会被改挂，每笔记一条 info 日志。
async fn link_exactly(
    conn: &mut PgConnection,
    po_id: i64,
    deal_id: i64,
    payment_ids: &[i64],
) -> Result<()> {
    let mut unique = payment_ids.to_vec();
    unique.sort_unstable();
    unique.dedup();
    if unique.is_empty() {
        return Ok(());
    }

    let links = queries::list_payment_links(conn, deal_id, &unique).await?;
    for (payment_id, previous) in reassigned_payments(&links, po_id) {
        tracing::info!(
            "Payment {} of deal {} moved from purchase order {} to {}",
            payment_id,
            deal_id,
            previous,
            po_id
        );
    }

    let linked = queries::link_payments(conn, po_id, deal_id, &unique).await?;
    if linked != unique.len() as u64 {
        return Err(AppError::Validation(format!(
            "payments {:?} do not all belong to deal {}",
            unique, deal_id
        )));
    }
    Ok(())
}

/// 当前挂在其它采购订单下的回款: (payment_id, 原采购订单)
fn reassigned_payments(links: &[(i64, Option<i64>)], po_id: i64) -> Vec<(i64, i64)> {
    links
        .iter()
        .filter_map(|&(payment_id, current)| match current {
            Some(previous) if previous != po_id => Some((payment_id, previous)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PurchaseOrderKind, Stage};
    use bigdecimal::BigDecimal;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn deal_row(id: i64, client: &str) -> DealRow {
        DealRow {
            id,
            client: client.to_string(),
            stage: Stage::Proposal,
            industry: None,
            deal_type: Some("SAAS".into()),
            deal_size: None,
            probability: 60,
            next_step: None,
            decision_maker: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn payment_row(id: i64, deal_id: i64, po: Option<i64>) -> PaymentRow {
        PaymentRow {
            id,
            deal_id,
            label: "Entrada".into(),
            date: NaiveDate::from_ymd_opt(2025, 2, 3).unwrap(),
            amount: BigDecimal::from(100),
            purchase_order_id: po,
        }
    }

    #[test]
    fn assembles_payments_and_purchase_orders_under_their_deal() {
        let deals = vec![deal_row(2, "Globex"), deal_row(1, "Acme")];
        let payments = vec![
            payment_row(10, 1, Some(5)),
            payment_row(11, 1, None),
            payment_row(12, 2, None),
            payment_row(13, 99, None),
        ];
        let pos = vec![PurchaseOrderRow {
            id: 5,
            deal_id: 1,
            number: "PO-5".into(),
            kind: PurchaseOrderKind::Invoice,
            payment_terms: 30,
        }];

        let assembled = assemble_deals(deals, payments, pos);
        assert_eq!(assembled.iter().map(|d| d.id).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(assembled[0].payments.len(), 1);
        assert_eq!(assembled[1].payments.len(), 2);
        assert_eq!(assembled[1].payments[0].date, "2025-02-03");
        assert_eq!(assembled[1].purchase_orders[0].payment_ids, vec![10]);
        assert!(assembled[0].purchase_orders.is_empty());
    }

    #[test]
    fn only_payments_held_by_another_order_count_as_reassigned() {
        let links = vec![(10, None), (11, Some(5)), (12, Some(7)), (13, Some(8))];
        assert_eq!(reassigned_payments(&links, 5), vec![(12, 7), (13, 8)]);
        assert!(reassigned_payments(&[(10, None), (11, Some(5))], 5).is_empty());
    }
}

use crate::error::{AppError, Result};
use crate::models::{
    Deal, DealPatch, NewDeal, NewPayment, NewPurchaseOrder, Payment, PaymentPatch, PurchaseOrder,
    PurchaseOrderPatch,
};
use crate::service::DealService;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use serde::Serialize;
use std::sync::Arc;

/// 健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// 健康检查
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// 路径参数中的 ID，非整数返回 400
pub(crate) fn parse_id(raw: &str) -> Result<i64> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::Validation("Invalid id".to_string()))
}

pub async fn list_deals(State(service): State<Arc<DealService>>) -> Result<Json<Vec<Deal>>> {
    Ok(Json(service.list_deals().await?))
}

pub async fn get_deal(
    State(service): State<Arc<DealService>>,
    Path(id): Path<String>,
) -> Result<Json<Deal>> {
    let id = parse_id(&id)?;
    Ok(Json(service.get_deal(id).await?))
}

pub async fn create_deal(
    State(service): State<Arc<DealService>>,
    Json(req): Json<NewDeal>,
) -> Result<(StatusCode, Json<Deal>)> {
    let deal = service.create_deal(req).await?;
    Ok((StatusCode::CREATED, Json(deal)))
}

pub async fn update_deal(
    State(service): State<Arc<DealService>>,
    Path(id): Path<String>,
    Json(req): Json<DealPatch>,
) -> Result<Json<Deal>> {
    let id = parse_id(&id)?;
    Ok(Json(service.update_deal(id, req).await?))
}

pub async fn delete_deal(
    State(service): State<Arc<DealService>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let id = parse_id(&id)?;
    service.delete_deal(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_payment(
    State(service): State<Arc<DealService>>,
    Path(deal_id): Path<String>,
    Json(req): Json<NewPayment>,
) -> Result<(StatusCode, Json<Payment>)> {
    let deal_id = parse_id(&deal_id)?;
    let payment = service.add_payment(deal_id, req).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// 整体替换回款 (事务内先删后插)
pub async fn replace_payments(
    State(service): State<Arc<DealService>>,
    Path(deal_id): Path<String>,
    Json(req): Json<Vec<NewPayment>>,
) -> Result<StatusCode> {
    let deal_id = parse_id(&deal_id)?;
    service.replace_payments(deal_id, req).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_payment(
    State(service): State<Arc<DealService>>,
    Path(id): Path<String>,
    Json(req): Json<PaymentPatch>,
) -> Result<Json<Payment>> {
    let id = parse_id(&id)?;
    Ok(Json(service.update_payment(id, req).await?))
}

pub async fn delete_payment(
    State(service): State<Arc<DealService>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let id = parse_id(&id)?;
    service.delete_payment(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_purchase_order(
    State(service): State<Arc<DealService>>,
    Json(req): Json<NewPurchaseOrder>,
) -> Result<(StatusCode, Json<PurchaseOrder>)> {
    let po = service.create_purchase_order(req).await?;
    Ok((StatusCode::CREATED, Json(po)))
}

pub async fn update_purchase_order(
    State(service): State<Arc<DealService>>,
    Path(id): Path<String>,
    Json(req): Json<PurchaseOrderPatch>,
) -> Result<Json<PurchaseOrder>> {
    let id = parse_id(&id)?;
    Ok(Json(service.update_purchase_order(id, req).await?))
}

pub async fn delete_purchase_order(
    State(service): State<Arc<DealService>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let id = parse_id(&id)?;
    service.delete_purchase_order(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub mod forecast;
pub mod handlers;

pub use handlers::health_check;

use crate::service::{DealService, ForecastService};
use axum::{
    routing::{get, patch, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

/// 构建全部路由
pub fn router(pool: PgPool) -> Router {
    let deal_service = Arc::new(DealService::new(pool.clone()));
    let forecast_service = Arc::new(ForecastService::new(pool));

    let deal_routes = Router::new()
        .route("/deals", get(handlers::list_deals).post(handlers::create_deal))
        .route(
            "/deals/:id",
            get(handlers::get_deal)
                .patch(handlers::update_deal)
                .delete(handlers::delete_deal),
        )
        .route(
            "/payments/deals/:id/payments",
            post(handlers::add_payment).put(handlers::replace_payments),
        )
        .route(
            "/payments/payments/:id",
            patch(handlers::update_payment).delete(handlers::delete_payment),
        )
        .route("/purchase-orders", post(handlers::create_purchase_order))
        .route(
            "/purchase-orders/:id",
            patch(handlers::update_purchase_order).delete(handlers::delete_purchase_order),
        )
        .with_state(deal_service);

    let forecast_routes = Router::new()
        .route("/forecast", get(forecast::month_summary))
        .route("/forecast/view", get(forecast::forecast_view))
        .route("/forecast/export", get(forecast::export_csv))
        .with_state(forecast_service);

    Router::new()
        .route("/health", get(health_check))
        .merge(preview_router())
        .merge(deal_routes)
        .merge(forecast_routes)
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
}

/// 无需数据库的预测路由
pub fn preview_router() -> Router {
    Router::new().route("/forecast/preview", post(forecast::preview))
}

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use deal_forecast::api;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

/// 连接池延迟建立连接；这里的请求都在访问数据库之前返回
fn lazy_router() -> Router {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/deal_forecast_test")
        .expect("valid database url");
    api::router(pool)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let response = lazy_router()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn preview_runs_the_pipeline_on_posted_deals() {
    let body = json!({
        "deals": [
            {
                "id": 1,
                "client": "Deal A",
                "stage": "CLOSED",
                "probability": 100,
                "payments": [{"id": 1, "label": "Entrada", "date": "2025-01-15", "amount": "1000"}]
            },
            {
                "id": 2,
                "client": "Deal B",
                "stage": "PROPOSTA",
                "probability": 50,
                "payments": [{"id": 2, "label": "Entrega", "date": "2025-01-20", "amount": "2000"}]
            }
        ],
        "config": {"value_mode": "expected"}
    });

    let response = api::preview_router()
        .oneshot(
            Request::post("/forecast/preview")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let view = body_json(response).await;
    assert_eq!(view["months"].as_array().unwrap().len(), 1);
    assert_eq!(view["months"][0]["key"], json!("2025-01"));
    assert_eq!(view["months"][0]["items"][1]["stage"], json!("PROPOSAL"));
    assert_eq!(view["period"], json!({"from": "2025-01", "to": "2025-01"}));
    assert_eq!(view["years"], json!([2025]));

    let closed: f64 = view["totals"]["closed"].as_str().unwrap().parse().unwrap();
    let open: f64 = view["totals"]["open"].as_str().unwrap().parse().unwrap();
    assert_eq!(closed, 1000.0);
    assert_eq!(open, 1000.0);

    let month_open: f64 = view["months"][0]["expected_open"].as_str().unwrap().parse().unwrap();
    assert_eq!(month_open, open);
}

#[tokio::test]
async fn preview_counts_a_deal_without_probability_at_half_value() {
    let body = json!({
        "deals": [
            {
                "id": 3,
                "client": "Deal C",
                "stage": "PROPOSAL",
                "payments": [{"id": 5, "label": "Parcela", "date": "2025-03-01", "amount": "800"}]
            }
        ],
        "config": {"value_mode": "expected"}
    });

    let response = api::preview_router()
        .oneshot(
            Request::post("/forecast/preview")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let view = body_json(response).await;
    assert_eq!(view["months"][0]["items"][0]["probability"], json!(50));
    let open: f64 = view["totals"]["open"].as_str().unwrap().parse().unwrap();
    assert_eq!(open, 400.0);
}

#[tokio::test]
async fn non_numeric_ids_are_rejected() {
    for (method, uri) in [
        ("PATCH", "/deals/abc"),
        ("DELETE", "/deals/abc"),
        ("DELETE", "/payments/payments/x1"),
        ("DELETE", "/purchase-orders/po"),
    ] {
        let mut request = Request::builder().method(method).uri(uri);
        let body = if method == "PATCH" {
            request = request.header("content-type", "application/json");
            Body::from(json!({"client": "Test"}).to_string())
        } else {
            Body::empty()
        };

        let response = lazy_router().oneshot(request.body(body).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{} {}", method, uri);
        let error = body_json(response).await;
        assert_eq!(error, json!({"success": false, "message": "Invalid id"}));
    }
}

#[tokio::test]
async fn invalid_forecast_query_is_a_bad_request() {
    let response = lazy_router()
        .oneshot(
            Request::get("/forecast/view?mode=semester&year=2025&half=3")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = body_json(response).await;
    assert_eq!(error["success"], json!(false));
}

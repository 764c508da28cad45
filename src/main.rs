use deal_forecast::{api, create_pool, run_migrations, AppConfig};
use tracing::info;
use tracing_subscriber::{fmt::time::ChronoLocal, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 本地时间格式，级别由 RUST_LOG 控制
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = AppConfig::load()?;
    info!("Starting server with config: {:?}", config.server);

    // 数据库连接池 + 建表
    let pool = create_pool(&config.database.url, config.database.max_connections).await?;
    info!("Database pool created");
    run_migrations(&pool).await?;
    info!("Migrations applied");

    let app = api::router(pool);

    // 启动服务器
    let addr = config.bind_addr();
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  GET  /deals, POST /deals, PATCH|DELETE /deals/:id");
    info!("  POST|PUT /payments/deals/:id/payments, PATCH|DELETE /payments/payments/:id");
    info!("  POST /purchase-orders, PATCH|DELETE /purchase-orders/:id");
    info!("  GET  /forecast, /forecast/view, /forecast/export; POST /forecast/preview");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod service;

pub use self::config::AppConfig;
pub use db::{create_pool, run_migrations};
pub use error::AppError;
pub use service::{aggregate, build_view, project, DealService, ForecastService};

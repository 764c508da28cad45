pub mod pool;
pub mod queries;
pub mod queries_forecast;

pub use pool::{create_pool, run_migrations};
pub use queries::*;
pub use queries_forecast::*;

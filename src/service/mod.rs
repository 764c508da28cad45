pub mod aggregator;
pub mod deals;
pub mod export;
pub mod forecast;
pub mod projector;

pub use aggregator::aggregate;
pub use deals::{assemble_deals, load_deals, DealService};
pub use forecast::{build_view, default_summary_window, ForecastService};
pub use projector::project;

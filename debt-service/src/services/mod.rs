pub mod database;
pub mod metrics;
pub mod settlement;

pub use database::Database;
pub use metrics::{get_metrics, init_metrics};

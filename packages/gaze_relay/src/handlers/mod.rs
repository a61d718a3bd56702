mod health;
mod sessions;

pub use health::{health_handler, health_live_handler, metrics_handler};
pub use sessions::sessions_handler;

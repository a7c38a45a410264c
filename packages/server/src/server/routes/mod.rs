mod health;
mod tasks;

pub use health::health_handler;
pub use tasks::{status_handler, submit_handler};

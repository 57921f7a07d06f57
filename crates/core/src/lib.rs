pub mod action;
mod correlate;
pub mod debug;
pub mod detector;
pub mod error;
pub mod executor;
pub mod locate;
pub mod logger;
pub mod matcher;
pub mod platform;
pub mod record;
pub mod rule;
pub mod scheduler;
pub mod settings;
pub mod sleep;
pub mod store;
pub mod types;

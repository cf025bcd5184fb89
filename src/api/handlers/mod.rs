pub mod history;
pub mod metrics;
pub mod status;
pub mod strategy;
pub mod webhook;

pub mod check_config;
pub mod plan;
pub mod snapshot;

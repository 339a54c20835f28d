pub mod breaker;
pub mod config;
pub mod loop_cmd;
pub mod migrate;
pub mod plan;
pub mod run;
pub mod status;
pub mod step;
pub mod validate;

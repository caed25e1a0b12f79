pub mod config;
pub mod environments;
pub mod plan;
pub mod run;

pub mod api;
pub mod config;
pub mod distance;
pub mod misuse;
pub mod pipeline;
pub mod records;
pub mod report;

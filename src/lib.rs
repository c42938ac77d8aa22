pub mod config;
pub mod counters;
pub mod engine;
pub mod error;
pub mod report;
pub mod rollup;
pub mod schema;
pub mod tag;
pub mod trace;

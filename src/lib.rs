pub mod api;
pub mod config;
pub mod dataset;
pub mod error;
pub mod estimation;
pub mod state;

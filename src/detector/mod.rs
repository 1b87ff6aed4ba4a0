pub mod config;
pub mod error;
pub mod heuristics;
pub mod primary;
pub mod queries;

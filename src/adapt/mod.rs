pub mod cache;
pub mod engine;
pub mod fuzzy;
pub mod history;
pub mod structural;

pub mod config;
pub mod error;
pub mod mode;
pub mod payload;
pub mod tag;

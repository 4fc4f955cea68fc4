pub mod error;
pub mod executor;
pub mod factory;
pub mod report;

pub mod connection;
pub mod core;
pub mod counters;
pub mod outcome;
pub mod records;
pub mod schema;
pub mod settings;
pub mod task;

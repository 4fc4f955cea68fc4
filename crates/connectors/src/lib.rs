pub mod file;
pub mod grid;
pub mod hydration;
pub mod json;
pub mod sql;

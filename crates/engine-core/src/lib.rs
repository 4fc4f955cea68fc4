pub mod error;
pub mod registry;
pub mod retry;
pub mod window;

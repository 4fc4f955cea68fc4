pub mod adapter;
pub mod convert;
pub mod error;
pub mod session;
pub mod source;

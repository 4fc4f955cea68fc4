pub mod deferred;
pub mod error;
pub mod handler;
pub mod mapper;
pub mod producer;
pub mod skipped;
pub mod upsert;

#[cfg(test)]
pub mod testing;

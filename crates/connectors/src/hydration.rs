use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HydrationError {
    #[error("Hydration API error: {0}")]
    Api(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),
}

/// External per-id record hydration client (e.g. a social-media API that
/// returns full post records for a list of ids). Records come back as JSON
/// objects in no particular order.
#[async_trait]
pub trait HydrationClient: Send + Sync {
    async fn hydrate(&self, ids: &[String]) -> Result<Vec<serde_json::Value>, HydrationError>;
}

//! Text-generation provider trait.
//!
//! A [`Generator`] turns an assembled prompt into an answer, either in one
//! piece or as a [`TokenStream`] of incremental fragments. Streams are lazy:
//! the provider connection is owned by the stream and released as soon as
//! the stream is dropped, so an abandoned answer stops consuming the
//! provider mid-flight.

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Incremental text fragments from a provider. Ends after the last fragment
/// or after the first error.
pub type TokenStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the model identifier reported by `/health`.
    fn model_name(&self) -> &str;

    /// Generate a complete answer for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Open a token stream for `prompt`.
    ///
    /// Failures before the first fragment (connection refused, HTTP error
    /// status) are returned here; later failures arrive as `Err` items.
    async fn stream(&self, prompt: &str) -> Result<TokenStream>;
}

//! Chat-completion access for the annotation engine.

mod client;

use async_trait::async_trait;

pub use client::OpenAiClient;

/// A single-turn chat completion: one system message, one user message.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// The assistant's text. Errors cover transport failures, non-success
    /// statuses, timeouts and responses without a message.
    async fn complete(&self, system: &str, user: &str, temperature: f32) -> anyhow::Result<String>;
}

//! OpenAI-compatible HTTP embedding provider.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{EmbeddingError, EmbeddingProvider, Vector};
use crate::constants::{HTTP_TIMEOUT, USER_AGENT};

/// Request body for embedding API
#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// Response from embedding API
#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

/// Individual embedding data in response
#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Provider for any endpoint that accepts `{ model, input }` and answers
/// `{ data: [{ embedding, index }] }`.
pub struct OpenAiEmbeddings {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiEmbeddings {
    /// Create a provider without contacting the endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.to_string(),
        })
    }

    /// Create a provider and check it works by embedding a short test string.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint rejects the key or the model, or
    /// answers with something that is not an embedding.
    pub async fn connect(
        base_url: &str,
        api_key: &str,
        model: &str,
    ) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
        let provider = Self::new(base_url, api_key, model)?;
        let check = provider.encode_batch(&["ping".to_string()]).await?;
        match check.first() {
            Some(vector) if !vector.is_empty() => {
                debug!(model, dimensions = vector.len(), "Embedding endpoint checked");
                Ok(Arc::new(provider))
            }
            _ => Err(EmbeddingError::InvalidResponse(
                "endpoint check returned an empty embedding".to_string(),
            )),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vector>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Sending embedding request for {} texts to {}",
            texts.len(),
            self.base_url
        );

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Status { status, body });
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                got: parsed.data.len(),
            });
        }

        // Sort by index to ensure correct order
        let mut embeddings: Vec<(usize, Vec<f32>)> = parsed
            .data
            .into_iter()
            .map(|d| (d.index, d.embedding))
            .collect();
        embeddings.sort_by_key(|(idx, _)| *idx);

        Ok(embeddings.into_iter().map(|(_, emb)| emb).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

//! HTTP-backed capability implementations
//!
//! The caption, normalization, embedding, and reranking models run out
//! of process behind a model-serving HTTP API. Each capability maps to
//! one JSON endpoint under a shared base URL; batch endpoints return
//! per-item outcomes in-band so one bad input degrades that item
//! instead of failing the request.

use crate::error::{ItemResult, ModelError, Result};
use crate::provider::{
    CaptionProvider, EmbedProvider, EmbeddingResult, NormalizeProvider, RerankProvider,
};
use async_trait::async_trait;
use half::f16;
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::PathBuf;

/// Connection settings for the model-serving API.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteModelConfig {
    /// Base URL of the model server, e.g. `http://localhost:8191`
    pub api_base: String,
    /// Optional bearer token
    #[serde(default)]
    pub api_key: Option<String>,
    /// Dimension of the vectors the embedding endpoint produces
    pub embedding_dimension: usize,
}

/// Shared JSON client for the model-serving endpoints.
#[derive(Debug, Clone)]
pub struct RemoteModelClient {
    client: Client,
    config: RemoteModelConfig,
}

/// One entry of a batch response: a value or a per-item error message.
#[derive(Debug, Deserialize)]
struct BatchItem<T> {
    value: Option<T>,
    error: Option<String>,
}

impl<T> BatchItem<T> {
    fn into_item_result(self) -> ItemResult<T> {
        match (self.value, self.error) {
            (Some(value), _) => Ok(value),
            (None, Some(error)) => Err(ModelError::generation(error)),
            (None, None) => Err(ModelError::malformed("batch item with no value and no error")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BatchResponse<T> {
    results: Vec<BatchItem<T>>,
}

#[derive(Debug, Serialize)]
struct TextBatchRequest<'a> {
    texts: &'a [String],
}

#[derive(Debug, Serialize)]
struct ItemBatchRequest<'a> {
    items: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    items: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl RemoteModelClient {
    pub fn new(config: RemoteModelConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn embedding_dimension(&self) -> usize {
        self.config.embedding_dimension
    }

    async fn post<Req, Resp>(&self, endpoint: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{endpoint}", self.config.api_base.trim_end_matches('/'));
        tracing::debug!("POST {url}");

        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?.error_for_status()?;
        Ok(response.json::<Resp>().await?)
    }

    /// Expect exactly one outcome per input; anything else is a
    /// malformed response.
    fn check_batch_len<T>(results: &[T], expected: usize) -> Result<()> {
        if results.len() != expected {
            return Err(ModelError::malformed(format!(
                "expected {expected} batch results, got {}",
                results.len()
            )));
        }
        Ok(())
    }
}

/// Captioning model behind the `caption` endpoint.
#[derive(Debug, Clone)]
pub struct RemoteCaptionProvider {
    client: RemoteModelClient,
}

impl RemoteCaptionProvider {
    pub fn new(client: RemoteModelClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CaptionProvider for RemoteCaptionProvider {
    async fn caption_batch(&self, items: &[PathBuf]) -> Result<Vec<ItemResult<String>>> {
        if items.is_empty() {
            return Ok(vec![]);
        }
        let request = ItemBatchRequest {
            items: items.iter().filter_map(|p| p.to_str()).collect(),
        };
        if request.items.len() != items.len() {
            return Err(ModelError::invalid_config(
                "item paths must be valid UTF-8 for the caption endpoint",
            ));
        }

        let response: BatchResponse<String> = self.client.post("v1/caption", &request).await?;
        RemoteModelClient::check_batch_len(&response.results, items.len())?;
        Ok(response
            .results
            .into_iter()
            .map(BatchItem::into_item_result)
            .collect())
    }
}

/// Text-normalization model behind the `normalize` endpoint.
#[derive(Debug, Clone)]
pub struct RemoteNormalizeProvider {
    client: RemoteModelClient,
}

impl RemoteNormalizeProvider {
    pub fn new(client: RemoteModelClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NormalizeProvider for RemoteNormalizeProvider {
    async fn normalize_text(&self, text: &str) -> Result<String> {
        let texts = vec![text.to_string()];
        let mut results = self.normalize_batch(&texts).await?;
        results
            .pop()
            .ok_or_else(|| ModelError::malformed("empty normalize response"))?
    }

    async fn normalize_batch(&self, texts: &[String]) -> Result<Vec<ItemResult<String>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let response: BatchResponse<String> = self
            .client
            .post("v1/normalize", &TextBatchRequest { texts })
            .await?;
        RemoteModelClient::check_batch_len(&response.results, texts.len())?;
        Ok(response
            .results
            .into_iter()
            .map(|item| item.into_item_result().map(|text| text.trim().to_string()))
            .collect())
    }
}

/// Embedding model behind the `embed` endpoint.
///
/// The endpoint is all-or-nothing: embeddings either come back for every
/// input or the call fails, so there is no per-item degradation here.
#[derive(Debug, Clone)]
pub struct RemoteEmbedProvider {
    client: RemoteModelClient,
}

impl RemoteEmbedProvider {
    pub fn new(client: RemoteModelClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EmbedProvider for RemoteEmbedProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        let texts = vec![text.to_string()];
        let result = self.embed_texts(&texts).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::malformed("no embedding generated for text"))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        tracing::debug!("Requesting embeddings for {} texts", texts.len());
        let response: EmbedResponse = self
            .client
            .post("v1/embed", &TextBatchRequest { texts })
            .await?;
        RemoteModelClient::check_batch_len(&response.embeddings, texts.len())?;

        let dimension = self.client.embedding_dimension();
        let embeddings: Vec<Vec<f16>> = response
            .embeddings
            .into_iter()
            .map(|embedding| embedding.into_iter().map(f16::from_f32).collect())
            .collect();
        for embedding in &embeddings {
            if embedding.len() != dimension {
                return Err(ModelError::malformed(format!(
                    "expected dimension {dimension}, got {}",
                    embedding.len()
                )));
            }
        }

        Ok(EmbeddingResult::new(embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.client.embedding_dimension()
    }

    fn provider_name(&self) -> &str {
        "remote"
    }
}

/// Cross-modal reranking model behind the `rerank` endpoint.
#[derive(Debug, Clone)]
pub struct RemoteRerankProvider {
    client: RemoteModelClient,
}

impl RemoteRerankProvider {
    pub fn new(client: RemoteModelClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RerankProvider for RemoteRerankProvider {
    async fn rerank(&self, query: &str, items: &[PathBuf]) -> Result<Vec<ItemResult<f32>>> {
        if items.is_empty() {
            return Ok(vec![]);
        }
        let request = RerankRequest {
            query,
            items: items.iter().filter_map(|p| p.to_str()).collect(),
        };
        if request.items.len() != items.len() {
            return Err(ModelError::invalid_config(
                "item paths must be valid UTF-8 for the rerank endpoint",
            ));
        }

        let response: BatchResponse<f32> = self.client.post("v1/rerank", &request).await?;
        RemoteModelClient::check_batch_len(&response.results, items.len())?;
        Ok(response
            .results
            .into_iter()
            .map(BatchItem::into_item_result)
            .collect())
    }
}

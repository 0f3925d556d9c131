//! OpenAI 임베딩 프로바이더
//!
//! `POST {base_url}/embeddings`를 배치 단위로 호출합니다.
//! 429/5xx와 네트워크 에러는 지수 백오프로 재시도하고,
//! 그 외 4xx는 즉시 실패합니다.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::error::{DocQaError, Result};

use super::EmbeddingProvider;

/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 1000;
/// 요청 타임아웃
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// 모델별 기본 차원
fn dimension_for_model(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

/// OpenAI 임베딩 구현체
#[derive(Debug)]
pub struct OpenAiEmbedding {
    api_key: String,
    endpoint: String,
    model: String,
    dimension: usize,
    batch_size: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiEmbedding {
    /// 새 인스턴스 생성
    ///
    /// # Arguments
    /// * `api_key` - OpenAI API 키
    /// * `base_url` - API 베이스 URL (예: `https://api.openai.com/v1`)
    /// * `config` - 모델/배치/재시도 설정
    pub fn new(api_key: String, base_url: &str, config: &EmbeddingConfig) -> Result<Self> {
        let dimension = dimension_for_model(&config.model).ok_or_else(|| {
            DocQaError::config(format!(
                "unknown embedding model '{}'; use text-embedding-3-small, \
                 text-embedding-3-large or text-embedding-ada-002",
                config.model
            ))
        })?;

        Self::with_dimension(api_key, base_url, config, dimension)
    }

    /// 차원을 직접 지정하여 생성 (호환 API 서버용)
    pub fn with_dimension(
        api_key: String,
        base_url: &str,
        config: &EmbeddingConfig,
        dimension: usize,
    ) -> Result<Self> {
        if dimension == 0 {
            return Err(DocQaError::config("embedding dimension must be > 0"));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DocQaError::config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: config.model.clone(),
            dimension,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            client,
        })
    }

    /// 한 배치 요청 (재시도 포함)
    async fn request_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let mut last_error: Option<DocQaError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1));
                tracing::warn!(
                    "Embedding request failed, retrying in {:?} (attempt {}/{})",
                    backoff,
                    attempt,
                    self.max_retries
                );
                tokio::time::sleep(backoff).await;
            }

            let response = match self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(DocQaError::generation(format!(
                        "failed to send embedding request: {}",
                        e
                    )));
                    continue;
                }
            };

            let status = response.status();
            let body = response.text().await.map_err(|e| {
                DocQaError::generation(format!("failed to read embedding response: {}", e))
            })?;

            if status.is_success() {
                return parse_embeddings(&body, texts.len());
            }

            // 429 Rate Limit 또는 서버 에러 - 재시도
            if status.as_u16() == 429 || status.is_server_error() {
                last_error = Some(DocQaError::generation(format!(
                    "embedding API error ({}): {}",
                    status, body
                )));
                continue;
            }

            // 다른 에러 - 즉시 실패
            return Err(DocQaError::generation(format!(
                "embedding API error ({}): {}",
                status, body
            )));
        }

        Err(last_error.unwrap_or_else(|| {
            DocQaError::generation(format!(
                "embedding failed after {} retries",
                self.max_retries
            ))
        }))
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedItem>,
}

#[derive(Debug, Deserialize)]
struct EmbedItem {
    index: usize,
    embedding: Vec<f32>,
}

/// 응답 파싱 (index 순 정렬, 개수 검증)
fn parse_embeddings(body: &str, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut response: EmbedResponse = serde_json::from_str(body)
        .map_err(|e| DocQaError::generation(format!("malformed embedding response: {}", e)))?;

    if response.data.len() != expected {
        return Err(DocQaError::generation(format!(
            "embedding response has {} vectors, expected {}",
            response.data.len(),
            expected
        )));
    }

    response.data.sort_by_key(|item| item.index);
    Ok(response.data.into_iter().map(|item| item.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| DocQaError::generation("empty embedding response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            tracing::debug!(
                "Embedding batch {} ({} texts, {} total)",
                i + 1,
                batch.len(),
                texts.len()
            );
            results.extend(self.request_batch(batch).await?);
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingBackend;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(max_retries: u32) -> EmbeddingConfig {
        EmbeddingConfig {
            backend: EmbeddingBackend::OpenAi,
            model: "text-embedding-3-small".to_string(),
            batch_size: 2,
            max_retries,
        }
    }

    #[test]
    fn test_unknown_model_rejected() {
        let mut cfg = config(0);
        cfg.model = "mystery-embedder".to_string();
        let result = OpenAiEmbedding::new("key".into(), "http://localhost", &cfg);
        assert!(matches!(result, Err(DocQaError::Configuration(_))));
    }

    #[test]
    fn test_parse_embeddings_sorts_by_index() {
        let body = r#"{"data":[{"index":1,"embedding":[2.0]},{"index":0,"embedding":[1.0]}]}"#;
        let vectors = parse_embeddings(body, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_parse_embeddings_count_mismatch() {
        let body = r#"{"data":[{"index":0,"embedding":[1.0]}]}"#;
        assert!(parse_embeddings(body, 2).is_err());
    }

    #[tokio::test]
    async fn test_embed_batch_splits_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"data":[{"index":0,"embedding":[0.1,0.2]},{"index":1,"embedding":[0.3,0.4]}]}"#,
            ))
            .expect(2)
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedding::with_dimension(
            "sk-test".into(),
            &format!("{}/v1", server.uri()),
            &config(0),
            2,
        )
        .unwrap();

        let texts: Vec<String> = (0..4).map(|i| format!("text {}", i)).collect();
        let vectors = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(vectors.len(), 4);
        assert_eq!(vectors[2], vec![0.1, 0.2]);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedding::with_dimension(
            "bad".into(),
            &format!("{}/v1", server.uri()),
            &config(3),
            2,
        )
        .unwrap();

        let err = embedder.embed("hello").await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}

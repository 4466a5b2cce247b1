//! 생성 백엔드 모듈 - OpenAI 호환 Chat Completions (JSON 모드)
//!
//! 근거 기반 답변 조립기가 사용하는 외부 텍스트 생성 협력자입니다.
//! 출력은 신뢰하지 않으며, 스키마 검증과 보정은 `answer` 모듈이 담당합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let backend = OpenAiGeneration::from_env()?;
//! let text = backend.generate(&GenerationRequest::new(prompt)).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RiaError};

// ============================================================================
// GenerationBackend Trait
// ============================================================================

/// 시스템 지시문
pub const SYSTEM_MESSAGE: &str = "You are a Regulatory Impact Assessment assistant. \
Answer strictly and ONLY using the provided evidence passages. \
Be concise, cite as [Document (page X)]. If unclear, say 'Unclear' and require human supervision. \
Return a JSON object that exactly matches the schema in the user message.";

/// 생성 요청
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// 시스템 지시문
    pub system: String,
    /// 질문, 번호 붙은 근거 인용, 목표 JSON 스키마를 포함한 프롬프트
    pub prompt: String,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: SYSTEM_MESSAGE.to_string(),
            prompt: prompt.into(),
        }
    }
}

/// 텍스트 생성 백엔드 트레이트
///
/// 응답은 JSON 형태의 문자열이어야 하지만 보장되지 않습니다.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// 프롬프트로 텍스트 생성
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// 백엔드 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Retry Policy
// ============================================================================

/// 재시도 정책 (지수 백오프 + 지터)
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// 총 시도 횟수
    pub max_attempts: u32,
    /// 백오프 밑 (초): `base^attempt`
    pub backoff_base_secs: f64,
    /// 최대 지터 (ms)
    pub max_jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_secs: 1.5,
            max_jitter_ms: 400,
        }
    }
}

impl RetryPolicy {
    /// 대기 없는 정책 (테스트용)
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_base_secs: 0.0,
            max_jitter_ms: 0,
        }
    }

    /// n번째 실패 후 대기 시간
    pub fn backoff(&self, attempt: u32) -> Duration {
        if self.backoff_base_secs <= 0.0 {
            return Duration::ZERO;
        }
        let base = Duration::from_secs_f64(self.backoff_base_secs.powi(attempt as i32));
        base + Duration::from_millis(jitter_ms(self.max_jitter_ms))
    }
}

/// 0..=max 범위 지터
fn jitter_ms(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..=max)
}

/// 일시 오류만 재시도
///
/// 재시도를 소진하면 마지막 오류를 `FatalBackend`로 승격합니다.
/// 재시도 불가 오류는 즉시 반환합니다.
pub async fn retry_with_backoff<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error: Option<RiaError> = None;

    for attempt in 0..attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                if attempt + 1 < attempts {
                    let backoff = policy.backoff(attempt);
                    tracing::warn!(
                        "Generation request failed ({}), retrying in {:?} (attempt {}/{})",
                        e,
                        backoff,
                        attempt + 1,
                        attempts
                    );
                    tokio::time::sleep(backoff).await;
                }
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(RiaError::FatalBackend(format!(
        "gave up after {} attempts: {}",
        attempts,
        last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string())
    )))
}

// ============================================================================
// OpenAI Chat Completions
// ============================================================================

/// 기본 엔드포인트
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
/// 기본 모델
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// 연결 타임아웃
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// 전체 요청 타임아웃 (읽기 포함)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// 재시도 대상 HTTP 상태
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// 생성 백엔드 설정
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub organization: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub retry: RetryPolicy,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            organization: None,
            temperature: 0.1,
            max_tokens: 900,
            retry: RetryPolicy::default(),
        }
    }
}

impl GenerationConfig {
    /// 환경변수에서 설정 로드
    ///
    /// `OPENAI_BASE`, `OPENAI_API_KEY`, `OPENAI_MODEL`, `OPENAI_ORG`
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        Self {
            base_url: var("OPENAI_BASE").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: var("OPENAI_API_KEY"),
            model: var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            organization: var("OPENAI_ORG"),
            ..Default::default()
        }
    }

    /// API 키 존재 여부 확인
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI 호환 생성 백엔드
#[derive(Debug)]
pub struct OpenAiGeneration {
    config: GenerationConfig,
    client: reqwest::Client,
}

impl OpenAiGeneration {
    /// 설정으로 생성
    pub fn new(config: GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RiaError::FatalBackend(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// 환경변수 설정으로 생성
    pub fn from_env() -> Result<Self> {
        Self::new(GenerationConfig::from_env())
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// 단일 시도
    async fn post_once(&self, api_key: &str, body: &ChatRequest<'_>) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let mut request = self.client.post(&url).bearer_auth(api_key).json(body);
        if let Some(ref org) = self.config.organization {
            request = request.header("OpenAI-Organization", org);
        }

        let response = match request.send().await {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() || e.is_connect() || e.is_body() => {
                return Err(RiaError::TransientBackend(format!("request failed: {}", e)))
            }
            Err(e) => return Err(RiaError::FatalBackend(format!("request failed: {}", e))),
        };

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RiaError::TransientBackend(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            let message = format!("API error ({}): {}", status, truncate_body(&text));
            return if is_retryable_status(status.as_u16()) {
                Err(RiaError::TransientBackend(message))
            } else {
                Err(RiaError::FatalBackend(message))
            };
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| RiaError::FatalBackend(format!("Unexpected response shape: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .ok_or_else(|| RiaError::FatalBackend("Response contained no choices".to_string()))
    }
}

fn truncate_body(body: &str) -> String {
    body.chars().take(300).collect()
}

#[async_trait]
impl GenerationBackend for OpenAiGeneration {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| RiaError::FatalBackend("OPENAI_API_KEY not set".to_string()))?;

        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        tracing::debug!("Calling generation backend (model={})", self.config.model);

        retry_with_backoff(self.config.retry, |_| self.post_once(api_key, &body)).await
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_retryable_statuses() {
        for status in [429, 500, 502, 503, 504] {
            assert!(is_retryable_status(status));
        }
        for status in [400, 401, 403, 404, 422] {
            assert!(!is_retryable_status(status));
        }
    }

    #[test]
    fn test_backoff_grows_with_bounded_jitter() {
        let policy = RetryPolicy::default();
        let first = policy.backoff(0);
        let third = policy.backoff(2);

        assert!(first >= Duration::from_secs(1));
        assert!(first <= Duration::from_millis(1400));
        assert!(third >= Duration::from_secs_f64(2.25));
        assert!(third <= Duration::from_secs_f64(2.25) + Duration::from_millis(400));

        assert_eq!(RetryPolicy::immediate(3).backoff(5), Duration::ZERO);
    }

    #[test]
    fn test_jitter_stays_in_range() {
        assert_eq!(jitter_ms(0), 0);
        assert!((0..200).map(|_| jitter_ms(400)).all(|j| j <= 400));
    }

    #[test]
    fn test_has_api_key() {
        let mut config = GenerationConfig::default();
        assert!(!config.has_api_key());
        config.api_key = Some(String::new());
        assert!(!config.has_api_key());
        config.api_key = Some("sk-test".to_string());
        assert!(config.has_api_key());
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_errors() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(RetryPolicy::immediate(3), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(RiaError::TransientBackend("503".into()))
                } else {
                    Ok("{}".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "{}");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_escalates_to_fatal() {
        let calls = AtomicU32::new(0);
        let result: Result<String> = retry_with_backoff(RetryPolicy::immediate(3), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RiaError::TransientBackend("timeout".into())) }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::FatalBackend);
        assert!(err.to_string().contains("timeout"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<String> = retry_with_backoff(RetryPolicy::immediate(3), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RiaError::FatalBackend("400".into())) }
        })
        .await;

        assert!(result.unwrap_err().is_fatal());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_api_key_is_fatal() {
        let backend = OpenAiGeneration::new(GenerationConfig::default()).unwrap();
        let err = backend
            .generate(&GenerationRequest::new("prompt"))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_request_serialization() {
        let body = ChatRequest {
            model: "m",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature: 0.1,
            max_tokens: 10,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["response_format"]["type"], "json_object");
        assert_eq!(value["messages"][0]["role"], "user");
    }
}

//! IBM watsonx.ai 채팅 프로바이더
//!
//! ref: https://cloud.ibm.com/apidocs/watsonx-ai#text-chat
//!
//! API 키를 IAM 토큰으로 교환한 뒤 `/ml/v1/text/chat`을 호출합니다.
//! 메시지는 변환 없이 그대로 전달하고, 응답은 `ChatResponse`로 명시적으로 변환합니다.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use url::Url;

use crate::config::WatsonxConfig;
use crate::error::{RagError, Result};
use crate::http::{build_client, join_endpoint, vendor_error};

use super::{ChatCapable, ChatMessage, ChatParams, ChatResponse};

/// watsonx.ai API 버전 (쿼리 파라미터)
pub(crate) const WATSONX_API_VERSION: &str = "2024-03-14";

/// 만료 직전 재발급 여유 시간
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

const IAM_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

// ============================================================================
// IAM Authentication
// ============================================================================

#[derive(Debug, Deserialize)]
struct IamTokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// IBM Cloud IAM 토큰 발급기
///
/// 발급받은 토큰은 만료 직전까지 재사용합니다.
#[derive(Debug)]
pub(crate) struct IamAuthenticator {
    http: reqwest::Client,
    iam_url: String,
    api_key: String,
    token: Mutex<Option<CachedToken>>,
}

impl IamAuthenticator {
    pub(crate) fn new(http: reqwest::Client, iam_url: &str, api_key: &str) -> Self {
        Self {
            http,
            iam_url: iam_url.to_string(),
            api_key: api_key.to_string(),
            token: Mutex::new(None),
        }
    }

    /// 유효한 bearer 토큰 반환 (필요하면 발급)
    pub(crate) async fn bearer_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if Instant::now() + TOKEN_REFRESH_MARGIN < token.expires_at {
                return Ok(token.access_token.clone());
            }
        }

        tracing::debug!("Requesting IAM token from {}", self.iam_url);
        let response = self
            .http
            .post(&self.iam_url)
            .header("Accept", "application/json")
            .form(&[("grant_type", IAM_GRANT_TYPE), ("apikey", self.api_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(vendor_error("watsonx", response).await);
        }

        let body: IamTokenResponse = response.json().await?;
        let token = CachedToken {
            access_token: body.access_token,
            expires_at: token_deadline(Instant::now(), body.expires_in),
        };
        let access_token = token.access_token.clone();
        *cached = Some(token);

        Ok(access_token)
    }
}

/// 토큰 만료 시각 (표현 불가능한 값이면 기본 수명 사용)
fn token_deadline(now: Instant, expires_in: u64) -> Instant {
    now.checked_add(Duration::from_secs(expires_in))
        .unwrap_or_else(|| now + Duration::from_secs(default_expires_in()))
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct TextChatRequest<'a> {
    model_id: &'a str,
    project_id: &'a str,
    messages: &'a [ChatMessage],
    #[serde(flatten)]
    params: ChatParams,
}

#[derive(Debug, Deserialize)]
struct TextChatResponse {
    #[serde(default)]
    choices: Vec<TextChatChoice>,
}

#[derive(Debug, Deserialize)]
struct TextChatChoice {
    message: TextChatMessage,
}

#[derive(Debug, Deserialize)]
struct TextChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl TextChatResponse {
    /// 벤더 응답을 정규화 응답으로 변환
    fn into_chat_response(self) -> Result<ChatResponse> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RagError::InvalidResponse("watsonx returned no choices".into()))?;
        Ok(ChatResponse::assistant(choice.message.content.unwrap_or_default()))
    }
}

// ============================================================================
// WatsonxChat
// ============================================================================

/// WatsonX 채팅 래퍼
///
/// API 키는 생성 시 검증하지 않습니다. 비어 있으면 첫 호출에서 IAM 에러가 납니다.
#[derive(Debug)]
pub struct WatsonxChat {
    http: reqwest::Client,
    auth: IamAuthenticator,
    chat_url: Url,
    project_id: String,
    model_id: String,
    params: ChatParams,
}

impl WatsonxChat {
    /// 생성
    ///
    /// # Arguments
    /// * `model_id` - 모델 식별자 (예: meta-llama/llama-3-2-90b-vision-instruct)
    /// * `config` - 리전 엔드포인트, 프로젝트 ID, API 키
    /// * `params` - 추론 파라미터 (매 호출의 기본값)
    pub fn new(model_id: &str, config: &WatsonxConfig, params: ChatParams) -> Result<Self> {
        let http = build_client(config.timeout)?;
        let mut chat_url = join_endpoint(&config.url, "ml/v1/text/chat")?;
        chat_url
            .query_pairs_mut()
            .append_pair("version", WATSONX_API_VERSION);

        Ok(Self {
            auth: IamAuthenticator::new(http.clone(), &config.iam_url, &config.api_key),
            http,
            chat_url,
            project_id: config.project_id.clone(),
            model_id: model_id.to_string(),
            params,
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn endpoint_url(&self) -> &Url {
        &self.chat_url
    }

    /// 생성 시 지정한 추론 파라미터
    pub fn inference_params(&self) -> &ChatParams {
        &self.params
    }
}

#[async_trait]
impl ChatCapable for WatsonxChat {
    async fn chat(&self, messages: &[ChatMessage], params: &ChatParams) -> Result<ChatResponse> {
        let token = self.auth.bearer_token().await?;
        let request = TextChatRequest {
            model_id: &self.model_id,
            project_id: &self.project_id,
            messages,
            params: params.merged_over(&self.params),
        };

        tracing::debug!("Sending {} messages to watsonx ({})", messages.len(), self.model_id);

        let response = self
            .http
            .post(self.chat_url.clone())
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(vendor_error("watsonx", response).await);
        }

        let body: TextChatResponse = response.json().await?;
        body.into_chat_response()
    }

    fn provider(&self) -> &str {
        "watsonx"
    }

    fn model(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{
        body_partial_json, body_string_contains, header, method, path, query_param,
    };
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer, api_key: &str) -> WatsonxConfig {
        WatsonxConfig {
            api_key: api_key.to_string(),
            project_id: "proj-1".to_string(),
            url: server.uri(),
            iam_url: format!("{}/identity/token", server.uri()),
            timeout: Duration::from_secs(5),
        }
    }

    async fn mount_iam(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/identity/token"))
            .and(body_string_contains("apikey=secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "iam-token",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn chat_body(content: &str) -> serde_json::Value {
        json!({
            "id": "chat-1",
            "model_id": "meta-llama/llama-3-2-90b-vision-instruct",
            "created": 1728806400,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
        })
    }

    #[test]
    fn test_token_deadline_handles_huge_expiry() {
        let now = Instant::now();
        assert_eq!(token_deadline(now, 3600), now + Duration::from_secs(3600));
        assert_eq!(token_deadline(now, u64::MAX), now + Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_chat_translates_vendor_response() {
        let server = MockServer::start().await;
        mount_iam(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/ml/v1/text/chat"))
            .and(query_param("version", WATSONX_API_VERSION))
            .and(header("Authorization", "Bearer iam-token"))
            .and(body_partial_json(json!({
                "model_id": "meta-llama/llama-3-2-90b-vision-instruct",
                "project_id": "proj-1",
                "messages": [{"role": "user", "content": "Hello"}],
                "max_tokens": 100
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("Hi there")))
            .mount(&server)
            .await;

        let chat = WatsonxChat::new(
            "meta-llama/llama-3-2-90b-vision-instruct",
            &config(&server, "secret"),
            ChatParams::new().with_max_tokens(100),
        )
        .unwrap();

        let response = chat
            .chat(&[ChatMessage::user("Hello")], &ChatParams::default())
            .await
            .unwrap();
        assert_eq!(response, ChatResponse::assistant("Hi there"));
    }

    #[tokio::test]
    async fn test_messages_passed_through_unchanged() {
        let server = MockServer::start().await;
        mount_iam(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/ml/v1/text/chat"))
            .and(body_partial_json(json!({
                "messages": [
                    {"role": "user", "content": "Hi"},
                    {"role": "tool", "content": "42"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("ok")))
            .expect(1)
            .mount(&server)
            .await;

        let chat =
            WatsonxChat::new("m", &config(&server, "secret"), ChatParams::default()).unwrap();
        let messages = vec![ChatMessage::user("Hi"), ChatMessage::new("tool", "42")];
        assert!(chat.chat(&messages, &ChatParams::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_token_reused_across_calls() {
        let server = MockServer::start().await;
        mount_iam(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/ml/v1/text/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("ok")))
            .expect(2)
            .mount(&server)
            .await;

        let chat =
            WatsonxChat::new("m", &config(&server, "secret"), ChatParams::default()).unwrap();
        for _ in 0..2 {
            chat.chat(&[ChatMessage::user("Hi")], &ChatParams::default())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_empty_key_fails_at_call_not_construction() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/identity/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "errorCode": "BXNIM0415E",
                "errorMessage": "Provided API key could not be found."
            })))
            .mount(&server)
            .await;

        let chat = WatsonxChat::new("m", &config(&server, ""), ChatParams::default());
        assert!(chat.is_ok());

        let result = chat
            .unwrap()
            .chat(&[ChatMessage::user("Hi")], &ChatParams::default())
            .await;
        assert!(matches!(result, Err(RagError::Vendor { status: 400, .. })));
    }

    #[tokio::test]
    async fn test_missing_choices_rejected() {
        let server = MockServer::start().await;
        mount_iam(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/ml/v1/text/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .mount(&server)
            .await;

        let chat =
            WatsonxChat::new("m", &config(&server, "secret"), ChatParams::default()).unwrap();
        let result = chat.chat(&[ChatMessage::user("Hi")], &ChatParams::default()).await;
        assert!(matches!(result, Err(RagError::InvalidResponse(_))));
    }
}

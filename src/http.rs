//! 벤더 API 호출용 HTTP 헬퍼

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{RagError, Result};

/// 타임아웃이 설정된 HTTP 클라이언트 생성
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("docrag/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// base URL 뒤에 경로를 붙임
///
/// `Url::join`은 마지막 세그먼트를 교체하므로 base 경로가 `/`로 끝나도록 맞춥니다.
/// (`https://api.deepseek.com/v1` + `chat/completions` → `.../v1/chat/completions`)
pub(crate) fn join_endpoint(base: &str, path: &str) -> Result<Url> {
    let mut base = Url::parse(base)?;
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    Ok(base.join(path.trim_start_matches('/'))?)
}

/// OpenAI 형식 에러 응답 (`{"error": {"message": ...}}`)
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// IBM 형식 에러 응답 (`{"errors": [{"message": ...}]}`)
#[derive(Debug, Deserialize)]
struct IbmErrorBody {
    errors: Vec<ApiErrorDetail>,
}

/// 실패 응답을 `RagError::Vendor`로 변환
///
/// 본문에서 메시지를 추출할 수 있으면 사용하고, 아니면 원문을 그대로 담습니다.
pub(crate) async fn vendor_error(provider: &str, response: reqwest::Response) -> RagError {
    let status = response.status().as_u16();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return RagError::Http(e),
    };

    let message = if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(&body) {
        parsed.error.message
    } else if let Ok(parsed) = serde_json::from_str::<IbmErrorBody>(&body) {
        parsed
            .errors
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join("; ")
    } else {
        body
    };

    tracing::debug!("{} API returned {}: {}", provider, status, message);
    RagError::Vendor {
        provider: provider.to_string(),
        status,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_endpoint_keeps_version_segment() {
        let url = join_endpoint("https://api.deepseek.com/v1", "chat/completions").unwrap();
        assert_eq!(url.as_str(), "https://api.deepseek.com/v1/chat/completions");

        let url = join_endpoint("http://localhost:11434/v1/", "/embeddings").unwrap();
        assert_eq!(url.as_str(), "http://localhost:11434/v1/embeddings");
    }

    #[test]
    fn test_join_endpoint_bare_host() {
        let url = join_endpoint("https://us-south.ml.cloud.ibm.com", "ml/v1/text/chat").unwrap();
        assert_eq!(url.as_str(), "https://us-south.ml.cloud.ibm.com/ml/v1/text/chat");
    }

    #[test]
    fn test_join_endpoint_invalid_base() {
        assert!(matches!(
            join_endpoint("not a url", "chat/completions"),
            Err(RagError::Url(_))
        ));
    }
}

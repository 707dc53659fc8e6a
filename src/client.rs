use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::types::{Page, PromptSummary, PromptTokenMatrix, TokenUsageStats, UsageRecord};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{endpoint}: request failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: ureq::Error,
    },
    #[error("{endpoint}: server returned HTTP {status}")]
    Status { endpoint: String, status: u16 },
    #[error("{endpoint}: invalid response body: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The backend endpoints the dashboard reads from.
pub trait DataSource: Send + Sync {
    fn agent_logs(&self, page: u32, page_size: u32) -> Result<Page<UsageRecord>, FetchError>;
    fn token_usage_stats(&self) -> Result<TokenUsageStats, FetchError>;
    fn prompts_summary(&self, page: u32, page_size: u32) -> Result<Page<PromptSummary>, FetchError>;
    fn prompt_tokens(&self, prompt_id: &str) -> Result<PromptTokenMatrix, FetchError>;
}

/// Blocking HTTP client for the agent-log backend.
pub struct ApiClient {
    agent: ureq::Agent,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: config.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let transport = |source| FetchError::Transport {
            endpoint: path.to_string(),
            source,
        };

        let mut request = self.agent.get(&url).header("Accept", "application/json");
        for (key, value) in query {
            request = request.query(key, value);
        }

        let mut response = request.call().map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.body_mut().read_to_string().map_err(transport)?;
        serde_json::from_str(&body).map_err(|source| FetchError::Decode {
            endpoint: path.to_string(),
            source,
        })
    }
}

fn page_query(page: u32, page_size: u32) -> [(&'static str, String); 2] {
    [("page", page.to_string()), ("page_size", page_size.to_string())]
}

impl DataSource for ApiClient {
    fn agent_logs(&self, page: u32, page_size: u32) -> Result<Page<UsageRecord>, FetchError> {
        self.get_json("/agent-logs", &page_query(page, page_size))
    }

    fn token_usage_stats(&self) -> Result<TokenUsageStats, FetchError> {
        self.get_json("/token-usage-stats", &[])
    }

    fn prompts_summary(&self, page: u32, page_size: u32) -> Result<Page<PromptSummary>, FetchError> {
        self.get_json("/prompts-summary", &page_query(page, page_size))
    }

    fn prompt_tokens(&self, prompt_id: &str) -> Result<PromptTokenMatrix, FetchError> {
        self.get_json(&format!("/prompt-tokens/{}", urlencoding::encode(prompt_id)), &[])
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;

    use super::*;

    fn client(server: &mockito::Server) -> ApiClient {
        ApiClient::new(&format!("{}/", server.url()), Duration::from_secs(5))
    }

    #[test]
    fn fetches_agent_logs_with_paging() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/agent-logs")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("page".into(), "2".into()),
                Matcher::UrlEncoded("page_size".into(), "10".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"total": 11, "page": 2, "page_size": 10, "total_pages": 2,
                    "data": [{"id": "11", "agent_name": "agent-004",
                              "input_tokens": 1365, "output_tokens": 585,
                              "original_model": "GPT-4o", "input_data": "copy",
                              "output_data": null, "timestamp": "2024-01-15T10:10:00"}]}"#,
            )
            .create();

        let page = client(&server).agent_logs(2, 10).unwrap();
        mock.assert();
        assert_eq!(page.total, 11);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].input_tokens, 1365);
    }

    #[test]
    fn non_success_status_is_reported() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/token-usage-stats")
            .with_status(503)
            .create();

        let err = client(&server).token_usage_stats().unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }), "{err}");
        assert!(err.to_string().contains("/token-usage-stats"));
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/prompts-summary")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>oops</html>")
            .create();

        let err = client(&server).prompts_summary(1, 50).unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }

    #[test]
    fn prompt_id_is_path_encoded() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/prompt-tokens/a%2Fb%20c")
            .with_status(200)
            .with_body(r#"{"prompt_id": "a/b c", "agents": {}, "summary": {}}"#)
            .create();

        let m = client(&server).prompt_tokens("a/b c").unwrap();
        mock.assert();
        assert_eq!(m.prompt_id, "a/b c");
    }

    #[test]
    fn unreachable_backend_is_a_transport_error() {
        let c = ApiClient::new("http://127.0.0.1:9", Duration::from_millis(500));
        let err = c.token_usage_stats().unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }));
    }
}

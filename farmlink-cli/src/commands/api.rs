//! Thin typed client for the chat HTTP API.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::models::{
    ConversationDetail, ConversationSummary, Message, PartyId, ProblemResponse,
    ResolveConversationRequest, ResolveConversationResponse, SendMessageRequest, TopicId,
};
use url::Url;
use uuid::Uuid;

/// Upper bound for request/response calls. The live stream is exempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base: Url,
    token: String,
}

impl ApiClient {
    /// # Errors
    /// Fails on an unparsable server URL or if the HTTP client cannot be built.
    pub fn new(server: &str, token: String) -> Result<Self> {
        let mut base = Url::parse(server).with_context(|| format!("invalid server URL {server}"))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .user_agent("farmlink-cli")
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base,
            token,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("invalid API path {path}"))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        Ok(self
            .client
            .request(method, self.url(path)?)
            .bearer_auth(&self.token)
            .timeout(REQUEST_TIMEOUT))
    }

    pub async fn resolve(
        &self,
        other_party: &str,
        topic_id: Option<&str>,
    ) -> Result<ResolveConversationResponse> {
        let response = self
            .request(Method::POST, "api/conversations/resolve")?
            .json(&ResolveConversationRequest {
                other_party: PartyId::new(other_party),
                topic_id: topic_id.map(TopicId::new),
            })
            .send()
            .await
            .context("failed to reach the chat server")?;
        decode(response).await
    }

    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>> {
        let response = self
            .request(Method::GET, "api/conversations")?
            .send()
            .await
            .context("failed to reach the chat server")?;
        decode(response).await
    }

    pub async fn detail(&self, conversation_id: Uuid) -> Result<ConversationDetail> {
        let response = self
            .request(Method::GET, &format!("api/conversations/{conversation_id}"))?
            .send()
            .await
            .context("failed to reach the chat server")?;
        decode(response).await
    }

    pub async fn history(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let response = self
            .request(Method::GET, &format!("api/conversations/{conversation_id}/messages"))?
            .send()
            .await
            .context("failed to reach the chat server")?;
        decode(response).await
    }

    pub async fn send(&self, conversation_id: Uuid, body: &str) -> Result<Message> {
        let response = self
            .request(Method::POST, &format!("api/conversations/{conversation_id}/messages"))?
            .json(&SendMessageRequest {
                body: body.to_string(),
                sender_id: None,
            })
            .send()
            .await
            .context("failed to reach the chat server")?;
        decode(response).await
    }

    /// Opens the SSE stream; the caller consumes the body.
    pub async fn open_stream(&self, conversation_id: Uuid) -> Result<Response> {
        let response = self
            .client
            .get(self.url(&format!("api/conversations/{conversation_id}/stream"))?)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .context("failed to open live feed")?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(problem(response).await)
        }
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    if response.status().is_success() {
        return response
            .json::<T>()
            .await
            .context("unexpected response body from the chat server");
    }
    Err(problem(response).await)
}

/// Turns an error response into a [`ProblemResponse`] when the server sent
/// one, so callers can downcast and inspect `code` or retryability.
async fn problem(response: Response) -> anyhow::Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ProblemResponse>(&body) {
        Ok(problem) => anyhow::Error::new(problem),
        Err(_) => anyhow!("request failed with {status}: {body}"),
    }
}

/// Whether retrying the failed call may succeed.
pub fn is_retryable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ProblemResponse>()
        .map_or_else(|| err.downcast_ref::<reqwest::Error>().is_some(), ProblemResponse::is_retryable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_trailing_slash() {
        let api = ApiClient::new("http://localhost:8080/chat", "t".into()).unwrap();
        assert_eq!(
            api.url("api/conversations").unwrap().as_str(),
            "http://localhost:8080/chat/api/conversations"
        );
    }

    #[test]
    fn invalid_server_url_is_rejected() {
        assert!(ApiClient::new("not a url", "t".into()).is_err());
    }

    #[test]
    fn retryable_problems_are_detected() {
        let problem: ProblemResponse = serde_json::from_value(serde_json::json!({
            "type": "https://farmlink.dev/problems/store_unavailable",
            "title": "Service Unavailable",
            "status": 503,
            "code": "store_unavailable",
            "message": "chat store unavailable: timed out",
            "details": { "retryable": true }
        }))
        .unwrap();
        assert!(is_retryable(&anyhow::Error::new(problem)));
        assert!(!is_retryable(&anyhow!("plain failure")));
    }
}

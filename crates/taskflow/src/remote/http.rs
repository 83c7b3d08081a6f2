//! REST adapter for the TaskFlow API.
//!
//! Resources live under the configured base URL: `projects`, `issues`,
//! `issues/{id}`, `issues/{id}/comments` and `statistics`. Writes carry the
//! correlation token twice, as `client_token` in the JSON body and as the
//! `X-Correlation-Id` header, so servers that only echo one still work.

use super::websocket::spawn_subscription;
use super::{ChannelEvent, CorrelationToken, RemoteSync, ServerStatistics};
use crate::config::RemoteConfig;
use crate::domain::{
    Comment, Issue, IssueId, IssueUpdate, NewComment, NewIssue, NewProject, Project, ProjectId,
    UserId,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;

/// Header carrying the correlation token.
pub const CORRELATION_HEADER: &str = "X-Correlation-Id";

/// HTTP implementation of [`RemoteSync`].
#[derive(Debug, Clone)]
pub struct HttpRemote {
    config: RemoteConfig,
    client: Client,
}

#[derive(Serialize)]
struct WriteBody<'a, T: Serialize> {
    #[serde(flatten)]
    body: &'a T,
    #[serde(skip_serializing_if = "Option::is_none")]
    creator: Option<&'a UserId>,
    client_token: &'a str,
}

impl HttpRemote {
    /// Builds a client for the given remote settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the token is not a valid header value or
    /// the client cannot be built.
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = &config.api_token {
            let value = header::HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| Error::Config(format!("api_token is invalid: {e}")))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .timeout(config.request_timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// The settings this client was built from.
    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        let base = self.config.api_url.trim_end_matches('/');
        let suffix = path.trim_start_matches('/');
        format!("{base}/{suffix}")
    }

    fn write<T: Serialize>(
        &self,
        request: RequestBuilder,
        body: &T,
        creator: Option<&UserId>,
        token: &CorrelationToken,
    ) -> RequestBuilder {
        request
            .header(CORRELATION_HEADER, token.as_str())
            .json(&WriteBody {
                body,
                creator,
                client_token: token.as_str(),
            })
    }

    async fn send(request: RequestBuilder) -> Result<(StatusCode, String)> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(format!("request failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("response read failed: {e}")))?;
        Ok((status, body))
    }

    async fn request_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let (status, body) = Self::send(request).await?;
        if !status.is_success() {
            return Err(Error::Server {
                status: status.as_u16(),
                message: body,
            });
        }
        serde_json::from_str(&body).map_err(|e| Error::Server {
            status: status.as_u16(),
            message: format!("malformed response: {e}"),
        })
    }
}

#[async_trait]
impl RemoteSync for HttpRemote {
    async fn list_projects(&self) -> Result<Vec<Project>> {
        Self::request_json(self.client.get(self.endpoint("projects"))).await
    }

    async fn list_issues(&self, project: Option<&ProjectId>) -> Result<Vec<Issue>> {
        let mut request = self.client.get(self.endpoint("issues"));
        if let Some(project) = project {
            request = request.query(&[("project_id", project.as_str())]);
        }
        Self::request_json(request).await
    }

    async fn get_issue(&self, id: &IssueId) -> Result<Option<Issue>> {
        let request = self.client.get(self.endpoint(&format!("issues/{id}")));
        match Self::request_json(request).await {
            Ok(issue) => Ok(Some(issue)),
            Err(e) if e.is_remote_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_statistics(&self) -> Result<ServerStatistics> {
        Self::request_json(self.client.get(self.endpoint("statistics"))).await
    }

    async fn create_project(
        &self,
        draft: &NewProject,
        token: &CorrelationToken,
    ) -> Result<Project> {
        let request = self.client.post(self.endpoint("projects"));
        Self::request_json(self.write(request, draft, None, token)).await
    }

    async fn create_issue(
        &self,
        draft: &NewIssue,
        creator: &UserId,
        token: &CorrelationToken,
    ) -> Result<Issue> {
        let request = self.client.post(self.endpoint("issues"));
        Self::request_json(self.write(request, draft, Some(creator), token)).await
    }

    async fn update_issue(
        &self,
        id: &IssueId,
        update: &IssueUpdate,
        token: &CorrelationToken,
    ) -> Result<Issue> {
        let request = self.client.put(self.endpoint(&format!("issues/{id}")));
        Self::request_json(self.write(request, update, None, token)).await
    }

    async fn delete_issue(&self, id: &IssueId, token: &CorrelationToken) -> Result<()> {
        let request = self
            .client
            .delete(self.endpoint(&format!("issues/{id}")))
            .header(CORRELATION_HEADER, token.as_str());
        let (status, body) = Self::send(request).await?;
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(Error::Server {
                status: status.as_u16(),
                message: body,
            })
        }
    }

    async fn add_comment(
        &self,
        issue: &IssueId,
        draft: &NewComment,
        token: &CorrelationToken,
    ) -> Result<Comment> {
        let request = self
            .client
            .post(self.endpoint(&format!("issues/{issue}/comments")));
        Self::request_json(self.write(request, draft, None, token)).await
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<ChannelEvent>> {
        let Some(ws_url) = &self.config.ws_url else {
            return Err(Error::Config(
                "remote.ws_url is not configured; real-time sync is unavailable".to_string(),
            ));
        };
        Ok(spawn_subscription(
            ws_url.clone(),
            self.config.reconnect.backoff(),
        ))
    }
}

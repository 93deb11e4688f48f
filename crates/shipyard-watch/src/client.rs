//! REST client for the platform's activity log.

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use shipyard_core::{
    AccessToken, ActivitiesService, Activity, ActivityFilter, Error, PlatformContext, RemoteFault,
    Result,
};

/// Lists activities from `GET /projects/{project}/activities`.
pub struct ActivitiesClient {
    http: reqwest::Client,
    base_url: String,
    token: AccessToken,
}

impl ActivitiesClient {
    /// Client for the API of the platform in `context`.
    pub fn new(context: &PlatformContext, user_agent: &str) -> Result<Self> {
        Self::with_base_url(
            context.api_url(),
            context.token.clone(),
            context.skip_tls_verify,
            user_agent,
        )
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        token: AccessToken,
        skip_tls_verify: bool,
        user_agent: &str,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .danger_accept_invalid_certs(skip_tls_verify)
            .build()
            .map_err(|e| Error::Internal(format!("can't create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }
}

#[async_trait]
impl ActivitiesService for ActivitiesClient {
    async fn list(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        filter: &ActivityFilter,
    ) -> Result<Vec<Activity>> {
        let url = format!("{}/projects/{}/activities", self.base_url, project_id);
        let mut request = self.http.get(&url).bearer_auth(self.token.expose());
        if let Some(group_uid) = &filter.group_uid {
            request = request.query(&[("groupUid", group_uid.as_str())]);
        }

        debug!(url = %url, "Listing activities");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            response = request.send() => response
                .map_err(|e| Error::Internal(format!("activities request failed: {}", e)))?,
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("activities for project {}", project_id)));
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::InvalidCredentials);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<RemoteFault>(&body) {
                Ok(fault) if !fault.message.is_empty() => Error::Remote(fault),
                _ => Error::Internal(format!("activities request returned {}", status)),
            });
        }

        response
            .json::<Vec<Activity>>()
            .await
            .map_err(|e| Error::Internal(format!("malformed activities response: {}", e)))
    }
}

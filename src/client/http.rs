//! HTTP implementation of the service client traits
//!
//! Talks to the query service's REST API with reqwest. All three
//! collaborator traits are implemented by one client sharing a
//! connection pool.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{ClientError, DatabaseProvisioner, ProvisioningClient, TransactionClient};
use crate::models::{EngineInfo, Problem, TransactionState};

/// Connection settings for the query service
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Base URL, e.g. `https://service.example.com`
    pub base_url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Bearer token, if the deployment requires one
    pub auth_token: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8010".to_string(),
            timeout_secs: 30,
            auth_token: None,
        }
    }
}

impl ServiceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

/// HTTP client for the query service REST API
#[derive(Clone)]
pub struct HttpServiceClient {
    client: Client,
    config: ServiceConfig,
}

#[derive(Serialize)]
struct CreateEngineBody<'a> {
    size: &'a str,
}

#[derive(Serialize)]
struct CreateDatabaseBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    clone_source: Option<&'a str>,
}

#[derive(Serialize)]
struct SubmitBody<'a> {
    database: &'a str,
    engine: &'a str,
    program: &'a str,
    readonly: bool,
}

#[derive(Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    state: TransactionState,
}

impl HttpServiceClient {
    pub fn new(config: ServiceConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self.client.request(method, self.url(path));
        if let Some(token) = &self.config.auth_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// Send a request and decode the JSON body, mapping 404 to
    /// `ClientError::NotFound`.
    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> Result<T, ClientError> {
        let response = self.check(builder, what).await?;
        response
            .json()
            .await
            .map_err(|e| ClientError::Transport(format!("decoding {what}: {e}")))
    }

    /// Send a request, returning the response only on success status.
    async fn check(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> Result<reqwest::Response, ClientError> {
        let response = builder
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status();
        debug!("{} -> {}", what, status);

        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Service {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ProvisioningClient for HttpServiceClient {
    async fn create_engine(&self, name: &str, size: &str) -> Result<(), ClientError> {
        let builder = self
            .request(Method::PUT, &format!("/engines/{name}"))
            .json(&CreateEngineBody { size });
        self.check(builder, &format!("create engine {name}")).await?;
        Ok(())
    }

    async fn get_engine(&self, name: &str) -> Result<EngineInfo, ClientError> {
        let builder = self.request(Method::GET, &format!("/engines/{name}"));
        self.send_json(builder, &format!("engine {name}")).await
    }

    async fn delete_engine(&self, name: &str) -> Result<(), ClientError> {
        let builder = self.request(Method::DELETE, &format!("/engines/{name}"));
        self.check(builder, &format!("delete engine {name}")).await?;
        Ok(())
    }
}

#[async_trait]
impl TransactionClient for HttpServiceClient {
    async fn submit_async(
        &self,
        database: &str,
        engine: &str,
        program: &str,
        readonly: bool,
        correlation_id: &str,
    ) -> Result<String, ClientError> {
        let builder = self
            .request(Method::POST, "/transactions")
            .header("x-correlation-id", correlation_id)
            .json(&SubmitBody {
                database,
                engine,
                program,
                readonly,
            });

        let response: SubmitResponse = self.send_json(builder, "submit transaction").await?;
        Ok(response.id)
    }

    async fn get_status(&self, transaction_id: &str) -> Result<TransactionState, ClientError> {
        let builder = self.request(Method::GET, &format!("/transactions/{transaction_id}"));
        let response: StatusResponse = self
            .send_json(builder, &format!("transaction {transaction_id}"))
            .await?;
        Ok(response.state)
    }

    async fn get_metadata(
        &self,
        transaction_id: &str,
    ) -> Result<serde_json::Value, ClientError> {
        let builder = self.request(
            Method::GET,
            &format!("/transactions/{transaction_id}/metadata"),
        );
        self.send_json(builder, &format!("metadata of {transaction_id}"))
            .await
    }

    async fn get_problems(&self, transaction_id: &str) -> Result<Vec<Problem>, ClientError> {
        let builder = self.request(
            Method::GET,
            &format!("/transactions/{transaction_id}/problems"),
        );
        self.send_json(builder, &format!("problems of {transaction_id}"))
            .await
    }

    async fn get_results(&self, transaction_id: &str) -> Result<serde_json::Value, ClientError> {
        let builder = self.request(
            Method::GET,
            &format!("/transactions/{transaction_id}/results"),
        );
        self.send_json(builder, &format!("results of {transaction_id}"))
            .await
    }

    async fn cancel(&self, transaction_id: &str) -> Result<(), ClientError> {
        let builder = self.request(
            Method::POST,
            &format!("/transactions/{transaction_id}/cancel"),
        );
        self.check(builder, &format!("cancel {transaction_id}"))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DatabaseProvisioner for HttpServiceClient {
    async fn create(&self, name: &str, clone_source: Option<&str>) -> Result<(), ClientError> {
        let builder = self
            .request(Method::PUT, &format!("/databases/{name}"))
            .json(&CreateDatabaseBody { clone_source });
        self.check(builder, &format!("create database {name}"))
            .await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), ClientError> {
        let builder = self.request(Method::DELETE, &format!("/databases/{name}"));
        self.check(builder, &format!("delete database {name}"))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_config_builder() {
        let config = ServiceConfig::new("https://svc.example.com/")
            .timeout(60)
            .auth_token("secret");

        assert_eq!(config.base_url, "https://svc.example.com/");
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.auth_token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let client =
            HttpServiceClient::new(ServiceConfig::new("https://svc.example.com/")).unwrap();
        assert_eq!(
            client.url("/engines/eng-1"),
            "https://svc.example.com/engines/eng-1"
        );
    }
}

//! JSON-over-HTTP gateway
//!
//! Endpoints, relative to the base URL:
//! - `POST templates/validate`
//! - `GET|POST|PUT stacks/{name}`
//! - `GET operations/{id}`
//! - `PUT functions/{name}/code`
//! - `PUT buckets/{bucket}/objects/{key}`
//!
//! The stack identity travels in `x-stackup-*` headers.

use super::{BundleRef, OperationHandle, StackGateway, Submission};
use crate::config::ResolvedConfig;
use crate::context::StartupContext;
use crate::error::{Error, Result};
use crate::stack::{RemoteStackState, StackIdentity, StackStatus};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Environment variable consulted when neither flag nor config names an endpoint
pub const GATEWAY_URL_ENV: &str = "STACKUP_GATEWAY_URL";

/// Config key holding the endpoint
pub const GATEWAY_URL_KEY: &str = "gateway.endpoint";

const NO_CHANGES_CODE: &str = "NoChanges";

/// Upper bound on any single request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct TemplateBody<'a> {
    template: &'a str,
}

#[derive(Serialize)]
struct StackBody<'a> {
    template: &'a str,
    capabilities: &'a [String],
}

#[derive(Serialize)]
struct CodeBody<'a> {
    bucket: &'a str,
    key: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationBody {
    operation_id: String,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub struct HttpGateway {
    base: Url,
    client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(base: Url, user_agent: &str) -> Self {
        Self {
            base,
            client: reqwest::Client::builder()
                .user_agent(user_agent)
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    /// Parse and validate an endpoint string
    pub fn parse_endpoint(raw: &str) -> Result<Url> {
        let url = Url::parse(raw.trim())
            .map_err(|e| Error::config("gateway endpoint", format!("'{}': {}", raw, e)))?;
        if url.cannot_be_a_base() {
            return Err(Error::config(
                "gateway endpoint",
                format!("'{}' cannot be used as a base URL", raw),
            ));
        }
        Ok(url)
    }

    /// Endpoint from the flag, else `gateway.endpoint`, else `STACKUP_GATEWAY_URL`
    pub fn resolve_endpoint(
        flag: Option<&str>,
        config: &ResolvedConfig,
        ctx: &StartupContext,
    ) -> Result<Option<Url>> {
        let raw = flag
            .or_else(|| config.get_str(GATEWAY_URL_KEY))
            .or_else(|| ctx.env_var(GATEWAY_URL_ENV))
            .filter(|raw| !raw.trim().is_empty());
        raw.map(Self::parse_endpoint).transpose()
    }

    /// Append path segments to the base URL, escaping each one
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::gateway(format!("URL cannot have path segments: {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn with_identity(request: RequestBuilder, identity: &StackIdentity) -> RequestBuilder {
        let mut request = request;
        if let Some(region) = &identity.region {
            request = request.header("x-stackup-region", region);
        }
        if let Some(profile) = &identity.profile {
            request = request.header("x-stackup-profile", profile);
        }
        if let Some(role) = &identity.role {
            request = request.header("x-stackup-role", role);
        }
        request
    }

    async fn send(request: RequestBuilder, what: &str) -> Result<Response> {
        request
            .send()
            .await
            .map_err(|e| Error::gateway(format!("Failed to {}: {}", what, e)))
    }

    /// Turn a non-success response into an error carrying the remote message
    async fn failure(response: Response, what: &str) -> Error {
        let status = response.status();
        let body = response.json::<ErrorBody>().await.unwrap_or_default();
        match body.message {
            Some(message) => Error::gateway(message),
            None => Error::gateway(format!("Failed to {}: HTTP {}", what, status)),
        }
    }

    async fn expect_success(response: Response, what: &str) -> Result<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::failure(response, what).await)
        }
    }

    async fn json<T: serde::de::DeserializeOwned>(response: Response, what: &str) -> Result<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| Error::gateway(format!("Failed to read {} response: {}", what, e)))
    }
}

#[async_trait]
impl StackGateway for HttpGateway {
    async fn validate_template(&self, identity: &StackIdentity, text: &str) -> Result<()> {
        let what = "validate template";
        let url = self.url(&["templates", "validate"])?;
        let request = Self::with_identity(self.client.post(url), identity)
            .json(&TemplateBody { template: text });
        Self::expect_success(Self::send(request, what).await?, what).await?;
        Ok(())
    }

    async fn describe_stack(&self, identity: &StackIdentity) -> Result<RemoteStackState> {
        let what = "describe stack";
        let url = self.url(&["stacks", &identity.stack_name])?;
        let response = Self::send(Self::with_identity(self.client.get(url), identity), what).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(RemoteStackState::Absent);
        }
        let response = Self::expect_success(response, what).await?;
        let status: StackStatus = Self::json(response, what).await?;
        tracing::debug!(stack = %identity.stack_name, status = %status, "Described stack");
        Ok(status.classify())
    }

    async fn create_stack(
        &self,
        identity: &StackIdentity,
        text: &str,
        capabilities: &[String],
    ) -> Result<OperationHandle> {
        let what = "create stack";
        let url = self.url(&["stacks", &identity.stack_name])?;
        let request = Self::with_identity(self.client.post(url), identity).json(&StackBody {
            template: text,
            capabilities,
        });
        let response = Self::expect_success(Self::send(request, what).await?, what).await?;
        let body: OperationBody = Self::json(response, what).await?;
        Ok(OperationHandle {
            stack_name: identity.stack_name.clone(),
            id: body.operation_id,
        })
    }

    async fn update_stack(
        &self,
        identity: &StackIdentity,
        text: &str,
        capabilities: &[String],
    ) -> Result<Submission> {
        let what = "update stack";
        let url = self.url(&["stacks", &identity.stack_name])?;
        let request = Self::with_identity(self.client.put(url), identity).json(&StackBody {
            template: text,
            capabilities,
        });
        let response = Self::send(request, what).await?;

        if response.status() == StatusCode::CONFLICT {
            let status = response.status();
            let body = response.json::<ErrorBody>().await.unwrap_or_default();
            if body.code.as_deref() == Some(NO_CHANGES_CODE) {
                return Ok(Submission::NoChanges);
            }
            return Err(Error::gateway(body.message.unwrap_or_else(|| {
                format!("Failed to {}: HTTP {}", what, status)
            })));
        }

        let response = Self::expect_success(response, what).await?;
        let body: OperationBody = Self::json(response, what).await?;
        Ok(Submission::Started(OperationHandle {
            stack_name: identity.stack_name.clone(),
            id: body.operation_id,
        }))
    }

    async fn operation_status(&self, handle: &OperationHandle) -> Result<StackStatus> {
        let what = "read operation status";
        let url = self.url(&["operations", &handle.id])?;
        let response = Self::expect_success(Self::send(self.client.get(url), what).await?, what).await?;
        Self::json(response, what).await
    }

    async fn update_function_code(
        &self,
        identity: &StackIdentity,
        function_name: &str,
        bundle: &BundleRef,
    ) -> Result<()> {
        let what = "update function code";
        let url = self.url(&["functions", function_name, "code"])?;
        let request = Self::with_identity(self.client.put(url), identity).json(&CodeBody {
            bucket: &bundle.bucket,
            key: &bundle.key,
        });
        Self::expect_success(Self::send(request, what).await?, what).await?;
        Ok(())
    }

    async fn upload_artifact(
        &self,
        identity: &StackIdentity,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<()> {
        let what = "upload artifact";
        let url = self.url(&["buckets", bucket, "objects", key])?;
        let request = Self::with_identity(self.client.put(url), identity)
            .header("content-type", "application/zip")
            .body(bytes);
        Self::expect_success(Self::send(request, what).await?, what).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(base: &str) -> HttpGateway {
        HttpGateway::new(HttpGateway::parse_endpoint(base).unwrap(), "stackup-test")
    }

    #[test]
    fn test_url_building_escapes_segments() {
        let gw = gateway("https://deploy.example.com/api/");
        let url = gw.url(&["buckets", "b", "objects", "orders-prod/lambdas/abc/api.zip"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://deploy.example.com/api/buckets/b/objects/orders-prod%2Flambdas%2Fabc%2Fapi.zip"
        );
    }

    #[test]
    fn test_url_building_without_trailing_slash() {
        let gw = gateway("http://localhost:8080/v1");
        assert_eq!(
            gw.url(&["stacks", "orders"]).unwrap().as_str(),
            "http://localhost:8080/v1/stacks/orders"
        );
    }

    #[test]
    fn test_endpoint_precedence() {
        let cfg = ResolvedConfig::from_value(serde_json::json!({
            "gateway": {"endpoint": "https://from-config.example.com"}
        }))
        .unwrap();
        let mut env = std::collections::BTreeMap::new();
        env.insert(GATEWAY_URL_ENV.to_string(), "https://from-env.example.com".to_string());
        let ctx = StartupContext::new("/", env);

        let flag = HttpGateway::resolve_endpoint(Some("https://flag.example.com"), &cfg, &ctx).unwrap();
        assert_eq!(flag.unwrap().host_str(), Some("flag.example.com"));

        let from_cfg = HttpGateway::resolve_endpoint(None, &cfg, &ctx).unwrap();
        assert_eq!(from_cfg.unwrap().host_str(), Some("from-config.example.com"));

        let from_env = HttpGateway::resolve_endpoint(None, &ResolvedConfig::default(), &ctx).unwrap();
        assert_eq!(from_env.unwrap().host_str(), Some("from-env.example.com"));

        let none = HttpGateway::resolve_endpoint(
            None,
            &ResolvedConfig::default(),
            &StartupContext::new("/", Default::default()),
        )
        .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_parse_endpoint_rejects_garbage() {
        assert!(HttpGateway::parse_endpoint("not a url").is_err());
        assert!(HttpGateway::parse_endpoint("mailto:ops@example.com").is_err());
    }
}

//! GraphQL transport for the remote control plane
//!
//! Every operation is one POST carrying `{query, variables}`; the reply
//! carries `data` plus an `errors` array. A reply with any errors fails
//! the whole call, aggregating every message so multi-cause failures are
//! not reported one at a time.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use brokkr_core::config::RemoteConfig;
use brokkr_core::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

/// Client for one remote control plane endpoint
pub struct GraphqlClient {
    http: reqwest::Client,
    endpoint: Url,
    api_token: Option<String>,
}

impl GraphqlClient {
    pub fn new(remote: &RemoteConfig) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()?,
            endpoint: remote.endpoint.clone(),
            api_token: remote.api_token.clone(),
        })
    }

    /// Execute one operation. `intent` is the human phrasing used when the
    /// remote reports errors ("install dbms", "list dbmss").
    pub async fn execute(&self, intent: &str, query: &str, variables: Value) -> Result<Value> {
        debug!("Remote call: {intent}");
        let mut request = self
            .http
            .post(self.endpoint.clone())
            .json(&serde_json::json!({ "query": query, "variables": variables }));
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response: GraphqlResponse = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !response.errors.is_empty() {
            return Err(Error::remote(
                format!("Unable to {intent}"),
                response.errors.into_iter().map(|e| e.message).collect(),
            ));
        }
        response.data.ok_or_else(|| {
            Error::remote(
                format!("Unable to {intent}"),
                vec!["remote reply carried no data".to_string()],
            )
        })
    }

    /// Execute one operation and pull a single named field out of `data`
    pub async fn execute_field<T: DeserializeOwned>(
        &self,
        intent: &str,
        query: &str,
        variables: Value,
        field: &str,
    ) -> Result<T> {
        let mut data = self.execute(intent, query, variables).await?;
        let value = data
            .get_mut(field)
            .map(Value::take)
            .filter(|v| !v.is_null())
            .ok_or_else(|| {
                Error::remote(
                    format!("Unable to {intent}"),
                    vec![format!("remote reply carried no '{field}' field")],
                )
            })?;
        Ok(serde_json::from_value(value)?)
    }
}

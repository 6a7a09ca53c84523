//! JSON-RPC client for the bundler's debug namespace.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{mempool::PendingOpSource, userop::UserOperation};

/// Timeout applied to every bundler request.
pub const BUNDLER_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const DUMP_MEMPOOL: &str = "debug_bundler_dumpMempool";
const ADD_USER_OPS: &str = "debug_bundler_addUserOps";

/// Error returned by [`BundlerClient`].
#[derive(Debug, Error)]
pub enum BundlerClientError {
    /// The request could not be sent or the body could not be read.
    #[error("{method} request failed")]
    Transport {
        /// RPC method.
        method: &'static str,
        /// Underlying http error.
        #[source]
        source: reqwest::Error,
    },

    /// The bundler answered with a non-200 status.
    #[error("{method} failed with status code {status}")]
    Status {
        /// RPC method.
        method: &'static str,
        /// Status returned.
        status: StatusCode,
    },

    /// The bundler answered with a JSON-RPC error object.
    #[error("{method} returned error {code}: {message}")]
    Rpc {
        /// RPC method.
        method: &'static str,
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// The response body was not the expected shape.
    #[error("{method} returned an invalid response: {reason}")]
    InvalidResponse {
        /// RPC method.
        method: &'static str,
        /// What was wrong.
        reason: String,
    },

    /// Adding an empty operation list was requested.
    #[error("cannot add an empty list of user operations")]
    EmptyUserOps,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Client for a bundler's `debug_bundler_*` methods.
///
/// Request ids start at 1 and increase by one per request.
#[derive(Debug)]
pub struct BundlerClient {
    http: Client,
    url: Url,
    next_id: AtomicU64,
}

impl BundlerClient {
    /// Creates a client for the bundler at `url`.
    pub fn new(url: Url) -> Result<Self, BundlerClientError> {
        let http = Client::builder()
            .timeout(BUNDLER_REQUEST_TIMEOUT)
            .build()
            .map_err(|source| BundlerClientError::Transport { method: "connect", source })?;
        Ok(Self { http, url, next_id: AtomicU64::new(1) })
    }

    /// Bundler endpoint.
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Returns every operation waiting in the bundler's mempool.
    pub async fn dump_mempool(&self) -> Result<Vec<UserOperation>, BundlerClientError> {
        self.request(DUMP_MEMPOOL, json!([])).await
    }

    /// Injects operations into the bundler's mempool without validation.
    pub async fn add_user_ops(&self, ops: &[UserOperation]) -> Result<String, BundlerClientError> {
        if ops.is_empty() {
            return Err(BundlerClientError::EmptyUserOps);
        }
        self.request(ADD_USER_OPS, json!([ops])).await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<T, BundlerClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(url = %self.url, method, id, "bundler request");

        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        let response = self
            .http
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|source| BundlerClientError::Transport { method, source })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(BundlerClientError::Status { method, status });
        }

        let response: RpcResponse = response
            .json()
            .await
            .map_err(|source| BundlerClientError::Transport { method, source })?;
        if let Some(error) = response.error {
            let RpcErrorObject { code, message } = error;
            return Err(BundlerClientError::Rpc { method, code, message });
        }

        let result = response.result.ok_or_else(|| BundlerClientError::InvalidResponse {
            method,
            reason: "missing result".to_string(),
        })?;
        serde_json::from_value(result).map_err(|e| BundlerClientError::InvalidResponse {
            method,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl PendingOpSource for BundlerClient {
    async fn pending_ops(&self) -> Result<Vec<UserOperation>, BundlerClientError> {
        self.dump_mempool().await
    }
}

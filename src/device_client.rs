use crate::{
    config::ClientConfig,
    http_client::{device_http_client, handle_http_response, transport_error},
    types::{Color, Endpoint, PowerState},
};
use anyhow::Result;
use log::{info, warn};
#[cfg(feature = "mock")]
use mockall::automock;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use trait_variant::make;

/// Failure of a single device request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientError {
    /// Connection refused, timeout, non-2xx status or any other transport failure
    Unreachable(String),
    /// The body does not parse per protocol
    MalformedPayload(String),
    /// Caller supplied out-of-range values, no request was sent
    InvalidInput(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Unreachable(reason) => write!(f, "device unreachable: {reason}"),
            ClientError::MalformedPayload(reason) => write!(f, "malformed payload: {reason}"),
            ClientError::InvalidInput(reason) => write!(f, "invalid input: {reason}"),
        }
    }
}

impl std::error::Error for ClientError {}

/// How missing fields in a color payload are treated
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorParsePolicy {
    /// Missing components are read as 0
    #[default]
    Lenient,
    /// Missing components are a [`ClientError::MalformedPayload`]
    Strict,
}

#[make(Send)]
#[cfg_attr(feature = "mock", automock)]
pub trait PixelClient {
    async fn probe_root(&self, endpoint: &Endpoint) -> Result<String, ClientError>;
    async fn get_status(&self, endpoint: &Endpoint) -> Result<PowerState, ClientError>;
    async fn get_color(&self, endpoint: &Endpoint) -> Result<Color, ClientError>;
    async fn set_power(&self, endpoint: &Endpoint, on: bool) -> Result<(), ClientError>;
    async fn set_color(&self, endpoint: &Endpoint, color: Color) -> Result<(), ClientError>;
}

#[derive(Deserialize)]
struct ColorPayload {
    r: Option<u8>,
    g: Option<u8>,
    b: Option<u8>,
}

/// [`PixelClient`] speaking the strip's HTTP protocol
#[derive(Clone)]
pub struct HttpPixelClient {
    client: Client,
    color_policy: ColorParsePolicy,
}

impl HttpPixelClient {
    // API endpoint constants
    const ROOT_ENDPOINT: &str = "/";
    const STATUS_ENDPOINT: &str = "/strip/status/";
    const STATUS_ON_ENDPOINT: &str = "/strip/status/on/";
    const STATUS_OFF_ENDPOINT: &str = "/strip/status/off/";
    const COLOR_ENDPOINT: &str = "/strip/color/";

    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = device_http_client(config.request_timeout)?;

        Ok(HttpPixelClient {
            client,
            color_policy: config.color_policy,
        })
    }

    /// GET request, returns the body
    async fn get(&self, endpoint: &Endpoint, path: &str) -> Result<String, ClientError> {
        let url = endpoint.url(path);
        info!("GET {url}");

        let context_msg = format!("GET {url}");
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(&context_msg, e))?;

        handle_http_response(res, &context_msg).await
    }

    /// PUT request with empty body
    async fn put(&self, endpoint: &Endpoint, path: &str) -> Result<(), ClientError> {
        let url = endpoint.url(path);
        info!("PUT {url}");

        let context_msg = format!("PUT {url}");
        let res = self
            .client
            .put(&url)
            .send()
            .await
            .map_err(|e| transport_error(&context_msg, e))?;

        handle_http_response(res, &context_msg).await.map(|_| ())
    }

    /// PUT request with JSON body
    async fn put_json(
        &self,
        endpoint: &Endpoint,
        path: &str,
        body: &(impl fmt::Debug + serde::Serialize + Sync),
    ) -> Result<(), ClientError> {
        let url = endpoint.url(path);
        info!("PUT {url} with body: {body:?}");

        let context_msg = format!("PUT {url}");
        let res = self
            .client
            .put(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(&context_msg, e))?;

        handle_http_response(res, &context_msg).await.map(|_| ())
    }
}

impl PixelClient for HttpPixelClient {
    async fn probe_root(&self, endpoint: &Endpoint) -> Result<String, ClientError> {
        self.get(endpoint, Self::ROOT_ENDPOINT).await
    }

    async fn get_status(&self, endpoint: &Endpoint) -> Result<PowerState, ClientError> {
        parse_status(&self.get(endpoint, Self::STATUS_ENDPOINT).await?)
    }

    async fn get_color(&self, endpoint: &Endpoint) -> Result<Color, ClientError> {
        parse_color(
            &self.get(endpoint, Self::COLOR_ENDPOINT).await?,
            self.color_policy,
        )
    }

    async fn set_power(&self, endpoint: &Endpoint, on: bool) -> Result<(), ClientError> {
        let path = if on {
            Self::STATUS_ON_ENDPOINT
        } else {
            Self::STATUS_OFF_ENDPOINT
        };
        self.put(endpoint, path).await
    }

    async fn set_color(&self, endpoint: &Endpoint, color: Color) -> Result<(), ClientError> {
        self.put_json(endpoint, Self::COLOR_ENDPOINT, &color).await
    }
}

/// Parse the body of `GET /strip/status/`
///
/// Anything but `ON` or `OFF` means we are not talking to a strip and is
/// reported as [`ClientError::Unreachable`].
pub fn parse_status(body: &str) -> Result<PowerState, ClientError> {
    match body.trim() {
        "ON" => Ok(PowerState::On),
        "OFF" => Ok(PowerState::Off),
        other => Err(ClientError::Unreachable(format!(
            "unexpected status payload: {other:?}"
        ))),
    }
}

/// Parse the body of `GET /strip/color/`
pub fn parse_color(body: &str, policy: ColorParsePolicy) -> Result<Color, ClientError> {
    let payload: ColorPayload = serde_json::from_str(body)
        .map_err(|e| ClientError::MalformedPayload(format!("failed to parse color: {e}")))?;

    let component = |name: &str, value: Option<u8>| match (value, policy) {
        (Some(value), _) => Ok(value),
        (None, ColorParsePolicy::Lenient) => {
            warn!("color payload misses field {name}, assuming 0");
            Ok(0)
        }
        (None, ColorParsePolicy::Strict) => Err(ClientError::MalformedPayload(format!(
            "color payload misses field {name}"
        ))),
    };

    Ok(Color::new(
        component("r", payload.r)?,
        component("g", payload.g)?,
        component("b", payload.b)?,
    ))
}

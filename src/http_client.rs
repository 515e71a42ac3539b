use crate::device_client::ClientError;
use anyhow::{Context, Result, ensure};
use reqwest::{Client, Response};
use std::time::Duration;

/// Create the HTTP client used to talk to the LED strip
///
/// Every request made with the returned client is bounded by `timeout`,
/// connection establishment included.
///
/// # Arguments
/// * `timeout` - Upper bound for a single request, must not be zero
///
/// # Examples
/// ```no_run
/// use pixel_remote::http_client::device_http_client;
/// use std::time::Duration;
///
/// let client = device_http_client(Duration::from_secs(5))
///     .expect("failed to create client");
/// ```
pub fn device_http_client(timeout: Duration) -> Result<Client> {
    ensure!(
        !timeout.is_zero(),
        "failed since request timeout must not be zero"
    );

    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .context("failed to create device HTTP client")
}

/// Map a transport error to [`ClientError::Unreachable`]
pub fn transport_error(context_msg: &str, error: reqwest::Error) -> ClientError {
    if error.is_timeout() {
        ClientError::Unreachable(format!("{context_msg} timed out"))
    } else {
        ClientError::Unreachable(format!("{context_msg} failed: {error}"))
    }
}

/// Handle HTTP response by checking status and extracting body
///
/// # Arguments
/// * `res` - The HTTP response to handle
/// * `context_msg` - Context message describing the request (e.g., "GET http://...")
///
/// # Returns
/// * `Ok(String)` - The response body if the status is successful
/// * `Err(ClientError::Unreachable)` - If the status is not successful or reading the body fails
pub async fn handle_http_response(res: Response, context_msg: &str) -> Result<String, ClientError> {
    let status = res.status();
    let body = res
        .text()
        .await
        .map_err(|e| transport_error(&format!("{context_msg} reading body"), e))?;

    if !status.is_success() {
        return Err(ClientError::Unreachable(format!(
            "{context_msg} failed with status {status} and body: {body}"
        )));
    }

    Ok(body)
}

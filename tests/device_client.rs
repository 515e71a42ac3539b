use pixel_remote::{
    config::ClientConfig,
    device_client::{ClientError, ColorParsePolicy, HttpPixelClient, PixelClient},
    types::{Color, Endpoint, PowerState},
};
use std::{
    net::Ipv4Addr,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// What the mock strip answers
#[derive(Clone)]
enum Behavior {
    /// Stateful strip implementing the control protocol
    Strip,
    /// Same status and body for every request
    Fixed(u16, &'static str),
    /// Accept connections but never answer
    Silent,
}

#[derive(Default)]
struct StripState {
    on: bool,
    color: (u8, u8, u8),
    last_body: Option<String>,
}

struct MockStrip {
    endpoint: Endpoint,
    state: Arc<Mutex<StripState>>,
    server: JoinHandle<()>,
}

impl Drop for MockStrip {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn start_mock_strip(behavior: Behavior) -> MockStrip {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("failed to bind mock strip");
    let port = listener.local_addr().expect("no local address").port();
    let state = Arc::new(Mutex::new(StripState::default()));
    let server_state = state.clone();

    let server = tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let behavior = behavior.clone();
            let state = server_state.clone();

            tokio::spawn(async move {
                let _ = serve(stream, behavior, state).await;
            });
        }
    });

    MockStrip {
        endpoint: Endpoint::new(Ipv4Addr::LOCALHOST, port).expect("invalid port"),
        state,
        server,
    }
}

async fn serve(
    mut stream: TcpStream,
    behavior: Behavior,
    state: Arc<Mutex<StripState>>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(&mut stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    // Read HTTP headers
    let mut content_length = 0;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        if line.trim().is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    let mut body = vec![0; content_length];
    reader.read_exact(&mut body).await?;
    let body = String::from_utf8_lossy(&body).to_string();

    let (status, response_body) = match behavior {
        Behavior::Silent => {
            tokio::time::sleep(Duration::from_secs(60)).await;
            return Ok(());
        }
        Behavior::Fixed(status, body) => (status, body.to_string()),
        Behavior::Strip => route(&method, &path, body, &state),
    };

    let reason = if status == 200 { "OK" } else { "Not Found" };
    let http_response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\n\
         Connection: close\r\n\r\n{response_body}",
        response_body.len()
    );

    stream.write_all(http_response.as_bytes()).await?;
    stream.shutdown().await
}

fn route(method: &str, path: &str, body: String, state: &Mutex<StripState>) -> (u16, String) {
    let mut state = state.lock().unwrap();

    match (method, path) {
        ("GET", "/") => (200, "Hello from Arduino Server".to_string()),
        ("GET", "/strip/status/") => (200, if state.on { "ON" } else { "OFF" }.to_string()),
        ("PUT", "/strip/status/on/") => {
            state.on = true;
            (200, String::new())
        }
        ("PUT", "/strip/status/off/") => {
            state.on = false;
            (200, String::new())
        }
        ("GET", "/strip/color/") => {
            let (r, g, b) = state.color;
            (200, format!(r#"{{"r":{r},"g":{g},"b":{b}}}"#))
        }
        ("PUT", "/strip/color/") => {
            let value: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
            let component = |name: &str| value[name].as_u64().unwrap_or(0) as u8;
            state.color = (component("r"), component("g"), component("b"));
            state.last_body = Some(body);
            (200, String::new())
        }
        _ => (404, String::new()),
    }
}

fn client(policy: ColorParsePolicy) -> HttpPixelClient {
    client_with_timeout(policy, Duration::from_secs(2))
}

fn client_with_timeout(policy: ColorParsePolicy, request_timeout: Duration) -> HttpPixelClient {
    HttpPixelClient::new(&ClientConfig {
        request_timeout,
        color_policy: policy,
    })
    .expect("failed to create client")
}

#[tokio::test]
async fn root_probe_returns_banner() {
    let strip = start_mock_strip(Behavior::Strip).await;

    let banner = client(ColorParsePolicy::Lenient)
        .probe_root(&strip.endpoint)
        .await
        .unwrap();

    assert_eq!(banner, "Hello from Arduino Server");
}

#[tokio::test]
async fn power_commands_change_reported_status() {
    let strip = start_mock_strip(Behavior::Strip).await;
    let client = client(ColorParsePolicy::Lenient);

    client.set_power(&strip.endpoint, true).await.unwrap();
    assert_eq!(
        client.get_status(&strip.endpoint).await.unwrap(),
        PowerState::On
    );

    client.set_power(&strip.endpoint, false).await.unwrap();
    assert_eq!(
        client.get_status(&strip.endpoint).await.unwrap(),
        PowerState::Off
    );
}

#[tokio::test]
async fn color_is_sent_as_compact_json() {
    let strip = start_mock_strip(Behavior::Strip).await;
    let client = client(ColorParsePolicy::Strict);

    client
        .set_color(&strip.endpoint, Color::new(10, 20, 30))
        .await
        .unwrap();

    assert_eq!(
        strip.state.lock().unwrap().last_body.as_deref(),
        Some(r#"{"r":10,"g":20,"b":30}"#)
    );
    assert_eq!(
        client.get_color(&strip.endpoint).await.unwrap(),
        Color::new(10, 20, 30)
    );
}

#[tokio::test]
async fn unexpected_status_payload_is_unreachable() {
    let strip = start_mock_strip(Behavior::Fixed(200, "<html>login</html>")).await;

    let result = client(ColorParsePolicy::Lenient)
        .get_status(&strip.endpoint)
        .await;

    assert!(matches!(result, Err(ClientError::Unreachable(_))));
}

#[tokio::test]
async fn partial_color_follows_parse_policy() {
    let strip = start_mock_strip(Behavior::Fixed(200, r#"{"r":7}"#)).await;

    let lenient = client(ColorParsePolicy::Lenient)
        .get_color(&strip.endpoint)
        .await;
    let strict = client(ColorParsePolicy::Strict)
        .get_color(&strip.endpoint)
        .await;

    assert_eq!(lenient, Ok(Color::new(7, 0, 0)));
    assert!(matches!(strict, Err(ClientError::MalformedPayload(_))));
}

#[tokio::test]
async fn not_found_is_unreachable() {
    let strip = start_mock_strip(Behavior::Fixed(404, "")).await;

    let result = client(ColorParsePolicy::Lenient)
        .set_power(&strip.endpoint, true)
        .await;

    assert!(matches!(result, Err(ClientError::Unreachable(_))));
}

#[tokio::test]
async fn refused_connection_is_unreachable() {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let endpoint = Endpoint::new(Ipv4Addr::LOCALHOST, port).unwrap();

    let result = client(ColorParsePolicy::Lenient).probe_root(&endpoint).await;

    assert!(matches!(result, Err(ClientError::Unreachable(_))));
}

#[tokio::test]
async fn silent_device_times_out() {
    let strip = start_mock_strip(Behavior::Silent).await;
    let client = client_with_timeout(ColorParsePolicy::Lenient, Duration::from_millis(200));

    let started = std::time::Instant::now();
    let result = client.get_status(&strip.endpoint).await;

    assert!(matches!(result, Err(ClientError::Unreachable(_))));
    assert!(started.elapsed() < Duration::from_secs(5));
}

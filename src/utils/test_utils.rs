use crate::core::app::ui_state::UiState;
use crate::core::app::{App, SessionContext};
use crate::core::config::{ApiSettings, RateLimitConfig};
use crate::core::persist::MemoryStore;
use crate::core::store::ThreadStore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub fn test_settings(base_url: &str) -> ApiSettings {
    ApiSettings {
        endpoint: Some(base_url.to_string()),
        deployment: Some("test-deployment".to_string()),
        api_key: Some("test-key".to_string()),
        api_version: "2023-05-15".to_string(),
        model: "test-model".to_string(),
    }
}

pub fn create_test_app() -> App {
    create_test_app_with(test_settings("http://127.0.0.1:9"))
}

pub fn create_test_app_with(settings: ApiSettings) -> App {
    App::from_parts(
        SessionContext::with_settings(settings, RateLimitConfig::default(), None),
        ThreadStore::load(Box::new(MemoryStore::new())),
        UiState::new_basic(true, true),
    )
}

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

pub fn header_value(request: &CapturedRequest, name: &str) -> Option<String> {
    request
        .headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.clone())
}

/// 200 response streaming one `data:` record per payload.
pub fn sse_response(payloads: &[&str]) -> String {
    let mut response = String::from(
        "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n",
    );
    for payload in payloads {
        response.push_str("data: ");
        response.push_str(payload);
        response.push_str("\n\n");
    }
    response
}

pub fn status_response(status_line: &str, headers: &[(&str, &str)], body: &str) -> String {
    let mut response = format!("HTTP/1.1 {status_line}\r\n");
    for (name, value) in headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    response.push_str(&format!(
        "Content-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    ));
    response
}

/// Serve one canned response per connection, in order, and hand back what
/// each request looked like.
pub async fn spawn_mock_server<R>(responses: Vec<R>) -> (String, JoinHandle<Vec<CapturedRequest>>)
where
    R: AsRef<[u8]> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("local addr should resolve");

    let handle = tokio::spawn(async move {
        let mut captured = Vec::new();
        for response in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            match read_http_request(&mut stream).await {
                Ok(request) => captured.push(request),
                Err(_) => break,
            }
            let _ = stream.write_all(response.as_ref()).await;
            let _ = stream.shutdown().await;
        }
        captured
    });

    (format!("http://{addr}"), handle)
}

async fn read_http_request(stream: &mut TcpStream) -> Result<CapturedRequest, String> {
    let mut buffer = Vec::new();
    let mut header_end = None;
    while header_end.is_none() {
        let mut chunk = [0_u8; 1024];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP headers".to_string());
        }
        buffer.extend_from_slice(&chunk[..read]);
        header_end = buffer
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .map(|index| index + 4);
    }

    let header_end = header_end.ok_or("missing header terminator")?;
    let header_text =
        std::str::from_utf8(&buffer[..header_end]).map_err(|err| err.to_string())?;
    let mut lines = header_text.split("\r\n").filter(|line| !line.is_empty());
    let request_line = lines
        .next()
        .ok_or_else(|| "Missing HTTP request line".to_string())?
        .to_string();

    let mut headers = Vec::new();
    let mut content_length = 0_usize;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().map_err(|err| err.to_string())?;
        }
        headers.push((name.to_string(), value));
    }

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let mut chunk = vec![0_u8; content_length - body.len()];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP body".to_string());
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok(CapturedRequest {
        request_line,
        headers,
        body,
    })
}

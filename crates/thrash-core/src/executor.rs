use anyhow::Result;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

/// One unit of work on the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub id: u64,
}

/// Outcome of one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub url: String,
    pub id: u64,
    pub duration: Duration,
    pub pass: bool,
}

/// Statuses counted as a successful request.
pub fn is_passing_status(status: u16) -> bool {
    status == 200 || status == 304
}

/// Trait for the transport that performs a GET. `Ok` carries the HTTP status
/// once the body has been consumed; `Err` is a transport failure.
pub trait Fetcher: Send + Sync {
    fn name(&self) -> &'static str;

    fn get<'a>(&'a self, url: &'a str) -> Pin<Box<dyn Future<Output = Result<u16>> + Send + 'a>>;
}

/// Execute a single request. Never fails: transport errors and bad statuses
/// both come back as a `Response` with `pass == false`.
pub async fn execute(fetcher: &dyn Fetcher, req: Request) -> Response {
    let start = Instant::now();
    let outcome = fetcher.get(&req.url).await;
    let duration = start.elapsed();

    let pass = match outcome {
        Ok(status) => is_passing_status(status),
        Err(e) => {
            warn!("Request {} to {} failed: {:#}", req.id, req.url, e);
            false
        }
    };

    Response {
        url: req.url,
        id: req.id,
        duration,
        pass,
    }
}

/// What a `MockFetcher` answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOutcome {
    Status(u16),
    TransportError,
}

/// Mock fetcher for dry runs and tests (fixed delay, fixed outcome)
pub struct MockFetcher {
    delay_ms: u64,
    outcome: MockOutcome,
}

impl MockFetcher {
    /// Always answers 200 after `delay_ms`.
    pub fn new(delay_ms: u64) -> Self {
        Self::with_outcome(delay_ms, MockOutcome::Status(200))
    }

    pub fn with_outcome(delay_ms: u64, outcome: MockOutcome) -> Self {
        Self { delay_ms, outcome }
    }
}

impl Fetcher for MockFetcher {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn get<'a>(&'a self, _url: &'a str) -> Pin<Box<dyn Future<Output = Result<u16>> + Send + 'a>> {
        Box::pin(async move {
            sleep(Duration::from_millis(self.delay_ms)).await;

            match self.outcome {
                MockOutcome::Status(status) => Ok(status),
                MockOutcome::TransportError => anyhow::bail!("simulated transport failure"),
            }
        })
    }
}

/// GETs over a shared reqwest connection pool.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms.max(1)))
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn name(&self) -> &'static str {
        "http"
    }

    fn get<'a>(&'a self, url: &'a str) -> Pin<Box<dyn Future<Output = Result<u16>> + Send + 'a>> {
        Box::pin(async move {
            let mut response = self.client.get(url).send().await?;
            let status = response.status().as_u16();

            // Drain so the connection goes back to the pool. A body that
            // breaks off halfway does not change the status we got.
            loop {
                match response.chunk().await {
                    Ok(Some(_)) => continue,
                    Ok(None) => break,
                    Err(e) => {
                        debug!("Body of {} ended early: {}", url, e);
                        break;
                    }
                }
            }

            Ok(status)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn request(url: &str) -> Request {
        Request {
            url: url.to_string(),
            id: 7,
        }
    }

    /// Answers every connection with `status_line` and a short body.
    async fn serve_status(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = stream.read(&mut buf).await;
                    let body = if status_line.starts_with("304") { "" } else { "hello" };
                    let reply = format!(
                        "HTTP/1.1 {status_line}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(reply.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        format!("http://{addr}/")
    }

    #[test]
    fn test_passing_statuses() {
        assert!(is_passing_status(200));
        assert!(is_passing_status(304));
        assert!(!is_passing_status(201));
        assert!(!is_passing_status(404));
        assert!(!is_passing_status(500));
    }

    #[tokio::test]
    async fn test_mock_not_modified_passes() {
        let fetcher = MockFetcher::with_outcome(0, MockOutcome::Status(304));
        let response = execute(&fetcher, request("http://x/a")).await;

        assert!(response.pass);
        assert_eq!(response.id, 7);
        assert_eq!(response.url, "http://x/a");
    }

    #[tokio::test]
    async fn test_mock_transport_failure() {
        let fetcher = MockFetcher::with_outcome(1, MockOutcome::TransportError);
        let response = execute(&fetcher, request("http://x/a")).await;

        assert!(!response.pass);
        assert!(response.duration >= Duration::from_millis(1));
    }

    #[tokio::test]
    async fn test_mock_server_error_fails() {
        let fetcher = MockFetcher::with_outcome(0, MockOutcome::Status(503));
        assert!(!execute(&fetcher, request("http://x/a")).await.pass);
    }

    #[tokio::test]
    async fn test_http_not_modified() {
        let url = serve_status("304 Not Modified").await;
        let fetcher = HttpFetcher::new(5_000).unwrap();

        let response = execute(&fetcher, request(&url)).await;
        assert!(response.pass);
    }

    #[tokio::test]
    async fn test_http_ok_and_error_status() {
        let ok = serve_status("200 OK").await;
        let missing = serve_status("404 Not Found").await;
        let fetcher = HttpFetcher::new(5_000).unwrap();

        assert!(execute(&fetcher, request(&ok)).await.pass);
        assert!(!execute(&fetcher, request(&missing)).await.pass);
    }

    #[tokio::test]
    async fn test_http_connection_refused() {
        // Grab a free port and release it so nothing is listening there.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = HttpFetcher::new(5_000).unwrap();
        let response = execute(&fetcher, request(&format!("http://{addr}/"))).await;

        assert!(!response.pass);
        assert!(response.duration >= Duration::ZERO);
    }
}

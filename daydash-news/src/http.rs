//! Shared HTTP client construction

use std::time::Duration;

use reqwest::{redirect, Client};

use crate::error::NewsError;

/// User agent sent with page and image requests; some publishers reject
/// requests without a browser-like agent.
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Default number of redirects followed when resolving a link
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Build a client with a per-request timeout and bounded redirect following
pub fn build_client(timeout: Duration, max_redirects: usize) -> Result<Client, NewsError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .redirect(redirect::Policy::limited(max_redirects))
        .build()
        .map_err(|e| NewsError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::net::SocketAddr;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned response per accepted connection, in order
    pub async fn serve(responses: Vec<Vec<u8>>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();

                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }

                let _ = socket.write_all(&response).await;
                let _ = socket.shutdown().await;
            }
        });

        addr
    }

    /// A `Connection: close` response with a Content-Length header
    pub fn response(status: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
        let mut head = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n",
            status,
            body.len()
        );
        for (name, value) in headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        head.push_str("\r\n");

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(body);
        bytes
    }

    /// A response whose body is delimited by connection close only
    pub fn unsized_response(body: &[u8]) -> Vec<u8> {
        let mut bytes = b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n".to_vec();
        bytes.extend_from_slice(body);
        bytes
    }
}

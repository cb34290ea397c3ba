use super::{FetchTransport, TransportSettings};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use futures::TryStreamExt;
use reqwest::{Client, StatusCode};
use std::path::Path;
use std::pin::pin;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

/// Plain HTTP GET, streaming the response body straight to disk.
#[derive(Debug, Clone)]
pub struct StreamingTransport {
    client: Client,
}
impl StreamingTransport {
    pub fn new(settings: &TransportSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&settings.user_agent)
            .connect_timeout(settings.timeout)
            .timeout(settings.timeout)
            .build()
            .or_raise(|| ErrorKind::Client)?;
        Ok(Self { client })
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<u64> {
        let response = self.client.get(url).send().await.map_err(|err| ErrorKind::Request(err.to_string()))?;
        if response.status() != StatusCode::OK {
            exn::bail!(ErrorKind::HttpStatus(response.status().as_u16()));
        }

        let mut file = File::create(destination).await.or_raise(|| ErrorKind::Transfer(destination.into()))?;
        let mut body = pin!(response.bytes_stream());
        let mut written = 0u64;
        while let Some(chunk) = body.try_next().await.map_err(|err| ErrorKind::Request(err.to_string()))? {
            file.write_all(&chunk).await.or_raise(|| ErrorKind::Transfer(destination.into()))?;
            written += chunk.len() as u64;
        }
        file.flush().await.or_raise(|| ErrorKind::Transfer(destination.into()))?;
        Ok(written)
    }
}

#[async_trait]
impl FetchTransport for StreamingTransport {
    fn name(&self) -> &'static str {
        "stream"
    }

    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64> {
        let result = self.download(url, destination).await;
        if result.is_err() && fs::try_exists(destination).await.unwrap_or(false) {
            if let Err(err) = fs::remove_file(destination).await {
                tracing::warn!(path = %destination.display(), error = %err, "Could not remove partial download");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoard_record::DownloadStatus;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Serves a single canned HTTP response on a random local port.
    async fn serve_once(status: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buffer = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let read = socket.read(&mut buffer).await.unwrap();
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buffer[..read]);
            }
            let head = format!("HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n", body.len());
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{address}/img1.jpg")
    }

    #[tokio::test]
    async fn test_ok_response_is_streamed_to_disk() {
        let url = serve_once("200 OK", b"not really a jpeg").await;
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("img1.jpg");
        let transport = StreamingTransport::new(&TransportSettings::default()).unwrap();

        assert_eq!(transport.fetch(&url, &destination).await.unwrap(), 17);
        assert_eq!(std::fs::read(&destination).unwrap(), b"not really a jpeg");
    }

    #[tokio::test]
    async fn test_other_status_is_an_error() {
        let url = serve_once("404 Not Found", b"gone").await;
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("img1.jpg");
        let transport = StreamingTransport::new(&TransportSettings::default()).unwrap();

        let err = transport.fetch(&url, &destination).await.unwrap_err();
        assert_eq!(&*err, &ErrorKind::HttpStatus(404));
        assert_eq!(err.attempt_status(), DownloadStatus::Error);
        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_an_error() {
        // Bind then drop, so nothing is listening on the port.
        let address = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let dir = TempDir::new().unwrap();
        let transport = StreamingTransport::new(&TransportSettings::default()).unwrap();
        let err = transport.fetch(&format!("http://{address}/img1.jpg"), &dir.path().join("img1.jpg")).await.unwrap_err();
        assert_eq!(err.attempt_status(), DownloadStatus::Error);
    }
}

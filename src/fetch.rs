// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Retrieval of raw sample bytes from a source locator.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

/// Errors raised while fetching a locator.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("server responded with status {status}")]
    Status { status: u16 },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Fetches the raw bytes behind a locator.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetches `http://` and `https://` locators with a GET request and everything else
/// from the filesystem. `file://` prefixes are stripped; relative paths resolve against
/// the base path.
pub struct LocatorFetcher {
    client: reqwest::Client,
    base_path: PathBuf,
    timeout: Option<Duration>,
}

impl LocatorFetcher {
    /// Creates a new fetcher.
    pub fn new(base_path: &Path, timeout: Option<Duration>) -> LocatorFetcher {
        LocatorFetcher {
            client: reqwest::Client::new(),
            base_path: base_path.to_path_buf(),
            timeout,
        }
    }

    /// Resolves a non-HTTP locator to a path on disk.
    fn resolve_path(&self, locator: &str) -> PathBuf {
        let path = Path::new(locator.strip_prefix("file://").unwrap_or(locator));
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    async fn fetch_http(&self, locator: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(locator).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn fetch_file(&self, locator: &str) -> Result<Vec<u8>, FetchError> {
        let path = self.resolve_path(locator);
        debug!(path = ?path, "Reading sample file");
        Ok(tokio::fs::read(&path).await?)
    }
}

fn is_http(locator: &str) -> bool {
    let lower = locator.get(..8).unwrap_or(locator).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[async_trait]
impl Fetcher for LocatorFetcher {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, FetchError> {
        let fetch = async {
            if is_http(locator) {
                self.fetch_http(locator).await
            } else {
                self.fetch_file(locator).await
            }
        };

        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, fetch)
                .await
                .map_err(|_| FetchError::Timeout(timeout))?,
            None => fetch.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::net::SocketAddr;
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Serves `/kick.wav` with a 4 byte body and 404 for everything else.
    async fn spawn_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let response = if request.starts_with(b"GET /kick.wav ") {
                        "HTTP/1.1 200 OK\r\nContent-Length: 4\r\nConnection: close\r\n\r\nRIFF"
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                    };
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        addr
    }

    /// A fetcher that never goes through a proxy, so local servers are reachable.
    fn direct_fetcher(timeout: Option<Duration>) -> LocatorFetcher {
        LocatorFetcher {
            client: reqwest::Client::builder().no_proxy().build().unwrap(),
            base_path: PathBuf::from("."),
            timeout,
        }
    }

    #[test]
    fn test_is_http() {
        assert!(is_http("http://example.com/kick.wav"));
        assert!(is_http("HTTPS://example.com/kick.wav"));
        assert!(!is_http("samples/Kick.wav"));
        assert!(!is_http("file:///tmp/kick.wav"));
        assert!(!is_http("http"));
    }

    #[test]
    fn test_resolve_path() {
        let fetcher = LocatorFetcher::new(Path::new("/decks"), None);

        assert_eq!(
            fetcher.resolve_path("samples/Kick.wav"),
            PathBuf::from("/decks/samples/Kick.wav")
        );
        assert_eq!(
            fetcher.resolve_path("file:///tmp/kick.wav"),
            PathBuf::from("/tmp/kick.wav")
        );
        assert_eq!(
            fetcher.resolve_path("/abs/kick.wav"),
            PathBuf::from("/abs/kick.wav")
        );
    }

    #[tokio::test]
    async fn test_fetch_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("kick.wav"), b"RIFF").unwrap();
        let fetcher = LocatorFetcher::new(dir.path(), None);

        assert_eq!(fetcher.fetch("kick.wav").await.unwrap(), b"RIFF");
        assert!(matches!(
            fetcher.fetch("missing.wav").await,
            Err(FetchError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_http() {
        let addr = spawn_server().await;
        let fetcher = direct_fetcher(None);

        assert_eq!(
            fetcher
                .fetch(&format!("http://{}/kick.wav", addr))
                .await
                .unwrap(),
            b"RIFF"
        );
        assert!(matches!(
            fetcher.fetch(&format!("http://{}/missing.wav", addr)).await,
            Err(FetchError::Status { status: 404 })
        ));
    }

    #[tokio::test]
    async fn test_fetch_http_connection_refused() {
        // Bind and release a port so nothing is listening on it.
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();
        let fetcher = direct_fetcher(None);

        assert!(matches!(
            fetcher.fetch(&format!("http://{}/kick.wav", addr)).await,
            Err(FetchError::Network(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_http_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and never answer.
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        let timeout = Duration::from_millis(100);
        let fetcher = direct_fetcher(Some(timeout));

        match fetcher.fetch(&format!("http://{}/kick.wav", addr)).await {
            Err(FetchError::Timeout(after)) => assert_eq!(after, timeout),
            other => panic!("expected a timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_404_leaves_no_cache_entry() {
        let addr = spawn_server().await;
        let cache = crate::samples::SampleCache::new(Arc::new(direct_fetcher(None)), None);
        let locator = format!("http://{}/missing.wav", addr);

        let error = cache.load("snare", &locator).wait().await.unwrap_err();

        assert_eq!(error.locator(), locator);
        assert!(cache.lookup("snare").is_none());
        assert!(!cache.is_pending("snare"));
    }
}

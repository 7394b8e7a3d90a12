//! HTTP client for a remote contents store.
//!
//! Endpoints (relative to the server URL):
//! - `GET /me`: credential probe
//! - `GET /contents/<path>`: a file `{name, path, content, version}` or a
//!   directory listing `[{name, path, kind}]`
//! - `PUT /contents/<path>`: `{content, version?, message?}` -> `{version}`
//! - `DELETE /contents/<path>`: `{version}`
//!
//! File content travels base64-encoded. Every request defeats caches, since
//! a stale listing would let deleted documents reappear.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::{Blob, BlobEntry, BlobStore, EntryKind};
use crate::codec;
use crate::error::BlobError;

#[derive(Debug, Deserialize)]
struct FileResponse {
    content: String,
    version: String,
}

#[derive(Debug, Deserialize)]
struct EntryResponse {
    name: String,
    kind: EntryKind,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    File(FileResponse),
    Dir(Vec<EntryResponse>),
}

#[derive(Debug, Serialize)]
struct PutRequest<'a> {
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    version: String,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    version: &'a str,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Blob store client speaking the contents API over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBlobClient {
    server_url: String,
    token: String,
    http: reqwest::Client,
}

impl HttpBlobClient {
    /// Creates a new client with explicit parameters.
    pub fn new(server_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            token: token.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Returns the server URL.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Builds the URL for a store path, percent-encoding each segment.
    fn contents_url(&self, path: &str) -> String {
        let encoded: Vec<String> = path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();
        if encoded.is_empty() {
            return self.build_http_url("/contents");
        }
        self.build_http_url(&format!("/contents/{}", encoded.join("/")))
    }

    /// Builds an HTTP URL for a given path.
    fn build_http_url(&self, path: &str) -> String {
        let base_url = if !self.server_url.starts_with("http://")
            && !self.server_url.starts_with("https://")
        {
            format!("http://{}", self.server_url)
        } else {
            self.server_url.clone()
        };

        format!("{}{}", base_url.trim_end_matches('/'), path)
    }

    /// Starts a request with auth and cache-busting applied.
    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        self.http
            .request(method, url)
            .query(&[("t", stamp.to_string())])
            .bearer_auth(&self.token)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, BlobError> {
        builder
            .send()
            .await
            .map_err(|e| BlobError::Transport(e.to_string()))
    }

    /// Maps a non-success response to an error.
    async fn error_for(path: &str, response: Response) -> BlobError {
        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BlobError::Unauthorized,
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => BlobError::Conflict {
                path: path.to_string(),
            },
            _ => {
                let message = response
                    .json::<ErrorBody>()
                    .await
                    .ok()
                    .and_then(|b| b.message)
                    .unwrap_or_else(|| {
                        status
                            .canonical_reason()
                            .unwrap_or("unknown status")
                            .to_string()
                    });
                BlobError::Remote {
                    status: status.as_u16(),
                    message,
                }
            }
        }
    }

    async fn get_contents(&self, path: &str) -> Result<Option<ContentsResponse>, BlobError> {
        let url = self.contents_url(path);
        let response = self.send(self.request(Method::GET, &url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::error_for(path, response).await);
        }

        response
            .json::<ContentsResponse>()
            .await
            .map(Some)
            .map_err(|e| BlobError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl BlobStore for HttpBlobClient {
    async fn get(&self, path: &str) -> Result<Option<Blob>, BlobError> {
        match self.get_contents(path).await? {
            None => Ok(None),
            Some(ContentsResponse::File(file)) => Ok(Some(Blob {
                content: codec::decode(&file.content)?,
                version: file.version,
            })),
            Some(ContentsResponse::Dir(_)) => Err(BlobError::Malformed(format!(
                "{} is a directory, expected a file",
                path
            ))),
        }
    }

    async fn put(
        &self,
        path: &str,
        content: &str,
        version: Option<&str>,
    ) -> Result<String, BlobError> {
        let url = self.contents_url(path);
        let body = PutRequest {
            content: codec::encode(content),
            version,
            message: format!("Save {}", path),
        };

        let response = self
            .send(self.request(Method::PUT, &url).json(&body))
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_for(path, response).await);
        }

        let saved: PutResponse = response
            .json()
            .await
            .map_err(|e| BlobError::Malformed(e.to_string()))?;
        Ok(saved.version)
    }

    async fn delete(&self, path: &str, version: &str) -> Result<(), BlobError> {
        let url = self.contents_url(path);
        let body = DeleteRequest {
            version,
            message: format!("Delete {}", path),
        };

        let response = self
            .send(self.request(Method::DELETE, &url).json(&body))
            .await?;
        if response.status() == StatusCode::NOT_FOUND || response.status().is_success() {
            return Ok(());
        }
        Err(Self::error_for(path, response).await)
    }

    async fn list(&self, dir: &str) -> Result<Vec<BlobEntry>, BlobError> {
        match self.get_contents(dir).await? {
            None => Ok(Vec::new()),
            Some(ContentsResponse::Dir(entries)) => Ok(entries
                .into_iter()
                .map(|e| BlobEntry {
                    name: e.name,
                    kind: e.kind,
                })
                .collect()),
            Some(ContentsResponse::File(_)) => Err(BlobError::Malformed(format!(
                "{} is a file, expected a directory",
                dir
            ))),
        }
    }

    async fn probe(&self) -> Result<(), BlobError> {
        let url = self.build_http_url("/me");
        let response = self.send(self.request(Method::GET, &url)).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_for("/me", response).await)
        }
    }
}

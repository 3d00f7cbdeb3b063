//! Scheme-specific fetchers behind object-safe traits so tests and
//! embedders can substitute their own transports. Fetchers retrieve bytes
//! only; chaining, recursion and policy live in the resolver.

use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::error::FetchError;

pub trait FileReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<Vec<u8>, FetchError>;
}

/// Reads from the real filesystem. With a sandbox root configured, any
/// path resolving outside the root is refused.
#[derive(Debug, Default)]
pub struct OsFiles {
    pub sandbox: Option<PathBuf>,
}

impl FileReader for OsFiles {
    fn read(&self, path: &Path) -> Result<Vec<u8>, FetchError> {
        if let Some(root) = &self.sandbox {
            let canonical = path.canonicalize().map_err(|source| FetchError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let root = root.canonicalize().map_err(|source| FetchError::Io {
                path: root.display().to_string(),
                source,
            })?;
            if !canonical.starts_with(&root) {
                return Err(FetchError::Sandbox(path.display().to_string()));
            }
        }
        std::fs::read(path).map_err(|source| FetchError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

pub trait EnvReader: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

/// Snapshot reads from the process environment.
#[derive(Debug, Default)]
pub struct OsEnv;

impl EnvReader for OsEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

pub struct HttpResponse {
    pub body: Vec<u8>,
    /// The `Access-Control-Allow-Origin` response header, if any.
    pub allow_origin: Option<String>,
}

pub trait HttpFetcher: Send + Sync {
    /// GET `url`. `origin` is the requesting document's origin and is sent
    /// as the `Origin` header when present.
    fn get(
        &self,
        url: &Url,
        origin: Option<&str>,
        timeout: Duration,
    ) -> Result<HttpResponse, FetchError>;
}

pub struct ReqwestFetcher {
    client: reqwest::blocking::Client,
}

impl ReqwestFetcher {
    pub fn new() -> ReqwestFetcher {
        ReqwestFetcher { client: reqwest::blocking::Client::new() }
    }
}

impl Default for ReqwestFetcher {
    fn default() -> ReqwestFetcher {
        ReqwestFetcher::new()
    }
}

impl HttpFetcher for ReqwestFetcher {
    fn get(
        &self,
        url: &Url,
        origin: Option<&str>,
        timeout: Duration,
    ) -> Result<HttpResponse, FetchError> {
        let mut req = self.client.get(url.as_str()).timeout(timeout);
        if let Some(origin) = origin {
            req = req.header("Origin", origin);
        }
        let resp = req.send().map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Other(e.to_string())
            }
        })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status { url: url.to_string(), status: status.as_u16() });
        }
        let allow_origin = resp
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let body = resp
            .bytes()
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Other(e.to_string())
                }
            })?
            .to_vec();
        Ok(HttpResponse { body, allow_origin })
    }
}

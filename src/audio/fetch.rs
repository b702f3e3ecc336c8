//! Fetching raw audio bytes.
//!
//! Stems are static resources: either files next to the catalog or plain
//! HTTP downloads. The loader only sees the [`ResourceFetcher`] trait, so
//! tests can substitute an in-memory source.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Timeout applied to every HTTP request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while retrieving a track's audio resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("HTTP error! status: {status} for {uri}")]
    Status {
        /// Requested resource.
        uri: String,
        /// HTTP status code.
        status: u16,
    },
    /// A local file could not be read.
    #[error("failed to read {uri}: {message}")]
    Io {
        /// Requested resource.
        uri: String,
        /// Underlying error message.
        message: String,
    },
    /// The request failed before a status was received.
    #[error("failed to fetch {uri}: {message}")]
    Transport {
        /// Requested resource.
        uri: String,
        /// Underlying error message.
        message: String,
    },
    /// The URI scheme is not one the fetcher understands.
    #[error("unsupported resource scheme: {0}")]
    UnsupportedScheme(String),
}

/// A source of raw resource bytes.
///
/// Implementations are shared across loader threads.
pub trait ResourceFetcher: Send + Sync {
    /// Retrieves the bytes behind `uri`.
    fn fetch(&self, uri: &str) -> Result<Vec<u8>, FetchError>;
}

/// Reads stems from the local filesystem.
///
/// Relative paths resolve against `base_dir`, normally the catalog's folder.
#[derive(Debug, Clone, Default)]
pub struct FileFetcher {
    base_dir: Option<PathBuf>,
}

impl FileFetcher {
    /// Creates a fetcher resolving relative paths against the working directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fetcher resolving relative paths against `base_dir`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn resolve(&self, uri: &str) -> PathBuf {
        let path = Path::new(uri.strip_prefix("file://").unwrap_or(uri));
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ResourceFetcher for FileFetcher {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>, FetchError> {
        fs::read(self.resolve(uri)).map_err(|e| FetchError::Io {
            uri: uri.to_string(),
            message: e.to_string(),
        })
    }
}

/// Downloads stems over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    /// Creates a fetcher with a shared connection pool.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be initialized
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| FetchError::Transport {
                uri: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

impl ResourceFetcher for HttpFetcher {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport {
            uri: uri.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(uri).send().map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                uri: uri.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().map_err(transport)?;
        Ok(bytes.to_vec())
    }
}

/// Dispatches on the URI scheme: `http(s)://` goes to the network, anything
/// else (bare paths and `file://`) to the filesystem.
#[derive(Debug, Clone)]
pub struct DefaultFetcher {
    files: FileFetcher,
    http: HttpFetcher,
}

impl DefaultFetcher {
    /// Creates a fetcher for both local and remote stems.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be initialized
    pub fn new(files: FileFetcher) -> Result<Self, FetchError> {
        Ok(Self {
            files,
            http: HttpFetcher::new()?,
        })
    }
}

impl ResourceFetcher for DefaultFetcher {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>, FetchError> {
        match uri.split_once("://") {
            Some(("http" | "https", _)) => self.http.fetch(uri),
            Some(("file", _)) | None => self.files.fetch(uri),
            Some((scheme, _)) => Err(FetchError::UnsupportedScheme(scheme.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_fetcher_reads_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"RIFF").unwrap();

        let fetcher = FileFetcher::new();
        let path = file.path().to_string_lossy().into_owned();
        assert_eq!(fetcher.fetch(&path).unwrap(), b"RIFF");
        assert_eq!(fetcher.fetch(&format!("file://{}", path)).unwrap(), b"RIFF");
    }

    #[test]
    fn test_file_fetcher_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("caixa.wav"), b"data").unwrap();

        let fetcher = FileFetcher::with_base_dir(dir.path());
        assert_eq!(fetcher.fetch("caixa.wav").unwrap(), b"data");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = FileFetcher::new().fetch("/nonexistent/stem.wav").unwrap_err();
        assert!(matches!(err, FetchError::Io { .. }));
    }

    #[test]
    fn test_status_error_message() {
        let err = FetchError::Status {
            uri: "http://host/a.wav".into(),
            status: 404,
        };
        assert_eq!(err.to_string(), "HTTP error! status: 404 for http://host/a.wav");
    }

    #[test]
    fn test_unsupported_scheme() {
        let fetcher = DefaultFetcher::new(FileFetcher::new()).unwrap();
        assert_eq!(
            fetcher.fetch("ftp://host/a.wav").unwrap_err(),
            FetchError::UnsupportedScheme("ftp".into())
        );
    }
}

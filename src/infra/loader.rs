//! Script and stylesheet loading for the host document.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use reqwest::Client;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use url::Url;

use super::document::HostDocument;

/// Invoked once a script has loaded.
pub type LoadCallback = Box<dyn FnOnce() + Send + 'static>;

/// Asynchronous asset loader. Both operations return immediately; failures
/// are logged and never retried.
pub trait ResourceLoader: Send + Sync {
    /// Load a script and run `on_loaded` after it has been injected. The
    /// callback never runs when loading fails.
    fn load_script(&self, url: &str, on_loaded: LoadCallback);

    /// Load a stylesheet. Fire-and-forget.
    fn load_style(&self, url: &str);
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("unsupported resource location `{location}`: {reason}")]
    Location { location: String, reason: String },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("request for {url} failed with status {status}")]
    Status { url: String, status: u16 },
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl LoaderError {
    fn location(location: &str, reason: impl Into<String>) -> Self {
        Self::Location {
            location: location.to_string(),
            reason: reason.into(),
        }
    }
}

/// Where an asset lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceLocation {
    Remote(Url),
    Local(PathBuf),
}

impl ResourceLocation {
    /// `http(s)://` URLs are fetched over the network, `file:` URLs and plain
    /// paths are read from disk.
    pub fn parse(location: &str) -> Result<Self, LoaderError> {
        match Url::parse(location) {
            Ok(url) => match url.scheme() {
                "http" | "https" => Ok(Self::Remote(url)),
                "file" => url
                    .to_file_path()
                    .map(Self::Local)
                    .map_err(|()| LoaderError::location(location, "not a local file path")),
                scheme => Err(LoaderError::location(
                    location,
                    format!("scheme `{scheme}` is not supported"),
                )),
            },
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Ok(Self::Local(PathBuf::from(location)))
            }
            Err(err) => Err(LoaderError::location(location, err.to_string())),
        }
    }
}

/// Loader fetching assets with `reqwest` or from the filesystem and
/// injecting them into a [`HostDocument`].
#[derive(Clone)]
pub struct HttpResourceLoader {
    client: Client,
    document: Arc<HostDocument>,
    runtime: Handle,
}

impl HttpResourceLoader {
    pub fn new(document: Arc<HostDocument>, runtime: Handle) -> Result<Self, LoaderError> {
        let client = Client::builder().user_agent(Self::user_agent()).build()?;
        Ok(Self {
            client,
            document,
            runtime,
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("mdview/", env!("CARGO_PKG_VERSION"))
    }

    /// Fetch a script and reference it from the document head.
    pub async fn fetch_script(&self, location: &str) -> Result<(), LoaderError> {
        let source = self.fetch(location).await?;
        debug!(
            target = "infra::loader",
            location,
            bytes = source.len(),
            "Fetched script"
        );
        self.document.inject_script(location);
        Ok(())
    }

    /// Fetch a stylesheet and embed it in the document head.
    pub async fn fetch_style(&self, location: &str) -> Result<(), LoaderError> {
        let css = self.fetch(location).await?;
        self.document.inject_style(&css);
        debug!(
            target = "infra::loader",
            location,
            bytes = css.len(),
            "Injected stylesheet"
        );
        Ok(())
    }

    async fn fetch(&self, location: &str) -> Result<String, LoaderError> {
        match ResourceLocation::parse(location)? {
            ResourceLocation::Remote(url) => self.fetch_remote(url).await,
            ResourceLocation::Local(path) => read_local(&path).await,
        }
    }

    async fn fetch_remote(&self, url: Url) -> Result<String, LoaderError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoaderError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

async fn read_local(path: &Path) -> Result<String, LoaderError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| LoaderError::Io {
            path: path.to_path_buf(),
            source,
        })
}

impl ResourceLoader for HttpResourceLoader {
    fn load_script(&self, url: &str, on_loaded: LoadCallback) {
        let loader = self.clone();
        let url = url.to_string();
        self.runtime.spawn(async move {
            match loader.fetch_script(&url).await {
                Ok(()) => {
                    info!(target = "infra::loader", url = %url, "Loaded script");
                    on_loaded();
                }
                Err(err) => warn!(
                    target = "infra::loader",
                    url = %url,
                    error = %err,
                    "Failed to load script"
                ),
            }
        });
    }

    fn load_style(&self, url: &str) {
        let loader = self.clone();
        let url = url.to_string();
        self.runtime.spawn(async move {
            if let Err(err) = loader.fetch_style(&url).await {
                warn!(
                    target = "infra::loader",
                    url = %url,
                    error = %err,
                    "Failed to load stylesheet"
                );
            }
        });
    }
}

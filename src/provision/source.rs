// src/provision/source.rs

//! Where artifact bytes come from.
//!
//! The provisioner talks to an `ArtifactSource` instead of an HTTP client
//! directly, so tests can feed it canned bytes or scripted failures while
//! production uses [`HttpArtifactSource`].

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Client;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::errors::{Result, SupervisorError};

/// Called after every transport chunk with `(downloaded, total)`.
///
/// `total` is `None` when the server did not announce a length.
pub type ChunkCallback<'a> = &'a mut (dyn FnMut(u64, Option<u64>) + Send);

pub trait ArtifactSource: Send + Sync {
    /// Human-readable origin, used in log lines.
    fn describe(&self) -> String;

    /// Write the artifact to `dest` (truncating it) and return the number of
    /// bytes written.
    fn fetch<'a>(
        &'a self,
        dest: &'a Path,
        on_chunk: ChunkCallback<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + 'a>>;
}

/// Plain HTTP(S) GET of a fixed URL.
pub struct HttpArtifactSource {
    client: Client,
    url: String,
}

impl HttpArtifactSource {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ArtifactSource for HttpArtifactSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn fetch<'a>(
        &'a self,
        dest: &'a Path,
        on_chunk: ChunkCallback<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + 'a>> {
        Box::pin(async move {
            let mut response = self.client.get(&self.url).send().await?;

            if !response.status().is_success() {
                return Err(SupervisorError::Download(format!(
                    "server returned {} for {}",
                    response.status(),
                    self.url
                )));
            }

            let total = response.content_length();
            debug!(url = %self.url, ?total, "download response received");

            let mut file = File::create(dest).await?;
            let mut downloaded: u64 = 0;
            on_chunk(downloaded, total);

            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await?;
                downloaded += chunk.len() as u64;
                on_chunk(downloaded, total);
            }

            file.flush().await?;
            file.sync_all().await?;

            Ok(downloaded)
        })
    }
}

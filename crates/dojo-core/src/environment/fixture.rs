//! Fixture loading for execution contexts.

use std::collections::HashMap;

use anyhow::{bail, Context};
use async_trait::async_trait;

/// Loads the resource a context must finish loading before it is usable.
#[async_trait]
pub trait FixtureLoader: Send + Sync {
    async fn load(&self, url: &str) -> anyhow::Result<String>;
}

/// `http(s)://` URLs over HTTP, everything else from the local filesystem
/// (`file://` prefix optional).
pub struct DefaultFixtureLoader {
    client: reqwest::Client,
}

impl DefaultFixtureLoader {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for DefaultFixtureLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FixtureLoader for DefaultFixtureLoader {
    async fn load(&self, url: &str) -> anyhow::Result<String> {
        if url.starts_with("http://") || url.starts_with("https://") {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .with_context(|| format!("requesting {url}"))?
                .error_for_status()
                .with_context(|| format!("fetching {url}"))?;
            return response
                .text()
                .await
                .with_context(|| format!("reading body of {url}"));
        }

        let path = url.strip_prefix("file://").unwrap_or(url);
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {path}"))
    }
}

/// In-memory fixtures keyed by URL.
#[derive(Debug, Clone, Default)]
pub struct StaticFixtures {
    fixtures: HashMap<String, String>,
}

impl StaticFixtures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, content: impl Into<String>) -> Self {
        self.fixtures.insert(url.into(), content.into());
        self
    }
}

#[async_trait]
impl FixtureLoader for StaticFixtures {
    async fn load(&self, url: &str) -> anyhow::Result<String> {
        match self.fixtures.get(url) {
            Some(content) => Ok(content.clone()),
            None => bail!("no fixture registered for {url}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_static_fixtures() {
        let loader = StaticFixtures::new().with("page.html", "<main></main>");
        assert_eq!(loader.load("page.html").await.unwrap(), "<main></main>");
        let err = loader.load("missing.html").await.unwrap_err();
        assert!(err.to_string().contains("missing.html"));
    }

    #[tokio::test]
    async fn test_default_loader_reads_files() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, "<body id=\"fixture\"></body>").expect("write");
        let path = file.path().to_string_lossy().to_string();

        let loader = DefaultFixtureLoader::new();
        assert_eq!(loader.load(&path).await.unwrap(), "<body id=\"fixture\"></body>");

        let url = format!("file://{path}");
        assert_eq!(loader.load(&url).await.unwrap(), "<body id=\"fixture\"></body>");
    }

    #[tokio::test]
    async fn test_default_loader_missing_file() {
        let loader = DefaultFixtureLoader::new();
        let err = loader.load("/definitely/not/here.html").await.unwrap_err();
        assert!(format!("{err:#}").contains("/definitely/not/here.html"));
    }
}

//! Source acquisition: pages, remote scripts, URL lists and local files
//!
//! Acquisition turns one [`ScanInput`] into a stream of [`AcquireEvent`]s on an
//! mpsc channel. Fetches run concurrently under a semaphore but events are sent
//! in input order, so reports come out the same on every run. A script URL is
//! fetched at most once per run; it is reported under the first page that
//! references it.

pub mod html;

use crate::error::{JsProbeError, Result};
use crate::http::HttpClient;
use crate::models::{AcquireWarning, SourceKind, SourceUnit};
use async_trait::async_trait;
use html::ScriptRef;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

/// Retrieves the text behind a URL
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String>;

    /// HTTP requests made so far
    fn request_count(&self) -> u64 {
        0
    }
}

#[async_trait]
impl Fetcher for HttpClient {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.get_text(url).await
    }

    fn request_count(&self) -> u64 {
        HttpClient::request_count(self)
    }
}

/// What a run scans. Exactly one per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanInput {
    /// An HTML page whose scripts are analyzed
    PageUrl(String),
    /// A single remote script
    ScriptUrl(String),
    /// A file listing page URLs
    PageList(PathBuf),
    /// A file listing script URLs
    ScriptList(PathBuf),
    /// A script on local disk
    LocalFile(PathBuf),
}

impl fmt::Display for ScanInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanInput::PageUrl(url) => write!(f, "page {url}"),
            ScanInput::ScriptUrl(url) => write!(f, "script {url}"),
            ScanInput::PageList(path) => write!(f, "page list {}", path.display()),
            ScanInput::ScriptList(path) => write!(f, "script list {}", path.display()),
            ScanInput::LocalFile(path) => write!(f, "file {}", path.display()),
        }
    }
}

/// Output of acquisition, in report order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireEvent {
    /// This many more units or warnings will follow
    Planned(usize),
    Unit(SourceUnit),
    Warning(AcquireWarning),
}

/// Reads a URL list: one URL per line, blank lines and `#` comments skipped
pub async fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(parse_url_list(&content))
}

fn parse_url_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn inline_label(page: &str, n: usize) -> String {
    format!("{page} inline script #{n}")
}

/// Drives acquisition for one run
pub struct Acquirer {
    fetcher: Arc<dyn Fetcher>,
    concurrency: usize,
    /// Bounds page and script fetches together
    semaphore: Arc<Semaphore>,
}

impl Acquirer {
    pub fn new(fetcher: Arc<dyn Fetcher>, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            fetcher,
            concurrency,
            semaphore: Arc::new(Semaphore::new(concurrency)),
        }
    }

    /// Acquires `input`, sending events to `tx` until done or the receiver
    /// goes away. Errors are reserved for an unusable input.
    pub async fn run(&self, input: ScanInput, tx: mpsc::Sender<AcquireEvent>) -> Result<()> {
        info!("Acquiring sources from {input}");
        match input {
            ScanInput::LocalFile(path) => self.local_file(&path, &tx).await,
            ScanInput::ScriptUrl(url) => {
                Url::parse(&url)?;
                self.scripts(vec![url], &tx).await;
                Ok(())
            }
            ScanInput::ScriptList(path) => {
                let urls = self.valid_urls(read_url_list(&path).await?, &tx).await;
                self.scripts(urls, &tx).await;
                Ok(())
            }
            ScanInput::PageUrl(url) => {
                Url::parse(&url)?;
                self.pages(vec![url], &tx).await;
                Ok(())
            }
            ScanInput::PageList(path) => {
                let urls = self.valid_urls(read_url_list(&path).await?, &tx).await;
                self.pages(urls, &tx).await;
                Ok(())
            }
        }
    }

    async fn local_file(&self, path: &Path, tx: &mpsc::Sender<AcquireEvent>) -> Result<()> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            JsProbeError::InvalidInput(format!("cannot read {}: {e}", path.display()))
        })?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let unit = SourceUnit::new(path.display().to_string(), text, SourceKind::Local);
        let _ = tx.send(AcquireEvent::Planned(1)).await;
        let _ = tx.send(AcquireEvent::Unit(unit)).await;
        Ok(())
    }

    /// Keeps parseable URLs; each rejected line becomes a warning
    async fn valid_urls(&self, lines: Vec<String>, tx: &mpsc::Sender<AcquireEvent>) -> Vec<String> {
        let mut urls = Vec::with_capacity(lines.len());
        for line in lines {
            match Url::parse(&line) {
                Ok(_) => urls.push(line),
                Err(e) => {
                    warn!("Skipping invalid URL '{line}': {e}");
                    let _ = tx.send(AcquireEvent::Planned(1)).await;
                    let _ = tx
                        .send(AcquireEvent::Warning(AcquireWarning::new(line, format!("invalid URL: {e}"))))
                        .await;
                }
            }
        }
        urls
    }

    async fn scripts(&self, urls: Vec<String>, tx: &mpsc::Sender<AcquireEvent>) {
        let mut seen = HashSet::new();
        let urls: Vec<String> = urls.into_iter().filter(|u| seen.insert(u.clone())).collect();
        if tx.send(AcquireEvent::Planned(urls.len())).await.is_err() {
            return;
        }

        let mut results = self.fetch_ordered(urls);
        while let Some((url, result)) = results.recv().await {
            if tx.send(script_event(url, result)).await.is_err() {
                return;
            }
        }
    }

    async fn pages(&self, pages: Vec<String>, tx: &mpsc::Sender<AcquireEvent>) {
        let mut fetched_scripts: HashSet<String> = HashSet::new();
        let mut page_results = self.fetch_ordered(pages);

        while let Some((page, result)) = page_results.recv().await {
            let html = match result {
                Ok(html) => html,
                Err(e) => {
                    warn!("Failed to fetch page {page}: {e}");
                    let _ = tx.send(AcquireEvent::Planned(1)).await;
                    if tx.send(AcquireEvent::Warning(AcquireWarning::new(page, e.to_string()))).await.is_err() {
                        return;
                    }
                    continue;
                }
            };
            let Ok(page_url) = Url::parse(&page) else {
                continue;
            };

            let (scripts, unresolved) = html::extract_scripts(&page_url, &html);
            debug!("{page}: {} scripts, {} unresolved", scripts.len(), unresolved.len());

            // Run cache: a script already fetched for an earlier page is not
            // fetched or reported again
            let scripts: Vec<ScriptRef> = scripts
                .into_iter()
                .filter(|s| match s {
                    ScriptRef::External(url) => fetched_scripts.insert(url.clone()),
                    ScriptRef::Inline(_) => true,
                })
                .collect();
            let planned = scripts.len() + unresolved.len();
            if tx.send(AcquireEvent::Planned(planned)).await.is_err() {
                return;
            }

            for src in unresolved {
                let warning = AcquireWarning::new(page.clone(), format!("unresolvable script src '{src}'"));
                if tx.send(AcquireEvent::Warning(warning)).await.is_err() {
                    return;
                }
            }

            let externals: Vec<String> = scripts
                .iter()
                .filter_map(|s| match s {
                    ScriptRef::External(url) => Some(url.clone()),
                    ScriptRef::Inline(_) => None,
                })
                .collect();
            let mut external_results = self.fetch_ordered(externals);

            let mut inline_n = 0;
            for script in scripts {
                let event = match script {
                    ScriptRef::Inline(body) => {
                        inline_n += 1;
                        AcquireEvent::Unit(SourceUnit::new(
                            inline_label(&page, inline_n),
                            body,
                            SourceKind::Inline,
                        ))
                    }
                    ScriptRef::External(_) => match external_results.recv().await {
                        Some((url, result)) => script_event(url, result),
                        None => return,
                    },
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        }
    }

    /// Fetches `urls` concurrently and yields `(url, result)` in input order
    fn fetch_ordered(&self, urls: Vec<String>) -> mpsc::Receiver<(String, Result<String>)> {
        let (tx, rx) = mpsc::channel(self.concurrency);
        let semaphore = Arc::clone(&self.semaphore);
        let fetcher = Arc::clone(&self.fetcher);

        tokio::spawn(async move {
            let mut set = JoinSet::new();
            for (index, url) in urls.into_iter().enumerate() {
                let sem = Arc::clone(&semaphore);
                let fetcher = Arc::clone(&fetcher);
                set.spawn(async move {
                    let _permit = sem.acquire().await;
                    debug!("Fetching {url}");
                    let result = fetcher.fetch_text(&url).await;
                    (index, url, result)
                });
            }

            let mut pending = BTreeMap::new();
            let mut next = 0;
            while let Some(joined) = set.join_next().await {
                let Ok((index, url, result)) = joined else {
                    continue;
                };
                pending.insert(index, (url, result));
                while let Some(item) = pending.remove(&next) {
                    if tx.send(item).await.is_err() {
                        // Dropping the JoinSet aborts the remaining fetches
                        return;
                    }
                    next += 1;
                }
            }
            // Only reached with gaps left by a panicked fetch
            for (_, item) in pending {
                if tx.send(item).await.is_err() {
                    return;
                }
            }
        });

        rx
    }
}

fn script_event(url: String, result: Result<String>) -> AcquireEvent {
    match result {
        Ok(text) => AcquireEvent::Unit(SourceUnit::new(url, text, SourceKind::External)),
        Err(e) => {
            warn!("Failed to fetch script {url}: {e}");
            AcquireEvent::Warning(AcquireWarning::new(url, e.to_string()))
        }
    }
}

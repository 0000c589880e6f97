use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use browser::{BrowserError, PageDriver};
use crawler::{CrawlerError, DownloadHead, Endpoints, FetchResponse, Fetcher};
use storage::SqliteStore;

use crate::{HarvestConfig, Harvester};

/// Serves queued responses per URL. The last queued response repeats; unknown URLs get a 404.
#[derive(Default)]
pub struct FakeFetcher {
    routes: Mutex<HashMap<String, VecDeque<FetchResponse>>>,
    requests: Mutex<Vec<(String, String)>>,
    cut: Mutex<HashSet<String>>,
}

impl FakeFetcher {
    pub fn respond(&self, url: &str, response: FetchResponse) {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    /// Downloads of `url` write half the body, then fail.
    pub fn cut_stream(&self, url: &str) {
        self.cut.lock().unwrap().insert(url.to_string());
    }

    pub fn count(&self, method: &str, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, u)| m == method && u == url)
            .count()
    }

    pub fn urls(&self, method: &str) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, u)| u.clone())
            .collect()
    }

    fn serve(&self, method: &str, url: &str) -> Result<FetchResponse, CrawlerError> {
        self.requests
            .lock()
            .unwrap()
            .push((method.to_string(), url.to_string()));

        let mut routes = self.routes.lock().unwrap();
        let response = match routes.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        Ok(response.unwrap_or_else(|| FetchResponse::new(404, Some("text/html"), "not found")))
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn get(&self, url: &str) -> Result<FetchResponse, CrawlerError> {
        self.serve("GET", url)
    }

    async fn post(&self, url: &str) -> Result<FetchResponse, CrawlerError> {
        self.serve("POST", url)
    }

    async fn download_to(&self, url: &str, dest: &Path) -> Result<DownloadHead, CrawlerError> {
        let response = self.serve("GET", url)?;
        let mut head = DownloadHead {
            status: response.status,
            content_type: response.content_type.clone(),
            bytes: 0,
        };
        if !head.is_success() {
            return Ok(head);
        }

        let cut = self.cut.lock().unwrap().contains(url);
        if cut {
            let half = &response.body[..response.body.len() / 2];
            tokio::fs::write(dest, half).await?;
            return Err(CrawlerError::IoError(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "stream cut",
            )));
        }

        tokio::fs::write(dest, &response.body).await?;
        head.bytes = response.body.len() as u64;
        Ok(head)
    }
}

/// Records every call; selectors listed in `absent` never appear.
#[derive(Default)]
pub struct FakeDriver {
    pub calls: Vec<String>,
    pub absent: HashSet<String>,
}

impl PageDriver for FakeDriver {
    fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.calls.push(format!("navigate {}", url));
        Ok(())
    }

    fn wait_for_selector(&mut self, selector: &str, _timeout: Duration) -> Result<(), BrowserError> {
        self.calls.push(format!("wait {}", selector));
        if self.absent.contains(selector) {
            return Err(BrowserError::Timeout {
                selector: selector.to_string(),
                reason: "not found".to_string(),
            });
        }
        Ok(())
    }

    fn click(&mut self, selector: &str) -> Result<(), BrowserError> {
        self.calls.push(format!("click {}", selector));
        Ok(())
    }

    fn screenshot(&mut self, path: &Path) -> Result<(), BrowserError> {
        self.calls.push(format!("screenshot {}", path.display()));
        Ok(())
    }
}

pub fn test_config() -> HarvestConfig {
    let mut config = HarvestConfig {
        retry_backoff: Duration::ZERO,
        ..HarvestConfig::default()
    };
    config.fallback.settle = Duration::ZERO;
    config.fallback.selector_timeout = Duration::from_millis(10);
    config.fallback.screenshot_path = "shots/screen.png".into();
    config
}

pub fn harvester(fetcher: FakeFetcher) -> Harvester<FakeFetcher, SqliteStore> {
    harvester_with(fetcher, test_config())
}

pub fn harvester_with(fetcher: FakeFetcher, config: HarvestConfig) -> Harvester<FakeFetcher, SqliteStore> {
    Harvester::new(
        fetcher,
        SqliteStore::open_in_memory().unwrap(),
        Endpoints::default(),
        config,
    )
}

use headless_chrome::protocol::cdp::Page;
use headless_chrome::Browser as ChromeBrowser;
use headless_chrome::{LaunchOptions, Tab};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),
    #[error("Navigation error: {0}")]
    NavigationError(String),
    #[error("Timeout waiting for {selector}: {reason}")]
    Timeout { selector: String, reason: String },
    #[error("Click on {selector} failed: {reason}")]
    ClickFailed { selector: String, reason: String },
    #[error("Screenshot failed: {0}")]
    ScreenshotFailed(String),
    #[error("Browser session unavailable: {0}")]
    SessionUnavailable(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// The page operations the click-to-generate fallback needs.
pub trait PageDriver {
    fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;
    fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<(), BrowserError>;
    fn click(&mut self, selector: &str) -> Result<(), BrowserError>;
    fn screenshot(&mut self, path: &Path) -> Result<(), BrowserError>;
}

#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub headless: bool,
    pub window_size: (u32, u32),
    pub idle_timeout: Duration,
    pub navigation_timeout: Duration,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: (1920, 1080),
            idle_timeout: Duration::from_secs(300),
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

/// Chrome driven over the devtools protocol, one tab for the whole run.
pub struct ChromeDriver {
    // Dropping the browser kills the process, so it lives as long as the tab.
    _browser: ChromeBrowser,
    tab: Arc<Tab>,
}

impl ChromeDriver {
    pub fn launch(config: &LaunchConfig) -> Result<Self, BrowserError> {
        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some(config.window_size))
            .idle_browser_timeout(config.idle_timeout)
            .build()
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let browser = ChromeBrowser::new(launch_options)
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;
        tab.set_default_timeout(config.navigation_timeout);

        info!(headless = config.headless, "Browser launched successfully");
        Ok(Self {
            _browser: browser,
            tab,
        })
    }
}

impl PageDriver for ChromeDriver {
    fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        info!("Navigating to: {}", url);
        self.tab
            .navigate_to(url)
            .map_err(|e| BrowserError::NavigationError(e.to_string()))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| BrowserError::NavigationError(e.to_string()))?;
        debug!("Navigation complete");
        Ok(())
    }

    fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        self.tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .map_err(|e| BrowserError::Timeout {
                selector: selector.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    fn click(&mut self, selector: &str) -> Result<(), BrowserError> {
        let element = self.tab.find_element(selector).map_err(|e| BrowserError::ClickFailed {
            selector: selector.to_string(),
            reason: e.to_string(),
        })?;
        element.click().map_err(|e| BrowserError::ClickFailed {
            selector: selector.to_string(),
            reason: e.to_string(),
        })?;
        debug!("Clicked {}", selector);
        Ok(())
    }

    fn screenshot(&mut self, path: &Path) -> Result<(), BrowserError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let png = self
            .tab
            .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| BrowserError::ScreenshotFailed(e.to_string()))?;
        std::fs::write(path, png)?;
        debug!("Screenshot written to {:?}", path);
        Ok(())
    }
}

enum SessionState<D> {
    Idle,
    Ready(D),
    Failed(String),
}

/// A driver launched on first use and reused afterwards.
///
/// A failed launch is remembered: later calls fail fast with the same reason
/// until [`LazySession::reset`] is called.
pub struct LazySession<D, F>
where
    F: FnMut() -> Result<D, BrowserError>,
{
    launcher: F,
    state: SessionState<D>,
}

impl<D, F> LazySession<D, F>
where
    D: PageDriver,
    F: FnMut() -> Result<D, BrowserError>,
{
    pub fn new(launcher: F) -> Self {
        Self {
            launcher,
            state: SessionState::Idle,
        }
    }

    pub fn driver(&mut self) -> Result<&mut D, BrowserError> {
        if matches!(self.state, SessionState::Idle) {
            self.state = match (self.launcher)() {
                Ok(driver) => SessionState::Ready(driver),
                Err(e) => {
                    warn!("Browser session could not be started: {}", e);
                    SessionState::Failed(e.to_string())
                }
            };
        }

        match &mut self.state {
            SessionState::Ready(driver) => Ok(driver),
            SessionState::Failed(reason) => Err(BrowserError::SessionUnavailable(reason.clone())),
            SessionState::Idle => Err(BrowserError::SessionUnavailable(
                "browser not launched".to_string(),
            )),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, SessionState::Ready(_))
    }

    /// Drops the current driver or remembered failure; the next call relaunches.
    pub fn reset(&mut self) {
        self.state = SessionState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct NullDriver {
        visited: Vec<String>,
    }

    impl PageDriver for NullDriver {
        fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
            self.visited.push(url.to_string());
            Ok(())
        }

        fn wait_for_selector(&mut self, _: &str, _: Duration) -> Result<(), BrowserError> {
            Ok(())
        }

        fn click(&mut self, _: &str) -> Result<(), BrowserError> {
            Ok(())
        }

        fn screenshot(&mut self, _: &Path) -> Result<(), BrowserError> {
            Ok(())
        }
    }

    #[test]
    fn test_launch_config_default() {
        let config = LaunchConfig::default();
        assert!(config.headless);
        assert_eq!(config.window_size, (1920, 1080));
        assert_eq!(config.navigation_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_session_launches_once() {
        let mut launches = 0;
        let mut session = LazySession::new(|| {
            launches += 1;
            Ok(NullDriver::default())
        });
        assert!(!session.is_ready());

        session.driver().unwrap().navigate("https://a").unwrap();
        session.driver().unwrap().navigate("https://b").unwrap();
        assert!(session.is_ready());
        assert_eq!(session.driver().unwrap().visited, vec!["https://a", "https://b"]);

        drop(session);
        assert_eq!(launches, 1);
    }

    #[test]
    fn test_launch_failure_is_sticky_until_reset() {
        let mut attempts = 0;
        let mut session = LazySession::new(|| {
            attempts += 1;
            if attempts == 1 {
                Err(BrowserError::LaunchFailed("no chrome".to_string()))
            } else {
                Ok(NullDriver::default())
            }
        });

        assert!(matches!(session.driver(), Err(BrowserError::SessionUnavailable(_))));
        assert!(matches!(session.driver(), Err(BrowserError::SessionUnavailable(_))));

        session.reset();
        assert!(session.driver().is_ok());

        drop(session);
        assert_eq!(attempts, 2);
    }
}

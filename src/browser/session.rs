//! Browser session management
//!
//! Launches and controls a single Chrome/Chromium instance over the
//! DevTools protocol. A session owns exactly one browsing context and
//! one active page; the quote workflow never opens parallel tabs.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig, HeadlessMode};
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::cdp::browser_protocol::network::{Cookie, CookieParam};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::Page;
use futures::StreamExt;
use rand::{Rng, SeedableRng};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::BrowserError;

/// User agent presented to the marketplace. Must stay in sync with the
/// Chrome major version bundled on typical hosts.
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Find a Chrome/Chromium executable on the system
fn find_chrome() -> Option<std::path::PathBuf> {
    let candidates: Vec<std::path::PathBuf> = if cfg!(target_os = "windows") {
        let mut paths = vec![
            std::path::PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
            std::path::PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        ];
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            paths.push(std::path::PathBuf::from(format!(
                r"{}\Google\Chrome\Application\chrome.exe",
                local
            )));
        }
        paths
    } else if cfg!(target_os = "macos") {
        vec![
            std::path::PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            std::path::PathBuf::from("/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge"),
        ]
    } else {
        vec![
            std::path::PathBuf::from("/usr/bin/google-chrome"),
            std::path::PathBuf::from("/usr/bin/google-chrome-stable"),
            std::path::PathBuf::from("/usr/bin/chromium"),
            std::path::PathBuf::from("/usr/bin/chromium-browser"),
        ]
    };

    candidates.into_iter().find(|p| p.exists())
}

/// Configuration for a browser session
#[derive(Debug, Clone)]
pub struct BrowserSessionConfig {
    /// Path to Chrome/Chromium executable
    pub chrome_path: Option<String>,
    /// Run without a visible window
    pub headless: bool,
    /// User data directory (profile, cache, local storage)
    pub user_data_dir: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Window width
    pub window_width: u32,
    /// Window height
    pub window_height: u32,
}

impl Default for BrowserSessionConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: false,
            user_data_dir: None,
            timeout_secs: 60,
            window_width: 1920,
            window_height: 1080,
        }
    }
}

impl BrowserSessionConfig {
    /// Create a config with a fresh per-run user data directory.
    ///
    /// The directory survives headless -> visible relaunches within one
    /// run, so local storage carries over together with the cookies
    /// restored from the session store.
    pub fn for_run() -> Self {
        let dir = std::env::temp_dir()
            .join("stockx-quoter")
            .join("browser_data")
            .join(uuid::Uuid::new_v4().to_string());

        Self {
            user_data_dir: Some(dir.to_string_lossy().to_string()),
            ..Default::default()
        }
    }

    /// Set headless mode
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set Chrome path
    pub fn chrome_path(mut self, path: Option<String>) -> Self {
        self.chrome_path = path;
        self
    }

    /// Set timeout
    pub fn timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// A live browser session for the quote workflow
pub struct BrowserSession {
    /// Display id, e.g. "Session-a1b2c3d4"
    pub id: String,
    /// The browser instance
    browser: Arc<RwLock<Option<Browser>>>,
    /// Current active page
    page: Arc<RwLock<Option<Page>>>,
    /// Session configuration
    config: BrowserSessionConfig,
    /// Whether Chrome is still connected
    alive: Arc<AtomicBool>,
    /// Number of bot challenges encountered on this session
    challenge_count: Arc<AtomicU32>,
}

impl BrowserSession {
    /// Launch a browser and create a session around it
    pub async fn new(config: BrowserSessionConfig) -> Result<Self, BrowserError> {
        let session_id = format!(
            "Session-{}",
            &uuid::Uuid::new_v4().to_string()[..8]
        );

        info!(
            "Launching browser session {} (headless: {})",
            session_id, config.headless
        );

        if config.chrome_path.is_none() && find_chrome().is_none() {
            return Err(BrowserError::LaunchFailed(
                "No Chrome/Chromium executable found. Install Chrome and retry.".to_string(),
            ));
        }

        let mut builder = BrowserConfig::builder();

        if config.headless {
            // Modern Chrome needs the "new" headless engine for a
            // renderer that matches the headed one
            builder = builder.headless_mode(HeadlessMode::New);
        } else {
            builder = builder.with_head();
        }

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        } else if let Some(chrome_path) = find_chrome() {
            info!("Auto-detected Chrome at: {}", chrome_path.display());
            builder = builder.chrome_executable(chrome_path);
        }

        if let Some(ref dir) = config.user_data_dir {
            let _ = std::fs::create_dir_all(dir);
            builder = builder.user_data_dir(dir);
        }

        // Anti-detection flags. The marketplace fingerprints automation,
        // so the webdriver blink feature is disabled at the C++ level
        // instead of patching JS prototypes.
        builder = builder
            .window_size(config.window_width, config.window_height)
            .args(vec![
                "--disable-blink-features=AutomationControlled".to_string(),
                "--disable-infobars".to_string(),
                "--no-default-browser-check".to_string(),
                "--disable-session-crashed-bubble".to_string(),
                "--disable-restore-session-state".to_string(),
                "--disable-notifications".to_string(),
                "--disable-save-password-bubble".to_string(),
                "--window-position=50,50".to_string(),
                "--start-maximized".to_string(),
                // Required when running as root (Docker, VPS)
                "--no-sandbox".to_string(),
                format!("--user-agent={}", DESKTOP_USER_AGENT),
            ]);

        let browser_config = builder
            .build()
            .map_err(BrowserError::LaunchFailed)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        // Drive the CDP event loop in the background. When the handler
        // stream ends, Chrome has disconnected or crashed.
        let session_id_clone = session_id.clone();
        let alive_flag = Arc::new(AtomicBool::new(true));
        let alive_for_handler = alive_flag.clone();
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!("Session {} handler event error: {}", session_id_clone, err);
                }
            }
            warn!(
                "Session {} Chrome disconnected (event handler ended)",
                session_id_clone
            );
            alive_for_handler.store(false, Ordering::Relaxed);
        });

        // Chrome opens with a blank tab; adopt it as the working page
        // and close any extras so there is exactly one.
        let page = {
            let mut pages = browser
                .pages()
                .await
                .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

            let main_page = if !pages.is_empty() {
                pages.remove(0)
            } else {
                browser
                    .new_page("about:blank")
                    .await
                    .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?
            };

            for extra_page in pages {
                debug!("Closing extra blank tab");
                let _ = extra_page.close().await;
            }

            main_page
        };

        info!("Browser session {} created", session_id);

        Ok(Self {
            id: session_id,
            browser: Arc::new(RwLock::new(Some(browser))),
            page: Arc::new(RwLock::new(Some(page))),
            config,
            alive: alive_flag,
            challenge_count: Arc::new(AtomicU32::new(0)),
        })
    }

    /// Get session ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Check if the session is alive
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Whether this session runs without a visible window
    pub fn is_headless(&self) -> bool {
        self.config.headless
    }

    /// Number of bot challenges hit on this session
    pub fn challenge_count(&self) -> u32 {
        self.challenge_count.load(Ordering::Relaxed)
    }

    /// Record a bot challenge
    pub fn increment_challenges(&self) {
        self.challenge_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Navigate to a URL
    pub async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let page = self.page.read().await;
        let page = page
            .as_ref()
            .ok_or(BrowserError::ConnectionLost("No active page".into()))?;

        debug!("Session {} navigating to: {}", self.id, url);
        page.goto(url)
            .await
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;

        Ok(())
    }

    /// Execute JavaScript on the page with the configured default timeout
    pub async fn execute_js(&self, script: &str) -> Result<serde_json::Value, BrowserError> {
        self.execute_js_with_timeout(script, self.config.timeout_secs).await
    }

    /// Execute JavaScript on the page with a custom timeout (in seconds).
    /// Promises are awaited, so async IIFEs work too.
    pub async fn execute_js_with_timeout(
        &self,
        script: &str,
        timeout_secs: u64,
    ) -> Result<serde_json::Value, BrowserError> {
        let page = self.page.read().await;
        let page = page
            .as_ref()
            .ok_or(BrowserError::ConnectionLost("No active page".into()))?;

        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(BrowserError::JavaScriptError)?;

        let result = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            page.evaluate(params),
        )
        .await
        .map_err(|_| {
            BrowserError::Timeout(format!(
                "JavaScript execution timed out after {}s",
                timeout_secs
            ))
        })?
        .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;

        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    /// Get current URL
    pub async fn current_url(&self) -> Result<String, BrowserError> {
        let page = self.page.read().await;
        let page = page
            .as_ref()
            .ok_or(BrowserError::ConnectionLost("No active page".into()))?;

        page.url()
            .await
            .map_err(|e| BrowserError::ConnectionLost(e.to_string()))?
            .ok_or_else(|| BrowserError::ConnectionLost("No URL".into()))
    }

    /// Rendered text of the page body
    pub async fn body_text(&self) -> Result<String, BrowserError> {
        let value = self
            .execute_js("document.body ? document.body.innerText : ''")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Full HTML content of the page (for debug dumps)
    pub async fn page_content(&self) -> Result<String, BrowserError> {
        let page = self.page.read().await;
        let page = page
            .as_ref()
            .ok_or(BrowserError::ConnectionLost("No active page".into()))?;

        page.content()
            .await
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))
    }

    /// Click on an element by selector
    pub async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let page = self.page.read().await;
        let page = page
            .as_ref()
            .ok_or(BrowserError::ConnectionLost("No active page".into()))?;

        let element = page
            .find_element(selector)
            .await
            .map_err(|e| BrowserError::ElementNotFound(format!("{}: {}", selector, e)))?;

        element
            .click()
            .await
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;

        Ok(())
    }

    /// Type text into the currently focused element using raw CDP
    /// keyboard events with human-like per-character pacing.
    pub async fn type_text_cdp(&self, text: &str) -> Result<(), BrowserError> {
        let page = self.page.read().await;
        let page = page
            .as_ref()
            .ok_or(BrowserError::ConnectionLost("No active page".into()))?;

        let mut rng = rand::rngs::StdRng::from_entropy();

        for c in text.chars() {
            let key_down = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::KeyDown)
                .text(c.to_string())
                .build()
                .map_err(BrowserError::JavaScriptError)?;
            page.execute(key_down)
                .await
                .map_err(|e| BrowserError::JavaScriptError(format!("CDP keyDown failed: {}", e)))?;

            let key_up = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::KeyUp)
                .build()
                .map_err(BrowserError::JavaScriptError)?;
            page.execute(key_up)
                .await
                .map_err(|e| BrowserError::JavaScriptError(format!("CDP keyUp failed: {}", e)))?;

            // Human typing cadence (50-150ms between keys)
            let delay = rng.gen_range(50..150);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        Ok(())
    }

    /// Press a named key (e.g. "Tab" to blur a field, "Enter" to submit)
    /// via raw CDP events.
    pub async fn press_key(&self, key: &str, virtual_key: i64) -> Result<(), BrowserError> {
        let page = self.page.read().await;
        let page = page
            .as_ref()
            .ok_or(BrowserError::ConnectionLost("No active page".into()))?;

        let mut rng = rand::rngs::StdRng::from_entropy();
        let delay = rng.gen_range(100..300);
        tokio::time::sleep(Duration::from_millis(delay)).await;

        let key_down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::RawKeyDown)
            .key(key)
            .code(key)
            .windows_virtual_key_code(virtual_key)
            .native_virtual_key_code(virtual_key)
            .build()
            .map_err(BrowserError::JavaScriptError)?;
        page.execute(key_down)
            .await
            .map_err(|e| BrowserError::JavaScriptError(format!("CDP keyDown failed: {}", e)))?;

        // Enter needs the char event to trigger form submission
        if key == "Enter" {
            let char_event = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::Char)
                .text("\r")
                .build()
                .map_err(BrowserError::JavaScriptError)?;
            page.execute(char_event)
                .await
                .map_err(|e| BrowserError::JavaScriptError(format!("CDP char failed: {}", e)))?;
        }

        let key_up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key(key)
            .code(key)
            .windows_virtual_key_code(virtual_key)
            .native_virtual_key_code(virtual_key)
            .build()
            .map_err(BrowserError::JavaScriptError)?;
        page.execute(key_up)
            .await
            .map_err(|e| BrowserError::JavaScriptError(format!("CDP keyUp failed: {}", e)))?;

        Ok(())
    }

    /// All cookies visible to the current browsing context
    pub async fn get_cookies(&self) -> Result<Vec<Cookie>, BrowserError> {
        let page = self.page.read().await;
        let page = page
            .as_ref()
            .ok_or(BrowserError::ConnectionLost("No active page".into()))?;

        page.get_cookies()
            .await
            .map_err(|e| BrowserError::ConnectionLost(e.to_string()))
    }

    /// Install cookies into the browsing context
    pub async fn set_cookies(&self, cookies: Vec<CookieParam>) -> Result<(), BrowserError> {
        let page = self.page.read().await;
        let page = page
            .as_ref()
            .ok_or(BrowserError::ConnectionLost("No active page".into()))?;

        page.set_cookies(cookies)
            .await
            .map_err(|e| BrowserError::ConnectionLost(e.to_string()))?;

        Ok(())
    }

    /// Close the browser session
    pub async fn close(&self) -> Result<(), BrowserError> {
        // Mark as not alive first to prevent new operations
        self.alive.store(false, Ordering::Relaxed);

        // 1. Close the page first (stops navigation/JS execution)
        {
            let mut page = self.page.write().await;
            if let Some(p) = page.take() {
                let _ = p.close().await;
            }
        }

        // 2. Close the browser: graceful close, a grace period for child
        //    processes, then force kill (avoids zombie Chrome processes)
        {
            let mut browser = self.browser.write().await;
            if let Some(mut b) = browser.take() {
                let _ = b.close().await;
                tokio::time::sleep(Duration::from_millis(500)).await;
                let _ = b.kill().await;
            }
        }

        info!("Browser session {} closed", self.id);
        Ok(())
    }
}

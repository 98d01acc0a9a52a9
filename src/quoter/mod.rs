//! Quote orchestration
//!
//! `Quoter` is the small stateful session object the shells (CLI, UI)
//! drive. It owns the one browser session of a run, composes scanning,
//! challenge handling and the checkout driver into the four operations
//! callers depend on - start, scan_sizes, execute_quote, stop - and
//! persists the login session across runs.

mod checkout;
mod scan;

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::browser::{BrowserError, BrowserSessionConfig, BrowserSlot};
use crate::challenge::ChallengeHandler;
use crate::pricing::Category;
use crate::store::SessionStore;

pub use checkout::{
    buy_strategy_script, extract_last_price, parse_price, scan_total_lines, BuyStrategy,
    CheckoutOutcome, CheckoutStage, BUY_STRATEGIES, TOTAL_LABEL, TOTAL_LINE_LABELS,
};
pub use scan::{classify_listing_text, CategoryRule, SizeOption, CATEGORY_RULES};

/// Marketplace entry points
pub const STOCKX_HOME: &str = "https://stockx.com/";
pub const STOCKX_LOGIN: &str = "https://stockx.com/login";

/// Quote-workflow errors surfaced to the shells
#[derive(Debug, Error)]
pub enum QuoterError {
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("invalid size selection {index} (the live menu has {available} entries)")]
    InvalidSelection { index: usize, available: usize },

    #[error("no product has been scanned yet")]
    NothingScanned,
}

/// Marketplace account credentials
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// How a quote run starts
#[derive(Debug, Clone)]
pub struct QuoterConfig {
    pub credentials: Credentials,
    /// Start without a visible window (a challenge may still force one)
    pub headless: bool,
    /// Restore the persisted session instead of logging in
    pub use_saved_session: bool,
    /// Override the session artifact location
    pub state_path: Option<PathBuf>,
}

/// Result of one executed quote
#[derive(Debug, Clone)]
pub struct QuoteResult {
    /// Captured tax-inclusive checkout total; None means the capture
    /// failed and the caller should offer manual capture
    pub total: Option<f64>,
    /// Category in effect for this quote
    pub category: Category,
    /// Furthest checkout stage reached
    pub stage: CheckoutStage,
}

/// Options remembered from the last scan; execution indices only make
/// sense against this snapshot.
struct ScanSnapshot {
    url: String,
    options: Vec<SizeOption>,
}

/// The orchestrator: one browser session, sequential workflow
pub struct Quoter {
    slot: BrowserSlot,
    challenges: ChallengeHandler,
    store: SessionStore,
    credentials: Credentials,
    use_saved_session: bool,
    category: Category,
    scanned: Option<ScanSnapshot>,
}

impl Quoter {
    /// Build an orchestrator; no browser is launched until `start`
    pub fn new(config: QuoterConfig) -> Self {
        let store = config
            .state_path
            .map(SessionStore::new)
            .unwrap_or_else(|| SessionStore::at_default("session.json"));

        let slot = BrowserSlot::new(BrowserSessionConfig::for_run().headless(config.headless));
        let challenges = ChallengeHandler::new(store.clone());

        Self {
            slot,
            challenges,
            store,
            credentials: config.credentials,
            use_saved_session: config.use_saved_session,
            category: Category::default(),
            scanned: None,
        }
    }

    /// Where the persisted session artifact lives
    pub fn state_path(&self) -> &std::path::Path {
        self.store.path()
    }

    /// Flag raised while the run is suspended on a bot challenge
    pub fn awaiting_human(&self) -> Arc<AtomicBool> {
        self.challenges.awaiting_human()
    }

    /// Launch the browser and establish a usable marketplace session,
    /// either by restoring the persisted one (plus a home-page warm-up)
    /// or by logging in interactively.
    pub async fn start(&mut self) -> Result<(), QuoterError> {
        self.slot.launch().await?;

        if self.use_saved_session {
            let restored = self.store.restore_into_session(self.slot.session()?).await;
            info!("Restored {} cookies; skipping the login screen", restored);

            if let Err(e) = self.slot.session()?.navigate(STOCKX_HOME).await {
                warn!("Home-page warm-up failed: {}", e);
            }
            self.challenges.clear_obstacles(&mut self.slot).await?;
        } else {
            self.login().await?;
        }

        Ok(())
    }

    /// Interactive login. Credential auto-fill is best effort - when a
    /// selector is missing the human finishes in the window; the
    /// bounded wait for the home-page redirect is logged, not fatal.
    pub async fn login(&mut self) -> Result<(), QuoterError> {
        info!("Navigating to the login page");
        self.slot.session()?.navigate(STOCKX_LOGIN).await?;
        self.challenges.clear_obstacles(&mut self.slot).await?;

        if let Err(e) = self.fill_login_form().await {
            warn!("Login form auto-fill failed: {} - finish manually", e);
        }

        self.challenges.clear_obstacles(&mut self.slot).await?;

        info!(">>> Ensure you are logged in; fill anything missing in the window <<<");
        info!("Waiting for redirection to the homepage");

        let mut confirmed = false;
        for _ in 0..60 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            if let Ok(url) = self.slot.session()?.current_url().await {
                if url.trim_end_matches('/') == STOCKX_HOME.trim_end_matches('/') {
                    confirmed = true;
                    break;
                }
            }
        }

        if confirmed {
            info!("Login confirmed (on homepage)");
        } else {
            warn!("Timed out waiting for the homepage; proceeding anyway");
        }

        self.store.save_from_session(self.slot.session()?).await;
        Ok(())
    }

    /// Fill the login form with human-like per-character typing
    async fn fill_login_form(&mut self) -> Result<(), BrowserError> {
        let session = self.slot.session()?;

        // Wait for the email input to show up (bounded)
        let mut form_present = false;
        for _ in 0..20 {
            let visible = session
                .execute_js_with_timeout(
                    r#"(function() {
                        const el = document.querySelector('#email-login');
                        return !!el && el.offsetParent !== null;
                    })()"#,
                    5,
                )
                .await?
                .as_bool()
                .unwrap_or(false);
            if visible {
                form_present = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        if !form_present {
            return Err(BrowserError::ElementNotFound(
                "#email-login (maybe already logged in)".into(),
            ));
        }

        info!("Login form detected, filling credentials");

        let email = self.credentials.email.clone();
        let password = self.credentials.password.clone();

        session.click("#email-login").await?;
        session.type_text_cdp(&email).await?;
        // Tab out to trigger field validation
        session.press_key("Tab", 9).await?;
        tokio::time::sleep(Duration::from_millis(500)).await;

        session.click("#password-login").await?;
        session.type_text_cdp(&password).await?;
        tokio::time::sleep(Duration::from_millis(500)).await;

        info!("Clicking Log In");
        session.click("#btn-login").await?;
        Ok(())
    }

    /// Scan a product page for its size variants. A page without a size
    /// control yields an empty list (one-size or out-of-stock), not an
    /// error. The detected category replaces any earlier override.
    pub async fn scan_sizes(&mut self, url: &str) -> Result<Vec<SizeOption>, QuoterError> {
        // Jitter before navigating - regular request timing is a bot
        // fingerprint of its own.
        let delay = rand::rngs::StdRng::from_entropy().gen_range(1000..3000);
        tokio::time::sleep(Duration::from_millis(delay)).await;

        info!("Navigating to {}", url);
        self.slot.session()?.navigate(url).await?;
        self.challenges.clear_obstacles(&mut self.slot).await?;

        info!("Scanning available sizes");
        let options = if scan::open_size_menu(self.slot.session()?).await? {
            scan::enumerate_size_options(self.slot.session()?).await?
        } else {
            info!("Size control not found - one-size item or out of stock");
            Vec::new()
        };

        self.category = scan::detect_category(self.slot.session()?).await;
        self.scanned = Some(ScanSnapshot {
            url: url.to_string(),
            options: options.clone(),
        });

        Ok(options)
    }

    /// Category in effect for the next quote
    pub fn category(&self) -> Category {
        self.category
    }

    /// Override the detected category (until the next scan)
    pub fn set_category(&mut self, category: Category) {
        self.category = category;
    }

    /// Drive the checkout flow for a size index from the latest scan
    /// and capture the final total. The index is re-validated against
    /// the live menu, so stale indices fail explicitly instead of
    /// clicking an arbitrary entry.
    pub async fn execute_quote(&mut self, index: usize) -> Result<QuoteResult, QuoterError> {
        let snapshot = self.scanned.as_ref().ok_or(QuoterError::NothingScanned)?;
        if !snapshot.options.iter().any(|o| o.index == index) {
            return Err(QuoterError::InvalidSelection {
                index,
                available: snapshot.options.len(),
            });
        }

        // The index is only meaningful on the page it was scanned from;
        // the checkout driver still re-derives the live menu before
        // clicking, so a navigated-away page fails the bounds check
        // there instead of hitting an arbitrary entry.
        if let Ok(current) = self.slot.session()?.current_url().await {
            if !current.starts_with(snapshot.url.trim_end_matches('/')) {
                warn!(
                    "Page changed since the scan ({} -> {}), selection will be re-validated",
                    snapshot.url, current
                );
            }
        }

        let outcome = checkout::execute(&mut self.slot, &self.challenges, index).await?;

        Ok(QuoteResult {
            total: outcome.total,
            category: self.category,
            stage: outcome.stage,
        })
    }

    /// Human-assisted price capture: dump the page to a debug artifact,
    /// suspend until the caller signals the human is ready, then scan
    /// the visible text for a total. `None` keeps the same "capture
    /// failed" meaning as the automated path.
    pub async fn capture_price_manual(
        &mut self,
        ready: oneshot::Receiver<()>,
    ) -> Result<Option<f64>, QuoterError> {
        info!("Manual capture mode engaged");

        let dump_path = crate::app_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("checkout_dump.html");
        if let Err(e) = checkout::dump_page(self.slot.session()?, &dump_path).await {
            warn!("Could not dump the page for inspection: {}", e);
        }

        // Suspended until the human acknowledges - this is the explicit
        // "waiting for you" state, not a hang.
        let _ = ready.await;

        info!("Scanning page for prices");
        let text = self.slot.session()?.body_text().await?;
        Ok(checkout::scan_total_lines(&text))
    }

    /// Close the browser session. Idempotent; safe to call on a run
    /// that never started.
    pub async fn stop(&mut self) {
        self.slot.close().await;
        self.scanned = None;
    }
}

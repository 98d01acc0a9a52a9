//! Single-session browser slot
//!
//! The orchestrator owns exactly one browser at a time. The slot holds
//! that session and knows how to replace it, most importantly for the
//! headless -> visible escalation when a bot challenge needs a human.
//! Once escalated, every later relaunch stays visible: flipping back to
//! headless is known to re-trigger detection.

use tracing::{info, warn};

use super::{BrowserError, BrowserSession, BrowserSessionConfig};

/// Holder for the one live [`BrowserSession`] of a quote run
pub struct BrowserSlot {
    session: Option<BrowserSession>,
    config: BrowserSessionConfig,
}

impl BrowserSlot {
    /// Create an empty slot with the given launch configuration
    pub fn new(config: BrowserSessionConfig) -> Self {
        Self {
            session: None,
            config,
        }
    }

    /// Whether future launches run headless
    pub fn is_headless(&self) -> bool {
        self.config.headless
    }

    /// Whether a session is currently held
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Borrow the live session
    pub fn session(&self) -> Result<&BrowserSession, BrowserError> {
        self.session
            .as_ref()
            .ok_or_else(|| BrowserError::SessionNotFound("no active browser session".into()))
    }

    /// Launch a session, replacing (and fully closing) any existing one.
    /// The old browser is always dead before the new one is used.
    pub async fn launch(&mut self) -> Result<&BrowserSession, BrowserError> {
        self.close().await;

        let session = BrowserSession::new(self.config.clone()).await?;
        info!(
            "Slot now holds session {} (headless: {})",
            session.id, self.config.headless
        );
        self.session = Some(session);
        self.session()
    }

    /// Tear down the current session and relaunch with a visible window.
    /// Pins the slot to visible mode for the rest of its lifetime.
    pub async fn escalate_to_visible(&mut self) -> Result<(), BrowserError> {
        if !self.config.headless {
            return Ok(());
        }

        info!("Escalating browser to visible mode (pinned for this run)");
        self.config.headless = false;
        self.launch().await?;
        Ok(())
    }

    /// Close the held session, if any. Idempotent.
    pub async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!("Error closing session {}: {}", session.id, e);
            }
        }
    }
}

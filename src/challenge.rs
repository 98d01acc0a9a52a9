//! Obstacle handling for marketplace pages
//!
//! Before any page content is trusted, two kinds of obstacles get
//! cleared: cookie-consent banners (dismissed automatically) and bot
//! challenges ("press & hold" interstitials), which need a human.
//!
//! A challenge on a headless session forces a relaunch in visible mode
//! with the saved cookies restored and the last URL reloaded, because a
//! window nobody can see cannot be solved. The wait for the human has
//! no timeout on purpose: the run is suspended, not hung, and the
//! `awaiting_human` flag lets a caller render that state. After the
//! challenge clears, the session is persisted immediately - the cookie
//! jar now carries the trust token - and the browser stays visible for
//! the rest of the run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::browser::{BrowserError, BrowserSession, BrowserSlot};
use crate::store::SessionStore;

/// Body-text markers of a bot challenge (matched case-insensitively)
pub const CHALLENGE_MARKERS: &[&str] = &["press & hold", "verify you are human"];

/// URL path segment used by the challenge interstitial
pub const CHALLENGE_URL_SEGMENT: &str = "challenge";

/// Probes for the cookie-consent banner, tried in order; the first
/// visible match is clicked.
const DISMISS_COOKIE_BANNER_JS: &str = r#"
    (function() {
        const probes = [
            () => document.querySelector('#onetrust-accept-btn-handler'),
            () => Array.from(document.querySelectorAll('button, a'))
                      .find(el => (el.innerText || '').trim() === 'Accept All'),
            () => document.querySelector('.onetrust-close-btn-handler'),
        ];
        for (const probe of probes) {
            try {
                const el = probe();
                if (el && el.offsetParent !== null) {
                    el.click();
                    return true;
                }
            } catch (e) {}
        }
        return false;
    })()
"#;

/// JS condition matching any challenge marker in the body text
fn marker_condition() -> String {
    CHALLENGE_MARKERS
        .iter()
        .map(|marker| format!("body.includes({marker:?})"))
        .collect::<Vec<_>>()
        .join(" || ")
}

fn detect_challenge_js() -> String {
    format!(
        r#"
        (function() {{
            const url = window.location.href || '';
            const modal = document.querySelector('#px-captcha-modal');
            const modalVisible = !!(modal && modal.offsetParent !== null);
            const body = document.body ? document.body.innerText.toLowerCase() : '';
            const marker = {markers};
            const onChallengeUrl = url.includes({segment:?});
            return {{
                challenged: modalVisible || marker || onChallengeUrl,
                reason: modalVisible ? 'modal' : marker ? 'marker' : onChallengeUrl ? 'url' : ''
            }};
        }})()
        "#,
        markers = marker_condition(),
        segment = CHALLENGE_URL_SEGMENT,
    )
}

fn markers_cleared_js() -> String {
    format!(
        r#"
        (function() {{
            const body = document.body ? document.body.innerText.toLowerCase() : '';
            return !({markers});
        }})()
        "#,
        markers = marker_condition(),
    )
}

/// Clears known page obstacles, escalating to a human when needed
pub struct ChallengeHandler {
    store: SessionStore,
    awaiting_human: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl ChallengeHandler {
    /// Create a handler persisting cleared sessions into `store`
    pub fn new(store: SessionStore) -> Self {
        Self {
            store,
            awaiting_human: Arc::new(AtomicBool::new(false)),
            poll_interval: Duration::from_secs(2),
        }
    }

    /// Flag set while the run is suspended waiting for a human to solve
    /// a challenge. Callers render this as "waiting for you".
    pub fn awaiting_human(&self) -> Arc<AtomicBool> {
        self.awaiting_human.clone()
    }

    /// Dismiss a cookie-consent banner if one is showing. Absence and
    /// probe failures are both non-events.
    pub async fn dismiss_cookie_banner(session: &BrowserSession) {
        match session
            .execute_js_with_timeout(DISMISS_COOKIE_BANNER_JS, 10)
            .await
        {
            Ok(v) if v.as_bool() == Some(true) => {
                info!("Dismissed cookie-consent banner");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Ok(_) => trace!("No cookie banner present"),
            Err(e) => trace!("Cookie banner probe failed: {}", e),
        }
    }

    /// Best-effort challenge detection. Probe failures read as "not
    /// challenged" - a false negative just means a later step fails
    /// and surfaces its own error.
    pub async fn is_challenged(session: &BrowserSession) -> bool {
        match session
            .execute_js_with_timeout(&detect_challenge_js(), 10)
            .await
        {
            Ok(result) => {
                let challenged = result
                    .get("challenged")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                if challenged {
                    let reason = result
                        .get("reason")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown");
                    warn!("Bot challenge detected (reason: {})", reason);
                }
                challenged
            }
            Err(e) => {
                trace!("Challenge probe failed: {}", e);
                false
            }
        }
    }

    /// Neutralize obstacles on the current page before trusting it.
    ///
    /// Only a failed browser relaunch during the headless -> visible
    /// escalation propagates; every probe error is swallowed.
    pub async fn clear_obstacles(&self, slot: &mut BrowserSlot) -> Result<(), BrowserError> {
        let challenged = {
            let session = match slot.session() {
                Ok(s) => s,
                Err(_) => return Ok(()),
            };
            Self::dismiss_cookie_banner(session).await;
            Self::is_challenged(session).await
        };

        if !challenged {
            return Ok(());
        }

        if let Ok(session) = slot.session() {
            session.increment_challenges();
        }

        if slot.is_headless() {
            // A headless window cannot be solved by a human: restart the
            // logical session in visible mode on the same URL.
            let resume_url = match slot.session() {
                Ok(s) => s.current_url().await.ok(),
                Err(_) => None,
            };

            info!("Headless session hit a challenge; switching to a visible window");
            slot.escalate_to_visible().await?;

            let session = slot.session()?;
            let restored = self.store.restore_into_session(session).await;
            debug!("Restored {} cookies into the visible session", restored);

            if let Some(url) = resume_url {
                info!("Restoring page: {}", url);
                if let Err(e) = session.navigate(&url).await {
                    warn!("Could not reload {} after escalation: {}", url, e);
                }
                Self::dismiss_cookie_banner(session).await;
            }
        }

        let session = slot.session()?;

        self.awaiting_human.store(true, Ordering::SeqCst);
        info!("WAITING FOR YOU: solve the challenge in the browser window");
        info!("The run resumes as soon as the challenge text disappears (no timeout)");

        // Deliberate unbounded wait - only the human clears this.
        let cleared_probe = markers_cleared_js();
        loop {
            tokio::time::sleep(self.poll_interval).await;
            match session.execute_js_with_timeout(&cleared_probe, 10).await {
                Ok(v) if v.as_bool() == Some(true) => break,
                Ok(_) => {}
                Err(e) => debug!("Challenge poll failed, still waiting: {}", e),
            }
        }

        self.awaiting_human.store(false, Ordering::SeqCst);
        info!("Challenge appears to be cleared, resuming");
        tokio::time::sleep(Duration::from_secs(2)).await;

        // The cookie jar now carries the trust token - persist it so the
        // next run can skip straight past the wall.
        self.store.save_from_session(session).await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_condition_covers_all_markers() {
        let condition = marker_condition();
        assert!(condition.contains("press & hold"));
        assert!(condition.contains("verify you are human"));
        assert!(condition.contains(" || "));
    }

    #[test]
    fn detect_script_checks_modal_markers_and_url() {
        let script = detect_challenge_js();
        assert!(script.contains("#px-captcha-modal"));
        assert!(script.contains("press & hold"));
        assert!(script.contains("\"challenge\""));
    }

    #[test]
    fn cleared_probe_negates_the_markers() {
        let script = markers_cleared_js();
        assert!(script.starts_with('\n') || script.contains("(function()"));
        assert!(script.contains("!("));
        assert!(script.contains("verify you are human"));
    }
}

//! Glin payment client
//!
//! Cookie-based session reuse plus two REST calls: payment terms for a
//! USD amount and (optionally) a payment link. The persisted cookie
//! state makes repeat quotes instant; only when the session has expired
//! does a one-off browser login refresh it.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::browser::{BrowserSession, BrowserSessionConfig, DESKTOP_USER_AGENT};
use crate::quoter::Credentials;
use crate::store::SessionStore;

use super::message;
use super::types::*;

/// Glin dashboard base URL
pub const GLIN_BASE: &str = "https://www.glin.com.br";

/// Public payment-link host
pub const GLINPAY_BASE: &str = "https://glinpay.me";

/// Cookie domain for restored session cookies
const GLIN_COOKIE_DOMAIN: &str = ".glin.com.br";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Client for the Glin merchant API
pub struct GlinClient {
    client: Client,
    store: SessionStore,
    credentials: Option<Credentials>,
}

impl GlinClient {
    /// Build a client from the default persisted Glin state
    pub fn new(credentials: Option<Credentials>) -> Result<Self, GlinError> {
        Self::with_store(SessionStore::at_default("glin_state.json"), credentials)
    }

    /// Build a client backed by an explicit session store
    pub fn with_store(
        store: SessionStore,
        credentials: Option<Credentials>,
    ) -> Result<Self, GlinError> {
        let client = Self::build_client(&store.load().cookies)?;
        Ok(Self {
            client,
            store,
            credentials,
        })
    }

    /// reqwest client with the persisted cookies preloaded into its jar
    fn build_client(
        cookies: &[crate::store::PersistedCookie],
    ) -> Result<Client, GlinError> {
        let base: reqwest::Url = GLIN_BASE
            .parse()
            .map_err(|e: url::ParseError| GlinError::InvalidResponse(e.to_string()))?;

        let jar = Arc::new(Jar::default());
        for cookie in cookies {
            let domain = if cookie.domain.is_empty() {
                GLIN_COOKIE_DOMAIN
            } else {
                cookie.domain.as_str()
            };
            let cookie_str = format!(
                "{}={}; Domain={}; Path={}",
                cookie.name, cookie.value, domain, cookie.path
            );
            jar.add_cookie_str(&cookie_str, &base);
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("pt-BR,pt;q=0.9,en;q=0.8"),
        );
        headers.insert(
            REFERER,
            HeaderValue::from_static("https://www.glin.com.br/merchant/dashboard/charge"),
        );
        headers.insert(ORIGIN, HeaderValue::from_static(GLIN_BASE));

        Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .cookie_provider(jar)
            .user_agent(DESKTOP_USER_AGENT)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| GlinError::NetworkError(e.to_string()))
    }

    /// Validate the session via `GET /api/user`.
    /// Returns the merchant slug on success.
    pub async fn validate_session(&self) -> Result<String, GlinError> {
        let response = self
            .client
            .get(format!("{}/api/user", GLIN_BASE))
            .send()
            .await
            .map_err(|e| GlinError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            info!("Glin session invalid (status {})", response.status());
            return Err(GlinError::SessionInvalid);
        }

        let user: UserResponse = response
            .json()
            .await
            .map_err(|e| GlinError::InvalidResponse(e.to_string()))?;

        match user.merchants.first().and_then(|m| m.slug.clone()) {
            Some(slug) => {
                info!("Glin session valid, merchant: {}", slug);
                Ok(slug)
            }
            None => {
                info!("Glin session valid but no merchants attached");
                Err(GlinError::SessionInvalid)
            }
        }
    }

    /// Fetch payment terms for a USD amount
    pub async fn fetch_payment_terms(
        &self,
        slug: &str,
        usd_amount: f64,
    ) -> Result<PaymentTerms, GlinError> {
        let url = format!(
            "{}/app/merchants/{}/payment-terms/USD{:.2}",
            GLIN_BASE, slug, usd_amount
        );
        info!("Fetching payment terms for USD {:.2}", usd_amount);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GlinError::NetworkError(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GlinError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            warn!(
                "payment-terms request failed (status {}): {}",
                status,
                crate::safe_truncate(&text, 200)
            );
            return Err(GlinError::InvalidResponse(format!("status {}", status)));
        }

        let value: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| GlinError::InvalidResponse(e.to_string()))?;

        // The terms sometimes come wrapped in a "paymentTerms" envelope
        let terms_value = value.get("paymentTerms").cloned().unwrap_or(value);
        serde_json::from_value(terms_value)
            .map_err(|e| GlinError::InvalidResponse(e.to_string()))
    }

    /// Create a payment link and return its public URL
    pub async fn create_payment_link(
        &self,
        slug: &str,
        usd_amount: f64,
    ) -> Result<String, GlinError> {
        let url = format!("{}/app/merchants/{}/payment-links", GLIN_BASE, slug);
        let amount = (usd_amount * 100.0).round() / 100.0;

        info!("Creating payment link for USD {:.2}", amount);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "amount": amount,
                "currency": "USD",
                "unique": false
            }))
            .send()
            .await
            .map_err(|e| GlinError::NetworkError(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GlinError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            warn!(
                "payment-links request failed (status {}): {}",
                status,
                crate::safe_truncate(&text, 200)
            );
            return Err(GlinError::InvalidResponse(format!("status {}", status)));
        }

        let link_response: PaymentLinkResponse = serde_json::from_str(&text)
            .map_err(|e| GlinError::InvalidResponse(e.to_string()))?;

        let id = link_response.id_segment().ok_or_else(|| {
            GlinError::InvalidResponse(format!(
                "no link id in response: {}",
                crate::safe_truncate(&text, 200)
            ))
        })?;

        let link = format!("{}/{}/{}/USD{:.2}", GLINPAY_BASE, slug, id, usd_amount);
        info!("Payment link created: {}", link);
        Ok(link)
    }

    /// Refresh the persisted session by logging in through a headless
    /// browser, then rebuild the HTTP client from the new cookies.
    pub async fn login_via_browser(&mut self) -> Result<(), GlinError> {
        let credentials = self
            .credentials
            .clone()
            .ok_or(GlinError::MissingCredentials)?;

        info!("Glin session expired, logging in via browser (one time)");

        let session = BrowserSession::new(BrowserSessionConfig::for_run().headless(true)).await?;
        let outcome = self.browser_login_flow(&session, &credentials).await;

        if outcome.is_ok() {
            self.store.save_from_session(&session).await;
        }
        let _ = session.close().await;
        outcome?;

        self.client = Self::build_client(&self.store.load().cookies)?;
        info!("Glin login complete, session saved");
        Ok(())
    }

    async fn browser_login_flow(
        &self,
        session: &BrowserSession,
        credentials: &Credentials,
    ) -> Result<(), GlinError> {
        let charge_url = format!("{}/merchant/dashboard/charge", GLIN_BASE);

        // Whatever cookies we still have may shortcut the login page
        self.store.restore_into_session(session).await;
        session.navigate(&charge_url).await?;
        tokio::time::sleep(Duration::from_secs(3)).await;

        let url = session.current_url().await?;
        if url.contains("login") {
            info!("Filling Glin credentials");
            session.click("#email").await?;
            session.type_text_cdp(&credentials.email).await?;

            session.click(r#"input[placeholder="Senha"]"#).await?;
            session.type_text_cdp(&credentials.password).await?;

            session.click("#submit-btn").await?;
        }

        let mut last_url = url;
        for _ in 0..60 {
            if last_url.contains("/merchant/dashboard/charge") && !last_url.contains("login") {
                debug!("Reached the charge dashboard");
                return Ok(());
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
            last_url = session.current_url().await.unwrap_or(last_url);
        }

        Err(GlinError::LoginFailed(format!(
            "timed out waiting for the dashboard, stuck at {}",
            last_url
        )))
    }

    /// Full quote flow: validate (re-login once if needed), fetch
    /// terms, parse, optionally create a payment link.
    pub async fn quote(
        &mut self,
        usd_amount: f64,
        generate_link: bool,
    ) -> Result<GlinQuote, GlinError> {
        let slug = match self.validate_session().await {
            Ok(slug) => slug,
            Err(e) => {
                info!("Glin session not usable ({}), starting login", e);
                self.login_via_browser().await?;
                self.validate_session().await?
            }
        };

        let terms = self.fetch_payment_terms(&slug, usd_amount).await?;
        let mut quote = message::parse_payment_terms(&terms);

        if generate_link {
            match self.create_payment_link(&slug, usd_amount).await {
                Ok(link) => quote.payment_link = Some(link),
                Err(e) => warn!("Could not create a payment link: {}", e),
            }
        }

        Ok(quote)
    }
}

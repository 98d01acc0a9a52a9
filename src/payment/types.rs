//! Wire types for the Glin payment platform
//!
//! Models for session validation, payment terms and payment links.

use serde::{Deserialize, Serialize};

/// `GET /api/user` response (only the fields the quoter needs)
#[derive(Debug, Deserialize)]
pub struct UserResponse {
    #[serde(default)]
    pub merchants: Vec<Merchant>,
}

/// One merchant attached to the logged-in account
#[derive(Debug, Deserialize)]
pub struct Merchant {
    pub slug: Option<String>,
}

/// Payment terms for one quoted amount
#[derive(Debug, Default, Deserialize)]
pub struct PaymentTerms {
    #[serde(default)]
    pub options: Vec<PaymentOption>,
}

/// One payment method offered (pix, card, ...)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOption {
    #[serde(default)]
    pub method: String,
    pub total_due_amount: Option<f64>,
    #[serde(default)]
    pub installment_plans: Vec<InstallmentPlan>,
}

/// One card installment plan
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallmentPlan {
    #[serde(default)]
    pub installments: u32,
    pub installment_amount: Option<f64>,
    pub total_amount: Option<f64>,
}

/// `POST /app/merchants/{slug}/payment-links` response
#[derive(Debug, Deserialize)]
pub struct PaymentLinkResponse {
    /// The API has returned both string and numeric ids
    pub id: Option<serde_json::Value>,
}

impl PaymentLinkResponse {
    /// The link id as a path segment, if present
    pub fn id_segment(&self) -> Option<String> {
        match self.id.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// One formatted installment row for the quote message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Installment {
    /// Number of installments
    pub n: u32,
    /// e.g. "3x R$ 412,10"
    pub value: String,
    /// e.g. "Total: R$ 1.236,30"
    pub total: String,
}

/// A parsed Glin quote ready for message formatting
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlinQuote {
    /// Pix total, e.g. "R$ 10.542,37" ("N/A" when absent)
    pub pix: String,
    /// Single-installment card amount
    pub card_1x: String,
    /// All card installment plans, sorted by installment count
    pub installments: Vec<Installment>,
    /// Filled when a payment link was requested and created
    pub payment_link: Option<String>,
}

/// Glin integration errors
#[derive(Debug, thiserror::Error)]
pub enum GlinError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Session invalid or no merchant attached")]
    SessionInvalid,

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Missing credentials: set GLIN_EMAIL and GLIN_PASSWORD")]
    MissingCredentials,

    #[error("Browser error: {0}")]
    Browser(#[from] crate::browser::BrowserError),
}

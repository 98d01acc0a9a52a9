//! Glin payment integration
//!
//! A simpler sibling of the browser workflow: reuses a persisted
//! cookie session against the Glin merchant API to turn a USD quote
//! into Pix/card figures and customer-facing messages.

mod client;
mod message;
mod types;

pub use client::{GlinClient, GLINPAY_BASE, GLIN_BASE};
pub use message::{format_brl, format_glin_message, format_payment_link_message, parse_payment_terms};
pub use types::{GlinError, GlinQuote, Installment, PaymentTerms};

use fulfillment_engine::{
    db_types::OrderRef,
    traits::{CollaboratorError, PaymentProcessor, PaymentQuote},
};
use log::*;
use serde::{Deserialize, Serialize};
use sfg_common::{CoinAmount, Money};

use crate::config::ProcessorConfig;

/// HTTP client for the payment processor's address-issuing API. The processor quotes the crypto amount at its own
/// exchange rate and registers our order reference so its settlement webhook can correlate back to us.
#[derive(Clone)]
pub struct HttpPaymentProcessor {
    client: reqwest::Client,
    config: ProcessorConfig,
}

#[derive(Debug, Serialize)]
struct AddressRequest<'a> {
    reference: &'a str,
    currency: &'a str,
    fiat_amount: i64,
}

#[derive(Debug, Deserialize)]
struct AddressResponse {
    address: String,
    /// Quoted amount in micro-coins.
    crypto_amount: i64,
    /// The processor's minimum transaction size in micro-coins.
    minimum: i64,
}

impl HttpPaymentProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self { client: reqwest::Client::new(), config }
    }
}

impl PaymentProcessor for HttpPaymentProcessor {
    async fn request_payment(
        &self,
        order_ref: &OrderRef,
        currency: &str,
        fiat_total: Money,
    ) -> Result<PaymentQuote, CollaboratorError> {
        if self.config.base_url.is_empty() {
            return Err(CollaboratorError::Unreachable("SFG_PROCESSOR_URL is not configured".to_string()));
        }
        let url = format!("{}/v1/addresses", self.config.base_url.trim_end_matches('/'));
        let body = AddressRequest { reference: order_ref.as_str(), currency, fiat_amount: fiat_total.value() };
        trace!("🏦️ Requesting payment address for {order_ref} ({currency}, {fiat_total})");
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.reveal())
            .json(&body)
            .send()
            .await
            .map_err(|e| CollaboratorError::Unreachable(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            debug!("🏦️ Processor rejected the address request ({status}): {detail}");
            return Err(CollaboratorError::Rejected(format!("{status}: {detail}")));
        }
        let quote: AddressResponse =
            response.json().await.map_err(|e| CollaboratorError::Rejected(e.to_string()))?;
        Ok(PaymentQuote {
            payment_address: quote.address,
            crypto_amount: CoinAmount::from(quote.crypto_amount),
            minimum: CoinAmount::from(quote.minimum),
        })
    }
}

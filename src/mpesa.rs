//! Safaricom Daraja (M-Pesa) integration: STK push initiation and the
//! asynchronous result-callback payload types.
//!
//! The client makes exactly two calls per initiation: an OAuth token fetch
//! (basic auth over pre-shared consumer credentials) and the STK push
//! submission (bearer auth). Both are safe to retry; Daraja issues a fresh
//! CheckoutRequestID per accepted push.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::MpesaConfig;
use crate::error::{AppError, Result};

/// Kenyan country code used in canonical (E.164 without plus) phone form.
const COUNTRY_CODE: &str = "254";

/// Minimum digit count for a plausible subscriber number (no prefix).
const MIN_SUBSCRIBER_DIGITS: usize = 9;

/// Normalize a raw phone input to canonical `2547XXXXXXXX` form.
///
/// Deterministic and total over plausible local formats: separators are
/// stripped, a local trunk `0` prefix is replaced by the country code, a
/// leading `+254` loses its plus (the plus is a non-digit), and a bare
/// subscriber number gets the country code prepended.
pub fn normalize_phone(raw: &str) -> Result<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() < MIN_SUBSCRIBER_DIGITS {
        return Err(AppError::BadRequest(
            "Phone number is too short; use e.g. 0712345678".into(),
        ));
    }

    let normalized = if let Some(rest) = digits.strip_prefix('0') {
        format!("{}{}", COUNTRY_CODE, rest)
    } else if digits.starts_with(COUNTRY_CODE) {
        digits
    } else {
        format!("{}{}", COUNTRY_CODE, digits)
    };

    // Canonical form: 254 + 9 subscriber digits
    if normalized.len() != COUNTRY_CODE.len() + MIN_SUBSCRIBER_DIGITS {
        return Err(AppError::BadRequest(
            "Phone number has the wrong length; use e.g. 0712345678".into(),
        ));
    }

    Ok(normalized)
}

/// STK push request signing material: base64(shortcode + passkey + timestamp).
fn stk_password(short_code: &str, passkey: &str, timestamp: &str) -> String {
    BASE64.encode(format!("{}{}{}", short_code, passkey, timestamp))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
struct StkPushBody<'a> {
    #[serde(rename = "BusinessShortCode")]
    business_short_code: &'a str,
    #[serde(rename = "Password")]
    password: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "TransactionType")]
    transaction_type: &'static str,
    #[serde(rename = "Amount")]
    amount: i64,
    #[serde(rename = "PartyA")]
    party_a: &'a str,
    #[serde(rename = "PartyB")]
    party_b: &'a str,
    #[serde(rename = "PhoneNumber")]
    phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    callback_url: &'a str,
    #[serde(rename = "AccountReference")]
    account_reference: &'a str,
    #[serde(rename = "TransactionDesc")]
    transaction_desc: &'a str,
}

/// Daraja's synchronous answer to an STK push submission.
/// ResponseCode "0" means accepted-for-processing, not paid.
#[derive(Debug, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription")]
    pub response_description: String,
    #[serde(rename = "CustomerMessage")]
    pub customer_message: String,
}

#[derive(Clone)]
pub struct MpesaClient {
    client: Client,
    config: MpesaConfig,
}

impl MpesaClient {
    pub fn new(config: MpesaConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Fetch a short-lived bearer token using the pre-shared consumer
    /// key/secret. Not cached; the call is cheap and retry-safe.
    async fn access_token(&self) -> Result<String> {
        let url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.config.env.base_url()
        );

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("token fetch failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("bad token response: {}", e)))?;

        Ok(token.access_token)
    }

    /// Submit an STK push for `amount` KES to `phone` (canonical form).
    ///
    /// Returns the processor's correlation identifiers on acceptance; a
    /// non-zero ResponseCode surfaces Daraja's own description as the error.
    pub async fn stk_push(
        &self,
        amount: i64,
        phone: &str,
        account_reference: &str,
        transaction_desc: &str,
    ) -> Result<StkPushResponse> {
        let token = self.access_token().await?;

        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
        let password = stk_password(&self.config.short_code, &self.config.passkey, &timestamp);

        let body = StkPushBody {
            business_short_code: &self.config.short_code,
            password,
            timestamp,
            transaction_type: "CustomerPayBillOnline",
            amount,
            party_a: phone,
            party_b: &self.config.short_code,
            phone_number: phone,
            callback_url: &self.config.callback_url,
            account_reference,
            transaction_desc,
        };

        let url = format!(
            "{}/mpesa/stkpush/v1/processrequest",
            self.config.env.base_url()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("STK push failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "STK push endpoint returned {}: {}",
                status, body
            )));
        }

        let push: StkPushResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("bad STK push response: {}", e)))?;

        if push.response_code != "0" {
            return Err(AppError::Upstream(format!(
                "STK push rejected ({}): {}",
                push.response_code, push.response_description
            )));
        }

        Ok(push)
    }
}

// ============ Result callback payload ============

/// Top-level callback envelope: `{"Body": {"stkCallback": {...}}}`.
///
/// Every level is optional so a malformed payload degrades to "no callback
/// found" instead of a parse failure.
#[derive(Debug, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: Option<CallbackBody>,
}

impl CallbackEnvelope {
    pub fn stk_callback(self) -> Option<StkCallback> {
        self.body.and_then(|b| b.stk_callback)
    }
}

#[derive(Debug, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: Option<StkCallback>,
}

#[derive(Debug, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc")]
    pub result_desc: Option<String>,
    /// Present only when ResultCode is 0.
    #[serde(rename = "CallbackMetadata")]
    pub metadata: Option<CallbackMetadata>,
}

impl StkCallback {
    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }

    /// M-Pesa receipt number from the metadata list, if present.
    pub fn receipt(&self) -> Option<String> {
        self.metadata_str("MpesaReceiptNumber")
    }

    pub fn payer_phone(&self) -> Option<String> {
        self.metadata_str("PhoneNumber")
    }

    pub fn amount(&self) -> Option<f64> {
        self.metadata_value("Amount").and_then(|v| v.as_f64())
    }

    fn metadata_str(&self, name: &str) -> Option<String> {
        self.metadata_value(name).map(|v| match v.as_str() {
            Some(s) => s.to_string(),
            // PhoneNumber arrives as a JSON number
            None => v.to_string(),
        })
    }

    fn metadata_value(&self, name: &str) -> Option<&serde_json::Value> {
        self.metadata
            .as_ref()?
            .items
            .iter()
            .find(|item| item.name == name)
            .and_then(|item| item.value.as_ref())
    }
}

/// Variable-length `{Name, Value}` list. Unknown names are ignored and a
/// missing `Value` does not fail the parse.
#[derive(Debug, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize)]
pub struct MetadataItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<serde_json::Value>,
}

/// The acknowledgement shape Daraja expects. Always sent with ResultCode 0
/// so the processor never retries a payload we cannot act on anyway.
#[derive(Debug, Serialize)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc")]
    pub result_desc: &'static str,
}

impl CallbackAck {
    pub fn received() -> Self {
        Self {
            result_code: 0,
            result_desc: "Callback received successfully",
        }
    }
}

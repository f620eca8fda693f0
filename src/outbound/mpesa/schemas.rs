use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::domain::notification::{NotificationResult, SettlementMetadata};

/// The only transaction type used for paybill push prompts.
pub const TRANSACTION_TYPE: &str = "CustomerPayBillOnline";

/// Gateway error code meaning the bearer token was not accepted.
pub const INVALID_ACCESS_TOKEN_CODE: &str = "404.001.03";

/// Token exchange response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub expires_in: Option<u64>,
}

/// `expires_in` arrives as `"3599"` on the sandbox and as a number elsewhere.
fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Push submission body. Field names and casing are fixed by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StkPushRequest {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "TransactionType")]
    pub transaction_type: &'static str,
    #[serde(rename = "Amount")]
    pub amount: String,
    #[serde(rename = "PartyA")]
    pub party_a: String,
    #[serde(rename = "PartyB")]
    pub party_b: String,
    #[serde(rename = "PhoneNumber")]
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub call_back_url: String,
    #[serde(rename = "AccountReference")]
    pub account_reference: String,
    #[serde(rename = "TransactionDesc")]
    pub transaction_desc: String,
}

/// Synchronous acknowledgment of a push submission.
#[derive(Debug, Clone, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: Option<String>,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: String,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: Option<String>,
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayErrorBody {
    #[serde(rename = "requestId", default)]
    pub request_id: Option<String>,
    #[serde(rename = "errorCode", default)]
    pub error_code: Option<String>,
    #[serde(rename = "errorMessage", default)]
    pub error_message: Option<String>,
}

impl GatewayErrorBody {
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }

    pub fn is_invalid_token(&self) -> bool {
        self.error_code.as_deref() == Some(INVALID_ACCESS_TOKEN_CODE)
    }
}

/// Result callback, with or without the outer `Body` envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CallbackPayload {
    Enveloped {
        #[serde(rename = "Body")]
        body: CallbackBody,
    },
    Bare(StkCallback),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode", deserialize_with = "lenient_code")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: String,
    #[serde(rename = "CallbackMetadata", default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

fn lenient_code<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom("ResultCode is not an integer")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom("ResultCode is not an integer")),
        _ => Err(serde::de::Error::custom("ResultCode is not an integer")),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<CallbackItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<Value>,
}

impl CallbackMetadata {
    fn get(&self, name: &str) -> Option<&Value> {
        self.items
            .iter()
            .find(|item| item.name == name)
            .and_then(|item| item.value.as_ref())
    }

    fn text(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Amounts come back as `1` or `1.00`; only whole values are accepted.
    fn whole_amount(&self) -> Option<u64> {
        let n = self.get("Amount")?.as_f64()?;
        (n >= 0.0 && n.fract() == 0.0).then_some(n as u64)
    }

    fn settled_at(&self, offset: UtcOffset) -> Option<OffsetDateTime> {
        let raw = self.text("TransactionDate")?;
        PrimitiveDateTime::parse(
            &raw,
            format_description!("[year][month][day][hour][minute][second]"),
        )
        .ok()
        .map(|local| local.assume_offset(offset))
    }

    fn settlement(&self, offset: UtcOffset) -> SettlementMetadata {
        SettlementMetadata {
            receipt_number: self.text("MpesaReceiptNumber"),
            amount: self.whole_amount(),
            settled_at: self.settled_at(offset),
            phone: self.text("PhoneNumber"),
        }
    }
}

impl CallbackPayload {
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    pub fn into_callback(self) -> StkCallback {
        match self {
            CallbackPayload::Enveloped { body } => body.stk_callback,
            CallbackPayload::Bare(callback) => callback,
        }
    }

    /// Map the wire callback to a domain result. `offset` is the gateway's
    /// local offset used for `TransactionDate`.
    pub fn into_notification(self, offset: UtcOffset) -> NotificationResult {
        let callback = self.into_callback();
        let mut result = NotificationResult::new(
            callback.checkout_request_id,
            callback.result_code,
            callback.result_desc,
        );
        if let Some(id) = callback.merchant_request_id {
            result = result.with_merchant_request_id(id);
        }
        if let Some(metadata) = callback.callback_metadata
            && !metadata.items.is_empty()
        {
            result = result.with_settlement(metadata.settlement(offset));
        }
        result
    }
}

/// Acknowledgment returned to the gateway for every callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc")]
    pub result_desc: &'static str,
}

impl CallbackAck {
    pub fn accepted() -> Self {
        Self {
            result_code: 0,
            result_desc: "Accepted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::notification::PaymentOutcome;
    use time::macros::datetime;

    const SUCCESS_CALLBACK: &str = r#"{
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {
                    "Item": [
                        {"Name": "Amount", "Value": 1.00},
                        {"Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV"},
                        {"Name": "Balance"},
                        {"Name": "TransactionDate", "Value": 20191219102115},
                        {"Name": "PhoneNumber", "Value": 254708374149}
                    ]
                }
            }
        }
    }"#;

    #[test]
    fn test_token_response_accepts_string_and_number_lifetime() -> Result<(), serde_json::Error> {
        let sandbox: TokenResponse =
            serde_json::from_str(r#"{"access_token":"abc","expires_in":"3599"}"#)?;
        assert_eq!(sandbox.expires_in, Some(3599));

        let numeric: TokenResponse =
            serde_json::from_str(r#"{"access_token":"abc","expires_in":3600}"#)?;
        assert_eq!(numeric.expires_in, Some(3600));

        let garbage: TokenResponse =
            serde_json::from_str(r#"{"access_token":"abc","expires_in":"soon"}"#)?;
        assert_eq!(garbage.expires_in, None);

        let missing: TokenResponse = serde_json::from_str(r#"{"access_token":"abc"}"#)?;
        assert_eq!(missing.expires_in, None);
        Ok(())
    }

    #[test]
    fn test_stk_push_request_field_names() -> Result<(), serde_json::Error> {
        let request = StkPushRequest {
            business_short_code: "174379".to_string(),
            password: "cGFzcw==".to_string(),
            timestamp: "20250730143000".to_string(),
            transaction_type: TRANSACTION_TYPE,
            amount: "100".to_string(),
            party_a: "254796022656".to_string(),
            party_b: "174379".to_string(),
            phone_number: "254796022656".to_string(),
            call_back_url: "https://example.com/cb".to_string(),
            account_reference: "TestPayment".to_string(),
            transaction_desc: "Goods payment".to_string(),
        };

        let value = serde_json::to_value(&request)?;
        let object = value.as_object().expect("object");
        let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "AccountReference",
                "Amount",
                "BusinessShortCode",
                "CallBackURL",
                "PartyA",
                "PartyB",
                "Password",
                "PhoneNumber",
                "Timestamp",
                "TransactionDesc",
                "TransactionType",
            ]
        );
        assert_eq!(value["TransactionType"], "CustomerPayBillOnline");
        assert_eq!(value["Amount"], "100");
        Ok(())
    }

    #[test]
    fn test_gateway_error_body() {
        let body = r#"{"requestId":"1-2","errorCode":"404.001.03","errorMessage":"Invalid Access Token"}"#;
        let parsed = GatewayErrorBody::parse(body).expect("parses");
        assert!(parsed.is_invalid_token());

        let other = GatewayErrorBody::parse(
            r#"{"errorCode":"400.002.02","errorMessage":"Bad Request - Invalid BusinessShortCode"}"#,
        )
        .expect("parses");
        assert!(!other.is_invalid_token());
    }

    #[test]
    fn test_success_callback_maps_settlement() -> Result<(), serde_json::Error> {
        let eat = UtcOffset::from_hms(3, 0, 0).expect("valid offset");
        let result = CallbackPayload::parse(SUCCESS_CALLBACK.as_bytes())?.into_notification(eat);

        assert_eq!(result.checkout_request_id, "ws_CO_191220191020363925");
        assert_eq!(result.outcome, PaymentOutcome::Success);
        let settlement = result.settlement.expect("settlement present");
        assert_eq!(settlement.receipt_number.as_deref(), Some("NLJ7RT61SV"));
        assert_eq!(settlement.amount, Some(1));
        assert_eq!(settlement.phone.as_deref(), Some("254708374149"));
        assert_eq!(
            settlement.settled_at,
            Some(datetime!(2019-12-19 10:21:15 +3))
        );
        Ok(())
    }

    #[test]
    fn test_cancelled_callback_without_metadata() -> Result<(), serde_json::Error> {
        let body = r#"{"Body":{"stkCallback":{
            "MerchantRequestID":"29115-34620561-1",
            "CheckoutRequestID":"ws_CO_2",
            "ResultCode":1032,
            "ResultDesc":"Request cancelled by user"}}}"#;

        let result = CallbackPayload::parse(body.as_bytes())?.into_notification(UtcOffset::UTC);
        assert_eq!(result.outcome, PaymentOutcome::Cancelled);
        assert_eq!(result.settlement, None);
        Ok(())
    }

    #[test]
    fn test_bare_callback_is_accepted() -> Result<(), serde_json::Error> {
        let body = r#"{"CheckoutRequestID":"ws_CO_1","ResultCode":0}"#;
        let result = CallbackPayload::parse(body.as_bytes())?.into_notification(UtcOffset::UTC);
        assert_eq!(result.checkout_request_id, "ws_CO_1");
        assert_eq!(result.outcome, PaymentOutcome::Success);
        Ok(())
    }

    #[test]
    fn test_malformed_callback_fails_to_parse() {
        assert!(CallbackPayload::parse(b"not json").is_err());
        assert!(CallbackPayload::parse(br#"{"Body":{}}"#).is_err());
        assert!(CallbackPayload::parse(br#"{"CheckoutRequestID":"x","ResultCode":"abc"}"#).is_err());
    }

    #[test]
    fn test_callback_ack_shape() -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(CallbackAck::accepted())?;
        assert_eq!(value, serde_json::json!({"ResultCode": 0, "ResultDesc": "Accepted"}));
        Ok(())
    }
}

#![allow(dead_code)]

use std::collections::HashMap;

use mpesa_express::{config::Config, server::Server};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SHORTCODE: &str = "174379";
pub const PHONE: &str = "254796022656";

fn gateway_vars(gateway_url: &str) -> HashMap<String, String> {
    [
        ("server.host", "localhost"),
        ("server.port", "0"),
        ("mpesa.base_url", gateway_url),
        ("mpesa.consumer_key", "key"),
        ("mpesa.consumer_secret", "secret"),
        ("mpesa.shortcode", SHORTCODE),
        ("mpesa.passkey", "passkey"),
        ("mpesa.callback_url", "https://example.com/api/mpesa/callback"),
        ("payments.request_timeout_secs", "1"),
        ("payments.token_retry_base_delay_ms", "1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Spawns the service against a mocked gateway and returns its base URL.
pub async fn spawn_server_with(gateway_url: &str, overrides: &[(&str, &str)]) -> String {
    let mut vars = gateway_vars(gateway_url);
    for (key, value) in overrides {
        vars.insert(key.to_string(), value.to_string());
    }
    let config = Config::load_with_sources(Some(vars)).unwrap();

    let server = Server::new(&config).await.unwrap();

    let port = server.port().unwrap();
    tokio::spawn(server.run());

    format!("http://{}:{}", config.server.host, port)
}

pub async fn spawn_server() -> String {
    spawn_server_with("http://127.0.0.1:9", &[]).await
}

pub async fn mount_token(gateway: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/oauth/v1/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "tok-1",
            "expires_in": "3599"
        })))
        .mount(gateway)
        .await;
}

pub fn accepted_ack(checkout_request_id: &str) -> serde_json::Value {
    serde_json::json!({
        "MerchantRequestID": "29115-34620561-1",
        "CheckoutRequestID": checkout_request_id,
        "ResponseCode": "0",
        "ResponseDescription": "Success. Request accepted for processing",
        "CustomerMessage": "Success. Request accepted for processing"
    })
}

pub fn success_callback(checkout_request_id: &str) -> serde_json::Value {
    serde_json::json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": checkout_request_id,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {
                    "Item": [
                        {"Name": "Amount", "Value": 100},
                        {"Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV"},
                        {"Name": "TransactionDate", "Value": 20191219102115u64},
                        {"Name": "PhoneNumber", "Value": 254796022656u64}
                    ]
                }
            }
        }
    })
}

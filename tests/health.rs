mod utils;

use reqwest::Client;

#[tokio::test]
async fn test_health_check_does_not_need_gateway() {
    // The default test gateway URL points at a closed port.
    let addr = utils::spawn_server().await;

    let response = Client::new()
        .get(format!("{addr}/health"))
        .send()
        .await
        .expect("Failed to execute request.");

    assert!(response.status().is_success());
    assert_eq!(Some(0), response.content_length());
}

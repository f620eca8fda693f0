pub async fn home() -> &'static str {
    "M-Pesa Express"
}

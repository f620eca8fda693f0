// M-Pesa Daraja gateway adapter
//
// Wire-level pieces:
//   credentials, http_client, password, retry_strategy, schemas
//
// Lifecycle components:
//   token_manager – caches bearer tokens and renews them on demand
//   initiator     – signs and submits push requests, opens correlations

pub mod credentials;
pub mod http_client;
pub mod initiator;
pub mod password;
pub mod retry_strategy;
pub mod schemas;
pub mod token_manager;

// Re-export commonly used types
pub use credentials::Credentials;
pub use http_client::{GatewayHttpClient, GatewayResponse, HttpClientError};
pub use initiator::{PaymentInitiator, RequestDefaults};
pub use password::{PasswordSigner, SignedStamp};
pub use retry_strategy::RetryStrategy;
pub use schemas::{CallbackAck, CallbackPayload, StkPushRequest, StkPushResponse};
pub use token_manager::{TokenManager, TokenPolicy};

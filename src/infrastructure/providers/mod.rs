pub mod connection_hub;
pub mod notifier;

pub use connection_hub::{ConnectionHub, MockBroadcastGateway};
pub use notifier::{GatewayNotifier, MockNotifier, WebhookNotifier};

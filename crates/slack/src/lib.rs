//! Slack Integration - incoming webhook notifier
//!
//! This crate delivers dealwatch notifications to Slack:
//! - **Message** (`message`) - flat text webhook body and payload rendering
//! - **Transport** (`transport`) - HTTP POST seam with a reqwest implementation
//! - **Dispatcher** (`dispatcher`) - one best-effort POST per event, in order
//!
//! # Getting Started
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Enable Incoming Webhooks and add one for the target workspace
//! 3. Set `DEALWATCH_DISPATCH_ENDPOINT_URL`, `DEALWATCH_DISPATCH_CHANNEL`,
//!    `DEALWATCH_DISPATCH_IDENTITY_NAME`
//!
//! # Architecture
//!
//! ```text
//! Events → NotificationDispatcher → WebhookMessage → WebhookTransport → Slack
//!                 ↓
//!            ActivityLog (receipts, errors)
//! ```

pub mod dispatcher;
pub mod message;
pub mod transport;

pub use dispatcher::{DispatchError, DispatchReport, NotificationDispatcher};
pub use message::{render_text, WebhookMessage};
pub use transport::{ReqwestWebhookTransport, TransportError, WebhookTransport};

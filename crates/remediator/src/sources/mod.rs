pub mod alertmanager;
pub mod webhook;

pub use alertmanager::{AlertmanagerAlert, AlertmanagerPayload};
pub use webhook::{WebhookHandler, WebhookSummary};

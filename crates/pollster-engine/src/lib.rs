//! Pollster engine
//!
//! Watches a bucket and relays every newly observed object to a webhook:
//! - `differ`: which keys are new this round
//! - `dispatcher`: bounded, concurrent per-object capability issuance and delivery
//! - `notifier`: the webhook HTTP client
//! - `reaper`: deletion of the previous round's keys
//! - `poll_loop`: the cycle that ties them together

pub mod differ;
pub mod dispatcher;
pub mod metrics;
pub mod notifier;
pub mod poll_loop;
pub mod reaper;

pub use differ::diff;
pub use dispatcher::{DispatchSummary, Dispatcher, DispatcherConfig};
pub use notifier::{Notifier, WebhookNotifier};
pub use poll_loop::{PollLoop, PollOptions, RoundReport};
pub use reaper::{ReapSummary, Reaper};

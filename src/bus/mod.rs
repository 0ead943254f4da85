//! In-process message bus.
//!
//! Components publish small text messages (`fs.changed`, `repo.changed`,
//! `tree.synced`, ...) onto a broker; interested parties subscribe by
//! topic pattern. Delivery is best-effort: slow subscribers drop.

mod broker;
mod message;

pub use broker::{Broker, Subscription, INCOMING_CAPACITY, SUBSCRIBER_CAPACITY};
pub use message::Message;

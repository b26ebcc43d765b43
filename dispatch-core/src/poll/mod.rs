//! Periodic snapshot polling, the consistency backstop for the push
//! channel.

mod scheduler;
mod source;

pub use scheduler::{PollBatch, PollConfig, PollScheduler};
pub use source::{HttpPollSource, PollSource};

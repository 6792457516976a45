pub mod event_consumer;

pub use event_consumer::{process_message, start_event_consumer};

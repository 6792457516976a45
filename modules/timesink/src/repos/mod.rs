pub mod event_log;
pub mod inmemory_event_log;
pub mod matching;
pub mod pg_event_log;

pub use event_log::{bounded, Deadline, EventLog, StorageError};
pub use inmemory_event_log::InMemoryEventLog;
pub use pg_event_log::PgEventLog;

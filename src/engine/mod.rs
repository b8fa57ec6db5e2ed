//! Engine module: the delivery and filter jobs and the CLI around the pipeline

pub mod arg_parser;
pub mod cli;
pub mod delivery;
pub mod filter;
pub mod progress;
pub mod store;

// Re-export commonly used items
pub use arg_parser::{Cli, Command, DeliverArgs, FilterArgs};
pub use cli::{count_without_chat_id, handle_run, resolve_config, run_deliver, run_filter};
pub use delivery::{Deliverer, Notification, SentReceipt, load_notifications};
pub use filter::{ACTIVE_DEPRECATED_DATE, MatchSet, Service, ServiceFilter, ServiceMatch, load_services};
pub use store::{EntityStore, StoredEntity};

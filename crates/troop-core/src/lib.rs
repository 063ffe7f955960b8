pub mod account;
pub mod constants;
pub mod error;
pub mod fleet;
pub mod ledger;
pub mod types;

pub use account::{Node, User};
pub use constants::*;
pub use error::CoordinatorError;
pub use fleet::{EngineInfo, HardwareInfo, Heartbeat, NodeStatus};
pub use ledger::{AuditEvent, AuditRecord, EntryMeta, LedgerEntry};
pub use types::*;

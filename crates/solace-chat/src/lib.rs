//! Crisis-aware chat dispatch: screening, conversation state, model calls
//! with graceful fallback, and usage bookkeeping.

pub mod completion;
pub mod conversation;
pub mod crisis;
pub mod dispatcher;
pub mod resources;
pub mod suggestions;
pub mod usage;

pub use completion::{CompletionBackend, CompletionClient, CompletionError, HttpCompletionBackend};
pub use conversation::{ConversationStore, StoreError};
pub use crisis::{CrisisDetector, CrisisSeverity};
pub use dispatcher::{ChatOutcome, DispatchError, Dispatcher};
pub use usage::{QuotaExceeded, UsageStore};

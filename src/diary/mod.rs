//! Diary engine: bots, their entry store, the audit trail and the nag timer.
//!
//! - [`bot`]: the [`Bot`](bot::Bot): save/delete/retime, notification fan-out, nags
//! - [`store`]: the [`EntryStore`](store::EntryStore) trait and its SQLite implementation
//! - [`audit`]: snapshot-then-apply mutations
//! - [`history`]: canned history queries and their relative links
//! - [`structured`]: structured-input choice trees and English conversion
//! - [`nag`]: nag delay policy and the cancellable timer

pub mod audit;
pub mod bot;
pub mod error;
pub mod history;
pub mod nag;
pub mod store;
pub mod structured;
pub mod types;

pub use bot::{Bot, BotIdentity, HistoryPage, NagOutcome};
pub use error::{BotError, StoreError};
pub use types::{Entry, EntryFields, Kvs, Payload, SavedEntry};

//! Version storage: the mutable current store and the append-only history
//! store. Both are owned and mutated exclusively by the coordinator; the
//! query engine reads them under the shared lock.

mod current;
mod history;

pub use current::CurrentStore;
pub use history::HistoryStore;

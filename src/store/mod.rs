mod error;
mod history;
mod scenarios;

pub use error::StoreError;
pub use history::{DEFAULT_HISTORY_CAPACITY, HistoryEntry, HistoryLog};
pub use scenarios::{
    InsertAt, ScenarioStore, Selection, SharedScenarioStore, StoreEvent, StoreObserver,
};

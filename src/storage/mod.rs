mod alarm_store;
mod file_store;
mod key_value;

pub use alarm_store::{ALARM_LIST_KEY, AlarmStore, SCHEDULED_IDS_KEY_PREFIX};
pub use file_store::FileKeyValueStore;
pub use key_value::{InMemoryKeyValueStore, KeyValueStore};

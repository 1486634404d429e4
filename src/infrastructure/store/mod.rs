pub mod local_store;

pub use local_store::{collections, LocalStore};

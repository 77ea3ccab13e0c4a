pub mod error;
pub mod local_cache;
pub mod remote_store;

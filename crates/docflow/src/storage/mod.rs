pub mod object_store;

pub use object_store::{is_staging_file, LocalObjectStore};

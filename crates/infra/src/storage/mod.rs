//! Storage adapters

pub mod file;

pub use file::FileStorage;

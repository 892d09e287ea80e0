//! Storage abstraction and implementations for Recolor.
//!
//! This crate provides a trait-based, whole-document storage interface with a
//! JSON file implementation and an in-memory one.

#![warn(missing_docs)]

pub mod json_storage;
pub mod memory_storage;
pub mod trait_;

pub use json_storage::JsonStorage;
pub use memory_storage::MemoryStorage;
pub use trait_::{recover, Document, Result, Storage, StorageError};

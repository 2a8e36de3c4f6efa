//! Deterministic, pure logic for the backup file format.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! values and lines of text and return deterministic outputs suitable for tests.

pub mod array;
pub mod record;
pub mod types;
pub mod value_codec;

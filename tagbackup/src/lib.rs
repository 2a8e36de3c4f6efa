//! Backup and restore of automation tag values through a delimited text file.
//!
//! The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure logic (record splitting and quoting, value encoding,
//!   array flattening). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (record files, config, the tag
//!   store file, the bridge command). Remote tag access sits behind the
//!   [`io::remote::TagClient`] trait so tests can use an in-memory tree.
//!
//! Orchestration modules ([`backup`], [`restore`], [`job`]) coordinate core
//! logic with I/O to implement the CLI commands.

pub mod backup;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod job;
pub mod logging;
pub mod restore;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

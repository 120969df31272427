//! Range addressing and local command routing.
//!
//! - [`store`]: per-store registry of hosted ranges and command execution.
//! - [`local_sender`]: routes calls to in-process stores, retrying on
//!   range-key mismatches caused by concurrent splits.
//! - [`addressing`]: computes the two-level addressing-index updates for range
//!   splits and merges.
//! - [`index`]: reads, resolves and verifies the addressing index.

pub mod addressing;
pub mod api;
pub mod client;
pub mod clock;
pub mod descriptor;
pub mod error;
pub mod index;
pub mod keys;
pub mod kv;
pub mod local_sender;
pub mod store;

pub use addressing::{
    addressing_batch, bootstrap_range_addressing, merge_adjacent, merge_range_addressing,
    split_range_addressing, MetaOp,
};
pub use api::{Call, Method, Request, Response};
pub use client::Db;
pub use descriptor::{RangeDescriptor, Replica, StoreIdent};
pub use error::{Error, Result};
pub use index::AddressingIndex;
pub use local_sender::{KvSender, LocalSender, LocalSenderConfig};
pub use store::{RangeHandle, RangeOwner, Store};

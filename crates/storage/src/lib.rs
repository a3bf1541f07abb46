// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fabric-storage: Durable JSON persistence for the Task Fabric
//!
//! Every durable file in the fabric goes through the same atomic-write
//! discipline (serialize → sibling tmp → fsync → rename) so readers see
//! either the previous content or the new content, never a truncation.

pub mod atomic;
pub mod store;

pub use atomic::{write_json_atomic, AtomicWriteError};
pub use store::{LoadOutcome, StateStore, StateStoreError};

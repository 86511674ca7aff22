// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Instance sync task building for remote delegates.
//!
//! For every supported deployment target kind this crate
//! 1. resolves the target's infrastructure descriptor and decrypts its credentials,
//! 2. serializes them into a versioned [`wire::WireTaskParams`] payload that a
//!    delegate re-executes on every sync tick, and
//! 3. builds a one-shot [`delegate_task::DelegateTask`] that checks the delegate can
//!    actually reach the target before the periodic task is committed.
//!
//! [`registrar::InstanceSyncRegistrar`] ties the three steps together.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod delegate_task;
pub mod error;
pub mod provider;
pub mod registrar;
pub mod target;
pub mod wire;

pub use config::InstanceSyncConfig;
pub use delegate_task::{
    DelegateResponse, DelegateTask, DelegateTaskQueue, QueueError, TaskData, TaskParameters,
    TaskType,
};
pub use error::InstanceSyncError;
pub use provider::{InstanceSyncKind, ResolvedProviderConfig};
pub use registrar::{InstanceSyncRegistrar, Registration};
pub use target::TargetReference;
pub use wire::WireTaskParams;

// SPDX-License-Identifier: GPL-3.0-only

//! Dynamic partition management for super devices
//!
//! `lptools` edits the logical partition table stored in a super device and
//! keeps device-mapper state in step with it:
//! - [`context`] resolves the slot, suffix, super device and group
//! - [`engine`] runs one command against a loaded table and the mapper
//! - [`report`] describes what a command did, as text or JSON
//!
//! Table storage, device-mapper and boot-control access come from
//! `lptools-sys`.

pub mod cli;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod logging;
pub mod report;

pub use config::Config;
pub use context::{Context, ContextArgs, ContextDefaults, Target};
pub use engine::{Engine, Operation};
pub use error::{LpError, Result};
pub use report::Outcome;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tq-adapters: thin adapters over external services.
//!
//! Everything the daemon touches outside its own process goes through this
//! crate: the terminal multiplexer, local and sprite (remote VM) command
//! execution, and file following for transcripts and hook files.

pub mod env;
pub mod follow;
pub mod runner;
pub mod session;
pub mod subprocess;

pub use follow::{FollowFrom, FollowHandle};
pub use runner::{CommandRunner, LocalRunner, RunnerError, SshRunner};
pub use session::{SessionError, SessionHost, TmuxSessionHost, WindowSpec};
pub use subprocess::run_with_timeout;

#[cfg(any(test, feature = "test-support"))]
pub use runner::{FakeRunner, RunnerCall};
#[cfg(any(test, feature = "test-support"))]
pub use session::{FakeSessionHost, SessionCall};

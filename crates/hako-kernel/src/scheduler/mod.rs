//! Scheduler module for hako — spawned processes and the execution loop.
//!
//! This module provides:
//! - **Process table**: One entry per spawned background execution, keyed by
//!   a monotonic pid, safe for concurrent insert/remove/lookup.
//! - **Execution loop**: A single background worker that drives a
//!   caller-supplied action and reclaims exited processes each iteration.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ProcessTable                           │
//! │  procs: HashMap<Pid, Arc<Process>>                          │
//! │  - alloc_pid() → Pid (atomic, never reused)                 │
//! │  - insert/get/remove/pids                                   │
//! │  - reap() — drop every Exited entry                         │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ExecutionLoop                          │
//! │  loop { action(); table.reap(); tick }  until stopped       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod exec_loop;
mod process;

pub use exec_loop::{ExecutionLoop, LoopAction};
pub use process::{Process, ProcessTable};

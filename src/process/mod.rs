// src/process/mod.rs

//! OS process plumbing for the supervised terminal.
//!
//! - [`spawn`] launches the child in its own process group.
//! - [`output`] drains stdout/stderr into the log sink.
//! - [`terminate`] holds the platform termination primitives.
//! - [`table`] is the process-table capability used by the cleanup sweep.
//! - [`shutdown`] is the staged stop sequence built on top of those.

pub mod output;
pub mod shutdown;
pub mod spawn;
pub mod table;
pub mod terminate;

pub use output::{OutputReaders, spawn_output_readers};
pub use shutdown::{ShutdownReport, Stage};
pub use spawn::{ChildHandle, LaunchSpec, Spawned, spawn_child};
pub use table::{ProcessTable, SysinfoProcessTable};
pub use terminate::{OsTerminator, Terminator, force_kill_pid};

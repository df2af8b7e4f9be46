#![allow(unused_imports)]

pub use terminal_supervisor_test_utils::builders::{ConfigBuilder, TerminalFixture, scripts};
pub use terminal_supervisor_test_utils::fakes::{
    BytesSource, FlakyTerminator, QuietProcessTable, StageFailures,
};
pub use terminal_supervisor_test_utils::{LogCapture, eventually, init_tracing, with_timeout};
#[cfg(unix)]
pub use terminal_supervisor_test_utils::pid_alive;

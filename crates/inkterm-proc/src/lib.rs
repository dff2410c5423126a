//! inkterm-proc: child process plumbing for inkterm sessions.
//!
//! A session never talks to the operating system directly. It asks this crate
//! to spawn a command with every stdio stream piped, then consumes a single
//! ordered channel of [`ProcessEvent`]s: output chunks from stdout and stderr,
//! a close notification per stream, and the exit status.
//!
//! # Architecture
//!
//! - [`ProcessHandle`]: Spawns the child and owns the receiving end of its event channel.
//!   Dropping a handle whose child is still running kills the child.
//! - [`OutputChunk`]: One read from stdout or stderr, tagged with its stream.
//! - [`ExecMode`]: Whether the command line goes through `sh -c` or is executed directly.

pub mod process;

pub use process::{
    build_command, ChunkData, ExecMode, OutputChunk, ProcError, ProcessEvent, ProcessHandle,
    StreamKind, DEFAULT_SHELL, READ_CHUNK_SIZE,
};

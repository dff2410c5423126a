//! inkterm-core: a shell transcript that lives inside an ordinary text document.
//!
//! The user types a command after a prompt; the session notices the edit,
//! runs the command, streams its output back into the same document and
//! appends a fresh prompt. Nothing here knows how the document is displayed:
//! the host editor is reached only through the traits in [`buffer`].
//!
//! # Architecture
//!
//! - [`DirectoryTracker`]: The session's logical working directory and `cd` resolution.
//! - [`PromptManager`]: Renders the prompt and decides how it is placed.
//! - [`ParsedCommand`]: Pending input since the command boundary, completed and tokenized.
//! - [`WriteSerializer`]: FIFO, single in-flight guard for every document mutation.
//! - [`bridge`]: Runs commands as processes (or through a [`ReplyBridge`]) and filters output.
//! - [`SessionState`]: The phase machine that classifies edit batches.
//! - [`Session`]: Ties everything together around one document.
//! - [`SessionManager`]: Opens, tracks and closes sessions.
//! - [`MemoryHost`]: An in-memory Buffer Service for tests and headless use.

pub mod boundary;
pub mod bridge;
pub mod buffer;
pub mod command;
pub mod config;
pub mod directory;
pub mod error;
pub mod filter;
pub mod manager;
pub mod memory;
pub mod prompt;
pub mod session;
pub mod state;
pub mod writer;

pub use boundary::CommandBoundary;
pub use bridge::{Executor, ReplyBridge};
pub use buffer::{
    BufferError, BufferService, Change, Document, DocumentId, EditBatch, Insert, Position,
    Surface, SurfaceId,
};
pub use command::ParsedCommand;
pub use config::ShellConfig;
pub use directory::DirectoryTracker;
pub use error::ShellError;
pub use manager::SessionManager;
pub use memory::MemoryHost;
pub use prompt::PromptManager;
pub use session::{Session, SessionId};
pub use state::{EditOutcome, Phase, SessionState};
pub use writer::{WriteSerializer, WriteTurn};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a std mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

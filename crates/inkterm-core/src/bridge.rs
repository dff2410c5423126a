//! Runs a dispatched command and streams what it produces into the session.
//!
//! Two executors exist. [`Executor::Process`] spawns the command line with
//! piped stdio and writes every stdout/stderr chunk as it arrives.
//! [`Executor::Reply`] hands the line to a [`ReplyBridge`] and writes its
//! single reply. Either way the cycle ends with a prompt reset, whatever
//! went wrong in between.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use inkterm_proc::{
    ChunkData, ExecMode, OutputChunk, ProcError, ProcessEvent, ProcessHandle, StreamKind,
};

use crate::command::ParsedCommand;
use crate::error::ShellError;
use crate::filter::{strip_control_sequences, Utf8Carry};
use crate::session::Session;

/// A request/response collaborator that answers a command line with one reply.
#[async_trait]
pub trait ReplyBridge: Send + Sync {
    fn name(&self) -> &str;

    /// Prepare the bridge. Called once per session, before the first request.
    async fn connect(&self) -> Result<(), String> {
        Ok(())
    }

    /// Answer `line`. Only string replies can be written to the document.
    async fn request(&self, line: &str) -> Result<Value, String>;
}

/// How a session runs the commands it dispatches.
#[derive(Clone)]
pub enum Executor {
    Process(ExecMode),
    Reply(Arc<dyn ReplyBridge>),
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Executor::Process(mode) => f.debug_tuple("Process").field(mode).finish(),
            Executor::Reply(bridge) => f.debug_tuple("Reply").field(&bridge.name()).finish(),
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Executor::Process(ExecMode::default())
    }
}

/// Turns raw chunks into document text, one UTF-8 carry per stream.
#[derive(Debug, Default)]
pub struct OutputPipeline {
    stdout: Utf8Carry,
    stderr: Utf8Carry,
}

impl OutputPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    fn carry(&mut self, stream: StreamKind) -> &mut Utf8Carry {
        match stream {
            StreamKind::Stdout => &mut self.stdout,
            StreamKind::Stderr => &mut self.stderr,
        }
    }

    /// Filter and decode one chunk.
    pub fn push(&mut self, chunk: &OutputChunk) -> Result<String, ShellError> {
        match &chunk.data {
            ChunkData::Bytes(bytes) => {
                let text = self.carry(chunk.stream).decode(bytes);
                Ok(strip_control_sequences(&text).into_owned())
            }
            ChunkData::Structured(value) => Err(ShellError::UnexpectedOutputType {
                found: value_kind(value).to_string(),
            }),
        }
    }

    /// Flush what `stream` still holds once it has closed.
    pub fn close(&mut self, stream: StreamKind) -> String {
        let text = self.carry(stream).finish();
        strip_control_sequences(&text).into_owned()
    }
}

/// Text to write for a bridge reply.
pub fn reply_text(value: Value) -> Result<String, ShellError> {
    match value {
        Value::String(text) => Ok(strip_control_sequences(&text).into_owned()),
        other => Err(ShellError::UnexpectedOutputType {
            found: value_kind(&other).to_string(),
        }),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn spawn_error(directory: &Path, err: ProcError) -> ShellError {
    if directory.is_dir() {
        ShellError::Spawn(err)
    } else {
        ShellError::UnresolvedWorkingDirectory {
            directory: directory.to_path_buf(),
            source: err,
        }
    }
}

pub(crate) async fn run_process(session: &Session, mode: &ExecMode, command: &ParsedCommand) {
    let directory = session.directory();
    let mut handle =
        match ProcessHandle::spawn(&command.program, &command.args, &directory, mode) {
            Ok(handle) => handle,
            Err(err) => {
                let err = spawn_error(&directory, err);
                log::warn!("session {}: `{}`: {err}", session.id(), command.line);
                session.reset_prompt().await;
                return;
            }
        };

    log::debug!(
        "session {}: `{}` started (pid {:?})",
        session.id(),
        command.line,
        handle.pid()
    );
    session.attach_input(handle.take_input());
    drain(session, &mut handle).await;
}

/// Write output until both streams close, then reset the prompt.
///
/// After an error the rest of the output is drained and dropped so the child
/// never blocks on a full pipe.
pub(crate) async fn drain(session: &Session, handle: &mut ProcessHandle) {
    let mut pipeline = OutputPipeline::new();
    let mut open_streams = 2;
    let mut aborted = false;
    let mut prompted = false;

    while let Some(event) = handle.next_event().await {
        match event {
            ProcessEvent::Chunk(chunk) => {
                if aborted {
                    continue;
                }
                let written = match pipeline.push(&chunk) {
                    Ok(text) => session.write_output(&text).await,
                    Err(err) => Err(err),
                };
                if let Err(err) = written {
                    log::error!("session {}: dropping output: {err}", session.id());
                    aborted = true;
                }
            }
            ProcessEvent::Closed(stream) => {
                log::trace!("session {}: {stream} closed", session.id());
                let rest = pipeline.close(stream);
                if !aborted {
                    if let Err(err) = session.write_output(&rest).await {
                        log::error!("session {}: dropping output: {err}", session.id());
                        aborted = true;
                    }
                }
                open_streams -= 1;
                if open_streams == 0 && !prompted {
                    session.close_input();
                    session.reset_prompt().await;
                    prompted = true;
                }
            }
            ProcessEvent::Exited(code) => {
                log::debug!("session {}: exited with {code:?}", session.id());
            }
        }
    }

    if !prompted {
        session.close_input();
        session.reset_prompt().await;
    }
}

pub(crate) async fn run_reply(session: &Session, bridge: &dyn ReplyBridge, command: &ParsedCommand) {
    if let Err(err) = reply(session, bridge, command).await {
        log::warn!("session {}: {} bridge: {err}", session.id(), bridge.name());
    }
    session.reset_prompt().await;
}

async fn reply(
    session: &Session,
    bridge: &dyn ReplyBridge,
    command: &ParsedCommand,
) -> Result<(), String> {
    if !session.bridge_connected() {
        bridge.connect().await?;
        session.set_bridge_connected();
        log::debug!("session {}: connected to {}", session.id(), bridge.name());
    }

    let value = bridge.request(&command.line).await?;
    let text = reply_text(value).map_err(|err| err.to_string())?;
    session
        .write_output(&text)
        .await
        .map_err(|err| err.to_string())
}

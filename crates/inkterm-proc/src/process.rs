use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};

/// Shell used for [`ExecMode::Shell`] when nothing else is configured.
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Maximum number of bytes delivered in a single [`OutputChunk`].
pub const READ_CHUNK_SIZE: usize = 8192;

const EVENT_CAPACITY: usize = 64;
const INPUT_CAPACITY: usize = 16;

/// Errors from spawning or talking to a child process.
#[derive(Debug)]
pub enum ProcError {
    SpawnFailed {
        program: String,
        cwd: PathBuf,
        source: std::io::Error,
    },
    MissingPipe(&'static str),
    IoError(std::io::Error),
}

impl fmt::Display for ProcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcError::SpawnFailed {
                program,
                cwd,
                source,
            } => write!(
                f,
                "failed to spawn {program} in {}: {source}",
                cwd.display()
            ),
            ProcError::MissingPipe(stream) => write!(f, "child {stream} was not piped"),
            ProcError::IoError(err) => write!(f, "process I/O error: {err}"),
        }
    }
}

impl std::error::Error for ProcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProcError::SpawnFailed { source, .. } => Some(source),
            ProcError::IoError(err) => Some(err),
            ProcError::MissingPipe(_) => None,
        }
    }
}

impl From<std::io::Error> for ProcError {
    fn from(err: std::io::Error) -> Self {
        ProcError::IoError(err)
    }
}

/// Which output stream a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}

/// Payload of an output chunk.
///
/// Pipes only ever produce `Bytes`. `Structured` exists for producers that
/// hand over decoded values instead of raw output; sessions refuse to write
/// those into a document.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkData {
    Bytes(Vec<u8>),
    Structured(serde_json::Value),
}

/// A single read from one of the child's output streams.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputChunk {
    pub stream: StreamKind,
    pub data: ChunkData,
}

impl OutputChunk {
    pub fn bytes(stream: StreamKind, data: impl Into<Vec<u8>>) -> Self {
        Self {
            stream,
            data: ChunkData::Bytes(data.into()),
        }
    }
}

/// Everything a running child reports, in the order it happened per stream.
///
/// Chunks of one stream arrive in order; chunks of stdout and stderr may
/// interleave arbitrarily. `Closed` is sent once per stream after its last
/// chunk, `Exited` once the child has been reaped.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    Chunk(OutputChunk),
    Closed(StreamKind),
    Exited(Option<i32>),
}

/// How a command line is handed to the operating system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecMode {
    /// Join program and arguments with spaces and run them with `<shell> -c`.
    Shell(PathBuf),
    /// Execute the program directly with the arguments as given.
    Direct,
}

impl Default for ExecMode {
    fn default() -> Self {
        ExecMode::Shell(PathBuf::from(DEFAULT_SHELL))
    }
}

/// Build the command for `program` with fully piped stdio.
///
/// `PWD` is set to `cwd` so that `pwd` reports the logical directory rather
/// than a symlink-resolved one.
pub fn build_command(program: &str, args: &[String], cwd: &Path, mode: &ExecMode) -> Command {
    let mut cmd = match mode {
        ExecMode::Shell(shell) => {
            let mut line = program.to_string();
            for arg in args {
                line.push(' ');
                line.push_str(arg);
            }
            let mut cmd = Command::new(shell);
            cmd.arg("-c").arg(line);
            cmd
        }
        ExecMode::Direct => {
            let mut cmd = Command::new(program);
            cmd.args(args);
            cmd
        }
    };

    cmd.current_dir(cwd)
        .env("PWD", cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

/// A spawned child process seen through its event channel.
pub struct ProcessHandle {
    pid: Option<u32>,
    events: mpsc::Receiver<ProcessEvent>,
    input: Option<mpsc::Sender<Vec<u8>>>,
    // Dropping the sender wakes the reaper task, which kills a child that is still running.
    _kill: Option<oneshot::Sender<()>>,
}

impl ProcessHandle {
    /// Spawn `program` with `args` in `cwd`.
    ///
    /// Must be called from within a tokio runtime: one task per output
    /// stream, one for stdin and one reaping the child are started here.
    pub fn spawn(
        program: &str,
        args: &[String],
        cwd: &Path,
        mode: &ExecMode,
    ) -> Result<Self, ProcError> {
        let mut child = build_command(program, args, cwd, mode)
            .spawn()
            .map_err(|source| ProcError::SpawnFailed {
                program: program.to_string(),
                cwd: cwd.to_path_buf(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or(ProcError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(ProcError::MissingPipe("stderr"))?;
        let stdin = child.stdin.take().ok_or(ProcError::MissingPipe("stdin"))?;
        let pid = child.id();

        let (event_tx, events) = mpsc::channel(EVENT_CAPACITY);
        let (input_tx, input_rx) = mpsc::channel(INPUT_CAPACITY);
        let (kill_tx, kill_rx) = oneshot::channel();

        tokio::spawn(read_stream(StreamKind::Stdout, stdout, event_tx.clone()));
        tokio::spawn(read_stream(StreamKind::Stderr, stderr, event_tx.clone()));
        tokio::spawn(forward_input(stdin, input_rx));
        tokio::spawn(reap(child, kill_rx, event_tx));

        log::debug!("spawned {program} (pid {pid:?}) in {}", cwd.display());

        Ok(Self {
            pid,
            events,
            input: Some(input_tx),
            _kill: Some(kill_tx),
        })
    }

    /// Wrap an already running event source.
    ///
    /// Used for producers that are not OS processes, and by tests that need
    /// to script exactly which events a session sees.
    pub fn from_channel(
        events: mpsc::Receiver<ProcessEvent>,
        input: Option<mpsc::Sender<Vec<u8>>>,
    ) -> Self {
        Self {
            pid: None,
            events,
            input,
            _kill: None,
        }
    }

    /// OS process id, if this handle wraps a real child.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the next event. Returns `None` once every event has been delivered.
    pub async fn next_event(&mut self) -> Option<ProcessEvent> {
        self.events.recv().await
    }

    /// Take the sender feeding the child's stdin.
    ///
    /// Once every clone of the sender is dropped, stdin is closed and the
    /// child sees end of file.
    pub fn take_input(&mut self) -> Option<mpsc::Sender<Vec<u8>>> {
        self.input.take()
    }
}

async fn read_stream<R>(kind: StreamKind, mut reader: R, tx: mpsc::Sender<ProcessEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                log::warn!("{kind} read failed: {err}");
                break;
            }
        };

        let chunk = OutputChunk::bytes(kind, &buf[..n]);
        if tx.send(ProcessEvent::Chunk(chunk)).await.is_err() {
            // Nobody is listening anymore.
            return;
        }
    }

    let _ = tx.send(ProcessEvent::Closed(kind)).await;
}

async fn forward_input(mut stdin: ChildStdin, mut rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(data) = rx.recv().await {
        if let Err(err) = stdin.write_all(&data).await {
            log::debug!("stdin closed by child: {err}");
            return;
        }
        if let Err(err) = stdin.flush().await {
            log::debug!("stdin flush failed: {err}");
            return;
        }
    }
}

async fn reap(mut child: Child, kill_rx: oneshot::Receiver<()>, tx: mpsc::Sender<ProcessEvent>) {
    let code = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => status.code(),
            Err(err) => {
                log::warn!("failed to wait for child: {err}");
                None
            }
        },
        _ = kill_rx => {
            if let Err(err) = child.kill().await {
                log::warn!("failed to kill child: {err}");
            }
            None
        }
    };

    let _ = tx.send(ProcessEvent::Exited(code)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Drain every event until the channel closes, with a safety deadline.
    async fn collect_events(handle: &mut ProcessHandle) -> Vec<ProcessEvent> {
        let mut events = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            match tokio::time::timeout_at(deadline, handle.next_event()).await {
                Ok(Some(event)) => events.push(event),
                Ok(None) | Err(_) => break,
            }
        }
        events
    }

    fn stream_output(events: &[ProcessEvent], kind: StreamKind) -> String {
        let mut bytes = Vec::new();
        for event in events {
            if let ProcessEvent::Chunk(OutputChunk {
                stream,
                data: ChunkData::Bytes(data),
            }) = event
            {
                if *stream == kind {
                    bytes.extend_from_slice(data);
                }
            }
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[tokio::test]
    async fn test_shell_mode_echo() {
        let args = vec!["hi".to_string()];
        let mut handle =
            ProcessHandle::spawn("echo", &args, Path::new("/"), &ExecMode::default()).unwrap();
        assert!(handle.pid().is_some());

        let events = collect_events(&mut handle).await;
        assert_eq!(stream_output(&events, StreamKind::Stdout), "hi\n");
        assert!(events.contains(&ProcessEvent::Closed(StreamKind::Stdout)));
        assert!(events.contains(&ProcessEvent::Closed(StreamKind::Stderr)));
        assert_eq!(events.last(), Some(&ProcessEvent::Exited(Some(0))));
    }

    #[tokio::test]
    async fn test_stderr_is_tagged() {
        let args = vec!["oops".to_string(), "1>&2".to_string()];
        let mut handle =
            ProcessHandle::spawn("echo", &args, Path::new("/"), &ExecMode::default()).unwrap();

        let events = collect_events(&mut handle).await;
        assert_eq!(stream_output(&events, StreamKind::Stderr), "oops\n");
        assert_eq!(stream_output(&events, StreamKind::Stdout), "");
    }

    #[tokio::test]
    async fn test_working_directory_and_pwd() {
        let mut handle =
            ProcessHandle::spawn("pwd", &[], Path::new("/tmp"), &ExecMode::default()).unwrap();

        let events = collect_events(&mut handle).await;
        assert_eq!(stream_output(&events, StreamKind::Stdout), "/tmp\n");
    }

    #[tokio::test]
    async fn test_direct_mode_passes_args_verbatim() {
        let args = vec!["a  b".to_string()];
        let mut handle =
            ProcessHandle::spawn("/bin/echo", &args, Path::new("/"), &ExecMode::Direct).unwrap();

        let events = collect_events(&mut handle).await;
        assert_eq!(stream_output(&events, StreamKind::Stdout), "a  b\n");
    }

    #[tokio::test]
    async fn test_input_forwarding() {
        let mut handle =
            ProcessHandle::spawn("cat", &[], Path::new("/"), &ExecMode::default()).unwrap();

        let input = handle.take_input().unwrap();
        input.send(b"ping\n".to_vec()).await.unwrap();
        // Closing stdin lets cat finish.
        drop(input);

        let events = collect_events(&mut handle).await;
        assert_eq!(stream_output(&events, StreamKind::Stdout), "ping\n");
        assert_eq!(events.last(), Some(&ProcessEvent::Exited(Some(0))));
    }

    #[tokio::test]
    async fn test_nonzero_exit_code() {
        let args = vec!["3".to_string()];
        let mut handle =
            ProcessHandle::spawn("exit", &args, Path::new("/"), &ExecMode::default()).unwrap();

        let events = collect_events(&mut handle).await;
        assert_eq!(events.last(), Some(&ProcessEvent::Exited(Some(3))));
    }

    #[tokio::test]
    async fn test_spawn_in_missing_directory_fails() {
        let missing = Path::new("/definitely/not/a/real/inkterm/dir");
        let result = ProcessHandle::spawn("echo", &[], missing, &ExecMode::default());

        match result {
            Err(ProcError::SpawnFailed { program, cwd, .. }) => {
                assert_eq!(program, "echo");
                assert_eq!(cwd, missing);
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("spawn should fail in a missing directory"),
        }
    }

    #[tokio::test]
    async fn test_from_channel_replays_events() {
        let (tx, rx) = mpsc::channel(4);
        let mut handle = ProcessHandle::from_channel(rx, None);
        assert!(handle.pid().is_none());
        assert!(handle.take_input().is_none());

        tx.send(ProcessEvent::Closed(StreamKind::Stdout)).await.unwrap();
        drop(tx);

        assert_eq!(
            handle.next_event().await,
            Some(ProcessEvent::Closed(StreamKind::Stdout))
        );
        assert_eq!(handle.next_event().await, None);
    }

    #[test]
    fn test_build_command_joins_shell_line() {
        let args = vec!["-l".to_string(), "/tmp".to_string()];
        let cmd = build_command("ls", &args, Path::new("/"), &ExecMode::default());
        let std_cmd = cmd.as_std();

        assert_eq!(std_cmd.get_program(), DEFAULT_SHELL);
        let argv: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(argv, vec!["-c", "ls -l /tmp"]);
        assert_eq!(std_cmd.get_current_dir(), Some(Path::new("/")));
    }

    #[test]
    fn test_error_display() {
        let err = ProcError::MissingPipe("stdout");
        assert_eq!(err.to_string(), "child stdout was not piped");
    }
}

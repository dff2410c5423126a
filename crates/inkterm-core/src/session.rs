//! One shell session bound to one document.
//!
//! A session owns its phase machine, its write serializer and the command
//! currently running. Edit batches from the host arrive on a channel and are
//! handled one at a time by a dispatch task; anything that has to await
//! (writing output, running a command, resetting the prompt) runs in a task
//! owned by the session and aborted when it shuts down.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use inkterm_proc::ProcessHandle;

use crate::boundary::CommandBoundary;
use crate::bridge::{self, Executor};
use crate::buffer::{BufferError, BufferService, Document, EditBatch, Surface};
use crate::command::ParsedCommand;
use crate::config::ShellConfig;
use crate::directory::DirectoryTracker;
use crate::error::ShellError;
use crate::lock;
use crate::prompt::PromptManager;
use crate::state::{EditOutcome, Phase, SessionState};
use crate::writer::WriteSerializer;

pub type SessionId = u32;

pub struct Session {
    id: SessionId,
    writer: WriteSerializer,
    prompt: PromptManager,
    state: Mutex<SessionState>,
    executor: Executor,
    input: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    bridge_connected: AtomicBool,
    handled_version: AtomicU64,
    tasks: Mutex<JoinSet<()>>,
    stop_tx: mpsc::Sender<()>,
}

impl Session {
    /// Attach a session to `document`, displayed through `surface`.
    ///
    /// The command boundary starts at the end of the document. If the
    /// document does not already end with a prompt for the starting
    /// directory, one is appended and the session reads no commands until
    /// it has been written.
    pub fn start(
        id: SessionId,
        host: Arc<dyn BufferService>,
        document: Arc<dyn Document>,
        surface: Arc<dyn Surface>,
        config: &ShellConfig,
        executor: Executor,
    ) -> Result<Arc<Session>, BufferError> {
        let edits = host.subscribe(document.id())?;
        let boundary = CommandBoundary::new(document.end_offset(), document.version());
        let directory =
            DirectoryTracker::new(config.initial_directory.clone(), config.home_directory.clone());
        let prompt = PromptManager::new(config.prompt_marker.clone());
        let fresh = prompt.is_fresh(&*document, &config.initial_directory, boundary);

        let writer = WriteSerializer::new(host, Arc::clone(&document), surface);
        writer.reveal_tail();

        // Without a prompt there is no command region yet; edits are
        // ignored until the reset below has written one.
        let mut state = SessionState::new(directory, boundary);
        if !fresh {
            state.set_phase(Phase::WritingOutput);
        }

        let (stop_tx, stop_rx) = mpsc::channel(1);
        let session = Arc::new(Session {
            id,
            writer,
            prompt,
            state: Mutex::new(state),
            executor,
            input: Mutex::new(None),
            bridge_connected: AtomicBool::new(false),
            handled_version: AtomicU64::new(boundary.version),
            tasks: Mutex::new(JoinSet::new()),
            stop_tx,
        });

        start_dispatch(Arc::downgrade(&session), edits, stop_rx);
        if !fresh {
            session.spawn_task(|session| async move { session.reset_prompt().await });
        }

        log::info!(
            "session {id} started on document {} in {}",
            document.id(),
            config.initial_directory.display()
        );
        Ok(session)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn phase(&self) -> Phase {
        lock(&self.state).phase()
    }

    /// The logical working directory.
    pub fn directory(&self) -> PathBuf {
        lock(&self.state).directory().to_path_buf()
    }

    pub fn document(&self) -> &Arc<dyn Document> {
        self.writer.document()
    }

    pub fn writer(&self) -> &WriteSerializer {
        &self.writer
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Version of the last edit batch the session has classified.
    pub fn handled_version(&self) -> u64 {
        self.handled_version.load(Ordering::SeqCst)
    }

    /// Prompt the session would print right now.
    pub fn prompt_text(&self) -> String {
        self.prompt.prompt_text(&self.directory())
    }

    /// Forward `bytes` to the running command's stdin.
    ///
    /// Returns `false` when no command is accepting input.
    pub async fn send_input(&self, bytes: impl Into<Vec<u8>>) -> bool {
        let sender = lock(&self.input).clone();
        let Some(sender) = sender else {
            return false;
        };
        sender.send(bytes.into()).await.is_ok()
    }

    /// Close the running command's stdin.
    pub fn close_input(&self) {
        if lock(&self.input).take().is_some() {
            log::debug!("session {}: input closed", self.id);
        }
    }

    pub(crate) fn attach_input(&self, sender: Option<mpsc::Sender<Vec<u8>>>) {
        *lock(&self.input) = sender;
    }

    pub(crate) fn bridge_connected(&self) -> bool {
        self.bridge_connected.load(Ordering::SeqCst)
    }

    pub(crate) fn set_bridge_connected(&self) {
        self.bridge_connected.store(true, Ordering::SeqCst);
    }

    /// Append a fresh prompt and go back to reading commands.
    ///
    /// Holds one write turn for the whole reset. If the session is already
    /// reading commands right after an intact prompt at the end of the
    /// document, nothing is written and the tail is only revealed.
    pub async fn reset_prompt(&self) {
        let turn = self.writer.acquire().await;
        let document = self.writer.document();
        let (phase, directory) = {
            let state = lock(&self.state);
            (state.phase(), state.directory().to_path_buf())
        };

        if let Phase::ReadingCommand(boundary) = phase {
            if self.prompt.is_fresh(&**document, &directory, boundary) {
                turn.reveal_tail();
                return;
            }
        }

        lock(&self.state).set_phase(Phase::WritingOutput);
        let text = self.prompt.placement(&**document, &directory);
        if let Err(err) = turn.write(&text).await {
            log::error!("session {}: prompt not written: {err}", self.id);
        }
        turn.reveal_tail();

        let offset = document.end_offset();
        let version = document.version();
        lock(&self.state).set_phase(Phase::ReadingCommand(CommandBoundary::new(offset, version)));
    }

    /// Write command output. Empty text is skipped.
    pub async fn write_output(&self, text: &str) -> Result<(), ShellError> {
        if text.is_empty() {
            return Ok(());
        }
        let turn = self.writer.acquire().await;
        lock(&self.state).set_phase(Phase::WritingOutput);
        let result = turn.write(text).await;
        lock(&self.state).set_phase(Phase::InteractiveInput);
        turn.reveal_tail();
        result
    }

    /// Stream events from an already running producer into the document, as
    /// if a command had just been dispatched.
    pub fn attach_process(self: &Arc<Self>, mut handle: ProcessHandle) {
        lock(&self.state).set_phase(Phase::InteractiveInput);
        self.attach_input(handle.take_input());
        self.spawn_task(|session| async move {
            let mut handle = handle;
            bridge::drain(&session, &mut handle).await
        });
    }

    /// Stop reacting to edits and abort whatever is running.
    pub fn shutdown(&self) {
        let _ = self.stop_tx.try_send(());
        self.close_input();
        lock(&self.tasks).abort_all();
        log::info!("session {} shut down", self.id);
    }

    fn handle_edit(self: &Arc<Self>, batch: &EditBatch) {
        let outcome = lock(&self.state).on_edit(batch, &**self.writer.document());
        match outcome {
            EditOutcome::Ignored => {
                log::trace!("session {}: ignoring edit v{}", self.id, batch.version);
            }
            EditOutcome::Pending => self.writer.reveal_tail(),
            EditOutcome::ResetPrompt => {
                self.spawn_task(|session| async move { session.reset_prompt().await });
            }
            EditOutcome::Rejected(err) => {
                log::warn!("session {}: {err}", self.id);
                self.spawn_task(|session| async move { session.reset_prompt().await });
            }
            EditOutcome::Execute(command) => {
                log::debug!("session {}: running `{}`", self.id, command.line);
                self.writer.reveal_tail();
                self.spawn_task(|session| async move { session.run(command).await });
            }
        }
        self.handled_version.fetch_max(batch.version, Ordering::SeqCst);
    }

    async fn run(&self, command: ParsedCommand) {
        match &self.executor {
            Executor::Process(mode) => bridge::run_process(self, mode, &command).await,
            Executor::Reply(reply) => bridge::run_reply(self, reply.as_ref(), &command).await,
        }
    }

    fn spawn_task<F, Fut>(self: &Arc<Self>, make: F)
    where
        F: FnOnce(Arc<Session>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = lock(&self.tasks);
        while let Some(finished) = tasks.try_join_next() {
            if let Err(err) = finished {
                if err.is_panic() {
                    log::error!("session {}: task panicked: {err}", self.id);
                }
            }
        }
        tasks.spawn(make(Arc::clone(self)));
    }
}

/// Feed edit batches to the session until it is stopped or dropped.
fn start_dispatch(
    session: Weak<Session>,
    mut edits: mpsc::UnboundedReceiver<EditBatch>,
    mut stop_rx: mpsc::Receiver<()>,
) {
    tokio::spawn(async move {
        loop {
            let batch = tokio::select! {
                batch = edits.recv() => match batch {
                    Some(batch) => batch,
                    None => return,
                },
                _ = stop_rx.recv() => return,
            };

            let Some(session) = session.upgrade() else {
                return;
            };
            session.handle_edit(&batch);
        }
    });
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::buffer::DocumentId;
    use crate::memory::MemoryHost;
    use inkterm_proc::ExecMode;

    fn config() -> ShellConfig {
        ShellConfig {
            initial_directory: PathBuf::from("/"),
            home_directory: PathBuf::from("/root"),
            exec_mode: ExecMode::default(),
            prompt_marker: "❯".to_string(),
        }
    }

    fn start(host: &MemoryHost, text: &str) -> (Arc<Session>, DocumentId) {
        let doc = host.open_document("t.md", text).unwrap();
        let surface = host.show_document(doc.id()).unwrap();
        let session = Session::start(
            1,
            Arc::new(host.clone()),
            Arc::clone(&doc),
            surface,
            &config(),
            Executor::default(),
        )
        .unwrap();
        (session, doc.id())
    }

    async fn wait_for(host: &MemoryHost, doc: DocumentId, expected: &str) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let text = host.document(doc).unwrap().text();
            if text == expected {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "document never became {expected:?}, last was {text:?}"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_start_appends_missing_prompt() {
        let host = MemoryHost::new();
        let (session, doc) = start(&host, "old output");

        wait_for(&host, doc, "old output\n/ ❯ ").await;
        assert!(session.phase().is_reading());
    }

    #[tokio::test]
    async fn test_line_typed_before_first_prompt_is_not_run() {
        let host = MemoryHost::new();
        let (session, doc) = start(&host, "old output");
        assert_eq!(session.phase(), Phase::WritingOutput);

        host.type_text(doc, "echo hi\n").unwrap();
        wait_for(&host, doc, "old outputecho hi\n/ ❯ ").await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(host.document(doc).unwrap().text(), "old outputecho hi\n/ ❯ ");
        assert!(session.phase().is_reading());
        assert!(!session.writer().is_busy());
    }

    #[tokio::test]
    async fn test_start_keeps_existing_prompt() {
        let host = MemoryHost::new();
        let (session, doc) = start(&host, "/ ❯ ");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(host.document(doc).unwrap().text(), "/ ❯ ");
        assert_eq!(session.prompt_text(), "/ ❯ ");
    }

    #[tokio::test]
    async fn test_concurrent_resets_append_one_prompt() {
        let host = MemoryHost::new();
        let (session, doc) = start(&host, "/ ❯ ");
        host.type_text(doc, "partial").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let first = Arc::clone(&session);
        let second = Arc::clone(&session);
        tokio::join!(first.reset_prompt(), second.reset_prompt());

        assert_eq!(host.document(doc).unwrap().text(), "/ ❯ partial\n/ ❯ ");
        assert!(session.phase().is_reading());
    }

    #[tokio::test]
    async fn test_send_input_without_command() {
        let host = MemoryHost::new();
        let (session, _) = start(&host, "/ ❯ ");
        assert!(!session.send_input("ignored\n").await);
    }

    #[tokio::test]
    async fn test_shutdown_stops_reacting() {
        let host = MemoryHost::new();
        let (session, doc) = start(&host, "/ ❯ ");
        session.shutdown();
        tokio::time::sleep(Duration::from_millis(10)).await;

        host.type_text(doc, "\n").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(host.document(doc).unwrap().text(), "/ ❯ \n");
    }
}

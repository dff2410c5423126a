use std::collections::HashMap;
use std::sync::Arc;

use crate::bridge::{Executor, ReplyBridge};
use crate::buffer::{BufferError, BufferService};
use crate::config::ShellConfig;
use crate::prompt::PromptManager;
use crate::session::{Session, SessionId};

/// Opens, tracks and closes the sessions of one host.
///
/// Each session is independent: its own document, directory, phase and
/// running command.
pub struct SessionManager {
    host: Arc<dyn BufferService>,
    config: ShellConfig,
    sessions: HashMap<SessionId, Arc<Session>>,
    next_id: SessionId,
}

impl SessionManager {
    pub fn new(host: Arc<dyn BufferService>, config: ShellConfig) -> Self {
        Self {
            host,
            config,
            sessions: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// Open a new document running commands as processes.
    pub fn open_shell_session(&mut self) -> Result<Arc<Session>, BufferError> {
        let executor = Executor::Process(self.config.exec_mode.clone());
        self.open_session(executor, None)
    }

    /// Open a new document whose commands are answered by `bridge`.
    pub fn open_bridge_session(
        &mut self,
        bridge: Arc<dyn ReplyBridge>,
    ) -> Result<Arc<Session>, BufferError> {
        self.open_session(Executor::Reply(bridge), None)
    }

    /// Open a document seeded with an existing transcript and continue it.
    pub fn resume_session(
        &mut self,
        executor: Executor,
        transcript: &str,
    ) -> Result<Arc<Session>, BufferError> {
        self.open_session(executor, Some(transcript))
    }

    fn open_session(
        &mut self,
        executor: Executor,
        transcript: Option<&str>,
    ) -> Result<Arc<Session>, BufferError> {
        let seed = match transcript {
            Some(text) => text.to_string(),
            None => PromptManager::new(self.config.prompt_marker.clone())
                .prompt_text(&self.config.initial_directory),
        };
        let name = self.config.transcript_path().display().to_string();

        let document = self.host.open_document(&name, &seed)?;
        let surface = self.host.show_document(document.id())?;

        let id = self.next_id;
        let session = Session::start(
            id,
            Arc::clone(&self.host),
            document,
            surface,
            &self.config,
            executor,
        )?;
        self.sessions.insert(id, Arc::clone(&session));
        self.next_id += 1;
        Ok(session)
    }

    pub fn get_session(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).cloned()
    }

    /// List all session IDs.
    pub fn list_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Shut a session down and forget it. Unknown ids are ignored.
    pub fn close_session(&mut self, id: SessionId) {
        if let Some(session) = self.sessions.remove(&id) {
            session.shutdown();
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        for session in self.sessions.values() {
            session.shutdown();
        }
    }
}

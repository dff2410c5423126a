//! The session phase machine.
//!
//! [`SessionState::on_edit`] classifies one edit batch against the current
//! phase and returns what the session has to do about it. It never awaits
//! and never touches the document, so the decision and the phase change it
//! implies happen atomically with respect to other edits.

use std::fmt;
use std::path::Path;

use crate::boundary::CommandBoundary;
use crate::buffer::{Document, EditBatch};
use crate::command::{CommandAction, ParsedCommand};
use crate::directory::DirectoryTracker;
use crate::error::ShellError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the user to finish a command line after the boundary.
    ReadingCommand(CommandBoundary),
    /// The session is inserting output or a prompt.
    WritingOutput,
    /// A command is running; edits are not commands.
    InteractiveInput,
}

impl Phase {
    pub fn is_reading(&self) -> bool {
        matches!(self, Phase::ReadingCommand(_))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::ReadingCommand(boundary) => write!(f, "reading-command@{}", boundary.offset),
            Phase::WritingOutput => write!(f, "writing-output"),
            Phase::InteractiveInput => write!(f, "interactive-input"),
        }
    }
}

/// What an edit batch asks of the session.
#[derive(Debug)]
pub enum EditOutcome {
    /// Not a command edit (wrong phase, or already accounted for).
    Ignored,
    /// The command line is still incomplete.
    Pending,
    /// Print a fresh prompt: blank line, successful `cd`, or a damaged prompt.
    ResetPrompt,
    /// A builtin failed; report it, then print a fresh prompt.
    Rejected(ShellError),
    /// Run the command.
    Execute(ParsedCommand),
}

#[derive(Debug, Clone)]
pub struct SessionState {
    phase: Phase,
    directory: DirectoryTracker,
}

impl SessionState {
    pub fn new(directory: DirectoryTracker, boundary: CommandBoundary) -> Self {
        Self {
            phase: Phase::ReadingCommand(boundary),
            directory,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: Phase) {
        if std::mem::discriminant(&self.phase) != std::mem::discriminant(&phase) {
            log::debug!("phase {} -> {}", self.phase, phase);
        }
        self.phase = phase;
    }

    pub fn directory(&self) -> &Path {
        self.directory.current()
    }

    pub fn on_edit(&mut self, batch: &EditBatch, document: &dyn Document) -> EditOutcome {
        let Phase::ReadingCommand(boundary) = self.phase else {
            return EditOutcome::Ignored;
        };
        if boundary.is_stale(batch) {
            return EditOutcome::Ignored;
        }
        if boundary.touched_by(batch) {
            log::debug!("prompt edited at {:?}, resetting", boundary.marker());
            self.set_phase(Phase::WritingOutput);
            return EditOutcome::ResetPrompt;
        }

        let boundary = boundary.shifted(batch, document.end_offset());
        self.phase = Phase::ReadingCommand(boundary);

        let pending = document.text_from(boundary.offset);
        let Some(command) = ParsedCommand::parse(&pending) else {
            return EditOutcome::Pending;
        };

        match command.action() {
            CommandAction::Reset => {
                self.set_phase(Phase::WritingOutput);
                return EditOutcome::ResetPrompt;
            }
            CommandAction::ChangeDirectory(args) => {
                self.set_phase(Phase::WritingOutput);
                return match self.directory.change_directory(args) {
                    Ok(_) => EditOutcome::ResetPrompt,
                    Err(err) => EditOutcome::Rejected(err),
                };
            }
            CommandAction::Run => {}
        }

        self.set_phase(Phase::InteractiveInput);
        EditOutcome::Execute(command)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::*;
    use crate::buffer::{BufferService, Change};
    use crate::memory::MemoryHost;

    const PROMPT: &str = "/ ❯ ";

    struct Fixture {
        host: MemoryHost,
        doc: Arc<dyn Document>,
        edits: mpsc::UnboundedReceiver<EditBatch>,
        state: SessionState,
    }

    impl Fixture {
        fn new() -> Self {
            let host = MemoryHost::new();
            let doc = host.open_document("t.md", PROMPT).unwrap();
            let edits = host.subscribe(doc.id()).unwrap();
            let boundary = CommandBoundary::new(doc.end_offset(), doc.version());
            let state = SessionState::new(DirectoryTracker::new("/", "/root"), boundary);
            Self {
                host,
                doc,
                edits,
                state,
            }
        }

        fn edit(&mut self, changes: Vec<Change>) -> EditOutcome {
            self.host.user_edit(self.doc.id(), changes).unwrap();
            let batch = self.edits.try_recv().unwrap();
            self.state.on_edit(&batch, &*self.doc)
        }

        fn type_text(&mut self, text: &str) -> EditOutcome {
            self.edit(vec![Change::insert(self.doc.end_offset(), text)])
        }

        fn boundary(&self) -> CommandBoundary {
            match self.state.phase() {
                Phase::ReadingCommand(boundary) => boundary,
                other => panic!("expected reading phase, got {other}"),
            }
        }
    }

    #[test]
    fn test_incomplete_line_is_pending() {
        let mut f = Fixture::new();
        assert!(matches!(f.type_text("echo hi"), EditOutcome::Pending));
        assert_eq!(f.boundary().offset, PROMPT.chars().count());
    }

    #[test]
    fn test_complete_line_executes() {
        let mut f = Fixture::new();
        f.type_text("echo");
        match f.type_text(" hi\n") {
            EditOutcome::Execute(cmd) => {
                assert_eq!(cmd.program, "echo");
                assert_eq!(cmd.args, vec!["hi"]);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(f.state.phase(), Phase::InteractiveInput);

        // A second Enter while the command runs is not a new command.
        assert!(matches!(f.type_text("\n"), EditOutcome::Ignored));
    }

    #[test]
    fn test_blank_line_resets() {
        let mut f = Fixture::new();
        assert!(matches!(f.type_text("\n"), EditOutcome::ResetPrompt));
        assert_eq!(f.state.phase(), Phase::WritingOutput);
    }

    #[test]
    fn test_cd_updates_directory() {
        let mut f = Fixture::new();
        assert!(matches!(f.type_text("cd /tmp\n"), EditOutcome::ResetPrompt));
        assert_eq!(f.state.directory(), Path::new("/tmp"));
    }

    #[test]
    fn test_malformed_cd_is_rejected() {
        let mut f = Fixture::new();
        assert!(matches!(
            f.type_text("cd a b\n"),
            EditOutcome::Rejected(ShellError::MalformedCommand { received: 2, .. })
        ));
        assert_eq!(f.state.directory(), Path::new("/"));
        assert_eq!(f.state.phase(), Phase::WritingOutput);
    }

    #[test]
    fn test_editing_prompt_forces_reset() {
        let mut f = Fixture::new();
        f.type_text("ls");
        let marker = PROMPT.chars().count() - 1;
        assert!(matches!(
            f.edit(vec![Change::delete(marker, 1)]),
            EditOutcome::ResetPrompt
        ));
    }

    #[test]
    fn test_edit_before_prompt_shifts_boundary() {
        let mut f = Fixture::new();
        f.type_text("ls");
        f.edit(vec![Change::insert(0, "note\n")]);

        assert_eq!(f.boundary().offset, PROMPT.chars().count() + 5);
        assert!(matches!(f.type_text(" -l\n"), EditOutcome::Execute(_)));
    }

    #[test]
    fn test_continuation_then_completion() {
        let mut f = Fixture::new();
        assert!(matches!(f.type_text("echo a \\\n"), EditOutcome::Pending));
        match f.type_text("b\n") {
            EditOutcome::Execute(cmd) => assert_eq!(cmd.line, "echo a  b"),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_stale_batch_is_ignored() {
        let mut f = Fixture::new();
        f.host.type_text(f.doc.id(), "x").unwrap();
        let stale = f.edits.try_recv().unwrap();

        let boundary = CommandBoundary::new(f.doc.end_offset(), f.doc.version());
        f.state.set_phase(Phase::ReadingCommand(boundary));

        assert!(matches!(f.state.on_edit(&stale, &*f.doc), EditOutcome::Ignored));
        assert_eq!(f.boundary(), boundary);
    }

    #[test]
    fn test_phase_display() {
        let boundary = CommandBoundary::new(4, 1);
        assert_eq!(Phase::ReadingCommand(boundary).to_string(), "reading-command@4");
        assert_eq!(Phase::InteractiveInput.to_string(), "interactive-input");
        assert!(Phase::ReadingCommand(boundary).is_reading());
        assert!(!Phase::WritingOutput.is_reading());
    }
}

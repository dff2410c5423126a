//! Command line parsing.

use crate::directory::CHANGE_DIRECTORY;

/// A backslash immediately followed by a newline joins two physical lines.
pub const LINE_CONTINUATION: &str = "\\\n";

/// A complete command line split into program and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub line: String,
    pub program: String,
    pub args: Vec<String>,
}

/// What a parsed command asks the session to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction<'a> {
    /// Blank line: just print a fresh prompt.
    Reset,
    /// The `cd` builtin.
    ChangeDirectory(&'a [String]),
    /// Anything else goes to the executor.
    Run,
}

impl ParsedCommand {
    /// Parse the pending text after the prompt.
    ///
    /// Returns `None` while the line is incomplete, i.e. until it ends with a
    /// newline. Only the first line continuation is collapsed, into a single
    /// space. Arguments are split on single spaces, so consecutive spaces
    /// yield empty arguments.
    pub fn parse(pending: &str) -> Option<Self> {
        let joined = pending.replacen(LINE_CONTINUATION, " ", 1);
        if !joined.ends_with('\n') {
            return None;
        }

        let line = joined.trim_end().to_string();
        let mut words = line.split(' ').map(str::to_string);
        let program = words.next().unwrap_or_default();
        let args = words.collect();

        Some(Self {
            line,
            program,
            args,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.program.is_empty()
    }

    pub fn action(&self) -> CommandAction<'_> {
        if self.is_empty() {
            CommandAction::Reset
        } else if self.program == CHANGE_DIRECTORY {
            CommandAction::ChangeDirectory(&self.args)
        } else {
            CommandAction::Run
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_line() {
        assert_eq!(ParsedCommand::parse("echo hi"), None);
        assert_eq!(ParsedCommand::parse(""), None);
    }

    #[test]
    fn test_simple_command() {
        let cmd = ParsedCommand::parse("echo hi there\n").unwrap();
        assert_eq!(cmd.line, "echo hi there");
        assert_eq!(cmd.program, "echo");
        assert_eq!(cmd.args, vec!["hi", "there"]);
        assert_eq!(cmd.action(), CommandAction::Run);
    }

    #[test]
    fn test_continuation_is_not_completion() {
        assert_eq!(ParsedCommand::parse("echo a \\\n"), None);
        let cmd = ParsedCommand::parse("echo a \\\nb\n").unwrap();
        assert_eq!(cmd.line, "echo a  b");
        assert_eq!(cmd.args, vec!["a", "", "b"]);
    }

    #[test]
    fn test_only_first_continuation_collapsed() {
        let cmd = ParsedCommand::parse("a\\\nb\\\nc\n").unwrap();
        assert_eq!(cmd.line, "a b\\\nc");
    }

    #[test]
    fn test_blank_line_resets() {
        let cmd = ParsedCommand::parse("   \n").unwrap();
        assert!(cmd.is_empty());
        assert_eq!(cmd.action(), CommandAction::Reset);
    }

    #[test]
    fn test_cd_action() {
        let cmd = ParsedCommand::parse("cd /tmp\n").unwrap();
        assert_eq!(
            cmd.action(),
            CommandAction::ChangeDirectory(&["/tmp".to_string()])
        );
    }
}

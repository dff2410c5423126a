//! Session defaults, taken from the environment where it has an opinion.

use std::path::PathBuf;

use inkterm_proc::ExecMode;

/// Decorative token that ends every prompt.
pub const DEFAULT_PROMPT_MARKER: &str = "❯";

/// Name of the transcript document opened for a new session.
pub const TRANSCRIPT_FILE_NAME: &str = "terminal-in-editor.md";

/// Environment variable overriding the shell used to run command lines.
/// An empty value switches to direct execution.
pub const SHELL_ENV: &str = "INKTERM_SHELL";

/// Everything a new session needs to know before its first prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    /// Logical directory the first prompt shows.
    pub initial_directory: PathBuf,
    /// Target of `~` in `cd` arguments.
    pub home_directory: PathBuf,
    /// How command lines are executed.
    pub exec_mode: ExecMode,
    pub prompt_marker: String,
}

impl ShellConfig {
    /// Build a config from the process environment.
    ///
    /// Starts in the current directory, falling back to the home directory.
    pub fn from_env() -> Self {
        let home_directory = home_dir().unwrap_or_else(|| PathBuf::from("/"));
        let initial_directory =
            std::env::current_dir().unwrap_or_else(|_| home_directory.clone());

        let exec_mode = match std::env::var_os(SHELL_ENV) {
            Some(shell) if shell.is_empty() => ExecMode::Direct,
            Some(shell) => ExecMode::Shell(PathBuf::from(shell)),
            None => ExecMode::default(),
        };

        Self {
            initial_directory,
            home_directory,
            exec_mode,
            prompt_marker: DEFAULT_PROMPT_MARKER.to_string(),
        }
    }

    /// Same config, starting in `directory`.
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.initial_directory = directory.into();
        self
    }

    /// Where the transcript of a session started with this config is kept.
    pub fn transcript_path(&self) -> PathBuf {
        self.initial_directory.join(TRANSCRIPT_FILE_NAME)
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Get the user's home directory.
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_directory_and_transcript_path() {
        let config = ShellConfig::from_env().with_directory("/tmp/project");
        assert_eq!(config.initial_directory, PathBuf::from("/tmp/project"));
        assert_eq!(
            config.transcript_path(),
            PathBuf::from("/tmp/project/terminal-in-editor.md")
        );
    }

    #[test]
    fn test_default_marker() {
        let config = ShellConfig::default();
        assert_eq!(config.prompt_marker, DEFAULT_PROMPT_MARKER);
        assert!(config.home_directory.is_absolute());
    }
}

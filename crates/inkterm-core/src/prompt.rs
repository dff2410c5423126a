use std::path::Path;

use crate::boundary::CommandBoundary;
use crate::buffer::Document;
use crate::config::DEFAULT_PROMPT_MARKER;

/// Renders prompts and decides where they go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptManager {
    marker: String,
}

impl PromptManager {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// `"{directory} {marker} "`.
    pub fn prompt_text(&self, directory: &Path) -> String {
        format!("{} {} ", directory.display(), self.marker)
    }

    /// Text to append for a new prompt: the prompt itself, on a line of its
    /// own if the document does not already end at the start of a line.
    pub fn placement(&self, document: &dyn Document, directory: &Path) -> String {
        let prompt = self.prompt_text(directory);
        let end = document.position_at(document.end_offset());
        if end.column == 0 {
            prompt
        } else {
            format!("\n{prompt}")
        }
    }

    /// Whether the document ends with an intact prompt for `directory` and
    /// the command region after it is empty.
    pub fn is_fresh(
        &self,
        document: &dyn Document,
        directory: &Path,
        boundary: CommandBoundary,
    ) -> bool {
        boundary.offset == document.end_offset()
            && document.text().ends_with(&self.prompt_text(directory))
    }
}

impl Default for PromptManager {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT_MARKER)
    }
}

//! The Buffer Service boundary: what a session needs from the host editor.
//!
//! Offsets and lengths are counted in characters (Unicode scalar values),
//! never in bytes. A host translating from another unit must do so before
//! handing edits to a session.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub type DocumentId = u64;
pub type SurfaceId = u64;

/// Zero-based line/column location in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// One replaced range within an [`EditBatch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// Start of the replaced range, in the document as it was before the batch.
    pub range_offset: usize,
    pub range_length: usize,
    #[serde(default)]
    pub inserted_text: String,
}

impl Change {
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self {
            range_offset: offset,
            range_length: 0,
            inserted_text: text.into(),
        }
    }

    pub fn replace(offset: usize, length: usize, text: impl Into<String>) -> Self {
        Self {
            range_offset: offset,
            range_length: length,
            inserted_text: text.into(),
        }
    }

    pub fn delete(offset: usize, length: usize) -> Self {
        Self::replace(offset, length, "")
    }

    pub fn inserted_length(&self) -> usize {
        self.inserted_text.chars().count()
    }

    /// Net change in document length caused by this change.
    pub fn delta(&self) -> isize {
        self.inserted_length() as isize - self.range_length as isize
    }
}

/// One document mutation as reported by the host.
///
/// Changes are in document order and never overlap. `version` is the
/// document version reached once the whole batch has been applied; versions
/// strictly increase per document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditBatch {
    pub version: u64,
    pub changes: Vec<Change>,
}

/// A single insert requested through a [`Surface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insert {
    pub offset: usize,
    pub text: String,
}

/// Errors reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    UnknownDocument(DocumentId),
    SurfaceDisposed(SurfaceId),
    Rejected(String),
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::UnknownDocument(id) => write!(f, "unknown document {id}"),
            BufferError::SurfaceDisposed(id) => write!(f, "surface {id} has been disposed"),
            BufferError::Rejected(reason) => write!(f, "edit rejected: {reason}"),
        }
    }
}

impl std::error::Error for BufferError {}

/// Read access to a document's current contents.
pub trait Document: Send + Sync {
    fn id(&self) -> DocumentId;

    /// Version of the current contents. Matches the `version` of the last
    /// [`EditBatch`] broadcast for this document.
    fn version(&self) -> u64;

    fn text(&self) -> String;

    /// Text from `offset` to the end of the document.
    fn text_from(&self, offset: usize) -> String;

    /// Offset just past the last character.
    fn end_offset(&self) -> usize;

    fn line_count(&self) -> usize;

    fn position_at(&self, offset: usize) -> Position;

    fn offset_at(&self, position: Position) -> usize;
}

/// A displayed view of a document through which it can be edited.
///
/// Surfaces can go away at any time (a hidden tab, a closed split). Inserts
/// through a dead surface fail; the document itself survives.
#[async_trait]
pub trait Surface: Send + Sync {
    fn id(&self) -> SurfaceId;

    fn document(&self) -> DocumentId;

    /// Apply `inserts` as one edit. Offsets refer to the document before the edit.
    async fn apply_inserts(&self, inserts: &[Insert]) -> Result<(), BufferError>;

    /// Scroll so that the range between `start` and `end` is visible.
    fn reveal(&self, start: Position, end: Position);
}

/// The host editor as seen by sessions.
pub trait BufferService: Send + Sync {
    /// Open a new document named `name` containing `initial_text`.
    fn open_document(
        &self,
        name: &str,
        initial_text: &str,
    ) -> Result<Arc<dyn Document>, BufferError>;

    /// Display a document, returning the new surface.
    fn show_document(&self, document: DocumentId) -> Result<Arc<dyn Surface>, BufferError>;

    /// Surfaces currently displaying `document`, most recently shown last.
    fn visible_surfaces(&self, document: DocumentId) -> Vec<Arc<dyn Surface>>;

    /// Receive every future edit batch of `document`, self-generated ones included.
    fn subscribe(
        &self,
        document: DocumentId,
    ) -> Result<mpsc::UnboundedReceiver<EditBatch>, BufferError>;

    /// Show a blocking, user-facing error message.
    fn show_error(&self, message: &str);
}

//! In-memory Buffer Service.
//!
//! Documents are plain strings. Every mutation, whether requested through a
//! surface or simulated as user typing, bumps the document version and is
//! broadcast to subscribers as an [`EditBatch`] before the call returns.
//! Surfaces can be disposed or told to fail, which is how the write retry
//! policy is exercised without a real editor.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::buffer::{
    BufferError, BufferService, Change, Document, DocumentId, EditBatch, Insert, Position,
    Surface, SurfaceId,
};
use crate::lock;

#[derive(Default)]
struct HostInner {
    documents: HashMap<DocumentId, DocumentEntry>,
    surfaces: HashMap<SurfaceId, SurfaceEntry>,
    next_document: DocumentId,
    next_surface: SurfaceId,
    errors: Vec<String>,
    insert_taps: Vec<mpsc::UnboundedSender<String>>,
}

struct DocumentEntry {
    name: String,
    text: String,
    version: u64,
    subscribers: Vec<mpsc::UnboundedSender<EditBatch>>,
}

struct SurfaceEntry {
    document: DocumentId,
    disposed: bool,
    failures_left: usize,
    reveals: Vec<(Position, Position)>,
}

/// Byte index of the character at `offset`, clamped to the end of `text`.
fn byte_index(text: &str, offset: usize) -> usize {
    text.char_indices()
        .nth(offset)
        .map(|(index, _)| index)
        .unwrap_or(text.len())
}

fn position_in(text: &str, offset: usize) -> Position {
    let mut position = Position::new(0, 0);
    for ch in text.chars().take(offset) {
        if ch == '\n' {
            position.line += 1;
            position.column = 0;
        } else {
            position.column += 1;
        }
    }
    position
}

fn offset_in(text: &str, position: Position) -> usize {
    let mut offset = 0;
    for (line_index, line) in text.split('\n').enumerate() {
        let width = line.chars().count();
        if line_index == position.line {
            return offset + position.column.min(width);
        }
        offset += width + 1;
    }
    text.chars().count()
}

impl DocumentEntry {
    /// Apply changes given against the current text, in document order.
    fn apply(&mut self, changes: &[Change]) -> Result<(), BufferError> {
        let length = self.text.chars().count();
        let mut cursor = 0;
        for change in changes {
            let end = change.range_offset + change.range_length;
            if change.range_offset < cursor || end > length {
                return Err(BufferError::Rejected(format!(
                    "change at {}..{end} overlaps or exceeds document of length {length}",
                    change.range_offset
                )));
            }
            cursor = end;
        }

        // Back to front so earlier offsets stay valid.
        for change in changes.iter().rev() {
            let start = byte_index(&self.text, change.range_offset);
            let end = byte_index(&self.text, change.range_offset + change.range_length);
            self.text.replace_range(start..end, &change.inserted_text);
        }
        self.version += 1;

        let batch = EditBatch {
            version: self.version,
            changes: changes.to_vec(),
        };
        self.subscribers.retain(|tx| tx.send(batch.clone()).is_ok());
        Ok(())
    }
}

/// An in-memory host with any number of documents and surfaces.
#[derive(Clone, Default)]
pub struct MemoryHost {
    inner: Arc<Mutex<HostInner>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an open document.
    pub fn document(&self, id: DocumentId) -> Option<Arc<dyn Document>> {
        if !lock(&self.inner).documents.contains_key(&id) {
            return None;
        }
        Some(Arc::new(MemoryDocument {
            id,
            inner: Arc::clone(&self.inner),
        }))
    }

    pub fn document_name(&self, id: DocumentId) -> Option<String> {
        lock(&self.inner)
            .documents
            .get(&id)
            .map(|entry| entry.name.clone())
    }

    /// Apply a user edit, as if typed or pasted into the editor.
    ///
    /// Returns the new document version.
    pub fn user_edit(&self, document: DocumentId, changes: Vec<Change>) -> Result<u64, BufferError> {
        let mut inner = lock(&self.inner);
        let entry = inner
            .documents
            .get_mut(&document)
            .ok_or(BufferError::UnknownDocument(document))?;
        entry.apply(&changes)?;
        Ok(entry.version)
    }

    /// Type `text` at the end of the document.
    pub fn type_text(&self, document: DocumentId, text: &str) -> Result<u64, BufferError> {
        let end = {
            let inner = lock(&self.inner);
            let entry = inner
                .documents
                .get(&document)
                .ok_or(BufferError::UnknownDocument(document))?;
            entry.text.chars().count()
        };
        self.user_edit(document, vec![Change::insert(end, text)])
    }

    /// Dispose a surface, the way an editor drops a tab that is no longer shown.
    pub fn dispose_surface(&self, surface: SurfaceId) {
        if let Some(entry) = lock(&self.inner).surfaces.get_mut(&surface) {
            entry.disposed = true;
        }
    }

    /// Make the next `count` inserts through `surface` fail.
    pub fn fail_next_inserts(&self, surface: SurfaceId, count: usize) {
        if let Some(entry) = lock(&self.inner).surfaces.get_mut(&surface) {
            entry.failures_left = count;
        }
    }

    /// Every range revealed through `surface`, oldest first.
    pub fn reveals(&self, surface: SurfaceId) -> Vec<(Position, Position)> {
        lock(&self.inner)
            .surfaces
            .get(&surface)
            .map(|entry| entry.reveals.clone())
            .unwrap_or_default()
    }

    /// User-facing errors shown so far.
    pub fn errors(&self) -> Vec<String> {
        lock(&self.inner).errors.clone()
    }

    /// Receive the text of every insert applied through any surface.
    pub fn subscribe_inserts(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.inner).insert_taps.push(tx);
        rx
    }
}

impl BufferService for MemoryHost {
    fn open_document(
        &self,
        name: &str,
        initial_text: &str,
    ) -> Result<Arc<dyn Document>, BufferError> {
        let id = {
            let mut inner = lock(&self.inner);
            inner.next_document += 1;
            let id = inner.next_document;
            inner.documents.insert(
                id,
                DocumentEntry {
                    name: name.to_string(),
                    text: initial_text.to_string(),
                    version: 1,
                    subscribers: Vec::new(),
                },
            );
            id
        };
        log::debug!("opened document {id} ({name})");

        Ok(Arc::new(MemoryDocument {
            id,
            inner: Arc::clone(&self.inner),
        }))
    }

    fn show_document(&self, document: DocumentId) -> Result<Arc<dyn Surface>, BufferError> {
        let mut inner = lock(&self.inner);
        if !inner.documents.contains_key(&document) {
            return Err(BufferError::UnknownDocument(document));
        }
        inner.next_surface += 1;
        let id = inner.next_surface;
        inner.surfaces.insert(
            id,
            SurfaceEntry {
                document,
                disposed: false,
                failures_left: 0,
                reveals: Vec::new(),
            },
        );

        Ok(Arc::new(MemorySurface {
            id,
            document,
            inner: Arc::clone(&self.inner),
        }))
    }

    fn visible_surfaces(&self, document: DocumentId) -> Vec<Arc<dyn Surface>> {
        let inner = lock(&self.inner);
        let mut ids: Vec<SurfaceId> = inner
            .surfaces
            .iter()
            .filter(|(_, entry)| entry.document == document && !entry.disposed)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();

        ids.into_iter()
            .map(|id| {
                Arc::new(MemorySurface {
                    id,
                    document,
                    inner: Arc::clone(&self.inner),
                }) as Arc<dyn Surface>
            })
            .collect()
    }

    fn subscribe(
        &self,
        document: DocumentId,
    ) -> Result<mpsc::UnboundedReceiver<EditBatch>, BufferError> {
        let mut inner = lock(&self.inner);
        let entry = inner
            .documents
            .get_mut(&document)
            .ok_or(BufferError::UnknownDocument(document))?;
        let (tx, rx) = mpsc::unbounded_channel();
        entry.subscribers.push(tx);
        Ok(rx)
    }

    fn show_error(&self, message: &str) {
        log::error!("{message}");
        lock(&self.inner).errors.push(message.to_string());
    }
}

struct MemoryDocument {
    id: DocumentId,
    inner: Arc<Mutex<HostInner>>,
}

impl MemoryDocument {
    fn with_text<T>(&self, f: impl FnOnce(&str) -> T) -> T {
        let inner = lock(&self.inner);
        let text = inner
            .documents
            .get(&self.id)
            .map(|entry| entry.text.as_str())
            .unwrap_or("");
        f(text)
    }
}

impl Document for MemoryDocument {
    fn id(&self) -> DocumentId {
        self.id
    }

    fn version(&self) -> u64 {
        lock(&self.inner)
            .documents
            .get(&self.id)
            .map(|entry| entry.version)
            .unwrap_or(0)
    }

    fn text(&self) -> String {
        self.with_text(str::to_string)
    }

    fn text_from(&self, offset: usize) -> String {
        self.with_text(|text| text[byte_index(text, offset)..].to_string())
    }

    fn end_offset(&self) -> usize {
        self.with_text(|text| text.chars().count())
    }

    fn line_count(&self) -> usize {
        self.with_text(|text| text.split('\n').count())
    }

    fn position_at(&self, offset: usize) -> Position {
        self.with_text(|text| position_in(text, offset))
    }

    fn offset_at(&self, position: Position) -> usize {
        self.with_text(|text| offset_in(text, position))
    }
}

struct MemorySurface {
    id: SurfaceId,
    document: DocumentId,
    inner: Arc<Mutex<HostInner>>,
}

#[async_trait]
impl Surface for MemorySurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn document(&self) -> DocumentId {
        self.document
    }

    async fn apply_inserts(&self, inserts: &[Insert]) -> Result<(), BufferError> {
        let mut guard = lock(&self.inner);
        let HostInner {
            documents,
            surfaces,
            insert_taps,
            ..
        } = &mut *guard;

        let surface = surfaces
            .get_mut(&self.id)
            .ok_or(BufferError::SurfaceDisposed(self.id))?;
        if surface.disposed {
            return Err(BufferError::SurfaceDisposed(self.id));
        }
        if surface.failures_left > 0 {
            surface.failures_left -= 1;
            return Err(BufferError::Rejected(format!(
                "surface {} refused the edit",
                self.id
            )));
        }

        let entry = documents
            .get_mut(&self.document)
            .ok_or(BufferError::UnknownDocument(self.document))?;

        let mut ordered: Vec<&Insert> = inserts.iter().collect();
        ordered.sort_by_key(|insert| insert.offset);
        let changes: Vec<Change> = ordered
            .iter()
            .map(|insert| Change::insert(insert.offset, insert.text.clone()))
            .collect();
        entry.apply(&changes)?;

        for insert in ordered {
            insert_taps.retain(|tx| tx.send(insert.text.clone()).is_ok());
        }
        Ok(())
    }

    fn reveal(&self, start: Position, end: Position) {
        if let Some(entry) = lock(&self.inner).surfaces.get_mut(&self.id) {
            entry.reveals.push((start, end));
        }
    }
}

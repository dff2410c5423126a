//! Serialized writes into a session's document.
//!
//! Every mutation the session makes (output chunks and prompts alike) goes
//! through one [`WriteSerializer`]. A caller first takes a [`WriteTurn`];
//! turns are handed out in the order they were requested and only one exists
//! at a time, so at most one insert is ever in flight. A turn may cover
//! several steps (the prompt reset reads the document, writes, then moves the
//! boundary) without anything else slipping in between.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::buffer::{BufferError, BufferService, Document, Insert, Surface};
use crate::error::ShellError;
use crate::lock;

/// Shown when output can no longer reach the document.
pub const DETACHED_DOCUMENT_MESSAGE: &str =
    "The shell session lost its document. Keep the transcript open and visible while commands run.";

pub struct WriteSerializer {
    host: Arc<dyn BufferService>,
    document: Arc<dyn Document>,
    surface: Mutex<Arc<dyn Surface>>,
    slot: AsyncMutex<()>,
    pending: Mutex<Option<String>>,
    detached: AtomicBool,
}

/// Exclusive right to mutate the document. Released on drop.
pub struct WriteTurn<'a> {
    writer: &'a WriteSerializer,
    _slot: AsyncMutexGuard<'a, ()>,
}

impl WriteSerializer {
    pub fn new(
        host: Arc<dyn BufferService>,
        document: Arc<dyn Document>,
        surface: Arc<dyn Surface>,
    ) -> Self {
        Self {
            host,
            document,
            surface: Mutex::new(surface),
            slot: AsyncMutex::new(()),
            pending: Mutex::new(None),
            detached: AtomicBool::new(false),
        }
    }

    /// Wait for the previous turn to finish and take the next one.
    pub async fn acquire(&self) -> WriteTurn<'_> {
        let slot = match self.slot.try_lock() {
            Ok(slot) => slot,
            Err(_) => {
                log::trace!(
                    "document {}: waiting behind write {:?}",
                    self.document.id(),
                    self.pending()
                );
                self.slot.lock().await
            }
        };
        WriteTurn {
            writer: self,
            _slot: slot,
        }
    }

    /// Append `text` in a turn of its own.
    pub async fn write(&self, text: &str) -> Result<(), ShellError> {
        self.acquire().await.write(text).await
    }

    /// Text of the insert currently in flight.
    pub fn pending(&self) -> Option<String> {
        lock(&self.pending).clone()
    }

    /// Whether some turn is currently held.
    pub fn is_busy(&self) -> bool {
        self.slot.try_lock().is_err()
    }

    /// Whether the last write gave up on the document.
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    pub fn document(&self) -> &Arc<dyn Document> {
        &self.document
    }

    /// Surface writes currently go through.
    pub fn surface(&self) -> Arc<dyn Surface> {
        Arc::clone(&lock(&self.surface))
    }

    /// Scroll the current surface to the end of the document.
    pub fn reveal_tail(&self) {
        let end = self.document.position_at(self.document.end_offset());
        self.surface().reveal(end, end);
    }

    fn replace_surface(&self, surface: Arc<dyn Surface>) {
        *lock(&self.surface) = surface;
    }

    fn attached(&self) {
        if self.detached.swap(false, Ordering::SeqCst) {
            log::info!("document {}: writes reach the document again", self.document.id());
        }
    }

    /// The message is shown once per loss, not once per failed write.
    fn detached(&self, err: BufferError) -> ShellError {
        log::error!("document {}: giving up on write: {err}", self.document.id());
        if !self.detached.swap(true, Ordering::SeqCst) {
            self.host.show_error(DETACHED_DOCUMENT_MESSAGE);
        }
        ShellError::EditRejected {
            reason: err.to_string(),
        }
    }
}

impl WriteTurn<'_> {
    /// Append `text` at the end of the document.
    ///
    /// A rejected insert is retried once through another visible surface of
    /// the same document, which then becomes the surface used from here on.
    pub async fn write(&self, text: &str) -> Result<(), ShellError> {
        let writer = self.writer;
        let _pending = PendingGuard::set(&writer.pending, text);

        let insert = [Insert {
            offset: writer.document.end_offset(),
            text: text.to_string(),
        }];
        let surface = writer.surface();
        log::debug!(
            "document {}: writing {} char(s) at {}",
            writer.document.id(),
            text.chars().count(),
            insert[0].offset
        );

        let err = match surface.apply_inserts(&insert).await {
            Ok(()) => {
                writer.attached();
                return Ok(());
            }
            Err(err) => err,
        };
        log::warn!(
            "document {}: insert through surface {} failed: {err}",
            writer.document.id(),
            surface.id()
        );

        let Some(replacement) = writer
            .host
            .visible_surfaces(writer.document.id())
            .into_iter()
            .next()
        else {
            return Err(writer.detached(err));
        };
        writer.replace_surface(Arc::clone(&replacement));

        match replacement.apply_inserts(&insert).await {
            Ok(()) => {
                writer.attached();
                Ok(())
            }
            Err(err) => Err(writer.detached(err)),
        }
    }

    pub fn reveal_tail(&self) {
        self.writer.reveal_tail();
    }
}

/// Publishes the in-flight text and clears it however the write ends.
struct PendingGuard<'a> {
    slot: &'a Mutex<Option<String>>,
}

impl<'a> PendingGuard<'a> {
    fn set(slot: &'a Mutex<Option<String>>, text: &str) -> Self {
        *lock(slot) = Some(text.to_string());
        Self { slot }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        *lock(self.slot) = None;
    }
}

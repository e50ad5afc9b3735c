//! Interactive preview session with last-writer-wins semantics.
//!
//! Every parameter change starts a fresh pass from the original base image.
//! A pass that finishes after a newer request was issued is dropped rather
//! than cancelled: its result is simply never shown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;

use crate::engine::{ExportedImage, WatermarkEngine};
use crate::error::Result;
use crate::params::{SignatureSpec, TileParams};

/// Default pause before compositing, giving the caller a turn to show a
/// "processing" state and letting rapid slider changes collapse into one pass.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(30);

/// Tracks the newest request so superseded results can be discarded.
#[derive(Debug)]
pub struct PreviewSession {
    engine: Arc<WatermarkEngine>,
    generation: AtomicU64,
    settle_delay: Duration,
}

impl PreviewSession {
    /// New session over a shared engine.
    #[must_use]
    pub fn new(engine: Arc<WatermarkEngine>) -> Self {
        Self {
            engine,
            generation: AtomicU64::new(0),
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    /// Override the settle delay. `Duration::ZERO` composites immediately.
    #[must_use]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// The engine used for every pass.
    #[must_use]
    pub fn engine(&self) -> &WatermarkEngine {
        &self.engine
    }

    /// Number of requests issued so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn begin(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket
    }

    /// Composite a preview.
    ///
    /// Returns `Ok(None)` if a newer request was issued before this one
    /// finished.
    ///
    /// # Errors
    ///
    /// Compositing errors of the current request, or [`crate::Error::Task`]
    /// if the worker panics.
    pub async fn render(
        &self,
        base: Arc<RgbaImage>,
        signature: Option<SignatureSpec>,
        params: TileParams,
    ) -> Result<Option<RgbaImage>> {
        let ticket = self.begin();
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        if !self.is_current(ticket) {
            tracing::debug!(ticket, "preview superseded before compositing");
            return Ok(None);
        }

        let compositor = self.engine.compositor().clone();
        let composite = tokio::task::spawn_blocking(move || {
            compositor.composite(&base, signature.as_ref(), &params)
        })
        .await??;

        if !self.is_current(ticket) {
            tracing::debug!(ticket, "preview superseded, discarding result");
            return Ok(None);
        }
        Ok(Some(composite))
    }

    /// Run the full export pipeline under the same discard policy.
    ///
    /// # Errors
    ///
    /// See [`WatermarkEngine::export_async`].
    pub async fn export(
        &self,
        base: Arc<RgbaImage>,
        signature: Option<SignatureSpec>,
        params: TileParams,
        verified: bool,
    ) -> Result<Option<ExportedImage>> {
        let ticket = self.begin();
        let exported = self
            .engine
            .export_async(base, signature, params, verified)
            .await?;

        if !self.is_current(ticket) {
            tracing::debug!(ticket, "export superseded, discarding result");
            return Ok(None);
        }
        Ok(Some(exported))
    }
}

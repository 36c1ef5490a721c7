//! Async driver around [`OverlayScheduler`]: view events in, committed frames out.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

use crate::compositor::MaskCompositor;
use crate::config::DisplayOptions;
use crate::scheduler::{CommitOutcome, OverlayScheduler, RenderedFrame, ViewEvent};
use crate::traits::{MaskLoader, MaskResolver};

const EVENT_BUFFER: usize = 64;

/// Sender side of a running overlay
#[derive(Debug, Clone)]
pub struct OverlayHandle {
    events: mpsc::Sender<ViewEvent>,
    frames: watch::Receiver<Option<Arc<RenderedFrame>>>,
}

impl OverlayHandle {
    /// Queue a view event; fails only once the runtime has shut down
    pub async fn send(&self, event: ViewEvent) -> Result<(), mpsc::error::SendError<ViewEvent>> {
        self.events.send(event).await
    }

    /// Latest committed frame
    pub fn frame(&self) -> Option<Arc<RenderedFrame>> {
        self.frames.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<RenderedFrame>>> {
        self.frames.clone()
    }

    /// Wait until a frame with at least `generation` has been committed
    pub async fn wait_for_generation(&mut self, generation: u64) -> Option<Arc<RenderedFrame>> {
        let frame = self
            .frames
            .wait_for(|frame| frame.as_ref().is_some_and(|f| f.generation >= generation))
            .await
            .ok()?;
        frame.clone()
    }
}

pub struct OverlayRuntime<L: MaskLoader, R: MaskResolver> {
    scheduler: OverlayScheduler,
    compositor: Arc<MaskCompositor<L>>,
    resolver: Arc<R>,
}

impl<L, R> OverlayRuntime<L, R>
where
    L: MaskLoader + 'static,
    R: MaskResolver + 'static,
{
    pub fn new(job_id: i64, options: DisplayOptions, compositor: MaskCompositor<L>, resolver: R) -> Self {
        Self {
            scheduler: OverlayScheduler::new(job_id, options),
            compositor: Arc::new(compositor),
            resolver: Arc::new(resolver),
        }
    }

    /// Spawn the event loop. It runs until every [`OverlayHandle`] is dropped and
    /// returns the scheduler so the final state can be inspected.
    pub fn spawn(self) -> (OverlayHandle, JoinHandle<OverlayScheduler>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (frame_tx, frame_rx) = watch::channel(None);
        let task = tokio::spawn(self.run(event_rx, frame_tx));
        (
            OverlayHandle {
                events: event_tx,
                frames: frame_rx,
            },
            task,
        )
    }

    async fn run(
        mut self,
        mut events: mpsc::Receiver<ViewEvent>,
        frames: watch::Sender<Option<Arc<RenderedFrame>>>,
    ) -> OverlayScheduler {
        let mut passes: JoinSet<RenderedFrame> = JoinSet::new();
        let mut open = true;

        while open || !passes.is_empty() {
            tokio::select! {
                event = events.recv(), if open => match event {
                    Some(event) => {
                        if let Some(pass) = self.scheduler.apply(event) {
                            let compositor = Arc::clone(&self.compositor);
                            let resolver = Arc::clone(&self.resolver);
                            passes.spawn(async move { pass.run(&compositor, resolver.as_ref()).await });
                        }
                    }
                    None => {
                        debug!(in_flight = passes.len(), "event channel closed");
                        open = false;
                    }
                },
                Some(joined) = passes.join_next() => match joined {
                    Ok(frame) => self.publish(frame, &frames),
                    Err(e) => error!(error = %e, "render pass aborted"),
                },
            }
        }
        self.scheduler
    }

    fn publish(&mut self, frame: RenderedFrame, frames: &watch::Sender<Option<Arc<RenderedFrame>>>) {
        let generation = frame.generation;
        if self.scheduler.commit(frame) != CommitOutcome::Applied {
            return;
        }
        if let Some(frame) = self.scheduler.current_frame() {
            info!(generation, drawn = frame.report.drawn, failed = frame.report.failed, "frame committed");
            frames.send_replace(Some(Arc::clone(frame)));
        }
    }
}

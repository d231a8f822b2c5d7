use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::cache::{CacheResult, CacheStorage, Request, Response};
use crate::network::Network;
use crate::worker::{ActivateReport, InstallReport, OfflineWorker};

/// Lifecycle signals delivered to the worker
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
  /// A new version is being installed
  Install,
  /// A page issued a resource request
  Fetch(Request),
  /// The new version takes control
  Activate,
}

/// What a handled event produced
#[derive(Debug)]
pub enum EventOutcome {
  Installed(InstallReport),
  Fetched(CacheResult<Response>),
  Activated(ActivateReport),
}

type Envelope = (LifecycleEvent, oneshot::Sender<Result<EventOutcome>>);

/// Handle used to deliver events to a running dispatcher
#[derive(Clone)]
pub struct EventSender {
  tx: mpsc::UnboundedSender<Envelope>,
}

impl EventSender {
  /// Deliver an event and wait until its handler has finished.
  pub async fn send(&self, event: LifecycleEvent) -> Result<EventOutcome> {
    let (reply_tx, reply_rx) = oneshot::channel();
    self
      .tx
      .send((event, reply_tx))
      .map_err(|_| eyre!("Event dispatcher has stopped"))?;

    reply_rx
      .await
      .map_err(|_| eyre!("Event handler dropped without replying"))?
  }
}

/// Delivers lifecycle events to the worker.
///
/// Install and activate are handled one at a time in arrival order. Fetch
/// events are spawned so concurrent page requests do not wait on each other.
pub struct EventDispatcher<S: CacheStorage, N: Network> {
  worker: Arc<OfflineWorker<S, N>>,
  rx: mpsc::UnboundedReceiver<Envelope>,
}

impl<S, N> EventDispatcher<S, N>
where
  S: CacheStorage + 'static,
  N: Network + 'static,
{
  /// Create a dispatcher for the worker and the sender that feeds it
  pub fn new(worker: OfflineWorker<S, N>) -> (Self, EventSender) {
    let (tx, rx) = mpsc::unbounded_channel();
    let dispatcher = Self {
      worker: Arc::new(worker),
      rx,
    };
    (dispatcher, EventSender { tx })
  }

  /// Process events until every sender is dropped
  pub async fn run(mut self) {
    while let Some((event, reply)) = self.rx.recv().await {
      match event {
        LifecycleEvent::Install => {
          debug!("dispatching install");
          let result = self.worker.install().await.map(EventOutcome::Installed);
          let _ = reply.send(result);
        }
        LifecycleEvent::Activate => {
          debug!("dispatching activate");
          let result = self.worker.activate().await.map(EventOutcome::Activated);
          let _ = reply.send(result);
        }
        LifecycleEvent::Fetch(request) => {
          let worker = Arc::clone(&self.worker);
          tokio::spawn(async move {
            let result = worker.fetch(&request).await.map(EventOutcome::Fetched);
            let _ = reply.send(result);
          });
        }
      }
    }
    debug!("event dispatcher stopped");
  }
}

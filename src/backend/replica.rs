use crate::actor::Callback;
use crate::backend::journal::Journal;
use crate::backend::shard::{ShardCreationError, ShardOptions, ShardOptionsValidated, ShardState};
use crate::connection::{Backend, TransportError};
use crate::data::{DataTree, InMemoryDataTree};
use crate::identifiers::LocalHistoryIdentifier;
use crate::timing::{ConsensusOptions, ConsensusParams};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

pub struct ShardConfig {
    pub shard_name: String,
    /// Replica names. The first one starts as leader.
    pub replicas: Vec<String>,
    pub info_logger: slog::Logger,
    pub journal: Box<dyn Journal>,
    /// Defaults to an empty `InMemoryDataTree`.
    pub data_tree: Option<Arc<dyn DataTree>>,
    pub options: ShardOptions,
    pub consensus: ConsensusOptions,
}

#[derive(Debug, thiserror::Error)]
pub enum ShardError {
    #[error("Shard has no replica named {0}")]
    UnknownReplica(String),
    #[error("Shard task has exited")]
    ShardExited,
}

enum Event {
    Deliver {
        replica: Arc<str>,
        frame: Bytes,
        callback: Callback<Bytes, TransportError>,
    },
    Elect(String, Callback<(), ShardError>),
    ClosedHistories(Callback<Vec<LocalHistoryIdentifier>, ShardError>),
}

/// A running shard: its replicated state plus a backend endpoint per replica.
#[derive(Clone)]
pub struct ShardHandle {
    name: String,
    sender: mpsc::Sender<Event>,
    replicas: BTreeMap<String, ShardReplica>,
    tree: Arc<dyn DataTree>,
}

/// Backend endpoint of one replica. Only the current leader serves requests, the others answer
/// `NotLeader`.
#[derive(Clone)]
pub struct ShardReplica {
    name: Arc<str>,
    sender: mpsc::Sender<Event>,
    tree: Option<Arc<dyn DataTree>>,
}

pub fn spawn_shard(config: ShardConfig) -> Result<ShardHandle, ShardCreationError> {
    let options =
        ShardOptionsValidated::try_from(config.options).map_err(|e| ShardCreationError::IllegalOptions(e.to_string()))?;
    let consensus = ConsensusParams::try_from(config.consensus)
        .map_err(|e| ShardCreationError::IllegalConsensusOptions(e.to_string()))?;

    let logger = config
        .info_logger
        .new(slog::o!("Shard" => config.shard_name.clone()));
    let tree = config
        .data_tree
        .unwrap_or_else(|| Arc::new(InMemoryDataTree::new()) as Arc<dyn DataTree>);
    let state = ShardState::recover(
        logger.clone(),
        config.replicas.clone(),
        tree.clone(),
        config.journal,
        options,
        consensus.journal_recovery_batch_size(),
    )?;

    let (sender, receiver) = mpsc::channel(64);
    let local_tree = if state.options().co_located {
        Some(tree.clone())
    } else {
        None
    };
    let replicas = config
        .replicas
        .into_iter()
        .map(|name| {
            let replica = ShardReplica {
                name: Arc::from(name.as_str()),
                sender: sender.clone(),
                tree: local_tree.clone(),
            };
            (name, replica)
        })
        .collect();

    slog::info!(logger, "Shard started, {} leads", state.leader());
    tokio::spawn(run_event_loop(receiver, state));

    Ok(ShardHandle {
        name: config.shard_name,
        sender,
        replicas,
        tree,
    })
}

async fn run_event_loop(mut receiver: mpsc::Receiver<Event>, mut state: ShardState) {
    while let Some(event) = receiver.recv().await {
        match event {
            Event::Deliver {
                replica,
                frame,
                callback,
            } => callback.send(state.handle_frame(&replica, frame)),
            Event::Elect(replica, callback) => {
                let result = if state.elect(&replica) {
                    Ok(())
                } else {
                    Err(ShardError::UnknownReplica(replica))
                };
                callback.send(result);
            }
            Event::ClosedHistories(callback) => callback.send(Ok(state.closed_histories())),
        }
    }
}

impl ShardHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn replica(&self, name: &str) -> Option<Arc<dyn Backend>> {
        self.replicas
            .get(name)
            .map(|replica| Arc::new(replica.clone()) as Arc<dyn Backend>)
    }

    /// The shard's data, for inspection.
    pub fn tree(&self) -> &Arc<dyn DataTree> {
        &self.tree
    }

    /// Move leadership to `replica`. The former leader answers `NotLeader` from now on.
    pub async fn elect(&self, replica: &str) -> Result<(), ShardError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Elect(replica.to_string(), Callback(tx))).await?;
        rx.await.map_err(|_| ShardError::ShardExited)?
    }

    pub async fn closed_histories(&self) -> Result<Vec<LocalHistoryIdentifier>, ShardError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::ClosedHistories(Callback(tx))).await?;
        rx.await.map_err(|_| ShardError::ShardExited)?
    }

    async fn send(&self, event: Event) -> Result<(), ShardError> {
        self.sender.send(event).await.map_err(|_| ShardError::ShardExited)
    }
}

#[async_trait::async_trait]
impl Backend for ShardReplica {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, frame: Bytes) -> Result<Bytes, TransportError> {
        let (tx, rx) = oneshot::channel();
        let event = Event::Deliver {
            replica: self.name.clone(),
            frame,
            callback: Callback(tx),
        };
        if self.sender.send(event).await.is_err() {
            return Err(TransportError::Unreachable(self.name.to_string()));
        }

        rx.await
            .map_err(|_| TransportError::Dropped(self.name.to_string()))?
    }

    fn local_data_tree(&self) -> Option<Arc<dyn DataTree>> {
        self.tree.clone()
    }
}

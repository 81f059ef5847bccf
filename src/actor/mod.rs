use crate::client::{ClientBehavior, ClientError, ClientLocalHistory, ClientSnapshot, ClientTransaction, ShardStrategy};
use crate::connection::{ResolvedBackend, ResolutionError, ResponseCallback, ShardKey, TransportError};
use crate::history::TransactionState;
use crate::identifiers::{ClientIdentifier, LocalHistoryIdentifier, TransactionIdentifier};
use crate::timing::Clock;
use crate::wire::{Payload, Target};
use bytes::Bytes;
use std::any::Any;
use std::error::Error;
use std::fmt::{self, Debug};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

// Everything the client actor reacts to. Each command is handled to completion before the next
// one is looked at.
pub(crate) enum Command {
    // Administrative. Answer with a handle to this same client.
    GetClient(Callback<ClientHandle, ClientError>),

    CreateLocalHistory(Callback<LocalHistoryIdentifier, ClientError>),

    // `None` creates in the standalone history.
    CreateTransaction(Option<LocalHistoryIdentifier>, Callback<TransactionIdentifier, ClientError>),
    CreateSnapshot(Option<LocalHistoryIdentifier>, Callback<TransactionIdentifier, ClientError>),

    // Route to the shard's connection, resolving it first if needed. Answered when the backend
    // replies, which may be after any number of reconnects.
    Request(ClientRequest, ResponseCallback),

    // Fire and forget from transaction handles.
    TransactionStateChanged(TransactionIdentifier, TransactionState),

    CloseLocalHistory(LocalHistoryIdentifier, Callback<(), ClientError>),

    // Stop accepting work. Final cleanup happens in `InternalCommand::FinishClose`.
    Close(Callback<(), ClientError>),

    // Fail everything outstanding and stop the actor.
    Halt(String),

    // Posted by the client's own background tasks.
    Internal(InternalCommand),

    // Anything else is ignored.
    Unrecognized(Box<dyn Any + Send>),
}

pub(crate) enum InternalCommand {
    BackendResolved {
        shard: ShardKey,
        incarnation: u64,
        result: Result<ResolvedBackend, ResolutionError>,
    },
    Delivered {
        shard: ShardKey,
        incarnation: u64,
        result: Result<Bytes, TransportError>,
    },
    FinishClose,
}

pub(crate) struct ClientRequest {
    pub shard: ShardKey,
    pub target: Target,
    pub sequence: u64,
    pub payload: Payload,
}

#[derive(Debug)]
pub(crate) struct Callback<O: Debug, E: Error>(pub oneshot::Sender<Result<O, E>>);

impl<O: Debug, E: Error> Callback<O, E> {
    pub fn send(self, message: Result<O, E>) {
        let _ = self.0.send(message);
    }
}

/// Handle to a running client. Cheap to clone, every clone talks to the same client.
#[derive(Clone)]
pub struct ClientHandle {
    identifier: ClientIdentifier,
    sender: mpsc::Sender<Command>,
    strategy: Arc<dyn ShardStrategy>,
}

impl ClientHandle {
    pub(crate) fn new(
        identifier: ClientIdentifier,
        sender: mpsc::Sender<Command>,
        strategy: Arc<dyn ShardStrategy>,
    ) -> Self {
        ClientHandle {
            identifier,
            sender,
            strategy,
        }
    }

    pub fn identifier(&self) -> &ClientIdentifier {
        &self.identifier
    }

    pub async fn get_client(&self) -> Result<ClientHandle, ClientError> {
        self.call(Command::GetClient).await
    }

    pub async fn create_local_history(&self) -> Result<ClientLocalHistory, ClientError> {
        let identifier = self.call(Command::CreateLocalHistory).await?;
        Ok(ClientLocalHistory::new(self.clone(), identifier))
    }

    /// A transaction in the client's standalone history.
    pub async fn create_transaction(&self) -> Result<ClientTransaction, ClientError> {
        self.create_transaction_in(None).await
    }

    /// A read-only view in the client's standalone history.
    pub async fn create_snapshot(&self) -> Result<ClientSnapshot, ClientError> {
        self.create_snapshot_in(None).await
    }

    /// Once this returns, every create operation fails with an illegal state error.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.call(Command::Close).await
    }

    pub async fn halt(&self, cause: impl Into<String>) -> Result<(), ClientError> {
        self.send(Command::Halt(cause.into())).await
    }

    pub(crate) async fn create_transaction_in(
        &self,
        history: Option<LocalHistoryIdentifier>,
    ) -> Result<ClientTransaction, ClientError> {
        let identifier = self
            .call(|callback| Command::CreateTransaction(history, callback))
            .await?;
        Ok(ClientTransaction::new(self.clone(), identifier))
    }

    pub(crate) async fn create_snapshot_in(
        &self,
        history: Option<LocalHistoryIdentifier>,
    ) -> Result<ClientSnapshot, ClientError> {
        let identifier = self.call(|callback| Command::CreateSnapshot(history, callback)).await?;
        Ok(ClientSnapshot::new(self.clone(), identifier))
    }

    pub(crate) async fn close_local_history(&self, history: LocalHistoryIdentifier) -> Result<(), ClientError> {
        self.call(|callback| Command::CloseLocalHistory(history, callback)).await
    }

    pub(crate) fn strategy(&self) -> &Arc<dyn ShardStrategy> {
        &self.strategy
    }

    /// Bounded by the request timeout. A timed out request may still be applied by the backend.
    pub(crate) async fn request(&self, request: ClientRequest) -> Result<Payload, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Request(request, tx)).await?;

        rx.await.map_err(|_| ClientError::ClientExited)?.map_err(ClientError::from)
    }

    // Best effort, used from `Drop`.
    pub(crate) fn transaction_state_changed(&self, transaction: TransactionIdentifier, state: TransactionState) {
        let _ = self
            .sender
            .try_send(Command::TransactionStateChanged(transaction, state));
    }

    async fn call<O, F>(&self, command: F) -> Result<O, ClientError>
    where
        O: Debug,
        F: FnOnce(Callback<O, ClientError>) -> Command,
    {
        let (tx, rx) = oneshot::channel();
        self.send(command(Callback(tx))).await?;

        rx.await.map_err(|_| ClientError::ClientExited)?
    }

    async fn send(&self, command: Command) -> Result<(), ClientError> {
        self.sender.send(command).await.map_err(|_| ClientError::ClientExited)
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("identifier", &self.identifier)
            .finish()
    }
}

/// The client behavior in actor model.
pub(crate) struct ClientActor<C: Clock> {
    receiver: mpsc::Receiver<Command>,
    behavior: ClientBehavior<C>,
}

impl<C: Clock> ClientActor<C> {
    pub(crate) fn new(receiver: mpsc::Receiver<Command>, behavior: ClientBehavior<C>) -> Self {
        ClientActor { receiver, behavior }
    }

    pub(crate) async fn run_event_loop(self) {
        let ClientActor {
            mut receiver,
            mut behavior,
        } = self;

        while let Some(command) = receiver.recv().await {
            // This must NOT be async. Remote round trips are spawned and report back as
            // internal commands.
            behavior = match behavior.on_command(command) {
                Some(next) => next,
                None => return,
            };
        }
    }
}

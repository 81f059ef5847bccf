use crate::actor::{ClientHandle, Command, InternalCommand};
use crate::client::options::ClientOptionsValidated;
use crate::client::shard::ShardStrategy;
use crate::connection::BackendResolver;
use crate::identifiers::ClientIdentifier;
use crate::timing::{Clock, ConsensusParams};
use std::sync::Arc;
use tokio::sync::mpsc;

/// What the client actor and its background tasks share. Holds only a weak reference to the
/// actor's mailbox, so tasks never keep a client alive on their own.
pub(crate) struct ClientContext<C: Clock> {
    pub logger: slog::Logger,
    pub identifier: ClientIdentifier,
    pub mailbox: mpsc::WeakSender<Command>,
    pub clock: C,
    pub resolver: Arc<dyn BackendResolver>,
    pub options: Arc<ClientOptionsValidated>,
    pub consensus: ConsensusParams,
    pub shard_strategy: Arc<dyn ShardStrategy>,
}

impl<C: Clock> ClientContext<C> {
    /// Post `command` to the actor. Returns false if the actor is gone.
    pub(crate) async fn execute_in_actor(&self, command: InternalCommand) -> bool {
        match self.mailbox.upgrade() {
            Some(sender) => sender.send(Command::Internal(command)).await.is_ok(),
            None => false,
        }
    }

    /// `None` once every handle has been dropped.
    pub(crate) fn handle(&self) -> Option<ClientHandle> {
        self.mailbox.upgrade().map(|sender| {
            ClientHandle::new(self.identifier.clone(), sender, self.shard_strategy.clone())
        })
    }
}

impl<C: Clock> Clone for ClientContext<C> {
    fn clone(&self) -> Self {
        ClientContext {
            logger: self.logger.clone(),
            identifier: self.identifier.clone(),
            mailbox: self.mailbox.clone(),
            clock: self.clock.clone(),
            resolver: self.resolver.clone(),
            options: self.options.clone(),
            consensus: self.consensus.clone(),
            shard_strategy: self.shard_strategy.clone(),
        }
    }
}

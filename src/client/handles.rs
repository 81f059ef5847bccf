use crate::actor::{ClientHandle, ClientRequest};
use crate::client::errors::ClientError;
use crate::connection::ShardKey;
use crate::data::{DataPath, NormalizedNode};
use crate::history::TransactionState;
use crate::identifiers::{LocalHistoryIdentifier, TransactionIdentifier};
use crate::sequencer::SequenceIssuer;
use crate::wire::{Modification, Payload, PersistenceProtocol, Target};

/// A chain of transactions. Each transaction observes the effects of the ones created before it.
#[derive(Debug)]
pub struct ClientLocalHistory {
    client: ClientHandle,
    identifier: LocalHistoryIdentifier,
}

impl ClientLocalHistory {
    pub(crate) fn new(client: ClientHandle, identifier: LocalHistoryIdentifier) -> Self {
        ClientLocalHistory { client, identifier }
    }

    pub fn identifier(&self) -> &LocalHistoryIdentifier {
        &self.identifier
    }

    pub async fn create_transaction(&self) -> Result<ClientTransaction, ClientError> {
        self.client.create_transaction_in(Some(self.identifier.clone())).await
    }

    pub async fn create_snapshot(&self) -> Result<ClientSnapshot, ClientError> {
        self.client.create_snapshot_in(Some(self.identifier.clone())).await
    }

    /// Fails while any transaction of the history is still open. Otherwise the history is closed
    /// on every shard it touched before this returns.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.client.close_local_history(self.identifier.clone()).await
    }
}

// Transactions and snapshots talk to a single shard, the one their first path maps to.
#[derive(Debug)]
struct ShardRequests {
    client: ClientHandle,
    identifier: TransactionIdentifier,
    sequencer: SequenceIssuer,
    shard: Option<ShardKey>,
}

impl ShardRequests {
    fn new(client: ClientHandle, identifier: TransactionIdentifier) -> Self {
        ShardRequests {
            client,
            identifier,
            sequencer: SequenceIssuer::new(),
            shard: None,
        }
    }

    fn bind(&mut self, path: &DataPath) -> Result<ShardKey, ClientError> {
        let shard = self.client.strategy().shard_for_path(path);
        match self.shard {
            None => {
                self.shard = Some(shard);
                Ok(shard)
            }
            Some(bound) if bound == shard => Ok(shard),
            Some(bound) => Err(ClientError::IllegalState(format!(
                "{:?} maps to {:?}, transaction is bound to {:?}",
                path, shard, bound
            ))),
        }
    }

    async fn request(&mut self, shard: ShardKey, payload: Payload) -> Result<Payload, ClientError> {
        self.client
            .request(ClientRequest {
                shard,
                target: Target::Transaction(self.identifier.clone()),
                sequence: self.sequencer.next_sequence(),
                payload,
            })
            .await
    }

    async fn read(&mut self, path: DataPath, snapshot_only: bool) -> Result<Option<NormalizedNode>, ClientError> {
        let shard = self.bind(&path)?;
        match self
            .request(shard, Payload::ReadTransactionRequest { path, snapshot_only })
            .await?
        {
            Payload::ReadTransactionSuccess { data } => Ok(data),
            other => Err(ClientError::UnexpectedResponse(other.kind())),
        }
    }

    async fn exists(&mut self, path: DataPath, snapshot_only: bool) -> Result<bool, ClientError> {
        let shard = self.bind(&path)?;
        match self
            .request(shard, Payload::ExistsTransactionRequest { path, snapshot_only })
            .await?
        {
            Payload::ExistsTransactionSuccess { exists } => Ok(exists),
            other => Err(ClientError::UnexpectedResponse(other.kind())),
        }
    }

    async fn modify(
        &mut self,
        modifications: Vec<Modification>,
        protocol: Option<PersistenceProtocol>,
    ) -> Result<(), ClientError> {
        let shard = match self.shard {
            Some(shard) => shard,
            // Never touched a shard, nothing to tell a backend.
            None => return Ok(()),
        };

        match self
            .request(shard, Payload::ModifyTransactionRequest { modifications, protocol })
            .await?
        {
            Payload::ModifyTransactionSuccess => Ok(()),
            other => Err(ClientError::UnexpectedResponse(other.kind())),
        }
    }
}

/// A read-write transaction. Modifications are batched locally and shipped with the next read,
/// or when the transaction is readied.
///
/// A failed modification does not fail the call that made it. The first failure is reported
/// when the transaction is readied, and the transaction is aborted.
#[derive(Debug)]
pub struct ClientTransaction {
    requests: ShardRequests,
    state: TransactionState,
    pre_committed: bool,
    pending: Vec<Modification>,
}

impl ClientTransaction {
    pub(crate) fn new(client: ClientHandle, identifier: TransactionIdentifier) -> Self {
        ClientTransaction {
            requests: ShardRequests::new(client, identifier),
            state: TransactionState::Open,
            pre_committed: false,
            pending: vec![],
        }
    }

    pub fn identifier(&self) -> &TransactionIdentifier {
        &self.requests.identifier
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub async fn read(&mut self, path: DataPath) -> Result<Option<NormalizedNode>, ClientError> {
        self.check_state(TransactionState::Open)?;
        self.flush().await?;
        self.requests.read(path, false).await
    }

    pub async fn exists(&mut self, path: DataPath) -> Result<bool, ClientError> {
        self.check_state(TransactionState::Open)?;
        self.flush().await?;
        self.requests.exists(path, false).await
    }

    pub fn write(&mut self, path: DataPath, data: NormalizedNode) -> Result<(), ClientError> {
        self.modification(&path)?;
        self.pending.push(Modification::Write(path, data));
        Ok(())
    }

    pub fn merge(&mut self, path: DataPath, data: NormalizedNode) -> Result<(), ClientError> {
        self.modification(&path)?;
        self.pending.push(Modification::Merge(path, data));
        Ok(())
    }

    pub fn delete(&mut self, path: DataPath) -> Result<(), ClientError> {
        self.modification(&path)?;
        self.pending.push(Modification::Delete(path));
        Ok(())
    }

    /// Seal the transaction. Reports the first failed modification, if any.
    pub async fn ready(&mut self) -> Result<(), ClientError> {
        self.check_state(TransactionState::Open)?;

        let modifications = std::mem::take(&mut self.pending);
        match self.requests.modify(modifications, Some(PersistenceProtocol::Ready)).await {
            Ok(()) => {
                self.transition(TransactionState::Ready);
                Ok(())
            }
            Err(e) => {
                self.transition(TransactionState::Aborted);
                Err(e)
            }
        }
    }

    /// Prepare phase. The transaction must be ready.
    pub async fn pre_commit(&mut self) -> Result<(), ClientError> {
        self.check_state(TransactionState::Ready)?;
        if self.pre_committed {
            return Ok(());
        }

        let shard = match self.requests.shard {
            Some(shard) => shard,
            None => {
                self.pre_committed = true;
                return Ok(());
            }
        };
        match self.requests.request(shard, Payload::TransactionPreCommitRequest).await {
            Ok(Payload::TransactionPreCommitSuccess) => {
                self.pre_committed = true;
                Ok(())
            }
            Ok(other) => Err(ClientError::UnexpectedResponse(other.kind())),
            Err(e) => {
                self.transition(TransactionState::Aborted);
                Err(e)
            }
        }
    }

    /// Runs whichever of ready, pre-commit and commit haven't happened yet.
    pub async fn commit(&mut self) -> Result<(), ClientError> {
        if self.state == TransactionState::Open {
            self.ready().await?;
        }
        self.pre_commit().await?;

        let shard = match self.requests.shard {
            Some(shard) => shard,
            None => {
                self.transition(TransactionState::Committed);
                return Ok(());
            }
        };
        match self.requests.request(shard, Payload::TransactionCommitRequest).await {
            Ok(Payload::TransactionCommitSuccess) => {
                self.transition(TransactionState::Committed);
                Ok(())
            }
            Ok(other) => Err(ClientError::UnexpectedResponse(other.kind())),
            Err(e) => {
                self.transition(TransactionState::Aborted);
                Err(e)
            }
        }
    }

    /// Discard the transaction. Aborting a finished transaction is a no-op.
    pub async fn abort(&mut self) -> Result<(), ClientError> {
        if self.state.is_finished() {
            return Ok(());
        }

        self.pending.clear();
        // Open or readied, the backend drops whatever it holds for us.
        let result = self.requests.modify(vec![], Some(PersistenceProtocol::Abort)).await;
        self.transition(TransactionState::Aborted);
        result
    }

    async fn flush(&mut self) -> Result<(), ClientError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let modifications = std::mem::take(&mut self.pending);
        self.requests.modify(modifications, None).await
    }

    fn modification(&mut self, path: &DataPath) -> Result<(), ClientError> {
        self.check_state(TransactionState::Open)?;
        self.requests.bind(path).map(|_| ())
    }

    fn check_state(&self, expected: TransactionState) -> Result<(), ClientError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ClientError::IllegalState(format!(
                "{:?} is {:?}, expected {:?}",
                self.requests.identifier, self.state, expected
            )))
        }
    }

    fn transition(&mut self, state: TransactionState) {
        self.state = state;
        self.requests
            .client
            .transaction_state_changed(self.requests.identifier.clone(), state);
    }
}

impl Drop for ClientTransaction {
    fn drop(&mut self) {
        if !self.state.is_finished() {
            self.transition(TransactionState::Aborted);
        }
    }
}

/// A read-only view of the data.
#[derive(Debug)]
pub struct ClientSnapshot {
    requests: ShardRequests,
    closed: bool,
}

impl ClientSnapshot {
    pub(crate) fn new(client: ClientHandle, identifier: TransactionIdentifier) -> Self {
        ClientSnapshot {
            requests: ShardRequests::new(client, identifier),
            closed: false,
        }
    }

    pub fn identifier(&self) -> &TransactionIdentifier {
        &self.requests.identifier
    }

    pub async fn read(&mut self, path: DataPath) -> Result<Option<NormalizedNode>, ClientError> {
        self.check_open()?;
        self.requests.read(path, true).await
    }

    pub async fn exists(&mut self, path: DataPath) -> Result<bool, ClientError> {
        self.check_open()?;
        self.requests.exists(path, true).await
    }

    pub async fn close(&mut self) -> Result<(), ClientError> {
        if self.closed {
            return Ok(());
        }

        self.finish();
        self.requests.modify(vec![], Some(PersistenceProtocol::Abort)).await
    }

    fn check_open(&self) -> Result<(), ClientError> {
        if self.closed {
            return Err(ClientError::IllegalState(format!(
                "Snapshot {:?} is closed",
                self.requests.identifier
            )));
        }
        Ok(())
    }

    fn finish(&mut self) {
        self.closed = true;
        self.requests
            .client
            .transaction_state_changed(self.requests.identifier.clone(), TransactionState::Aborted);
    }
}

impl Drop for ClientSnapshot {
    fn drop(&mut self) {
        if !self.closed {
            self.finish();
        }
    }
}

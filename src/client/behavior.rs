use crate::actor::{Callback, ClientRequest, Command, InternalCommand};
use crate::client::context::ClientContext;
use crate::client::errors::ClientError;
use crate::connection::{
    spawn_resolution, spawn_transmitter, ConnectedBackend, Connection, ConnectionError, RequestError, ResolutionError,
    ResolvedBackend, ResponseCallback, ResponseOutcome, ShardKey, TransportError,
};
use crate::history::{LocalHistory, TransactionExecutor, TransactionState};
use crate::identifiers::{LocalHistoryIdentifier, TransactionIdentifier, STANDALONE_HISTORY_ID};
use crate::sequencer::SequenceIssuer;
use crate::timing::Clock;
use crate::wire::{Envelope, Payload, Target};
use bytes::Bytes;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientState {
    Open,
    Closed,
}

struct HistoryRecord {
    history: LocalHistory,
    // Sequence numbers for requests addressed to the history itself.
    sequencer: SequenceIssuer,
    // Shards any of the history's transactions have talked to.
    shards: BTreeSet<ShardKey>,
}

impl HistoryRecord {
    fn new(identifier: LocalHistoryIdentifier) -> Self {
        HistoryRecord {
            history: LocalHistory::new(identifier),
            sequencer: SequenceIssuer::new(),
            shards: BTreeSet::new(),
        }
    }
}

/// The client's state machine. Owns the histories and one connection per shard. Never blocks:
/// resolution and delivery run in background tasks which report back through the mailbox.
pub(crate) struct ClientBehavior<C: Clock> {
    logger: slog::Logger,
    context: ClientContext<C>,
    state: ClientState,
    histories: BTreeMap<u64, HistoryRecord>,
    next_history_id: u64,
    connections: BTreeMap<ShardKey, Connection>,
    // Connect handshakes are sequenced in the client's own scope.
    connect_sequence: SequenceIssuer,
    next_incarnation: u64,
}

impl<C: Clock> ClientBehavior<C> {
    pub(crate) fn new(context: ClientContext<C>) -> Self {
        let logger = context.logger.clone();
        let standalone = LocalHistoryIdentifier::standalone(context.identifier.clone());
        let mut histories = BTreeMap::new();
        histories.insert(STANDALONE_HISTORY_ID, HistoryRecord::new(standalone));

        ClientBehavior {
            logger,
            context,
            state: ClientState::Open,
            histories,
            next_history_id: STANDALONE_HISTORY_ID + 1,
            connections: BTreeMap::new(),
            connect_sequence: SequenceIssuer::new(),
            next_incarnation: 0,
        }
    }

    /// Handle one command. `None` means the client halted and the actor must stop.
    pub(crate) fn on_command(mut self, command: Command) -> Option<Self> {
        match command {
            Command::GetClient(callback) => callback.send(self.context.handle().ok_or(ClientError::ClientExited)),
            Command::CreateLocalHistory(callback) => callback.send(self.create_local_history()),
            Command::CreateTransaction(history, callback) | Command::CreateSnapshot(history, callback) => {
                callback.send(self.create_transaction(history))
            }
            Command::Request(request, callback) => self.send_request(request, callback),
            Command::TransactionStateChanged(transaction, state) => self.on_transaction_state(transaction, state),
            Command::CloseLocalHistory(history, callback) => self.close_local_history(history, callback),
            Command::Close(callback) => callback.send(self.close()),
            Command::Halt(cause) => {
                self.halt(cause);
                return None;
            }
            Command::Internal(internal) => self.on_internal(internal),
            Command::Unrecognized(_) => {
                slog::debug!(self.logger, "Ignoring unrecognized command");
            }
        }

        Some(self)
    }

    fn create_local_history(&mut self) -> Result<LocalHistoryIdentifier, ClientError> {
        self.check_open()?;

        let identifier = LocalHistoryIdentifier::new(self.context.identifier.clone(), self.next_history_id);
        self.next_history_id += 1;
        self.histories
            .insert(identifier.history_id(), HistoryRecord::new(identifier.clone()));
        slog::debug!(self.logger, "Created local history {:?}", identifier);

        Ok(identifier)
    }

    // Snapshots draw their identifiers from the same sequence as transactions.
    fn create_transaction(
        &mut self,
        history: Option<LocalHistoryIdentifier>,
    ) -> Result<TransactionIdentifier, ClientError> {
        self.check_open()?;

        let record = self.history_record(history.as_ref())?;
        Ok(record.history.create_transaction()?)
    }

    fn send_request(&mut self, request: ClientRequest, callback: ResponseCallback) {
        let ClientRequest {
            shard,
            target,
            sequence,
            payload,
        } = request;

        if let Target::Transaction(transaction) = &target {
            if let Some(record) = self.histories.get_mut(&transaction.history().history_id()) {
                record.shards.insert(shard);
            }
        }

        let callback = self.bounded(callback);
        let max_version = self.context.options.max_version;
        match self.get_connection(shard) {
            Ok(connection) => {
                // Connected or not, the envelope is re-versioned on transmit.
                let version = connection.version().unwrap_or(max_version);
                let _ = connection.send(Envelope::new(version, target, sequence, payload), callback);
            }
            Err(e) => {
                let _ = callback.send(Err(e));
            }
        }
    }

    // The caller hears back within the request timeout. The connection keeps the request either way.
    fn bounded(&self, callback: ResponseCallback) -> ResponseCallback {
        let (tx, rx) = oneshot::channel();
        let mut clock = self.context.clock.clone();
        let deadline = clock.now() + self.context.options.request_timeout;
        tokio::task::spawn(async move {
            let remaining = deadline.saturating_duration_since(clock.now());
            match clock.within(remaining, rx).await {
                Some(Ok(result)) => {
                    let _ = callback.send(result);
                }
                // Dropped unanswered, the caller sees the client as gone.
                Some(Err(_)) => {}
                None => {
                    let _ = callback.send(Err(RequestError::Timeout));
                }
            }
        });
        tx
    }

    fn on_transaction_state(&mut self, transaction: TransactionIdentifier, state: TransactionState) {
        let result = match self.histories.get_mut(&transaction.history().history_id()) {
            Some(record) => record.history.update_transaction(&transaction, state),
            None => return,
        };
        if let Err(e) = result {
            slog::debug!(self.logger, "Ignoring state change to {:?}: {}", state, e);
        }
    }

    // The history is closed locally first, then on every shard it touched. The callback fires
    // once every shard has answered.
    fn close_local_history(&mut self, history: LocalHistoryIdentifier, callback: Callback<(), ClientError>) {
        if history.is_standalone() {
            return callback.send(Err(ClientError::IllegalState(String::from(
                "The standalone history cannot be closed",
            ))));
        }

        let requests: Vec<(ShardKey, u64)> = match self.history_record(Some(&history)) {
            Ok(record) => {
                if let Err(e) = record.history.close() {
                    return callback.send(Err(e.into()));
                }
                // Every shard sees the close in its own scope, so they all get the same sequence.
                let sequence = record.sequencer.next_sequence();
                record.shards.iter().map(|shard| (*shard, sequence)).collect()
            }
            Err(e) => return callback.send(Err(e)),
        };

        let mut replies = Vec::with_capacity(requests.len());
        for (shard, sequence) in requests {
            let (tx, rx) = oneshot::channel();
            self.send_request(
                ClientRequest {
                    shard,
                    target: Target::History(history.clone()),
                    sequence,
                    payload: Payload::CloseLocalHistoryRequest,
                },
                tx,
            );
            replies.push(rx);
        }

        tokio::task::spawn(async move {
            for reply in replies {
                let outcome = match reply.await {
                    Ok(Ok(Payload::LocalHistorySuccess)) => Ok(()),
                    Ok(Ok(other)) => Err(ClientError::UnexpectedResponse(other.kind())),
                    Ok(Err(e)) => Err(ClientError::from(e)),
                    Err(_) => Err(ClientError::ClientExited),
                };
                if let Err(e) = outcome {
                    return callback.send(Err(e));
                }
            }
            callback.send(Ok(()));
        });
    }

    // Idempotent. Connections keep draining outstanding requests until `FinishClose`.
    fn close(&mut self) -> Result<(), ClientError> {
        if self.state == ClientState::Closed {
            return Ok(());
        }

        slog::info!(self.logger, "Closing client");
        self.state = ClientState::Closed;
        self.close_idle_connections();

        let context = self.context.clone();
        let mut clock = self.context.clock.clone();
        let grace = self.context.options.request_timeout;
        tokio::task::spawn(async move {
            clock.sleep(grace).await;
            let _ = context.execute_in_actor(InternalCommand::FinishClose).await;
        });

        Ok(())
    }

    fn halt(&mut self, cause: String) {
        slog::error!(self.logger, "Halting client: {}", cause);
        self.state = ClientState::Closed;
        for (_, mut connection) in std::mem::take(&mut self.connections) {
            connection.fail_all(RequestError::Halted(cause.clone()));
            connection.close();
        }
    }

    fn on_internal(&mut self, command: InternalCommand) {
        match command {
            InternalCommand::BackendResolved {
                shard,
                incarnation,
                result,
            } => self.on_backend_resolved(shard, incarnation, result),
            InternalCommand::Delivered {
                shard,
                incarnation,
                result,
            } => self.on_delivered(shard, incarnation, result),
            InternalCommand::FinishClose => {
                slog::info!(self.logger, "Closing {} connections", self.connections.len());
                for (_, mut connection) in std::mem::take(&mut self.connections) {
                    connection.close();
                }
            }
        }
    }

    fn on_backend_resolved(
        &mut self,
        shard: ShardKey,
        incarnation: u64,
        result: Result<ResolvedBackend, ResolutionError>,
    ) {
        let logger = self.logger.clone();
        let context = self.context.clone();
        let connection = match self.current_connection(shard, incarnation) {
            Some(connection) => connection,
            None => return,
        };

        match result {
            Ok(resolved) => {
                let local = resolved
                    .backend
                    .local_data_tree()
                    .map(|tree| TransactionExecutor::new(logger.new(slog::o!("Executor" => "local")), tree));
                let transmitter = spawn_transmitter(context, shard, incarnation, resolved.backend);
                connection.connected(ConnectedBackend {
                    name: resolved.name,
                    version: resolved.version,
                    max_messages: resolved.max_messages,
                    transmitter,
                    local,
                });
            }
            Err(e) => {
                // Everything queued fails with a retryable error. The next request resolves again.
                connection.fail_all(RequestError::Resolution(e));
                self.connections.remove(&shard);
            }
        }
    }

    fn on_delivered(&mut self, shard: ShardKey, incarnation: u64, result: Result<Bytes, TransportError>) {
        let outcome = match self.current_connection(shard, incarnation) {
            Some(connection) => connection.on_response(result),
            None => return,
        };

        match outcome {
            ResponseOutcome::Handled => {
                if self.state == ClientState::Closed {
                    self.close_idle_connections();
                }
            }
            ResponseOutcome::Reconnect => self.reconnect(shard),
        }
    }

    fn reconnect(&mut self, shard: ShardKey) {
        let previous = match self.connections.remove(&shard) {
            Some(previous) => previous,
            None => return,
        };

        let incarnation = self.next_incarnation;
        self.next_incarnation += 1;
        self.connections.insert(shard, previous.reconnect(incarnation));
        spawn_resolution(self.context.clone(), shard, incarnation, self.connect_request());
    }

    // Memoized. A missing connection starts resolving right away, requests queue meanwhile.
    fn get_connection(&mut self, shard: ShardKey) -> Result<&mut Connection, RequestError> {
        if self.context.shard_strategy.shard_name(shard).is_none() {
            return Err(ResolutionError::NoPrimary(format!("{:?}", shard)).into());
        }

        if !self.connections.contains_key(&shard) {
            if self.state == ClientState::Closed {
                return Err(ConnectionError::AlreadyClosed.into());
            }

            let incarnation = self.next_incarnation;
            self.next_incarnation += 1;
            let connect = self.connect_request();
            spawn_resolution(self.context.clone(), shard, incarnation, connect);
            slog::debug!(self.logger, "Resolving {:?}", shard);

            self.connections
                .insert(shard, Connection::connecting(&self.logger, shard, incarnation));
        }

        match self.connections.entry(shard) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(_) => Err(ConnectionError::AlreadyClosed.into()),
        }
    }

    // Events from a replaced incarnation are dropped.
    fn current_connection(&mut self, shard: ShardKey, incarnation: u64) -> Option<&mut Connection> {
        match self.connections.get_mut(&shard) {
            Some(connection) if connection.incarnation() == incarnation => Some(connection),
            _ => {
                slog::debug!(self.logger, "Dropping event for stale {:?} incarnation {}", shard, incarnation);
                None
            }
        }
    }

    fn connect_request(&mut self) -> Envelope {
        let options = &self.context.options;
        // Sent at the oldest version we speak, so that any backend can decode it.
        Envelope::new(
            options.min_version,
            Target::Client(self.context.identifier.clone()),
            self.connect_sequence.next_sequence(),
            Payload::ConnectClientRequest {
                min_version: options.min_version.as_u8(),
                max_version: options.max_version.as_u8(),
            },
        )
    }

    fn close_idle_connections(&mut self) {
        let idle: Vec<ShardKey> = self
            .connections
            .iter()
            .filter(|(_, connection)| connection.pending() == 0)
            .map(|(shard, _)| *shard)
            .collect();
        for shard in idle {
            if let Some(mut connection) = self.connections.remove(&shard) {
                connection.close();
            }
        }
    }

    fn history_record(&mut self, history: Option<&LocalHistoryIdentifier>) -> Result<&mut HistoryRecord, ClientError> {
        let history_id = match history {
            Some(history) if history.client() != &self.context.identifier => {
                return Err(ClientError::IllegalState(format!(
                    "History {:?} belongs to another client",
                    history
                )));
            }
            Some(history) => history.history_id(),
            None => STANDALONE_HISTORY_ID,
        };

        self.histories
            .get_mut(&history_id)
            .ok_or_else(|| ClientError::IllegalState(format!("Unknown local history {}", history_id)))
    }

    fn check_open(&self) -> Result<(), ClientError> {
        match self.state {
            ClientState::Open => Ok(()),
            ClientState::Closed => Err(ClientError::Closed(self.context.identifier.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::options::{ClientOptions, ClientOptionsValidated};
    use crate::client::shard::SingleShardStrategy;
    use crate::connection::{Backend, BackendResolver};
    use crate::data::DataPath;
    use crate::identifiers::{ClientIdentifier, FrontendIdentifier, FrontendType, MemberName};
    use crate::timing::{mocked_clock, ConsensusParams, MockClock, MockClockController};
    use crate::wire::{ABIVersion, DEFAULT_MAX_MESSAGES};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;
    use tokio::time::Duration;

    // Answers the handshake, records every frame, and answers reads with "no data".
    struct RecordingBackend {
        frames: Mutex<Vec<Envelope>>,
    }

    #[async_trait::async_trait]
    impl Backend for RecordingBackend {
        fn name(&self) -> &str {
            "backend-1"
        }

        async fn deliver(&self, frame: Bytes) -> Result<Bytes, TransportError> {
            let request = Envelope::decode(frame).unwrap();
            self.frames.lock().unwrap().push(request.clone());
            let payload = match request.payload() {
                Payload::ConnectClientRequest { .. } => Payload::ConnectClientSuccess {
                    backend: String::from("backend-1"),
                    alternates: vec![],
                    max_messages: DEFAULT_MAX_MESSAGES,
                },
                Payload::ReadTransactionRequest { .. } => Payload::ReadTransactionSuccess { data: None },
                _ => Payload::LocalHistorySuccess,
            };
            Ok(Envelope::new(ABIVersion::V3, request.target().clone(), request.sequence(), payload).encode())
        }
    }

    struct StaticResolver {
        backend: Arc<RecordingBackend>,
        lookups: Mutex<usize>,
    }

    #[async_trait::async_trait]
    impl BackendResolver for StaticResolver {
        async fn find_primary(&self, _shard_name: &str) -> Result<Arc<dyn Backend>, ResolutionError> {
            *self.lookups.lock().unwrap() += 1;
            Ok(self.backend.clone())
        }
    }

    struct Fixture {
        behavior: Option<ClientBehavior<MockClock>>,
        mailbox: mpsc::Receiver<Command>,
        _sender: mpsc::Sender<Command>,
        resolver: Arc<StaticResolver>,
        clock: MockClockController,
    }

    fn client_id() -> ClientIdentifier {
        let frontend = FrontendIdentifier::new(MemberName::new("member-1").unwrap(), FrontendType::new("test").unwrap());
        ClientIdentifier::new(frontend, 0)
    }

    fn fixture() -> Fixture {
        let (sender, mailbox) = mpsc::channel(16);
        let (clock, controller) = mocked_clock();
        let resolver = Arc::new(StaticResolver {
            backend: Arc::new(RecordingBackend {
                frames: Mutex::new(vec![]),
            }),
            lookups: Mutex::new(0),
        });
        let consensus = ConsensusParams::default();
        let options = ClientOptionsValidated::resolve(ClientOptions::default(), &consensus).unwrap();
        let context = ClientContext {
            logger: slog::Logger::root(slog::Discard, slog::o!()),
            identifier: client_id(),
            mailbox: sender.downgrade(),
            clock,
            resolver: resolver.clone(),
            options: Arc::new(options),
            consensus,
            shard_strategy: Arc::new(SingleShardStrategy),
        };

        Fixture {
            behavior: Some(ClientBehavior::new(context)),
            mailbox,
            _sender: sender,
            resolver,
            clock: controller,
        }
    }

    impl Fixture {
        fn handle(&mut self, command: Command) -> bool {
            let behavior = self.behavior.take().unwrap();
            self.behavior = behavior.on_command(command);
            self.behavior.is_some()
        }

        fn call<O: std::fmt::Debug>(
            &mut self,
            command: impl FnOnce(Callback<O, ClientError>) -> Command,
        ) -> Result<O, ClientError> {
            let (tx, mut rx) = oneshot::channel();
            assert!(self.handle(command(Callback(tx))));
            rx.try_recv().unwrap()
        }

        fn request(&mut self, target: Target, sequence: u64, payload: Payload) -> oneshot::Receiver<Result<Payload, RequestError>> {
            let (tx, rx) = oneshot::channel();
            self.handle(Command::Request(
                ClientRequest {
                    shard: ShardKey(0),
                    target,
                    sequence,
                    payload,
                },
                tx,
            ));
            rx
        }

        // Feed the next command a background task posted.
        async fn pump(&mut self) {
            let command = self.mailbox.recv().await.unwrap();
            self.handle(command);
        }

        fn frames(&self) -> Vec<Envelope> {
            self.resolver.backend.frames.lock().unwrap().clone()
        }
    }

    fn read_root() -> Payload {
        Payload::ReadTransactionRequest {
            path: DataPath::root(),
            snapshot_only: false,
        }
    }

    #[tokio::test]
    async fn histories_are_numbered_after_the_standalone_one() {
        let mut fixture = fixture();

        let first = fixture.call(Command::CreateLocalHistory).unwrap();
        let second = fixture.call(Command::CreateLocalHistory).unwrap();

        assert_eq!(first.history_id(), 1);
        assert_eq!(second.history_id(), 2);
        assert_eq!(first.client(), &client_id());

        let transaction = fixture.call(|cb| Command::CreateTransaction(None, cb)).unwrap();
        assert!(transaction.history().is_standalone());
        assert_eq!(transaction.transaction_id(), 0);
        let snapshot = fixture.call(|cb| Command::CreateSnapshot(None, cb)).unwrap();
        assert_eq!(snapshot.transaction_id(), 1);
    }

    #[tokio::test]
    async fn closed_client_rejects_creation() {
        let mut fixture = fixture();
        let history = fixture.call(Command::CreateLocalHistory).unwrap();

        fixture.call(Command::Close).unwrap();
        // Idempotent.
        fixture.call(Command::Close).unwrap();

        let errors = vec![
            fixture.call(Command::CreateLocalHistory).unwrap_err(),
            fixture.call(|cb| Command::CreateTransaction(None, cb)).unwrap_err(),
            fixture.call(|cb| Command::CreateSnapshot(None, cb)).unwrap_err(),
            fixture
                .call(|cb| Command::CreateTransaction(Some(history.clone()), cb))
                .unwrap_err(),
        ];
        for error in errors {
            assert!(error.is_illegal_state(), "{:?}", error);
            assert!(!error.is_retryable());
        }
    }

    #[tokio::test]
    async fn unrecognized_command_keeps_behavior() {
        let mut fixture = fixture();

        assert!(fixture.handle(Command::Unrecognized(Box::new(42u32))));
        assert!(fixture.call(Command::CreateLocalHistory).is_ok());
    }

    #[tokio::test]
    async fn first_request_resolves_and_caches_connection() {
        let mut fixture = fixture();
        let transaction = fixture.call(|cb| Command::CreateTransaction(None, cb)).unwrap();
        let target = Target::Transaction(transaction);

        let mut first = fixture.request(target.clone(), 0, read_root());
        assert!(first.try_recv().is_err());

        // Resolution, then delivery of the queued read.
        fixture.pump().await;
        fixture.pump().await;
        assert_eq!(first.await.unwrap(), Ok(Payload::ReadTransactionSuccess { data: None }));

        let second = fixture.request(target, 1, read_root());
        fixture.pump().await;
        assert_eq!(second.await.unwrap(), Ok(Payload::ReadTransactionSuccess { data: None }));

        assert_eq!(*fixture.resolver.lookups.lock().unwrap(), 1);
        let frames = fixture.frames();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].sequence(), 0);
        assert_eq!(frames[0].version(), ABIVersion::V1);
        assert_eq!(frames[0].target(), &Target::Client(client_id()));
        assert_eq!(
            frames[0].payload(),
            &Payload::ConnectClientRequest {
                min_version: 1,
                max_version: 3
            }
        );
        assert_eq!(frames[1].version(), ABIVersion::V3);
        assert_eq!(frames[2].sequence(), 1);
    }

    #[tokio::test]
    async fn connection_is_memoized_per_shard() {
        let mut fixture = fixture();
        let behavior = fixture.behavior.as_mut().unwrap();

        let first = behavior.get_connection(ShardKey(0)).unwrap() as *const Connection;
        let second = behavior.get_connection(ShardKey(0)).unwrap() as *const Connection;
        assert_eq!(first, second);
        assert_eq!(behavior.connections.len(), 1);

        // One resolution for both lookups.
        fixture.pump().await;
        assert_eq!(*fixture.resolver.lookups.lock().unwrap(), 1);
        let behavior = fixture.behavior.as_mut().unwrap();
        let third = behavior.get_connection(ShardKey(0)).unwrap();
        assert!(third.is_connected());
        assert_eq!(third as *const Connection, first);
    }

    #[tokio::test]
    async fn unanswered_request_times_out_on_the_clock() {
        let mut fixture = fixture();
        let transaction = fixture.call(|cb| Command::CreateTransaction(None, cb)).unwrap();
        let mut queued = fixture.request(Target::Transaction(transaction), 0, read_root());

        // The resolution is posted but never handled, so the read stays queued.
        tokio::task::yield_now().await;
        fixture.clock.advance(Duration::from_secs(2));
        tokio::task::yield_now().await;
        assert!(queued.try_recv().is_err());

        fixture.clock.advance(Duration::from_secs(1));
        assert_eq!(queued.await.unwrap(), Err(RequestError::Timeout));
        assert_eq!(fixture.behavior.as_ref().unwrap().connections[&ShardKey(0)].pending(), 1);
    }

    #[tokio::test]
    async fn halt_fails_queued_requests() {
        let mut fixture = fixture();
        let transaction = fixture.call(|cb| Command::CreateTransaction(None, cb)).unwrap();
        let queued = fixture.request(Target::Transaction(transaction), 0, read_root());

        assert!(!fixture.handle(Command::Halt(String::from("shutting down"))));
        assert_eq!(
            queued.await.unwrap(),
            Err(RequestError::Halted(String::from("shutting down")))
        );
    }

    #[tokio::test]
    async fn stale_resolution_is_ignored() {
        let mut fixture = fixture();
        let transaction = fixture.call(|cb| Command::CreateTransaction(None, cb)).unwrap();
        let mut queued = fixture.request(Target::Transaction(transaction), 0, read_root());

        fixture.handle(Command::Internal(InternalCommand::BackendResolved {
            shard: ShardKey(0),
            incarnation: 7,
            result: Err(ResolutionError::NoPrimary(String::from("default"))),
        }));
        assert!(queued.try_recv().is_err());

        fixture.pump().await;
        fixture.pump().await;
        assert!(queued.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn closing_history_with_open_transaction_fails() {
        let mut fixture = fixture();
        let history = fixture.call(Command::CreateLocalHistory).unwrap();
        let transaction = fixture
            .call(|cb| Command::CreateTransaction(Some(history.clone()), cb))
            .unwrap();

        let error = fixture
            .call(|cb| Command::CloseLocalHistory(history.clone(), cb))
            .unwrap_err();
        assert!(error.is_illegal_state());

        fixture.handle(Command::TransactionStateChanged(transaction, TransactionState::Aborted));
        let (tx, rx) = oneshot::channel();
        fixture.handle(Command::CloseLocalHistory(history.clone(), Callback(tx)));
        // Never touched a shard, nothing to tell the backends.
        assert_eq!(rx.await.unwrap(), Ok(()));

        let error = fixture.call(|cb| Command::CreateTransaction(Some(history), cb)).unwrap_err();
        assert!(error.is_illegal_state());
    }

    #[tokio::test]
    async fn standalone_history_cannot_be_closed() {
        let mut fixture = fixture();
        let standalone = LocalHistoryIdentifier::standalone(client_id());

        let error = fixture.call(|cb| Command::CloseLocalHistory(standalone, cb)).unwrap_err();
        assert!(error.is_illegal_state());
    }
}

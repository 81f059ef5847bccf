use crate::backend::journal::{Journal, JournalIndex};
use crate::connection::TransportError;
use crate::data::DataTree;
use crate::history::{CloseLocalHistoryPayload, TransactionExecutor};
use crate::identifiers::{ClientIdentifier, FormatError, FrontendIdentifier, LocalHistoryIdentifier};
use crate::sequencer::{IngestDecision, ReceiveSequencer, SequenceError};
use crate::wire::{ABIVersion, Envelope, FailureCause, Payload, Target, DEFAULT_MAX_MESSAGES};
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::convert::TryFrom;
use std::io;
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct ShardOptions {
    /// Replies kept per sequence scope for answering retransmits.
    pub retained_results: Option<usize>,
    /// Window of unacknowledged requests advertised to clients.
    pub max_messages: Option<u32>,
    /// Newest ABI version this shard speaks. Lower it to emulate an older backend.
    pub max_version: Option<ABIVersion>,
    /// Expose the data tree, letting co-located clients execute transactions locally.
    pub co_located: Option<bool>,
}

#[derive(Clone, Debug)]
pub(crate) struct ShardOptionsValidated {
    pub retained_results: usize,
    pub max_messages: u32,
    pub max_version: ABIVersion,
    pub co_located: bool,
}

impl ShardOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.retained_results == 0 {
            return Err("Retained results must be greater than zero");
        }
        if self.max_messages == 0 {
            return Err("Max messages must be greater than zero");
        }

        Ok(())
    }
}

impl TryFrom<ShardOptions> for ShardOptionsValidated {
    type Error = &'static str;

    fn try_from(options: ShardOptions) -> Result<Self, Self::Error> {
        let values = ShardOptionsValidated {
            retained_results: options.retained_results.unwrap_or(128),
            max_messages: options.max_messages.unwrap_or(DEFAULT_MAX_MESSAGES),
            max_version: options.max_version.unwrap_or(ABIVersion::CURRENT),
            co_located: options.co_located.unwrap_or(false),
        };

        values.validate()?;
        Ok(values)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShardCreationError {
    #[error("A shard needs at least one replica")]
    NoReplicas,
    #[error("Illegal shard options: {0}")]
    IllegalOptions(String),
    #[error("Illegal consensus timing: {0}")]
    IllegalConsensusOptions(String),
    #[error("Failed to read journal")]
    Recovery(#[from] io::Error),
    #[error("Corrupt journal record at {0:?}: {1}")]
    CorruptRecord(JournalIndex, FormatError),
}

/// Replicated state of one shard, as every replica sees it. Only the leader replica serves
/// requests.
pub(crate) struct ShardState {
    logger: slog::Logger,
    options: ShardOptionsValidated,
    replicas: Vec<String>,
    leader: String,
    executor: TransactionExecutor,
    // Cached replies carry the version they were sent at.
    sequencer: ReceiveSequencer<Target, (ABIVersion, Payload)>,
    generations: BTreeMap<FrontendIdentifier, u64>,
    closed_histories: BTreeSet<LocalHistoryIdentifier>,
    journal: Box<dyn Journal>,
}

impl ShardState {
    /// Rebuild from `journal`. The first replica leads.
    pub(crate) fn recover(
        logger: slog::Logger,
        replicas: Vec<String>,
        tree: Arc<dyn DataTree>,
        journal: Box<dyn Journal>,
        options: ShardOptionsValidated,
        recovery_batch_size: usize,
    ) -> Result<Self, ShardCreationError> {
        let leader = replicas.first().cloned().ok_or(ShardCreationError::NoReplicas)?;

        let mut closed_histories = BTreeSet::new();
        let mut index = JournalIndex::start_index();
        while let Some(record) = journal.read(index)? {
            let payload =
                CloseLocalHistoryPayload::from_bytes(record).map_err(|e| ShardCreationError::CorruptRecord(index, e))?;
            closed_histories.insert(payload.identifier().clone());
            if index.as_u64() % recovery_batch_size as u64 == 0 {
                slog::debug!(logger, "Recovered {:?} journal records", index);
            }
            index = index.plus(1);
        }
        slog::info!(logger, "Recovered {} closed histories", closed_histories.len());

        Ok(ShardState {
            executor: TransactionExecutor::new(logger.new(slog::o!("Executor" => "shard")), tree),
            sequencer: ReceiveSequencer::new(options.retained_results),
            logger,
            options,
            replicas,
            leader,
            generations: BTreeMap::new(),
            closed_histories,
            journal,
        })
    }

    pub(crate) fn options(&self) -> &ShardOptionsValidated {
        &self.options
    }

    pub(crate) fn leader(&self) -> &str {
        &self.leader
    }

    /// Transactions with sequencing state, for inspection.
    pub(crate) fn sequenced_scopes(&self) -> usize {
        self.sequencer.scopes()
    }

    pub(crate) fn closed_histories(&self) -> Vec<LocalHistoryIdentifier> {
        self.closed_histories.iter().cloned().collect()
    }

    /// Returns false if `replica` is not part of this shard.
    pub(crate) fn elect(&mut self, replica: &str) -> bool {
        if !self.replicas.iter().any(|name| name == replica) {
            return false;
        }

        slog::info!(self.logger, "Leadership moves from {} to {}", self.leader, replica);
        self.leader = replica.to_string();
        true
    }

    /// Serve one frame received by `replica`. An undecodable frame can't be answered, the
    /// transport drops it.
    pub(crate) fn handle_frame(&mut self, replica: &str, frame: Bytes) -> Result<Bytes, TransportError> {
        let request = Envelope::decode(frame).map_err(|e| {
            slog::warn!(self.logger, "Dropping malformed frame: {}", e);
            TransportError::Dropped(replica.to_string())
        })?;

        let target = request.target().clone();
        let sequence = request.sequence();
        let (version, payload) = self.handle_request(replica, &request);

        Ok(Envelope::new(version, target, sequence, payload).encode())
    }

    fn handle_request(&mut self, replica: &str, request: &Envelope) -> (ABIVersion, Payload) {
        let version = request.version();
        if replica != self.leader {
            return (version, failure(FailureCause::NotLeader));
        }
        if !request.payload().is_request() {
            return (
                version,
                failure(FailureCause::IllegalState(format!("{:?} is not a request", request.payload().kind()))),
            );
        }

        let is_connect = matches!(request.payload(), Payload::ConnectClientRequest { .. });
        if let Err(cause) = self.check_generation(request.target().client(), is_connect) {
            return (version, failure(cause));
        }

        // Connects and history closes are idempotent, a retry may come with any sequence.
        if is_connect || matches!(request.payload(), Payload::CloseLocalHistoryRequest) {
            return self.apply(replica, request);
        }

        let scope = request.target();
        match self.sequencer.ingest(scope, request.sequence()) {
            Ok(IngestDecision::Apply) => {
                let reply = self.apply(replica, request);
                self.sequencer.record(scope, request.sequence(), reply.clone());
                if let Target::Transaction(transaction) = scope {
                    // Finished transactions don't keep their scope around.
                    if !self.executor.is_active(transaction) {
                        self.sequencer.purge(|candidate| candidate == scope);
                    }
                }
                reply
            }
            Ok(IngestDecision::Duplicate(reply)) => {
                slog::debug!(self.logger, "Answering retransmit of {:?} seq {}", scope, request.sequence());
                reply
            }
            Err(SequenceError::Gap { expected, received }) => {
                slog::warn!(self.logger, "{:?} failed at seq {}, expected {}", scope, received, expected);
                (version, failure(FailureCause::OutOfOrder { expected, received }))
            }
            Err(SequenceError::ScopeFailed { .. }) => {
                let expected = self.sequencer.last_applied(scope).map_or(0, |last| last + 1);
                (
                    version,
                    failure(FailureCause::OutOfOrder {
                        expected,
                        received: request.sequence(),
                    }),
                )
            }
            Err(e @ SequenceError::Expired { .. }) => (version, failure(FailureCause::IllegalState(e.to_string()))),
        }
    }

    // A connect from a newer generation retires every older one of the same frontend.
    fn check_generation(&mut self, client: &ClientIdentifier, is_connect: bool) -> Result<(), FailureCause> {
        let frontend = client.frontend();
        let generation = client.generation();
        match self.generations.get(frontend).copied() {
            Some(latest) if generation < latest => Err(FailureCause::RetiredGeneration),
            Some(latest) if generation == latest => Ok(()),
            _ if is_connect => {
                self.retire_older(frontend, generation);
                self.generations.insert(frontend.clone(), generation);
                Ok(())
            }
            _ => Err(FailureCause::IllegalState(format!("{:?} has not connected", client))),
        }
    }

    fn retire_older(&mut self, frontend: &FrontendIdentifier, generation: u64) {
        let retired = |client: &ClientIdentifier| client.frontend() == frontend && client.generation() < generation;
        self.sequencer.purge(|scope| retired(scope.client()));
        self.executor.retain(|transaction| !retired(transaction.client()));
        slog::info!(self.logger, "{:?} is now at generation {}", frontend, generation);
    }

    fn apply(&mut self, replica: &str, request: &Envelope) -> (ABIVersion, Payload) {
        let version = request.version();
        let payload = match (request.target(), request.payload()) {
            (Target::Client(_), Payload::ConnectClientRequest { min_version, max_version }) => {
                return self.connect(replica, version, *min_version, *max_version);
            }
            (Target::History(history), Payload::CloseLocalHistoryRequest) => self.close_history(history),
            (Target::Transaction(transaction), payload) if TransactionExecutor::handles(payload) => {
                if self.closed_histories.contains(transaction.history()) {
                    failure(FailureCause::ClosedHistory)
                } else {
                    self.executor.execute(transaction, payload)
                }
            }
            (target, payload) => failure(FailureCause::IllegalState(format!(
                "{:?} can't be addressed to {:?}",
                payload.kind(),
                target
            ))),
        };

        (version, payload)
    }

    fn connect(&mut self, replica: &str, version: ABIVersion, min: u8, max: u8) -> (ABIVersion, Payload) {
        match ABIVersion::negotiate(min, max.min(self.options.max_version.as_u8())) {
            Some(negotiated) => {
                slog::debug!(self.logger, "Negotiated {:?} with client", negotiated);
                let success = Payload::ConnectClientSuccess {
                    backend: replica.to_string(),
                    alternates: self.replicas.iter().filter(|name| *name != replica).cloned().collect(),
                    max_messages: self.options.max_messages,
                };
                (negotiated, success)
            }
            None => (
                version,
                failure(FailureCause::IllegalState(format!(
                    "No common ABI version in {}..={}",
                    min, max
                ))),
            ),
        }
    }

    // Idempotent. The close is journaled before it is acknowledged.
    fn close_history(&mut self, history: &LocalHistoryIdentifier) -> Payload {
        if self.closed_histories.contains(history) {
            return Payload::LocalHistorySuccess;
        }

        let record = match CloseLocalHistoryPayload::create(&self.logger, history.clone(), 64) {
            Ok(record) => record,
            Err(e) => return failure(FailureCause::IllegalState(e.to_string())),
        };
        match self.journal.append(record.serialized().clone()) {
            Ok(index) => {
                slog::debug!(self.logger, "Journaled close of {:?} at {:?}", history, index);
                self.executor.abort_history(history);
                self.sequencer
                    .purge(|scope| matches!(scope, Target::Transaction(transaction) if transaction.history() == history));
                self.closed_histories.insert(history.clone());
                Payload::LocalHistorySuccess
            }
            Err(e) => {
                slog::error!(self.logger, "Failed to journal close of {:?}: {}", history, e);
                failure(FailureCause::Operation(e.to_string()))
            }
        }
    }
}

fn failure(cause: FailureCause) -> Payload {
    Payload::RequestFailure { cause }
}

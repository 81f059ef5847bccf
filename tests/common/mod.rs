#![allow(dead_code)]

use bytes::Bytes;
use cds_access::{
    Backend, ClientConfig, ClientHandle, ClientOptions, ConsensusOptions, DataModification, DataPath, DataTree,
    DelegateError, Envelope, InMemoryDataTree, InMemoryJournal, NormalizedNode, ShardConfig, ShardHandle,
    ShardOptions, StaticResolver, TransportError, DEFAULT_SHARD_NAME,
};
use chrono::Utc;
use slog::Drain;
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};

pub fn path(segments: &[&str]) -> DataPath {
    DataPath::new(segments.iter().copied()).unwrap()
}

pub fn node(data: &'static str) -> NormalizedNode {
    NormalizedNode::new(data)
}

pub fn read_committed(shard: &ShardHandle, at: &DataPath) -> Option<NormalizedNode> {
    shard.tree().new_modification().read(at).unwrap()
}

pub fn spawn_test_shard(
    journal: InMemoryJournal,
    data_tree: Option<Arc<dyn DataTree>>,
    options: ShardOptions,
) -> ShardHandle {
    cds_access::spawn_shard(ShardConfig {
        shard_name: String::from(DEFAULT_SHARD_NAME),
        replicas: vec![String::from("replica-1"), String::from("replica-2")],
        info_logger: create_root_logger_for_stdout(String::from("shard")),
        journal: Box::new(journal),
        data_tree,
        options,
        consensus: ConsensusOptions::default(),
    })
    .unwrap()
}

pub async fn create_client(resolver: &StaticResolver, generation: u64) -> ClientHandle {
    cds_access::try_create_client(ClientConfig {
        member_name: String::from("member-1"),
        frontend_type: String::from("config-datastore"),
        generation,
        info_logger: create_root_logger_for_stdout(format!("client-{}", generation)),
        resolver: Arc::new(resolver.clone()),
        options: ClientOptions::default(),
        consensus: ConsensusOptions::default(),
        shard_strategy: None,
    })
    .await
    .unwrap()
}

/// Points the default shard at `replica`, recording every request it receives into `requests`.
pub fn route_to(resolver: &StaticResolver, shard: &ShardHandle, replica: &str, requests: &RecordedRequests) {
    let backend = RecordingBackend {
        inner: shard.replica(replica).unwrap(),
        requests: requests.clone(),
    };
    resolver.set_primary(DEFAULT_SHARD_NAME, Arc::new(backend));
}

#[derive(Clone, Default)]
pub struct RecordedRequests(Arc<Mutex<Vec<Envelope>>>);

impl RecordedRequests {
    pub fn all(&self) -> Vec<Envelope> {
        self.0.lock().unwrap().clone()
    }

    pub fn connects(&self) -> Vec<Envelope> {
        self.all()
            .into_iter()
            .filter(|request| matches!(request.payload(), cds_access::Payload::ConnectClientRequest { .. }))
            .collect()
    }
}

struct RecordingBackend {
    inner: Arc<dyn Backend>,
    requests: RecordedRequests,
}

#[async_trait::async_trait]
impl Backend for RecordingBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn deliver(&self, frame: Bytes) -> Result<Bytes, TransportError> {
        if let Ok(request) = Envelope::decode(frame.clone()) {
            self.requests.0.lock().unwrap().push(request);
        }
        self.inner.deliver(frame).await
    }

    fn local_data_tree(&self) -> Option<Arc<dyn DataTree>> {
        self.inner.local_data_tree()
    }
}

/// Fails writes and merges below `/forbidden`, and records every modification it sees.
#[derive(Debug, Default)]
pub struct FailingTree {
    inner: InMemoryDataTree,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl DataTree for FailingTree {
    fn new_modification(&self) -> Box<dyn DataModification> {
        Box::new(FailingModification {
            inner: self.inner.new_modification(),
            calls: self.calls.clone(),
        })
    }
}

struct FailingModification {
    inner: Box<dyn DataModification>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FailingModification {
    fn record(&self, operation: &str, at: &DataPath) -> Result<(), DelegateError> {
        self.calls.lock().unwrap().push(format!("{} {:?}", operation, at));
        if at.segments().first().map(String::as_str) == Some("forbidden") {
            return Err(DelegateError::Failed(format!("{:?} is forbidden", at)));
        }
        Ok(())
    }
}

impl DataModification for FailingModification {
    fn read(&self, at: &DataPath) -> Result<Option<NormalizedNode>, DelegateError> {
        self.inner.read(at)
    }

    fn write(&mut self, at: &DataPath, data: NormalizedNode) -> Result<(), DelegateError> {
        self.record("write", at)?;
        self.inner.write(at, data)
    }

    fn merge(&mut self, at: &DataPath, data: NormalizedNode) -> Result<(), DelegateError> {
        self.record("merge", at)?;
        self.inner.merge(at, data)
    }

    fn delete(&mut self, at: &DataPath) -> Result<(), DelegateError> {
        self.record("delete", at)?;
        self.inner.delete(at)
    }

    fn commit(self: Box<Self>) -> Result<(), DelegateError> {
        self.inner.commit()
    }
}

pub fn create_root_logger_for_file(directory_prefix: String, name: String) -> slog::Logger {
    let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    let log_path = format!("{}/info_log_{}/{}_info.log", directory_prefix, name, now);
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_path)
        .unwrap();

    let decorator = slog_term::PlainDecorator::new(file);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!())
}

pub fn create_root_logger_for_stdout(name: String) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("Name" => name))
}

use crate::actor::{ClientActor, ClientHandle};
use crate::client::behavior::ClientBehavior;
use crate::client::context::ClientContext;
use crate::client::options::{ClientOptions, ClientOptionsValidated};
use crate::client::shard::{ShardStrategy, SingleShardStrategy};
use crate::connection::BackendResolver;
use crate::identifiers::{ClientIdentifier, FrontendIdentifier, FrontendType, MemberName, NameError};
use crate::timing::{Clock, ConsensusOptions, ConsensusParams, RealClock};
use std::convert::TryFrom;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct ClientConfig {
    pub member_name: String,
    pub frontend_type: String,
    // Bumped by the caller on every restart, so backends can retire the previous incarnation.
    pub generation: u64,
    pub info_logger: slog::Logger,
    pub resolver: Arc<dyn BackendResolver>,
    pub options: ClientOptions,
    pub consensus: ConsensusOptions,
    // Defaults to a single shard holding everything.
    pub shard_strategy: Option<Arc<dyn ShardStrategy>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientCreationError {
    #[error("Invalid client name")]
    InvalidName(#[from] NameError),
    #[error("Illegal options for configuring client: {0}")]
    IllegalClientOptions(String),
    #[error("Illegal consensus timing: {0}")]
    IllegalConsensusOptions(String),
}

pub async fn try_create_client(config: ClientConfig) -> Result<ClientHandle, ClientCreationError> {
    create_client(config, RealClock)
}

pub(crate) fn create_client<C: Clock>(config: ClientConfig, clock: C) -> Result<ClientHandle, ClientCreationError> {
    let frontend = FrontendIdentifier::new(
        MemberName::new(&config.member_name)?,
        FrontendType::new(&config.frontend_type)?,
    );
    let identifier = ClientIdentifier::new(frontend, config.generation);

    let consensus = ConsensusParams::try_from(config.consensus)
        .map_err(|e| ClientCreationError::IllegalConsensusOptions(e.to_string()))?;
    let options = ClientOptionsValidated::resolve(config.options, &consensus)
        .map_err(|e| ClientCreationError::IllegalClientOptions(e.to_string()))?;

    let logger = config
        .info_logger
        .new(slog::o!("Client" => format!("{:?}", identifier)));
    let shard_strategy = config
        .shard_strategy
        .unwrap_or_else(|| Arc::new(SingleShardStrategy) as Arc<dyn ShardStrategy>);

    let (sender, receiver) = mpsc::channel(options.mailbox_size);
    let context = ClientContext {
        logger: logger.clone(),
        identifier: identifier.clone(),
        mailbox: sender.downgrade(),
        clock,
        resolver: config.resolver,
        options: Arc::new(options),
        consensus,
        shard_strategy: shard_strategy.clone(),
    };
    let client_actor = ClientActor::new(receiver, ClientBehavior::new(context));
    tokio::spawn(client_actor.run_event_loop());
    slog::info!(logger, "Client started");

    Ok(ClientHandle::new(identifier, sender, shard_strategy))
}

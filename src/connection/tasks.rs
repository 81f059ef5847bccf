use crate::actor::InternalCommand;
use crate::client::ClientContext;
use crate::connection::backend::{Backend, ResolutionError, ShardKey};
use crate::timing::Clock;
use crate::wire::{ABIVersion, Envelope, FailureCause, Payload};
use bytes::Bytes;
use std::convert::TryFrom;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Outcome of a successful connect handshake.
pub(crate) struct ResolvedBackend {
    pub backend: Arc<dyn Backend>,
    pub name: String,
    pub version: ABIVersion,
    pub max_messages: u32,
}

/// Locate the shard's leader and shake hands with it, in the background. The outcome is posted
/// back to the actor tagged with `incarnation`, so a late answer for a replaced connection is
/// recognizable.
pub(crate) fn spawn_resolution<C: Clock>(context: ClientContext<C>, shard: ShardKey, incarnation: u64, connect: Envelope) {
    let task = ResolutionTask {
        logger: context
            .logger
            .new(slog::o!("Shard" => format!("{:?}", shard), "Incarnation" => incarnation)),
        clock: context.clock.clone(),
        context,
        shard,
        incarnation,
        connect,
    };
    tokio::task::spawn(task.run());
}

/// Deliver frames one at a time, in the order the connection queued them. Runs until the
/// connection drops its sender.
pub(crate) fn spawn_transmitter<C: Clock>(
    context: ClientContext<C>,
    shard: ShardKey,
    incarnation: u64,
    backend: Arc<dyn Backend>,
) -> mpsc::UnboundedSender<Bytes> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
    tokio::task::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let result = backend.deliver(frame).await;
            let failed = result.is_err();
            if !context
                .execute_in_actor(InternalCommand::Delivered {
                    shard,
                    incarnation,
                    result,
                })
                .await
            {
                return;
            }
            // The actor reconnects on failure, anything still queued here belongs to a dead
            // incarnation.
            if failed {
                return;
            }
        }
    });

    tx
}

struct ResolutionTask<C: Clock> {
    logger: slog::Logger,
    clock: C,
    context: ClientContext<C>,
    shard: ShardKey,
    incarnation: u64,
    connect: Envelope,
}

impl<C: Clock> ResolutionTask<C> {
    async fn run(mut self) {
        let timeout = self.context.options.resolution_timeout;
        let mut clock = self.clock.clone();
        let result = match clock.within(timeout, self.resolve()).await {
            Some(result) => result,
            None => Err(ResolutionError::Timeout(format!("{:?}", self.shard))),
        };

        if let Err(e) = &result {
            slog::warn!(self.logger, "Failed to resolve backend: {}", e);
        }

        let _ = self
            .context
            .execute_in_actor(InternalCommand::BackendResolved {
                shard: self.shard,
                incarnation: self.incarnation,
                result,
            })
            .await;
    }

    async fn resolve(&mut self) -> Result<ResolvedBackend, ResolutionError> {
        let shard_name = self
            .context
            .shard_strategy
            .shard_name(self.shard)
            .ok_or_else(|| ResolutionError::NoPrimary(format!("{:?}", self.shard)))?;

        loop {
            let backend = self.context.resolver.find_primary(&shard_name).await?;
            slog::debug!(self.logger, "Found primary {} for {}", backend.name(), shard_name);

            let response = Envelope::decode(backend.deliver(self.connect.encode()).await?)?;
            match self.accept(response)? {
                Some((name, version, max_messages)) => {
                    return Ok(ResolvedBackend {
                        backend,
                        name,
                        version,
                        max_messages,
                    });
                }
                None => {
                    // Leadership is moving. Give the election a heartbeat to settle.
                    slog::debug!(self.logger, "{} is not the leader, retrying", backend.name());
                    let backoff = self.context.consensus.heartbeat_interval();
                    self.clock.sleep(backoff).await;
                }
            }
        }
    }

    // `None` means ask the resolver again.
    fn accept(&self, response: Envelope) -> Result<Option<(String, ABIVersion, u32)>, ResolutionError> {
        if response.target() != self.connect.target() || response.sequence() != self.connect.sequence() {
            return Err(ResolutionError::Refused(FailureCause::IllegalState(format!(
                "handshake answered for {:?} seq {}",
                response.target(),
                response.sequence()
            ))));
        }

        let version = response.version();
        match response.into_payload() {
            Payload::ConnectClientSuccess {
                backend, max_messages, ..
            } => {
                let (min, max) = match self.connect.payload() {
                    Payload::ConnectClientRequest { min_version, max_version } => (*min_version, *max_version),
                    _ => (ABIVersion::OLDEST.as_u8(), ABIVersion::CURRENT.as_u8()),
                };
                let raw = version.as_u8();
                if raw < min || raw > max {
                    return Err(ResolutionError::IncompatibleVersion);
                }
                let version = ABIVersion::try_from(raw).map_err(|_| ResolutionError::IncompatibleVersion)?;
                Ok(Some((backend, version, max_messages)))
            }
            Payload::RequestFailure {
                cause: FailureCause::NotLeader,
            } => Ok(None),
            Payload::RequestFailure { cause } => Err(ResolutionError::Refused(cause)),
            other => Err(ResolutionError::Refused(FailureCause::IllegalState(format!(
                "unexpected handshake response {:?}",
                other.kind()
            )))),
        }
    }
}

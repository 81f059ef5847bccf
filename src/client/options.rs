use crate::timing::ConsensusParams;
use crate::wire::ABIVersion;
use tokio::time::Duration;

#[derive(Clone, Debug, Default)]
pub struct ClientOptions {
    /// Bound on locating a shard's leader and completing the connect handshake.
    pub resolution_timeout: Option<Duration>,
    /// Bound on any single request, commit phases included.
    pub request_timeout: Option<Duration>,
    pub mailbox_size: Option<usize>,
    pub min_version: Option<ABIVersion>,
    pub max_version: Option<ABIVersion>,
}

#[derive(Clone, Debug)]
pub(crate) struct ClientOptionsValidated {
    pub resolution_timeout: Duration,
    pub request_timeout: Duration,
    pub mailbox_size: usize,
    pub min_version: ABIVersion,
    pub max_version: ABIVersion,
}

impl ClientOptionsValidated {
    /// Timeouts default to multiples of how long the backend may take to elect a new leader.
    pub(crate) fn resolve(options: ClientOptions, consensus: &ConsensusParams) -> Result<Self, &'static str> {
        let failover = consensus.max_failover_detection();
        let values = ClientOptionsValidated {
            resolution_timeout: options.resolution_timeout.unwrap_or(failover * 2),
            request_timeout: options.request_timeout.unwrap_or(failover * 10),
            mailbox_size: options.mailbox_size.unwrap_or(64),
            min_version: options.min_version.unwrap_or(ABIVersion::OLDEST),
            max_version: options.max_version.unwrap_or(ABIVersion::CURRENT),
        };

        values.validate(consensus)?;
        Ok(values)
    }

    fn validate(&self, consensus: &ConsensusParams) -> Result<(), &'static str> {
        if self.resolution_timeout <= consensus.heartbeat_interval() {
            return Err("Resolution timeout must be greater than the backend's heartbeat interval");
        }
        if self.request_timeout < self.resolution_timeout {
            return Err("Request timeout must not be less than the resolution timeout");
        }
        if self.mailbox_size == 0 {
            return Err("Mailbox size must be greater than zero");
        }
        if self.min_version > self.max_version {
            return Err("Minimum ABI version must not exceed maximum ABI version");
        }

        Ok(())
    }
}

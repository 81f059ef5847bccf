use rand::Rng;
use std::convert::TryFrom;
use std::ops::Range;
use tokio::time::Duration;

/// Timing and batching of the replicated backend. Unset fields take defaults. The election
/// timeout is always derived from the heartbeat interval, so the two can only change together.
#[derive(Clone, Debug, Default)]
pub struct ConsensusOptions {
    pub heartbeat_interval: Option<Duration>,
    pub election_timeout_factor: Option<u32>,
    pub election_time_max_variance: Option<Duration>,
    pub snapshot_batch_count: Option<u64>,
    pub snapshot_chunk_size: Option<usize>,
    pub journal_recovery_batch_size: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsensusParams {
    heartbeat_interval: Duration,
    election_timeout_factor: u32,
    election_time_max_variance: Duration,
    snapshot_batch_count: u64,
    snapshot_chunk_size: usize,
    journal_recovery_batch_size: usize,
}

const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(100);
const ELECTION_TIMEOUT_FACTOR: u32 = 2;
const ELECTION_TIME_MAX_VARIANCE: Duration = Duration::from_millis(100);
const SNAPSHOT_BATCH_COUNT: u64 = 20000;
// 2MB
const SNAPSHOT_CHUNK_SIZE: usize = 2048 * 1000;
const JOURNAL_RECOVERY_BATCH_SIZE: usize = 1000;

impl ConsensusParams {
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    pub fn election_timeout(&self) -> Duration {
        self.heartbeat_interval * self.election_timeout_factor
    }

    pub fn election_time_max_variance(&self) -> Duration {
        self.election_time_max_variance
    }

    /// `[election_timeout, election_timeout + variance)`
    pub fn election_timeout_range(&self) -> Range<Duration> {
        let base = self.election_timeout();
        base..base + self.election_time_max_variance
    }

    /// A randomized election timeout, so members don't all start elections together.
    pub fn random_election_timeout(&self) -> Duration {
        let range = self.election_timeout_range();
        if range.start == range.end {
            return range.start;
        }
        rand::thread_rng().gen_range(range)
    }

    /// Upper bound on how long backend failure can go unnoticed before a new leader is elected.
    pub fn max_failover_detection(&self) -> Duration {
        self.election_timeout_range().end
    }

    pub fn snapshot_batch_count(&self) -> u64 {
        self.snapshot_batch_count
    }

    pub fn snapshot_chunk_size(&self) -> usize {
        self.snapshot_chunk_size
    }

    pub fn journal_recovery_batch_size(&self) -> usize {
        self.journal_recovery_batch_size
    }

    fn validate(&self) -> Result<(), &'static str> {
        if self.heartbeat_interval == Duration::from_millis(0) {
            return Err("Heartbeat interval must be greater than zero");
        }
        if self.election_timeout_factor < 2 {
            return Err("Election timeout must be at least twice the heartbeat interval");
        }
        if self.election_time_max_variance >= self.election_timeout() {
            return Err("Election time variance must be less than the election timeout");
        }
        if self.snapshot_batch_count == 0 {
            return Err("Snapshot batch count must be greater than zero");
        }
        if self.snapshot_chunk_size == 0 {
            return Err("Snapshot chunk size must be greater than zero");
        }
        if self.journal_recovery_batch_size == 0 {
            return Err("Journal recovery batch size must be greater than zero");
        }

        Ok(())
    }
}

impl Default for ConsensusParams {
    fn default() -> Self {
        ConsensusParams {
            heartbeat_interval: HEARTBEAT_INTERVAL,
            election_timeout_factor: ELECTION_TIMEOUT_FACTOR,
            election_time_max_variance: ELECTION_TIME_MAX_VARIANCE,
            snapshot_batch_count: SNAPSHOT_BATCH_COUNT,
            snapshot_chunk_size: SNAPSHOT_CHUNK_SIZE,
            journal_recovery_batch_size: JOURNAL_RECOVERY_BATCH_SIZE,
        }
    }
}

impl TryFrom<ConsensusOptions> for ConsensusParams {
    type Error = &'static str;

    fn try_from(options: ConsensusOptions) -> Result<Self, Self::Error> {
        let values = ConsensusParams {
            heartbeat_interval: options.heartbeat_interval.unwrap_or(HEARTBEAT_INTERVAL),
            election_timeout_factor: options.election_timeout_factor.unwrap_or(ELECTION_TIMEOUT_FACTOR),
            election_time_max_variance: options
                .election_time_max_variance
                .unwrap_or(ELECTION_TIME_MAX_VARIANCE),
            snapshot_batch_count: options.snapshot_batch_count.unwrap_or(SNAPSHOT_BATCH_COUNT),
            snapshot_chunk_size: options.snapshot_chunk_size.unwrap_or(SNAPSHOT_CHUNK_SIZE),
            journal_recovery_batch_size: options
                .journal_recovery_batch_size
                .unwrap_or(JOURNAL_RECOVERY_BATCH_SIZE),
        };

        values.validate()?;
        Ok(values)
    }
}

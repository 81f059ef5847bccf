mod clock;
mod consensus;

pub use consensus::ConsensusOptions;
pub use consensus::ConsensusParams;

pub(crate) use clock::{Clock, RealClock};

#[cfg(test)]
pub(crate) use clock::mocked_clock;
#[cfg(test)]
pub(crate) use clock::{MockClock, MockClockController};

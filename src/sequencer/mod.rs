mod issuer;
mod receiver;

pub use issuer::SequenceIssuer;
pub use receiver::IngestDecision;
pub use receiver::ReceiveSequencer;
pub use receiver::SequenceError;

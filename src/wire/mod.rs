mod envelope;
mod payload;
mod proxy;
mod version;

pub use envelope::Envelope;
pub use payload::FailureCause;
pub use payload::Modification;
pub use payload::Payload;
pub use payload::PayloadKind;
pub use payload::PersistenceProtocol;
pub use payload::Target;
pub use payload::DEFAULT_MAX_MESSAGES;
pub use version::ABIVersion;

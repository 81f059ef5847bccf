mod backend;
mod connection;
mod request;
mod tasks;

pub use backend::Backend;
pub use backend::BackendResolver;
pub use backend::ConnectionError;
pub use backend::ResolutionError;
pub use backend::ShardKey;
pub use backend::TransportError;
pub use connection::Connection;
pub use request::RequestError;

pub(crate) use connection::{ConnectedBackend, ResponseOutcome};
pub(crate) use request::ResponseCallback;
pub(crate) use tasks::{spawn_resolution, spawn_transmitter, ResolvedBackend};

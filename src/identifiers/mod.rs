mod codec;
mod hierarchy;
mod names;

pub use codec::FormatError;
pub use codec::WireFormat;
pub use hierarchy::ClientIdentifier;
pub use hierarchy::LocalHistoryIdentifier;
pub use hierarchy::TransactionIdentifier;
pub use hierarchy::STANDALONE_HISTORY_ID;
pub use names::FrontendIdentifier;
pub use names::FrontendType;
pub use names::MemberName;
pub use names::NameError;

pub(crate) use codec::{get_bool, get_bytes, get_str, get_u16, get_u32, get_u64, get_u8, put_bytes, put_str};

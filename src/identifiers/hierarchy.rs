use crate::identifiers::codec::{get_u64, FormatError, WireFormat};
use crate::identifiers::names::FrontendIdentifier;
use bytes::{Buf, BufMut};
use std::fmt;

/// History ID of a client's implicit history, used by free-standing transactions and snapshots.
pub const STANDALONE_HISTORY_ID: u64 = 0;

/// One incarnation of a frontend. A restarted frontend bumps `generation`, which retires every
/// piece of state backends still hold for the older generation.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientIdentifier {
    frontend: FrontendIdentifier,
    generation: u64,
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalHistoryIdentifier {
    client: ClientIdentifier,
    history_id: u64,
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionIdentifier {
    history: LocalHistoryIdentifier,
    transaction_id: u64,
}

impl ClientIdentifier {
    pub fn new(frontend: FrontendIdentifier, generation: u64) -> Self {
        ClientIdentifier { frontend, generation }
    }

    pub fn frontend(&self) -> &FrontendIdentifier {
        &self.frontend
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl LocalHistoryIdentifier {
    pub fn new(client: ClientIdentifier, history_id: u64) -> Self {
        LocalHistoryIdentifier { client, history_id }
    }

    pub fn standalone(client: ClientIdentifier) -> Self {
        LocalHistoryIdentifier::new(client, STANDALONE_HISTORY_ID)
    }

    pub fn client(&self) -> &ClientIdentifier {
        &self.client
    }

    pub fn history_id(&self) -> u64 {
        self.history_id
    }

    pub fn is_standalone(&self) -> bool {
        self.history_id == STANDALONE_HISTORY_ID
    }
}

impl TransactionIdentifier {
    pub fn new(history: LocalHistoryIdentifier, transaction_id: u64) -> Self {
        TransactionIdentifier { history, transaction_id }
    }

    pub fn history(&self) -> &LocalHistoryIdentifier {
        &self.history
    }

    pub fn client(&self) -> &ClientIdentifier {
        self.history.client()
    }

    pub fn transaction_id(&self) -> u64 {
        self.transaction_id
    }
}

impl WireFormat for ClientIdentifier {
    fn write_to<B: BufMut>(&self, buf: &mut B) {
        self.frontend.write_to(buf);
        buf.put_u64(self.generation);
    }

    fn read_from<B: Buf>(buf: &mut B) -> Result<Self, FormatError> {
        let frontend = FrontendIdentifier::read_from(buf)?;
        let generation = get_u64(buf, "generation")?;
        Ok(ClientIdentifier { frontend, generation })
    }
}

impl WireFormat for LocalHistoryIdentifier {
    fn write_to<B: BufMut>(&self, buf: &mut B) {
        self.client.write_to(buf);
        buf.put_u64(self.history_id);
    }

    fn read_from<B: Buf>(buf: &mut B) -> Result<Self, FormatError> {
        let client = ClientIdentifier::read_from(buf)?;
        let history_id = get_u64(buf, "history id")?;
        Ok(LocalHistoryIdentifier { client, history_id })
    }
}

impl WireFormat for TransactionIdentifier {
    fn write_to<B: BufMut>(&self, buf: &mut B) {
        self.history.write_to(buf);
        buf.put_u64(self.transaction_id);
    }

    fn read_from<B: Buf>(buf: &mut B) -> Result<Self, FormatError> {
        let history = LocalHistoryIdentifier::read_from(buf)?;
        let transaction_id = get_u64(buf, "transaction id")?;
        Ok(TransactionIdentifier { history, transaction_id })
    }
}

impl fmt::Debug for ClientIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}-fe-{}", self.frontend, self.generation)
    }
}

impl fmt::Debug for LocalHistoryIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}-chr-{}", self.client, self.history_id)
    }
}

impl fmt::Debug for TransactionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}-txn-{}", self.history, self.transaction_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::{FrontendType, MemberName};
    use bytes::BytesMut;

    fn client(member: &str, generation: u64) -> ClientIdentifier {
        let frontend = FrontendIdentifier::new(
            MemberName::new(member).unwrap(),
            FrontendType::new("config").unwrap(),
        );
        ClientIdentifier::new(frontend, generation)
    }

    fn tx(member: &str, generation: u64, history: u64, id: u64) -> TransactionIdentifier {
        TransactionIdentifier::new(LocalHistoryIdentifier::new(client(member, generation), history), id)
    }

    #[test]
    fn transaction_identifier_round_trip() {
        let expected = tx("member-1", 3, 7, 42);
        let mut buf = BytesMut::new();
        expected.write_to(&mut buf);

        let mut frozen = buf.freeze();
        let actual = TransactionIdentifier::read_from(&mut frozen).unwrap();
        assert_eq!(actual, expected);
        assert!(!frozen.has_remaining());
    }

    #[test]
    fn ordering_follows_component_chain() {
        assert!(tx("member-1", 9, 9, 9) < tx("member-2", 0, 0, 0));
        assert!(tx("member-1", 1, 9, 9) < tx("member-1", 2, 0, 0));
        assert!(tx("member-1", 1, 1, 9) < tx("member-1", 1, 2, 0));
        assert!(tx("member-1", 1, 1, 1) < tx("member-1", 1, 1, 2));
    }

    #[test]
    fn truncated_history_is_rejected() {
        let mut buf = BytesMut::new();
        LocalHistoryIdentifier::new(client("member-1", 0), 5).write_to(&mut buf);
        let mut truncated = buf.freeze().slice(..10);

        assert!(LocalHistoryIdentifier::read_from(&mut truncated).is_err());
    }

    #[test]
    fn standalone_history() {
        let history = LocalHistoryIdentifier::standalone(client("member-1", 0));
        assert!(history.is_standalone());
        assert_eq!(format!("{:?}", history), "member-1-frontend-config-fe-0-chr-0");
    }
}

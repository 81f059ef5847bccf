use crate::identifiers::{get_u64, get_u8, FormatError, WireFormat};
use crate::identifiers::{ClientIdentifier, LocalHistoryIdentifier, TransactionIdentifier};
use crate::wire::payload::{Payload, PayloadKind, Target, TargetKind};
use crate::wire::proxy;
use crate::wire::version::ABIVersion;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::convert::TryFrom;

/// Byte representation:
///
/// ```text
/// +-----+------+--------+-------------------+------------------+-----------------------...-+
/// | Vrs | Kind | [Tag]  | Target (variable) | Sequence (8 B)   | Body (per version)    ... |
/// +-----+------+--------+-------------------+------------------+-----------------------...-+
/// ```
///
/// * `Vrs` - ABI version selecting the body's serialization proxy
/// * `Kind` - payload kind, which also fixes the target's identifier type
/// * `Tag` - target identifier type, present only for kinds that may address any scope
///   (`RequestFailure`)
/// * `Target` - identifier encoding, independent of `Vrs`
/// * `Sequence` - per-target sequence number
/// * `Body` - kind specific fields, as laid out by the version's proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    version: ABIVersion,
    target: Target,
    sequence: u64,
    payload: Payload,
}

impl Envelope {
    pub fn new(version: ABIVersion, target: Target, sequence: u64, payload: Payload) -> Self {
        Envelope {
            version,
            target,
            sequence,
            payload,
        }
    }

    pub fn version(&self) -> ABIVersion {
        self.version
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// Same message re-targeted at another ABI version, e.g. for replay over a connection that
    /// negotiated a different version.
    pub fn with_version(&self, version: ABIVersion) -> Self {
        Envelope {
            version,
            ..self.clone()
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(128);
        buf.put_u8(self.version.as_u8());
        buf.put_u8(self.payload.kind() as u8);
        if self.payload.kind().target_kind().is_none() {
            buf.put_u8(target_tag(self.target.kind()));
        }
        match &self.target {
            Target::Client(id) => id.write_to(&mut buf),
            Target::History(id) => id.write_to(&mut buf),
            Target::Transaction(id) => id.write_to(&mut buf),
        }
        buf.put_u64(self.sequence);
        proxy::proxy_for(self.version).encode(&self.payload, &mut buf);

        buf.freeze()
    }

    pub fn decode(mut frame: Bytes) -> Result<Self, FormatError> {
        let version = ABIVersion::try_from(get_u8(&mut frame, "version")?)?;
        let kind = PayloadKind::from_u8(get_u8(&mut frame, "kind")?)?;
        let target_kind = match kind.target_kind() {
            Some(fixed) => fixed,
            None => target_kind_from_tag(get_u8(&mut frame, "target tag")?)?,
        };
        let target = match target_kind {
            TargetKind::Client => Target::Client(ClientIdentifier::read_from(&mut frame)?),
            TargetKind::History => Target::History(LocalHistoryIdentifier::read_from(&mut frame)?),
            TargetKind::Transaction => Target::Transaction(TransactionIdentifier::read_from(&mut frame)?),
        };
        let sequence = get_u64(&mut frame, "sequence")?;
        let payload = proxy::proxy_for(version).decode(kind, &mut frame)?;

        if frame.has_remaining() {
            return Err(FormatError::TrailingBytes(frame.remaining()));
        }

        Ok(Envelope {
            version,
            target,
            sequence,
            payload,
        })
    }
}

fn target_tag(kind: TargetKind) -> u8 {
    match kind {
        TargetKind::Client => 1,
        TargetKind::History => 2,
        TargetKind::Transaction => 3,
    }
}

fn target_kind_from_tag(tag: u8) -> Result<TargetKind, FormatError> {
    match tag {
        1 => Ok(TargetKind::Client),
        2 => Ok(TargetKind::History),
        3 => Ok(TargetKind::Transaction),
        other => Err(FormatError::Invalid {
            field: "target tag",
            reason: format!("unknown target {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataPath, NormalizedNode};
    use crate::identifiers::{FrontendIdentifier, FrontendType, MemberName};
    use crate::wire::payload::{FailureCause, Modification, PersistenceProtocol, DEFAULT_MAX_MESSAGES};

    fn client() -> ClientIdentifier {
        let frontend = FrontendIdentifier::new(MemberName::new("member").unwrap(), FrontendType::new("type").unwrap());
        ClientIdentifier::new(frontend, 0)
    }

    fn transaction() -> Target {
        Target::Transaction(TransactionIdentifier::new(LocalHistoryIdentifier::new(client(), 1), 7))
    }

    fn round_trip(envelope: &Envelope) -> Envelope {
        Envelope::decode(envelope.encode()).unwrap()
    }

    #[test]
    fn modify_request_survives_every_version() {
        let payload = Payload::ModifyTransactionRequest {
            modifications: vec![
                Modification::Write(DataPath::root(), NormalizedNode::new("root")),
                Modification::Merge(DataPath::new(vec!["a"]).unwrap(), NormalizedNode::new("x")),
                Modification::Delete(DataPath::new(vec!["a", "b"]).unwrap()),
            ],
            protocol: Some(PersistenceProtocol::Ready),
        };

        for version in [ABIVersion::V1, ABIVersion::V2, ABIVersion::V3].iter() {
            let envelope = Envelope::new(*version, transaction(), 3, payload.clone());
            assert_eq!(round_trip(&envelope), envelope);
        }
    }

    #[test]
    fn connect_success_max_messages_only_since_v2() {
        let payload = Payload::ConnectClientSuccess {
            backend: String::from("shard-default-member-1"),
            alternates: vec![String::from("shard-default-member-2")],
            max_messages: 42,
        };
        let v1 = Envelope::new(ABIVersion::V1, Target::Client(client()), 0, payload.clone());
        let v2 = Envelope::new(ABIVersion::V2, Target::Client(client()), 0, payload);

        match round_trip(&v1).into_payload() {
            Payload::ConnectClientSuccess { max_messages, .. } => assert_eq!(max_messages, DEFAULT_MAX_MESSAGES),
            other => panic!("Unexpected {:?}", other),
        }
        assert_eq!(round_trip(&v2), v2);
    }

    #[test]
    fn snapshot_flag_only_since_v3() {
        let payload = Payload::ReadTransactionRequest {
            path: DataPath::root(),
            snapshot_only: true,
        };
        let v2 = Envelope::new(ABIVersion::V2, transaction(), 0, payload.clone());
        let v3 = Envelope::new(ABIVersion::V3, transaction(), 0, payload);

        assert_eq!(
            round_trip(&v2).into_payload(),
            Payload::ReadTransactionRequest {
                path: DataPath::root(),
                snapshot_only: false
            }
        );
        assert_eq!(round_trip(&v3), v3);
    }

    #[test]
    fn failure_carries_its_target_type() {
        let history = Target::History(LocalHistoryIdentifier::new(client(), 4));
        let envelope = Envelope::new(
            ABIVersion::V3,
            history,
            9,
            Payload::RequestFailure {
                cause: FailureCause::OutOfOrder {
                    expected: 3,
                    received: 9,
                },
            },
        );

        assert_eq!(round_trip(&envelope), envelope);
    }

    #[test]
    fn truncated_frame_is_format_error() {
        let envelope = Envelope::new(
            ABIVersion::V3,
            transaction(),
            1,
            Payload::ReadTransactionSuccess {
                data: Some(NormalizedNode::new("payload")),
            },
        );
        let frame = envelope.encode();

        for len in 0..frame.len() {
            assert!(Envelope::decode(frame.slice(..len)).is_err(), "prefix of {} bytes decoded", len);
        }
    }

    #[test]
    fn unknown_version_and_kind() {
        assert_eq!(
            Envelope::decode(Bytes::from_static(&[9, 1])),
            Err(FormatError::UnsupportedVersion(9))
        );
        assert_eq!(Envelope::decode(Bytes::from_static(&[1, 99])), Err(FormatError::UnknownKind(99)));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let envelope = Envelope::new(ABIVersion::V1, transaction(), 1, Payload::TransactionCommitSuccess);
        let mut frame = BytesMut::from(&envelope.encode()[..]);
        frame.put_u8(0);

        assert_eq!(Envelope::decode(frame.freeze()), Err(FormatError::TrailingBytes(1)));
    }
}

use crate::data::{DataPath, NormalizedNode};
use crate::identifiers::{get_bool, get_bytes, get_str, get_u16, get_u32, get_u64, get_u8, put_bytes, put_str};
use crate::identifiers::{FormatError, WireFormat};
use crate::wire::payload::{FailureCause, Modification, Payload, PayloadKind, PersistenceProtocol};
use crate::wire::payload::DEFAULT_MAX_MESSAGES;
use crate::wire::proxy::SerialForm;
use bytes::{BufMut, Bytes, BytesMut};

pub(super) struct V1Proxy;

impl SerialForm for V1Proxy {
    fn encode(&self, payload: &Payload, buf: &mut BytesMut) {
        match payload {
            Payload::ConnectClientRequest { min_version, max_version } => {
                buf.put_u8(*min_version);
                buf.put_u8(*max_version);
            }
            Payload::ConnectClientSuccess { backend, alternates, .. } => {
                encode_backends(backend, alternates, buf);
            }
            Payload::ReadTransactionRequest { path, .. } | Payload::ExistsTransactionRequest { path, .. } => {
                path.write_to(buf);
            }
            Payload::ReadTransactionSuccess { data } => match data {
                Some(node) => {
                    buf.put_u8(1);
                    node.write_to(buf);
                }
                None => buf.put_u8(0),
            },
            Payload::ExistsTransactionSuccess { exists } => buf.put_u8(*exists as u8),
            Payload::ModifyTransactionRequest { modifications, protocol } => {
                buf.put_u32(modifications.len() as u32);
                for modification in modifications {
                    encode_modification(modification, buf);
                }
                buf.put_u8(match protocol {
                    None => 0,
                    Some(PersistenceProtocol::Ready) => 1,
                    Some(PersistenceProtocol::Abort) => 2,
                });
            }
            Payload::RequestFailure { cause } => encode_cause(cause, buf),
            Payload::ModifyTransactionSuccess
            | Payload::TransactionPreCommitRequest
            | Payload::TransactionPreCommitSuccess
            | Payload::TransactionCommitRequest
            | Payload::TransactionCommitSuccess
            | Payload::CloseLocalHistoryRequest
            | Payload::LocalHistorySuccess => {}
        }
    }

    fn decode(&self, kind: PayloadKind, buf: &mut Bytes) -> Result<Payload, FormatError> {
        let payload = match kind {
            PayloadKind::ConnectClientRequest => Payload::ConnectClientRequest {
                min_version: get_u8(buf, "min version")?,
                max_version: get_u8(buf, "max version")?,
            },
            PayloadKind::ConnectClientSuccess => {
                let (backend, alternates) = decode_backends(buf)?;
                Payload::ConnectClientSuccess {
                    backend,
                    alternates,
                    max_messages: DEFAULT_MAX_MESSAGES,
                }
            }
            PayloadKind::ReadTransactionRequest => Payload::ReadTransactionRequest {
                path: DataPath::read_from(buf)?,
                snapshot_only: false,
            },
            PayloadKind::ExistsTransactionRequest => Payload::ExistsTransactionRequest {
                path: DataPath::read_from(buf)?,
                snapshot_only: false,
            },
            PayloadKind::ReadTransactionSuccess => {
                let data = if get_bool(buf, "data present")? {
                    Some(NormalizedNode::read_from(buf)?)
                } else {
                    None
                };
                Payload::ReadTransactionSuccess { data }
            }
            PayloadKind::ExistsTransactionSuccess => Payload::ExistsTransactionSuccess {
                exists: get_bool(buf, "exists")?,
            },
            PayloadKind::ModifyTransactionRequest => {
                let count = get_u32(buf, "modification count")?;
                let mut modifications = Vec::with_capacity(count.min(1024) as usize);
                for _ in 0..count {
                    modifications.push(decode_modification(buf)?);
                }
                let protocol = match get_u8(buf, "protocol")? {
                    0 => None,
                    1 => Some(PersistenceProtocol::Ready),
                    2 => Some(PersistenceProtocol::Abort),
                    other => {
                        return Err(FormatError::Invalid {
                            field: "protocol",
                            reason: format!("unknown protocol {}", other),
                        })
                    }
                };
                Payload::ModifyTransactionRequest { modifications, protocol }
            }
            // Nothing beyond the envelope's identifier and sequence.
            PayloadKind::ModifyTransactionSuccess => Payload::ModifyTransactionSuccess,
            PayloadKind::TransactionPreCommitRequest => Payload::TransactionPreCommitRequest,
            PayloadKind::TransactionPreCommitSuccess => Payload::TransactionPreCommitSuccess,
            PayloadKind::TransactionCommitRequest => Payload::TransactionCommitRequest,
            PayloadKind::TransactionCommitSuccess => Payload::TransactionCommitSuccess,
            PayloadKind::CloseLocalHistoryRequest => Payload::CloseLocalHistoryRequest,
            PayloadKind::LocalHistorySuccess => Payload::LocalHistorySuccess,
            PayloadKind::RequestFailure => Payload::RequestFailure {
                cause: decode_cause(buf)?,
            },
        };

        Ok(payload)
    }
}

pub(super) fn encode_backends(backend: &str, alternates: &[String], buf: &mut BytesMut) {
    put_str(buf, backend);
    buf.put_u16(alternates.len() as u16);
    for alternate in alternates {
        put_str(buf, alternate);
    }
}

pub(super) fn decode_backends(buf: &mut Bytes) -> Result<(String, Vec<String>), FormatError> {
    let backend = get_str(buf, "backend")?;
    let count = get_u16(buf, "alternate count")?;
    let mut alternates = Vec::with_capacity(count as usize);
    for _ in 0..count {
        alternates.push(get_str(buf, "alternate")?);
    }

    Ok((backend, alternates))
}

fn encode_modification(modification: &Modification, buf: &mut BytesMut) {
    match modification {
        Modification::Write(path, data) => {
            buf.put_u8(1);
            path.write_to(buf);
            data.write_to(buf);
        }
        Modification::Merge(path, data) => {
            buf.put_u8(2);
            path.write_to(buf);
            data.write_to(buf);
        }
        Modification::Delete(path) => {
            buf.put_u8(3);
            path.write_to(buf);
        }
    }
}

fn decode_modification(buf: &mut Bytes) -> Result<Modification, FormatError> {
    let modification = match get_u8(buf, "modification type")? {
        1 => Modification::Write(DataPath::read_from(buf)?, NormalizedNode::read_from(buf)?),
        2 => Modification::Merge(DataPath::read_from(buf)?, NormalizedNode::read_from(buf)?),
        3 => Modification::Delete(DataPath::read_from(buf)?),
        other => {
            return Err(FormatError::Invalid {
                field: "modification type",
                reason: format!("unknown modification {}", other),
            })
        }
    };

    Ok(modification)
}

fn encode_cause(cause: &FailureCause, buf: &mut BytesMut) {
    match cause {
        FailureCause::NotLeader => buf.put_u8(1),
        FailureCause::OutOfOrder { expected, received } => {
            buf.put_u8(2);
            buf.put_u64(*expected);
            buf.put_u64(*received);
        }
        FailureCause::ClosedHistory => buf.put_u8(3),
        FailureCause::RetiredGeneration => buf.put_u8(4),
        FailureCause::UnknownTransaction => buf.put_u8(5),
        FailureCause::Operation(message) => {
            buf.put_u8(6);
            put_bytes(buf, message.as_bytes());
        }
        FailureCause::IllegalState(message) => {
            buf.put_u8(7);
            put_bytes(buf, message.as_bytes());
        }
    }
}

fn decode_message(buf: &mut Bytes) -> Result<String, FormatError> {
    let raw = get_bytes(buf, "failure message")?;
    String::from_utf8(raw.to_vec()).map_err(|e| FormatError::Invalid {
        field: "failure message",
        reason: e.to_string(),
    })
}

fn decode_cause(buf: &mut Bytes) -> Result<FailureCause, FormatError> {
    let cause = match get_u8(buf, "failure cause")? {
        1 => FailureCause::NotLeader,
        2 => FailureCause::OutOfOrder {
            expected: get_u64(buf, "expected sequence")?,
            received: get_u64(buf, "received sequence")?,
        },
        3 => FailureCause::ClosedHistory,
        4 => FailureCause::RetiredGeneration,
        5 => FailureCause::UnknownTransaction,
        6 => FailureCause::Operation(decode_message(buf)?),
        7 => FailureCause::IllegalState(decode_message(buf)?),
        other => {
            return Err(FormatError::Invalid {
                field: "failure cause",
                reason: format!("unknown cause {}", other),
            })
        }
    };

    Ok(cause)
}

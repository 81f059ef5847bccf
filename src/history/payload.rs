use crate::identifiers::{get_u8, FormatError, LocalHistoryIdentifier, WireFormat};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const CLOSE_LOCAL_HISTORY_TYPE: u8 = 1;
const CLOSE_LOCAL_HISTORY_FORMAT_VERSION: u8 = 1;

/// Journal record marking a local history as closed. The serialized form is produced once and
/// reused for every write to the replicated log.
///
/// ```text
/// +------+-----+------------------------------------...-+
/// | Type | Vrs | LocalHistoryIdentifier (variable)  ... |
/// +------+-----+------------------------------------...-+
/// ```
///
/// * `Type` - journal payload type
/// * `Vrs` - format version. Readers accept every version up to their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseLocalHistoryPayload {
    identifier: LocalHistoryIdentifier,
    serialized: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("Failed to serialize {identifier}: {cause}")]
    Serialization { identifier: String, cause: FormatError },
    #[error("Serialized form of {0} does not decode to the same identifier")]
    Mismatch(String),
}

impl CloseLocalHistoryPayload {
    pub fn create(
        logger: &slog::Logger,
        identifier: LocalHistoryIdentifier,
        initial_capacity: usize,
    ) -> Result<Self, PayloadError> {
        let mut buf = BytesMut::with_capacity(initial_capacity);
        buf.put_u8(CLOSE_LOCAL_HISTORY_TYPE);
        buf.put_u8(CLOSE_LOCAL_HISTORY_FORMAT_VERSION);
        identifier.write_to(&mut buf);
        let serialized = buf.freeze();

        // The cached bytes are what recovery will see, so they must decode back to us.
        match decode_identifier(serialized.clone()) {
            Ok(decoded) if decoded == identifier => Ok(CloseLocalHistoryPayload { identifier, serialized }),
            Ok(_) => {
                slog::error!(logger, "Serialized form of {:?} decodes to another identifier", identifier);
                Err(PayloadError::Mismatch(format!("{:?}", identifier)))
            }
            Err(cause) => {
                slog::error!(logger, "Failed to serialize {:?}: {}", identifier, cause);
                Err(PayloadError::Serialization {
                    identifier: format!("{:?}", identifier),
                    cause,
                })
            }
        }
    }

    pub fn from_bytes(serialized: Bytes) -> Result<Self, FormatError> {
        let identifier = decode_identifier(serialized.clone())?;
        Ok(CloseLocalHistoryPayload { identifier, serialized })
    }

    pub fn identifier(&self) -> &LocalHistoryIdentifier {
        &self.identifier
    }

    pub fn serialized(&self) -> &Bytes {
        &self.serialized
    }
}

fn decode_identifier(mut serialized: Bytes) -> Result<LocalHistoryIdentifier, FormatError> {
    let payload_type = get_u8(&mut serialized, "payload type")?;
    if payload_type != CLOSE_LOCAL_HISTORY_TYPE {
        return Err(FormatError::Invalid {
            field: "payload type",
            reason: format!("expected close-history payload, found type {}", payload_type),
        });
    }

    let version = get_u8(&mut serialized, "payload version")?;
    if version == 0 || version > CLOSE_LOCAL_HISTORY_FORMAT_VERSION {
        return Err(FormatError::UnsupportedVersion(version));
    }

    let identifier = LocalHistoryIdentifier::read_from(&mut serialized)?;
    if serialized.has_remaining() {
        return Err(FormatError::TrailingBytes(serialized.remaining()));
    }

    Ok(identifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::{ClientIdentifier, FrontendIdentifier, FrontendType, MemberName};

    fn history() -> LocalHistoryIdentifier {
        let frontend = FrontendIdentifier::new(MemberName::new("member").unwrap(), FrontendType::new("type").unwrap());
        LocalHistoryIdentifier::new(ClientIdentifier::new(frontend, 2), 5)
    }

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    #[test]
    fn cached_bytes_match_fresh_encoding() {
        let payload = CloseLocalHistoryPayload::create(&logger(), history(), 16).unwrap();
        let again = CloseLocalHistoryPayload::create(&logger(), history(), 512).unwrap();

        assert_eq!(payload.serialized(), again.serialized());
        assert_eq!(payload.identifier(), &history());
    }

    #[test]
    fn recovered_from_journal_bytes() {
        let payload = CloseLocalHistoryPayload::create(&logger(), history(), 16).unwrap();
        let recovered = CloseLocalHistoryPayload::from_bytes(payload.serialized().clone()).unwrap();

        assert_eq!(recovered, payload);
    }

    #[test]
    fn newer_format_is_rejected() {
        let payload = CloseLocalHistoryPayload::create(&logger(), history(), 16).unwrap();
        let mut bytes = BytesMut::from(&payload.serialized()[..]);
        bytes[1] = CLOSE_LOCAL_HISTORY_FORMAT_VERSION + 1;

        assert_eq!(
            CloseLocalHistoryPayload::from_bytes(bytes.freeze()),
            Err(FormatError::UnsupportedVersion(CLOSE_LOCAL_HISTORY_FORMAT_VERSION + 1))
        );
    }

    #[test]
    fn truncated_record() {
        let payload = CloseLocalHistoryPayload::create(&logger(), history(), 16).unwrap();
        let truncated = payload.serialized().slice(..payload.serialized().len() - 1);

        assert!(CloseLocalHistoryPayload::from_bytes(truncated).is_err());
    }
}

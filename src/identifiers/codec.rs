use bytes::{Buf, BufMut, Bytes};

/// Identifiers and payload fields share one primitive encoding, independent of the envelope's
/// ABI version:
///
/// * integers are fixed-width big-endian
/// * strings are a `u16` byte length followed by UTF-8 bytes
/// * opaque byte blobs are a `u32` byte length followed by the bytes
pub trait WireFormat: Sized {
    fn write_to<B: BufMut>(&self, buf: &mut B);

    fn read_from<B: Buf>(buf: &mut B) -> Result<Self, FormatError>;
}

/// Decode failures. Always fatal to the single message being decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("Truncated input reading {field}: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("Unsupported ABI version {0}")]
    UnsupportedVersion(u8),
    #[error("Unknown payload kind {0}")]
    UnknownKind(u8),
    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),
}

fn ensure<B: Buf>(buf: &B, needed: usize, field: &'static str) -> Result<(), FormatError> {
    if buf.remaining() < needed {
        return Err(FormatError::Truncated {
            field,
            needed,
            remaining: buf.remaining(),
        });
    }

    Ok(())
}

pub(crate) fn get_u8<B: Buf>(buf: &mut B, field: &'static str) -> Result<u8, FormatError> {
    ensure(buf, 1, field)?;
    Ok(buf.get_u8())
}

pub(crate) fn get_bool<B: Buf>(buf: &mut B, field: &'static str) -> Result<bool, FormatError> {
    match get_u8(buf, field)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(FormatError::Invalid {
            field,
            reason: format!("{} is not a boolean", other),
        }),
    }
}

pub(crate) fn get_u16<B: Buf>(buf: &mut B, field: &'static str) -> Result<u16, FormatError> {
    ensure(buf, 2, field)?;
    Ok(buf.get_u16())
}

pub(crate) fn get_u32<B: Buf>(buf: &mut B, field: &'static str) -> Result<u32, FormatError> {
    ensure(buf, 4, field)?;
    Ok(buf.get_u32())
}

pub(crate) fn get_u64<B: Buf>(buf: &mut B, field: &'static str) -> Result<u64, FormatError> {
    ensure(buf, 8, field)?;
    Ok(buf.get_u64())
}

pub(crate) fn get_str<B: Buf>(buf: &mut B, field: &'static str) -> Result<String, FormatError> {
    let len = get_u16(buf, field)? as usize;
    ensure(buf, len, field)?;
    let raw = buf.copy_to_bytes(len);

    String::from_utf8(raw.to_vec()).map_err(|e| FormatError::Invalid {
        field,
        reason: e.to_string(),
    })
}

pub(crate) fn get_bytes<B: Buf>(buf: &mut B, field: &'static str) -> Result<Bytes, FormatError> {
    let len = get_u32(buf, field)? as usize;
    ensure(buf, len, field)?;
    Ok(buf.copy_to_bytes(len))
}

// Callers guarantee `value` fits in a u16 length prefix. Names are validated at construction and
// path segments at `DataPath` construction.
pub(crate) fn put_str<B: BufMut>(buf: &mut B, value: &str) {
    buf.put_u16(value.len() as u16);
    buf.put_slice(value.as_bytes());
}

pub(crate) fn put_bytes<B: BufMut>(buf: &mut B, value: &[u8]) {
    buf.put_u32(value.len() as u32);
    buf.put_slice(value);
}

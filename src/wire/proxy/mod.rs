mod v1;
mod v2;
mod v3;

use crate::identifiers::FormatError;
use crate::wire::payload::{Payload, PayloadKind};
use crate::wire::version::ABIVersion;
use bytes::{Bytes, BytesMut};

/// Serialization proxy for one ABI version. A proxy is stateless: decoding hands back a fully
/// built canonical `Payload` and keeps nothing.
pub(crate) trait SerialForm: Sync {
    fn encode(&self, payload: &Payload, buf: &mut BytesMut);

    fn decode(&self, kind: PayloadKind, buf: &mut Bytes) -> Result<Payload, FormatError>;
}

pub(crate) fn proxy_for(version: ABIVersion) -> &'static dyn SerialForm {
    match version {
        ABIVersion::V1 => &v1::V1Proxy,
        ABIVersion::V2 => &v2::V2Proxy,
        ABIVersion::V3 => &v3::V3Proxy,
    }
}

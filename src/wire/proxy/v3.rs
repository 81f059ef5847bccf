use crate::data::DataPath;
use crate::identifiers::{get_bool, FormatError, WireFormat};
use crate::wire::payload::{Payload, PayloadKind};
use crate::wire::proxy::v2::V2Proxy;
use crate::wire::proxy::SerialForm;
use bytes::{BufMut, Bytes, BytesMut};

pub(super) struct V3Proxy;

impl SerialForm for V3Proxy {
    fn encode(&self, payload: &Payload, buf: &mut BytesMut) {
        match payload {
            Payload::ReadTransactionRequest { path, snapshot_only }
            | Payload::ExistsTransactionRequest { path, snapshot_only } => {
                path.write_to(buf);
                buf.put_u8(*snapshot_only as u8);
            }
            other => V2Proxy.encode(other, buf),
        }
    }

    fn decode(&self, kind: PayloadKind, buf: &mut Bytes) -> Result<Payload, FormatError> {
        match kind {
            PayloadKind::ReadTransactionRequest => {
                let path = DataPath::read_from(buf)?;
                let snapshot_only = get_bool(buf, "snapshot only")?;
                Ok(Payload::ReadTransactionRequest { path, snapshot_only })
            }
            PayloadKind::ExistsTransactionRequest => {
                let path = DataPath::read_from(buf)?;
                let snapshot_only = get_bool(buf, "snapshot only")?;
                Ok(Payload::ExistsTransactionRequest { path, snapshot_only })
            }
            other => V2Proxy.decode(other, buf),
        }
    }
}

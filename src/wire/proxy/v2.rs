use crate::identifiers::{get_u32, FormatError};
use crate::wire::payload::{Payload, PayloadKind};
use crate::wire::proxy::v1::{decode_backends, encode_backends, V1Proxy};
use crate::wire::proxy::SerialForm;
use bytes::{BufMut, Bytes, BytesMut};

pub(super) struct V2Proxy;

impl SerialForm for V2Proxy {
    fn encode(&self, payload: &Payload, buf: &mut BytesMut) {
        match payload {
            Payload::ConnectClientSuccess {
                backend,
                alternates,
                max_messages,
            } => {
                encode_backends(backend, alternates, buf);
                buf.put_u32(*max_messages);
            }
            other => V1Proxy.encode(other, buf),
        }
    }

    fn decode(&self, kind: PayloadKind, buf: &mut Bytes) -> Result<Payload, FormatError> {
        match kind {
            PayloadKind::ConnectClientSuccess => {
                let (backend, alternates) = decode_backends(buf)?;
                let max_messages = get_u32(buf, "max messages")?;
                Ok(Payload::ConnectClientSuccess {
                    backend,
                    alternates,
                    max_messages,
                })
            }
            other => V1Proxy.decode(other, buf),
        }
    }
}

use crate::err::*;
use bytes::Buf;
use bytes::BufMut;
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;

/// Largest frame accepted from the wire.
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// Length-prefixed CBOR framing used for envelopes on the in-memory overlay.
#[derive(Default)]
pub struct CborCodec<TEncode, TDecode> {
    msg_len: Option<usize>,
    e: PhantomData<TEncode>,
    d: PhantomData<TDecode>,
}

impl<TEncode, TDecode> CborCodec<TEncode, TDecode>
where
    TEncode: Serialize,
{
    pub fn new() -> CborCodec<TEncode, TDecode> {
        CborCodec {
            e: PhantomData {},
            d: PhantomData {},
            msg_len: None,
        }
    }
}

pub fn ser<T: Serialize>(item: &T) -> ProtocolResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(item, &mut bytes)?;
    Ok(bytes)
}

pub fn deser<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    Ok(ciborium::de::from_reader(bytes)?)
}

impl<TEncode, TDecode> tokio_util::codec::Decoder for CborCodec<TEncode, TDecode>
where
    TEncode: Serialize,
    TDecode: DeserializeOwned,
{
    type Item = TDecode;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut bytes::BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let msg_len = match self.msg_len {
            Some(msg_len) => msg_len,
            None => {
                if src.len() < 4 {
                    return Ok(None);
                }
                let msg_len = src.get_u32() as usize;
                if msg_len > MAX_FRAME_LEN {
                    return Err(ProtocolError::MalformedMessage(format!(
                        "frame of {} bytes exceeds limit of {}",
                        msg_len, MAX_FRAME_LEN
                    )));
                }
                src.reserve(msg_len);
                self.msg_len = Some(msg_len);
                msg_len
            }
        };

        if src.len() < msg_len {
            return Ok(None);
        }

        let msg = deser(&src[0..msg_len]);
        src.advance(msg_len);
        self.msg_len = None;
        msg.map(Some)
    }
}

impl<TEncode: Serialize, TDecode> tokio_util::codec::Encoder<TEncode>
    for CborCodec<TEncode, TDecode>
{
    type Error = ProtocolError;

    fn encode(&mut self, item: TEncode, dst: &mut bytes::BytesMut) -> Result<(), Self::Error> {
        let bytes = ser(&item)?;
        if bytes.len() > MAX_FRAME_LEN {
            return Err(ProtocolError::UnserializableMessage(format!(
                "message of {} bytes exceeds frame limit of {}",
                bytes.len(),
                MAX_FRAME_LEN
            )));
        }
        dst.put_u32(bytes.len() as u32);
        dst.put_slice(&bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DirectMessage, Envelope, NodeAddress, OfferAvailabilityRequest};
    use tokio_util::codec::{Decoder, Encoder};

    #[test]
    fn decodes_frame_split_across_reads() {
        let envelope = Envelope {
            sender: NodeAddress::new("taker", 1),
            message: DirectMessage::OfferAvailabilityRequest(OfferAvailabilityRequest {
                offer_id: "OFFER-1".into(),
                uid: "uid".into(),
            }),
        };
        let mut codec = CborCodec::<Envelope, Envelope>::new();
        let mut encoded = bytes::BytesMut::new();
        codec.encode(envelope.clone(), &mut encoded).unwrap();

        let tail = encoded.split_off(6);
        assert_eq!(None, codec.decode(&mut encoded).unwrap());

        encoded.unsplit(tail);
        assert_eq!(Some(envelope), codec.decode(&mut encoded).unwrap());
        assert!(encoded.is_empty());
    }

    #[test]
    fn garbage_is_malformed() {
        let mut codec = CborCodec::<Envelope, Envelope>::new();
        let mut src = bytes::BytesMut::new();
        src.put_u32(2);
        src.put_slice(&[0xff, 0xff]);

        assert!(matches!(
            codec.decode(&mut src),
            Err(ProtocolError::MalformedMessage(_))
        ));
        // the bad frame is consumed
        assert!(src.is_empty());
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut codec = CborCodec::<Envelope, Envelope>::new();
        let mut src = bytes::BytesMut::new();
        src.put_u32(u32::MAX);
        src.put_slice(&[0xa0]);

        assert!(matches!(
            codec.decode(&mut src),
            Err(ProtocolError::MalformedMessage(_))
        ));
        // nothing was reserved for the announced length
        assert!(src.capacity() < MAX_FRAME_LEN);
    }
}

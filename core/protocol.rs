// OSC 1.0 wire format - pure data structures, no I/O
use crate::types::{CodecError, OscArg};

const BUNDLE_MARKER: &[u8; 8] = b"#bundle\0";

// Round up to the next 4-byte boundary
fn align4(n: usize) -> usize {
    (n + 3) & !3
}

fn write_string(bytes: &mut Vec<u8>, s: &[u8]) {
    bytes.extend_from_slice(s);
    // At least one NUL, then pad
    let padded = align4(s.len() + 1);
    bytes.resize(bytes.len() + (padded - s.len()), 0);
}

fn write_blob(bytes: &mut Vec<u8>, data: &[u8]) {
    bytes.extend_from_slice(&(data.len() as i32).to_be_bytes());
    bytes.extend_from_slice(data);
    let padded = align4(data.len());
    bytes.resize(bytes.len() + (padded - data.len()), 0);
}

// Cursor over a received datagram
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.bytes.len() - self.pos < n {
            return Err(CodecError::Truncated(self.pos));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take4(&mut self) -> Result<[u8; 4], CodecError> {
        let mut word = [0u8; 4];
        word.copy_from_slice(self.take(4)?);
        Ok(word)
    }

    fn take8(&mut self) -> Result<[u8; 8], CodecError> {
        let mut word = [0u8; 8];
        word.copy_from_slice(self.take(8)?);
        Ok(word)
    }

    fn string_bytes(&mut self) -> Result<&'a [u8], CodecError> {
        let rest = &self.bytes[self.pos..];
        let nul = rest.iter().position(|&b| b == 0).ok_or(CodecError::Unterminated)?;
        let s = &rest[..nul];
        let consumed = align4(nul + 1);
        if consumed > rest.len() {
            return Err(CodecError::Truncated(self.pos));
        }
        self.pos += consumed;
        Ok(s)
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let raw = self.string_bytes()?;
        std::str::from_utf8(raw)
            .map(str::to_string)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.bytes[self.pos.min(self.bytes.len())..];
        self.pos = self.bytes.len();
        rest
    }

    fn blob(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = i32::from_be_bytes(self.take4()?);
        if len < 0 {
            return Err(CodecError::Truncated(self.pos));
        }
        let len = len as usize;
        let data = self.take(len)?.to_vec();
        self.take(align4(len) - len)?;
        Ok(data)
    }

    fn arg(&mut self, tag: char) -> Result<OscArg, CodecError> {
        let arg = match tag {
            'i' => OscArg::Int(i32::from_be_bytes(self.take4()?)),
            'f' => OscArg::Float(f32::from_be_bytes(self.take4()?)),
            's' => OscArg::String(self.string()?),
            'b' => OscArg::Blob(self.blob()?),
            'T' => OscArg::Bool(true),
            'F' => OscArg::Bool(false),
            'N' => OscArg::Null,
            // Framed but not interpreted: int64, timetag, double
            'h' | 't' | 'd' => OscArg::Unknown { tag, data: self.take8()?.to_vec() },
            // char, RGBA, MIDI
            'c' | 'r' | 'm' => OscArg::Unknown { tag, data: self.take4()?.to_vec() },
            'S' => OscArg::Unknown { tag, data: self.string_bytes()?.to_vec() },
            'I' | '[' | ']' => OscArg::Unknown { tag, data: Vec::new() },
            other => return Err(CodecError::UnsupportedTag(other)),
        };
        Ok(arg)
    }
}

// Single OSC message
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    pub fn new(address: &str, args: Vec<OscArg>) -> Self {
        OscMessage {
            address: address.to_string(),
            args,
        }
    }

    /// An argument-less message, used to ask a peer for its current value.
    pub fn probe(address: &str) -> Self {
        OscMessage::new(address, Vec::new())
    }

    pub fn is_probe(&self) -> bool {
        self.args.is_empty()
    }

    pub fn type_tags(&self) -> String {
        self.args.iter().map(OscArg::tag).collect()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(align4(self.address.len() + 1) + 16);
        write_string(&mut bytes, self.address.as_bytes());

        let mut tags = String::with_capacity(self.args.len() + 1);
        tags.push(',');
        tags.extend(self.args.iter().map(OscArg::wire_tag));
        write_string(&mut bytes, tags.as_bytes());

        for arg in &self.args {
            match arg {
                OscArg::Int(v) => bytes.extend_from_slice(&v.to_be_bytes()),
                OscArg::Float(v) => bytes.extend_from_slice(&v.to_be_bytes()),
                OscArg::String(s) => write_string(&mut bytes, s.as_bytes()),
                OscArg::Blob(data) => write_blob(&mut bytes, data),
                OscArg::Bool(_) | OscArg::Null => {}
                OscArg::Unknown { tag: 'S', data } => write_string(&mut bytes, data),
                OscArg::Unknown { data, .. } => bytes.extend_from_slice(data),
            }
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader::new(bytes);
        Self::read(&mut reader)
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        let address = reader.string()?;
        if !address.starts_with('/') {
            return Err(CodecError::NotOsc);
        }

        // Very old senders omit the type tag string entirely
        if reader.is_empty() {
            return Ok(OscMessage { address, args: Vec::new() });
        }

        let tags = reader.string()?;
        let tags = tags.strip_prefix(',').ok_or(CodecError::MissingTypeTags)?;

        let mut args = Vec::with_capacity(tags.len());
        for tag in tags.chars() {
            match reader.arg(tag) {
                Ok(arg) => args.push(arg),
                // Its size is unknown, so nothing after it can be framed
                Err(CodecError::UnsupportedTag(tag)) => {
                    args.push(OscArg::Unknown { tag, data: reader.rest().to_vec() });
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(OscMessage { address, args })
    }
}

// Message or bundle as received from the network
#[derive(Debug, Clone, PartialEq)]
pub enum OscPacket {
    Message(OscMessage),
    Bundle { timetag: u64, content: Vec<OscPacket> },
}

impl OscPacket {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.is_empty() {
            return Err(CodecError::Truncated(0));
        }
        if bytes.len() % 4 != 0 {
            return Err(CodecError::Misaligned(bytes.len()));
        }

        if bytes.starts_with(BUNDLE_MARKER) {
            let mut reader = Reader::new(bytes);
            reader.take(BUNDLE_MARKER.len())?;
            let timetag = u64::from_be_bytes(reader.take8()?);

            let mut content = Vec::new();
            while !reader.is_empty() {
                let size = i32::from_be_bytes(reader.take4()?);
                if size < 0 {
                    return Err(CodecError::Truncated(reader.pos));
                }
                let element = reader.take(size as usize)?;
                content.push(OscPacket::from_bytes(element)?);
            }
            Ok(OscPacket::Bundle { timetag, content })
        } else {
            OscMessage::from_bytes(bytes).map(OscPacket::Message)
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            OscPacket::Message(msg) => msg.to_bytes(),
            OscPacket::Bundle { timetag, content } => {
                let mut bytes = Vec::new();
                bytes.extend_from_slice(BUNDLE_MARKER);
                bytes.extend_from_slice(&timetag.to_be_bytes());
                for element in content {
                    let encoded = element.to_bytes();
                    bytes.extend_from_slice(&(encoded.len() as i32).to_be_bytes());
                    bytes.extend_from_slice(&encoded);
                }
                bytes
            }
        }
    }

    /// Flatten nested bundles into their messages, in order.
    pub fn into_messages(self) -> Vec<OscMessage> {
        match self {
            OscPacket::Message(msg) => vec![msg],
            OscPacket::Bundle { content, .. } => content
                .into_iter()
                .flat_map(OscPacket::into_messages)
                .collect(),
        }
    }
}

impl From<OscMessage> for OscPacket {
    fn from(msg: OscMessage) -> Self {
        OscPacket::Message(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_int_float_message() {
        let msg = OscMessage::new("/foo", vec![OscArg::Int(1), OscArg::Float(2.5)]);
        let bytes = msg.to_bytes();

        assert_eq!(&bytes[0..8], b"/foo\0\0\0\0");
        assert_eq!(&bytes[8..12], b",if\0");
        assert_eq!(&bytes[12..16], &1i32.to_be_bytes());
        assert_eq!(&bytes[16..20], &2.5f32.to_be_bytes());
        assert_eq!(bytes.len(), 20);
    }

    #[test]
    fn probe_has_empty_type_tags() {
        let bytes = OscMessage::probe("/ab").to_bytes();
        assert_eq!(bytes, b"/ab\0,\0\0\0");

        let decoded = OscMessage::from_bytes(&bytes).unwrap();
        assert!(decoded.is_probe());
    }

    #[test]
    fn booleans_and_null_carry_no_payload() {
        let msg = OscMessage::new("/b", vec![OscArg::Bool(true), OscArg::Bool(false), OscArg::Null]);
        let bytes = msg.to_bytes();
        assert_eq!(&bytes[4..12], b",TFN\0\0\0\0");
        assert_eq!(bytes.len(), 12);

        let decoded = OscMessage::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.type_tags(), "BBN");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn strings_and_blobs_are_padded() {
        let msg = OscMessage::new(
            "/s",
            vec![OscArg::String("abcd".into()), OscArg::Blob(vec![1, 2, 3])],
        );
        let bytes = msg.to_bytes();
        assert_eq!(bytes.len() % 4, 0);
        // "abcd" needs a full extra word for its terminator
        assert_eq!(&bytes[8..16], b"abcd\0\0\0\0");
        assert_eq!(OscMessage::from_bytes(&bytes).unwrap(), msg);
    }

    #[test]
    fn uninterpreted_tags_decode_as_unknown() {
        let mut bytes = Vec::new();
        write_string(&mut bytes, b"/d");
        write_string(&mut bytes, b",di");
        bytes.extend_from_slice(&1.5f64.to_be_bytes());
        bytes.extend_from_slice(&7i32.to_be_bytes());

        let msg = OscMessage::from_bytes(&bytes).unwrap();
        assert_eq!(msg.args[0].tag(), 'd');
        assert_eq!(msg.args[1], OscArg::Int(7));
    }

    #[test]
    fn unsupported_tag_keeps_earlier_args() {
        let mut bytes = Vec::new();
        write_string(&mut bytes, b"/x");
        write_string(&mut bytes, b",iZi");
        bytes.extend_from_slice(&7i32.to_be_bytes());
        bytes.extend_from_slice(&[1, 2, 3, 4, 0, 0, 0, 9]);

        let msg = OscMessage::from_bytes(&bytes).unwrap();
        assert_eq!(
            msg.args,
            vec![
                OscArg::Int(7),
                OscArg::Unknown { tag: 'Z', data: vec![1, 2, 3, 4, 0, 0, 0, 9] },
            ]
        );
    }

    #[test]
    fn truncated_packet_is_rejected() {
        let bytes = OscMessage::new("/foo", vec![OscArg::Int(1)]).to_bytes();
        assert!(matches!(
            OscMessage::from_bytes(&bytes[..bytes.len() - 4]),
            Err(CodecError::Truncated(_))
        ));
        assert_eq!(OscPacket::from_bytes(&bytes[..5]), Err(CodecError::Misaligned(5)));
    }

    #[test]
    fn bundles_flatten_in_order() {
        let inner = OscPacket::Bundle {
            timetag: 1,
            content: vec![OscMessage::new("/b", vec![OscArg::Int(2)]).into()],
        };
        let outer = OscPacket::Bundle {
            timetag: 1,
            content: vec![OscMessage::new("/a", vec![OscArg::Int(1)]).into(), inner],
        };

        let decoded = OscPacket::from_bytes(&outer.to_bytes()).unwrap();
        let addresses: Vec<String> = decoded.into_messages().into_iter().map(|m| m.address).collect();
        assert_eq!(addresses, vec!["/a", "/b"]);
    }

    #[test]
    fn non_osc_payload_is_rejected() {
        assert_eq!(OscPacket::from_bytes(b"abc\0"), Err(CodecError::NotOsc));
    }
}

use bytes::{BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;
use std::fmt;

use super::error::PeerError;
use super::pex::PexMessage;
use crate::bencode::{decode, encode, DictBuilder, Value};

/// Peer wire message id of every BEP-10 extended message.
pub const EXTENDED_MESSAGE_ID: u8 = 20;

/// Extended message id reserved for the handshake.
pub const EXTENSION_HANDSHAKE_ID: u8 = 0;

/// Extensions this client speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExtensionType {
    UtPex,
    UtMetadata,
    LtDonthave,
    UploadOnly,
    UtHolepunch,
}

impl ExtensionType {
    pub const ALL: [ExtensionType; 5] = [
        ExtensionType::UtPex,
        ExtensionType::UtMetadata,
        ExtensionType::LtDonthave,
        ExtensionType::UploadOnly,
        ExtensionType::UtHolepunch,
    ];

    /// Key in the handshake `m` dictionary.
    pub fn name(self) -> &'static str {
        match self {
            ExtensionType::UtPex => "ut_pex",
            ExtensionType::UtMetadata => "ut_metadata",
            ExtensionType::LtDonthave => "lt_donthave",
            ExtensionType::UploadOnly => "upload_only",
            ExtensionType::UtHolepunch => "ut_holepunch",
        }
    }

    /// Id we advertise; peers tag messages for us with it.
    pub fn local_id(self) -> u8 {
        match self {
            ExtensionType::UtPex => 1,
            ExtensionType::UtMetadata => 2,
            ExtensionType::LtDonthave => 3,
            ExtensionType::UploadOnly => 4,
            ExtensionType::UtHolepunch => 5,
        }
    }

    pub fn from_local_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|ext| ext.local_id() == id)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ext| ext.name() == name)
    }

    /// Shortest body a well-formed message of this type can have.
    pub fn min_len(self) -> usize {
        match self {
            // smallest bencoded dictionary: "de"
            ExtensionType::UtPex | ExtensionType::UtMetadata => 2,
            ExtensionType::LtDonthave => 4,
            ExtensionType::UploadOnly => 1,
            // msg type, addr type, ipv4, port
            ExtensionType::UtHolepunch => 8,
        }
    }
}

impl fmt::Display for ExtensionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The BEP-10 handshake dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionHandshake {
    /// Extension name to the id the sender wants it tagged with.
    pub extensions: BTreeMap<String, u8>,
    pub client: Option<String>,
    pub port: Option<u16>,
    pub yourip: Option<Bytes>,
    pub reqq: Option<i64>,
    pub metadata_size: Option<i64>,
    pub upload_only: bool,
}

impl ExtensionHandshake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extensions(extensions: impl IntoIterator<Item = ExtensionType>) -> Self {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| (ext.name().to_string(), ext.local_id()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn extension_id(&self, ext: ExtensionType) -> Option<u8> {
        self.extensions.get(ext.name()).copied()
    }

    /// Known extensions the sender advertised.
    pub fn supported(&self) -> impl Iterator<Item = ExtensionType> + '_ {
        self.extensions
            .keys()
            .filter_map(|name| ExtensionType::from_name(name))
    }

    pub fn encode(&self) -> Bytes {
        let m = self
            .extensions
            .iter()
            .fold(DictBuilder::new(), |m, (name, id)| m.entry(name, i64::from(*id)))
            .build();

        let dict = DictBuilder::new()
            .entry("m", m)
            .entry_opt("v", self.client.as_deref())
            .entry_opt("p", self.port.map(i64::from))
            .entry_opt("yourip", self.yourip.clone())
            .entry_opt("reqq", self.reqq)
            .entry_opt("metadata_size", self.metadata_size)
            .entry_opt("upload_only", self.upload_only.then_some(1i64))
            .build();

        Bytes::from(encode(&dict))
    }

    pub fn decode(data: &[u8]) -> Result<Self, PeerError> {
        let value = decode(data)?;
        if value.as_dict().is_none() {
            return Err(PeerError::InvalidMessage("handshake is not a dictionary".into()));
        }

        let mut extensions = BTreeMap::new();
        if let Some(m) = value.get(b"m").and_then(Value::as_dict) {
            for (key, id) in m {
                let name = std::str::from_utf8(key).ok();
                // id 0 disables an extension
                let id = id.as_integer().and_then(|id| u8::try_from(id).ok()).filter(|&id| id > 0);
                if let (Some(name), Some(id)) = (name, id) {
                    extensions.insert(name.to_string(), id);
                }
            }
        }

        Ok(Self {
            extensions,
            client: value.get_str(b"v").map(String::from),
            port: value.get_int(b"p"),
            yourip: value.get_bytes(b"yourip").cloned(),
            reqq: value.get_int(b"reqq"),
            metadata_size: value.get_int(b"metadata_size"),
            upload_only: value.get_int::<i64>(b"upload_only").is_some_and(|v| v != 0),
        })
    }
}

/// An extended message body this client decodes and applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionMessage {
    DontHave { piece: u32 },
    Pex(PexMessage),
    UploadOnly(bool),
}

impl ExtensionMessage {
    pub fn extension_type(&self) -> ExtensionType {
        match self {
            ExtensionMessage::DontHave { .. } => ExtensionType::LtDonthave,
            ExtensionMessage::Pex(_) => ExtensionType::UtPex,
            ExtensionMessage::UploadOnly(_) => ExtensionType::UploadOnly,
        }
    }

    /// Decodes `body` as a message of `ext`. `Ok(None)` for extensions
    /// that are advertised but not decoded here.
    pub fn decode(ext: ExtensionType, body: &[u8]) -> Result<Option<Self>, PeerError> {
        let message = match ext {
            ExtensionType::LtDonthave => {
                let piece: [u8; 4] = body.try_into().map_err(|_| {
                    PeerError::InvalidMessage(format!("dont_have body is {} bytes", body.len()))
                })?;
                ExtensionMessage::DontHave {
                    piece: u32::from_be_bytes(piece),
                }
            }
            ExtensionType::UtPex => ExtensionMessage::Pex(PexMessage::decode(body)?),
            ExtensionType::UploadOnly => match body.first() {
                Some(&flag) => ExtensionMessage::UploadOnly(flag != 0),
                None => return Err(PeerError::InvalidMessage("empty upload_only".into())),
            },
            ExtensionType::UtMetadata | ExtensionType::UtHolepunch => return Ok(None),
        };
        Ok(Some(message))
    }

    pub fn encode(&self) -> Bytes {
        match self {
            ExtensionMessage::DontHave { piece } => Bytes::copy_from_slice(&piece.to_be_bytes()),
            ExtensionMessage::Pex(pex) => pex.encode(),
            ExtensionMessage::UploadOnly(flag) => Bytes::copy_from_slice(&[u8::from(*flag)]),
        }
    }
}

/// Frames an extended message: `[len:4][20][id][body]`.
pub fn frame(id: u8, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(6 + body.len());
    buf.put_u32(2 + body.len() as u32);
    buf.put_u8(EXTENDED_MESSAGE_ID);
    buf.put_u8(id);
    buf.put_slice(body);
    buf.freeze()
}

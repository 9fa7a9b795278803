use super::error::DhtError;
use super::node::{NodeId, NodeSession, COMPACT_NODE_LEN};
use crate::bencode::{decode, encode, DictBuilder, Value};
use crate::codec::{decode_compact_ipv4, decode_compact_ipv6, IPV4_PEER_LEN, IPV6_PEER_LEN};
use crate::torrent::InfoHash;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::net::SocketAddr;

pub type TransactionId = Bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DhtQuery {
    Ping,
    GetPeers { info_hash: InfoHash },
}

impl DhtQuery {
    pub fn name(&self) -> &'static str {
        match self {
            DhtQuery::Ping => "ping",
            DhtQuery::GetPeers { .. } => "get_peers",
        }
    }
}

/// An outgoing KRPC query.
#[derive(Debug, Clone)]
pub struct KrpcMessage {
    pub transaction_id: TransactionId,
    pub sender_id: NodeId,
    pub query: DhtQuery,
}

impl KrpcMessage {
    pub fn ping(transaction_id: TransactionId, our_id: &NodeId) -> Self {
        Self {
            transaction_id,
            sender_id: *our_id,
            query: DhtQuery::Ping,
        }
    }

    pub fn get_peers(transaction_id: TransactionId, our_id: &NodeId, info_hash: InfoHash) -> Self {
        Self {
            transaction_id,
            sender_id: *our_id,
            query: DhtQuery::GetPeers { info_hash },
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let args = DictBuilder::new().entry("id", &self.sender_id.as_bytes()[..]);
        let args = match &self.query {
            DhtQuery::Ping => args,
            DhtQuery::GetPeers { info_hash } => {
                args.entry("info_hash", &info_hash.as_bytes()[..])
            }
        };

        let message = DictBuilder::new()
            .entry("t", self.transaction_id.clone())
            .entry("y", "q")
            .entry("q", self.query.name())
            .entry("a", args.build())
            .build();

        encode(&message)
    }
}

/// A parsed KRPC response to one of our queries.
#[derive(Debug, Clone)]
pub struct KrpcResponse {
    pub transaction_id: TransactionId,
    pub sender_id: NodeId,
    /// Peers for the queried info hash (`values`).
    pub values: Vec<SocketAddr>,
    /// Closer nodes (`nodes`), unverified.
    pub nodes: Vec<NodeSession>,
    pub token: Option<Bytes>,
}

impl KrpcResponse {
    /// Parses a datagram. Queries from other nodes and error replies are
    /// reported as errors; the caller only consumes responses.
    pub fn parse(data: &[u8]) -> Result<Self, DhtError> {
        let value = decode(data)?;

        let dict = value
            .as_dict()
            .ok_or_else(|| DhtError::InvalidMessage("expected dict".into()))?;

        let transaction_id = dict
            .get(b"t".as_slice())
            .and_then(|v| v.as_bytes())
            .cloned()
            .ok_or_else(|| DhtError::InvalidMessage("missing transaction id".into()))?;

        let msg_type = dict
            .get(b"y".as_slice())
            .and_then(|v| v.as_str())
            .ok_or_else(|| DhtError::InvalidMessage("missing message type".into()))?;

        match msg_type {
            "r" => Self::parse_response(transaction_id, dict),
            "e" => Err(Self::parse_error(dict)),
            "q" => Err(DhtError::InvalidMessage("unsolicited query".into())),
            _ => Err(DhtError::InvalidMessage(format!(
                "unknown message type: {}",
                msg_type
            ))),
        }
    }

    fn parse_response(
        transaction_id: TransactionId,
        dict: &BTreeMap<Bytes, Value>,
    ) -> Result<Self, DhtError> {
        let resp = dict
            .get(b"r".as_slice())
            .and_then(|v| v.as_dict())
            .ok_or_else(|| DhtError::InvalidMessage("missing response dict".into()))?;

        let sender_id = resp
            .get(b"id".as_slice())
            .and_then(|v| v.as_bytes())
            .ok_or_else(|| DhtError::InvalidMessage("missing id in response".into()))
            .and_then(|b| NodeId::from_bytes(b))?;

        let nodes = resp
            .get(b"nodes".as_slice())
            .and_then(|v| v.as_bytes())
            .map(|data| {
                data.chunks_exact(COMPACT_NODE_LEN)
                    .filter_map(NodeSession::from_compact)
                    .collect()
            })
            .unwrap_or_default();

        let values = resp
            .get(b"values".as_slice())
            .and_then(|v| v.as_list())
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_bytes())
                    .flat_map(|b| match b.len() {
                        IPV4_PEER_LEN => decode_compact_ipv4(b),
                        IPV6_PEER_LEN => decode_compact_ipv6(b),
                        _ => Default::default(),
                    })
                    .map(|(ip, port)| SocketAddr::new(ip, port))
                    .collect()
            })
            .unwrap_or_default();

        let token = resp
            .get(b"token".as_slice())
            .and_then(|v| v.as_bytes())
            .cloned();

        Ok(Self {
            transaction_id,
            sender_id,
            values,
            nodes,
            token,
        })
    }

    fn parse_error(dict: &BTreeMap<Bytes, Value>) -> DhtError {
        let Some(error) = dict.get(b"e".as_slice()).and_then(|v| v.as_list()) else {
            return DhtError::InvalidMessage("missing error list".into());
        };

        let code = error.first().and_then(|v| v.as_integer()).unwrap_or(0);

        let message = error
            .get(1)
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
            .to_string();

        DhtError::Remote { code, message }
    }
}

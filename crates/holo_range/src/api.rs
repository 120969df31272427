//! Typed commands, routing headers and the `Call` envelope.
//!
//! Every command kind carries a `RequestHeader` with its target span and the
//! optional routing hint (range id + replica). Every reply carries a
//! `ResponseHeader` whose `error` slot is how the routing layer reports
//! failures, so a range-key mismatch can be surfaced uniformly for any kind.

use std::collections::BTreeSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, Timestamp};
use crate::descriptor::{NodeId, RangeId, Replica};
use crate::error::{Error, Result};
use crate::kv::{KeyValue, WriteOp};

/// Idempotency token for read-write commands. Zero means unassigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientCmdId {
    pub wall_time: i64,
    pub random: i64,
}

impl ClientCmdId {
    pub fn is_empty(&self) -> bool {
        self.wall_time == 0 && self.random == 0
    }
}

/// Set of node ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSet {
    nodes: BTreeSet<NodeId>,
}

impl NodeSet {
    /// Mark `node_id` as certain.
    pub fn add(&mut self, node_id: NodeId) {
        self.nodes.insert(node_id);
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains(&node_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl FromIterator<NodeId> for NodeSet {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}

/// Transaction state visible to the routing layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub name: String,
    pub timestamp: Timestamp,
    /// Upper bound of the clock-uncertainty window.
    pub max_timestamp: Timestamp,
    /// Nodes already read from at `timestamp`; no uncertainty applies to them.
    pub certain_nodes: NodeSet,
}

impl Transaction {
    /// Transaction at `timestamp` whose uncertainty window spans `max_offset_nanos`.
    pub fn new(name: impl Into<String>, timestamp: Timestamp, max_offset_nanos: i64) -> Self {
        Self {
            name: name.into(),
            timestamp,
            max_timestamp: timestamp.add(max_offset_nanos, 0),
            certain_nodes: NodeSet::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    pub key: Vec<u8>,
    /// Exclusive end of the span; empty for single-key commands.
    pub end_key: Vec<u8>,
    pub timestamp: Timestamp,
    pub cmd_id: ClientCmdId,
    pub range_id: RangeId,
    pub replica: Replica,
    pub txn: Option<Transaction>,
}

impl RequestHeader {
    /// Header for a single-key command.
    pub fn for_key(key: &[u8]) -> Self {
        Self {
            key: key.to_vec(),
            ..Self::default()
        }
    }

    /// Header for a span command over `[start, end)`.
    pub fn for_span(start: &[u8], end: &[u8]) -> Self {
        Self {
            key: start.to_vec(),
            end_key: end.to_vec(),
            ..Self::default()
        }
    }

    /// A routing hint lets the sender skip key lookup.
    pub fn has_routing_hint(&self) -> bool {
        self.range_id != 0 && !self.replica.is_unset()
    }

    /// Pin the call to `range_id` on `replica`.
    pub fn set_routing_hint(&mut self, range_id: RangeId, replica: Replica) {
        self.range_id = range_id;
        self.replica = replica;
    }

    /// Drop the hint so the next attempt resolves the key again.
    pub fn clear_routing_hint(&mut self) {
        self.range_id = 0;
        self.replica = Replica::default();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeader {
    pub error: Option<Error>,
    pub timestamp: Timestamp,
}

/// Closed set of command kinds understood by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Get,
    Put,
    ConditionalPut,
    Delete,
    Increment,
    Scan,
    Batch,
}

impl Method {
    pub fn name(&self) -> &'static str {
        match self {
            Method::Get => "Get",
            Method::Put => "Put",
            Method::ConditionalPut => "ConditionalPut",
            Method::Delete => "Delete",
            Method::Increment => "Increment",
            Method::Scan => "Scan",
            Method::Batch => "Batch",
        }
    }

    /// Read-only commands are never cached and never get a command id.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Method::Get | Method::Scan)
    }

    pub fn is_write(&self) -> bool {
        !self.is_read_only()
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRequest {
    pub header: RequestHeader,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutRequest {
    pub header: RequestHeader,
    pub value: Vec<u8>,
}

/// Put that only applies when the current value equals `exp_value`
/// (`None` expects the key to be absent).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalPutRequest {
    pub header: RequestHeader,
    pub value: Vec<u8>,
    pub exp_value: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub header: RequestHeader,
}

/// Add `increment` to the integer stored at the key (missing keys count as 0).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementRequest {
    pub header: RequestHeader,
    pub increment: i64,
}

/// Engine writes committed together or not at all.
///
/// The header names the first written key; every key must be hosted by the
/// executing store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub header: RequestHeader,
    pub writes: Vec<WriteOp>,
}

/// Scan `[key, end_key)`. `max_results == 0` means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub header: RequestHeader,
    pub max_results: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResponse {
    pub header: ResponseHeader,
    pub value: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutResponse {
    pub header: ResponseHeader,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalPutResponse {
    pub header: ResponseHeader,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub header: ResponseHeader,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementResponse {
    pub header: ResponseHeader,
    pub new_value: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResponse {
    pub header: ResponseHeader,
    pub rows: Vec<KeyValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub header: ResponseHeader,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Get(GetRequest),
    Put(PutRequest),
    ConditionalPut(ConditionalPutRequest),
    Delete(DeleteRequest),
    Increment(IncrementRequest),
    Scan(ScanRequest),
    Batch(BatchRequest),
}

impl Request {
    pub fn method(&self) -> Method {
        match self {
            Request::Get(_) => Method::Get,
            Request::Put(_) => Method::Put,
            Request::ConditionalPut(_) => Method::ConditionalPut,
            Request::Delete(_) => Method::Delete,
            Request::Increment(_) => Method::Increment,
            Request::Scan(_) => Method::Scan,
            Request::Batch(_) => Method::Batch,
        }
    }

    pub fn header(&self) -> &RequestHeader {
        match self {
            Request::Get(r) => &r.header,
            Request::Put(r) => &r.header,
            Request::ConditionalPut(r) => &r.header,
            Request::Delete(r) => &r.header,
            Request::Increment(r) => &r.header,
            Request::Scan(r) => &r.header,
            Request::Batch(r) => &r.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut RequestHeader {
        match self {
            Request::Get(r) => &mut r.header,
            Request::Put(r) => &mut r.header,
            Request::ConditionalPut(r) => &mut r.header,
            Request::Delete(r) => &mut r.header,
            Request::Increment(r) => &mut r.header,
            Request::Scan(r) => &mut r.header,
            Request::Batch(r) => &mut r.header,
        }
    }

    /// Empty reply of the matching kind.
    pub fn create_reply(&self) -> Response {
        match self {
            Request::Get(_) => Response::Get(GetResponse::default()),
            Request::Put(_) => Response::Put(PutResponse::default()),
            Request::ConditionalPut(_) => {
                Response::ConditionalPut(ConditionalPutResponse::default())
            }
            Request::Delete(_) => Response::Delete(DeleteResponse::default()),
            Request::Increment(_) => Response::Increment(IncrementResponse::default()),
            Request::Scan(_) => Response::Scan(ScanResponse::default()),
            Request::Batch(_) => Response::Batch(BatchResponse::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Get(GetResponse),
    Put(PutResponse),
    ConditionalPut(ConditionalPutResponse),
    Delete(DeleteResponse),
    Increment(IncrementResponse),
    Scan(ScanResponse),
    Batch(BatchResponse),
}

impl Response {
    pub fn method(&self) -> Method {
        match self {
            Response::Get(_) => Method::Get,
            Response::Put(_) => Method::Put,
            Response::ConditionalPut(_) => Method::ConditionalPut,
            Response::Delete(_) => Method::Delete,
            Response::Increment(_) => Method::Increment,
            Response::Scan(_) => Method::Scan,
            Response::Batch(_) => Method::Batch,
        }
    }

    pub fn header(&self) -> &ResponseHeader {
        match self {
            Response::Get(r) => &r.header,
            Response::Put(r) => &r.header,
            Response::ConditionalPut(r) => &r.header,
            Response::Delete(r) => &r.header,
            Response::Increment(r) => &r.header,
            Response::Scan(r) => &r.header,
            Response::Batch(r) => &r.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut ResponseHeader {
        match self {
            Response::Get(r) => &mut r.header,
            Response::Put(r) => &mut r.header,
            Response::ConditionalPut(r) => &mut r.header,
            Response::Delete(r) => &mut r.header,
            Response::Increment(r) => &mut r.header,
            Response::Scan(r) => &mut r.header,
            Response::Batch(r) => &mut r.header,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        self.header().error.as_ref()
    }
}

/// A pending command: typed arguments plus the reply slot filled by routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub args: Request,
    pub reply: Response,
}

impl Call {
    /// Wrap `args` with an empty reply of the matching kind.
    pub fn new(args: Request) -> Self {
        let reply = args.create_reply();
        Self { args, reply }
    }

    pub fn get(key: &[u8]) -> Self {
        Self::new(Request::Get(GetRequest {
            header: RequestHeader::for_key(key),
        }))
    }

    pub fn put(key: &[u8], value: &[u8]) -> Self {
        Self::new(Request::Put(PutRequest {
            header: RequestHeader::for_key(key),
            value: value.to_vec(),
        }))
    }

    pub fn conditional_put(key: &[u8], value: &[u8], exp_value: Option<&[u8]>) -> Self {
        Self::new(Request::ConditionalPut(ConditionalPutRequest {
            header: RequestHeader::for_key(key),
            value: value.to_vec(),
            exp_value: exp_value.map(<[u8]>::to_vec),
        }))
    }

    pub fn delete(key: &[u8]) -> Self {
        Self::new(Request::Delete(DeleteRequest {
            header: RequestHeader::for_key(key),
        }))
    }

    pub fn increment(key: &[u8], increment: i64) -> Self {
        Self::new(Request::Increment(IncrementRequest {
            header: RequestHeader::for_key(key),
            increment,
        }))
    }

    pub fn scan(start: &[u8], end: &[u8], max_results: usize) -> Self {
        Self::new(Request::Scan(ScanRequest {
            header: RequestHeader::for_span(start, end),
            max_results,
        }))
    }

    /// Atomic batch routed by its first written key.
    pub fn batch(writes: Vec<WriteOp>) -> Self {
        let anchor = writes.first().map(WriteOp::key).unwrap_or_default();
        Self::new(Request::Batch(BatchRequest {
            header: RequestHeader::for_key(anchor),
            writes,
        }))
    }

    pub fn method(&self) -> Method {
        self.args.method()
    }

    pub fn header(&self) -> &RequestHeader {
        self.args.header()
    }

    pub fn header_mut(&mut self) -> &mut RequestHeader {
        self.args.header_mut()
    }

    pub fn error(&self) -> Option<&Error> {
        self.reply.error()
    }

    /// Record `err` on the reply header.
    pub fn set_error(&mut self, err: Error) {
        self.reply.header_mut().error = Some(err);
    }

    pub fn clear_error(&mut self) {
        self.reply.header_mut().error = None;
    }

    /// Reply error as a `Result`.
    pub fn result(&self) -> Result<()> {
        match self.error() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Assign a fresh client command id to a read-write call.
    ///
    /// Read-only calls keep an empty id; they are safe to replay.
    pub fn reset_client_cmd_id(&mut self, clock: &dyn Clock) {
        if !self.method().is_write() {
            return;
        }
        let mut random: i64 = rand::thread_rng().gen();
        if random == 0 {
            random = 1;
        }
        self.header_mut().cmd_id = ClientCmdId {
            wall_time: clock.now().wall_time,
            random,
        };
    }
}

//! Thin KV client over any `KvSender`.

use std::sync::Arc;

use crate::addressing::{addressing_batch, MetaOp};
use crate::api::{Call, Response};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::kv::KeyValue;
use crate::local_sender::KvSender;

/// Client that stamps command ids and submits calls through a sender.
#[derive(Clone)]
pub struct Db {
    sender: Arc<dyn KvSender>,
    clock: Arc<dyn Clock>,
}

impl Db {
    /// Client over `sender`, stamping command ids from `clock`.
    pub fn new(sender: Arc<dyn KvSender>, clock: Arc<dyn Clock>) -> Self {
        Self { sender, clock }
    }

    /// Send one call and return its reply error.
    ///
    /// Read-write calls without a command id get one first, so a replay of the
    /// same `Call` value is answered from the store's reply cache.
    pub fn send(&self, call: &mut Call) -> Result<()> {
        if call.header().cmd_id.is_empty() {
            call.reset_client_cmd_id(self.clock.as_ref());
        }
        self.sender.send(call);
        call.result()
    }

    /// Send calls in order, stopping at the first failure.
    ///
    /// The failing call's error is returned unchanged; calls after it are not
    /// sent. Calls that already succeeded stay applied.
    pub fn run(&self, mut calls: Vec<Call>) -> Result<Vec<Call>> {
        for (idx, call) in calls.iter_mut().enumerate() {
            if let Err(err) = self.send(call) {
                tracing::debug!(index = idx, method = %call.method(), error = %err, "batch stopped");
                return Err(err);
            }
        }
        Ok(calls)
    }

    /// Read `key`; `None` when absent.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut call = Call::get(key);
        self.send(&mut call)?;
        match call.reply {
            Response::Get(resp) => Ok(resp.value),
            other => Err(unexpected_reply(&other)),
        }
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.send(&mut Call::put(key, value))
    }

    pub fn conditional_put(&self, key: &[u8], value: &[u8], exp_value: Option<&[u8]>) -> Result<()> {
        self.send(&mut Call::conditional_put(key, value, exp_value))
    }

    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.send(&mut Call::delete(key))
    }

    /// Add `increment` to the integer at `key` and return the new value.
    pub fn increment(&self, key: &[u8], increment: i64) -> Result<i64> {
        let mut call = Call::increment(key, increment);
        self.send(&mut call)?;
        match call.reply {
            Response::Increment(resp) => Ok(resp.new_value),
            other => Err(unexpected_reply(&other)),
        }
    }

    /// Rows in `[start, end)`; the span must sit inside one range.
    pub fn scan(&self, start: &[u8], end: &[u8], max_results: usize) -> Result<Vec<KeyValue>> {
        let mut call = Call::scan(start, end, max_results);
        self.send(&mut call)?;
        match call.reply {
            Response::Scan(resp) => Ok(resp.rows),
            other => Err(unexpected_reply(&other)),
        }
    }

    /// Write addressing operations as one atomic batch.
    ///
    /// Either every record changes or none does; the batch is executed by the
    /// store hosting the first written key.
    pub fn apply_meta_ops(&self, ops: Vec<MetaOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let count = ops.len();
        self.send(&mut addressing_batch(ops)?)?;
        tracing::debug!(ops = count, "applied addressing ops");
        Ok(())
    }
}

fn unexpected_reply(reply: &Response) -> Error {
    Error::InvalidRequest(format!("unexpected {} reply", reply.method()))
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db").finish_non_exhaustive()
    }
}

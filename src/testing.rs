//! In-crate test doubles for the cache, origin, and spawner seams.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::background::{Spawner, Task};
use crate::cache::{BackendFailure, CacheBackend, Lookup, Removal};
use crate::error::{CacheOp, OriginFetchError};
use crate::http::{Headers, StatusCode};
use crate::origin::{OriginClient, OriginResponse};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Get(String),
    Set(String, Duration),
    Delete(String),
}

/// Map-backed cache that logs every call and can be told to fail.
#[derive(Default)]
pub struct RecordingBackend {
    entries: Mutex<HashMap<String, Bytes>>,
    ops: Mutex<Vec<Op>>,
    failing: Mutex<HashSet<CacheOp>>,
    failing_keys: Mutex<HashSet<(CacheOp, String)>>,
}

impl RecordingBackend {
    pub fn insert(&self, key: &str, body: &'static [u8]) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_owned(), Bytes::from_static(body));
    }

    pub fn entry(&self, key: &str) -> Option<Bytes> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    pub fn fail(&self, op: CacheOp) {
        self.failing.lock().unwrap().insert(op);
    }

    /// Fails `op` for `key` only; other keys keep working.
    pub fn fail_key(&self, op: CacheOp, key: &str) {
        self.failing_keys
            .lock()
            .unwrap()
            .insert((op, key.to_owned()));
    }

    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<Op> {
        self.ops()
            .into_iter()
            .filter(|op| matches!(op, Op::Set(..)))
            .collect()
    }

    fn check(&self, op: CacheOp, key: &str) -> Result<(), BackendFailure> {
        let failing = self.failing.lock().unwrap().contains(&op)
            || self
                .failing_keys
                .lock()
                .unwrap()
                .contains(&(op, key.to_owned()));
        if failing {
            Err(BackendFailure::new(format!("injected {op} failure")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn get(&self, key: &str) -> Result<Lookup, BackendFailure> {
        self.ops.lock().unwrap().push(Op::Get(key.to_owned()));
        self.check(CacheOp::Get, key)?;
        Ok(match self.entry(key) {
            Some(body) => Lookup::Hit(body),
            None => Lookup::Miss,
        })
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), BackendFailure> {
        self.ops.lock().unwrap().push(Op::Set(key.to_owned(), ttl));
        self.check(CacheOp::Set, key)?;
        self.entries.lock().unwrap().insert(key.to_owned(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<Removal, BackendFailure> {
        self.ops.lock().unwrap().push(Op::Delete(key.to_owned()));
        self.check(CacheOp::Delete, key)?;
        Ok(match self.entries.lock().unwrap().remove(key) {
            Some(_) => Removal::Deleted,
            None => Removal::NotFound,
        })
    }
}

enum Reply {
    Body(Bytes),
    Status(u16),
    Down,
}

/// Origin that answers every request the same way and counts calls.
pub struct StubOrigin {
    reply: Mutex<Reply>,
    urls: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl StubOrigin {
    fn with(reply: Reply) -> Self {
        Self {
            reply: Mutex::new(reply),
            urls: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn serving(body: &'static [u8]) -> Self {
        Self::with(Reply::Body(Bytes::from_static(body)))
    }

    pub fn status(code: u16) -> Self {
        Self::with(Reply::Status(code))
    }

    pub fn down() -> Self {
        Self::with(Reply::Down)
    }

    pub fn go_down(&self) {
        *self.reply.lock().unwrap() = Reply::Down;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OriginClient for StubOrigin {
    async fn fetch(&self, url: &str) -> Result<OriginResponse, OriginFetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_owned());
        match &*self.reply.lock().unwrap() {
            Reply::Body(body) => {
                let mut headers = Headers::new();
                headers.insert("Content-Type", "application/json");
                headers.insert("Transfer-Encoding", "chunked");
                Ok(OriginResponse {
                    status: StatusCode::OK,
                    headers,
                    body: body.clone(),
                })
            }
            Reply::Status(code) => Ok(OriginResponse {
                status: StatusCode::from_u16(*code).unwrap(),
                headers: Headers::new(),
                body: Bytes::from_static(b"upstream says no"),
            }),
            Reply::Down => Err(OriginFetchError::Transport {
                url: url.to_owned(),
                source: "connection refused".into(),
            }),
        }
    }
}

/// Queues spawned tasks so a test decides when they run.
#[derive(Default)]
pub struct ManualSpawner {
    tasks: Mutex<Vec<(&'static str, Task)>>,
}

impl ManualSpawner {
    pub fn pending(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tasks.lock().unwrap().iter().map(|(n, _)| *n).collect()
    }

    /// Runs queued tasks in spawn order, including any they spawn.
    pub async fn run_all(&self) {
        loop {
            let next = {
                let mut tasks = self.tasks.lock().unwrap();
                if tasks.is_empty() {
                    None
                } else {
                    Some(tasks.remove(0))
                }
            };
            match next {
                Some((_, task)) => task.await,
                None => break,
            }
        }
    }
}

impl Spawner for ManualSpawner {
    fn spawn(&self, name: &'static str, task: Task) {
        self.tasks.lock().unwrap().push((name, task));
    }
}

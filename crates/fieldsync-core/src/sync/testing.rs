//! In-process remote store for engine and scheduler tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::Notify;

use crate::models::RegistrationId;
use crate::remote::{RemoteError, RemoteResult, RemoteRow, RemoteStore};
use crate::util::parse_timestamp;

#[derive(Default)]
struct State {
    rows: BTreeMap<String, Value>,
    rejections: HashMap<RegistrationId, RemoteError>,
    select_error: Option<RemoteError>,
    upserted: Vec<RegistrationId>,
}

/// Remote table kept in memory, keyed by `uuid` like the real upsert target.
#[derive(Clone, Default)]
pub struct FakeRemote {
    state: Arc<Mutex<State>>,
    calls: Arc<AtomicUsize>,
    gate: Option<Arc<Notify>>,
    select_gate: Option<Arc<Notify>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every upsert waits for a `notify_one` on the returned handle.
    pub fn gated() -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let remote = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::default()
        };
        (remote, gate)
    }

    /// Every select waits for a `notify_one` on the returned handle.
    pub fn gated_selects() -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let remote = Self {
            select_gate: Some(Arc::clone(&gate)),
            ..Self::default()
        };
        (remote, gate)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Rows as stored remotely, in uuid order.
    pub fn rows(&self) -> Vec<Value> {
        self.state.lock().unwrap().rows.values().cloned().collect()
    }

    pub fn row(&self, uuid: &RegistrationId) -> Option<Value> {
        self.state.lock().unwrap().rows.get(&uuid.to_string()).cloned()
    }

    /// Uuids of every accepted upsert, in call order.
    pub fn upserted(&self) -> Vec<RegistrationId> {
        self.state.lock().unwrap().upserted.clone()
    }

    /// Put a raw row on the remote side, as another device would.
    pub fn seed(&self, row: Value) {
        let uuid = row["uuid"].as_str().unwrap_or_default().to_string();
        self.state.lock().unwrap().rows.insert(uuid, row);
    }

    pub fn reject(&self, uuid: RegistrationId, error: RemoteError) {
        self.state.lock().unwrap().rejections.insert(uuid, error);
    }

    pub fn accept(&self, uuid: &RegistrationId) {
        self.state.lock().unwrap().rejections.remove(uuid);
    }

    pub fn fail_selects(&self, error: Option<RemoteError>) {
        self.state.lock().unwrap().select_error = error;
    }
}

impl RemoteStore for FakeRemote {
    async fn upsert(&self, _table: &str, row: &RemoteRow) -> RemoteResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.rejections.get(&row.uuid) {
            return Err(error.clone());
        }
        let json = row
            .to_json()
            .map_err(|error| RemoteError::Permanent(error.to_string()))?;
        state.rows.insert(row.uuid.to_string(), json);
        state.upserted.push(row.uuid);
        Ok(())
    }

    async fn select_updated_since(&self, _table: &str, since: i64) -> RemoteResult<Vec<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.select_gate {
            gate.notified().await;
        }

        let state = self.state.lock().unwrap();
        if let Some(error) = &state.select_error {
            return Err(error.clone());
        }
        let mut rows: Vec<(i64, Value)> = state
            .rows
            .values()
            .filter_map(|row| {
                let updated_at = row.get("updated_at").and_then(parse_timestamp)?;
                (updated_at > since).then(|| (updated_at, row.clone()))
            })
            .collect();
        rows.sort_by_key(|(updated_at, _)| *updated_at);
        Ok(rows.into_iter().map(|(_, row)| row).collect())
    }
}

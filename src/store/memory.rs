use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::domain::{Phone, PhoneDraft, PhoneId};

use super::{Operation, PhoneStore, RemoteError};

/// Status reported by injected failures.
const INJECTED_STATUS: u16 = 500;

/// Internal mutable state behind the RwLock.
#[derive(Debug, Default)]
struct InnerState {
    records: BTreeMap<PhoneId, PhoneDraft>,
    next_seq: u64,
    /// Pending one-shot failures per operation.
    fail_next: BTreeMap<Operation, u32>,
    /// Operations that fail until switched off.
    failing: BTreeMap<Operation, bool>,
    latency: BTreeMap<Operation, Duration>,
    calls: Vec<Operation>,
}

impl InnerState {
    /// Logs the call and decides whether it fails.
    fn begin(&mut self, op: Operation) -> Result<(), RemoteError> {
        self.calls.push(op);
        if let Some(remaining) = self.fail_next.get_mut(&op) {
            *remaining -= 1;
            if *remaining == 0 {
                self.fail_next.remove(&op);
            }
            return Err(injected(op));
        }
        if self.failing.get(&op).copied().unwrap_or(false) {
            return Err(injected(op));
        }
        Ok(())
    }

    /// Push-style id: fixed width so lexical order is creation order.
    fn assign_id(&mut self) -> PhoneId {
        self.next_seq += 1;
        PhoneId::new(format!("-P{:012}", self.next_seq))
    }
}

fn injected(op: Operation) -> RemoteError {
    RemoteError::new(Some(INJECTED_STATUS), format!("injected {op} failure"))
}

/// In-memory implementation of the [`PhoneStore`] trait.
///
/// Mirrors the REST collection semantics: merges create missing records,
/// deleting a missing record succeeds, listing returns records ordered by id.
/// Clones share state, so a test can keep a handle for failure injection
/// after moving one into a cache.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<InnerState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(InnerState::default())),
        }
    }

    /// Seeds the store. Ids are kept as given.
    pub fn with_phones(phones: impl IntoIterator<Item = Phone>) -> Self {
        let records = phones
            .into_iter()
            .map(|phone| {
                let draft = phone.draft();
                (phone.id, draft)
            })
            .collect();
        Self {
            state: Arc::new(RwLock::new(InnerState {
                records,
                ..InnerState::default()
            })),
        }
    }

    /// Makes the next call of `op` fail once.
    pub async fn fail_next(&self, op: Operation) {
        *self.state.write().await.fail_next.entry(op).or_insert(0) += 1;
    }

    /// Makes every call of `op` fail until switched off.
    pub async fn set_failing(&self, op: Operation, failing: bool) {
        self.state.write().await.failing.insert(op, failing);
    }

    /// Delays every call of `op` before it touches the records.
    pub async fn set_latency(&self, op: Operation, latency: Duration) {
        self.state.write().await.latency.insert(op, latency);
    }

    /// Every call received so far, in arrival order.
    pub async fn calls(&self) -> Vec<Operation> {
        self.state.read().await.calls.clone()
    }

    /// The records as currently stored, ordered by id.
    pub async fn snapshot(&self) -> Vec<Phone> {
        let state = self.state.read().await;
        state
            .records
            .iter()
            .map(|(id, draft)| draft.clone().with_id(id.clone()))
            .collect()
    }

    async fn begin(&self, op: Operation) -> Result<(), RemoteError> {
        let (outcome, latency) = {
            let mut state = self.state.write().await;
            let outcome = state.begin(op);
            (outcome, state.latency.get(&op).copied())
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        outcome
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PhoneStore for InMemoryStore {
    async fn add(&self, draft: &PhoneDraft) -> Result<Phone, RemoteError> {
        self.begin(Operation::Add).await?;
        let mut state = self.state.write().await;
        let id = state.assign_id();
        state.records.insert(id.clone(), draft.clone());
        Ok(draft.clone().with_id(id))
    }

    async fn update(&self, phone: &Phone) -> Result<Phone, RemoteError> {
        self.begin(Operation::Update).await?;
        let mut state = self.state.write().await;
        state.records.insert(phone.id.clone(), phone.draft());
        Ok(phone.clone())
    }

    async fn list(&self) -> Result<Vec<Phone>, RemoteError> {
        self.begin(Operation::List).await?;
        Ok(self.snapshot().await)
    }

    async fn remove(&self, id: &PhoneId) -> Result<(), RemoteError> {
        self.begin(Operation::Remove).await?;
        self.state.write().await.records.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(model: &str) -> PhoneDraft {
        PhoneDraft::new("Acme", model, 100.0)
    }

    #[tokio::test]
    async fn add_assigns_ordered_ids() {
        let store = InMemoryStore::new();
        let a = store.add(&draft("A")).await.unwrap();
        let b = store.add(&draft("B")).await.unwrap();
        assert!(a.id < b.id);
        assert!(!a.id.is_provisional());

        let listed = store.list().await.unwrap();
        let models: Vec<_> = listed.iter().map(|p| p.model.as_str()).collect();
        assert_eq!(models, ["A", "B"]);
    }

    #[tokio::test]
    async fn empty_store_lists_nothing() {
        let store = InMemoryStore::new();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_merges_and_remove_deletes() {
        let store = InMemoryStore::with_phones([Phone::new("1", "Acme", "X", 100.0)]);
        store
            .update(&Phone::new("1", "Acme", "Y", 120.0))
            .await
            .unwrap();
        let listed = store.list().await.unwrap();
        assert_eq!(listed[0].model, "Y");
        assert_eq!(listed[0].price, 120.0);

        store.remove(&PhoneId::new("1")).await.unwrap();
        assert!(store.snapshot().await.is_empty());
        // Deleting again is not an error.
        store.remove(&PhoneId::new("1")).await.unwrap();
    }

    #[tokio::test]
    async fn fail_next_fails_exactly_once() {
        let store = InMemoryStore::new();
        store.fail_next(Operation::Add).await;

        let err = store.add(&draft("A")).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert!(store.snapshot().await.is_empty());

        store.add(&draft("A")).await.unwrap();
        assert_eq!(store.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn set_failing_persists_until_cleared() {
        let store = InMemoryStore::new();
        store.set_failing(Operation::List, true).await;
        assert!(store.list().await.is_err());
        assert!(store.list().await.is_err());
        store.set_failing(Operation::List, false).await;
        assert!(store.list().await.is_ok());
    }

    #[tokio::test]
    async fn calls_are_logged_in_order() {
        let store = InMemoryStore::new();
        let phone = store.add(&draft("A")).await.unwrap();
        store.list().await.unwrap();
        store.remove(&phone.id).await.unwrap();
        assert_eq!(
            store.calls().await,
            [Operation::Add, Operation::List, Operation::Remove]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn latency_orders_completion() {
        let store = InMemoryStore::new();
        store
            .set_latency(Operation::Add, Duration::from_millis(50))
            .await;

        let start = tokio::time::Instant::now();
        store.add(&draft("slow")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));

        // Unaffected operation completes without delay.
        let start = tokio::time::Instant::now();
        store.list().await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}

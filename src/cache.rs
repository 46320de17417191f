//! Optimistic view of the phone collection.
//!
//! [`PhoneCache`] owns the [`CollectionState`] and is the only thing that
//! changes it. Every mutating call applies its edit locally and notifies
//! observers before returning; the returned [`Pending`] performs the store
//! call and, once it settles, either reconciles the edit or rolls it back and
//! switches the state to `Failure`.
//!
//! The cache is single-threaded (`!Send`). Pending handles are `'static` and
//! can be awaited, joined, or spawned on a `tokio::task::LocalSet`; dropping
//! one before it finishes counts as a failed store call. Concurrent
//! operations are not coordinated: each settles against the list as it is at
//! that moment, so resolution order follows network completion order.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::{CollectionState, Phone, PhoneDraft, PhoneId};
use crate::schema::validation::{self, ValidationError};
use crate::store::{PhoneStore, RemoteError};

/// Reasons a cache operation is refused before anything changes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CacheError {
    #[error("collection is still loading")]
    NotReady,
    #[error("invalid phone: {0}")]
    Invalid(#[from] ValidationError),
    #[error("unknown phone: {0}")]
    UnknownPhone(PhoneId),
    #[error("phone {0} has not been confirmed by the store yet")]
    Provisional(PhoneId),
    #[error("cache has been disposed")]
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A registered observer.
///
/// Receives every state the cache produces, in order, starting with the
/// state current at subscription time. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    receiver: mpsc::UnboundedReceiver<CollectionState>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Waits for the next state. `None` once the cache is disposed or the
    /// subscription was removed and everything buffered has been read.
    pub async fn recv(&mut self) -> Option<CollectionState> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<CollectionState> {
        self.receiver.try_recv().ok()
    }

    /// Everything delivered so far and not yet read.
    pub fn drain(&mut self) -> Vec<CollectionState> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[derive(Default)]
struct Observers {
    next_id: u64,
    senders: Vec<(SubscriptionId, mpsc::UnboundedSender<CollectionState>)>,
}

/// The remote half of a cache operation.
///
/// Does nothing until polled. Never fails: store errors become a `Failure`
/// state. Dropping it before it completes settles the operation as a failed
/// store call, so the optimistic edit is rolled back and observers notified.
#[must_use = "the store call only happens when the pending operation is driven"]
pub struct Pending {
    id: Option<PhoneId>,
    future: Pin<Box<dyn Future<Output = ()>>>,
    abandon: Option<Box<dyn FnOnce()>>,
}

impl Pending {
    /// Pairs a store call with the closure that folds its outcome into the
    /// cache. The closure runs exactly once: with the outcome when the call
    /// completes, or with an abandonment error if the handle is dropped first.
    fn new<T, F>(
        id: Option<PhoneId>,
        call: impl Future<Output = Result<T, RemoteError>> + 'static,
        settle: F,
    ) -> Self
    where
        T: 'static,
        F: FnOnce(Result<T, RemoteError>) + 'static,
    {
        let slot = Rc::new(Cell::new(Some(settle)));
        let on_drop = Rc::clone(&slot);
        let future = async move {
            let outcome = call.await;
            if let Some(settle) = slot.take() {
                settle(outcome);
            }
        };
        Self {
            id,
            future: Box::pin(future),
            abandon: Some(Box::new(move || {
                if let Some(settle) = on_drop.take() {
                    settle(Err(RemoteError::transport(
                        "operation dropped before the store answered",
                    )));
                }
            })),
        }
    }

    /// The phone this operation concerns: the provisional id for an add,
    /// the target id for update and remove, `None` for a fetch.
    pub fn id(&self) -> Option<&PhoneId> {
        self.id.as_ref()
    }
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending").field("id", &self.id).finish()
    }
}

impl Future for Pending {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let poll = self.future.as_mut().poll(cx);
        if poll.is_ready() {
            self.abandon = None;
        }
        poll
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        // Unwinding may have left the state borrowed.
        if std::thread::panicking() {
            return;
        }
        if let Some(abandon) = self.abandon.take() {
            abandon();
        }
    }
}

struct Shared<S> {
    store: S,
    state: RefCell<CollectionState>,
    observers: RefCell<Observers>,
    /// Per-cache namespace for provisional ids.
    namespace: String,
    next_provisional: Cell<u64>,
    /// How each settled add ended: the confirmed phone, or `None` if it was
    /// rolled back. Used to bring older snapshots up to date.
    settled_adds: RefCell<HashMap<PhoneId, Option<Phone>>>,
    disposed: Cell<bool>,
}

impl<S> Shared<S> {
    fn notify(&self) {
        if self.disposed.get() {
            return;
        }
        let state = self.state.borrow().clone();
        self.observers
            .borrow_mut()
            .senders
            .retain(|(_, tx)| tx.send(state.clone()).is_ok());
    }

    fn next_provisional_id(&self) -> PhoneId {
        let sequence = self.next_provisional.get();
        self.next_provisional.set(sequence + 1);
        PhoneId::provisional(&self.namespace, sequence)
    }

    fn settle_fetch(&self, outcome: Result<Vec<Phone>, RemoteError>) {
        let settled = match outcome {
            Ok(phones) => {
                tracing::debug!(count = phones.len(), "fetch settled");
                CollectionState::Success(phones)
            }
            Err(error) => {
                tracing::warn!(%error, "fetch failed");
                CollectionState::Failure {
                    error,
                    retained: Vec::new(),
                }
            }
        };
        *self.state.borrow_mut() = settled;
        self.notify();
    }

    fn settle_add(&self, provisional: PhoneId, outcome: Result<Phone, RemoteError>) {
        {
            let mut state = self.state.borrow_mut();
            match outcome {
                Ok(confirmed) => {
                    tracing::debug!(%provisional, id = %confirmed.id, "add confirmed");
                    let replaced = state
                        .phones_mut()
                        .is_some_and(|phones| confirm(phones, &provisional, confirmed.clone()));
                    if !replaced {
                        tracing::debug!(%provisional, "provisional entry gone before confirmation");
                    }
                    self.settled_adds
                        .borrow_mut()
                        .insert(provisional, Some(confirmed));
                }
                Err(error) => {
                    tracing::warn!(%provisional, %error, "add failed, rolling back");
                    if let Some(phones) = state.phones_mut() {
                        phones.retain(|p| p.id != provisional);
                    }
                    state.fail(error);
                    self.settled_adds.borrow_mut().insert(provisional, None);
                }
            }
        }
        self.notify();
    }

    fn settle_update(&self, original: Phone, outcome: Result<Phone, RemoteError>) {
        match outcome {
            Ok(_) => tracing::debug!(id = %original.id, "update confirmed"),
            Err(error) => {
                tracing::warn!(id = %original.id, %error, "update failed, rolling back");
                let mut state = self.state.borrow_mut();
                if let Some(slot) = state
                    .phones_mut()
                    .and_then(|phones| phones.iter_mut().find(|p| p.id == original.id))
                {
                    *slot = original;
                }
                state.fail(error);
            }
        }
        self.notify();
    }

    fn settle_remove(&self, id: &PhoneId, snapshot: Vec<Phone>, outcome: Result<(), RemoteError>) {
        match outcome {
            Ok(()) => tracing::debug!(id = %id, "remove confirmed"),
            Err(error) => {
                tracing::warn!(id = %id, %error, "remove failed, restoring list");
                let retained = reconcile(snapshot, &self.settled_adds.borrow());
                *self.state.borrow_mut() = CollectionState::Failure { error, retained };
            }
        }
        self.notify();
    }
}

/// Puts the confirmed phone where the provisional one was.
///
/// Returns false when the provisional entry is gone, e.g. replaced by a fetch.
fn confirm(phones: &mut Vec<Phone>, provisional: &PhoneId, confirmed: Phone) -> bool {
    let Some(pos) = phones.iter().position(|p| &p.id == provisional) else {
        return false;
    };
    let id = confirmed.id.clone();
    phones[pos] = confirmed;
    // A fetch may already have brought in the confirmed record.
    let mut index = 0;
    phones.retain(|p| {
        let keep = index == pos || p.id != id;
        index += 1;
        keep
    });
    true
}

/// Replays adds that settled after `snapshot` was taken: confirmed
/// provisional entries take their store id, rolled back ones are dropped.
/// Adds still in flight keep their provisional entry.
fn reconcile(snapshot: Vec<Phone>, settled: &HashMap<PhoneId, Option<Phone>>) -> Vec<Phone> {
    let mut phones: Vec<Phone> = Vec::with_capacity(snapshot.len());
    for phone in snapshot {
        let phone = match settled.get(&phone.id) {
            Some(Some(confirmed)) => confirmed.clone(),
            Some(None) => continue,
            None => phone,
        };
        if !phones.iter().any(|p| p.id == phone.id) {
            phones.push(phone);
        }
    }
    phones
}

/// Single source of truth for the observed phone collection.
pub struct PhoneCache<S> {
    shared: Rc<Shared<S>>,
}

impl<S: PhoneStore + 'static> PhoneCache<S> {
    /// Creates a cache in `Loading` without contacting the store.
    pub fn new(store: S) -> Self {
        Self {
            shared: Rc::new(Shared {
                store,
                state: RefCell::new(CollectionState::Loading),
                observers: RefCell::new(Observers::default()),
                namespace: Uuid::new_v4().simple().to_string(),
                next_provisional: Cell::new(0),
                settled_adds: RefCell::new(HashMap::new()),
                disposed: Cell::new(false),
            }),
        }
    }

    /// Creates a cache together with its initial fetch.
    pub fn open(store: S) -> (Self, Pending) {
        let cache = Self::new(store);
        let initial = cache.start_fetch();
        (cache, initial)
    }

    pub fn state(&self) -> CollectionState {
        self.shared.state.borrow().clone()
    }

    /// The current list: the `Success` list or the list kept by a `Failure`.
    pub fn phones(&self) -> Option<Vec<Phone>> {
        self.shared.state.borrow().phones().map(<[Phone]>::to_vec)
    }

    pub fn get(&self, id: &PhoneId) -> Option<Phone> {
        self.shared.state.borrow().get(id).cloned()
    }

    pub fn store(&self) -> &S {
        &self.shared.store
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, receiver) = mpsc::unbounded_channel();
        let mut observers = self.shared.observers.borrow_mut();
        let id = SubscriptionId(observers.next_id);
        observers.next_id += 1;
        if !self.shared.disposed.get() {
            // Unbounded send only fails when the receiver is gone.
            let _ = tx.send(self.shared.state.borrow().clone());
            observers.senders.push((id, tx));
        }
        Subscription { id, receiver }
    }

    /// Returns false if the subscription was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.shared.observers.borrow_mut();
        let before = observers.senders.len();
        observers.senders.retain(|(sid, _)| *sid != id);
        observers.senders.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.observers.borrow().senders.len()
    }

    /// Closes every subscription and refuses further operations.
    ///
    /// Operations already in flight still settle into the local state but
    /// notify nobody.
    pub fn dispose(&self) {
        if self.shared.disposed.replace(true) {
            return;
        }
        self.shared.observers.borrow_mut().senders.clear();
        tracing::debug!("phone cache disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.get()
    }

    fn ensure_live(&self) -> Result<(), CacheError> {
        if self.is_disposed() {
            return Err(CacheError::Disposed);
        }
        Ok(())
    }

    /// Reloads the whole collection, discarding local edits.
    pub fn fetch(&self) -> Result<Pending, CacheError> {
        self.ensure_live()?;
        Ok(self.start_fetch())
    }

    fn start_fetch(&self) -> Pending {
        *self.shared.state.borrow_mut() = CollectionState::Loading;
        tracing::debug!("fetch started");
        self.shared.notify();

        let shared = Rc::clone(&self.shared);
        let settler = Rc::clone(&self.shared);
        Pending::new(
            None,
            async move { shared.store.list().await },
            move |outcome| settler.settle_fetch(outcome),
        )
    }

    /// Appends the draft under a provisional id, then asks the store for a
    /// real one.
    pub fn add(&self, draft: PhoneDraft) -> Result<Pending, CacheError> {
        self.ensure_live()?;
        validation::validate_draft(&draft)?;

        let provisional = {
            let mut state = self.shared.state.borrow_mut();
            let phones = state.phones_mut().ok_or(CacheError::NotReady)?;
            let provisional = self.shared.next_provisional_id();
            phones.push(draft.clone().with_id(provisional.clone()));
            state.resume();
            provisional
        };
        tracing::debug!(id = %provisional, "optimistic add");
        self.shared.notify();

        let shared = Rc::clone(&self.shared);
        let settler = Rc::clone(&self.shared);
        let pending_id = provisional.clone();
        Ok(Pending::new(
            Some(pending_id),
            async move { shared.store.add(&draft).await },
            move |outcome| settler.settle_add(provisional, outcome),
        ))
    }

    /// Replaces the phone with the same id, keeping the original for rollback.
    pub fn update(&self, phone: Phone) -> Result<Pending, CacheError> {
        self.ensure_live()?;
        validation::validate_draft(&phone.draft())?;
        if phone.id.is_provisional() {
            return Err(CacheError::Provisional(phone.id));
        }

        let original = {
            let mut state = self.shared.state.borrow_mut();
            let phones = state.phones_mut().ok_or(CacheError::NotReady)?;
            let slot = phones
                .iter_mut()
                .find(|p| p.id == phone.id)
                .ok_or_else(|| CacheError::UnknownPhone(phone.id.clone()))?;
            let original = std::mem::replace(slot, phone.clone());
            state.resume();
            original
        };
        tracing::debug!(id = %phone.id, "optimistic update");
        self.shared.notify();

        let shared = Rc::clone(&self.shared);
        let settler = Rc::clone(&self.shared);
        Ok(Pending::new(
            Some(phone.id.clone()),
            async move { shared.store.update(&phone).await },
            move |outcome| settler.settle_update(original, outcome),
        ))
    }

    /// Removes the phone, keeping the whole list for rollback.
    pub fn remove(&self, id: PhoneId) -> Result<Pending, CacheError> {
        self.ensure_live()?;
        if id.is_provisional() {
            return Err(CacheError::Provisional(id));
        }

        let snapshot = {
            let mut state = self.shared.state.borrow_mut();
            let phones = state.phones_mut().ok_or(CacheError::NotReady)?;
            if !phones.iter().any(|p| p.id == id) {
                return Err(CacheError::UnknownPhone(id));
            }
            let snapshot = phones.clone();
            phones.retain(|p| p.id != id);
            state.resume();
            snapshot
        };
        tracing::debug!(id = %id, "optimistic remove");
        self.shared.notify();

        let shared = Rc::clone(&self.shared);
        let settler = Rc::clone(&self.shared);
        let target = id.clone();
        Ok(Pending::new(
            Some(id.clone()),
            async move { shared.store.remove(&target).await },
            move |outcome| settler.settle_remove(&id, snapshot, outcome),
        ))
    }
}

impl<S> Drop for PhoneCache<S> {
    fn drop(&mut self) {
        self.shared.disposed.set(true);
        self.shared.observers.borrow_mut().senders.clear();
    }
}

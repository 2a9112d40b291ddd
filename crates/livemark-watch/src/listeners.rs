use std::collections::HashSet;

use crate::error::CallbackError;

/// Host-supplied stable identity for one subscriber (e.g., a window).
/// Used only as a map key, never created or validated here.
pub type SubscriberId = u64;

/// Handle for revoking one callback registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<E> = Box<dyn FnMut(&E) -> Result<(), CallbackError>>;

struct Entry<E> {
    id: ListenerId,
    subscriber: SubscriberId,
    callback: Callback<E>,
}

/// Callback registry for one event payload type.
///
/// A subscriber may hold any number of registrations, each revocable
/// on its own. Registrations are independent of which paths the
/// subscriber watches.
pub(crate) struct Listeners<E> {
    next_id: u64,
    entries: Vec<Entry<E>>,
}

impl<E> Listeners<E> {
    pub(crate) const fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    pub(crate) fn register(&mut self, subscriber: SubscriberId, callback: Callback<E>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry {
            id,
            subscriber,
            callback,
        });
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) {
        self.entries.retain(|entry| entry.id != id);
    }

    pub(crate) fn remove_subscriber(&mut self, subscriber: SubscriberId) {
        self.entries.retain(|entry| entry.subscriber != subscriber);
    }

    /// Deliver `event` to every callback whose subscriber is in
    /// `targets`. A failing callback is logged and does not block
    /// delivery to the rest.
    pub(crate) fn emit(&mut self, targets: &HashSet<SubscriberId>, event: &E) {
        for entry in &mut self.entries {
            if !targets.contains(&entry.subscriber) {
                continue;
            }
            if let Err(err) = (entry.callback)(event) {
                tracing::warn!(
                    subscriber = entry.subscriber,
                    error = %err,
                    "subscriber callback failed"
                );
            }
        }
    }
}

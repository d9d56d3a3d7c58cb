use std::collections::HashMap;

use crate::ids::ConnectionId;

struct Entry {
    name: String,
    seq: u64,
}

/// Connection → display name store for every joined connection.
///
/// Owned by the [`Dispatcher`](crate::dispatcher::Dispatcher); mutations are
/// serialized by whoever owns the dispatcher, so no interior locking here.
#[derive(Default)]
pub struct Registry {
    entries: HashMap<ConnectionId, Entry>,
    next_seq: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the name for a connection. An overwrite keeps the
    /// entry's roster position.
    pub fn put(&mut self, id: ConnectionId, name: impl Into<String>) {
        let name = name.into();
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.name = name;
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(id, Entry { name, seq });
    }

    /// Remove a connection's entry, returning the name it held.
    pub fn remove(&mut self, id: &ConnectionId) -> Option<String> {
        self.entries.remove(id).map(|e| e.name)
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&str> {
        self.entries.get(id).map(|e| e.name.as_str())
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.entries.contains_key(id)
    }

    /// All current display names, in join order.
    pub fn values(&self) -> Vec<String> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

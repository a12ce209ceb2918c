use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use pregel_api::{MessageCombiner, PregelId};

/// Outgoing messages of one compute task, grouped by target vertex.
///
/// With a combiner every target holds at most one message; messages are folded as they arrive.
pub struct MessageCache<'c, M> {
    combiner: Option<&'c dyn MessageCombiner<M>>,
    messages: HashMap<PregelId, Vec<M>>,
    sent: usize,
}

impl<'c, M> MessageCache<'c, M> {
    pub fn new(combiner: Option<&'c dyn MessageCombiner<M>>) -> Self {
        Self { combiner, messages: HashMap::new(), sent: 0 }
    }

    pub fn send(&mut self, target: PregelId, message: M) {
        self.sent += 1;
        self.store(target, message);
    }

    fn store(&mut self, target: PregelId, message: M) {
        match (self.messages.entry(target), self.combiner) {
            (Entry::Occupied(mut entry), Some(combiner)) => {
                if let Some(first) = entry.get_mut().first_mut() {
                    combiner.combine(first, &message);
                } else {
                    entry.get_mut().push(message);
                }
            }
            (Entry::Occupied(mut entry), None) => entry.get_mut().push(message),
            (Entry::Vacant(entry), _) => {
                entry.insert(vec![message]);
            }
        }
    }

    /// Number of `send` calls, before combining.
    pub fn sent_count(&self) -> usize {
        self.sent
    }

    /// Number of distinct target vertices.
    pub fn target_count(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn merge(&mut self, other: MessageCache<'_, M>) {
        self.sent += other.sent;
        if self.messages.is_empty() && self.combiner.is_none() {
            self.messages = other.messages;
            return;
        }
        for (target, messages) in other.messages {
            for message in messages {
                self.store(target.clone(), message);
            }
        }
    }

    pub fn into_messages(self) -> impl Iterator<Item = (PregelId, Vec<M>)> {
        self.messages.into_iter()
    }
}

use hashbrown::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Cluster shard-mapping service: which shards a collection has, which of them this worker
/// hosts, and which shard is responsible for a document key.
pub trait ShardTopology: Send + Sync {
    /// Locally hosted shards of `collection`, in shard-list order.
    fn local_shards(&self, collection: &str) -> Option<Vec<String>>;

    /// All shards of `collection`, in shard-list order.
    fn global_shards(&self, collection: &str) -> Option<Vec<String>>;

    fn collection_plan_id(&self, collection: &str) -> Option<String>;

    /// The shard responsible for `key` in the collection with the given plan id.
    fn resolve_shard(&self, plan_id: &str, key: &str) -> Option<String>;
}

#[derive(Debug, Clone)]
struct CollectionInfo {
    shards: Vec<String>,
    local_shards: Vec<String>,
    placements: HashMap<String, usize>,
}

/// Topology with a fixed set of collections. Keys are placed explicitly with `place` or, failing
/// that, hashed onto the collection's shard list.
#[derive(Debug, Clone, Default)]
pub struct StaticTopology {
    collections: HashMap<String, CollectionInfo>,
    plan_ids: HashMap<String, String>,
}

impl StaticTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a collection with its shards, all of them hosted locally.
    pub fn add_collection(&mut self, name: &str, shards: &[&str]) -> &mut Self {
        self.add_collection_with_local(name, shards, shards)
    }

    pub fn add_collection_with_local(
        &mut self,
        name: &str,
        shards: &[&str],
        local_shards: &[&str],
    ) -> &mut Self {
        let plan_id = (self.collections.len() + 1).to_string();
        self.plan_ids.insert(name.to_owned(), plan_id.clone());
        self.collections.insert(
            plan_id,
            CollectionInfo {
                shards: shards.iter().map(|s| (*s).to_owned()).collect(),
                local_shards: local_shards.iter().map(|s| (*s).to_owned()).collect(),
                placements: HashMap::new(),
            },
        );
        self
    }

    /// Pins `key` of `collection` to `shard`. Returns `false` if either is unknown.
    pub fn place(&mut self, collection: &str, key: &str, shard: &str) -> bool {
        let collections = &mut self.collections;
        let info = match self.plan_ids.get(collection).and_then(|id| collections.get_mut(id)) {
            Some(info) => info,
            None => return false,
        };
        match info.shards.iter().position(|s| s == shard) {
            Some(index) => {
                info.placements.insert(key.to_owned(), index);
                true
            }
            None => false,
        }
    }

    fn collection(&self, name: &str) -> Option<&CollectionInfo> {
        self.plan_ids.get(name).and_then(|plan_id| self.collections.get(plan_id))
    }
}

impl ShardTopology for StaticTopology {
    fn local_shards(&self, collection: &str) -> Option<Vec<String>> {
        self.collection(collection).map(|info| info.local_shards.clone())
    }

    fn global_shards(&self, collection: &str) -> Option<Vec<String>> {
        self.collection(collection).map(|info| info.shards.clone())
    }

    fn collection_plan_id(&self, collection: &str) -> Option<String> {
        self.plan_ids.get(collection).cloned()
    }

    fn resolve_shard(&self, plan_id: &str, key: &str) -> Option<String> {
        let info = self.collections.get(plan_id)?;
        if info.shards.is_empty() {
            return None;
        }
        let index = match info.placements.get(key) {
            Some(index) => *index,
            None => hash_key(key) % info.shards.len(),
        };
        info.shards.get(index).cloned()
    }
}

fn hash_key(key: &str) -> usize {
    // `DefaultHasher::new()` uses fixed keys, so placement is stable across runs.
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish() as usize
}

use crate::error::{config_error, PregelError};
use crate::topology::ShardTopology;
use hashbrown::HashMap;
use pregel_api::ShardId;
use std::convert::TryFrom;
use std::time::Duration;

pub const DEFAULT_MAX_SUPERSTEPS: u64 = 500;
pub const DEFAULT_LOAD_BATCH_SIZE: usize = 1000;
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 60;

/// Parameters of one graph-compute job, as handed over by the surrounding system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JobConfig {
    pub algorithm: String,
    pub vertex_collections: Vec<String>,
    pub edge_collections: Vec<String>,
    pub max_supersteps: u64,
    pub parallelism: usize,
    pub load_batch_size: usize,
    pub store_results: bool,
    pub lazy_loading: bool,
    pub lock_timeout_secs: u64,
    /// Algorithm specific parameters.
    pub params: HashMap<String, serde_json::Value>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            algorithm: String::new(),
            vertex_collections: Vec::new(),
            edge_collections: Vec::new(),
            max_supersteps: DEFAULT_MAX_SUPERSTEPS,
            parallelism: std::thread::available_parallelism().map_or(1, |n| n.get()),
            load_batch_size: DEFAULT_LOAD_BATCH_SIZE,
            store_results: true,
            lazy_loading: false,
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
            params: HashMap::new(),
        }
    }
}

impl JobConfig {
    pub fn from_json(json: &str) -> Result<Self, PregelError> {
        let config: JobConfig = serde_json::from_str(json)
            .map_err(|e| config_error(format!("Could not parse job configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PregelError> {
        if self.vertex_collections.is_empty() {
            return Err(config_error("At least one vertex collection is required".to_owned()));
        }
        if self.edge_collections.is_empty() {
            return Err(config_error("At least one edge collection is required".to_owned()));
        }
        if self.parallelism == 0 {
            return Err(config_error("Parallelism should be non-zero".to_owned()));
        }
        if self.load_batch_size == 0 {
            return Err(config_error("Load batch size should be non-zero".to_owned()));
        }
        if self.max_supersteps == 0 {
            return Err(config_error("Max supersteps should be non-zero".to_owned()));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

/// Worker-side view of the job's collections: dense shard ids for every shard of every job
/// collection, and the locally hosted shards in collection-declaration order.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    vertex_collections: Vec<String>,
    edge_collections: Vec<String>,
    global_shards: Vec<String>,
    shard_ids: HashMap<String, ShardId>,
    shard_collections: Vec<String>,
    local_vertex_shards: Vec<(String, Vec<String>)>,
    local_edge_shards: Vec<(String, Vec<String>)>,
    load_batch_size: usize,
    lock_timeout: Duration,
}

impl WorkerConfig {
    pub fn new(job: &JobConfig, topology: &dyn ShardTopology) -> Result<Self, PregelError> {
        let mut config = WorkerConfig {
            vertex_collections: job.vertex_collections.clone(),
            edge_collections: job.edge_collections.clone(),
            global_shards: Vec::new(),
            shard_ids: HashMap::new(),
            shard_collections: Vec::new(),
            local_vertex_shards: Vec::new(),
            local_edge_shards: Vec::new(),
            load_batch_size: job.load_batch_size,
            lock_timeout: job.lock_timeout(),
        };
        for collection in job.vertex_collections.iter().chain(job.edge_collections.iter()) {
            let shards = topology
                .global_shards(collection)
                .ok_or_else(|| PregelError::UnknownCollection(collection.clone()))?;
            for shard in shards {
                if config.shard_ids.contains_key(&shard) {
                    return Err(config_error(format!(
                        "Shard '{}' is listed by more than one collection",
                        shard
                    )));
                }
                let shard_id = ShardId::try_from(config.global_shards.len())
                    .ok()
                    .filter(|id| *id != pregel_api::UNASSIGNED_SHARD)
                    .ok_or_else(|| config_error("Ran out of shard ids".to_owned()))?;
                config.shard_ids.insert(shard.clone(), shard_id);
                config.global_shards.push(shard);
                config.shard_collections.push(collection.clone());
            }
        }
        for collection in &job.vertex_collections {
            let local = local_shards(topology, collection, &config)?;
            config.local_vertex_shards.push((collection.clone(), local));
        }
        for collection in &job.edge_collections {
            let local = local_shards(topology, collection, &config)?;
            config.local_edge_shards.push((collection.clone(), local));
        }
        Ok(config)
    }

    /// Vertex shard `i` of every vertex collection pairs with edge shard `i` of every edge
    /// collection, so all local shard lists must have the same length.
    pub fn check_co_partitioning(&self) -> Result<(), PregelError> {
        for (vertex_collection, vertex_shards) in &self.local_vertex_shards {
            for (edge_collection, edge_shards) in &self.local_edge_shards {
                if vertex_shards.len() != edge_shards.len() {
                    return Err(PregelError::ShardCountMismatch(
                        vertex_collection.clone(),
                        vertex_shards.len(),
                        edge_collection.clone(),
                        edge_shards.len(),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn vertex_collections(&self) -> &[String] {
        &self.vertex_collections
    }

    pub fn edge_collections(&self) -> &[String] {
        &self.edge_collections
    }

    pub fn local_vertex_shards(&self) -> &[(String, Vec<String>)] {
        &self.local_vertex_shards
    }

    pub fn local_edge_shards(&self) -> &[(String, Vec<String>)] {
        &self.local_edge_shards
    }

    /// Local edge shards paired with the vertex shard at `shard_index`, one per edge collection.
    pub fn paired_edge_shards(&self, shard_index: usize) -> Vec<String> {
        self.local_edge_shards
            .iter()
            .filter_map(|(_, shards)| shards.get(shard_index).cloned())
            .collect()
    }

    /// Every locally hosted vertex and edge shard.
    pub fn all_local_shards(&self) -> Vec<String> {
        self.local_vertex_shards
            .iter()
            .chain(self.local_edge_shards.iter())
            .flat_map(|(_, shards)| shards.iter().cloned())
            .collect()
    }

    pub fn local_vertex_shard_names(&self) -> Vec<String> {
        self.local_vertex_shards.iter().flat_map(|(_, shards)| shards.iter().cloned()).collect()
    }

    pub fn shard_id(&self, shard: &str) -> Option<ShardId> {
        self.shard_ids.get(shard).copied()
    }

    pub fn shard_name(&self, shard_id: ShardId) -> Option<&str> {
        self.global_shards.get(usize::from(shard_id)).map(String::as_str)
    }

    pub fn collection_of(&self, shard_id: ShardId) -> Option<&str> {
        self.shard_collections.get(usize::from(shard_id)).map(String::as_str)
    }

    pub fn is_local_vertex_shard(&self, shard_id: ShardId) -> bool {
        self.shard_name(shard_id).map_or(false, |name| {
            self.local_vertex_shards.iter().any(|(_, shards)| shards.iter().any(|s| s == name))
        })
    }

    pub fn is_vertex_collection(&self, collection: &str) -> bool {
        self.vertex_collections.iter().any(|c| c == collection)
    }

    /// Position of a locally hosted shard within its collection's local shard list.
    pub fn shard_index(&self, shard: &str) -> Option<usize> {
        self.local_vertex_shards
            .iter()
            .chain(self.local_edge_shards.iter())
            .find_map(|(_, shards)| shards.iter().position(|s| s == shard))
    }

    pub fn load_batch_size(&self) -> usize {
        self.load_batch_size
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }
}

fn local_shards(
    topology: &dyn ShardTopology,
    collection: &str,
    config: &WorkerConfig,
) -> Result<Vec<String>, PregelError> {
    let local = topology
        .local_shards(collection)
        .ok_or_else(|| PregelError::UnknownCollection(collection.to_owned()))?;
    if let Some(unknown) = local.iter().find(|shard| config.shard_id(shard).is_none()) {
        return Err(config_error(format!(
            "Local shard '{}' is not a shard of collection '{}'",
            unknown, collection
        )));
    }
    Ok(local)
}

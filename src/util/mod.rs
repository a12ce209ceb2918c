pub mod logger;
pub mod memory_usage;
pub mod thread_pool;
pub mod timer;

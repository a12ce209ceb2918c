use log::{info, warn};
use psutil::process::os::linux::ProcessExt;
use std::fmt::Arguments;

const BYTES_IN_MB: f64 = 1024_f64 * 1024_f64;

#[allow(clippy::cast_precision_loss)]
pub fn print_memory_usage(msg: Arguments) {
    let process = match psutil::process::Process::new(std::process::id()) {
        Ok(process) => process,
        Err(e) => {
            warn!("Could not inspect process for memory usage: {}", e);
            return;
        }
    };
    match process.procfs_statm() {
        Ok(mem) => info!(
            "Memory usage: total = {:.3} MB, rss = {:.3} MB, shared = {:.3} MB [{}]",
            mem.size as f64 / BYTES_IN_MB,
            mem.resident as f64 / BYTES_IN_MB,
            mem.shared as f64 / BYTES_IN_MB,
            msg
        ),
        Err(e) => warn!("Could not read memory details: {}", e),
    }
}

use std::thread;

use tracing::{error, info};

/// What the process ended up running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Cores the OS reports as available to this process.
    pub physical: usize,
    /// Worker threads in the global rayon pool.
    pub logical: usize,
}

/// Sizes the global rayon pool used for per-sample work.
///
/// `threads = None` uses one worker per available core. The global pool can
/// only be built once per process; a second call logs the failure and keeps
/// the existing pool.
pub fn configure_devices(threads: Option<usize>) -> DeviceInfo {
    let physical = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    let requested = threads.filter(|&t| t > 0).unwrap_or(physical);

    if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(requested).build_global() {
        error!("{}", e);
    }

    let info = DeviceInfo { physical, logical: rayon::current_num_threads() };
    info!("{} physical cores, {} worker threads", info.physical, info.logical);
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuring_twice_keeps_running() {
        let first = configure_devices(None);
        let second = configure_devices(Some(1));
        assert!(first.physical >= 1);
        assert_eq!(first.logical, second.logical);
    }
}

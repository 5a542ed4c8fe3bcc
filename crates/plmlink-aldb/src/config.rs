use std::time::Duration;

/// Retry and timeout policy for loading and writing a link database.
///
/// The defaults are tuned for a busy mesh network; none of them are
/// protocol requirements.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Attempts per step of a bulk read (get-first, get-next or one direct
    /// read). Reset after every record received. Default: 3.
    pub step_retries: u32,
    /// Attempts per missing address during gap repair. Default: 20.
    pub gap_retries: u32,
    /// Attempts per record write. Default: 3.
    pub write_retries: u32,
    /// Wait for one record response. Default: 3 s.
    pub read_timeout: Duration,
    /// Extra wait added for each further gap-repair attempt. Default: 1 s.
    pub timeout_step: Duration,
    /// Upper bound on a whole load. Default: 30 min.
    pub load_ceiling: Duration,
    /// Probe whether the device answers direct reads. Default: true.
    pub probe_direct_reads: bool,
}

impl SyncConfig {
    /// Timeout for gap-repair attempt `attempt` (1-based).
    pub fn gap_timeout(&self, attempt: u32) -> Duration {
        self.read_timeout + self.timeout_step * attempt.saturating_sub(1)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            step_retries: 3,
            gap_retries: 20,
            write_retries: 3,
            read_timeout: Duration::from_secs(3),
            timeout_step: Duration::from_secs(1),
            load_ceiling: Duration::from_secs(30 * 60),
            probe_direct_reads: true,
        }
    }
}

use crate::error::PublisherError;

/// Source of the resource signal watched by the monitor.
pub trait MemorySampler: Send + Sync + 'static {
    /// Current memory usage in megabytes.
    fn sample_mb(&self) -> Result<f64, PublisherError>;
}

/// Resident set size of the current process, read from `/proc/self/status`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessRssSampler;

impl MemorySampler for ProcessRssSampler {
    fn sample_mb(&self) -> Result<f64, PublisherError> {
        let status = std::fs::read_to_string("/proc/self/status")
            .map_err(|e| PublisherError::ResourceSample(format!("read /proc/self/status: {e}")))?;
        let rss_kb = parse_vm_rss_kb(&status)
            .ok_or_else(|| PublisherError::ResourceSample("VmRSS not reported".into()))?;
        Ok(rss_kb as f64 / 1024.0)
    }
}

/// Extracts the `VmRSS:` line (kB) from a `/proc/<pid>/status` body.
fn parse_vm_rss_kb(status: &str) -> Option<u64> {
    status
        .lines()
        .find(|l| l.starts_with("VmRSS:"))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|v| v.parse::<u64>().ok())
}

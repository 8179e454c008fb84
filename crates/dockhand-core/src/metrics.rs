//! Host CPU and memory usage read from a procfs directory.
//!
//! CPU usage is the busy share of the jiffies elapsed between two samples of
//! the aggregate `cpu` line in `stat`. Without a previous sample it is the
//! share since boot. Memory usage is `1 - MemAvailable / MemTotal` from
//! `meminfo`, falling back to `MemFree` on kernels without `MemAvailable`.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{CoreError, Result};

/// Aggregate CPU counters from the first line of `stat`, in jiffies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub busy: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemInfo {
    pub total_kb: u64,
    pub available_kb: u64,
}

/// One published sample. Percentages are rounded to two decimals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostMetrics {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub sampled_at: DateTime<Utc>,
}

impl HostMetrics {
    /// Short form for a status line: `CPU: 12.5% | RAM: 40.2%`.
    pub fn summary(&self) -> String {
        format!(
            "CPU: {}% | RAM: {:.1}%",
            self.cpu_percent, self.memory_percent
        )
    }
}

pub fn parse_stat(text: &str) -> Result<CpuTimes> {
    let line = text
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| proc_error("stat", "no aggregate cpu line"))?;

    let fields = line
        .split_whitespace()
        .skip(1)
        .map(|f| {
            f.parse::<u64>()
                .map_err(|_| proc_error("stat", format!("bad counter '{f}'")))
        })
        .collect::<Result<Vec<u64>>>()?;
    if fields.len() < 4 {
        return Err(proc_error("stat", "fewer than four cpu counters"));
    }

    // user nice system idle iowait irq softirq steal; guest time is already
    // counted in user and nice.
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    let total: u64 = fields.iter().take(8).sum();
    Ok(CpuTimes {
        busy: total - idle,
        total,
    })
}

pub fn parse_meminfo(text: &str) -> Result<MemInfo> {
    let field = |name: &str| {
        text.lines().find_map(|line| {
            let (key, rest) = line.split_once(':')?;
            if key.trim() != name {
                return None;
            }
            rest.split_whitespace().next()?.parse::<u64>().ok()
        })
    };

    let total_kb = field("MemTotal").ok_or_else(|| proc_error("meminfo", "no MemTotal"))?;
    let available_kb = field("MemAvailable")
        .or_else(|| field("MemFree"))
        .ok_or_else(|| proc_error("meminfo", "no MemAvailable or MemFree"))?;
    if total_kb == 0 {
        return Err(proc_error("meminfo", "MemTotal is 0"));
    }
    Ok(MemInfo {
        total_kb,
        available_kb,
    })
}

/// Busy share between `prev` and `now`, or since boot without `prev`.
pub fn cpu_percent(prev: Option<CpuTimes>, now: CpuTimes) -> f64 {
    let (busy, total) = match prev {
        Some(p) if now.total > p.total => (
            now.busy.saturating_sub(p.busy),
            now.total - p.total,
        ),
        _ => (now.busy, now.total),
    };
    if total == 0 {
        return 0.0;
    }
    round2(busy as f64 / total as f64 * 100.0)
}

pub fn memory_percent(mem: MemInfo) -> f64 {
    let used = mem.total_kb.saturating_sub(mem.available_kb);
    round2(used as f64 / mem.total_kb as f64 * 100.0)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn proc_error(file: &'static str, reason: impl Into<String>) -> CoreError {
    CoreError::ProcParse {
        file,
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Sampler
// ---------------------------------------------------------------------------

/// Reads `stat` and `meminfo` under one directory, remembering the last CPU
/// counters so each sample covers the interval since the previous one.
#[derive(Debug)]
pub struct HostSampler {
    proc_dir: std::path::PathBuf,
    prev_cpu: Option<CpuTimes>,
}

impl HostSampler {
    pub fn new(proc_dir: impl AsRef<Path>) -> Self {
        Self {
            proc_dir: proc_dir.as_ref().to_path_buf(),
            prev_cpu: None,
        }
    }

    pub async fn sample(&mut self) -> Result<HostMetrics> {
        let stat = tokio::fs::read_to_string(self.proc_dir.join("stat")).await?;
        let meminfo = tokio::fs::read_to_string(self.proc_dir.join("meminfo")).await?;

        let cpu = parse_stat(&stat)?;
        let mem = parse_meminfo(&meminfo)?;
        let metrics = HostMetrics {
            cpu_percent: cpu_percent(self.prev_cpu, cpu),
            memory_percent: memory_percent(mem),
            sampled_at: Utc::now(),
        };
        self.prev_cpu = Some(cpu);
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const STAT: &str = "\
cpu  4705 356 584 3699 23 0 12 0 0 0
cpu0 1393 280 404 1813 11 0 8 0 0 0
intr 114930548 113199788 3 0 5 263 0 4 [... 242 more ...]
ctxt 1990473
btime 1062191376
";

    const STAT_LATER: &str = "\
cpu  4805 356 684 3899 23 0 12 0 0 0
";

    const MEMINFO: &str = "\
MemTotal:        8000000 kB
MemFree:          500000 kB
MemAvailable:    6000000 kB
Buffers:          100000 kB
";

    #[test]
    fn parses_aggregate_cpu_line() {
        let cpu = parse_stat(STAT).unwrap();
        assert_eq!(cpu.total, 4705 + 356 + 584 + 3699 + 23 + 12);
        assert_eq!(cpu.busy, 4705 + 356 + 584 + 12);
    }

    #[test]
    fn cpu_since_boot_and_between_samples() {
        let first = parse_stat(STAT).unwrap();
        let later = parse_stat(STAT_LATER).unwrap();
        assert_eq!(cpu_percent(None, first), 60.32);
        // 200 busy jiffies out of 400 elapsed
        assert_eq!(cpu_percent(Some(first), later), 50.0);
    }

    #[test]
    fn counter_reset_falls_back_to_since_boot() {
        let first = parse_stat(STAT_LATER).unwrap();
        let reset = parse_stat(STAT).unwrap();
        assert_eq!(cpu_percent(Some(first), reset), cpu_percent(None, reset));
    }

    #[test]
    fn memory_prefers_available() {
        let mem = parse_meminfo(MEMINFO).unwrap();
        assert_eq!(mem.available_kb, 6_000_000);
        assert_eq!(memory_percent(mem), 25.0);
    }

    #[test]
    fn memory_falls_back_to_free() {
        let mem = parse_meminfo("MemTotal: 1000 kB\nMemFree: 250 kB\n").unwrap();
        assert_eq!(memory_percent(mem), 75.0);
    }

    #[test]
    fn malformed_files_are_errors() {
        assert!(matches!(
            parse_stat("intr 1 2 3\n"),
            Err(CoreError::ProcParse { file: "stat", .. })
        ));
        assert!(parse_stat("cpu  1 x 3 4\n").is_err());
        assert!(parse_meminfo("MemFree: 1 kB\n").is_err());
        assert!(parse_meminfo("MemTotal: 0 kB\nMemFree: 0 kB\n").is_err());
    }

    #[test]
    fn summary_line() {
        let m = HostMetrics {
            cpu_percent: 12.5,
            memory_percent: 40.26,
            sampled_at: Utc::now(),
        };
        assert_eq!(m.summary(), "CPU: 12.5% | RAM: 40.3%");
    }

    #[tokio::test]
    async fn sampler_reads_proc_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("stat"), STAT).unwrap();
        std::fs::write(dir.path().join("meminfo"), MEMINFO).unwrap();

        let mut sampler = HostSampler::new(dir.path());
        let first = sampler.sample().await.unwrap();
        assert_eq!(first.cpu_percent, 60.32);
        assert_eq!(first.memory_percent, 25.0);

        std::fs::write(dir.path().join("stat"), STAT_LATER).unwrap();
        let second = sampler.sample().await.unwrap();
        assert_eq!(second.cpu_percent, 50.0);
    }

    #[tokio::test]
    async fn sampler_missing_dir_is_io_error() {
        let dir = TempDir::new().unwrap();
        let mut sampler = HostSampler::new(dir.path().join("missing"));
        assert!(matches!(sampler.sample().await, Err(CoreError::Io(_))));
    }
}

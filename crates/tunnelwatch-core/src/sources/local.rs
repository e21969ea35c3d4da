//! LocalSource: samples the host the monitor runs on from procfs.
//!
//! - bytes in/out: `/proc/net/dev`, summed over the selected interfaces
//! - active connections: established sockets in `/proc/net/tcp` and `tcp6`
//! - cpu: busy share of `/proc/stat` jiffies since the previous call
//! - memory: `1 - MemAvailable / MemTotal` from `/proc/meminfo`
//! - latency: wall time of a TCP connect to the probe address

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::TcpStream;

use crate::error::SourceError;
use crate::metric::{EndpointId, MetricId, MetricValue};
use crate::source::MetricSource;

/// `st` column value for an established socket.
const TCP_ESTABLISHED: &str = "01";

// ---------------------------------------------------------------------------
// procfs parsers
// ---------------------------------------------------------------------------

/// Sum receive and transmit bytes from `/proc/net/dev`.
///
/// With an empty `interfaces` list every interface except `lo` counts.
pub fn parse_net_dev(text: &str, interfaces: &[String]) -> Result<(u64, u64), SourceError> {
    let mut rx_total = 0u64;
    let mut tx_total = 0u64;
    let mut matched = 0usize;

    // Two header lines, then "  eth0: rx_bytes rx_packets ... tx_bytes ...".
    for line in text.lines().skip(2) {
        let Some((name, counters)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let selected = if interfaces.is_empty() {
            name != "lo"
        } else {
            interfaces.iter().any(|i| i == name)
        };
        if !selected {
            continue;
        }
        let fields: Vec<&str> = counters.split_whitespace().collect();
        if fields.len() < 9 {
            return Err(SourceError::Malformed(format!(
                "short /proc/net/dev line for {name}"
            )));
        }
        let rx: u64 = fields[0]
            .parse()
            .map_err(|_| SourceError::Malformed(format!("bad rx bytes for {name}")))?;
        let tx: u64 = fields[8]
            .parse()
            .map_err(|_| SourceError::Malformed(format!("bad tx bytes for {name}")))?;
        rx_total = rx_total.wrapping_add(rx);
        tx_total = tx_total.wrapping_add(tx);
        matched += 1;
    }

    if matched == 0 && !interfaces.is_empty() {
        return Err(SourceError::Unreachable(format!(
            "none of the interfaces {interfaces:?} exist"
        )));
    }
    Ok((rx_total, tx_total))
}

/// Count established sockets in a `/proc/net/tcp`-format table.
///
/// With `port` set, only sockets whose local port matches are counted.
pub fn count_established(text: &str, port: Option<u16>) -> u64 {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _slot = fields.next()?;
            let local = fields.next()?;
            let _remote = fields.next()?;
            let state = fields.next()?;
            Some((local, state))
        })
        .filter(|(_, state)| *state == TCP_ESTABLISHED)
        .filter(|(local, _)| match port {
            None => true,
            Some(port) => local
                .rsplit_once(':')
                .and_then(|(_, hex)| u16::from_str_radix(hex, 16).ok())
                .is_some_and(|p| p == port),
        })
        .count() as u64
}

/// `(busy, total)` jiffies from the aggregate `cpu` line of `/proc/stat`.
pub fn parse_cpu_times(text: &str) -> Result<(u64, u64), SourceError> {
    let line = text
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| SourceError::Malformed("no aggregate cpu line".into()))?;
    let values: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(|v| v.parse::<u64>())
        .collect::<Result<_, _>>()
        .map_err(|_| SourceError::Malformed("non-numeric cpu field".into()))?;
    if values.len() < 4 {
        return Err(SourceError::Malformed("short cpu line".into()));
    }
    // Guest time is already folded into user/nice.
    let total: u64 = values.iter().take(8).sum();
    let idle = values[3] + values.get(4).copied().unwrap_or(0);
    Ok((total.saturating_sub(idle), total))
}

/// Busy percentage between two `/proc/stat` readings.
pub fn cpu_percent(previous: (u64, u64), current: (u64, u64)) -> f64 {
    let busy = current.0.saturating_sub(previous.0);
    let total = current.1.saturating_sub(previous.1);
    if total == 0 {
        return 0.0;
    }
    (busy as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Used memory percentage from `/proc/meminfo`.
pub fn parse_meminfo(text: &str) -> Result<f64, SourceError> {
    let field = |key: &str| -> Option<u64> {
        text.lines()
            .find_map(|l| l.strip_prefix(key))
            .and_then(|rest| rest.trim().trim_end_matches("kB").trim().parse().ok())
    };
    let total = field("MemTotal:")
        .ok_or_else(|| SourceError::Malformed("MemTotal missing".into()))?;
    let available = field("MemAvailable:")
        .or_else(|| field("MemFree:"))
        .ok_or_else(|| SourceError::Malformed("MemAvailable missing".into()))?;
    if total == 0 {
        return Err(SourceError::Malformed("MemTotal is zero".into()));
    }
    let used = total.saturating_sub(available);
    Ok(used as f64 / total as f64 * 100.0)
}

// ---------------------------------------------------------------------------
// LocalSource
// ---------------------------------------------------------------------------

/// Samples the local host.
pub struct LocalSource {
    proc_root: PathBuf,
    port: Option<u16>,
    probe: Option<String>,
    interfaces: Vec<String>,
    last_cpu: Mutex<Option<(u64, u64)>>,
}

impl LocalSource {
    pub fn new() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            port: None,
            probe: None,
            interfaces: Vec::new(),
            last_cpu: Mutex::new(None),
        }
    }

    /// Count only connections on this local port (the tunnel's listener).
    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    /// `host:port` to connect to when measuring latency.
    pub fn with_probe(mut self, probe: Option<String>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_interfaces(mut self, interfaces: Vec<String>) -> Self {
        self.interfaces = interfaces;
        self
    }

    /// Read procfs files from somewhere other than `/proc`.
    pub fn with_proc_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.proc_root = root.into();
        self
    }

    async fn read(&self, relative: &str) -> Result<String, SourceError> {
        read_proc(&self.proc_root.join(relative)).await
    }

    async fn connections(&self) -> Result<u64, SourceError> {
        let v4 = self.read("net/tcp").await?;
        // IPv6 may be disabled; a missing tcp6 table just means zero sockets.
        let v6 = self.read("net/tcp6").await.unwrap_or_default();
        Ok(count_established(&v4, self.port) + count_established(&v6, self.port))
    }

    async fn cpu(&self) -> Result<f64, SourceError> {
        let current = parse_cpu_times(&self.read("stat").await?)?;
        let previous = self.last_cpu.lock().replace(current);
        Ok(cpu_percent(previous.unwrap_or((0, 0)), current))
    }

    async fn latency(&self) -> Result<f64, SourceError> {
        let target = self
            .probe
            .as_deref()
            .ok_or(SourceError::Unsupported(MetricId::LatencyMs))?;
        let start = Instant::now();
        TcpStream::connect(target)
            .await
            .map_err(|e| SourceError::Unreachable(format!("{target}: {e}")))?;
        Ok(start.elapsed().as_secs_f64() * 1000.0)
    }
}

impl Default for LocalSource {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_proc(path: &Path) -> Result<String, SourceError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SourceError::Unreachable(format!("{}: {e}", path.display())))
}

#[async_trait]
impl MetricSource for LocalSource {
    fn name(&self) -> &str {
        "local"
    }

    async fn sample(
        &self,
        _endpoint: &EndpointId,
        metric: MetricId,
    ) -> Result<MetricValue, SourceError> {
        match metric {
            MetricId::BytesIn | MetricId::BytesOut => {
                let (rx, tx) = parse_net_dev(&self.read("net/dev").await?, &self.interfaces)?;
                let bytes = if metric == MetricId::BytesIn { rx } else { tx };
                Ok(MetricValue::Counter(bytes))
            }
            MetricId::ActiveConnections => self.connections().await.map(MetricValue::Gauge),
            MetricId::CpuPercent => self.cpu().await.map(MetricValue::Float),
            MetricId::MemoryPercent => {
                parse_meminfo(&self.read("meminfo").await?).map(MetricValue::Float)
            }
            MetricId::LatencyMs => self.latency().await.map(MetricValue::Float),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NET_DEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:  500000    100    0    0    0     0          0         0   500000     100    0    0    0     0       0          0
  eth0: 1000000   2000    0    0    0     0          0         0   250000    1500    0    0    0     0       0          0
  tun0:    4096     10    0    0    0     0          0         0     8192      12    0    0    0     0       0          0
";

    const TCP: &str = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000:20FB 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 1 1 0000000000000000 100 0 0 10 0
   1: 0100007F:20FB 0100007F:D2A4 01 00000000:00000000 00:00000000 00000000     0        0 2 1 0000000000000000 20 4 30 10 -1
   2: 0100007F:20FB 0100007F:D2A6 01 00000000:00000000 00:00000000 00000000     0        0 3 1 0000000000000000 20 4 30 10 -1
   3: 0100007F:0016 0100007F:D2A8 01 00000000:00000000 00:00000000 00000000     0        0 4 1 0000000000000000 20 4 30 10 -1
";

    const STAT: &str = "cpu  100 0 50 800 50 0 0 0 0 0\ncpu0 100 0 50 800 50 0 0 0 0 0\n";

    const MEMINFO: &str = "MemTotal:       1000000 kB\nMemFree:         100000 kB\nMemAvailable:    250000 kB\n";

    #[test]
    fn net_dev_skips_loopback_by_default() {
        assert_eq!(parse_net_dev(NET_DEV, &[]).unwrap(), (1_004_096, 258_192));
        assert_eq!(
            parse_net_dev(NET_DEV, &["tun0".to_string()]).unwrap(),
            (4096, 8192)
        );
        assert!(matches!(
            parse_net_dev(NET_DEV, &["wg0".to_string()]),
            Err(SourceError::Unreachable(_))
        ));
    }

    #[test]
    fn established_sockets_filtered_by_port() {
        assert_eq!(count_established(TCP, None), 3);
        assert_eq!(count_established(TCP, Some(0x20FB)), 2);
        assert_eq!(count_established(TCP, Some(22)), 1);
        assert_eq!(count_established(TCP, Some(80)), 0);
    }

    #[test]
    fn cpu_busy_share() {
        let first = parse_cpu_times(STAT).unwrap();
        assert_eq!(first, (150, 1000));
        let second = (first.0 + 30, first.1 + 100);
        assert!((cpu_percent(first, second) - 30.0).abs() < 1e-9);
        assert_eq!(cpu_percent(first, first), 0.0);
        assert!(parse_cpu_times("intr 1 2 3").is_err());
    }

    #[test]
    fn memory_used_share() {
        assert!((parse_meminfo(MEMINFO).unwrap() - 75.0).abs() < 1e-9);
        assert!(parse_meminfo("MemFree: 1 kB").is_err());
    }

    fn fake_proc() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("net")).unwrap();
        std::fs::write(dir.path().join("net/dev"), NET_DEV).unwrap();
        std::fs::write(dir.path().join("net/tcp"), TCP).unwrap();
        std::fs::write(dir.path().join("stat"), STAT).unwrap();
        std::fs::write(dir.path().join("meminfo"), MEMINFO).unwrap();
        dir
    }

    #[tokio::test]
    async fn samples_from_proc_root() {
        let dir = fake_proc();
        let src = LocalSource::new()
            .with_proc_root(dir.path())
            .with_port(Some(0x20FB));
        let id = EndpointId::new("client");

        assert_eq!(
            src.sample(&id, MetricId::BytesOut).await.unwrap(),
            MetricValue::Counter(258_192)
        );
        assert_eq!(
            src.sample(&id, MetricId::ActiveConnections).await.unwrap(),
            MetricValue::Gauge(2)
        );
        assert_eq!(
            src.sample(&id, MetricId::MemoryPercent).await.unwrap(),
            MetricValue::Float(75.0)
        );
        let cpu = src.sample(&id, MetricId::CpuPercent).await.unwrap();
        assert!((cpu.as_f64() - 15.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn latency_needs_a_probe() {
        let src = LocalSource::new();
        let err = src
            .sample(&EndpointId::new("client"), MetricId::LatencyMs)
            .await
            .unwrap_err();
        assert_eq!(err, SourceError::Unsupported(MetricId::LatencyMs));
    }

    #[tokio::test]
    async fn latency_times_a_connect() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let src = LocalSource::new().with_probe(Some(addr.to_string()));
        let v = src
            .sample(&EndpointId::new("client"), MetricId::LatencyMs)
            .await
            .unwrap();
        assert!(v.as_f64() >= 0.0);
    }

    #[tokio::test]
    async fn missing_files_are_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let src = LocalSource::new().with_proc_root(dir.path());
        let err = src
            .sample(&EndpointId::new("client"), MetricId::BytesIn)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Unreachable(_)));
    }
}

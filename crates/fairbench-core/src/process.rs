// Backend process accounting
//
// A ProcessSet is the typed handle relationship between a driver and its
// backend's OS processes: the driver resolves root pids once (from the
// engine, at provision/start time), and the set expands to descendants at
// query time so multi-worker servers are fully accounted for. There is no
// runtime name scanning.

use std::collections::{HashMap, VecDeque};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tracing::warn;

/// Clock tick rate for /proc CPU-time counters
///
/// utime/stime in /proc/<pid>/stat are reported in USER_HZ units, which is
/// fixed at 100 on Linux independent of the kernel tick rate.
pub const CLOCK_TICKS_PER_SEC: f64 = 100.0;

/// The OS processes belonging to one backend
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessSet {
    root_pids: Vec<u32>,
}

impl ProcessSet {
    pub fn new(root_pids: Vec<u32>) -> Self {
        Self { root_pids }
    }

    /// Empty set for a backend whose processes could not be resolved;
    /// sampling an empty set yields zero metrics, not an error
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.root_pids.is_empty()
    }

    pub fn root_pids(&self) -> &[u32] {
        &self.root_pids
    }

    /// Root pids plus all live descendants, resolved against the current
    /// process table
    pub fn expanded(&self, sys: &System) -> Vec<u32> {
        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for (pid, proc_) in sys.processes() {
            if let Some(parent) = proc_.parent() {
                children
                    .entry(parent.as_u32())
                    .or_default()
                    .push(pid.as_u32());
            }
        }

        let mut seen = Vec::new();
        let mut queue: VecDeque<u32> = self.root_pids.iter().copied().collect();
        while let Some(pid) = queue.pop_front() {
            if seen.contains(&pid) {
                continue;
            }
            seen.push(pid);
            if let Some(kids) = children.get(&pid) {
                queue.extend(kids.iter().copied());
            }
        }
        seen
    }

    /// Sum of cumulative CPU ticks (utime + stime) across the expanded set
    ///
    /// Processes that vanish or deny access contribute nothing; `None` only
    /// when not a single counter could be read.
    pub fn total_cpu_ticks(&self, sys: &System) -> Option<u64> {
        let mut total = 0u64;
        let mut any = false;
        for pid in self.expanded(sys) {
            if let Some(ticks) = read_cpu_ticks(pid) {
                total += ticks;
                any = true;
            }
        }
        any.then_some(total)
    }

    /// Sum of resident-set sizes across the expanded set, in KB
    pub fn total_rss_kb(&self, sys: &System) -> u64 {
        self.expanded(sys)
            .iter()
            .filter_map(|pid| sys.process(Pid::from_u32(*pid)))
            .map(|p| p.memory() / 1024)
            .sum()
    }
}

/// Fresh process table snapshot
pub fn snapshot() -> System {
    let mut sys = System::new_with_specifics(
        RefreshKind::new().with_processes(ProcessRefreshKind::everything()),
    );
    sys.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::everything());
    sys
}

/// Cumulative CPU ticks (utime + stime) for one pid from /proc
///
/// Read directly rather than through an instantaneous CPU percentage:
/// cumulative counters make the sampling window deterministic regardless of
/// when within the window each read lands.
pub fn read_cpu_ticks(pid: u32) -> Option<u64> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    parse_stat_ticks(&stat)
}

/// Extract utime + stime from a /proc/<pid>/stat line
///
/// The comm field may contain spaces and parentheses, so fields are counted
/// from the last ')': state is the first token after it, utime and stime are
/// the 12th and 13th.
fn parse_stat_ticks(stat: &str) -> Option<u64> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let utime: u64 = fields.nth(11)?.parse().ok()?;
    let stime: u64 = fields.next()?.parse().ok()?;
    Some(utime + stime)
}

/// Sum RSS values (KB) into megabytes
pub fn rss_sum_mb(rss_kb: impl IntoIterator<Item = u64>) -> f64 {
    rss_kb.into_iter().sum::<u64>() as f64 / 1024.0
}

/// Resolve pids whose command line contains every given needle
///
/// One-time lookup used by the VM driver at provision to pin its hypervisor
/// process; the result is stored in the handle, never re-scanned.
pub fn pids_matching_cmdline(sys: &System, needles: &[&str]) -> Vec<u32> {
    let mut pids: Vec<u32> = sys
        .processes()
        .iter()
        .filter(|(_, p)| {
            let cmdline = p
                .cmd()
                .iter()
                .map(|s| s.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ");
            needles.iter().all(|n| cmdline.contains(n))
        })
        .map(|(pid, _)| pid.as_u32())
        .collect();
    pids.sort_unstable();
    if pids.is_empty() {
        warn!(?needles, "no process matched command line");
    }
    pids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stat_ticks() {
        // Abbreviated but field-accurate /proc stat line: utime=1000,
        // stime=200.
        let stat = "1234 (nginx: worker) S 1 1234 1234 0 -1 4194560 500 0 0 0 1000 200 0 0 20 0 1 0 12345 1000000 250 18446744073709551615";
        assert_eq!(parse_stat_ticks(stat), Some(1200));
    }

    #[test]
    fn test_parse_stat_comm_with_parens() {
        // comm can itself contain ')'; only the last one delimits it.
        let stat = "99 (weird (name)) R 1 99 99 0 -1 0 0 0 0 0 50 25 0 0 20 0 1 0 1 1 1 1";
        assert_eq!(parse_stat_ticks(stat), Some(75));
    }

    #[test]
    fn test_parse_stat_garbage() {
        assert_eq!(parse_stat_ticks("not a stat line"), None);
        assert_eq!(parse_stat_ticks(""), None);
    }

    #[test]
    fn test_rss_sum_mb() {
        assert_eq!(rss_sum_mb([512, 256]), 0.75);
        assert_eq!(rss_sum_mb([]), 0.0);
        assert_eq!(rss_sum_mb([1024]), 1.0);
    }

    #[test]
    fn test_read_own_cpu_ticks() {
        // Our own process always has a readable stat file on Linux.
        let ticks = read_cpu_ticks(std::process::id());
        assert!(ticks.is_some());
    }

    #[test]
    fn test_expanded_includes_roots() {
        let sys = snapshot();
        let own = std::process::id();
        let set = ProcessSet::new(vec![own]);
        assert!(set.expanded(&sys).contains(&own));
    }

    #[test]
    fn test_empty_set_yields_zero_metrics() {
        let sys = snapshot();
        let set = ProcessSet::empty();
        assert!(set.is_empty());
        assert_eq!(set.total_cpu_ticks(&sys), None);
        assert_eq!(set.total_rss_kb(&sys), 0);
    }
}

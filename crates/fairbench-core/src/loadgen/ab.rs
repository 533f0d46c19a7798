// ApacheBench report parsing
//
// A narrow adapter from ab's plain-text report to the four statistics the
// StressRecord carries. Everything else in the report is ignored, and a
// statistic missing from the report parses to 0 so rows keep uniform shape.

/// Statistics extracted from one ab run
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AbReport {
    pub qps: f64,
    pub avg_latency_ms: f64,
    pub failed: u64,
    pub transfer_kbps: f64,
}

/// Parse an ab report
///
/// ab prints two "Time per request" lines; the first is the mean per
/// request, the second is across all concurrent requests. The mean is the
/// one comparable to single-request latency.
pub fn parse(output: &str) -> AbReport {
    let mut report = AbReport::default();
    let mut latency_taken = false;

    for line in output.lines() {
        if let Some(rest) = line.strip_prefix("Requests per second:") {
            report.qps = first_number(rest);
        } else if let Some(rest) = line.strip_prefix("Time per request:") {
            if !latency_taken {
                report.avg_latency_ms = first_number(rest);
                latency_taken = true;
            }
        } else if let Some(rest) = line.strip_prefix("Failed requests:") {
            report.failed = first_number(rest) as u64;
        } else if let Some(rest) = line.strip_prefix("Transfer rate:") {
            report.transfer_kbps = first_number(rest);
        }
    }

    report
}

/// First parseable number in a line fragment, or 0
fn first_number(s: &str) -> f64 {
    s.split_whitespace()
        .find_map(|token| token.parse::<f64>().ok())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
This is ApacheBench, Version 2.3 <$Revision: 1903618 $>

Server Software:        nginx/1.24.0
Server Hostname:        127.0.0.1
Server Port:            8080

Concurrency Level:      50
Time taken for tests:   15.455 seconds
Complete requests:      10000
Failed requests:        3
   (Connect: 0, Receive: 0, Length: 3, Exceptions: 0)
Requests per second:    647.12 [#/sec] (mean)
Time per request:       77.264 [ms] (mean)
Time per request:       1.545 [ms] (mean, across all concurrent requests)
Transfer rate:          523.90 [Kbytes/sec] received
";

    #[test]
    fn test_parse_full_report() {
        let report = parse(SAMPLE);
        assert_eq!(report.qps, 647.12);
        assert_eq!(report.avg_latency_ms, 77.264);
        assert_eq!(report.failed, 3);
        assert_eq!(report.transfer_kbps, 523.90);
    }

    #[test]
    fn test_first_time_per_request_line_wins() {
        let report = parse(SAMPLE);
        assert_ne!(report.avg_latency_ms, 1.545);
    }

    #[test]
    fn test_missing_statistics_default_to_zero() {
        let partial = "Requests per second:    100.00 [#/sec] (mean)\n";
        let report = parse(partial);
        assert_eq!(report.qps, 100.0);
        assert_eq!(report.avg_latency_ms, 0.0);
        assert_eq!(report.failed, 0);
        assert_eq!(report.transfer_kbps, 0.0);
    }

    #[test]
    fn test_empty_report() {
        assert_eq!(parse(""), AbReport::default());
    }
}

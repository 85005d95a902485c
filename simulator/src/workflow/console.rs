use parkcore::processing::{ReportSink, StatusReport, UpstreamStatus};

/// Prints each status report to stdout framed for an operator console.
pub struct ConsoleReportSink;

impl ReportSink for ConsoleReportSink {
    fn emit(&self, report: &StatusReport) {
        let width = match report.status() {
            UpstreamStatus::Available => 80,
            _ => 50,
        };
        let rule = "=".repeat(width);
        println!("\n{}\n[STATUS] {}\n{}", rule, report, rule);
    }
}

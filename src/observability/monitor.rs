use super::collector::MetricsReport;
use super::metrics::StreamReport;

/// Renders metrics reports for the periodic log line
pub struct MetricsMonitor {
    label: String,
}

impl MetricsMonitor {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    pub fn generate_report(&self, report: &MetricsReport) -> String {
        let mut text = format!("=== {} Metrics ===\n", self.label);

        text.push_str(&format_stream(&report.captured));
        for stream in report.streams.values() {
            text.push_str(&format_stream(stream));
        }

        text.push_str(&format!(
            "\n[buffer]\n  Dropped: {}{}\n",
            report.dropped,
            match report.last_dropped_sequence {
                Some(seq) => format!(" (last seq {})", seq),
                None => String::new(),
            }
        ));

        text
    }
}

fn format_stream(stream: &StreamReport) -> String {
    format!(
        "\n[{}]\n  Units: {}\n  Rate: {:.2} Hz\n  Jitter: {:.2} ms\n  Errors: {}\n",
        stream.name,
        stream.count,
        stream.rate_hz,
        stream.jitter_ms,
        stream.errors
    )
}

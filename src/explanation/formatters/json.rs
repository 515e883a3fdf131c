use crate::orchestrator::RiskReport;

/// JSON formatter for risk reports
pub struct JsonFormatter;

impl JsonFormatter {
    /// Format report as pretty-printed JSON
    pub fn format(report: &RiskReport) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(report)
    }

    /// Format report as compact JSON (no whitespace)
    pub fn format_compact(report: &RiskReport) -> Result<String, serde_json::Error> {
        serde_json::to_string(report)
    }
}

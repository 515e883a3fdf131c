use crate::context::DataQualityIndicator;
use crate::explanation::types::ExplanationChain;
use crate::orchestrator::RiskReport;
use crate::risk::RiskAssessment;

/// Markdown formatter for risk reports
pub struct MarkdownFormatter;

impl MarkdownFormatter {
    /// Format a full report as markdown
    pub fn format(report: &RiskReport) -> String {
        let assessment = &report.assessment;
        let mut md = String::with_capacity(2048);

        md.push_str(&format!("# Farm Risk: {}\n\n", assessment.level.display_text()));
        md.push_str(&format!("**Confidence:** {:.2}  \n", assessment.confidence));
        md.push_str(&format!("**Prediction:** `{}`  \n", assessment.prediction_id));
        if let Some(timeframe) = &assessment.timeframe {
            md.push_str(&format!(
                "**When:** {} (in {} days, for {} days)  \n",
                timeframe.label, timeframe.starts_in_days, timeframe.duration_days
            ));
        }
        md.push('\n');

        if assessment.degraded {
            md.push_str("> ⚠️ This assessment is DEGRADED: some checks did not complete.\n\n");
        }

        if !assessment.alerts.is_empty() {
            md.push_str("## Hard Alerts\n\n");
            for alert in &assessment.alerts {
                md.push_str(&format!("⛔ **{}** {}  \n", alert.kind.label(), alert.message));
                md.push_str(&format!("*Instead:* {}\n\n", alert.alternatives.join("; ")));
            }
        }

        md.push_str("## Reasoning\n\n");
        for statement in &assessment.reasoning {
            md.push_str(&format!("- {}\n", statement));
        }
        md.push('\n');

        Self::format_factors(&mut md, assessment);

        if !assessment.alternatives.is_empty() {
            md.push_str("## Options\n\n");
            md.push_str("| Option | Risk Reduction | Cost | Days | Suitability |\n");
            md.push_str("|--------|----------------|------|------|-------------|\n");
            for alt in &assessment.alternatives {
                md.push_str(&format!(
                    "| {} | {:.2} | {:.0} | {} | {:.2} |\n",
                    alt.description, alt.risk_reduction, alt.cost, alt.time_to_implement_days, alt.suitability
                ));
            }
            md.push('\n');
        }

        Self::format_explanation(&mut md, &report.explanation);

        let fallbacks: Vec<_> = assessment.quality.fallback_fields().collect();
        if !fallbacks.is_empty() {
            md.push_str("## Data Quality\n\n");
            md.push_str(&format!("**Completeness:** {:.2}\n\n", assessment.quality.completeness));
            for field in fallbacks {
                let marker = match field.source {
                    DataQualityIndicator::RegionalFallback => "🟡",
                    _ => "🔴",
                };
                md.push_str(&format!("{} {}: {}", marker, field.field.display_name(), field.source.as_str()));
                if let Some(note) = &field.note {
                    md.push_str(&format!(" ({})", note));
                }
                md.push_str("  \n");
            }
            md.push('\n');
        }

        md.push_str("---\n\n");
        let stages: Vec<String> = report.trace.stages.iter().map(|s| format!("{:?}", s)).collect();
        md.push_str(&format!(
            "*Stages:* {} · *{:.1} ms* · *models:* {}\n",
            stages.join(" → "),
            report.trace.elapsed_ms,
            assessment.model_versions().join(", ")
        ));
        md
    }

    fn format_factors(md: &mut String, assessment: &RiskAssessment) {
        if assessment.factors.is_empty() {
            return;
        }
        md.push_str("## Risk Factors\n\n");
        md.push_str("| Factor | Severity | Probability | Score | Confidence |\n");
        md.push_str("|--------|----------|-------------|-------|------------|\n");
        for factor in &assessment.factors {
            md.push_str(&format!(
                "| {} | {:.2} | {:.2} | {:.2} | {:.2} |\n",
                factor.id,
                factor.severity,
                factor.probability,
                factor.score(),
                factor.confidence
            ));
        }
        md.push('\n');

        if !assessment.unavailable.is_empty() {
            md.push_str("**Not assessed:**\n\n");
            for note in &assessment.unavailable {
                md.push_str(&format!("- {}: {}\n", note.analyzer.display_name(), note.reason));
            }
            md.push('\n');
        }
    }

    fn format_explanation(md: &mut String, chain: &ExplanationChain) {
        for layer in &chain.layers {
            md.push_str(&format!("## {}\n\n", layer.title));
            for line in &layer.lines {
                md.push_str(&format!("{}  \n", line));
            }
            md.push('\n');
        }
        if !chain.omitted.is_empty() {
            md.push_str("*Omitted:* ");
            let omitted: Vec<String> =
                chain.omitted.iter().map(|o| format!("{} ({})", o.kind.key(), o.reason)).collect();
            md.push_str(&omitted.join("; "));
            md.push_str("\n\n");
        }
    }
}

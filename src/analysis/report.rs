//! Report generation for sender-set analysis.
//!
//! Generates both JSON and human-readable text reports.

use std::fs;
use std::path::Path;

use color_eyre::eyre::{Context, Result};

use super::metrics::MetricAccumulator;
use super::types::*;
use crate::routing::ChoiceTable;
use crate::topology::TopologySet;

/// Assemble the run report from a finished accumulator
pub fn build_report(
    metadata: ReportMetadata,
    metrics: &MetricAccumulator,
    topologies: &TopologySet,
    choices: Option<&ChoiceTable>,
) -> AnonymityReport {
    AnonymityReport {
        metadata,
        families: metrics.finalize(topologies, choices),
        intercept_hops: metrics.intercept_hops().clone(),
        by_hop: metrics.hop_summaries(),
    }
}

/// Generate JSON report
pub fn generate_json_report(report: &AnonymityReport, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report to JSON")?;

    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON report to {}", output_path.display()))?;

    log::info!("JSON report written to {}", output_path.display());
    Ok(())
}

/// Generate human-readable text report
pub fn generate_text_report(report: &AnonymityReport, output_path: &Path) -> Result<()> {
    fs::write(output_path, render_text(report))
        .with_context(|| format!("Failed to write text report to {}", output_path.display()))?;

    log::info!("Text report written to {}", output_path.display());
    Ok(())
}

fn render_text(report: &AnonymityReport) -> String {
    let mut lines: Vec<String> = Vec::new();

    // Header
    lines.push("=".repeat(80));
    lines.push("                       SENDER ANONYMITY ANALYSIS".to_string());
    lines.push("=".repeat(80));
    lines.push(String::new());

    let meta = &report.metadata;
    lines.push(format!("Analysis Date: {}", meta.analysis_timestamp));
    lines.push(format!("Routes File: {}", meta.routes_file));
    lines.push(format!("Topology: {} ({} snapshots)", meta.topology_path, meta.snapshots));
    lines.push(format!("Router: {}", meta.router));
    lines.push(format!(
        "Records: {} read, {} malformed, {} filtered",
        meta.records_read, meta.records_malformed, meta.records_filtered
    ));
    lines.push(String::new());

    for family in &report.families {
        lines.push("=".repeat(80));
        lines.push(format!("  {}", family.name.to_uppercase().replace('_', " ")));
        lines.push("=".repeat(80));
        for metric in &family.metrics {
            lines.push(format!(
                "  {:<10} {:<50} {:>14.5}",
                metric.short, metric.long, metric.value
            ));
        }
        lines.push(String::new());
    }

    if !report.intercept_hops.is_empty() {
        lines.push("=".repeat(80));
        lines.push("  INTERCEPTION BY HOP".to_string());
        lines.push("=".repeat(80));
        lines.push(format!(
            "  {:>4} {:>12} {:>12} {:>10} {:>10} {:>10}",
            "Hop", "Intercepted", "Calculated", "TopRank%", "BestHit%", "NormEnt"
        ));
        for summary in &report.by_hop {
            lines.push(format!(
                "  {:>4} {:>12} {:>12} {:>10.1} {:>10.1} {:>10.3}",
                summary.hop,
                summary.intercepted,
                summary.calculated,
                summary.top_rank_hit_percent * 100.0,
                summary.best_entropy_hit_percent * 100.0,
                summary.normalized_entropy_avg
            ));
        }
        lines.push(String::new());
    }

    lines.push("=".repeat(80));
    lines.join("\n")
}

/// Print a short summary to stdout
pub fn print_summary(report: &AnonymityReport) {
    let value = |short: &str| report.metric(short).unwrap_or(0.0);

    println!("\n=== SENDER ANONYMITY SUMMARY ===\n");
    println!("Messages: {}", value("M_c"));
    println!(
        "Intercepted: {} ({:.1}%)",
        value("I_c"),
        value("I_p") * 100.0
    );
    println!(
        "Sender sets calculated: {} ({:.1}% of intercepted)",
        value("SC_c"),
        value("SC_p") * 100.0
    );
    println!("Failed: {}", value("E_c"));

    if value("SC_c") > 0.0 {
        println!("\nAnonymity:");
        println!("  Sender set size: {:.2} (std {:.2})", value("SS_a"), value("SS_s"));
        println!("  Normalized entropy: {:.3}", value("EN_N_a"));
        println!("  Top rank hit rate: {:.1}%", value("TR_H_p") * 100.0);
        println!("  Best probability hit rate: {:.1}%", value("EN_BH_p") * 100.0);
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn report() -> AnonymityReport {
        let metadata = ReportMetadata {
            analysis_timestamp: "2024-01-01T00:00:00Z".to_string(),
            routes_file: "routes.json".to_string(),
            topology_path: "topology".to_string(),
            router: "greedy".to_string(),
            snapshots: 0,
            records_read: 0,
            records_malformed: 0,
            records_filtered: 0,
        };
        build_report(metadata, &MetricAccumulator::new(), &TopologySet::new(), None)
    }

    #[test]
    fn test_json_report_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        let report = report();
        generate_json_report(&report, &path).unwrap();

        let back: AnonymityReport = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.families, report.families);
        assert_eq!(back.metric("M_c"), Some(0.0));
    }

    #[test]
    fn test_text_report_lists_every_metric() {
        let report = report();
        let text = render_text(&report);
        assert!(text.contains("SENDER ANONYMITY ANALYSIS"));
        assert!(text.contains("SENDER SET"));
        for family in &report.families {
            for metric in &family.metrics {
                assert!(text.contains(&metric.long), "missing {}", metric.long);
            }
        }
    }
}

//! JSON output formatter for machine-readable results.

use super::formatter::JsonOutput;
use super::formatter::OutputFormatter;
use anyhow::Result;
use serde::Serialize;
use std::io::Write;
use std::io::{self};
use std::path::Path;
use unpack_core::StrategyKind;
use unpack_core::UnpackReport;
use unpack_core::registry::Candidate;

pub struct JsonFormatter;

impl JsonFormatter {
    fn output<T: Serialize>(value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        writeln!(io::stdout(), "{json}")?;
        Ok(())
    }
}

#[derive(Serialize)]
struct ExtractionOutput<'a> {
    artifact: String,
    target: String,
    layers: &'a [StrategyKind],
    entries: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    license_text: Option<&'a str>,
    duration_ms: u128,
}

impl<'a> ExtractionOutput<'a> {
    fn new(artifact: &Path, report: &'a UnpackReport) -> Self {
        Self {
            artifact: artifact.display().to_string(),
            target: report.target.display().to_string(),
            layers: &report.layers,
            entries: &report.entries,
            license_text: report.license_text.as_deref(),
            duration_ms: report.duration.as_millis(),
        }
    }
}

#[derive(Serialize)]
struct DetectionOutput<'a> {
    artifact: String,
    kind: StrategyKind,
    #[serde(skip_serializing_if = "<[Candidate]>::is_empty")]
    candidates: &'a [Candidate],
}

impl OutputFormatter for JsonFormatter {
    fn format_extraction_result(&self, artifact: &Path, report: &UnpackReport) -> Result<()> {
        let output = JsonOutput::success("extract", ExtractionOutput::new(artifact, report));
        Self::output(&output)
    }

    fn format_detection(
        &self,
        artifact: &Path,
        kind: StrategyKind,
        candidates: &[Candidate],
    ) -> Result<()> {
        let data = DetectionOutput {
            artifact: artifact.display().to_string(),
            kind,
            candidates,
        };
        let output = JsonOutput::success("detect", data);
        Self::output(&output)
    }

    fn format_error(&self, error: &anyhow::Error) {
        let output = JsonOutput::error("error", format!("{error:#}"));
        let _ = Self::output(&output);
    }
}

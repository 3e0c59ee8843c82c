//! Human-readable output formatter with colors and styling.

use super::formatter::OutputFormatter;
use crate::progress::humanize_duration;
use anyhow::Result;
use console::Term;
use console::style;
use std::path::Path;
use unpack_core::MatchBasis;
use unpack_core::StrategyKind;
use unpack_core::UnpackReport;
use unpack_core::registry::Candidate;

pub struct HumanFormatter {
    verbose: bool,
    quiet: bool,
    use_colors: bool,
    term: Term,
    err_term: Term,
}

impl HumanFormatter {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            verbose,
            quiet,
            use_colors: console::colors_enabled(),
            term: Term::stdout(),
            err_term: Term::stderr(),
        }
    }

    /// Renders the layer chain outermost first, e.g. `xz → tar`.
    fn format_layers(layers: &[StrategyKind]) -> String {
        layers
            .iter()
            .map(|kind| kind.name())
            .collect::<Vec<_>>()
            .join(" → ")
    }

    fn format_basis(basis: MatchBasis) -> &'static str {
        match basis {
            MatchBasis::Content => "content",
            MatchBasis::Extension => "extension",
            MatchBasis::Both => "content + extension",
        }
    }

    fn format_number(n: usize) -> String {
        let s = n.to_string();
        let mut result = String::new();
        let mut count = 0;

        for c in s.chars().rev() {
            if count == 3 {
                result.push(',');
                count = 0;
            }
            result.push(c);
            count += 1;
        }

        result.chars().rev().collect()
    }
}

impl OutputFormatter for HumanFormatter {
    fn format_extraction_result(&self, artifact: &Path, report: &UnpackReport) -> Result<()> {
        if self.quiet {
            return Ok(());
        }

        let name = artifact
            .file_name()
            .map_or_else(|| artifact.display().to_string(), |n| n.to_string_lossy().into_owned());
        if self.use_colors {
            let _ = self.term.write_line(&format!(
                "{} Extracted {name}",
                style("✓").green().bold()
            ));
        } else {
            let _ = self.term.write_line(&format!("Extracted {name}"));
        }

        let _ = self.term.write_line(&format!(
            "  Format:  {}",
            Self::format_layers(&report.layers)
        ));
        let _ = self
            .term
            .write_line(&format!("  Target:  {}", report.target.display()));
        let _ = self.term.write_line(&format!(
            "  Entries: {}",
            Self::format_number(report.entries.len())
        ));

        if self.verbose {
            for entry in &report.entries {
                let _ = self.term.write_line(&format!("    {entry}"));
            }
            let _ = self.term.write_line(&format!(
                "  Duration: {}",
                humanize_duration(report.duration)
            ));
            if let Some(license) = &report.license_text {
                let _ = self.term.write_line("");
                let _ = self.term.write_line("License agreement:");
                for line in license.lines() {
                    let _ = self.term.write_line(&format!("  {line}"));
                }
            }
        }

        Ok(())
    }

    fn format_detection(
        &self,
        artifact: &Path,
        kind: StrategyKind,
        candidates: &[Candidate],
    ) -> Result<()> {
        if self.quiet {
            let _ = self.term.write_line(kind.name());
            return Ok(());
        }

        let kind_label = if self.use_colors {
            style(kind.name()).cyan().bold().to_string()
        } else {
            kind.name().to_string()
        };
        let _ = self
            .term
            .write_line(&format!("{}: {kind_label}", artifact.display()));

        for candidate in candidates {
            let marker = if candidate.kind == kind { "*" } else { " " };
            let _ = self.term.write_line(&format!(
                "  {marker} {:<28} {}",
                candidate.kind.name(),
                Self::format_basis(candidate.basis)
            ));
        }

        Ok(())
    }

    fn format_error(&self, error: &anyhow::Error) {
        // Always show errors, even in quiet mode
        if self.use_colors {
            let _ = self
                .err_term
                .write_line(&format!("{} {error:?}", style("ERROR:").red().bold()));
        } else {
            let _ = self.err_term.write_line(&format!("ERROR: {error:?}"));
        }
    }
}

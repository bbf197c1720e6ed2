use crate::error::AuditError;
use crate::improve::{AssessmentRun, IterationRecord, RunStatus, RunSummary, format_score};
use crate::score::Assessment;
use gallery_audit_contract::SCORE_SCALE_MAX;
use log::info;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

pub const ITERATIONS_FILE: &str = "iterations.json";
pub const SUMMARY_FILE: &str = "summary.json";
pub const FINAL_REPORT_FILE: &str = "final-report.txt";
pub const ASSESSMENT_FILE: &str = "assessment.json";
pub const ASSESSMENT_REPORT_FILE: &str = "assessment-report.txt";

/// Writes round logs and reports under the logs directory.
#[derive(Debug, Clone)]
pub struct RunJournal {
    logs_dir: PathBuf,
}

impl RunJournal {
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
        }
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<PathBuf, AuditError> {
        fs::create_dir_all(&self.logs_dir)?;
        let path = self.logs_dir.join(name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json)?;
        Ok(path)
    }

    fn write_text(&self, name: &str, text: &str) -> Result<PathBuf, AuditError> {
        fs::create_dir_all(&self.logs_dir)?;
        let path = self.logs_dir.join(name);
        fs::write(&path, text)?;
        Ok(path)
    }

    /// Flushes the newest round as `iteration-<N>.json` and the whole log so
    /// far as `iterations.json`.
    pub fn write_round(&self, records: &[IterationRecord]) -> Result<(), AuditError> {
        let Some(last) = records.last() else {
            return Ok(());
        };
        self.write_json(&format!("iteration-{}.json", last.iteration), last)?;
        self.write_json(ITERATIONS_FILE, records)?;
        Ok(())
    }

    pub fn write_summary(
        &self,
        summary: &RunSummary,
        records: &[IterationRecord],
    ) -> Result<(), AuditError> {
        self.write_json(SUMMARY_FILE, summary)?;
        let path = self.write_text(FINAL_REPORT_FILE, &render_final_report(summary, records))?;
        info!("final report written to {}", path.display());
        Ok(())
    }

    pub fn write_assessment(&self, run: &AssessmentRun) -> Result<(), AuditError> {
        self.write_json(ASSESSMENT_FILE, run)?;
        let path = self.write_text(ASSESSMENT_REPORT_FILE, &render_assessment_report(run))?;
        info!("assessment report written to {}", path.display());
        Ok(())
    }
}

fn status_line(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Success => "SUCCESS - every page meets the target score",
        RunStatus::Incomplete => "INCOMPLETE - iteration budget exhausted before every page passed",
        RunStatus::Stalled => "STALLED - no automatic fix available, manual review required",
    }
}

fn rule(out: &mut String) {
    out.push_str(&"=".repeat(72));
    out.push('\n');
}

fn render_assessment(out: &mut String, assessment: &Assessment) {
    let _ = writeln!(
        out,
        "\n{} / {} ({})  overall {:.2}/{}{}",
        assessment.theme,
        assessment.page.name,
        assessment.page.path,
        assessment.overall_score,
        SCORE_SCALE_MAX,
        if assessment.needs_improvement {
            "  [needs improvement]"
        } else {
            ""
        }
    );
    if let Some(applied) = &assessment.applied_theme {
        if applied != assessment.theme.name() {
            let _ = writeln!(out, "  applied theme was {applied}");
        }
    }
    for result in assessment.analyzer_results() {
        let _ = writeln!(out, "  {}: {:.2}/{}", result.name, result.score, SCORE_SCALE_MAX);
        for finding in &result.findings {
            let mark = if finding.passed { "ok " } else { "!! " };
            let _ = writeln!(out, "    {mark}{}", finding.question);
            let _ = writeln!(out, "        {}", finding.answer);
        }
    }
}

pub fn render_final_report(summary: &RunSummary, records: &[IterationRecord]) -> String {
    let mut out = String::new();
    rule(&mut out);
    out.push_str("Design gallery audit: final report\n");
    rule(&mut out);
    let _ = writeln!(out, "Status: {}", status_line(summary.status));
    let _ = writeln!(out, "Finished: {}", summary.finished_at.to_rfc3339());
    let _ = writeln!(out, "Rounds: {}", summary.iterations);
    let _ = writeln!(out, "Final average score: {}", format_score(summary.final_average));
    let _ = writeln!(out, "Final minimum score: {}", format_score(summary.final_minimum));
    let _ = writeln!(out, "Scoring contract: {}", summary.contract_fingerprint);

    out.push_str("\nScore trend\n");
    for record in records {
        let _ = writeln!(
            out,
            "  round {:>2}: average {:>5}  minimum {:>5}  needs work {:>3}  skipped {}  rebuilds {}",
            record.iteration,
            format_score(record.average_score),
            format_score(record.minimum_score),
            record.issues_found,
            record.skipped.len(),
            record.rebuilds
        );
    }

    if let Some(last) = records.last() {
        out.push('\n');
        rule(&mut out);
        let _ = writeln!(out, "Round {} details", last.iteration);
        rule(&mut out);
        for assessment in &last.assessments {
            render_assessment(&mut out, assessment);
        }
        if !last.skipped.is_empty() {
            out.push_str("\nSkipped\n");
            for skipped in &last.skipped {
                let _ = writeln!(out, "  {} / {}: {}", skipped.theme, skipped.page, skipped.reason);
            }
        }
    }
    out
}

pub fn render_assessment_report(run: &AssessmentRun) -> String {
    let mut out = String::new();
    rule(&mut out);
    out.push_str("Design gallery audit: assessment\n");
    rule(&mut out);
    let _ = writeln!(out, "Measured: {}", run.timestamp.to_rfc3339());
    let _ = writeln!(out, "Pages assessed: {}", run.assessments.len());
    let _ = writeln!(out, "Average score: {}", format_score(run.average_score));
    let _ = writeln!(out, "Minimum score: {}", format_score(run.minimum_score));
    let needing = run.assessments.iter().filter(|a| a.needs_improvement).count();
    let _ = writeln!(out, "Needing improvement: {needing}");
    for assessment in &run.assessments {
        render_assessment(&mut out, assessment);
    }
    for skipped in &run.skipped {
        let _ = writeln!(out, "\nskipped {} / {}: {}", skipped.theme, skipped.page, skipped.reason);
    }
    out
}

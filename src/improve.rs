//! The improvement loop: measure every (theme, page), patch what fails,
//! rebuild, re-photograph, and stop on success, stall or budget.

use crate::capture::{CaptureRecord, SiteBuilder, SiteProbe};
use crate::error::AuditError;
use crate::patch::StylesheetPatcher;
use crate::report::RunJournal;
use crate::score::{Assessment, ImprovementPolicy};
use crate::types::{PageTarget, ThemeId};
use chrono::{DateTime, Utc};
use gallery_audit_contract::contract_fingerprint_sha256;
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub themes: Vec<ThemeId>,
    pub pages: Vec<PageTarget>,
    pub max_iterations: u32,
    pub threshold: f64,
    pub policy: ImprovementPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedPair {
    pub theme: ThemeId,
    pub page: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchKind {
    Contrast,
    Spacing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchRecord {
    pub theme: ThemeId,
    pub page: String,
    pub kind: PatchKind,
    pub changed: bool,
}

/// One round. Written to disk before the termination test runs and never
/// changed afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
    pub assessments: Vec<Assessment>,
    pub average_score: Option<f64>,
    pub minimum_score: Option<f64>,
    pub issues_found: usize,
    pub skipped: Vec<SkippedPair>,
    pub patches: Vec<PatchRecord>,
    pub captures: Vec<CaptureRecord>,
    pub rebuilds: usize,
    pub stylesheet_fingerprints: BTreeMap<String, String>,
    pub contract_fingerprint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    /// The iteration budget ran out first.
    Incomplete,
    /// Nothing left to fix automatically but thresholds not met, or nothing
    /// could be measured. Needs manual review.
    Stalled,
}

impl RunStatus {
    pub fn label(self) -> &'static str {
        match self {
            RunStatus::Success => "SUCCESS",
            RunStatus::Incomplete => "INCOMPLETE",
            RunStatus::Stalled => "STALLED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub iterations: u32,
    pub final_average: Option<f64>,
    pub final_minimum: Option<f64>,
    pub finished_at: DateTime<Utc>,
    pub contract_fingerprint: String,
}

/// Result of a one-shot assessment: no patches, one screenshot per pair.
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentRun {
    pub timestamp: DateTime<Utc>,
    pub assessments: Vec<Assessment>,
    pub average_score: Option<f64>,
    pub minimum_score: Option<f64>,
    pub skipped: Vec<SkippedPair>,
    pub captures: Vec<CaptureRecord>,
    pub contract_fingerprint: String,
}

fn score_stats(assessments: &[Assessment]) -> (Option<f64>, Option<f64>) {
    if assessments.is_empty() {
        return (None, None);
    }
    let sum: f64 = assessments.iter().map(|a| a.overall_score).sum();
    let min = assessments
        .iter()
        .map(|a| a.overall_score)
        .fold(f64::INFINITY, f64::min);
    (Some(sum / assessments.len() as f64), Some(min))
}

fn meets(value: Option<f64>, threshold: f64) -> bool {
    value.is_some_and(|v| v >= threshold)
}

pub struct ImprovementLoop<'a> {
    settings: &'a LoopSettings,
    probe: &'a mut dyn SiteProbe,
    builder: &'a mut dyn SiteBuilder,
    patcher: &'a StylesheetPatcher,
    journal: &'a RunJournal,
}

impl<'a> ImprovementLoop<'a> {
    pub fn new(
        settings: &'a LoopSettings,
        probe: &'a mut dyn SiteProbe,
        builder: &'a mut dyn SiteBuilder,
        patcher: &'a StylesheetPatcher,
        journal: &'a RunJournal,
    ) -> Self {
        Self {
            settings,
            probe,
            builder,
            patcher,
            journal,
        }
    }

    /// Runs rounds until success, stall or the iteration budget. A rebuild
    /// failure aborts the run with the error.
    pub fn run(&mut self) -> Result<(RunSummary, Vec<IterationRecord>), AuditError> {
        let threshold = self.settings.threshold;
        let mut records: Vec<IterationRecord> = Vec::new();
        let mut status = RunStatus::Incomplete;
        for iteration in 1..=self.settings.max_iterations {
            info!(
                "round {} of {} started",
                iteration, self.settings.max_iterations
            );
            let record = self.run_round(iteration)?;
            records.push(record);
            self.journal.write_round(&records)?;

            let record = &records[records.len() - 1];
            info!(
                "round {} finished: average {}, minimum {}, {} pair(s) need work",
                iteration,
                format_score(record.average_score),
                format_score(record.minimum_score),
                record.issues_found
            );
            if record.assessments.is_empty() {
                warn!("round {} assessed no pages, manual review required", iteration);
                status = RunStatus::Stalled;
                break;
            }
            let scores_met =
                meets(record.minimum_score, threshold) && meets(record.average_score, threshold);
            if scores_met && record.skipped.is_empty() {
                status = RunStatus::Success;
                break;
            }
            if record.issues_found == 0 {
                if scores_met {
                    warn!(
                        "round {} passed on measured pages but skipped {} pair(s), manual review required",
                        iteration,
                        record.skipped.len()
                    );
                } else {
                    warn!(
                        "round {} found nothing to fix but thresholds are not met, manual review required",
                        iteration
                    );
                }
                status = RunStatus::Stalled;
                break;
            }
        }

        let last = records.last();
        let summary = RunSummary {
            status,
            iterations: records.len() as u32,
            final_average: last.and_then(|r| r.average_score),
            final_minimum: last.and_then(|r| r.minimum_score),
            finished_at: Utc::now(),
            contract_fingerprint: contract_fingerprint_sha256(),
        };
        self.journal.write_summary(&summary, &records)?;
        info!("run finished: {}", summary.status.label());
        Ok((summary, records))
    }

    fn run_round(&mut self, iteration: u32) -> Result<IterationRecord, AuditError> {
        let timestamp = Utc::now();
        let mut assessments = Vec::new();
        let mut skipped = Vec::new();
        let mut patches = Vec::new();
        let mut captures = Vec::new();
        let mut rebuilds = 0;

        for &theme in &self.settings.themes {
            for page in &self.settings.pages {
                let measurement = match self.probe.measure(theme, page) {
                    Ok(measurement) => measurement,
                    Err(err) => {
                        warn!("skipping {} / {}: {}", theme, page.name, err);
                        skipped.push(SkippedPair {
                            theme,
                            page: page.name.clone(),
                            reason: err.to_string(),
                        });
                        continue;
                    }
                };
                let assessment = Assessment::from_measurement(
                    theme,
                    page,
                    &measurement,
                    self.settings.policy,
                    self.settings.threshold,
                );
                info!(
                    "{} / {}: overall {:.2} (contrast {:.2}, spacing {:.2}, typography {:.2}, professionalism {:.2})",
                    theme,
                    page.name,
                    assessment.overall_score,
                    assessment.contrast.score,
                    assessment.spacing.overall_score,
                    assessment.typography.score,
                    assessment.professionalism.score
                );

                if assessment.needs_improvement {
                    self.capture_into(&mut captures, theme, page, &format!("iter{iteration}-before"));
                    let mut changed = false;
                    if assessment.wants_contrast_fix() {
                        let outcome = self.patch(PatchKind::Contrast, theme, page);
                        changed |= outcome.changed;
                        patches.push(outcome);
                    }
                    if assessment.wants_spacing_fix(self.settings.threshold) {
                        let outcome = self.patch(PatchKind::Spacing, theme, page);
                        changed |= outcome.changed;
                        patches.push(outcome);
                    }
                    if changed {
                        self.builder.rebuild()?;
                        rebuilds += 1;
                        self.capture_into(&mut captures, theme, page, &format!("iter{iteration}-after"));
                    }
                } else {
                    self.capture_into(&mut captures, theme, page, &format!("iter{iteration}-final"));
                }
                assessments.push(assessment);
            }
        }

        let (average_score, minimum_score) = score_stats(&assessments);
        let issues_found = assessments.iter().filter(|a| a.needs_improvement).count();
        Ok(IterationRecord {
            iteration,
            timestamp,
            assessments,
            average_score,
            minimum_score,
            issues_found,
            skipped,
            patches,
            captures,
            rebuilds,
            stylesheet_fingerprints: self.patcher.fingerprints(),
            contract_fingerprint: contract_fingerprint_sha256(),
        })
    }

    /// Stylesheet errors are logged and count as "no change".
    fn patch(&self, kind: PatchKind, theme: ThemeId, page: &PageTarget) -> PatchRecord {
        let result = match kind {
            PatchKind::Contrast => self.patcher.fix_contrast(theme),
            PatchKind::Spacing => self.patcher.fix_spacing(),
        };
        let changed = result.unwrap_or_else(|err| {
            warn!("{:?} fix for {} / {} failed: {}", kind, theme, page.name, err);
            false
        });
        PatchRecord {
            theme,
            page: page.name.clone(),
            kind,
            changed,
        }
    }

    fn capture_into(
        &mut self,
        captures: &mut Vec<CaptureRecord>,
        theme: ThemeId,
        page: &PageTarget,
        tag: &str,
    ) {
        match self.probe.capture(theme, page, tag) {
            Ok(record) => captures.push(record),
            Err(err) => warn!("screenshot {} of {} / {} failed: {}", tag, theme, page.name, err),
        }
    }
}

/// One measurement pass over every pair without patching.
pub fn assess_all(
    settings: &LoopSettings,
    probe: &mut dyn SiteProbe,
) -> AssessmentRun {
    let timestamp = Utc::now();
    let mut assessments = Vec::new();
    let mut skipped = Vec::new();
    let mut captures = Vec::new();
    for &theme in &settings.themes {
        for page in &settings.pages {
            match probe.measure(theme, page) {
                Ok(measurement) => {
                    let assessment = Assessment::from_measurement(
                        theme,
                        page,
                        &measurement,
                        settings.policy,
                        settings.threshold,
                    );
                    info!(
                        "{} / {}: overall {:.2}",
                        theme, page.name, assessment.overall_score
                    );
                    assessments.push(assessment);
                }
                Err(err) => {
                    warn!("skipping {} / {}: {}", theme, page.name, err);
                    skipped.push(SkippedPair {
                        theme,
                        page: page.name.clone(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            }
            match probe.capture(theme, page, "assessment") {
                Ok(record) => captures.push(record),
                Err(err) => warn!("screenshot of {} / {} failed: {}", theme, page.name, err),
            }
        }
    }
    let (average_score, minimum_score) = score_stats(&assessments);
    AssessmentRun {
        timestamp,
        assessments,
        average_score,
        minimum_score,
        skipped,
        captures,
        contract_fingerprint: contract_fingerprint_sha256(),
    }
}

pub fn format_score(score: Option<f64>) -> String {
    score
        .map(|s| format!("{s:.2}"))
        .unwrap_or_else(|| "n/a".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::ContrastFixStrategy;
    use crate::snapshot::{ContainerSample, FontSizes, PageMeasurement, PageSnapshot, StyleSample};
    use std::cell::Cell;
    use std::fs;
    use std::path::PathBuf;
    use std::rc::Rc;

    const GOOD_MARKUP: &str = r#"<html><head><title>Gallery</title>
<meta name="description" content="Themes">
<meta name="viewport" content="width=device-width">
<link rel="canonical" href="https://gallery.example/">
<meta property="og:title" content="Gallery"><meta property="og:description" content="Themes">
</head><body><header><nav></nav></header><main><h1>Gallery</h1><h2>Themes</h2></main><footer></footer></body></html>"#;

    fn snapshot(good: bool) -> PageSnapshot {
        let (color, background) = if good {
            ("rgb(0, 0, 0)", "rgb(255, 255, 255)")
        } else {
            ("rgb(120, 120, 120)", "rgb(110, 110, 110)")
        };
        let container = if good {
            ContainerSample {
                label: "div.card".into(),
                padding_top: 16.0,
                padding_bottom: 16.0,
                padding_left: 24.0,
                padding_right: 24.0,
                margin_top: 0.0,
                margin_bottom: 16.0,
            }
        } else {
            ContainerSample {
                label: "div.card".into(),
                padding_top: 4.0,
                padding_bottom: 30.0,
                ..ContainerSample::default()
            }
        };
        PageSnapshot {
            applied_theme: Some("onyx".into()),
            styles: vec![StyleSample {
                tag: "p".into(),
                color: color.into(),
                background: background.into(),
                text: "hello".into(),
            }],
            containers: vec![container],
            font_sizes: FontSizes {
                h1: 40.0,
                h2: 28.0,
                body: 16.0,
            },
            markup: GOOD_MARKUP.into(),
        }
    }

    struct FakeProbe {
        fixed: Rc<Cell<bool>>,
        unreachable: bool,
        /// Page names that fail to load.
        down_pages: Vec<String>,
        tags: Vec<String>,
    }

    impl FakeProbe {
        fn new(fixed: Rc<Cell<bool>>) -> Self {
            Self {
                fixed,
                unreachable: false,
                down_pages: Vec::new(),
                tags: Vec::new(),
            }
        }
    }

    impl SiteProbe for FakeProbe {
        fn measure(
            &mut self,
            _theme: ThemeId,
            page: &PageTarget,
        ) -> Result<PageMeasurement, AuditError> {
            if self.unreachable || self.down_pages.contains(&page.name) {
                return Err(AuditError::Navigation {
                    url: page.path.clone(),
                    message: "connection refused".into(),
                });
            }
            Ok(PageMeasurement::from_snapshot(snapshot(self.fixed.get())))
        }

        fn capture(
            &mut self,
            _theme: ThemeId,
            _page: &PageTarget,
            tag: &str,
        ) -> Result<CaptureRecord, AuditError> {
            self.tags.push(tag.to_string());
            Ok(CaptureRecord {
                path: PathBuf::from(format!("{tag}.png")),
                tag: tag.to_string(),
                width: 1920,
                height: 1080,
                theme_verified: true,
            })
        }
    }

    struct FakeBuilder {
        fixes_site: Option<Rc<Cell<bool>>>,
        fail: bool,
        calls: usize,
    }

    impl SiteBuilder for FakeBuilder {
        fn rebuild(&mut self) -> Result<(), AuditError> {
            self.calls += 1;
            if self.fail {
                return Err(AuditError::Rebuild("exit status: 1".into()));
            }
            if let Some(fixed) = &self.fixes_site {
                fixed.set(true);
            }
            Ok(())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        logs: PathBuf,
        patcher: StylesheetPatcher,
        journal: RunJournal,
        settings: LoopSettings,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let themes = dir.path().join("themes.css");
        let base = dir.path().join("base.css");
        fs::write(
            &themes,
            "[data-theme=\"onyx\"] {\n  --color-text-primary: #444444;\n  --color-bg-primary: #222222;\n}\n",
        )
        .unwrap();
        fs::write(&base, "body { margin: 0; }\n\n/* Layout */\n").unwrap();
        let logs = dir.path().join("logs");
        Fixture {
            patcher: StylesheetPatcher::new(themes, base, ContrastFixStrategy::Palette, 4.5),
            journal: RunJournal::new(&logs),
            logs,
            settings: LoopSettings {
                themes: vec![ThemeId::Onyx],
                pages: vec![PageTarget::new("/", "home")],
                max_iterations: 10,
                threshold: 4.5,
                policy: ImprovementPolicy::default(),
            },
            _dir: dir,
        }
    }

    #[test]
    fn clean_site_succeeds_in_one_round() {
        let fx = fixture();
        let mut probe = FakeProbe::new(Rc::new(Cell::new(true)));
        let mut builder = FakeBuilder {
            fixes_site: None,
            fail: false,
            calls: 0,
        };
        let (summary, records) = ImprovementLoop::new(
            &fx.settings,
            &mut probe,
            &mut builder,
            &fx.patcher,
            &fx.journal,
        )
        .run()
        .expect("run");
        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.iterations, 1);
        assert_eq!(records[0].issues_found, 0);
        assert_eq!(probe.tags, vec!["iter1-final"]);
        assert_eq!(builder.calls, 0);
        assert!(fx.logs.join("iteration-1.json").exists());
        assert!(fx.logs.join("summary.json").exists());
        assert!(fx.logs.join("final-report.txt").exists());
    }

    #[test]
    fn fix_then_rebuild_then_success() {
        let fx = fixture();
        let fixed = Rc::new(Cell::new(false));
        let mut probe = FakeProbe::new(fixed.clone());
        let mut builder = FakeBuilder {
            fixes_site: Some(fixed),
            fail: false,
            calls: 0,
        };
        let (summary, records) = ImprovementLoop::new(
            &fx.settings,
            &mut probe,
            &mut builder,
            &fx.patcher,
            &fx.journal,
        )
        .run()
        .expect("run");
        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.iterations, 2);
        assert_eq!(builder.calls, 1);
        assert_eq!(probe.tags, vec!["iter1-before", "iter1-after", "iter2-final"]);
        let kinds: Vec<PatchKind> = records[0].patches.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![PatchKind::Contrast, PatchKind::Spacing]);
        assert!(records[0].patches.iter().all(|p| p.changed));
        // round 2 patched nothing
        assert_eq!(
            records[0].stylesheet_fingerprints,
            records[1].stylesheet_fingerprints
        );
        let base = fs::read_to_string(fx.patcher.base_path()).unwrap();
        assert!(base.contains(".container {"));
    }

    #[test]
    fn persistent_failure_exhausts_budget() {
        let fx = fixture();
        let mut probe = FakeProbe::new(Rc::new(Cell::new(false)));
        let mut builder = FakeBuilder {
            fixes_site: None,
            fail: false,
            calls: 0,
        };
        let (summary, records) = ImprovementLoop::new(
            &fx.settings,
            &mut probe,
            &mut builder,
            &fx.patcher,
            &fx.journal,
        )
        .run()
        .expect("run");
        assert_eq!(summary.status, RunStatus::Incomplete);
        assert_eq!(records.len(), 10);
        // stylesheets only change in the first round
        assert_eq!(builder.calls, 1);
        assert_eq!(records[9].rebuilds, 0);
        assert!(fx.logs.join("iteration-10.json").exists());
        let report = fs::read_to_string(fx.logs.join("final-report.txt")).unwrap();
        assert!(report.contains("INCOMPLETE"));
    }

    #[test]
    fn rebuild_failure_aborts_the_run() {
        let fx = fixture();
        let mut probe = FakeProbe::new(Rc::new(Cell::new(false)));
        let mut builder = FakeBuilder {
            fixes_site: None,
            fail: true,
            calls: 0,
        };
        let result = ImprovementLoop::new(
            &fx.settings,
            &mut probe,
            &mut builder,
            &fx.patcher,
            &fx.journal,
        )
        .run();
        assert!(matches!(result, Err(AuditError::Rebuild(_))));
        assert_eq!(probe.tags, vec!["iter1-before"]);
        assert!(!fx.logs.join("iteration-1.json").exists());
    }

    #[test]
    fn unreachable_site_stalls() {
        let fx = fixture();
        let mut probe = FakeProbe::new(Rc::new(Cell::new(true)));
        probe.unreachable = true;
        let mut builder = FakeBuilder {
            fixes_site: None,
            fail: false,
            calls: 0,
        };
        let (summary, records) = ImprovementLoop::new(
            &fx.settings,
            &mut probe,
            &mut builder,
            &fx.patcher,
            &fx.journal,
        )
        .run()
        .expect("run");
        assert_eq!(summary.status, RunStatus::Stalled);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].skipped.len(), 1);
        assert_eq!(summary.final_average, None);
    }

    #[test]
    fn skipped_pages_block_success() {
        let mut fx = fixture();
        fx.settings.pages = vec![
            PageTarget::new("/", "home"),
            PageTarget::new("/themes/", "themes"),
        ];
        let mut probe = FakeProbe::new(Rc::new(Cell::new(true)));
        probe.down_pages = vec!["themes".to_string()];
        let mut builder = FakeBuilder {
            fixes_site: None,
            fail: false,
            calls: 0,
        };
        let (summary, records) = ImprovementLoop::new(
            &fx.settings,
            &mut probe,
            &mut builder,
            &fx.patcher,
            &fx.journal,
        )
        .run()
        .expect("run");
        assert_eq!(records[0].assessments.len(), 1);
        assert_eq!(records[0].skipped.len(), 1);
        assert_eq!(records[0].minimum_score, Some(5.0));
        assert_ne!(summary.status, RunStatus::Success);
        assert_eq!(summary.status, RunStatus::Stalled);
        let report = fs::read_to_string(fx.logs.join("final-report.txt")).unwrap();
        assert!(report.contains("STALLED"));
    }

    #[test]
    fn assessment_pass_captures_each_pair_once() {
        let mut settings = fixture().settings;
        settings.themes = vec![ThemeId::Onyx, ThemeId::Paper];
        let mut probe = FakeProbe::new(Rc::new(Cell::new(false)));
        let run = assess_all(&settings, &mut probe);
        assert_eq!(run.assessments.len(), 2);
        assert_eq!(probe.tags, vec!["assessment", "assessment"]);
        assert!(run.assessments.iter().all(|a| a.needs_improvement));
        assert!(run.minimum_score.unwrap() <= run.average_score.unwrap());
    }
}

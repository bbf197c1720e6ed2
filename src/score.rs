use crate::contrast::{ContrastReport, analyze_contrast};
use crate::professionalism::{ProfessionalismReport, analyze_professionalism};
use crate::snapshot::PageMeasurement;
use crate::spacing::{SpacingReport, analyze_spacing};
use crate::types::{PageTarget, ThemeId};
use crate::typography::{TypographyReport, analyze_typography, count_headings};
use chrono::{DateTime, Utc};
use gallery_audit_contract::{
    CATEGORY_CONTRAST, CATEGORY_PROFESSIONALISM, CATEGORY_SPACING, CATEGORY_TYPOGRAPHY,
    SCORE_THRESHOLD, category_weight, score_category_def,
};
use serde::{Deserialize, Serialize};

/// Which analyzer scores, besides the overall score, can flag a pair for
/// improvement. The reference loop only looks at contrast and spacing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImprovementPolicy {
    #[default]
    ContrastAndSpacing,
    AllAnalyzers,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnalyzerScores {
    pub contrast: f64,
    pub spacing: f64,
    pub typography: f64,
    pub professionalism: f64,
}

impl AnalyzerScores {
    pub fn overall(&self) -> f64 {
        category_weight(CATEGORY_CONTRAST) * self.contrast
            + category_weight(CATEGORY_SPACING) * self.spacing
            + category_weight(CATEGORY_TYPOGRAPHY) * self.typography
            + category_weight(CATEGORY_PROFESSIONALISM) * self.professionalism
    }

    pub fn needs_improvement(&self, policy: ImprovementPolicy, threshold: f64) -> bool {
        if self.overall() < threshold
            || self.contrast < threshold
            || self.spacing < threshold
        {
            return true;
        }
        match policy {
            ImprovementPolicy::ContrastAndSpacing => false,
            ImprovementPolicy::AllAnalyzers => {
                self.typography < threshold || self.professionalism < threshold
            }
        }
    }

    pub fn minimum(&self) -> f64 {
        self.contrast
            .min(self.spacing)
            .min(self.typography)
            .min(self.professionalism)
    }
}

/// One question the report answers about a page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub question: String,
    pub answer: String,
    pub passed: bool,
}

impl Finding {
    fn new(question: impl Into<String>, answer: impl Into<String>, passed: bool) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            passed,
        }
    }
}

/// Score and findings of one analyzer for one (theme, page); the typed report
/// on the assessment carries the full details.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzerResult {
    pub category: &'static str,
    pub name: &'static str,
    pub score: f64,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub theme: ThemeId,
    pub page: PageTarget,
    pub measured_at: DateTime<Utc>,
    pub applied_theme: Option<String>,
    pub contrast: ContrastReport,
    pub spacing: SpacingReport,
    pub typography: TypographyReport,
    pub professionalism: ProfessionalismReport,
    pub overall_score: f64,
    pub needs_improvement: bool,
}

impl Assessment {
    pub fn from_measurement(
        theme: ThemeId,
        page: &PageTarget,
        measurement: &PageMeasurement,
        policy: ImprovementPolicy,
        threshold: f64,
    ) -> Self {
        let snapshot = &measurement.snapshot;
        let contrast = analyze_contrast(&snapshot.styles);
        let spacing = analyze_spacing(&snapshot.containers);
        let typography =
            analyze_typography(count_headings(&measurement.document), snapshot.font_sizes);
        let professionalism = analyze_professionalism(&measurement.document);
        let scores = AnalyzerScores {
            contrast: contrast.score,
            spacing: spacing.overall_score,
            typography: typography.score,
            professionalism: professionalism.score,
        };
        Self {
            theme,
            page: page.clone(),
            measured_at: Utc::now(),
            applied_theme: snapshot.applied_theme.clone(),
            contrast,
            spacing,
            typography,
            professionalism,
            overall_score: scores.overall(),
            needs_improvement: scores.needs_improvement(policy, threshold),
        }
    }

    pub fn scores(&self) -> AnalyzerScores {
        AnalyzerScores {
            contrast: self.contrast.score,
            spacing: self.spacing.overall_score,
            typography: self.typography.score,
            professionalism: self.professionalism.score,
        }
    }

    /// Contrast fix trigger: the average measured ratio is below AA.
    pub fn wants_contrast_fix(&self) -> bool {
        self.contrast
            .average_ratio
            .is_some_and(|ratio| ratio < gallery_audit_contract::CONTRAST_AA_RATIO)
    }

    pub fn wants_spacing_fix(&self, threshold: f64) -> bool {
        self.spacing.overall_score < threshold
    }

    pub fn analyzer_results(&self) -> Vec<AnalyzerResult> {
        vec![
            AnalyzerResult {
                category: CATEGORY_CONTRAST,
                name: category_name(CATEGORY_CONTRAST),
                score: self.contrast.score,
                findings: contrast_findings(&self.contrast),
            },
            AnalyzerResult {
                category: CATEGORY_SPACING,
                name: category_name(CATEGORY_SPACING),
                score: self.spacing.overall_score,
                findings: spacing_findings(&self.spacing),
            },
            AnalyzerResult {
                category: CATEGORY_TYPOGRAPHY,
                name: category_name(CATEGORY_TYPOGRAPHY),
                score: self.typography.score,
                findings: typography_findings(&self.typography),
            },
            AnalyzerResult {
                category: CATEGORY_PROFESSIONALISM,
                name: category_name(CATEGORY_PROFESSIONALISM),
                score: self.professionalism.score,
                findings: self
                    .professionalism
                    .checks
                    .iter()
                    .map(|check| Finding::new(&check.question, &check.finding, check.passed))
                    .collect(),
            },
        ]
    }
}

fn category_name(id: &str) -> &'static str {
    score_category_def(id).map(|c| c.name).unwrap_or("Unknown")
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn contrast_findings(report: &ContrastReport) -> Vec<Finding> {
    let average = report
        .average_ratio
        .map(|ratio| format!("{ratio:.2}:1"))
        .unwrap_or_else(|| "no measurable text".to_string());
    let mut findings = vec![
        Finding::new(
            "Does text meet WCAG AA contrast (4.5:1)?",
            format!(
                "{:.1}% ({}/{})",
                report.aa_percent, report.aa_pass, report.total
            ),
            report.aa_pass == report.total,
        ),
        Finding::new(
            "Does text meet WCAG AAA contrast (7:1)?",
            format!(
                "{:.1}% ({}/{})",
                report.aaa_percent, report.aaa_pass, report.total
            ),
            report.aaa_pass == report.total,
        ),
        Finding::new(
            "What is the average contrast ratio?",
            average,
            report.score >= SCORE_THRESHOLD,
        ),
    ];
    for offender in &report.worst {
        findings.push(Finding::new(
            format!("Low contrast <{}>", offender.tag),
            format!(
                "{:.2}:1 ({} on {}) {}",
                offender.ratio, offender.color, offender.background, offender.text
            ),
            false,
        ));
    }
    findings
}

fn spacing_findings(report: &SpacingReport) -> Vec<Finding> {
    let mut findings = vec![
        Finding::new(
            "Is container padding symmetric?",
            format!("{}/{} containers", report.consistent_padding, report.total),
            report.consistent_padding == report.total,
        ),
        Finding::new(
            "Do containers have vertical spacing?",
            format!("{}/{} containers", report.vertical_spacing, report.total),
            report.vertical_spacing == report.total,
        ),
    ];
    for issue in &report.issues {
        findings.push(Finding::new(
            format!("Spacing issue {}", issue.label),
            format!(
                "padding {:?}, margin {}/{}",
                issue.padding, issue.margin_top, issue.margin_bottom
            ),
            false,
        ));
    }
    findings
}

fn typography_findings(report: &TypographyReport) -> Vec<Finding> {
    let counts = &report.heading_counts;
    vec![
        Finding::new(
            "Is there exactly one h1?",
            format!("{} h1", counts[0]),
            report.has_proper_hierarchy,
        ),
        Finding::new(
            "Are at least two heading levels used?",
            format!("h1={} h2={} h3={}", counts[0], counts[1], counts[2]),
            report.has_multiple_levels,
        ),
        Finding::new(
            "Do sizes step down from h1 to h2 to body?",
            format!(
                "{} ({}px > {}px > {}px)",
                yes_no(report.has_size_hierarchy),
                report.font_sizes.h1,
                report.font_sizes.h2,
                report.font_sizes.body
            ),
            report.has_size_hierarchy,
        ),
    ]
}

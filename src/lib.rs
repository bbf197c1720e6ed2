mod capture;
mod contrast;
mod error;
mod improve;
mod patch;
mod professionalism;
mod report;
mod score;
mod snapshot;
mod spacing;
mod stylesheet;
mod types;
mod typography;

pub use capture::{
    CaptureRecord, CaptureSettings, ChromeProbe, CommandSiteBuilder, SiteBuilder, SiteProbe,
    THEME_ATTRIBUTE, THEME_STORAGE_KEY, screenshot_path,
};
pub use contrast::{
    ContrastOffender, ContrastReport, analyze_contrast, contrast_ratio, linearize_channel,
    parse_css_color, relative_luminance,
};
pub use error::AuditError;
pub use improve::{
    AssessmentRun, ImprovementLoop, IterationRecord, LoopSettings, PatchKind, PatchRecord,
    RunStatus, RunSummary, SkippedPair, assess_all,
};
pub use patch::{
    BG_PRIMARY_VAR, ContrastFixStrategy, LAYOUT_MARKER, StylesheetPatcher, TEXT_PRIMARY_VAR,
    TEXT_SECONDARY_VAR, apply_contrast_fix, apply_spacing_fix, nearest_compliant,
};
pub use professionalism::{
    CheckOutcome, CheckResult, ProfessionalismCheck, ProfessionalismReport,
    analyze_professionalism, checklist,
};
pub use report::{RunJournal, render_assessment_report, render_final_report};
pub use score::{AnalyzerResult, AnalyzerScores, Assessment, Finding, ImprovementPolicy};
pub use snapshot::{
    ContainerSample, FontSizes, PageDocument, PageMeasurement, PageSnapshot, StyleSample,
    snapshot_script,
};
pub use spacing::{
    SpacingIssue, SpacingReport, analyze_spacing, has_consistent_padding, has_vertical_spacing,
};
pub use stylesheet::{Declaration, StyleRule, Stylesheet, validate_css};
pub use types::{Color, Hsl, PageTarget, ThemeId};
pub use typography::{TypographyReport, analyze_typography, count_headings};

use gallery_audit_contract::SCORE_SCALE_MAX;
use log::info;
use std::path::PathBuf;
use std::time::Duration;

pub const BASE_URL_ENV: &str = "BASE_URL";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Configured audit of one gallery site.
pub struct GalleryAudit {
    capture: CaptureSettings,
    settings: LoopSettings,
    patcher: StylesheetPatcher,
    journal: RunJournal,
    build_command: String,
    site_root: PathBuf,
}

impl GalleryAudit {
    pub fn builder() -> GalleryAuditBuilder {
        GalleryAuditBuilder::new()
    }

    pub fn capture_settings(&self) -> &CaptureSettings {
        &self.capture
    }

    pub fn loop_settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn patcher(&self) -> &StylesheetPatcher {
        &self.patcher
    }

    pub fn journal(&self) -> &RunJournal {
        &self.journal
    }

    /// Runs the improvement loop against the live site in headless Chrome.
    pub fn run(&self) -> Result<RunSummary, AuditError> {
        let mut probe = ChromeProbe::launch(self.capture.clone())?;
        let mut builder = CommandSiteBuilder::new(&self.build_command, &self.site_root);
        let (summary, _) = self.run_with(&mut probe, &mut builder)?;
        Ok(summary)
    }

    pub fn run_with(
        &self,
        probe: &mut dyn SiteProbe,
        builder: &mut dyn SiteBuilder,
    ) -> Result<(RunSummary, Vec<IterationRecord>), AuditError> {
        info!(
            "auditing {} themes x {} pages at {} (max {} rounds, target {}/{})",
            self.settings.themes.len(),
            self.settings.pages.len(),
            self.capture.base_url,
            self.settings.max_iterations,
            self.settings.threshold,
            SCORE_SCALE_MAX
        );
        ImprovementLoop::new(&self.settings, probe, builder, &self.patcher, &self.journal).run()
    }

    /// One measurement pass with screenshots and no patching.
    pub fn assess_once(&self) -> Result<AssessmentRun, AuditError> {
        let mut probe = ChromeProbe::launch(self.capture.clone())?;
        self.assess_with(&mut probe)
    }

    pub fn assess_with(&self, probe: &mut dyn SiteProbe) -> Result<AssessmentRun, AuditError> {
        let run = assess_all(&self.settings, probe);
        self.journal.write_assessment(&run)?;
        Ok(run)
    }
}

pub struct GalleryAuditBuilder {
    base_url: String,
    viewport: (u32, u32),
    settle: Duration,
    verify_settle: Duration,
    navigation_timeout: Duration,
    max_iterations: u32,
    threshold: f64,
    themes_css: PathBuf,
    base_css: PathBuf,
    screenshots_dir: PathBuf,
    logs_dir: PathBuf,
    site_root: PathBuf,
    build_command: String,
    contrast_strategy: ContrastFixStrategy,
    policy: ImprovementPolicy,
    themes: Vec<ThemeId>,
    pages: Vec<PageTarget>,
}

impl Default for GalleryAuditBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GalleryAuditBuilder {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            viewport: (1920, 1080),
            settle: Duration::from_millis(1000),
            verify_settle: Duration::from_millis(500),
            navigation_timeout: Duration::from_secs(30),
            max_iterations: 10,
            threshold: gallery_audit_contract::SCORE_THRESHOLD,
            themes_css: PathBuf::from("src/css/themes.css"),
            base_css: PathBuf::from("src/css/base.css"),
            screenshots_dir: PathBuf::from("screenshots"),
            logs_dir: PathBuf::from("logs"),
            site_root: PathBuf::from("."),
            build_command: "npm run build".to_string(),
            contrast_strategy: ContrastFixStrategy::default(),
            policy: ImprovementPolicy::default(),
            themes: ThemeId::ALL.to_vec(),
            pages: PageTarget::gallery_defaults(),
        }
    }

    /// Defaults plus `BASE_URL` when it is set and not blank.
    pub fn from_env() -> Self {
        Self::new().base_url_override(std::env::var(BASE_URL_ENV).ok())
    }

    fn base_url_override(self, value: Option<String>) -> Self {
        match value {
            Some(url) if !url.trim().is_empty() => self.base_url(url.trim()),
            _ => self,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = (width, height);
        self
    }

    pub fn settle_delays(mut self, after_load: Duration, after_theme: Duration) -> Self {
        self.settle = after_load;
        self.verify_settle = after_theme;
        self
    }

    pub fn navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub fn max_iterations(mut self, count: u32) -> Self {
        self.max_iterations = count;
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn stylesheets(mut self, themes_css: impl Into<PathBuf>, base_css: impl Into<PathBuf>) -> Self {
        self.themes_css = themes_css.into();
        self.base_css = base_css.into();
        self
    }

    pub fn screenshots_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshots_dir = dir.into();
        self
    }

    pub fn logs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.logs_dir = dir.into();
        self
    }

    pub fn site_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.site_root = dir.into();
        self
    }

    pub fn build_command(mut self, command: impl Into<String>) -> Self {
        self.build_command = command.into();
        self
    }

    /// Defaults to [`ContrastFixStrategy::PreserveHue`]. Use
    /// [`ContrastFixStrategy::Palette`] for the fixed per-theme extremes (onyx gets
    /// pure white text on a pure black background).
    pub fn contrast_strategy(mut self, strategy: ContrastFixStrategy) -> Self {
        self.contrast_strategy = strategy;
        self
    }

    pub fn improvement_policy(mut self, policy: ImprovementPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn themes(mut self, themes: Vec<ThemeId>) -> Self {
        self.themes = themes;
        self
    }

    pub fn pages(mut self, pages: Vec<PageTarget>) -> Self {
        self.pages = pages;
        self
    }

    pub fn build(self) -> Result<GalleryAudit, AuditError> {
        let base_url = self.base_url.trim().to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(AuditError::InvalidConfiguration(format!(
                "base url must start with http:// or https://, got {:?}",
                base_url
            )));
        }
        if self.max_iterations == 0 {
            return Err(AuditError::InvalidConfiguration(
                "max_iterations must be >= 1".to_string(),
            ));
        }
        if !self.threshold.is_finite() || self.threshold <= 0.0 || self.threshold > SCORE_SCALE_MAX {
            return Err(AuditError::InvalidConfiguration(format!(
                "threshold must be in (0, {}]",
                SCORE_SCALE_MAX
            )));
        }
        if self.build_command.trim().is_empty() {
            return Err(AuditError::InvalidConfiguration(
                "build command is empty".to_string(),
            ));
        }
        if self.themes.is_empty() {
            return Err(AuditError::InvalidConfiguration(
                "at least one theme is required".to_string(),
            ));
        }
        if self.pages.is_empty() {
            return Err(AuditError::InvalidConfiguration(
                "at least one page is required".to_string(),
            ));
        }
        Ok(GalleryAudit {
            capture: CaptureSettings {
                base_url,
                viewport: self.viewport,
                settle: self.settle,
                verify_settle: self.verify_settle,
                navigation_timeout: self.navigation_timeout,
                screenshots_dir: self.screenshots_dir,
            },
            settings: LoopSettings {
                themes: self.themes,
                pages: self.pages,
                max_iterations: self.max_iterations,
                threshold: self.threshold,
                policy: self.policy,
            },
            patcher: StylesheetPatcher::new(
                self.themes_css,
                self.base_css,
                self.contrast_strategy,
                gallery_audit_contract::CONTRAST_AA_RATIO,
            ),
            journal: RunJournal::new(self.logs_dir),
            build_command: self.build_command,
            site_root: self.site_root,
        })
    }
}

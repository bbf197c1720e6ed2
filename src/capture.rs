//! Live measurement and screenshots through headless Chrome.
//!
//! Every call is explicit about the theme it wants: storage is seeded on the
//! site origin before the route loads, then [`ChromeProbe::apply_theme`] forces
//! the attribute once more and verifies it with a single retry.

use crate::error::AuditError;
use crate::snapshot::{PageMeasurement, PageSnapshot, snapshot_script};
use crate::types::{PageTarget, ThemeId};
use headless_chrome::protocol::cdp::Page::{self, CaptureScreenshotFormatOption};
use headless_chrome::{Browser, LaunchOptionsBuilder, Tab};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const THEME_STORAGE_KEY: &str = "theme";
pub const THEME_ATTRIBUTE: &str = "data-theme";
const THEME_CONTROL_SELECTOR: &str = "[data-theme-select], #theme-select";

/// A screenshot written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub path: PathBuf,
    pub tag: String,
    pub width: u32,
    pub height: u32,
    pub theme_verified: bool,
}

/// Measures and photographs the rendered site.
pub trait SiteProbe {
    fn measure(&mut self, theme: ThemeId, page: &PageTarget)
    -> Result<PageMeasurement, AuditError>;

    fn capture(
        &mut self,
        theme: ThemeId,
        page: &PageTarget,
        tag: &str,
    ) -> Result<CaptureRecord, AuditError>;
}

/// Regenerates the site after the stylesheets changed.
pub trait SiteBuilder {
    fn rebuild(&mut self) -> Result<(), AuditError>;
}

pub fn screenshot_path(dir: &Path, theme: ThemeId, page: &PageTarget, tag: &str) -> PathBuf {
    dir.join(format!("{}-{}-{}.png", theme.name(), page.name, tag))
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub base_url: String,
    pub viewport: (u32, u32),
    /// Wait after load before the theme is forced.
    pub settle: Duration,
    /// Wait after forcing the theme before it is verified.
    pub verify_settle: Duration,
    pub navigation_timeout: Duration,
    pub screenshots_dir: PathBuf,
}

pub struct ChromeProbe {
    settings: CaptureSettings,
    tab: Arc<Tab>,
    _browser: Browser,
}

fn browser_error(err: impl std::fmt::Display) -> AuditError {
    AuditError::Browser(err.to_string())
}

impl ChromeProbe {
    pub fn launch(settings: CaptureSettings) -> Result<Self, AuditError> {
        let launch_opts = LaunchOptionsBuilder::default()
            .headless(true)
            .window_size(Some(settings.viewport))
            .idle_browser_timeout(Duration::from_secs(300))
            .args(vec![
                OsStr::new("--force-device-scale-factor=1"),
                OsStr::new("--hide-scrollbars"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--force-color-profile=sRGB"),
            ])
            .build()
            .map_err(browser_error)?;
        let browser = Browser::new(launch_opts).map_err(browser_error)?;
        let tab = browser.new_tab().map_err(browser_error)?;
        tab.set_default_timeout(settings.navigation_timeout);
        info!(
            "chrome launched at {}x{} for {}",
            settings.viewport.0, settings.viewport.1, settings.base_url
        );
        Ok(Self {
            settings,
            tab,
            _browser: browser,
        })
    }

    fn navigate(&self, url: &str) -> Result<(), AuditError> {
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map(|_| ())
            .map_err(|err| AuditError::Navigation {
                url: url.to_string(),
                message: err.to_string(),
            })
    }

    fn evaluate(&self, script: &str) -> Result<Option<serde_json::Value>, AuditError> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|err| AuditError::Evaluation(err.to_string()))?;
        Ok(result.value)
    }

    fn applied_theme(&self) -> Result<Option<String>, AuditError> {
        let value = self.evaluate(&read_theme_script())?;
        Ok(value.and_then(|v| v.as_str().map(str::to_string)))
    }

    /// Seeds storage on the site origin, then loads the route with the theme
    /// applied and verified. Returns whether verification succeeded.
    fn load(&self, theme: ThemeId, page: &PageTarget) -> Result<bool, AuditError> {
        let origin = self.settings.base_url.trim_end_matches('/');
        self.navigate(origin)?;
        self.evaluate(&seed_storage_script(theme))?;
        let url = page.url(&self.settings.base_url);
        debug!("loading {} as {}", url, theme);
        self.navigate(&url)?;
        thread::sleep(self.settings.settle);
        self.apply_theme(theme)
    }

    /// Forces the theme attribute, storage, `window.setTheme` and any selector
    /// control, then verifies the attribute. Re-asserts once on mismatch.
    pub fn apply_theme(&self, theme: ThemeId) -> Result<bool, AuditError> {
        force_theme(
            || {
                self.evaluate(&apply_theme_script(theme))?;
                thread::sleep(self.settings.verify_settle);
                Ok(())
            },
            || self.applied_theme(),
            theme.name(),
        )
    }

    fn full_page_png(&self) -> Result<Vec<u8>, AuditError> {
        let size = self.evaluate(
            "JSON.stringify([document.documentElement.scrollWidth, document.documentElement.scrollHeight])",
        )?;
        let (width, height) = size
            .as_ref()
            .and_then(|v| v.as_str())
            .and_then(|raw| serde_json::from_str::<(f64, f64)>(raw).ok())
            .unwrap_or((
                self.settings.viewport.0 as f64,
                self.settings.viewport.1 as f64,
            ));
        let clip = Page::Viewport {
            x: 0.0,
            y: 0.0,
            width: width.max(1.0),
            height: height.max(1.0),
            scale: 1.0,
        };
        self.tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, Some(clip), true)
            .map_err(browser_error)
    }
}

impl SiteProbe for ChromeProbe {
    fn measure(
        &mut self,
        theme: ThemeId,
        page: &PageTarget,
    ) -> Result<PageMeasurement, AuditError> {
        self.load(theme, page)?;
        let value = self.evaluate(&snapshot_script())?;
        let raw = value
            .as_ref()
            .and_then(|v| v.as_str())
            .ok_or_else(|| AuditError::Evaluation("snapshot script returned no string".into()))?;
        let snapshot = PageSnapshot::from_json(raw)?;
        Ok(PageMeasurement::from_snapshot(snapshot))
    }

    fn capture(
        &mut self,
        theme: ThemeId,
        page: &PageTarget,
        tag: &str,
    ) -> Result<CaptureRecord, AuditError> {
        let theme_verified = self.load(theme, page)?;
        let png = self.full_page_png()?;
        let decoded = image::load_from_memory_with_format(&png, image::ImageFormat::Png)
            .map_err(|err| AuditError::Browser(format!("screenshot is not a PNG: {err}")))?;
        fs::create_dir_all(&self.settings.screenshots_dir)?;
        let path = screenshot_path(&self.settings.screenshots_dir, theme, page, tag);
        fs::write(&path, &png)?;
        info!(
            "captured {} ({}x{})",
            path.display(),
            decoded.width(),
            decoded.height()
        );
        Ok(CaptureRecord {
            path,
            tag: tag.to_string(),
            width: decoded.width(),
            height: decoded.height(),
            theme_verified,
        })
    }
}

/// Runs `apply` then `read` until the applied theme equals `wanted`, with one
/// retry. A mismatch after the retry is logged and reported as `Ok(false)`.
fn force_theme(
    mut apply: impl FnMut() -> Result<(), AuditError>,
    mut read: impl FnMut() -> Result<Option<String>, AuditError>,
    wanted: &str,
) -> Result<bool, AuditError> {
    for attempt in 1..=2 {
        apply()?;
        let applied = read()?;
        if applied.as_deref() == Some(wanted) {
            return Ok(true);
        }
        debug!("theme check {} for {}: found {:?}", attempt, wanted, applied);
    }
    warn!(
        "theme {} not applied after retry, continuing with the page as rendered",
        wanted
    );
    Ok(false)
}

fn js_string(raw: &str) -> String {
    serde_json::Value::String(raw.to_string()).to_string()
}

fn seed_storage_script(theme: ThemeId) -> String {
    format!(
        "(() => {{ try {{ localStorage.setItem({key}, {name}); }} catch (e) {{}} return true; }})()",
        key = js_string(THEME_STORAGE_KEY),
        name = js_string(theme.name()),
    )
}

fn read_theme_script() -> String {
    format!(
        "document.documentElement.getAttribute({})",
        js_string(THEME_ATTRIBUTE)
    )
}

fn apply_theme_script(theme: ThemeId) -> String {
    format!(
        r#"(() => {{
  const name = {name};
  try {{ localStorage.setItem({key}, name); }} catch (e) {{}}
  if (typeof window.setTheme === 'function') {{
    try {{ window.setTheme(name); }} catch (e) {{}}
  }}
  document.documentElement.setAttribute({attr}, name);
  const control = document.querySelector({control});
  if (control && 'value' in control) {{ control.value = name; }}
  return document.documentElement.getAttribute({attr});
}})()"#,
        name = js_string(theme.name()),
        key = js_string(THEME_STORAGE_KEY),
        attr = js_string(THEME_ATTRIBUTE),
        control = js_string(THEME_CONTROL_SELECTOR),
    )
}

/// Runs the site's build command in the site root.
#[derive(Debug, Clone)]
pub struct CommandSiteBuilder {
    command: String,
    site_root: PathBuf,
}

impl CommandSiteBuilder {
    pub fn new(command: impl Into<String>, site_root: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            site_root: site_root.into(),
        }
    }
}

impl SiteBuilder for CommandSiteBuilder {
    fn rebuild(&mut self) -> Result<(), AuditError> {
        let mut parts = self.command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| AuditError::InvalidConfiguration("build command is empty".into()))?;
        info!("rebuilding site: {} (in {})", self.command, self.site_root.display());
        let status = Command::new(program)
            .args(parts)
            .current_dir(&self.site_root)
            .status()
            .map_err(|err| AuditError::Rebuild(format!("could not run `{}`: {err}", self.command)))?;
        if !status.success() {
            return Err(AuditError::Rebuild(format!(
                "`{}` exited with {status}",
                self.command
            )));
        }
        Ok(())
    }
}

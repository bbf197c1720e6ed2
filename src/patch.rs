use crate::contrast::{contrast_ratio, parse_css_color};
use crate::error::AuditError;
use crate::stylesheet::{StyleRule, Stylesheet, validate_css};
use crate::types::{Color, Hsl, ThemeId};
use gallery_audit_contract::hex_sha256;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const TEXT_PRIMARY_VAR: &str = "--color-text-primary";
pub const TEXT_SECONDARY_VAR: &str = "--color-text-secondary";
pub const BG_PRIMARY_VAR: &str = "--color-bg-primary";

/// Comment in the base stylesheet that new layout rules are inserted before.
pub const LAYOUT_MARKER: &str = "/* Layout */";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContrastFixStrategy {
    /// Move lightness in HSL just far enough to reach the minimum ratio,
    /// keeping hue and saturation.
    #[default]
    PreserveHue,
    /// Replace the theme colors with a fixed near-black/near-white palette.
    Palette,
}

struct PaletteEntry {
    theme: ThemeId,
    text_primary: &'static str,
    text_secondary: &'static str,
    bg_primary: &'static str,
}

const REMEDIATION_PALETTE: [PaletteEntry; 6] = [
    PaletteEntry { theme: ThemeId::Minimal, text_primary: "#000000", text_secondary: "#1a1a1a", bg_primary: "#ffffff" },
    PaletteEntry { theme: ThemeId::Onyx, text_primary: "#ffffff", text_secondary: "#f5f5f5", bg_primary: "#000000" },
    PaletteEntry { theme: ThemeId::Aurora, text_primary: "#0a0a0a", text_secondary: "#1f1f1f", bg_primary: "#ffffff" },
    PaletteEntry { theme: ThemeId::Paper, text_primary: "#000000", text_secondary: "#1a1a1a", bg_primary: "#fffdf7" },
    PaletteEntry { theme: ThemeId::Brutalist, text_primary: "#000000", text_secondary: "#000000", bg_primary: "#ffffff" },
    PaletteEntry { theme: ThemeId::Neon, text_primary: "#ffffff", text_secondary: "#e6e6e6", bg_primary: "#050505" },
];

const SPACING_RULES: [(&str, &[(&str, &str)]); 3] = [
    (
        ".container",
        &[
            ("max-width", "1200px"),
            ("margin", "0 auto"),
            ("padding", "var(--space-lg) var(--space-md)"),
        ],
    ),
    (
        ".section",
        &[
            ("padding", "var(--space-xl) 0"),
            ("margin-bottom", "var(--space-lg)"),
        ],
    ),
    (
        ".card",
        &[
            ("padding", "var(--space-lg)"),
            ("margin-bottom", "var(--space-md)"),
        ],
    ),
];

fn palette_entry(theme: ThemeId) -> Option<&'static PaletteEntry> {
    REMEDIATION_PALETTE.iter().find(|entry| entry.theme == theme)
}

fn same_color(a: &str, b: &str) -> bool {
    match (parse_css_color(a), parse_css_color(b)) {
        (Some((ca, aa)), Some((cb, ab))) => ca.to_rgb8() == cb.to_rgb8() && aa == ab,
        _ => a.trim().eq_ignore_ascii_case(b.trim()),
    }
}

/// Rewrites the theme's color variables inside its own top-level rule.
/// Only variables the rule already declares are touched.
pub fn apply_contrast_fix(
    sheet: &mut Stylesheet,
    theme: ThemeId,
    strategy: ContrastFixStrategy,
    min_ratio: f64,
) -> bool {
    let Some(rule) = sheet.find_theme_rule_mut(theme) else {
        warn!("contrast fix: no {} rule found", theme.selector());
        return false;
    };
    match strategy {
        ContrastFixStrategy::Palette => apply_palette(rule, theme),
        ContrastFixStrategy::PreserveHue => match preserve_hue(rule, min_ratio) {
            Some(changed) => changed,
            None => {
                warn!(
                    "contrast fix: {} background is not a parseable color, using palette",
                    theme
                );
                apply_palette(rule, theme)
            }
        },
    }
}

fn apply_palette(rule: &mut StyleRule, theme: ThemeId) -> bool {
    let Some(entry) = palette_entry(theme) else {
        warn!("contrast fix: no palette entry for {}", theme);
        return false;
    };
    let mut changed = false;
    for (name, value) in [
        (TEXT_PRIMARY_VAR, entry.text_primary),
        (TEXT_SECONDARY_VAR, entry.text_secondary),
        (BG_PRIMARY_VAR, entry.bg_primary),
    ] {
        let Some(current) = rule.declaration(name) else {
            continue;
        };
        if same_color(current, value) {
            continue;
        }
        changed |= rule.set_declaration(name, value);
    }
    changed
}

/// `None` when the background cannot be read as a color.
fn preserve_hue(rule: &mut StyleRule, min_ratio: f64) -> Option<bool> {
    let (mut background, _) = rule.declaration(BG_PRIMARY_VAR).and_then(parse_css_color)?;
    let mut changed = false;
    for name in [TEXT_PRIMARY_VAR, TEXT_SECONDARY_VAR] {
        let Some((text, _)) = rule.declaration(name).and_then(parse_css_color) else {
            continue;
        };
        if contrast_ratio(text.quantized(), background) >= min_ratio {
            continue;
        }
        match nearest_compliant(text, background, min_ratio) {
            Some(fixed) => {
                changed |= rule.set_declaration(name, &fixed.to_hex());
            }
            None => {
                let text_extreme = far_extreme(text, background);
                let Some(new_background) = nearest_compliant(background, text_extreme, min_ratio)
                else {
                    continue;
                };
                changed |= rule.set_declaration(name, &text_extreme.to_hex());
                changed |= rule.set_declaration(BG_PRIMARY_VAR, &new_background.to_hex());
                background = new_background;
            }
        }
    }
    Some(changed)
}

/// `color` with its lightness pushed to 0 or 1, whichever contrasts more
/// with `against`.
fn far_extreme(color: Color, against: Color) -> Color {
    let hsl = color.to_hsl();
    let toward_black = contrast_ratio(Color::BLACK, against) >= contrast_ratio(Color::WHITE, against);
    let l = if toward_black { 0.0 } else { 1.0 };
    Color::from_hsl(Hsl { l, ..hsl }).quantized()
}

/// Smallest lightness change of `color` (hue and saturation fixed) that reaches
/// `min_ratio` against `against`, measured after 8-bit quantization.
pub fn nearest_compliant(color: Color, against: Color, min_ratio: f64) -> Option<Color> {
    let hsl = color.to_hsl();
    let at = |l: f64| Color::from_hsl(Hsl { l, ..hsl }).quantized();
    if contrast_ratio(at(hsl.l), against) >= min_ratio {
        return Some(at(hsl.l));
    }
    let extreme = far_extreme(color, against);
    let target_l = if extreme.to_hsl().l < 0.5 { 0.0 } else { 1.0 };
    if contrast_ratio(at(target_l), against) < min_ratio {
        return None;
    }
    let mut failing = hsl.l;
    let mut passing = target_l;
    for _ in 0..32 {
        let mid = (failing + passing) / 2.0;
        if contrast_ratio(at(mid), against) >= min_ratio {
            passing = mid;
        } else {
            failing = mid;
        }
    }
    Some(at(passing))
}

/// Ensures the canonical container, section and card rules. Existing rules get
/// the canonical declarations; missing ones are inserted before the layout
/// marker, `.container` closest to it. Only rules whose whole selector list is
/// the canonical class are edited; `.card, .panel` is left alone and a
/// standalone `.card` rule is inserted instead.
pub fn apply_spacing_fix(sheet: &mut Stylesheet) -> bool {
    let mut changed = false;
    for (selector, declarations) in SPACING_RULES.iter().rev() {
        if let Some(rule) = sheet.find_sole_rule_mut(selector) {
            for (name, value) in declarations.iter() {
                changed |= rule.set_declaration(name, value);
            }
            continue;
        }
        if sheet.insert_rule_before_comment(LAYOUT_MARKER, StyleRule::new(selector, declarations)) {
            changed = true;
        } else {
            warn!(
                "spacing fix: {} missing and no {} marker to insert before",
                selector, LAYOUT_MARKER
            );
        }
    }
    changed
}

/// Read-modify-write access to the two stylesheets. Each call completes its
/// write before returning, so patches never interleave.
#[derive(Debug, Clone)]
pub struct StylesheetPatcher {
    themes_path: PathBuf,
    base_path: PathBuf,
    strategy: ContrastFixStrategy,
    min_ratio: f64,
}

impl StylesheetPatcher {
    pub fn new(
        themes_path: impl Into<PathBuf>,
        base_path: impl Into<PathBuf>,
        strategy: ContrastFixStrategy,
        min_ratio: f64,
    ) -> Self {
        Self {
            themes_path: themes_path.into(),
            base_path: base_path.into(),
            strategy,
            min_ratio,
        }
    }

    pub fn themes_path(&self) -> &Path {
        &self.themes_path
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn fix_contrast(&self, theme: ThemeId) -> Result<bool, AuditError> {
        let (strategy, min_ratio) = (self.strategy, self.min_ratio);
        rewrite_stylesheet(&self.themes_path, |sheet| {
            apply_contrast_fix(sheet, theme, strategy, min_ratio)
        })
    }

    pub fn fix_spacing(&self) -> Result<bool, AuditError> {
        rewrite_stylesheet(&self.base_path, apply_spacing_fix)
    }

    /// SHA-256 of each stylesheet keyed by file name; `missing` for unreadable files.
    pub fn fingerprints(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for path in [&self.themes_path, &self.base_path] {
            let key = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let value = fs::read(path)
                .map(|bytes| hex_sha256(&bytes))
                .unwrap_or_else(|_| "missing".to_string());
            out.insert(key, value);
        }
        out
    }
}

fn rewrite_stylesheet(
    path: &Path,
    edit: impl FnOnce(&mut Stylesheet) -> bool,
) -> Result<bool, AuditError> {
    let original = fs::read_to_string(path).map_err(|err| AuditError::Stylesheet {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    let mut sheet = Stylesheet::parse(&original);
    if !edit(&mut sheet) {
        return Ok(false);
    }
    let updated = sheet.to_css();
    if updated == original {
        return Ok(false);
    }
    if validate_css(&original).is_ok() {
        if let Err(message) = validate_css(&updated) {
            return Err(AuditError::Stylesheet {
                path: path.to_path_buf(),
                message: format!("patched stylesheet no longer parses: {message}"),
            });
        }
    }
    fs::write(path, &updated)?;
    info!("patched {}", path.display());
    Ok(true)
}

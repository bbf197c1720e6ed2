//! WCAG contrast measurement over sampled text elements.
//!
//! Luminance uses the sRGB transfer function from WCAG 2.x (threshold 0.03928),
//! ratios are `(L1 + 0.05) / (L2 + 0.05)` with `L1` the lighter color.

use crate::snapshot::StyleSample;
use crate::types::Color;
use gallery_audit_contract::{
    CONTRAST_AA_RATIO, CONTRAST_AAA_RATIO, CONTRAST_WORST_OFFENDER_LIMIT, SCORE_SCALE_MAX,
};
use lightningcss::traits::Parse;
use lightningcss::values::color::{CssColor, SRGB};
use log::debug;
use serde::Serialize;

pub fn linearize_channel(value: f64) -> f64 {
    if value <= 0.03928 {
        value / 12.92
    } else {
        ((value + 0.055) / 1.055).powf(2.4)
    }
}

pub fn relative_luminance(color: Color) -> f64 {
    0.2126 * linearize_channel(color.r)
        + 0.7152 * linearize_channel(color.g)
        + 0.0722 * linearize_channel(color.b)
}

pub fn contrast_ratio(a: Color, b: Color) -> f64 {
    let la = relative_luminance(a);
    let lb = relative_luminance(b);
    let (lighter, darker) = if la >= lb { (la, lb) } else { (lb, la) };
    (lighter + 0.05) / (darker + 0.05)
}

/// Parses a CSS color into sRGB plus alpha. Computed styles arrive as
/// `rgb()`/`rgba()` in either comma or space syntax; anything else goes through
/// lightningcss.
pub fn parse_css_color(raw: &str) -> Option<(Color, f64)> {
    let s = raw.trim().trim_end_matches(';').trim();
    if s.is_empty() {
        return None;
    }
    let lower = s.to_ascii_lowercase();
    match lower.as_str() {
        "transparent" => return Some((Color::BLACK, 0.0)),
        "black" => return Some((Color::BLACK, 1.0)),
        "white" => return Some((Color::WHITE, 1.0)),
        _ => {}
    }
    if let Some(hex) = lower.strip_prefix('#') {
        return parse_hex_color(hex);
    }
    if lower.starts_with("rgb(") || lower.starts_with("rgba(") {
        return parse_rgb_function(&lower);
    }
    let color = CssColor::parse_string(s).ok()?;
    let srgb = SRGB::try_from(&color).ok()?;
    Some((
        Color::rgb(srgb.r as f64, srgb.g as f64, srgb.b as f64),
        (srgb.alpha as f64).clamp(0.0, 1.0),
    ))
}

fn parse_hex_color(hex: &str) -> Option<(Color, f64)> {
    let expanded: String = match hex.len() {
        3 | 4 => hex.chars().flat_map(|ch| [ch, ch]).collect(),
        6 | 8 => hex.to_string(),
        _ => return None,
    };
    let channel = |idx: usize| u8::from_str_radix(expanded.get(idx..idx + 2)?, 16).ok();
    let color = Color::from_rgb8(channel(0)?, channel(2)?, channel(4)?);
    let alpha = if expanded.len() == 8 {
        channel(6)? as f64 / 255.0
    } else {
        1.0
    };
    Some((color, alpha))
}

fn parse_rgb_function(lower: &str) -> Option<(Color, f64)> {
    let open = lower.find('(')?;
    let inner = lower.get(open + 1..)?.trim_end().strip_suffix(')')?;
    let (channels, alpha) = match inner.split_once('/') {
        Some((channels, alpha)) => (channels, Some(alpha.trim())),
        None => (inner, None),
    };
    let mut parts: Vec<&str> = channels
        .split(|ch: char| ch == ',' || ch.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();
    let alpha = match alpha {
        Some(alpha) => Some(alpha),
        None if parts.len() == 4 => parts.pop(),
        None => None,
    };
    if parts.len() != 3 {
        return None;
    }
    let r = parse_rgb_component(parts[0])?;
    let g = parse_rgb_component(parts[1])?;
    let b = parse_rgb_component(parts[2])?;
    let a = match alpha {
        Some(raw) => parse_alpha_component(raw)?,
        None => 1.0,
    };
    Some((Color::rgb(r, g, b), a))
}

fn parse_rgb_component(raw: &str) -> Option<f64> {
    if let Some(pct) = raw.strip_suffix('%') {
        return Some((pct.parse::<f64>().ok()? / 100.0).clamp(0.0, 1.0));
    }
    Some((raw.parse::<f64>().ok()? / 255.0).clamp(0.0, 1.0))
}

fn parse_alpha_component(raw: &str) -> Option<f64> {
    if let Some(pct) = raw.strip_suffix('%') {
        return Some((pct.parse::<f64>().ok()? / 100.0).clamp(0.0, 1.0));
    }
    Some(raw.parse::<f64>().ok()?.clamp(0.0, 1.0))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContrastOffender {
    pub tag: String,
    pub text: String,
    pub color: String,
    pub background: String,
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContrastReport {
    pub total: usize,
    pub aa_pass: usize,
    pub aaa_pass: usize,
    /// Samples with a fully transparent foreground or background.
    pub excluded_transparent: usize,
    pub skipped_unparseable: usize,
    pub aa_percent: f64,
    pub aaa_percent: f64,
    pub average_ratio: Option<f64>,
    pub worst: Vec<ContrastOffender>,
    pub score: f64,
}

pub fn analyze_contrast(samples: &[StyleSample]) -> ContrastReport {
    let mut measured: Vec<(&StyleSample, f64)> = Vec::with_capacity(samples.len());
    let mut excluded_transparent = 0usize;
    let mut skipped_unparseable = 0usize;

    for sample in samples {
        let (Some((fg, fg_alpha)), Some((bg, bg_alpha))) = (
            parse_css_color(&sample.color),
            parse_css_color(&sample.background),
        ) else {
            debug!(
                "contrast: skipping <{}> with unparseable colors {:?} on {:?}",
                sample.tag, sample.color, sample.background
            );
            skipped_unparseable += 1;
            continue;
        };
        if fg_alpha <= 0.0 || bg_alpha <= 0.0 {
            excluded_transparent += 1;
            continue;
        }
        measured.push((sample, contrast_ratio(fg, bg)));
    }

    let total = measured.len();
    let aa_pass = measured
        .iter()
        .filter(|(_, ratio)| *ratio >= CONTRAST_AA_RATIO)
        .count();
    let aaa_pass = measured
        .iter()
        .filter(|(_, ratio)| *ratio >= CONTRAST_AAA_RATIO)
        .count();
    let (aa_percent, aaa_percent, average_ratio, score) = if total == 0 {
        (100.0, 100.0, None, SCORE_SCALE_MAX)
    } else {
        let n = total as f64;
        let sum: f64 = measured.iter().map(|(_, ratio)| ratio).sum();
        (
            aa_pass as f64 / n * 100.0,
            aaa_pass as f64 / n * 100.0,
            Some(sum / n),
            aa_pass as f64 / n * SCORE_SCALE_MAX,
        )
    };

    measured.sort_by(|a, b| a.1.total_cmp(&b.1));
    let worst = measured
        .iter()
        .take(CONTRAST_WORST_OFFENDER_LIMIT)
        .filter(|(_, ratio)| *ratio < CONTRAST_AA_RATIO)
        .map(|(sample, ratio)| ContrastOffender {
            tag: sample.tag.clone(),
            text: sample.text.clone(),
            color: sample.color.clone(),
            background: sample.background.clone(),
            ratio: *ratio,
        })
        .collect();

    ContrastReport {
        total,
        aa_pass,
        aaa_pass,
        excluded_transparent,
        skipped_unparseable,
        aa_percent,
        aaa_percent,
        average_ratio,
        worst,
        score,
    }
}

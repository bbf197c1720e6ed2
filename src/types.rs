use serde::{Deserialize, Serialize};
use std::fmt;

/// Theme names the gallery ships. The set is closed; a theme is always passed
/// explicitly to the capture and measurement calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeId {
    Minimal,
    Onyx,
    Aurora,
    Paper,
    Brutalist,
    Neon,
}

impl ThemeId {
    pub const ALL: [ThemeId; 6] = [
        ThemeId::Minimal,
        ThemeId::Onyx,
        ThemeId::Aurora,
        ThemeId::Paper,
        ThemeId::Brutalist,
        ThemeId::Neon,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ThemeId::Minimal => "minimal",
            ThemeId::Onyx => "onyx",
            ThemeId::Aurora => "aurora",
            ThemeId::Paper => "paper",
            ThemeId::Brutalist => "brutalist",
            ThemeId::Neon => "neon",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|theme| theme.name() == lower)
    }

    pub fn is_dark(self) -> bool {
        matches!(self, ThemeId::Onyx | ThemeId::Neon)
    }

    /// Attribute selector scoping this theme's custom properties.
    pub fn selector(self) -> String {
        format!("[data-theme=\"{}\"]", self.name())
    }
}

impl fmt::Display for ThemeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A route of the built site and the short name used in file names and reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageTarget {
    pub path: String,
    pub name: String,
}

impl PageTarget {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }

    /// Home page, theme index and one detail page per theme.
    pub fn gallery_defaults() -> Vec<PageTarget> {
        let mut pages = vec![
            PageTarget::new("/", "home"),
            PageTarget::new("/themes/", "themes"),
        ];
        for theme in ThemeId::ALL {
            pages.push(PageTarget::new(
                format!("/themes/{}/", theme.name()),
                format!("theme-{}", theme.name()),
            ));
        }
        pages
    }

    pub fn url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        if self.path.starts_with('/') {
            format!("{}{}", base, self.path)
        } else {
            format!("{}/{}", base, self.path)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };
    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub fn rgb(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::rgb(r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0)
    }

    pub fn to_rgb8(self) -> (u8, u8, u8) {
        let channel = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        (channel(self.r), channel(self.g), channel(self.b))
    }

    /// Rounds every channel to the nearest 8-bit value, the precision stylesheets carry.
    pub fn quantized(self) -> Self {
        let (r, g, b) = self.to_rgb8();
        Self::from_rgb8(r, g, b)
    }

    pub fn to_hex(self) -> String {
        let (r, g, b) = self.to_rgb8();
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }

    pub fn to_hsl(self) -> Hsl {
        let max = self.r.max(self.g).max(self.b);
        let min = self.r.min(self.g).min(self.b);
        let l = (max + min) / 2.0;
        let delta = max - min;
        if delta <= f64::EPSILON {
            return Hsl { h: 0.0, s: 0.0, l };
        }
        let s = if l > 0.5 {
            delta / (2.0 - max - min)
        } else {
            delta / (max + min)
        };
        let h = if max == self.r {
            ((self.g - self.b) / delta).rem_euclid(6.0)
        } else if max == self.g {
            (self.b - self.r) / delta + 2.0
        } else {
            (self.r - self.g) / delta + 4.0
        };
        Hsl { h: h * 60.0, s, l }
    }

    pub fn from_hsl(hsl: Hsl) -> Self {
        let l = hsl.l.clamp(0.0, 1.0);
        let s = hsl.s.clamp(0.0, 1.0);
        if s <= f64::EPSILON {
            return Self::rgb(l, l, l);
        }
        let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
        let h = hsl.h.rem_euclid(360.0) / 60.0;
        let x = c * (1.0 - (h.rem_euclid(2.0) - 1.0).abs());
        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let m = l - c / 2.0;
        Self::rgb(r + m, g + m, b + m)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsl {
    /// Degrees, 0..360.
    pub h: f64,
    pub s: f64,
    pub l: f64,
}

use crate::error::AuditError;
use kuchiki::traits::TendrilSink;
use kuchiki::NodeRef;
use serde::{Deserialize, Serialize};

/// Per-element color record captured at measurement time. Discarded after the
/// analysis pass that reads it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleSample {
    pub tag: String,
    pub color: String,
    pub background: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerSample {
    pub label: String,
    pub padding_top: f64,
    pub padding_bottom: f64,
    pub padding_left: f64,
    pub padding_right: f64,
    pub margin_top: f64,
    pub margin_bottom: f64,
}

/// Resolved font sizes in px of the first h1, the first h2 and body text.
/// Absent elements report 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FontSizes {
    pub h1: f64,
    pub h2: f64,
    pub body: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    #[serde(default)]
    pub applied_theme: Option<String>,
    #[serde(default)]
    pub styles: Vec<StyleSample>,
    #[serde(default)]
    pub containers: Vec<ContainerSample>,
    #[serde(default)]
    pub font_sizes: FontSizes,
    #[serde(default)]
    pub markup: String,
}

impl PageSnapshot {
    pub fn from_json(raw: &str) -> Result<Self, AuditError> {
        serde_json::from_str(raw).map_err(|err| AuditError::Snapshot(err.to_string()))
    }
}

/// Elements whose text the contrast analyzer samples.
pub const TEXT_ELEMENT_SELECTOR: &str =
    "p, h1, h2, h3, h4, h5, h6, a, li, span, button, label, td, th, blockquote, figcaption";

/// Layout containers the spacing analyzer inspects.
pub const CONTAINER_SELECTOR: &str =
    "header, nav, main, footer, section, article, aside, .container, .card, .theme-card, .form-group";

/// Script evaluated in the page after the theme is applied. Returns the snapshot
/// as a JSON string so the payload crosses the protocol boundary in one piece.
pub fn snapshot_script() -> String {
    format!(
        r#"(() => {{
  const px = (v) => {{ const n = parseFloat(v); return Number.isFinite(n) ? n : 0; }};
  const visible = (el) => {{
    const cs = getComputedStyle(el);
    if (cs.display === 'none' || cs.visibility === 'hidden') return false;
    const r = el.getBoundingClientRect();
    return r.width > 0 && r.height > 0;
  }};
  const styles = [];
  for (const el of document.querySelectorAll('{text}')) {{
    const text = (el.textContent || '').trim();
    if (!text || !visible(el)) continue;
    const cs = getComputedStyle(el);
    styles.push({{ tag: el.tagName.toLowerCase(), color: cs.color, background: cs.backgroundColor, text: text.slice(0, 60) }});
  }}
  const containers = [];
  for (const el of document.querySelectorAll('{containers}')) {{
    if (!visible(el)) continue;
    const cs = getComputedStyle(el);
    const cls = (el.getAttribute('class') || '').trim().split(/\s+/).filter(Boolean).join('.');
    containers.push({{
      label: el.tagName.toLowerCase() + (cls ? '.' + cls : ''),
      padding_top: px(cs.paddingTop), padding_bottom: px(cs.paddingBottom),
      padding_left: px(cs.paddingLeft), padding_right: px(cs.paddingRight),
      margin_top: px(cs.marginTop), margin_bottom: px(cs.marginBottom)
    }});
  }}
  const size = (sel) => {{ const el = document.querySelector(sel); return el ? px(getComputedStyle(el).fontSize) : 0; }};
  return JSON.stringify({{
    applied_theme: document.documentElement.getAttribute('data-theme'),
    styles,
    containers,
    font_sizes: {{ h1: size('h1'), h2: size('h2'), body: size('p') || size('body') }},
    markup: document.documentElement.outerHTML
  }});
}})()"#,
        text = TEXT_ELEMENT_SELECTOR,
        containers = CONTAINER_SELECTOR,
    )
}

/// Parsed document markup. Structural predicates run over this rather than
/// over the live page.
pub struct PageDocument {
    root: NodeRef,
}

impl PageDocument {
    pub fn parse(markup: &str) -> Self {
        Self {
            root: kuchiki::parse_html().one(markup),
        }
    }

    pub fn count(&self, selector: &str) -> usize {
        self.root
            .select(selector)
            .map(|matches| matches.count())
            .unwrap_or(0)
    }

    pub fn has(&self, selector: &str) -> bool {
        self.root.select_first(selector).is_ok()
    }

    pub fn first_attr(&self, selector: &str, attr: &str) -> Option<String> {
        let node = self.root.select_first(selector).ok()?;
        let attrs = node.attributes.borrow();
        attrs.get(attr).map(|v| v.trim().to_string())
    }

    pub fn first_text(&self, selector: &str) -> Option<String> {
        let node = self.root.select_first(selector).ok()?;
        Some(node.as_node().text_contents().trim().to_string())
    }
}

/// Everything measured for one (theme, page) pair.
pub struct PageMeasurement {
    pub snapshot: PageSnapshot,
    pub document: PageDocument,
}

impl PageMeasurement {
    pub fn from_snapshot(snapshot: PageSnapshot) -> Self {
        let document = PageDocument::parse(&snapshot.markup);
        Self { snapshot, document }
    }
}

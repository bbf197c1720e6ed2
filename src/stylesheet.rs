//! Structured, formatting-preserving view of a stylesheet.
//!
//! The text is split into segments that cover it exactly. Untouched segments
//! serialize back byte-for-byte; an edited declaration is the only thing that
//! gets re-rendered. Patches address rules by selector and declarations by
//! name, so scoping does not depend on whitespace or comment placement.

use crate::types::ThemeId;
use lightningcss::stylesheet::{ParserOptions, StyleSheet};

#[derive(Debug, Clone, PartialEq)]
pub struct Stylesheet {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Trivia(String),
    Comment(String),
    Rule(StyleRule),
    /// Grouping at-rule (`@media`, `@supports`, ...) whose body is parsed.
    Group {
        head: String,
        children: Vec<Segment>,
        closed: bool,
    },
    /// Anything kept verbatim: statement at-rules, `@font-face`, `@keyframes`,
    /// stray or malformed text.
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StyleRule {
    prelude: String,
    body: Vec<BodyPart>,
    closed: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum BodyPart {
    Trivia(String),
    Decl(Declaration),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub value: String,
    pub important: bool,
    raw: Option<String>,
    has_semicolon: bool,
}

impl Declaration {
    fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            important: false,
            raw: None,
            has_semicolon: true,
        }
    }

    fn parse(raw: &str, has_semicolon: bool) -> Option<Self> {
        let (name, rest) = raw.split_once(':')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let mut value = rest.trim();
        if has_semicolon {
            value = value.strip_suffix(';').unwrap_or(value).trim_end();
        }
        let mut important = false;
        let lower = value.to_ascii_lowercase();
        if let Some(idx) = lower.rfind("!important") {
            if lower[idx..].trim_end() == "!important" {
                important = true;
                value = value[..idx].trim_end();
            }
        }
        Some(Self {
            name: name.to_string(),
            value: value.to_string(),
            important,
            raw: Some(raw.to_string()),
            has_semicolon,
        })
    }

    fn render(&self, out: &mut String) {
        if let Some(raw) = &self.raw {
            out.push_str(raw);
            return;
        }
        out.push_str(&self.name);
        out.push_str(": ");
        out.push_str(&self.value);
        if self.important {
            out.push_str(" !important");
        }
        if self.has_semicolon {
            out.push(';');
        }
    }
}

impl StyleRule {
    /// A fresh rule rendered one declaration per line with two-space indent.
    pub fn new(selector: &str, declarations: &[(&str, &str)]) -> Self {
        let mut body = Vec::with_capacity(declarations.len() * 2 + 1);
        for (name, value) in declarations {
            body.push(BodyPart::Trivia("\n  ".to_string()));
            body.push(BodyPart::Decl(Declaration::new(name, value)));
        }
        body.push(BodyPart::Trivia("\n".to_string()));
        Self {
            prelude: format!("{} ", selector.trim()),
            body,
            closed: true,
        }
    }

    pub fn selectors(&self) -> Vec<String> {
        split_top_level(&self.prelude, b',')
            .into_iter()
            .map(normalize_selector)
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn matches_selector(&self, selector: &str) -> bool {
        let wanted = normalize_selector(selector);
        self.selectors().iter().any(|s| *s == wanted)
    }

    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.body.iter().filter_map(|part| match part {
            BodyPart::Decl(decl) => Some(decl),
            _ => None,
        })
    }

    /// Value of the last declaration of `name`, the one that wins the cascade.
    pub fn declaration(&self, name: &str) -> Option<&str> {
        self.declarations()
            .filter(|decl| decl.name == name)
            .last()
            .map(|decl| decl.value.as_str())
    }

    /// Sets `name` to `value`, appending the declaration when it is absent.
    /// Returns whether the rendered text changes.
    pub fn set_declaration(&mut self, name: &str, value: &str) -> bool {
        let value = value.trim();
        let existing = self.body.iter_mut().rev().find_map(|part| match part {
            BodyPart::Decl(decl) if decl.name == name => Some(decl),
            _ => None,
        });
        if let Some(decl) = existing {
            if decl.value == value {
                return false;
            }
            decl.value = value.to_string();
            decl.raw = None;
            decl.has_semicolon = true;
            return true;
        }
        self.append_declaration(Declaration::new(name, value));
        true
    }

    fn append_declaration(&mut self, decl: Declaration) {
        let indent = self.declaration_indent();
        let last_content = self
            .body
            .iter()
            .rposition(|part| !matches!(part, BodyPart::Trivia(_)));
        if let Some(idx) = last_content {
            if let BodyPart::Decl(prev) = &mut self.body[idx] {
                if !prev.has_semicolon {
                    let mut rendered = String::new();
                    prev.render(&mut rendered);
                    rendered.push(';');
                    prev.raw = Some(rendered);
                    prev.has_semicolon = true;
                }
            }
        }
        let insert_at = last_content.map(|idx| idx + 1).unwrap_or(0);
        self.body.insert(insert_at, BodyPart::Decl(decl));
        self.body
            .insert(insert_at, BodyPart::Trivia(format!("\n{indent}")));
        let trailing_newline = self.body[insert_at + 2..].iter().any(|part| match part {
            BodyPart::Trivia(text) => text.contains('\n'),
            _ => false,
        });
        if !trailing_newline {
            self.body.push(BodyPart::Trivia("\n".to_string()));
        }
    }

    fn declaration_indent(&self) -> String {
        let mut previous: Option<&str> = None;
        for part in &self.body {
            match part {
                BodyPart::Trivia(text) => previous = Some(text.as_str()),
                BodyPart::Decl(_) => {
                    if let Some(text) = previous {
                        if let Some((_, indent)) = text.rsplit_once('\n') {
                            if indent.chars().all(|ch| ch == ' ' || ch == '\t') {
                                return indent.to_string();
                            }
                        }
                    }
                    break;
                }
                BodyPart::Raw(_) => previous = None,
            }
        }
        "  ".to_string()
    }

    fn render(&self, out: &mut String) {
        out.push_str(&self.prelude);
        out.push('{');
        for part in &self.body {
            match part {
                BodyPart::Trivia(text) | BodyPart::Raw(text) => out.push_str(text),
                BodyPart::Decl(decl) => decl.render(out),
            }
        }
        if self.closed {
            out.push('}');
        }
    }

    pub fn to_css(&self) -> String {
        let mut out = String::new();
        self.render(&mut out);
        out
    }
}

impl Stylesheet {
    pub fn parse(text: &str) -> Self {
        let (segments, _) = parse_segments(text, 0, text.len(), false);
        Self { segments }
    }

    pub fn to_css(&self) -> String {
        let mut out = String::new();
        render_segments(&self.segments, &mut out);
        out
    }

    /// Top-level style rules in source order.
    pub fn rules(&self) -> impl Iterator<Item = &StyleRule> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Rule(rule) => Some(rule),
            _ => None,
        })
    }

    pub fn find_rule(&self, selector: &str) -> Option<&StyleRule> {
        self.rules().find(|rule| rule.matches_selector(selector))
    }

    pub fn find_rule_mut(&mut self, selector: &str) -> Option<&mut StyleRule> {
        self.segments.iter_mut().find_map(|segment| match segment {
            Segment::Rule(rule) if rule.matches_selector(selector) => Some(rule),
            _ => None,
        })
    }

    /// The top-level rule scoping `theme`, matched on `[data-theme=<name>]`
    /// regardless of quoting, optionally qualified by `:root` or `html`.
    /// Like [`Stylesheet::find_rule_mut`], but only matches a rule whose
    /// selector list is exactly `selector`, so `.card, .panel` is not returned
    /// for `.card`.
    pub fn find_sole_rule_mut(&mut self, selector: &str) -> Option<&mut StyleRule> {
        let wanted = normalize_selector(selector);
        self.segments.iter_mut().find_map(|segment| match segment {
            Segment::Rule(rule) if rule.selectors() == [wanted.as_str()] => Some(rule),
            _ => None,
        })
    }

    pub fn find_theme_rule(&self, theme: ThemeId) -> Option<&StyleRule> {
        self.rules().find(|rule| is_theme_rule(rule, theme))
    }

    pub fn find_theme_rule_mut(&mut self, theme: ThemeId) -> Option<&mut StyleRule> {
        self.segments.iter_mut().find_map(|segment| match segment {
            Segment::Rule(rule) if is_theme_rule(rule, theme) => Some(rule),
            _ => None,
        })
    }

    pub fn has_comment(&self, marker: &str) -> bool {
        self.comment_index(marker).is_some()
    }

    /// Inserts `rule` directly before the top-level comment `marker`, followed by
    /// a blank line. Returns false when the marker is absent.
    pub fn insert_rule_before_comment(&mut self, marker: &str, rule: StyleRule) -> bool {
        let Some(idx) = self.comment_index(marker) else {
            return false;
        };
        self.segments.insert(idx, Segment::Trivia("\n\n".to_string()));
        self.segments.insert(idx, Segment::Rule(rule));
        true
    }

    fn comment_index(&self, marker: &str) -> Option<usize> {
        let wanted = comment_inner(marker);
        self.segments.iter().position(|segment| match segment {
            Segment::Comment(text) => comment_inner(text) == wanted,
            _ => false,
        })
    }
}

/// Checks that `text` parses as a stylesheet.
pub fn validate_css(text: &str) -> Result<(), String> {
    StyleSheet::parse(text, ParserOptions::default())
        .map(|_| ())
        .map_err(|err| err.to_string())
}

fn is_theme_rule(rule: &StyleRule, theme: ThemeId) -> bool {
    let wanted = format!("[data-theme={}]", theme.name());
    rule.selectors().iter().any(|selector| {
        let compact: String = selector
            .chars()
            .filter(|ch| !ch.is_whitespace() && *ch != '"' && *ch != '\'')
            .collect::<String>()
            .to_ascii_lowercase();
        match compact.strip_suffix(&wanted) {
            Some(prefix) => matches!(prefix, "" | ":root" | "html"),
            None => false,
        }
    })
}

fn comment_inner(text: &str) -> &str {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_prefix("/*").unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("*/").unwrap_or(trimmed);
    trimmed.trim()
}

fn normalize_selector(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_grouping_at_rule(head: &str) -> bool {
    let name: String = head
        .trim_start_matches('@')
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '-')
        .collect::<String>()
        .to_ascii_lowercase();
    matches!(
        name.as_str(),
        "media" | "supports" | "layer" | "container" | "document" | "scope"
    )
}

fn render_segments(segments: &[Segment], out: &mut String) {
    for segment in segments {
        match segment {
            Segment::Trivia(text) | Segment::Comment(text) | Segment::Raw(text) => {
                out.push_str(text)
            }
            Segment::Rule(rule) => rule.render(out),
            Segment::Group {
                head,
                children,
                closed,
            } => {
                out.push_str(head);
                render_segments(children, out);
                if *closed {
                    out.push('}');
                }
            }
        }
    }
}

/// Parses `src[start..end]` into segments. When `nested`, a top-level `}`
/// ends the list; the returned index points at it (or at `end`).
fn parse_segments(src: &str, start: usize, end: usize, nested: bool) -> (Vec<Segment>, usize) {
    let bytes = src.as_bytes();
    let mut segments = Vec::new();
    let mut i = start;
    while i < end {
        let b = bytes[i];
        if b.is_ascii_whitespace() {
            let run_end = skip_whitespace(bytes, i, end);
            segments.push(Segment::Trivia(src[i..run_end].to_string()));
            i = run_end;
        } else if starts_comment(bytes, i, end) {
            let comment_end = skip_comment(bytes, i, end);
            segments.push(Segment::Comment(src[i..comment_end].to_string()));
            i = comment_end;
        } else if b == b'}' {
            if nested {
                return (segments, i);
            }
            segments.push(Segment::Raw("}".to_string()));
            i += 1;
        } else {
            let delim = scan_until(bytes, i, end, &[b'{', b';', b'}']);
            match bytes.get(delim).copied() {
                Some(b'{') if delim < end => {
                    let close = find_block_end(bytes, delim, end);
                    let closed = close < end;
                    if b == b'@' {
                        let head = &src[i..=delim];
                        if is_grouping_at_rule(head) {
                            let (children, _) = parse_segments(src, delim + 1, close, true);
                            segments.push(Segment::Group {
                                head: head.to_string(),
                                children,
                                closed,
                            });
                        } else {
                            let stop = if closed { close + 1 } else { end };
                            segments.push(Segment::Raw(src[i..stop].to_string()));
                        }
                    } else {
                        segments.push(Segment::Rule(StyleRule {
                            prelude: src[i..delim].to_string(),
                            body: parse_body(src, delim + 1, close),
                            closed,
                        }));
                    }
                    i = if closed { close + 1 } else { end };
                }
                Some(b';') if delim < end => {
                    segments.push(Segment::Raw(src[i..=delim].to_string()));
                    i = delim + 1;
                }
                _ => {
                    // `}` belongs to the enclosing group; anything else is unterminated.
                    segments.push(Segment::Raw(src[i..delim].to_string()));
                    i = delim;
                }
            }
        }
    }
    (segments, end)
}

fn parse_body(src: &str, start: usize, end: usize) -> Vec<BodyPart> {
    let bytes = src.as_bytes();
    let mut parts = Vec::new();
    let mut i = start;
    while i < end {
        if bytes[i].is_ascii_whitespace() {
            let run_end = skip_whitespace(bytes, i, end);
            parts.push(BodyPart::Trivia(src[i..run_end].to_string()));
            i = run_end;
            continue;
        }
        if starts_comment(bytes, i, end) {
            let comment_end = skip_comment(bytes, i, end);
            parts.push(BodyPart::Trivia(src[i..comment_end].to_string()));
            i = comment_end;
            continue;
        }
        let delim = scan_until(bytes, i, end, &[b';', b'{']);
        if delim < end && bytes[delim] == b'{' {
            let close = find_block_end(bytes, delim, end);
            let stop = if close < end { close + 1 } else { end };
            parts.push(BodyPart::Raw(src[i..stop].to_string()));
            i = stop;
            continue;
        }
        let (raw, has_semicolon, next) = if delim < end {
            (&src[i..=delim], true, delim + 1)
        } else {
            (src[i..end].trim_end(), false, i + src[i..end].trim_end().len())
        };
        match Declaration::parse(raw, has_semicolon) {
            Some(decl) => parts.push(BodyPart::Decl(decl)),
            None => parts.push(BodyPart::Raw(raw.to_string())),
        }
        i = next;
    }
    parts
}

fn skip_whitespace(bytes: &[u8], mut i: usize, end: usize) -> usize {
    while i < end && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

fn starts_comment(bytes: &[u8], i: usize, end: usize) -> bool {
    i + 1 < end && bytes[i] == b'/' && bytes[i + 1] == b'*'
}

fn skip_comment(bytes: &[u8], i: usize, end: usize) -> usize {
    let mut j = i + 2;
    while j + 1 < end {
        if bytes[j] == b'*' && bytes[j + 1] == b'/' {
            return j + 2;
        }
        j += 1;
    }
    end
}

fn skip_string(bytes: &[u8], i: usize, end: usize) -> usize {
    let quote = bytes[i];
    let mut j = i + 1;
    while j < end {
        match bytes[j] {
            b'\\' => j += 2,
            ch if ch == quote => return j + 1,
            _ => j += 1,
        }
    }
    end
}

/// Index of the first top-level byte in `stops`, skipping strings, comments
/// and parenthesised or bracketed runs. Returns `end` when none is found.
fn scan_until(bytes: &[u8], start: usize, end: usize, stops: &[u8]) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i < end {
        let b = bytes[i];
        if b == b'"' || b == b'\'' {
            i = skip_string(bytes, i, end);
            continue;
        }
        if starts_comment(bytes, i, end) {
            i = skip_comment(bytes, i, end);
            continue;
        }
        match b {
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            _ if depth == 0 && stops.contains(&b) => return i,
            _ => {}
        }
        i += 1;
    }
    end
}

/// Index of the `}` matching the `{` at `open`, or `end` when unclosed.
fn find_block_end(bytes: &[u8], open: usize, end: usize) -> usize {
    let mut depth = 0usize;
    let mut i = open;
    while i < end {
        let b = bytes[i];
        if b == b'"' || b == b'\'' {
            i = skip_string(bytes, i, end);
            continue;
        }
        if starts_comment(bytes, i, end) {
            i = skip_comment(bytes, i, end);
            continue;
        }
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return i;
                }
            }
            _ => {}
        }
        i += 1;
    }
    end
}

fn split_top_level(raw: &str, separator: u8) -> Vec<&str> {
    let bytes = raw.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0usize;
    loop {
        let idx = scan_until(bytes, start, bytes.len(), &[separator]);
        parts.push(&raw[start..idx]);
        if idx >= bytes.len() {
            break;
        }
        start = idx + 1;
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    const THEMES_CSS: &str = r#"/* Theme variables */
:root {
  --space-md: 1rem;
}

[data-theme="onyx"] {
  --color-text-primary: #9a9a9a;
  --color-text-secondary: #777;
  --color-bg-primary: #1c1c1c;
}

[data-theme='paper'] {
    --color-text-primary: #333333;
    --color-bg-primary: #fafafa;  /* warm */
}

@media (prefers-reduced-motion: reduce) {
  .card { transition: none; }
}
"#;

    #[test]
    fn sole_rule_lookup_skips_selector_lists() {
        let mut sheet = Stylesheet::parse(".card, .panel { padding: 2px; }\n.card { margin: 0; }\n");
        let rule = sheet.find_sole_rule_mut(" .card ").expect("single .card rule");
        assert_eq!(rule.declaration("margin"), Some("0"));
        assert!(sheet.find_sole_rule_mut(".panel").is_none());
        assert!(sheet.find_rule(".panel").is_some());
    }

    #[test]
    fn unchanged_sheet_round_trips_exactly() {
        let samples = [
            THEMES_CSS,
            "",
            "a{color:red}",
            "@import url(\"x.css\");\nbody { background: url(data:image/png;base64,AAA=) }",
            ".a { content: \"}{;\" } /* } */ .b{}",
            "@font-face { font-family: X; src: url(x.woff2); }\n.c { color: blue",
            ".nest { color: red; &:hover { color: blue; } }",
            "}} stray",
        ];
        for css in samples {
            assert_eq!(Stylesheet::parse(css).to_css(), css, "round trip of {css:?}");
        }
    }

    #[test]
    fn finds_rules_by_selector() {
        let sheet = Stylesheet::parse(THEMES_CSS);
        let root = sheet.find_rule(":root").expect(":root rule");
        assert_eq!(root.declaration("--space-md"), Some("1rem"));
        assert!(sheet.find_rule(".card").is_none(), "nested rules are not top-level");
        assert_eq!(sheet.rules().count(), 3);
    }

    #[test]
    fn theme_rule_lookup_ignores_quoting() {
        let sheet = Stylesheet::parse(THEMES_CSS);
        let onyx = sheet.find_theme_rule(ThemeId::Onyx).expect("onyx");
        assert_eq!(onyx.declaration("--color-bg-primary"), Some("#1c1c1c"));
        let paper = sheet.find_theme_rule(ThemeId::Paper).expect("paper");
        assert_eq!(paper.declaration("--color-bg-primary"), Some("#fafafa"));
        assert!(sheet.find_theme_rule(ThemeId::Neon).is_none());

        let qualified = Stylesheet::parse("html[data-theme = neon], .x { --a: 1; }");
        assert!(qualified.find_theme_rule(ThemeId::Neon).is_some());
        let descendant = Stylesheet::parse(".card [data-theme=neon] { --a: 1; }");
        assert!(descendant.find_theme_rule(ThemeId::Neon).is_none());
    }

    #[test]
    fn setting_a_declaration_touches_only_that_declaration() {
        let mut sheet = Stylesheet::parse(THEMES_CSS);
        let onyx = sheet.find_theme_rule_mut(ThemeId::Onyx).expect("onyx");
        assert!(onyx.set_declaration("--color-bg-primary", "#000000"));
        assert!(!onyx.set_declaration("--color-bg-primary", "#000000"));
        let out = sheet.to_css();
        assert_eq!(
            out,
            THEMES_CSS.replace("--color-bg-primary: #1c1c1c;", "--color-bg-primary: #000000;")
        );
    }

    #[test]
    fn important_flag_survives_edits() {
        let mut sheet = Stylesheet::parse(".a { color: red !IMPORTANT; }");
        let rule = sheet.find_rule_mut(".a").expect("rule");
        assert_eq!(rule.declaration("color"), Some("red"));
        assert!(rule.declarations().all(|d| d.important));
        rule.set_declaration("color", "blue");
        assert_eq!(sheet.to_css(), ".a { color: blue !important; }");
    }

    #[test]
    fn appending_declarations_follows_indentation() {
        let mut sheet = Stylesheet::parse(".card {\n    padding: 4px\n}\n");
        let rule = sheet.find_rule_mut(".card").expect("rule");
        assert!(rule.set_declaration("margin-bottom", "var(--space-md)"));
        assert_eq!(
            sheet.to_css(),
            ".card {\n    padding: 4px;\n    margin-bottom: var(--space-md);\n}\n"
        );

        let mut sheet = Stylesheet::parse(".e{}");
        let rule = sheet.find_rule_mut(".e").expect("rule");
        rule.set_declaration("color", "red");
        assert_eq!(sheet.to_css(), ".e{\n  color: red;\n}");
    }

    #[test]
    fn inserts_rule_before_marker_comment() {
        let css = "body { margin: 0; }\n\n/* Layout */\n.grid { display: grid; }\n";
        let mut sheet = Stylesheet::parse(css);
        assert!(sheet.has_comment("/* Layout */"));
        let rule = StyleRule::new(".container", &[("max-width", "1200px"), ("margin", "0 auto")]);
        assert!(sheet.insert_rule_before_comment("/* Layout */", rule));
        assert_eq!(
            sheet.to_css(),
            "body { margin: 0; }\n\n.container {\n  max-width: 1200px;\n  margin: 0 auto;\n}\n\n/* Layout */\n.grid { display: grid; }\n"
        );
        let missing = StyleRule::new(".x", &[]);
        assert!(!sheet.insert_rule_before_comment("/* Footer */", missing));
    }

    #[test]
    fn selector_lists_are_normalized() {
        let sheet = Stylesheet::parse(".a,\n  .b   .c { color: red; }");
        let rule = sheet.rules().next().expect("rule");
        assert_eq!(rule.selectors(), vec![".a".to_string(), ".b .c".to_string()]);
        assert!(rule.matches_selector(".b  .c"));
    }

    #[test]
    fn validation_uses_lightningcss() {
        assert!(validate_css(THEMES_CSS).is_ok());
        assert!(validate_css("..a { color: red; }").is_err());
    }
}

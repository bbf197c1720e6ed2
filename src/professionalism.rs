//! Structural and metadata checklist.
//!
//! Each check is a named predicate over the parsed page. Questions and ids come
//! from the scoring contract; score and percentage are derived from the list
//! length so there is exactly one checklist definition.

use crate::snapshot::PageDocument;
use gallery_audit_contract::{
    PROFESSIONALISM_MIN_SEMANTIC_REGIONS, SCORE_SCALE_MAX, professionalism_check_def,
};
use serde::Serialize;

const SEMANTIC_REGION_SELECTOR: &str = "header, nav, main, footer, section, article, aside";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub passed: bool,
    pub finding: String,
}

impl CheckOutcome {
    fn new(passed: bool, finding: impl Into<String>) -> Self {
        Self {
            passed,
            finding: finding.into(),
        }
    }
}

pub struct ProfessionalismCheck {
    pub id: &'static str,
    pub evaluate: fn(&PageDocument) -> CheckOutcome,
}

fn region_check(doc: &PageDocument, selector: &str, label: &str) -> CheckOutcome {
    let count = doc.count(selector);
    if count > 0 {
        CheckOutcome::new(true, format!("{count} {label} element(s)"))
    } else {
        CheckOutcome::new(false, format!("no {label} element"))
    }
}

fn non_empty_meta(doc: &PageDocument, selector: &str, label: &str) -> CheckOutcome {
    match doc.first_attr(selector, "content") {
        Some(content) if !content.is_empty() => {
            CheckOutcome::new(true, format!("{label}: {}", truncate(&content, 80)))
        }
        Some(_) => CheckOutcome::new(false, format!("{label} is empty")),
        None => CheckOutcome::new(false, format!("{label} missing")),
    }
}

fn truncate(raw: &str, limit: usize) -> String {
    if raw.chars().count() <= limit {
        return raw.to_string();
    }
    let mut out: String = raw.chars().take(limit).collect();
    out.push('…');
    out
}

fn check_header(doc: &PageDocument) -> CheckOutcome {
    region_check(doc, "header, [role=\"banner\"]", "header")
}

fn check_footer(doc: &PageDocument) -> CheckOutcome {
    region_check(doc, "footer, [role=\"contentinfo\"]", "footer")
}

fn check_nav(doc: &PageDocument) -> CheckOutcome {
    region_check(doc, "nav, [role=\"navigation\"]", "nav")
}

fn check_main(doc: &PageDocument) -> CheckOutcome {
    region_check(doc, "main, [role=\"main\"]", "main")
}

fn check_semantic_count(doc: &PageDocument) -> CheckOutcome {
    let count = doc.count(SEMANTIC_REGION_SELECTOR);
    CheckOutcome::new(
        count >= PROFESSIONALISM_MIN_SEMANTIC_REGIONS,
        format!(
            "{count} semantic region(s), {} required",
            PROFESSIONALISM_MIN_SEMANTIC_REGIONS
        ),
    )
}

fn check_description(doc: &PageDocument) -> CheckOutcome {
    non_empty_meta(doc, "meta[name=\"description\"]", "description")
}

fn check_title(doc: &PageDocument) -> CheckOutcome {
    match doc.first_text("title") {
        Some(title) if !title.is_empty() => {
            CheckOutcome::new(true, format!("title: {}", truncate(&title, 80)))
        }
        Some(_) => CheckOutcome::new(false, "title is empty"),
        None => CheckOutcome::new(false, "title missing"),
    }
}

fn check_viewport(doc: &PageDocument) -> CheckOutcome {
    match doc.first_attr("meta[name=\"viewport\"]", "content") {
        Some(content) => {
            let compact: String = content
                .chars()
                .filter(|ch| !ch.is_whitespace())
                .collect::<String>()
                .to_ascii_lowercase();
            let responsive = compact.contains("width=device-width");
            CheckOutcome::new(responsive, format!("viewport: {content}"))
        }
        None => CheckOutcome::new(false, "viewport meta missing"),
    }
}

fn check_canonical(doc: &PageDocument) -> CheckOutcome {
    match doc.first_attr("link[rel=\"canonical\"]", "href") {
        Some(href) if !href.is_empty() => CheckOutcome::new(true, format!("canonical: {href}")),
        _ => CheckOutcome::new(false, "canonical link missing"),
    }
}

fn check_social_preview(doc: &PageDocument) -> CheckOutcome {
    let title = doc.has("meta[property=\"og:title\"]");
    let description = doc.has("meta[property=\"og:description\"]");
    let finding = match (title, description) {
        (true, true) => "og:title and og:description present",
        (true, false) => "og:description missing",
        (false, true) => "og:title missing",
        (false, false) => "og:title and og:description missing",
    };
    CheckOutcome::new(title && description, finding)
}

const CHECKLIST: [ProfessionalismCheck; 10] = [
    ProfessionalismCheck { id: "pro.region.header", evaluate: check_header },
    ProfessionalismCheck { id: "pro.region.footer", evaluate: check_footer },
    ProfessionalismCheck { id: "pro.region.nav", evaluate: check_nav },
    ProfessionalismCheck { id: "pro.region.main", evaluate: check_main },
    ProfessionalismCheck { id: "pro.region.semantic_count", evaluate: check_semantic_count },
    ProfessionalismCheck { id: "pro.meta.description", evaluate: check_description },
    ProfessionalismCheck { id: "pro.meta.title", evaluate: check_title },
    ProfessionalismCheck { id: "pro.meta.viewport", evaluate: check_viewport },
    ProfessionalismCheck { id: "pro.meta.canonical", evaluate: check_canonical },
    ProfessionalismCheck { id: "pro.meta.social_preview", evaluate: check_social_preview },
];

pub fn checklist() -> &'static [ProfessionalismCheck] {
    &CHECKLIST
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub id: String,
    pub question: String,
    pub passed: bool,
    pub finding: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfessionalismReport {
    pub checks: Vec<CheckResult>,
    pub passed: usize,
    pub total: usize,
    pub percent: f64,
    pub score: f64,
}

pub fn analyze_professionalism(document: &PageDocument) -> ProfessionalismReport {
    let checks: Vec<CheckResult> = checklist()
        .iter()
        .map(|check| {
            let outcome = (check.evaluate)(document);
            let question = professionalism_check_def(check.id)
                .map(|def| def.question.to_string())
                .unwrap_or_else(|| check.id.to_string());
            CheckResult {
                id: check.id.to_string(),
                question,
                passed: outcome.passed,
                finding: outcome.finding,
            }
        })
        .collect();
    let total = checks.len();
    let passed = checks.iter().filter(|c| c.passed).count();
    let fraction = if total == 0 {
        1.0
    } else {
        passed as f64 / total as f64
    };
    ProfessionalismReport {
        checks,
        passed,
        total,
        percent: fraction * 100.0,
        score: fraction * SCORE_SCALE_MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gallery_audit_contract::professionalism_check_defs_v1;

    const COMPLETE_PAGE: &str = r#"<!doctype html>
<html lang="en"><head>
<title>Onyx | Design Gallery</title>
<meta name="description" content="A dark, high-contrast theme.">
<meta name="viewport" content="width = device-width, initial-scale=1">
<link rel="canonical" href="https://gallery.example/themes/onyx/">
<meta property="og:title" content="Onyx">
<meta property="og:description" content="A dark theme">
</head><body>
<header><nav><a href="/">Home</a></nav></header>
<main><section><h1>Onyx</h1></section></main>
<footer>footer</footer>
</body></html>"#;

    #[test]
    fn checklist_matches_contract() {
        let ids: Vec<&str> = checklist().iter().map(|c| c.id).collect();
        let contract: Vec<&str> = professionalism_check_defs_v1().iter().map(|d| d.id).collect();
        assert_eq!(ids, contract);
    }

    #[test]
    fn complete_page_passes_every_check() {
        let report = analyze_professionalism(&PageDocument::parse(COMPLETE_PAGE));
        let failed: Vec<&CheckResult> = report.checks.iter().filter(|c| !c.passed).collect();
        assert!(failed.is_empty(), "failed checks: {failed:?}");
        assert_eq!(report.passed, 10);
        assert_eq!(report.score, 5.0);
        assert_eq!(report.percent, 100.0);
    }

    #[test]
    fn bare_page_fails_with_findings() {
        let report = analyze_professionalism(&PageDocument::parse(
            "<html><head><title></title><meta name=\"viewport\" content=\"width=1024\"></head><body><div>hi</div></body></html>",
        ));
        assert_eq!(report.passed, 0);
        assert_eq!(report.score, 0.0);
        let title = report
            .checks
            .iter()
            .find(|c| c.id == "pro.meta.title")
            .expect("title check");
        assert_eq!(title.finding, "title is empty");
        assert_eq!(title.question, "Is there a non-empty title element?");
    }

    #[test]
    fn partial_page_scores_proportionally() {
        let page = "<html><head><title>t</title></head><body>\
            <header></header><nav></nav><main></main><footer></footer></body></html>";
        let report = analyze_professionalism(&PageDocument::parse(page));
        // header, footer, nav, main, semantic count, title
        assert_eq!(report.passed, 6);
        assert!((report.score - 3.0).abs() < 1e-9);
        assert!((report.percent - 60.0).abs() < 1e-9);
    }

    #[test]
    fn social_preview_needs_both_tags() {
        let doc = PageDocument::parse(
            "<html><head><meta property=\"og:title\" content=\"x\"></head><body></body></html>",
        );
        let outcome = check_social_preview(&doc);
        assert!(!outcome.passed);
        assert_eq!(outcome.finding, "og:description missing");
    }
}

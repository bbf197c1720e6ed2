use crate::snapshot::{FontSizes, PageDocument};
use gallery_audit_contract::SCORE_SCALE_MAX;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypographyReport {
    /// Heading counts for h1..h6.
    pub heading_counts: [usize; 6],
    pub font_sizes: FontSizes,
    pub has_proper_hierarchy: bool,
    pub has_multiple_levels: bool,
    pub has_size_hierarchy: bool,
    pub score: f64,
}

pub fn count_headings(document: &PageDocument) -> [usize; 6] {
    let mut counts = [0usize; 6];
    for (idx, count) in counts.iter_mut().enumerate() {
        *count = document.count(&format!("h{}", idx + 1));
    }
    counts
}

pub fn analyze_typography(heading_counts: [usize; 6], font_sizes: FontSizes) -> TypographyReport {
    let has_proper_hierarchy = heading_counts[0] == 1;
    let has_multiple_levels = heading_counts.iter().filter(|count| **count > 0).count() >= 2;
    let has_size_hierarchy = font_sizes.h1 > font_sizes.h2
        && font_sizes.h2 > font_sizes.body
        && font_sizes.body > 0.0;
    let passed = [has_proper_hierarchy, has_multiple_levels, has_size_hierarchy]
        .iter()
        .filter(|flag| **flag)
        .count();
    TypographyReport {
        heading_counts,
        font_sizes,
        has_proper_hierarchy,
        has_multiple_levels,
        has_size_hierarchy,
        score: passed as f64 / 3.0 * SCORE_SCALE_MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(h1: f64, h2: f64, body: f64) -> FontSizes {
        FontSizes { h1, h2, body }
    }

    #[test]
    fn counts_headings_from_markup() {
        let doc = PageDocument::parse(
            "<body><h1>Gallery</h1><h2>A</h2><h2>B</h2><h3>c</h3><p>text</p></body>",
        );
        assert_eq!(count_headings(&doc), [1, 2, 1, 0, 0, 0]);
    }

    #[test]
    fn full_hierarchy_scores_five() {
        let report = analyze_typography([1, 3, 2, 0, 0, 0], sizes(40.0, 28.0, 16.0));
        assert!(report.has_proper_hierarchy);
        assert!(report.has_multiple_levels);
        assert!(report.has_size_hierarchy);
        assert_eq!(report.score, 5.0);
    }

    #[test]
    fn multiple_h1_breaks_hierarchy() {
        let report = analyze_typography([2, 1, 0, 0, 0, 0], sizes(40.0, 28.0, 16.0));
        assert!(!report.has_proper_hierarchy);
        assert!(report.has_multiple_levels);
        assert!((report.score - 10.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn missing_elements_count_as_zero_size() {
        let report = analyze_typography([1, 0, 0, 0, 0, 0], sizes(40.0, 0.0, 16.0));
        assert!(report.has_proper_hierarchy);
        assert!(!report.has_multiple_levels);
        assert!(!report.has_size_hierarchy);
        assert!((report.score - 5.0 / 3.0).abs() < 1e-9);

        let report = analyze_typography([0; 6], sizes(0.0, 0.0, 0.0));
        assert_eq!(report.score, 0.0);
    }

    #[test]
    fn equal_sizes_are_not_a_hierarchy() {
        let report = analyze_typography([1, 1, 0, 0, 0, 0], sizes(24.0, 24.0, 16.0));
        assert!(!report.has_size_hierarchy);
    }
}

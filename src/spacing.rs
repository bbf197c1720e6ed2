use crate::snapshot::ContainerSample;
use gallery_audit_contract::{SCORE_SCALE_MAX, SPACING_SYMMETRY_TOLERANCE_PX};
use serde::Serialize;

/// Padding is consistent when it is symmetric on both axes, not when it
/// matches a global scale.
pub fn has_consistent_padding(container: &ContainerSample) -> bool {
    (container.padding_top - container.padding_bottom).abs() < SPACING_SYMMETRY_TOLERANCE_PX
        && (container.padding_left - container.padding_right).abs()
            < SPACING_SYMMETRY_TOLERANCE_PX
}

pub fn has_vertical_spacing(container: &ContainerSample) -> bool {
    container.margin_top > 0.0 || container.margin_bottom > 0.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpacingIssue {
    pub label: String,
    pub padding: [f64; 4],
    pub margin_top: f64,
    pub margin_bottom: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpacingReport {
    pub total: usize,
    pub consistent_padding: usize,
    pub vertical_spacing: usize,
    pub consistency_score: f64,
    pub spacing_score: f64,
    pub overall_score: f64,
    /// Containers failing both checks.
    pub issues: Vec<SpacingIssue>,
}

pub fn analyze_spacing(containers: &[ContainerSample]) -> SpacingReport {
    let total = containers.len();
    let mut consistent_padding = 0usize;
    let mut vertical_spacing = 0usize;
    let mut issues = Vec::new();
    for container in containers {
        let consistent = has_consistent_padding(container);
        let spaced = has_vertical_spacing(container);
        if consistent {
            consistent_padding += 1;
        }
        if spaced {
            vertical_spacing += 1;
        }
        if !consistent && !spaced {
            issues.push(SpacingIssue {
                label: container.label.clone(),
                padding: [
                    container.padding_top,
                    container.padding_right,
                    container.padding_bottom,
                    container.padding_left,
                ],
                margin_top: container.margin_top,
                margin_bottom: container.margin_bottom,
            });
        }
    }

    let (consistency_fraction, spacing_fraction) = if total == 0 {
        (1.0, 1.0)
    } else {
        (
            consistent_padding as f64 / total as f64,
            vertical_spacing as f64 / total as f64,
        )
    };
    SpacingReport {
        total,
        consistent_padding,
        vertical_spacing,
        consistency_score: consistency_fraction * SCORE_SCALE_MAX,
        spacing_score: spacing_fraction * SCORE_SCALE_MAX,
        overall_score: (consistency_fraction + spacing_fraction) / 2.0 * SCORE_SCALE_MAX,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(label: &str, padding: [f64; 4], margins: [f64; 2]) -> ContainerSample {
        ContainerSample {
            label: label.to_string(),
            padding_top: padding[0],
            padding_right: padding[1],
            padding_bottom: padding[2],
            padding_left: padding[3],
            margin_top: margins[0],
            margin_bottom: margins[1],
        }
    }

    #[test]
    fn symmetric_padding_is_consistent() {
        let c = container("section", [10.0, 8.0, 10.0, 8.0], [0.0, 0.0]);
        assert!(has_consistent_padding(&c));
        let c = container("section", [10.0, 8.0, 20.0, 8.0], [0.0, 0.0]);
        assert!(!has_consistent_padding(&c));
        let c = container("section", [10.0, 8.0, 11.5, 9.9], [0.0, 0.0]);
        assert!(has_consistent_padding(&c));
        let c = container("section", [0.0, 2.0, 0.0, 0.0], [0.0, 0.0]);
        assert!(!has_consistent_padding(&c));
    }

    #[test]
    fn vertical_spacing_needs_a_margin() {
        assert!(has_vertical_spacing(&container("a", [0.0; 4], [4.0, 0.0])));
        assert!(has_vertical_spacing(&container("a", [0.0; 4], [0.0, 4.0])));
        assert!(!has_vertical_spacing(&container("a", [0.0; 4], [0.0, 0.0])));
    }

    #[test]
    fn scores_and_issues() {
        let containers = vec![
            container("header", [16.0, 24.0, 16.0, 24.0], [0.0, 32.0]),
            container("main", [16.0, 24.0, 16.0, 24.0], [0.0, 0.0]),
            container("div.card", [8.0, 24.0, 30.0, 24.0], [0.0, 0.0]),
            container("footer", [40.0, 0.0, 10.0, 0.0], [16.0, 0.0]),
        ];
        let report = analyze_spacing(&containers);
        assert_eq!(report.total, 4);
        assert_eq!(report.consistent_padding, 2);
        assert_eq!(report.vertical_spacing, 2);
        assert!((report.consistency_score - 2.5).abs() < 1e-9);
        assert!((report.spacing_score - 2.5).abs() < 1e-9);
        assert!((report.overall_score - 2.5).abs() < 1e-9);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].label, "div.card");
        assert_eq!(report.issues[0].padding, [8.0, 24.0, 30.0, 24.0]);
    }

    #[test]
    fn overall_averages_the_two_fractions() {
        let containers = vec![
            container("a", [0.0; 4], [1.0, 0.0]),
            container("b", [0.0; 4], [1.0, 0.0]),
            container("c", [0.0; 4], [0.0, 0.0]),
            container("d", [0.0; 4], [0.0, 0.0]),
        ];
        let report = analyze_spacing(&containers);
        assert_eq!(report.consistency_score, 5.0);
        assert_eq!(report.spacing_score, 2.5);
        assert_eq!(report.overall_score, 3.75);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn no_containers_scores_full() {
        let report = analyze_spacing(&[]);
        assert_eq!(report.overall_score, SCORE_SCALE_MAX);
        assert!(report.issues.is_empty());
    }
}

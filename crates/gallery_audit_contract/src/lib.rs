use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

pub const CONTRACT_ID: &str = "gallery_audit.scoring_contract";
pub const CONTRACT_VERSION: &str = "1";

const SCORING_REGISTRY_ID: &str = "gallery_audit.scoring_registry.v1";

/// Upper bound of every analyzer score and of the weighted overall score.
pub const SCORE_SCALE_MAX: f64 = 5.0;
/// Score every analyzer and the overall score must reach for a pass.
pub const SCORE_THRESHOLD: f64 = 4.5;
pub const CONTRAST_AA_RATIO: f64 = 4.5;
pub const CONTRAST_AAA_RATIO: f64 = 7.0;
pub const CONTRAST_WORST_OFFENDER_LIMIT: usize = 10;
pub const SPACING_SYMMETRY_TOLERANCE_PX: f64 = 2.0;
pub const PROFESSIONALISM_MIN_SEMANTIC_REGIONS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreCategoryDef {
    pub id: &'static str,
    pub name: &'static str,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfessionalismCheckDef {
    pub id: &'static str,
    pub question: &'static str,
}

pub const CATEGORY_CONTRAST: &str = "contrast";
pub const CATEGORY_SPACING: &str = "spacing";
pub const CATEGORY_TYPOGRAPHY: &str = "typography";
pub const CATEGORY_PROFESSIONALISM: &str = "professionalism";

pub const SCORE_CATEGORIES_V1: [ScoreCategoryDef; 4] = [
    ScoreCategoryDef {
        id: CATEGORY_CONTRAST,
        name: "Color Contrast",
        weight: 0.30,
    },
    ScoreCategoryDef {
        id: CATEGORY_SPACING,
        name: "Spacing & Layout",
        weight: 0.25,
    },
    ScoreCategoryDef {
        id: CATEGORY_TYPOGRAPHY,
        name: "Typography Hierarchy",
        weight: 0.20,
    },
    ScoreCategoryDef {
        id: CATEGORY_PROFESSIONALISM,
        name: "Professional Structure",
        weight: 0.25,
    },
];

pub const PROFESSIONALISM_CHECKS_V1: [ProfessionalismCheckDef; 10] = [
    ProfessionalismCheckDef { id: "pro.region.header", question: "Does the page have a header region?" },
    ProfessionalismCheckDef { id: "pro.region.footer", question: "Does the page have a footer region?" },
    ProfessionalismCheckDef { id: "pro.region.nav", question: "Does the page have a navigation region?" },
    ProfessionalismCheckDef { id: "pro.region.main", question: "Does the page have a main content region?" },
    ProfessionalismCheckDef { id: "pro.region.semantic_count", question: "Does the page use at least four semantic regions?" },
    ProfessionalismCheckDef { id: "pro.meta.description", question: "Is there a non-empty description meta tag?" },
    ProfessionalismCheckDef { id: "pro.meta.title", question: "Is there a non-empty title element?" },
    ProfessionalismCheckDef { id: "pro.meta.viewport", question: "Is there a responsive viewport meta tag?" },
    ProfessionalismCheckDef { id: "pro.meta.canonical", question: "Is there a canonical link?" },
    ProfessionalismCheckDef { id: "pro.meta.social_preview", question: "Are og:title and og:description social preview tags present?" },
];

// The typed tables above are the runtime authority; the embedded registry is the
// published form and is kept in lockstep by the tests below.
const SCORING_REGISTRY_V1_JSON: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/registry/scoring.v1.json"
));

#[derive(Debug, Clone)]
pub struct ScoringContractMetadata {
    pub contract_id: &'static str,
    pub contract_version: &'static str,
    pub contract_fingerprint_sha256: String,
    pub scoring_registry_id: &'static str,
    pub scoring_registry_hash_sha256: String,
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

static SCORING_REGISTRY_HASH: OnceLock<String> = OnceLock::new();
static CONTRACT_FINGERPRINT: OnceLock<String> = OnceLock::new();

pub fn scoring_registry_v1_json() -> &'static str {
    SCORING_REGISTRY_V1_JSON
}

pub fn scoring_registry_v1_hash_sha256() -> String {
    SCORING_REGISTRY_HASH
        .get_or_init(|| hex_sha256(SCORING_REGISTRY_V1_JSON.as_bytes()))
        .clone()
}

pub fn contract_fingerprint_sha256() -> String {
    CONTRACT_FINGERPRINT
        .get_or_init(|| {
            let registry_hash = scoring_registry_v1_hash_sha256();
            let mut material = String::new();
            for part in [
                CONTRACT_ID,
                CONTRACT_VERSION,
                SCORING_REGISTRY_ID,
                registry_hash.as_str(),
            ] {
                material.push_str(part);
                material.push('\n');
            }
            hex_sha256(material.as_bytes())
        })
        .clone()
}

pub fn registry_json(name: &str) -> Option<&'static str> {
    match name {
        SCORING_REGISTRY_ID => Some(SCORING_REGISTRY_V1_JSON),
        _ => None,
    }
}

pub fn score_category_defs_v1() -> &'static [ScoreCategoryDef] {
    &SCORE_CATEGORIES_V1
}

pub fn score_category_def(id: &str) -> Option<&'static ScoreCategoryDef> {
    SCORE_CATEGORIES_V1.iter().find(|c| c.id == id)
}

/// Weight of a category, zero for unknown ids.
pub fn category_weight(id: &str) -> f64 {
    score_category_def(id).map(|c| c.weight).unwrap_or(0.0)
}

pub fn professionalism_check_defs_v1() -> &'static [ProfessionalismCheckDef] {
    &PROFESSIONALISM_CHECKS_V1
}

pub fn professionalism_check_def(id: &str) -> Option<&'static ProfessionalismCheckDef> {
    PROFESSIONALISM_CHECKS_V1.iter().find(|d| d.id == id)
}

/// The embedded registry as a JSON value, `None` if it fails to parse.
pub fn scoring_registry_value() -> Option<Value> {
    serde_json::from_str(SCORING_REGISTRY_V1_JSON).ok()
}

pub fn metadata() -> ScoringContractMetadata {
    ScoringContractMetadata {
        contract_id: CONTRACT_ID,
        contract_version: CONTRACT_VERSION,
        contract_fingerprint_sha256: contract_fingerprint_sha256(),
        scoring_registry_id: SCORING_REGISTRY_ID,
        scoring_registry_hash_sha256: scoring_registry_v1_hash_sha256(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn parse_embedded_registry() -> Value {
        scoring_registry_value().expect("embedded scoring registry JSON should parse")
    }

    #[test]
    fn contract_fingerprint_is_stable_and_nonempty() {
        let a = contract_fingerprint_sha256();
        let b = contract_fingerprint_sha256();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, scoring_registry_v1_hash_sha256());
    }

    #[test]
    fn registry_lookup_returns_known_payloads() {
        assert!(
            registry_json(SCORING_REGISTRY_ID)
                .unwrap()
                .contains("\"schema\": \"gallery_audit.scoring_registry.v1\"")
        );
        assert!(registry_json("unknown").is_none());
    }

    #[test]
    fn category_weights_sum_to_one() {
        let sum: f64 = score_category_defs_v1().iter().map(|c| c.weight).sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert_eq!(category_weight(CATEGORY_CONTRAST), 0.30);
        assert_eq!(category_weight("unknown"), 0.0);
    }

    #[test]
    fn categories_match_embedded_registry() {
        let root = parse_embedded_registry();
        let categories = root
            .get("categories")
            .and_then(Value::as_array)
            .expect("categories array");
        assert_eq!(categories.len(), score_category_defs_v1().len());
        for (idx, cat) in categories.iter().enumerate() {
            let expected = &score_category_defs_v1()[idx];
            assert_eq!(cat.get("id").and_then(Value::as_str), Some(expected.id));
            assert_eq!(cat.get("name").and_then(Value::as_str), Some(expected.name));
            assert_eq!(cat.get("weight").and_then(Value::as_f64), Some(expected.weight));
        }
    }

    #[test]
    fn checks_and_thresholds_match_embedded_registry() {
        let root = parse_embedded_registry();
        assert_eq!(root.get("threshold").and_then(Value::as_f64), Some(SCORE_THRESHOLD));
        assert_eq!(root.get("scale_max").and_then(Value::as_f64), Some(SCORE_SCALE_MAX));
        let contrast = root.get("contrast").expect("contrast section");
        assert_eq!(
            contrast.get("aa_ratio").and_then(Value::as_f64),
            Some(CONTRAST_AA_RATIO)
        );
        assert_eq!(
            contrast.get("aaa_ratio").and_then(Value::as_f64),
            Some(CONTRAST_AAA_RATIO)
        );
        assert_eq!(
            contrast.get("worst_offender_limit").and_then(Value::as_u64),
            Some(CONTRAST_WORST_OFFENDER_LIMIT as u64)
        );
        assert_eq!(
            root.pointer("/spacing/symmetry_tolerance_px")
                .and_then(Value::as_f64),
            Some(SPACING_SYMMETRY_TOLERANCE_PX)
        );

        let checks = root
            .get("professionalism_checks")
            .and_then(Value::as_array)
            .expect("professionalism_checks array");
        assert_eq!(checks.len(), professionalism_check_defs_v1().len());
        for (idx, check) in checks.iter().enumerate() {
            let expected = &professionalism_check_defs_v1()[idx];
            assert_eq!(check.get("id").and_then(Value::as_str), Some(expected.id));
            assert_eq!(
                check.get("question").and_then(Value::as_str),
                Some(expected.question)
            );
        }
    }

    #[test]
    fn check_lookup_by_id() {
        assert!(professionalism_check_def("pro.meta.viewport").is_some());
        assert!(professionalism_check_def("pro.meta.favicon").is_none());
    }

    #[test]
    fn metadata_reports_hashes() {
        let meta = metadata();
        assert_eq!(meta.contract_id, CONTRACT_ID);
        assert_eq!(meta.scoring_registry_hash_sha256.len(), 64);
        assert_eq!(meta.contract_fingerprint_sha256, contract_fingerprint_sha256());
    }
}

//! Document and property-subtype classification.
//!
//! Two classifiers live here. [`classify`] maps an uploaded document to
//! a [`DocumentType`] so the conflict resolver can rank its extractions.
//! [`SubtypeClassifier`] scores property descriptions against subtype
//! definitions (age-restricted, student, affordable, and so on) so the
//! registry can overlay subtype-specific field behavior.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The kinds of source documents the pipeline understands.
///
/// Document type drives extraction priority: a rent roll outranks an
/// offering memorandum for rent figures, a T-12 outranks both for
/// operating expenses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Marketing package for a property sale.
    OfferingMemorandum,
    /// Unit-by-unit tenancy and rent listing.
    RentRoll,
    /// Trailing twelve months of operating statements.
    T12,
    /// Third-party valuation report.
    Appraisal,
    /// Comparable sales or rents report.
    CompReport,
    /// Site layout drawing.
    SitePlan,
    /// Sponsor's own underwriting model output.
    Proforma,
    /// Could not be determined.
    Unknown,
}

impl DocumentType {
    /// Stable lowercase name used in selectors and log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OfferingMemorandum => "offering_memorandum",
            Self::RentRoll => "rent_roll",
            Self::T12 => "t12",
            Self::Appraisal => "appraisal",
            Self::CompReport => "comp_report",
            Self::SitePlan => "site_plan",
            Self::Proforma => "proforma",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalizes a label for alias comparison: lowercase alphanumerics only.
fn normalize_label(label: &str) -> String {
    label
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Classifies from an explicit label (filename, upload tag, MIME-adjacent
/// hint). Returns `Unknown` when no alias matches.
#[must_use]
pub fn classify_label(label: &str) -> DocumentType {
    match normalize_label(label).as_str() {
        "om" | "offeringmemo" | "offeringmemorandum" | "oms" => DocumentType::OfferingMemorandum,
        "rentroll" | "rr" | "rentrolls" => DocumentType::RentRoll,
        "t12" | "t12statement" | "trailing12" | "trailingtwelve" | "ttm" => DocumentType::T12,
        "appraisal" | "appraisalreport" | "valuation" => DocumentType::Appraisal,
        "compreport" | "comps" | "salescomps" | "rentcomps" | "comparables" => {
            DocumentType::CompReport
        }
        "siteplan" | "siteplans" | "platmap" => DocumentType::SitePlan,
        "proforma" | "proformas" | "underwritingmodel" => DocumentType::Proforma,
        _ => DocumentType::Unknown,
    }
}

/// Keyword table for text classification. Each hit adds one point to the
/// document type's score.
const TEXT_KEYWORDS: &[(DocumentType, &[&str])] = &[
    (
        DocumentType::OfferingMemorandum,
        &[
            "offering memorandum",
            "investment highlights",
            "executive summary",
            "confidential offering",
            "broker",
        ],
    ),
    (
        DocumentType::RentRoll,
        &["rent roll", "unit number", "lease start", "lease end", "tenant name", "move-in"],
    ),
    (
        DocumentType::T12,
        &[
            "trailing twelve",
            "trailing 12",
            "t-12",
            "operating statement",
            "net operating income",
            "total operating expenses",
        ],
    ),
    (
        DocumentType::Appraisal,
        &[
            "appraisal",
            "appraised value",
            "uspap",
            "sales comparison approach",
            "income capitalization approach",
        ],
    ),
    (
        DocumentType::CompReport,
        &["comparable sales", "comparable rents", "comp set", "price per unit", "sale date"],
    ),
    (
        DocumentType::SitePlan,
        &["site plan", "parcel", "setback", "zoning", "lot line"],
    ),
    (
        DocumentType::Proforma,
        &["pro forma", "proforma", "stabilized noi", "exit cap", "levered irr", "hold period"],
    ),
];

/// Classifies from document text by keyword scoring. Ties break toward
/// the earlier entry in the keyword table; zero score yields `Unknown`.
#[must_use]
pub fn classify_text(text: &str) -> DocumentType {
    let haystack = text.to_lowercase();
    let mut best = (DocumentType::Unknown, 0usize);

    for (doc_type, keywords) in TEXT_KEYWORDS {
        let score = keywords.iter().filter(|kw| haystack.contains(*kw)).count();
        if score > best.1 {
            best = (*doc_type, score);
        }
    }

    debug!(doc_type = %best.0, score = best.1, "text classification");
    best.0
}

/// Full classification: the label wins when it resolves; text content is
/// the fallback.
#[must_use]
pub fn classify(label: &str, text: &str) -> DocumentType {
    match classify_label(label) {
        DocumentType::Unknown => classify_text(text),
        resolved => resolved,
    }
}

/// A property subtype with the evidence patterns that identify it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtypeDefinition {
    /// Stable code stored as the entity subtype, e.g. `age_restricted`.
    pub code: String,
    /// Human-readable name.
    pub name: String,
    /// Phrases whose presence in a description signals this subtype.
    pub patterns: Vec<String>,
    /// Field keys that become important when this subtype applies.
    pub priority_fields: Vec<String>,
    /// Extraction guidance passed downstream with matches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,
    /// Property types this subtype can apply to; empty means all.
    #[serde(default)]
    pub applies_to: Vec<String>,
}

/// A scored subtype classification result.
#[derive(Debug, Clone, Serialize)]
pub struct SubtypeMatch {
    /// The matched subtype code.
    pub code: String,
    /// Score in `[0, 1.2]`: match ratio plus a small volume bonus.
    pub score: f64,
    /// The patterns that actually matched, for explainability.
    pub matched_patterns: Vec<String>,
    /// Field keys to prioritize during extraction.
    pub priority_fields: Vec<String>,
    /// Extraction guidance from the definition.
    pub special_instructions: Option<String>,
}

/// Minimum score for a subtype to be reported at all.
const SUBTYPE_SCORE_FLOOR: f64 = 0.15;

/// Scores property descriptions against a set of subtype definitions.
pub struct SubtypeClassifier {
    definitions: Vec<SubtypeDefinition>,
}

impl SubtypeClassifier {
    /// A classifier over the given definitions.
    #[must_use]
    pub fn new(definitions: Vec<SubtypeDefinition>) -> Self {
        Self { definitions }
    }

    /// A classifier with the built-in multifamily subtype definitions.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(default_definitions())
    }

    /// Scores `description` against every definition applicable to
    /// `property_type`, best match first. Matches below the floor are
    /// dropped.
    #[must_use]
    pub fn classify(&self, description: &str, property_type: &str) -> Vec<SubtypeMatch> {
        let haystack = description.to_lowercase();
        let mut matches: Vec<SubtypeMatch> = self
            .definitions
            .iter()
            .filter(|def| {
                def.applies_to.is_empty()
                    || def.applies_to.iter().any(|t| t.eq_ignore_ascii_case(property_type))
            })
            .filter_map(|def| score_definition(def, &haystack))
            .filter(|m| m.score >= SUBTYPE_SCORE_FLOOR)
            .collect();

        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches
    }

    /// The best match, if any.
    #[must_use]
    pub fn best_match(&self, description: &str, property_type: &str) -> Option<SubtypeMatch> {
        self.classify(description, property_type).into_iter().next()
    }
}

impl Default for SubtypeClassifier {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn score_definition(def: &SubtypeDefinition, haystack: &str) -> Option<SubtypeMatch> {
    if def.patterns.is_empty() {
        return None;
    }

    let matched: Vec<String> = def
        .patterns
        .iter()
        .filter(|p| pattern_matches(p, haystack))
        .cloned()
        .collect();
    if matched.is_empty() {
        return None;
    }

    // Match ratio, plus a small bonus per hit so a definition with many
    // patterns is not penalized for breadth. Bonus caps at 0.2.
    let ratio = matched.len() as f64 / def.patterns.len() as f64;
    let bonus = (0.05 * matched.len() as f64).min(0.2);

    Some(SubtypeMatch {
        code: def.code.clone(),
        score: ratio + bonus,
        matched_patterns: matched,
        priority_fields: def.priority_fields.clone(),
        special_instructions: def.special_instructions.clone(),
    })
}

/// Short patterns like `55+` or `btr` need word-boundary anchoring to
/// avoid matching inside longer tokens. `\b` only works next to word
/// characters, so the boundary is applied per edge.
fn pattern_matches(pattern: &str, haystack: &str) -> bool {
    let needle = pattern.to_lowercase();
    if needle.len() > 4 {
        return haystack.contains(&needle);
    }

    let escaped = regex::escape(&needle);
    let leading = if needle.chars().next().is_some_and(|c| c.is_alphanumeric()) {
        r"\b"
    } else {
        ""
    };
    let trailing = if needle.chars().last().is_some_and(|c| c.is_alphanumeric()) {
        r"\b"
    } else {
        ""
    };
    match Regex::new(&format!("{leading}{escaped}{trailing}")) {
        Ok(re) => re.is_match(haystack),
        // regex::escape output is always valid; fall back to contains.
        Err(_) => haystack.contains(&needle),
    }
}

/// Built-in subtype definitions for multifamily underwriting.
#[must_use]
pub fn default_definitions() -> Vec<SubtypeDefinition> {
    vec![
        SubtypeDefinition {
            code: "age_restricted".to_string(),
            name: "Age-Restricted (55+)".to_string(),
            patterns: vec![
                "55+".to_string(),
                "62+".to_string(),
                "age-restricted".to_string(),
                "age restricted".to_string(),
                "active adult".to_string(),
            ],
            priority_fields: vec![
                "age_restriction_minimum".to_string(),
                "percent_age_qualified".to_string(),
            ],
            special_instructions: Some(
                "Verify HOPA compliance status and the age-qualification percentage".to_string(),
            ),
            applies_to: vec!["multifamily".to_string(), "build_to_rent".to_string()],
        },
        SubtypeDefinition {
            code: "student".to_string(),
            name: "Student Housing".to_string(),
            patterns: vec![
                "student housing".to_string(),
                "by the bed".to_string(),
                "per bed".to_string(),
                "university".to_string(),
                "academic year".to_string(),
                "preleasing".to_string(),
            ],
            priority_fields: vec![
                "beds_per_unit".to_string(),
                "distance_to_campus".to_string(),
                "preleased_percent".to_string(),
            ],
            special_instructions: Some(
                "Rents may be quoted per bed rather than per unit".to_string(),
            ),
            applies_to: vec!["multifamily".to_string()],
        },
        SubtypeDefinition {
            code: "affordable".to_string(),
            name: "Affordable / LIHTC".to_string(),
            patterns: vec![
                "lihtc".to_string(),
                "section 8".to_string(),
                "affordable housing".to_string(),
                "income restricted".to_string(),
                "income-restricted".to_string(),
                "tax credit".to_string(),
                "ami".to_string(),
            ],
            priority_fields: vec![
                "ami_restriction_percent".to_string(),
                "compliance_period_end".to_string(),
                "restricted_unit_count".to_string(),
            ],
            special_instructions: Some(
                "Capture AMI bands and the remaining compliance period".to_string(),
            ),
            applies_to: vec![],
        },
        SubtypeDefinition {
            code: "senior_living".to_string(),
            name: "Senior Living".to_string(),
            patterns: vec![
                "assisted living".to_string(),
                "independent living".to_string(),
                "memory care".to_string(),
                "senior living".to_string(),
                "continuing care".to_string(),
            ],
            priority_fields: vec!["care_revenue_percent".to_string(), "licensed_beds".to_string()],
            special_instructions: None,
            applies_to: vec!["multifamily".to_string()],
        },
        SubtypeDefinition {
            code: "build_to_rent".to_string(),
            name: "Build-to-Rent".to_string(),
            patterns: vec![
                "btr".to_string(),
                "build-to-rent".to_string(),
                "build to rent".to_string(),
                "single-family rental".to_string(),
                "horizontal apartment".to_string(),
            ],
            priority_fields: vec!["lot_count".to_string(), "product_mix".to_string()],
            special_instructions: None,
            applies_to: vec![],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_aliases_resolve() {
        assert_eq!(classify_label("Rent Roll"), DocumentType::RentRoll);
        assert_eq!(classify_label("rent_roll"), DocumentType::RentRoll);
        assert_eq!(classify_label("OM"), DocumentType::OfferingMemorandum);
        assert_eq!(classify_label("T-12"), DocumentType::T12);
        assert_eq!(classify_label("trailing 12"), DocumentType::T12);
        assert_eq!(classify_label("Sales Comps"), DocumentType::CompReport);
        assert_eq!(classify_label("quarterly report"), DocumentType::Unknown);
    }

    #[test]
    fn text_classification_scores_keywords() {
        let text = "RENT ROLL as of June 2026. Unit Number | Tenant Name | Lease Start";
        assert_eq!(classify_text(text), DocumentType::RentRoll);

        let text = "Trailing Twelve operating statement. Net Operating Income: $1.2M";
        assert_eq!(classify_text(text), DocumentType::T12);

        assert_eq!(classify_text("no signal here"), DocumentType::Unknown);
    }

    #[test]
    fn label_beats_text() {
        let text = "offering memorandum investment highlights";
        assert_eq!(classify("rentroll", text), DocumentType::RentRoll);
        assert_eq!(classify("misc upload", text), DocumentType::OfferingMemorandum);
    }

    #[test]
    fn document_type_as_str_round_trip() {
        assert_eq!(DocumentType::RentRoll.to_string(), "rent_roll");
        let json = serde_json::to_string(&DocumentType::OfferingMemorandum).unwrap();
        assert_eq!(json, "\"offering_memorandum\"");
    }

    #[test]
    fn subtype_age_restricted_55_plus() {
        let classifier = SubtypeClassifier::with_defaults();
        let matches = classifier.classify(
            "A 180-unit 55+ active adult community in Phoenix",
            "multifamily",
        );
        assert_eq!(matches[0].code, "age_restricted");
        assert!(matches[0].matched_patterns.contains(&"55+".to_string()));
    }

    #[test]
    fn subtype_short_pattern_does_not_match_inside_words() {
        let classifier = SubtypeClassifier::with_defaults();
        // "ami" must not match inside "dynamic" or "family".
        let matches = classifier.classify("a dynamic single-family community", "multifamily");
        assert!(matches.iter().all(|m| m.code != "affordable"));

        let matches = classifier.classify("restricted to 60% AMI households", "multifamily");
        assert!(matches.iter().any(|m| m.code == "affordable"));
    }

    #[test]
    fn subtype_applies_to_filters_property_type() {
        let classifier = SubtypeClassifier::with_defaults();
        let matches = classifier.classify("student housing near the university", "retail");
        assert!(matches.iter().all(|m| m.code != "student"));
    }

    #[test]
    fn subtype_more_hits_score_higher() {
        let classifier = SubtypeClassifier::with_defaults();
        let weak = classifier
            .best_match("university adjacent site", "multifamily")
            .unwrap();
        let strong = classifier
            .best_match(
                "student housing leased by the bed for the academic year, 98% preleasing",
                "multifamily",
            )
            .unwrap();
        assert_eq!(weak.code, "student");
        assert_eq!(strong.code, "student");
        assert!(strong.score > weak.score);
    }

    #[test]
    fn subtype_no_match_below_floor() {
        let classifier = SubtypeClassifier::with_defaults();
        assert!(classifier
            .best_match("a garden-style apartment community", "multifamily")
            .is_none());
    }
}

//! Conflict resolution across extractions of the same field.
//!
//! When several documents yield values for one field, exactly one value
//! must win, and the decision must be deterministic and explainable.
//! Priority comes from the registry's per-scope document ranking;
//! confidence breaks ties; the losing values are kept as data with
//! their deviation from the winner so a reviewer can see how far apart
//! the sources were.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::DocumentType;
use crate::error::ValidationError;
use crate::numeric;
use crate::registry::{document_priority, FieldRegistry, Scope};

/// One extracted value competing for a field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionCandidate {
    /// Monotonically increasing extraction id; higher means newer.
    pub extraction_id: u64,
    /// The source document.
    pub doc_id: String,
    /// Classified type of the source document.
    pub doc_type: DocumentType,
    /// The field this value was extracted for.
    pub field_key: String,
    /// The raw extracted value, as text.
    pub value: String,
    /// Extractor confidence in `[0, 1]`.
    pub confidence: f64,
    /// The text the value was pulled from, for review.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_snippet: Option<String>,
    /// Page the snippet came from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
}

/// A losing candidate with its deviation from the winning value.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedValue {
    /// The losing candidate.
    pub candidate: ExtractionCandidate,
    /// Percent deviation of the winner relative to this value, when
    /// both are numeric.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difference_percent: Option<f64>,
}

/// Why the resolution came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionReason {
    /// Only one candidate existed.
    NoConflict,
    /// All candidates agreed after normalization.
    ValuesMatch,
    /// Candidates disagreed; document priority and confidence decided.
    PriorityOrder,
}

/// The outcome of resolving one field's candidates.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    /// The winning candidate.
    pub winner: ExtractionCandidate,
    /// The losers, in their ranked order.
    pub rejected: Vec<RejectedValue>,
    /// How the winner was decided.
    pub reason: ResolutionReason,
    /// Set when a rejected numeric value deviates enough from the
    /// winner, or carried more confidence than the winner, so a human
    /// should look.
    pub flagged: bool,
    /// Reviewer-facing explanation when flagged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag_message: Option<String>,
}

/// Deviation above which a resolution is flagged for review, percent.
pub const FLAG_THRESHOLD_PERCENT: f64 = 5.0;

/// Deterministic resolver over the registry's priority tables.
pub struct ConflictResolver<'a> {
    registry: &'a FieldRegistry,
    property_type: String,
}

impl<'a> ConflictResolver<'a> {
    /// A resolver for one property type's catalog.
    #[must_use]
    pub fn new(registry: &'a FieldRegistry, property_type: impl Into<String>) -> Self {
        Self {
            registry,
            property_type: property_type.into(),
        }
    }

    /// Resolves candidates for one field to a single winner.
    ///
    /// Candidates that normalize to the same value collapse to the
    /// highest-confidence one. Otherwise candidates are ranked by
    /// document priority for the field's scope, then confidence, then
    /// recency; every loser carries its numeric deviation from the
    /// winner. The resolution is flagged for review when a numeric
    /// loser deviates by more than [`FLAG_THRESHOLD_PERCENT`], or when
    /// document priority kept a value over a numeric loser the
    /// extractor was more confident about.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NoCandidates` for an empty slice.
    pub fn resolve(
        &self,
        candidates: &[ExtractionCandidate],
    ) -> Result<Resolution, ValidationError> {
        let Some(first) = candidates.first() else {
            return Err(ValidationError::NoCandidates);
        };

        if candidates.len() == 1 {
            return Ok(Resolution {
                winner: first.clone(),
                rejected: Vec::new(),
                reason: ResolutionReason::NoConflict,
                flagged: false,
                flag_message: None,
            });
        }

        if candidates
            .iter()
            .skip(1)
            .all(|c| values_match(&first.value, &c.value))
        {
            // Agreement: keep the candidate we trust most.
            let winner = candidates
                .iter()
                .max_by(|a, b| {
                    a.confidence
                        .partial_cmp(&b.confidence)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .unwrap_or(first)
                .clone();
            return Ok(Resolution {
                winner,
                rejected: Vec::new(),
                reason: ResolutionReason::ValuesMatch,
                flagged: false,
                flag_message: None,
            });
        }

        let scope = self.field_scope(&first.field_key);
        let mut ranked: Vec<&ExtractionCandidate> = candidates.iter().collect();
        ranked.sort_by(|a, b| {
            document_priority(a.doc_type, scope)
                .cmp(&document_priority(b.doc_type, scope))
                .then_with(|| {
                    b.confidence
                        .partial_cmp(&a.confidence)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| b.extraction_id.cmp(&a.extraction_id))
        });

        let winner = ranked[0].clone();
        let winner_decimal = numeric::parse_decimal(&winner.value);

        let mut flagged = false;
        let mut worst: Option<(f64, &ExtractionCandidate)> = None;
        let rejected: Vec<RejectedValue> = ranked[1..]
            .iter()
            .map(|c| {
                let difference = deviation(winner_decimal, &c.value);
                if let Some(pct) = difference {
                    // Flag wide numeric gaps, and flag whenever document
                    // priority overrode a more confident numeric value.
                    if pct > FLAG_THRESHOLD_PERCENT || c.confidence > winner.confidence {
                        flagged = true;
                        if worst.map_or(true, |(w, _)| pct > w) {
                            worst = Some((pct, *c));
                        }
                    }
                }
                RejectedValue {
                    candidate: (*c).clone(),
                    difference_percent: difference,
                }
            })
            .collect();

        let flag_message = worst.map(|(pct, loser)| {
            format!(
                "{} value '{}' kept over {} value '{}' ({pct:.1}% apart); review recommended",
                winner.doc_type, winner.value, loser.doc_type, loser.value
            )
        });

        debug!(
            field_key = %winner.field_key,
            winner_doc = %winner.doc_type,
            rejected = rejected.len(),
            flagged,
            "conflict resolved"
        );

        Ok(Resolution {
            winner,
            rejected,
            reason: ResolutionReason::PriorityOrder,
            flagged,
            flag_message,
        })
    }

    fn field_scope(&self, field_key: &str) -> Scope {
        self.registry
            .get_mapping(&self.property_type, field_key)
            .map_or(Scope::Project, |m| m.scope)
    }
}

/// Two values match when they are numerically equal to two decimal
/// places, or textually equal ignoring case and surrounding whitespace.
/// `"1,500"` and `"$1500.00"` match; `"Austin"` and `"austin "` match.
#[must_use]
pub fn values_match(a: &str, b: &str) -> bool {
    match (numeric::parse_decimal(a), numeric::parse_decimal(b)) {
        (Some(da), Some(db)) => numeric::eq_2dp(da, db),
        _ => a.trim().eq_ignore_ascii_case(b.trim()),
    }
}

/// Winner deviation relative to the losing value, when both parse.
fn deviation(winner: Option<Decimal>, loser_raw: &str) -> Option<f64> {
    let winner = winner?;
    let loser = numeric::parse_decimal(loser_raw)?;
    numeric::difference_percent(winner, loser)
}

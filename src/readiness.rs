//! Model readiness: can the underwriting model run yet, and how much
//! should its output be trusted?
//!
//! The score is a weighted coverage ratio over the registry's resolved
//! input fields. Critical fields gate the model outright; descriptive
//! fields never move the score.

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::registry::{AnalyticalTier, ExtractPolicy, FieldRegistry, FieldRole};

/// Confidence bucket for a readiness score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    Insufficient,
}

impl ConfidenceLevel {
    fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Self::High
        } else if score >= 70.0 {
            Self::Medium
        } else if score >= 50.0 {
            Self::Low
        } else {
            Self::Insufficient
        }
    }
}

/// The readiness verdict for one project.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    /// Weighted coverage in `[0, 100]`.
    pub score: f64,
    /// Bucketed interpretation of the score.
    pub confidence_level: ConfidenceLevel,
    /// Whether the model may run: true iff no critical field is missing.
    pub can_run_model: bool,
    /// Unpopulated critical fields, each one a blocker.
    pub missing_critical: Vec<String>,
    /// Unpopulated important fields, quality warnings only.
    pub missing_important: Vec<String>,
    /// Fields counted toward the denominator.
    pub total_fields: usize,
    /// Fields found populated.
    pub populated_fields: usize,
}

/// Scores field coverage against the registry's catalog.
pub struct ModelReadinessCalculator<'a> {
    registry: &'a FieldRegistry,
    property_type: String,
}

impl<'a> ModelReadinessCalculator<'a> {
    /// A calculator for one property type's catalog.
    #[must_use]
    pub fn new(registry: &'a FieldRegistry, property_type: impl Into<String>) -> Self {
        Self {
            registry,
            property_type: property_type.into(),
        }
    }

    /// Scores the given set of populated field keys.
    ///
    /// The denominator is every resolved, extractable-or-not, input-role
    /// field in the catalog weighted by tier; user-only fields count
    /// because the model needs them regardless of how they arrive.
    /// Output-role fields and descriptive-tier fields never affect the
    /// score. A catalog with no weighted fields scores zero.
    #[must_use]
    pub fn assess(&self, populated: &HashSet<String>) -> ReadinessReport {
        let mut total_weight = 0u32;
        let mut populated_weight = 0u32;
        let mut total_fields = 0usize;
        let mut populated_fields = 0usize;
        let mut missing_critical = Vec::new();
        let mut missing_important = Vec::new();

        for field in self.registry.mappings(&self.property_type) {
            if field.field_role != FieldRole::Input || !field.is_resolved() {
                continue;
            }

            total_fields += 1;
            let weight = field.analytical_tier.weight();
            total_weight += weight;

            if populated.contains(&field.field_key) {
                populated_fields += 1;
                populated_weight += weight;
                continue;
            }

            match field.analytical_tier {
                AnalyticalTier::Critical => missing_critical.push(field.field_key.clone()),
                AnalyticalTier::Important => missing_important.push(field.field_key.clone()),
                _ => {}
            }
        }

        let score = if total_weight == 0 {
            0.0
        } else {
            f64::from(populated_weight) / f64::from(total_weight) * 100.0
        };

        let report = ReadinessReport {
            score,
            confidence_level: ConfidenceLevel::from_score(score),
            can_run_model: missing_critical.is_empty(),
            missing_critical,
            missing_important,
            total_fields,
            populated_fields,
        };
        debug!(
            property_type = %self.property_type,
            score = report.score,
            can_run = report.can_run_model,
            "readiness assessed"
        );
        report
    }

    /// Extractable fields not yet populated, the work list for the next
    /// document upload. Sorted by tier weight so critical gaps lead.
    #[must_use]
    pub fn remaining_extractable(&self, populated: &HashSet<String>) -> Vec<String> {
        let mut remaining: Vec<(&str, u32)> = self
            .registry
            .mappings(&self.property_type)
            .iter()
            .filter(|f| f.field_role == FieldRole::Input && f.is_resolved())
            .filter(|f| f.extract_policy == ExtractPolicy::Extractable)
            .filter(|f| !populated.contains(&f.field_key))
            .map(|f| (f.field_key.as_str(), f.analytical_tier.weight()))
            .collect();
        remaining.sort_by(|a, b| b.1.cmp(&a.1));
        remaining.into_iter().map(|(k, _)| k.to_string()).collect()
    }
}

//! The extraction writer: resolved values into the production schema.
//!
//! Registry-driven and fail-closed: a field key the registry cannot
//! resolve is never written anywhere. Values are coerced to the field's
//! declared type (with a logged degrade-to-text fallback for malformed
//! numerics), routed by write type to the right table and selector, and
//! mirrored into the knowledge graph as audit facts when the field is
//! analytically significant.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::confidence::Confidence;
use crate::entity::{canonical, EntityType};
use crate::error::{Error, Result, ValidationError};
use crate::graph::{EntitySpec, KnowledgeGraph};
use crate::numeric;
use crate::registry::{DbWriteType, FieldMapping, FieldRegistry, FieldType, Scope};
use crate::source::Provenance;
use crate::storage::ProductionStore;
use crate::value::{Row, Value};

/// Where an extracted value should land.
#[derive(Debug, Clone)]
pub struct WriteContext {
    /// Property type selecting the registry catalog.
    pub property_type: String,
    /// The project every write is keyed under.
    pub project_id: i64,
    /// Row id for scoped writes (a unit type id, a phase id). Required
    /// for column writes outside project scope.
    pub scope_id: Option<i64>,
    /// The document the value came from, recorded in audit provenance.
    pub source_doc_id: String,
}

/// The per-field result of a write.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    /// The catalog key that was written (or refused).
    pub field_key: String,
    /// Whether the production write happened.
    pub success: bool,
    /// What happened, for batch reports.
    pub message: String,
}

impl WriteOutcome {
    fn ok(field_key: &str, message: impl Into<String>) -> Self {
        Self {
            field_key: field_key.to_string(),
            success: true,
            message: message.into(),
        }
    }

    fn refused(field_key: &str, message: impl Into<String>) -> Self {
        Self {
            field_key: field_key.to_string(),
            success: false,
            message: message.into(),
        }
    }
}

/// Assumption keys worth mirroring into the knowledge graph. A field
/// key containing any of these becomes an audit fact alongside the
/// production write.
const AUDIT_KEYWORDS: &[&str] = &[
    "rate",
    "rent",
    "price",
    "vacancy",
    "noi",
    "expense",
    "income",
    "growth",
    "cap_rate",
    "ltv",
    "dscr",
    "yield",
    "margin",
    "absorption",
    "discount",
    "pct",
];

fn is_audit_field(field_key: &str) -> bool {
    let key = field_key.to_lowercase();
    AUDIT_KEYWORDS.iter().any(|kw| key.contains(kw))
}

/// Writes resolved extraction values through the registry.
pub struct ExtractionWriter<'a> {
    registry: &'a FieldRegistry,
    production: Arc<dyn ProductionStore>,
    graph: Arc<KnowledgeGraph>,
}

impl<'a> ExtractionWriter<'a> {
    /// A writer over the given production backend and graph.
    pub fn new(
        registry: &'a FieldRegistry,
        production: Arc<dyn ProductionStore>,
        graph: Arc<KnowledgeGraph>,
    ) -> Self {
        Self {
            registry,
            production,
            graph,
        }
    }

    /// Writes one resolved value.
    ///
    /// Unknown field keys are refused (fail closed), as are user-only
    /// fields and unresolved targets. The production write and the audit
    /// fact are separate concerns: an audit failure is logged but never
    /// fails an outcome whose production write succeeded.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the production backend. Registry
    /// refusals are reported in the outcome, not as errors.
    pub fn write(
        &self,
        field_key: &str,
        raw_value: &serde_json::Value,
        ctx: &WriteContext,
    ) -> Result<WriteOutcome> {
        let Some(resolved_key) =
            self.registry
                .resolve_field_key(&ctx.property_type, field_key, None, None)
        else {
            warn!(field_key, "unknown field key; refusing to write");
            return Ok(WriteOutcome::refused(
                field_key,
                "field key not present in registry",
            ));
        };
        let resolved_key = resolved_key.to_string();

        let Some(mapping) = self.registry.get_mapping(&ctx.property_type, &resolved_key) else {
            return Ok(WriteOutcome::refused(&resolved_key, "mapping not found"));
        };
        if !mapping.is_extractable() {
            return Ok(WriteOutcome::refused(
                &resolved_key,
                "field is user-entry only",
            ));
        }
        if !mapping.is_resolved() {
            return Ok(WriteOutcome::refused(
                &resolved_key,
                "field has no production target",
            ));
        }

        let value = Value::from_json(raw_value);
        if value.is_null() {
            return Ok(WriteOutcome::refused(&resolved_key, "null value"));
        }

        let coerced = coerce(&value, mapping.field_type, &resolved_key);

        let dispatched = match &mapping.db_write_type {
            DbWriteType::Column => self.write_column(mapping, &coerced, ctx),
            DbWriteType::RowAssumption
            | DbWriteType::RowOpex
            | DbWriteType::RowAllocation
            | DbWriteType::RowBudget
            | DbWriteType::RowMilestone => self.write_row(mapping, &coerced, ctx),
            DbWriteType::Upsert => self.write_upsert(mapping, &coerced, ctx),
            DbWriteType::Dynamic => self.write_dynamic(mapping, &coerced, ctx),
        };
        match dispatched {
            Ok(()) => {}
            // Shape problems fail closed as outcomes; backend failures
            // propagate.
            Err(Error::Validation(v)) => {
                return Ok(WriteOutcome::refused(&resolved_key, v.to_string()))
            }
            Err(e) => return Err(e),
        }

        self.record_audit_fact(mapping, &coerced, ctx);

        Ok(WriteOutcome::ok(
            &resolved_key,
            format!("written as {}", coerced.type_name()),
        ))
    }

    /// Writes a batch, isolating failures per item: one bad value never
    /// stops the rest of the batch.
    pub fn write_batch(
        &self,
        items: &[(String, serde_json::Value)],
        ctx: &WriteContext,
    ) -> Vec<WriteOutcome> {
        items
            .iter()
            .map(|(field_key, value)| {
                self.write(field_key, value, ctx).unwrap_or_else(|e| {
                    warn!(field_key, error = %e, "write failed");
                    WriteOutcome::refused(field_key, e.to_string())
                })
            })
            .collect()
    }

    fn write_column(
        &self,
        mapping: &FieldMapping,
        value: &Value,
        ctx: &WriteContext,
    ) -> Result<()> {
        // is_resolved was checked; Column targets always carry both.
        let table = mapping.target_table.as_deref().ok_or_else(|| {
            Error::Validation(ValidationError::MissingField {
                field: "target_table".to_string(),
            })
        })?;
        let column = mapping.target_column.as_deref().ok_or_else(|| {
            Error::Validation(ValidationError::MissingField {
                field: "target_column".to_string(),
            })
        })?;

        let mut selector = Row::new();
        if mapping.scope == Scope::Project {
            selector.insert("project_id".to_string(), json!(ctx.project_id));
        } else {
            let Some(scope_id) = ctx.scope_id else {
                return Err(ValidationError::MissingField {
                    field: format!("scope_id for {} scope", mapping.scope),
                }
                .into());
            };
            selector.insert("project_id".to_string(), json!(ctx.project_id));
            selector.insert("id".to_string(), json!(scope_id));
        }

        let mut values = Row::new();
        values.insert(column.to_string(), value_to_json(value));
        self.production.upsert(table, &selector, &values)?;
        debug!(table, column, "column write");
        Ok(())
    }

    fn write_row(&self, mapping: &FieldMapping, value: &Value, ctx: &WriteContext) -> Result<()> {
        let table = mapping
            .target_table
            .as_deref()
            .unwrap_or(default_row_table(&mapping.db_write_type));
        let column = mapping.target_column.as_deref().unwrap_or("value");

        // Selector: the catalog's selector_json merged with the project
        // key; a catalog without one falls back to selecting by label.
        let mut selector = Row::new();
        selector.insert("project_id".to_string(), json!(ctx.project_id));
        match &mapping.selector_json {
            Some(serde_json::Value::Object(extra)) => {
                for (k, v) in extra {
                    selector.insert(k.clone(), v.clone());
                }
            }
            _ => {
                selector.insert("label".to_string(), json!(mapping.field_key));
            }
        }

        let mut values = Row::new();
        values.insert(column.to_string(), value_to_json(value));
        self.production.upsert(table, &selector, &values)?;
        debug!(table, column, "row write");
        Ok(())
    }

    /// Upserts row-shaped values by their natural key. A `Row` is one
    /// upsert; a `RowList` is one per element. Scalar values are
    /// refused, as is any row without a natural key: a key-less row
    /// would collapse into whatever row the project selector already
    /// matches.
    fn write_upsert(
        &self,
        mapping: &FieldMapping,
        value: &Value,
        ctx: &WriteContext,
    ) -> Result<()> {
        let table = mapping.target_table.as_deref().ok_or_else(|| {
            Error::Validation(ValidationError::MissingField {
                field: "target_table".to_string(),
            })
        })?;

        let rows: Vec<&Row> = match value {
            Value::Row(row) => vec![row],
            Value::RowList(rows) => rows.iter().collect(),
            other => {
                warn!(
                    field_key = %mapping.field_key,
                    got = other.type_name(),
                    "upsert field requires row-shaped value"
                );
                return Err(ValidationError::MissingField {
                    field: format!("row value for upsert field {}", mapping.field_key),
                }
                .into());
            }
        };

        // Keys are checked before any write so a bad row refuses the
        // whole batch instead of leaving part of it behind.
        for row in &rows {
            if natural_key(row).is_none() {
                warn!(field_key = %mapping.field_key, "upsert row carries no natural key");
                return Err(ValidationError::MissingField {
                    field: format!("natural key in upsert row for {}", mapping.field_key),
                }
                .into());
            }
        }

        for row in rows {
            let mut selector = Row::new();
            selector.insert("project_id".to_string(), json!(ctx.project_id));
            if let Some((key, key_value)) = natural_key(row) {
                selector.insert(key.to_string(), key_value.clone());
            }
            self.production.upsert(table, &selector, row)?;
        }
        debug!(table, "upsert write");
        Ok(())
    }

    fn write_dynamic(
        &self,
        mapping: &FieldMapping,
        value: &Value,
        ctx: &WriteContext,
    ) -> Result<()> {
        let mut selector = Row::new();
        selector.insert("project_id".to_string(), json!(ctx.project_id));
        selector.insert("field_key".to_string(), json!(mapping.field_key));

        let mut values = Row::new();
        values.insert("value".to_string(), value_to_json(value));
        values.insert("value_type".to_string(), json!(value.type_name()));
        self.production.upsert("dynamic_values", &selector, &values)?;
        debug!(field_key = %mapping.field_key, "dynamic write");
        Ok(())
    }

    /// Mirrors analytically significant scalar writes into the graph so
    /// supersession history exists for them. Best effort by design.
    fn record_audit_fact(&self, mapping: &FieldMapping, value: &Value, ctx: &WriteContext) {
        if !value.is_scalar() || !is_audit_field(&mapping.field_key) {
            return;
        }

        let spec = EntitySpec::new(EntityType::Project, canonical::project(ctx.project_id));
        let subject = match self.graph.get_or_create_entity(spec) {
            Ok(entity) => entity.id,
            Err(e) => {
                warn!(error = %e, "audit fact skipped: entity resolution failed");
                return;
            }
        };

        if let Err(e) = self.graph.create_assumption_fact(
            subject,
            &mapping.field_key,
            &value.to_literal(),
            Provenance::document(ctx.source_doc_id.clone()),
            Confidence::EXTRACTED,
            crate::validity::ValidityWindow::unbounded(),
        ) {
            warn!(field_key = %mapping.field_key, error = %e, "audit fact failed");
        }
    }
}

fn default_row_table(write_type: &DbWriteType) -> &'static str {
    match write_type {
        DbWriteType::RowOpex => "operating_expenses",
        DbWriteType::RowAllocation => "allocations",
        DbWriteType::RowBudget => "budget_lines",
        DbWriteType::RowMilestone => "milestones",
        _ => "assumptions",
    }
}

/// The natural key for upsert rows, first match wins.
fn natural_key(row: &Row) -> Option<(&'static str, &serde_json::Value)> {
    for key in ["unit_number", "unit_type_name", "name"] {
        if let Some(v) = row.get(key) {
            return Some((key, v));
        }
    }
    None
}

/// Coerces a classified value toward the field's declared type.
///
/// Numeric targets parse through the usual normalization (currency
/// symbols, thousands separators); percent values above 1 are taken as
/// percentage points and scaled to a fraction. A value that refuses to
/// parse degrades to its text form with a warning instead of being
/// dropped: a malformed number in review beats a silently missing one.
fn coerce(value: &Value, field_type: FieldType, field_key: &str) -> Value {
    match field_type {
        FieldType::Text | FieldType::Json => value.clone(),
        FieldType::Integer => match scalar_decimal(value) {
            Some(d) => numeric::to_integer(d).map_or_else(|| degrade(value, field_key), Value::Int),
            None => degrade(value, field_key),
        },
        FieldType::Decimal | FieldType::Currency => match scalar_decimal(value) {
            Some(d) => Value::Number(d),
            None => degrade(value, field_key),
        },
        FieldType::Percent => match scalar_decimal(value) {
            Some(d) => Value::Number(numeric::normalize_percent(d)),
            None => degrade(value, field_key),
        },
        FieldType::Boolean => match value {
            Value::Bool(_) => value.clone(),
            Value::Text(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => Value::Bool(true),
                "false" | "no" | "n" | "0" => Value::Bool(false),
                _ => degrade(value, field_key),
            },
            Value::Int(n) => Value::Bool(*n != 0),
            _ => degrade(value, field_key),
        },
        FieldType::Date => match value {
            Value::Text(s) => parse_date(s).map_or_else(
                || degrade(value, field_key),
                |d| Value::Text(d.format("%Y-%m-%d").to_string()),
            ),
            _ => degrade(value, field_key),
        },
    }
}

fn scalar_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Int(n) => Some(Decimal::from(*n)),
        Value::Number(d) => Some(*d),
        Value::Text(s) => numeric::parse_decimal(s),
        _ => None,
    }
}

fn degrade(value: &Value, field_key: &str) -> Value {
    warn!(
        field_key,
        got = value.type_name(),
        "value did not coerce to the declared type; storing as text"
    );
    Value::Text(value.to_literal())
}

/// Accepted date layouts, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y", "%B %d, %Y", "%b %d, %Y"];

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Bool(b) => json!(b),
        Value::Int(n) => json!(n),
        // Decimals serialize as canonical strings to keep exactness.
        Value::Number(d) => json!(d.to_string()),
        Value::Text(s) => json!(s),
        Value::Row(row) => serde_json::Value::Object(row.clone()),
        Value::RowList(rows) => serde_json::Value::Array(
            rows.iter()
                .map(|r| serde_json::Value::Object(r.clone()))
                .collect(),
        ),
        Value::Null => serde_json::Value::Null,
    }
}

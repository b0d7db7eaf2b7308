//! The field registry: the catalog of every extractable field.
//!
//! The registry is loaded from catalog files (one per property type)
//! and answers three questions for the rest of the pipeline: what
//! fields exist and where each one lands in the production schema,
//! which source document wins when extractions conflict, and how much
//! each field matters to the underwriting model. Unknown enum values in
//! a catalog fail loudly; a malformed row is logged and skipped rather
//! than poisoning the whole catalog.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::classifier::DocumentType;
use crate::error::RegistryError;

/// The logical data type of a field's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum FieldType {
    Text,
    Integer,
    Decimal,
    Currency,
    Percent,
    Boolean,
    Date,
    Json,
}

impl FromStr for FieldType {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "string" => Ok(Self::Text),
            "integer" | "int" => Ok(Self::Integer),
            "decimal" | "number" | "numeric" | "float" => Ok(Self::Decimal),
            "currency" | "money" => Ok(Self::Currency),
            "percent" | "percentage" => Ok(Self::Percent),
            "boolean" | "bool" => Ok(Self::Boolean),
            "date" => Ok(Self::Date),
            "json" | "jsonb" => Ok(Self::Json),
            other => Err(RegistryError::UnknownValue {
                column: "field_type".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// The production-schema scope a field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum Scope {
    Project,
    Unit,
    UnitType,
    Phase,
    Parcel,
    LotOrProduct,
    Assumption,
    Opex,
    Income,
    SalesComp,
    RentComp,
    Acquisition,
    Market,
    MfProperty,
}

impl Scope {
    /// Whether rows at this scope require an explicit scope row id.
    #[must_use]
    pub const fn requires_scope_id(self) -> bool {
        !matches!(self, Self::Project | Self::Assumption | Self::Market | Self::Acquisition)
    }
}

impl FromStr for Scope {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "project" => Ok(Self::Project),
            "unit" => Ok(Self::Unit),
            "unit_type" | "unittype" => Ok(Self::UnitType),
            "phase" => Ok(Self::Phase),
            "parcel" => Ok(Self::Parcel),
            "lot_or_product" | "lot" | "product" => Ok(Self::LotOrProduct),
            "assumption" => Ok(Self::Assumption),
            "opex" => Ok(Self::Opex),
            "income" => Ok(Self::Income),
            "sales_comp" => Ok(Self::SalesComp),
            "rent_comp" => Ok(Self::RentComp),
            "acquisition" => Ok(Self::Acquisition),
            "market" => Ok(Self::Market),
            "mf_property" | "property" => Ok(Self::MfProperty),
            other => Err(RegistryError::UnknownValue {
                column: "scope".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Project => "project",
            Self::Unit => "unit",
            Self::UnitType => "unit_type",
            Self::Phase => "phase",
            Self::Parcel => "parcel",
            Self::LotOrProduct => "lot_or_product",
            Self::Assumption => "assumption",
            Self::Opex => "opex",
            Self::Income => "income",
            Self::SalesComp => "sales_comp",
            Self::RentComp => "rent_comp",
            Self::Acquisition => "acquisition",
            Self::Market => "market",
            Self::MfProperty => "mf_property",
        };
        f.write_str(s)
    }
}

/// Whether a field may be machine-extracted or is user-entered only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractPolicy {
    /// Extraction may populate this field.
    Extractable,
    /// Only a user may set this field.
    UserOnly,
}

impl FromStr for ExtractPolicy {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "extractable" | "extract" | "auto" => Ok(Self::Extractable),
            "user_only" | "user" | "manual" => Ok(Self::UserOnly),
            other => Err(RegistryError::UnknownValue {
                column: "extract_policy".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// How a field value is written to the production schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbWriteType {
    /// Update a single column on the scope's row.
    Column,
    /// Insert or update a row in the assumptions table.
    RowAssumption,
    /// Insert or update a row in the operating-expense table.
    RowOpex,
    /// Insert or update an allocation row.
    RowAllocation,
    /// Insert or update a budget line row.
    RowBudget,
    /// Insert or update a milestone row.
    RowMilestone,
    /// Upsert rows keyed by a natural key within the value itself.
    Upsert,
    /// Write to the dynamic overflow table.
    Dynamic,
}

impl FromStr for DbWriteType {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "column" => Ok(Self::Column),
            "row_assumption" | "assumption_row" => Ok(Self::RowAssumption),
            "row_opex" | "opex_row" => Ok(Self::RowOpex),
            "row_allocation" | "allocation_row" => Ok(Self::RowAllocation),
            "row_budget" | "budget_row" => Ok(Self::RowBudget),
            "row_milestone" | "milestone_row" => Ok(Self::RowMilestone),
            "upsert" => Ok(Self::Upsert),
            "dynamic" => Ok(Self::Dynamic),
            other => Err(RegistryError::UnknownValue {
                column: "db_write_type".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Whether a field is a model input or a computed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum FieldRole {
    Input,
    Output,
}

impl FromStr for FieldRole {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "input" => Ok(Self::Input),
            "output" | "derived" | "computed" => Ok(Self::Output),
            other => Err(RegistryError::UnknownValue {
                column: "field_role".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// How much a field matters to model quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum AnalyticalTier {
    Descriptive,
    Supporting,
    Important,
    Critical,
}

impl AnalyticalTier {
    /// Readiness weight: critical fields dominate the score, descriptive
    /// fields do not count at all.
    #[must_use]
    pub const fn weight(self) -> u32 {
        match self {
            Self::Critical => 10,
            Self::Important => 5,
            Self::Supporting => 2,
            Self::Descriptive => 0,
        }
    }
}

impl FromStr for AnalyticalTier {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "important" => Ok(Self::Important),
            "supporting" => Ok(Self::Supporting),
            "descriptive" => Ok(Self::Descriptive),
            other => Err(RegistryError::UnknownValue {
                column: "analytical_tier".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// How reliably a field can be machine-extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum Extractability {
    Low,
    Medium,
    High,
}

impl FromStr for Extractability {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" | "med" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(RegistryError::UnknownValue {
                column: "extractability".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// One catalog row: everything the pipeline knows about a field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Stable snake_case identity, unique within a property type.
    pub field_key: String,
    /// Human label shown in review UIs and used for label lookups.
    pub label: String,
    /// Logical value type, drives coercion at write time.
    pub field_type: FieldType,
    /// Production-schema scope the field belongs to.
    pub scope: Scope,
    /// Whether extraction may populate this field.
    pub extract_policy: ExtractPolicy,
    /// How the value lands in the production schema.
    pub db_write_type: DbWriteType,
    /// Production table, resolved through the target alias chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_table: Option<String>,
    /// Production column, resolved through the target alias chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_column: Option<String>,
    /// Extra selector keys for row-write types, parsed from JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector_json: Option<serde_json::Value>,
    /// Evidence types (document types) this field can be extracted from.
    pub evidence_types: Vec<String>,
    /// Model input or computed output.
    pub field_role: FieldRole,
    /// How much the field matters to model quality.
    pub analytical_tier: AnalyticalTier,
    /// How reliably the field can be machine-extracted.
    pub extractability: Extractability,
    /// Extraction hint passed to the extractor verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_hint: Option<String>,
}

impl FieldMapping {
    /// A field is resolved when it has a concrete production target.
    /// Dynamic fields are always resolved: their target is the overflow
    /// table itself.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.db_write_type == DbWriteType::Dynamic
            || (self.target_table.is_some() && self.target_column.is_some())
    }

    /// Whether extraction is allowed to populate this field.
    #[must_use]
    pub fn is_extractable(&self) -> bool {
        self.extract_policy == ExtractPolicy::Extractable
    }
}

/// Source of runtime field overlays (project-specific custom fields).
///
/// A failing source must not take the static catalog down with it:
/// overlay errors are logged and the static mappings returned as-is.
pub trait DynamicFieldSource: Send + Sync {
    /// Extra mappings for one project, merged over the static catalog.
    fn fields_for(
        &self,
        project_id: i64,
        property_type: &str,
    ) -> Result<Vec<FieldMapping>, RegistryError>;
}

/// Header names a catalog file must carry, in any order.
const REQUIRED_COLUMNS: &[&str] = &[
    "field_key",
    "label",
    "field_type",
    "scope",
    "extract_policy",
    "db_write_type",
    "evidence_types",
    "field_role",
    "analytical_tier",
    "extractability",
];

/// In-memory catalog for one property type.
#[derive(Debug, Default)]
struct Catalog {
    fields: Vec<FieldMapping>,
    by_key: HashMap<String, usize>,
    by_label: HashMap<String, usize>,
    by_target: HashMap<(String, String), usize>,
}

impl Catalog {
    fn from_mappings(mappings: Vec<FieldMapping>) -> Self {
        let mut catalog = Self {
            fields: mappings,
            ..Self::default()
        };
        catalog.rebuild_indexes();
        catalog
    }

    fn rebuild_indexes(&mut self) {
        self.by_key.clear();
        self.by_label.clear();
        self.by_target.clear();
        for (idx, field) in self.fields.iter().enumerate() {
            self.by_key.insert(field.field_key.clone(), idx);
            self.by_label.insert(field.label.to_lowercase(), idx);
            if let (Some(table), Some(column)) = (&field.target_table, &field.target_column) {
                self.by_target
                    .insert((table.clone(), column.clone()), idx);
            }
        }
    }

    /// Overlays dynamic mappings: same key replaces, new key appends.
    fn overlay(&self, extra: Vec<FieldMapping>) -> Vec<FieldMapping> {
        let mut merged = self.fields.clone();
        for field in extra {
            match self.by_key.get(&field.field_key) {
                Some(&idx) => merged[idx] = field,
                None => merged.push(field),
            }
        }
        merged
    }
}

/// The loaded registry: per-property-type catalogs plus lookup helpers.
pub struct FieldRegistry {
    catalogs: HashMap<String, Catalog>,
    aliases: HashMap<(String, String), String>,
    tier_overrides: HashMap<(String, String), AnalyticalTier>,
    dynamic_source: Option<Box<dyn DynamicFieldSource>>,
}

impl FieldRegistry {
    /// An empty registry. Useful as a base for [`add_catalog`] in tests
    /// and embedded setups.
    ///
    /// [`add_catalog`]: FieldRegistry::add_catalog
    #[must_use]
    pub fn new() -> Self {
        Self {
            catalogs: HashMap::new(),
            aliases: HashMap::new(),
            tier_overrides: HashMap::new(),
            dynamic_source: None,
        }
    }

    /// Loads a catalog file for a property type, replacing any previous
    /// catalog for that type.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read, the header is missing a
    /// required column, or the catalog ends up empty. Individual bad
    /// rows are logged and skipped, not fatal.
    pub fn load_catalog(
        &mut self,
        property_type: &str,
        path: impl AsRef<Path>,
    ) -> Result<(), RegistryError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RegistryError::Io(format!("{}: {e}", path.display())))?;
        self.load_catalog_str(property_type, &raw)?;
        info!(
            property_type,
            path = %path.display(),
            fields = self.catalogs[property_type].fields.len(),
            "catalog loaded"
        );
        Ok(())
    }

    /// Loads a catalog from in-memory text (the file format, verbatim).
    ///
    /// # Errors
    ///
    /// Same contract as [`FieldRegistry::load_catalog`].
    pub fn load_catalog_str(
        &mut self,
        property_type: &str,
        raw: &str,
    ) -> Result<(), RegistryError> {
        let mappings = parse_catalog(raw)?;
        if mappings.is_empty() {
            return Err(RegistryError::EmptyCatalog {
                property_type: property_type.to_string(),
            });
        }
        self.catalogs
            .insert(property_type.to_string(), Catalog::from_mappings(mappings));
        Ok(())
    }

    /// Installs a catalog directly from mappings.
    pub fn add_catalog(&mut self, property_type: &str, mappings: Vec<FieldMapping>) {
        self.catalogs
            .insert(property_type.to_string(), Catalog::from_mappings(mappings));
    }

    /// Installs the dynamic overlay source.
    pub fn set_dynamic_source(&mut self, source: Box<dyn DynamicFieldSource>) {
        self.dynamic_source = Some(source);
    }

    /// The property types with a loaded catalog.
    #[must_use]
    pub fn property_types(&self) -> Vec<&str> {
        self.catalogs.keys().map(String::as_str).collect()
    }

    /// Looks up a field by key. Exact match only; see
    /// [`FieldRegistry::resolve_field_key`] for fuzzy resolution.
    #[must_use]
    pub fn get_mapping(&self, property_type: &str, field_key: &str) -> Option<&FieldMapping> {
        let catalog = self.catalogs.get(property_type)?;
        catalog.by_key.get(field_key).map(|&idx| &catalog.fields[idx])
    }

    /// All static mappings for a property type.
    #[must_use]
    pub fn mappings(&self, property_type: &str) -> &[FieldMapping] {
        self.catalogs
            .get(property_type)
            .map_or(&[], |c| c.fields.as_slice())
    }

    /// Fields extractable from a given document type: resolved, not
    /// user-only, input-role, and listing the document type among their
    /// evidence types. Sorted by extractability, high first.
    #[must_use]
    pub fn fields_by_evidence_type(
        &self,
        property_type: &str,
        doc_type: DocumentType,
    ) -> Vec<&FieldMapping> {
        let evidence = doc_type.as_str();
        let mut fields: Vec<&FieldMapping> = self
            .mappings(property_type)
            .iter()
            .filter(|f| f.is_resolved())
            .filter(|f| f.is_extractable())
            .filter(|f| f.field_role == FieldRole::Input)
            .filter(|f| f.evidence_types.iter().any(|e| e == evidence))
            .collect();
        fields.sort_by(|a, b| b.extractability.cmp(&a.extractability));
        fields
    }

    /// Resolves a loosely-specified key to a catalog field key.
    ///
    /// Resolution steps, in order: exact field key, case-insensitive
    /// label, reverse target lookup (the explicit table/column pair if
    /// given, else a `table.column` reference inside the key), the key
    /// with spaces and hyphens normalized to underscores, and finally
    /// the external alias map (see [`FieldRegistry::set_alias`]).
    /// `None` if nothing matches; the caller decides whether that is an
    /// error.
    #[must_use]
    pub fn resolve_field_key(
        &self,
        property_type: &str,
        raw: &str,
        target_table: Option<&str>,
        target_column: Option<&str>,
    ) -> Option<&str> {
        let catalog = self.catalogs.get(property_type)?;
        let raw = raw.trim();

        if let Some(&idx) = catalog.by_key.get(raw) {
            return Some(&catalog.fields[idx].field_key);
        }

        if let Some(&idx) = catalog.by_label.get(&raw.to_lowercase()) {
            return Some(&catalog.fields[idx].field_key);
        }

        if let (Some(table), Some(column)) = (target_table, target_column) {
            if let Some(&idx) = catalog
                .by_target
                .get(&(table.to_string(), column.to_string()))
            {
                return Some(&catalog.fields[idx].field_key);
            }
        }

        if let Some((table, column)) = raw.split_once('.') {
            if let Some(&idx) = catalog
                .by_target
                .get(&(table.to_string(), column.to_string()))
            {
                return Some(&catalog.fields[idx].field_key);
            }
        }

        let normalized = raw.to_lowercase().replace([' ', '-'], "_");
        if let Some(&idx) = catalog.by_key.get(&normalized) {
            return Some(&catalog.fields[idx].field_key);
        }

        // Alias map, the last resort: only aliases that point at a real
        // catalog key resolve.
        if let Some(field_key) = self
            .aliases
            .get(&(property_type.to_string(), raw.to_lowercase()))
        {
            if let Some(&idx) = catalog.by_key.get(field_key) {
                return Some(&catalog.fields[idx].field_key);
            }
        }

        None
    }

    /// Registers an external alias for a field key, matched
    /// case-insensitively as the final resolution step. Extractor
    /// vocabularies and tenant spreadsheets name fields their own way;
    /// the alias map absorbs that without touching the catalog.
    pub fn set_alias(&mut self, property_type: &str, alias: &str, field_key: &str) {
        self.aliases.insert(
            (property_type.to_string(), alias.trim().to_lowercase()),
            field_key.to_string(),
        );
    }

    /// Static mappings merged with the project's dynamic overlay, when
    /// a source is installed. Overlay failures are logged and the
    /// static catalog returned unchanged; a broken project
    /// customization must never break extraction for everyone.
    #[must_use]
    pub fn merge_dynamic_fields(&self, project_id: i64, property_type: &str) -> Vec<FieldMapping> {
        let Some(catalog) = self.catalogs.get(property_type) else {
            return Vec::new();
        };

        match &self.dynamic_source {
            None => catalog.fields.clone(),
            Some(source) => match source.fields_for(project_id, property_type) {
                Ok(extra) => catalog.overlay(extra),
                Err(e) => {
                    warn!(project_id, property_type, error = %e, "dynamic field source failed; using static catalog");
                    catalog.fields.clone()
                }
            },
        }
    }

    /// Promotes or demotes a field's tier without editing the catalog,
    /// for per-deployment tuning.
    pub fn set_tier_override(
        &mut self,
        property_type: &str,
        field_key: &str,
        tier: AnalyticalTier,
    ) {
        self.tier_overrides
            .insert((property_type.to_string(), field_key.to_string()), tier);
    }

    /// The analytical tier for a field: the override table first, then
    /// the catalog, defaulting to descriptive for unknown keys so an
    /// unregistered field can never gate the model.
    #[must_use]
    pub fn analytical_tier(&self, property_type: &str, field_key: &str) -> AnalyticalTier {
        if let Some(tier) = self
            .tier_overrides
            .get(&(property_type.to_string(), field_key.to_string()))
        {
            return *tier;
        }
        self.get_mapping(property_type, field_key)
            .map_or(AnalyticalTier::Descriptive, |f| f.analytical_tier)
    }
}

impl Default for FieldRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Document priority for conflict resolution, per scope. Lower wins.
///
/// The table encodes which document is authoritative for which kind of
/// figure: rent rolls for rents, T-12s for actual expenses, comp
/// reports for market data. Document types absent from a scope's
/// ranking share the lowest priority.
#[must_use]
pub fn document_priority(doc_type: DocumentType, scope: Scope) -> u8 {
    let ranking: &[DocumentType] = match scope {
        Scope::Unit | Scope::UnitType | Scope::Income => &[
            DocumentType::RentRoll,
            DocumentType::T12,
            DocumentType::OfferingMemorandum,
            DocumentType::Proforma,
        ],
        Scope::Opex => &[
            DocumentType::T12,
            DocumentType::Appraisal,
            DocumentType::OfferingMemorandum,
            DocumentType::Proforma,
        ],
        Scope::Market | Scope::SalesComp | Scope::RentComp => &[
            DocumentType::CompReport,
            DocumentType::Appraisal,
            DocumentType::OfferingMemorandum,
        ],
        Scope::Acquisition | Scope::Assumption => &[
            DocumentType::Appraisal,
            DocumentType::OfferingMemorandum,
            DocumentType::Proforma,
        ],
        Scope::Parcel | Scope::Phase | Scope::LotOrProduct => &[
            DocumentType::SitePlan,
            DocumentType::OfferingMemorandum,
            DocumentType::Appraisal,
        ],
        Scope::Project | Scope::MfProperty => &[
            DocumentType::OfferingMemorandum,
            DocumentType::Appraisal,
            DocumentType::RentRoll,
            DocumentType::T12,
        ],
    };

    ranking
        .iter()
        .position(|d| *d == doc_type)
        .map_or(ranking.len() as u8, |p| p as u8)
}

// ---- catalog file parsing ----

/// Splits a catalog line on commas, honoring double quotes. Doubled
/// quotes inside a quoted cell unescape to one quote.
fn split_catalog_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                cell.push('"');
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                cells.push(cell.trim().to_string());
                cell.clear();
            }
            _ => cell.push(c),
        }
    }
    cells.push(cell.trim().to_string());
    cells
}

fn truthy(cell: &str) -> bool {
    matches!(cell.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "y" | "✓" | "x")
}

struct HeaderIndex(HashMap<String, usize>);

impl HeaderIndex {
    fn parse(line: &str) -> Result<Self, RegistryError> {
        let cells = split_catalog_line(line);
        let map: HashMap<String, usize> = cells
            .iter()
            .enumerate()
            .map(|(i, name)| (name.to_lowercase(), i))
            .collect();

        for required in REQUIRED_COLUMNS {
            if !map.contains_key(*required) {
                return Err(RegistryError::MissingColumn {
                    column: (*required).to_string(),
                });
            }
        }
        Ok(Self(map))
    }

    fn get<'a>(&self, cells: &'a [String], column: &str) -> &'a str {
        self.0
            .get(column)
            .and_then(|&i| cells.get(i))
            .map_or("", String::as_str)
    }

    fn required<'a>(&self, cells: &'a [String], column: &str) -> Result<&'a str, RegistryError> {
        let value = self.get(cells, column);
        if value.is_empty() {
            return Err(RegistryError::UnknownValue {
                column: column.to_string(),
                value: "<empty>".to_string(),
            });
        }
        Ok(value)
    }
}

/// Resolves the production target through the alias chain: a combined
/// `db_target` of the form `table.column` wins, then the explicit
/// `target_table`/`target_column` pair, then the legacy
/// `resolved_table`/`resolved_column` pair.
fn resolve_target(
    header: &HeaderIndex,
    cells: &[String],
) -> (Option<String>, Option<String>) {
    let db_target = header.get(cells, "db_target");
    if let Some((table, column)) = db_target.split_once('.') {
        if !table.is_empty() && !column.is_empty() {
            return (Some(table.to_string()), Some(column.to_string()));
        }
    }

    let table = header.get(cells, "target_table");
    let column = header.get(cells, "target_column");
    if !table.is_empty() && !column.is_empty() {
        return (Some(table.to_string()), Some(column.to_string()));
    }

    let table = header.get(cells, "resolved_table");
    let column = header.get(cells, "resolved_column");
    if !table.is_empty() && !column.is_empty() {
        return (Some(table.to_string()), Some(column.to_string()));
    }

    (None, None)
}

/// Evidence lists accept pipe or comma separators inside the cell.
fn split_list(cell: &str) -> Vec<String> {
    cell.split(['|', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn parse_row(header: &HeaderIndex, cells: &[String]) -> Result<FieldMapping, RegistryError> {
    let field_key = header.required(cells, "field_key")?.to_string();
    let label = header.required(cells, "label")?.to_string();
    let field_type: FieldType = header.required(cells, "field_type")?.parse()?;
    let scope: Scope = header.required(cells, "scope")?.parse()?;
    let db_write_type: DbWriteType = header.required(cells, "db_write_type")?.parse()?;
    let field_role: FieldRole = header.required(cells, "field_role")?.parse()?;
    let analytical_tier: AnalyticalTier = header.required(cells, "analytical_tier")?.parse()?;
    let extractability: Extractability = header.required(cells, "extractability")?.parse()?;

    // extract_policy also accepts a bare truthy flag column.
    let policy_cell = header.required(cells, "extract_policy")?;
    let extract_policy = policy_cell.parse().or_else(|e| {
        if truthy(policy_cell) {
            Ok(ExtractPolicy::Extractable)
        } else {
            Err(e)
        }
    })?;

    let (target_table, target_column) = resolve_target(header, cells);

    let selector_cell = header.get(cells, "selector_json");
    let selector_json = if selector_cell.is_empty() {
        None
    } else {
        Some(serde_json::from_str(selector_cell).map_err(|e| {
            RegistryError::UnknownValue {
                column: "selector_json".to_string(),
                value: format!("{selector_cell}: {e}"),
            }
        })?)
    };

    let hint = header.get(cells, "extraction_hint");

    Ok(FieldMapping {
        field_key,
        label,
        field_type,
        scope,
        extract_policy,
        db_write_type,
        target_table,
        target_column,
        selector_json,
        evidence_types: split_list(header.get(cells, "evidence_types")),
        field_role,
        analytical_tier,
        extractability,
        extraction_hint: if hint.is_empty() {
            None
        } else {
            Some(hint.to_string())
        },
    })
}

fn parse_catalog(raw: &str) -> Result<Vec<FieldMapping>, RegistryError> {
    let mut lines = raw
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty() && !l.trim_start().starts_with('#'));

    let (_, header_line) = lines.next().ok_or(RegistryError::MissingColumn {
        column: "field_key".to_string(),
    })?;
    let header = HeaderIndex::parse(header_line)?;

    let mut mappings = Vec::new();
    for (line_no, line) in lines {
        let cells = split_catalog_line(line);
        match parse_row(&header, &cells) {
            Ok(mapping) => mappings.push(mapping),
            Err(e) => {
                warn!(line = line_no + 1, error = %e, "skipping malformed catalog row");
            }
        }
    }
    Ok(mappings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = "\
field_key,label,field_type,scope,extract_policy,db_write_type,db_target,target_table,target_column,selector_json,evidence_types,field_role,analytical_tier,extractability,extraction_hint
cap_rate,Cap Rate,percent,assumption,extractable,row_assumption,,assumptions,value,\"{\"\"label\"\": \"\"cap_rate\"\"}\",offering_memorandum|appraisal,input,critical,high,Going-in cap rate
market_rent,Market Rent,currency,unit_type,extractable,column,unit_types.market_rent,,,,rent_roll|offering_memorandum,input,critical,high,
unit_count,Unit Count,integer,project,extractable,column,,projects,unit_count,,offering_memorandum|rent_roll,input,important,high,
year_built,Year Built,integer,project,extractable,column,,projects,year_built,,offering_memorandum|appraisal,input,supporting,medium,
internal_notes,Internal Notes,text,project,user_only,column,,projects,notes,,,input,descriptive,low,
irr,Levered IRR,percent,project,extractable,column,,projects,irr,,proforma,output,descriptive,low,
unresolved_field,Mystery,text,project,extractable,column,,,,,offering_memorandum,input,supporting,low,
custom_misc,Custom Misc,text,project,extractable,dynamic,,,,,offering_memorandum,input,descriptive,low,
";

    fn registry() -> FieldRegistry {
        let mut registry = FieldRegistry::new();
        registry.load_catalog_str("multifamily", CATALOG).unwrap();
        registry
    }

    #[test]
    fn loads_catalog_and_indexes() {
        let registry = registry();
        let mapping = registry.get_mapping("multifamily", "cap_rate").unwrap();
        assert_eq!(mapping.field_type, FieldType::Percent);
        assert_eq!(mapping.scope, Scope::Assumption);
        assert_eq!(mapping.db_write_type, DbWriteType::RowAssumption);
        assert_eq!(mapping.selector_json.as_ref().unwrap()["label"], "cap_rate");
        assert_eq!(
            mapping.evidence_types,
            vec!["offering_memorandum", "appraisal"]
        );
    }

    #[test]
    fn db_target_alias_beats_split_columns() {
        let registry = registry();
        let mapping = registry.get_mapping("multifamily", "market_rent").unwrap();
        assert_eq!(mapping.target_table.as_deref(), Some("unit_types"));
        assert_eq!(mapping.target_column.as_deref(), Some("market_rent"));
    }

    #[test]
    fn malformed_row_is_skipped_not_fatal() {
        let raw = "\
field_key,label,field_type,scope,extract_policy,db_write_type,target_table,target_column,evidence_types,field_role,analytical_tier,extractability
good_field,Good,text,project,extractable,column,projects,good,om,input,supporting,low
bad_field,Bad,not_a_type,project,extractable,column,projects,bad,om,input,supporting,low
";
        let mut registry = FieldRegistry::new();
        registry.load_catalog_str("multifamily", raw).unwrap();
        assert!(registry.get_mapping("multifamily", "good_field").is_some());
        assert!(registry.get_mapping("multifamily", "bad_field").is_none());
    }

    #[test]
    fn missing_required_column_fails_loudly() {
        let raw = "field_key,label\na,b\n";
        let err = FieldRegistry::new()
            .load_catalog_str("multifamily", raw)
            .unwrap_err();
        assert!(matches!(err, RegistryError::MissingColumn { .. }));
    }

    #[test]
    fn empty_catalog_is_an_error() {
        let raw = "\
field_key,label,field_type,scope,extract_policy,db_write_type,evidence_types,field_role,analytical_tier,extractability
bad,Bad,nope,project,extractable,column,om,input,supporting,low
";
        let err = FieldRegistry::new()
            .load_catalog_str("multifamily", raw)
            .unwrap_err();
        assert!(matches!(err, RegistryError::EmptyCatalog { .. }));
    }

    #[test]
    fn fields_by_evidence_type_filters_and_sorts() {
        let registry = registry();
        let fields = registry.fields_by_evidence_type("multifamily", DocumentType::OfferingMemorandum);
        let keys: Vec<&str> = fields.iter().map(|f| f.field_key.as_str()).collect();

        // user_only, output-role, and unresolved fields are excluded;
        // high extractability sorts first.
        assert!(!keys.contains(&"internal_notes"));
        assert!(!keys.contains(&"irr"));
        assert!(!keys.contains(&"unresolved_field"));
        assert_eq!(
            keys,
            vec!["cap_rate", "market_rent", "unit_count", "year_built", "custom_misc"]
        );
    }

    #[test]
    fn resolve_exact_field_key() {
        let registry = registry();
        assert_eq!(
            registry.resolve_field_key("multifamily", "cap_rate", None, None),
            Some("cap_rate")
        );
    }

    #[test]
    fn resolve_label_case_insensitively() {
        let registry = registry();
        assert_eq!(
            registry.resolve_field_key("multifamily", "cap rate", None, None),
            Some("cap_rate")
        );
        assert_eq!(
            registry.resolve_field_key("multifamily", "Market Rent", None, None),
            Some("market_rent")
        );
    }

    #[test]
    fn resolve_by_explicit_target_pair() {
        let registry = registry();
        assert_eq!(
            registry.resolve_field_key(
                "multifamily",
                "some extractor name",
                Some("projects"),
                Some("unit_count"),
            ),
            Some("unit_count")
        );
        // One half of the pair is not enough.
        assert_eq!(
            registry.resolve_field_key("multifamily", "some extractor name", Some("projects"), None),
            None
        );
    }

    #[test]
    fn resolve_by_embedded_target_reference() {
        let registry = registry();
        assert_eq!(
            registry.resolve_field_key("multifamily", "projects.unit_count", None, None),
            Some("unit_count")
        );
    }

    #[test]
    fn resolve_normalized_spaces_and_hyphens() {
        let registry = registry();
        assert_eq!(
            registry.resolve_field_key("multifamily", "Unit-Count", None, None),
            Some("unit_count")
        );
    }

    #[test]
    fn resolve_through_the_alias_map() {
        let mut registry = registry();
        assert_eq!(
            registry.resolve_field_key("multifamily", "Going-In Cap", None, None),
            None
        );
        registry.set_alias("multifamily", "Going-In Cap", "cap_rate");
        assert_eq!(
            registry.resolve_field_key("multifamily", "going-in cap", None, None),
            Some("cap_rate")
        );

        // An alias pointing at a key the catalog does not carry resolves
        // nothing.
        registry.set_alias("multifamily", "mystery", "no_such_field");
        assert_eq!(
            registry.resolve_field_key("multifamily", "mystery", None, None),
            None
        );
    }

    #[test]
    fn resolve_unknown_key_is_none() {
        let registry = registry();
        assert_eq!(
            registry.resolve_field_key("multifamily", "nope", None, None),
            None
        );
    }

    #[test]
    fn document_priority_ranks_by_scope() {
        use DocumentType::*;
        assert!(document_priority(RentRoll, Scope::UnitType) < document_priority(OfferingMemorandum, Scope::UnitType));
        assert!(document_priority(T12, Scope::Opex) < document_priority(OfferingMemorandum, Scope::Opex));
        assert!(document_priority(CompReport, Scope::Market) < document_priority(Appraisal, Scope::Market));
        // Unranked types share the lowest priority.
        assert_eq!(
            document_priority(SitePlan, Scope::Opex),
            document_priority(Unknown, Scope::Opex)
        );
    }

    struct FailingSource;
    impl DynamicFieldSource for FailingSource {
        fn fields_for(&self, _: i64, _: &str) -> Result<Vec<FieldMapping>, RegistryError> {
            Err(RegistryError::DynamicSource {
                reason: "connection refused".to_string(),
            })
        }
    }

    struct ExtraFieldSource;
    impl DynamicFieldSource for ExtraFieldSource {
        fn fields_for(&self, _: i64, _: &str) -> Result<Vec<FieldMapping>, RegistryError> {
            Ok(vec![FieldMapping {
                field_key: "solar_capacity_kw".to_string(),
                label: "Solar Capacity (kW)".to_string(),
                field_type: FieldType::Decimal,
                scope: Scope::Project,
                extract_policy: ExtractPolicy::Extractable,
                db_write_type: DbWriteType::Dynamic,
                target_table: None,
                target_column: None,
                selector_json: None,
                evidence_types: vec!["offering_memorandum".to_string()],
                field_role: FieldRole::Input,
                analytical_tier: AnalyticalTier::Descriptive,
                extractability: Extractability::Low,
                extraction_hint: None,
            }])
        }
    }

    #[test]
    fn dynamic_overlay_merges_and_survives_failure() {
        let mut registry = registry();
        registry.set_dynamic_source(Box::new(ExtraFieldSource));
        let merged = registry.merge_dynamic_fields(42, "multifamily");
        assert!(merged.iter().any(|f| f.field_key == "solar_capacity_kw"));

        let registry = registry_with_failing_source();
        let merged = registry.merge_dynamic_fields(42, "multifamily");
        // Static catalog intact despite overlay failure.
        assert!(merged.iter().any(|f| f.field_key == "cap_rate"));
        assert_eq!(merged.len(), registry.mappings("multifamily").len());

        fn registry_with_failing_source() -> FieldRegistry {
            let mut r = self::registry();
            r.set_dynamic_source(Box::new(FailingSource));
            r
        }
    }

    #[test]
    fn tier_override_beats_the_catalog() {
        let mut registry = registry();
        assert_eq!(
            registry.analytical_tier("multifamily", "year_built"),
            AnalyticalTier::Supporting
        );
        registry.set_tier_override("multifamily", "year_built", AnalyticalTier::Critical);
        assert_eq!(
            registry.analytical_tier("multifamily", "year_built"),
            AnalyticalTier::Critical
        );
    }

    #[test]
    fn analytical_tier_defaults_to_descriptive() {
        let registry = registry();
        assert_eq!(
            registry.analytical_tier("multifamily", "cap_rate"),
            AnalyticalTier::Critical
        );
        assert_eq!(
            registry.analytical_tier("multifamily", "no_such_field"),
            AnalyticalTier::Descriptive
        );
    }

    #[test]
    fn quoted_cells_with_commas_and_escaped_quotes() {
        let cells = split_catalog_line(r#"a,"b, c","say ""hi""",d"#);
        assert_eq!(cells, vec!["a", "b, c", r#"say "hi""#, "d"]);
    }
}

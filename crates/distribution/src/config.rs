use serde::Deserialize;

use crate::error::DistributionError;
use crate::furness::{Furness, DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE};
use crate::seed::DEFAULT_SEED_FLOOR;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct EstimateConfig {
    pub name: String,
    pub regions: RegionsConfig,
    pub production: MarginalSource,
    pub consumption: MarginalSource,
    pub prior: PriorConfig,
    #[serde(default)]
    pub balancing: BalancingConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// Regions
// ---------------------------------------------------------------------------

/// Boundary table the region universe is taken from.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionsConfig {
    pub file: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Keep only regions at this hierarchy level.
    #[serde(default)]
    pub level: Option<u8>,
    /// Keep only regions of this country code.
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub columns: RegionColumns,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegionColumns {
    #[serde(default = "default_region_id")]
    pub id: String,
    #[serde(default = "default_region_name")]
    pub name: String,
    #[serde(default = "default_region_level")]
    pub level: String,
    #[serde(default = "default_region_country")]
    pub country: String,
}

impl Default for RegionColumns {
    fn default() -> Self {
        Self {
            id: default_region_id(),
            name: default_region_name(),
            level: default_region_level(),
            country: default_region_country(),
        }
    }
}

// ---------------------------------------------------------------------------
// Production / consumption
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MarginalSource {
    pub file: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Aggregate only records of this year.
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub columns: MarginalColumns,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarginalColumns {
    #[serde(default = "default_product")]
    pub product: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_quantity")]
    pub quantity: String,
    #[serde(default = "default_year")]
    pub year: String,
}

impl Default for MarginalColumns {
    fn default() -> Self {
        Self {
            product: default_product(),
            region: default_region(),
            quantity: default_quantity(),
            year: default_year(),
        }
    }
}

// ---------------------------------------------------------------------------
// Prior
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorSource {
    /// Observed O-D sample (survey).
    Empirical,
    /// Square friction matrix keyed by region names.
    Impedance,
}

impl std::fmt::Display for PriorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empirical => write!(f, "empirical"),
            Self::Impedance => write!(f, "impedance"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriorConfig {
    pub source: PriorSource,
    pub file: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Sample columns. Ignored for an impedance matrix.
    #[serde(default)]
    pub columns: SampleColumns,
    /// Keep only sample rows whose `column` is one of `values`.
    #[serde(default)]
    pub filter: Option<RowFilter>,
    /// Legacy code revisions applied to sample origins and destinations.
    #[serde(default)]
    pub recode: Option<RecodeConfig>,
    /// Reject label matches scoring below this (impedance only).
    #[serde(default)]
    pub min_similarity: Option<f64>,
    /// Matrix cells are costs: use `1 / value`.
    #[serde(default)]
    pub invert: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SampleColumns {
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default = "default_destination")]
    pub destination: String,
    #[serde(default = "default_weight")]
    pub weight: String,
}

impl Default for SampleColumns {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            destination: default_destination(),
            weight: default_weight(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RowFilter {
    pub column: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecodeConfig {
    pub file: String,
    #[serde(default = "default_recode_delimiter")]
    pub delimiter: String,
    #[serde(default)]
    pub columns: RecodeColumns,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecodeColumns {
    #[serde(default = "default_old")]
    pub old: String,
    #[serde(default = "default_new")]
    pub new: String,
    #[serde(default = "default_year")]
    pub year: String,
}

impl Default for RecodeColumns {
    fn default() -> Self {
        Self {
            old: default_old(),
            new: default_new(),
            year: default_year(),
        }
    }
}

// ---------------------------------------------------------------------------
// Balancing + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct BalancingConfig {
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_seed_floor")]
    pub seed_floor: f64,
    /// Rescale production per product to the consumption total before seeding.
    #[serde(default = "default_true")]
    pub normalize_production: bool,
}

impl Default for BalancingConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            seed_floor: DEFAULT_SEED_FLOOR,
            normalize_production: true,
        }
    }
}

impl BalancingConfig {
    pub fn furness(&self) -> Furness {
        Furness::new(self.tolerance, self.max_iterations)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    /// Long-form flow table CSV.
    #[serde(default)]
    pub flows: Option<String>,
    /// Full result document (JSON).
    #[serde(default)]
    pub result: Option<String>,
}

fn default_delimiter() -> String {
    ",".into()
}
fn default_recode_delimiter() -> String {
    "\t".into()
}
fn default_region_id() -> String {
    "NUTS_ID".into()
}
fn default_region_name() -> String {
    "NUTS_NAME".into()
}
fn default_region_level() -> String {
    "LEVL_CODE".into()
}
fn default_region_country() -> String {
    "CNTR_CODE".into()
}
fn default_product() -> String {
    "product_name".into()
}
fn default_region() -> String {
    "nuts".into()
}
fn default_quantity() -> String {
    "quantity".into()
}
fn default_year() -> String {
    "year".into()
}
fn default_origin() -> String {
    "origin_nuts".into()
}
fn default_destination() -> String {
    "destination_nuts".into()
}
fn default_weight() -> String {
    "loaded_weight_kg".into()
}
fn default_old() -> String {
    "old".into()
}
fn default_new() -> String {
    "new".into()
}
fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}
fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}
fn default_seed_floor() -> f64 {
    DEFAULT_SEED_FLOOR
}
fn default_true() -> bool {
    true
}

/// Single-byte field delimiter of a validated source.
pub fn delimiter_byte(delimiter: &str) -> u8 {
    delimiter.as_bytes().first().copied().unwrap_or(b',')
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl EstimateConfig {
    pub fn from_toml(input: &str) -> Result<Self, DistributionError> {
        let config: EstimateConfig =
            toml::from_str(input).map_err(|e| DistributionError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DistributionError> {
        let invalid = |msg: String| Err(DistributionError::ConfigValidation(msg));

        let b = &self.balancing;
        if !(b.tolerance.is_finite() && b.tolerance > 0.0) {
            return invalid(format!("balancing.tolerance must be > 0, got {}", b.tolerance));
        }
        if b.max_iterations == 0 {
            return invalid("balancing.max_iterations must be at least 1".into());
        }
        if !(b.seed_floor.is_finite() && b.seed_floor > 0.0) {
            return invalid(format!("balancing.seed_floor must be > 0, got {}", b.seed_floor));
        }

        for (section, delimiter) in [
            ("regions", &self.regions.delimiter),
            ("production", &self.production.delimiter),
            ("consumption", &self.consumption.delimiter),
            ("prior", &self.prior.delimiter),
        ] {
            check_delimiter(section, delimiter)?;
        }
        if let Some(ref recode) = self.prior.recode {
            check_delimiter("prior.recode", &recode.delimiter)?;
        }

        if let Some(min) = self.prior.min_similarity {
            if !(0.0..=1.0).contains(&min) {
                return invalid(format!("prior.min_similarity must be within [0, 1], got {min}"));
            }
        }

        match self.prior.source {
            PriorSource::Empirical => {
                if self.prior.min_similarity.is_some() {
                    return invalid("prior.min_similarity applies only to source = \"impedance\"".into());
                }
                if self.prior.invert {
                    return invalid("prior.invert applies only to source = \"impedance\"".into());
                }
            }
            PriorSource::Impedance => {
                if self.prior.filter.is_some() {
                    return invalid("prior.filter applies only to source = \"empirical\"".into());
                }
                if self.prior.recode.is_some() {
                    return invalid("prior.recode applies only to source = \"empirical\"".into());
                }
            }
        }

        if let Some(ref filter) = self.prior.filter {
            if filter.values.is_empty() {
                return invalid(format!("prior.filter on '{}' lists no values", filter.column));
            }
        }

        Ok(())
    }
}

fn check_delimiter(section: &str, delimiter: &str) -> Result<(), DistributionError> {
    if delimiter.len() != 1 {
        return Err(DistributionError::ConfigValidation(format!(
            "{section}.delimiter must be a single ASCII character, got {delimiter:?}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

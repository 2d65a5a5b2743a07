use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;

use crate::assemble::FlowTable;
use crate::error::DistributionError;
use crate::recode::CodeLookup;

// ---------------------------------------------------------------------------
// Regions
// ---------------------------------------------------------------------------

/// One geographic unit of the boundary table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub id: String,
    pub name: String,
    pub level: Option<u8>,
    pub country: Option<String>,
}

impl Region {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            level: None,
            country: None,
        }
    }

    pub fn with_level(mut self, level: u8) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }
}

/// The fixed, ordered set of regions a run distributes flow over.
///
/// Ids are unique; the first occurrence of a duplicated id wins.
#[derive(Debug, Clone, Default)]
pub struct RegionUniverse {
    regions: Vec<Region>,
}

impl RegionUniverse {
    pub fn new(regions: Vec<Region>) -> Self {
        let mut seen = HashSet::new();
        let regions = regions
            .into_iter()
            .filter(|r| seen.insert(r.id.clone()))
            .collect();
        Self { regions }
    }

    /// Build a universe straight from ids (names default to the id).
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            ids.into_iter()
                .map(|id| {
                    let id = id.into();
                    Region::new(id.clone(), id)
                })
                .collect(),
        )
    }

    /// Keep regions at `level` in `country`. `None` accepts anything.
    pub fn filter(&self, level: Option<u8>, country: Option<&str>) -> Self {
        let regions = self
            .regions
            .iter()
            .filter(|r| level.map_or(true, |l| r.level == Some(l)))
            .filter(|r| country.map_or(true, |c| r.country.as_deref() == Some(c)))
            .cloned()
            .collect();
        Self { regions }
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.regions.iter().any(|r| r.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.regions.iter().map(|r| r.id.as_str())
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Canonical (name, id) pairs in universe order, for label resolution.
    pub fn name_lookup(&self) -> Vec<(String, String)> {
        self.regions
            .iter()
            .map(|r| (r.name.clone(), r.id.clone()))
            .collect()
    }

    /// All ordered (origin, destination) pairs, origin-major.
    pub fn pairs(&self) -> Vec<OdPair> {
        let mut pairs = Vec::with_capacity(self.regions.len() * self.regions.len());
        for o in &self.regions {
            for d in &self.regions {
                pairs.push(OdPair::new(&o.id, &d.id));
            }
        }
        pairs
    }
}

// ---------------------------------------------------------------------------
// Input records
// ---------------------------------------------------------------------------

/// One production or consumption observation as read from the source table.
///
/// Fields are optional so that a missing value can be reported with its line.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub line: usize,
    pub product: Option<String>,
    pub region: Option<String>,
    pub quantity: Option<f64>,
    pub year: Option<i32>,
}

impl RawRecord {
    pub fn new(product: &str, region: &str, quantity: f64) -> Self {
        Self {
            line: 0,
            product: Some(product.into()),
            region: Some(region.into()),
            quantity: Some(quantity),
            year: None,
        }
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }
}

/// One observed shipment of the O-D survey.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRow {
    pub line: usize,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub weight: Option<f64>,
}

impl SampleRow {
    pub fn new(origin: &str, destination: &str, weight: f64) -> Self {
        Self {
            line: 0,
            origin: Some(origin.into()),
            destination: Some(destination.into()),
            weight: Some(weight),
        }
    }
}

/// Square region-pair friction table keyed by free-text labels.
///
/// `values[i][j]` is the impedance from `labels[i]` to `labels[j]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpedanceMatrix {
    labels: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl ImpedanceMatrix {
    pub fn new(labels: Vec<String>, values: Vec<Vec<f64>>) -> Result<Self, DistributionError> {
        if values.len() != labels.len() {
            return Err(DistributionError::MalformedMatrix(format!(
                "{} labels but {} rows",
                labels.len(),
                values.len()
            )));
        }
        for (i, row) in values.iter().enumerate() {
            if row.len() != labels.len() {
                return Err(DistributionError::MalformedMatrix(format!(
                    "row '{}' has {} cells, expected {}",
                    labels[i],
                    row.len(),
                    labels.len()
                )));
            }
            if let Some(bad) = row.iter().find(|v| !v.is_finite() || **v < 0.0) {
                return Err(DistributionError::MalformedMatrix(format!(
                    "row '{}' contains invalid impedance {bad}",
                    labels[i]
                )));
            }
        }
        Ok(Self { labels, values })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn value(&self, row: usize, col: usize) -> f64 {
        self.values[row][col]
    }

    pub fn size(&self) -> usize {
        self.labels.len()
    }
}

/// Where the spatial distribution prior comes from.
#[derive(Debug, Clone)]
pub enum PriorInput {
    /// Observed O-D shipments; codes are recoded before use when a lookup is given.
    Sample {
        rows: Vec<SampleRow>,
        recode: Option<CodeLookup>,
    },
    /// External friction matrix whose labels are fuzzy-matched to region names.
    Impedance(ImpedanceMatrix),
}

/// Everything a run needs, pre-loaded.
#[derive(Debug, Clone)]
pub struct EstimateInput {
    pub regions: RegionUniverse,
    pub production: Vec<RawRecord>,
    pub consumption: Vec<RawRecord>,
    pub prior: PriorInput,
}

// ---------------------------------------------------------------------------
// Marginals
// ---------------------------------------------------------------------------

/// Marginal key = (product, region).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarginKey {
    pub product: String,
    pub region: String,
}

/// (product, region) → non-negative quantity. Missing keys read as zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarginalTable {
    values: BTreeMap<MarginKey, f64>,
}

impl MarginalTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `quantity` to the (product, region) total.
    pub fn add(&mut self, product: &str, region: &str, quantity: f64) {
        let key = MarginKey {
            product: product.to_string(),
            region: region.to_string(),
        };
        *self.values.entry(key).or_insert(0.0) += quantity;
    }

    pub fn get(&self, product: &str, region: &str) -> Option<f64> {
        self.values
            .get(&MarginKey {
                product: product.to_string(),
                region: region.to_string(),
            })
            .copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MarginKey, f64)> {
        self.values.iter().map(|(k, v)| (k, *v))
    }

    pub fn products(&self) -> BTreeSet<&str> {
        self.values.keys().map(|k| k.product.as_str()).collect()
    }

    /// Region → quantity for one product.
    pub fn for_product(&self, product: &str) -> BTreeMap<String, f64> {
        self.values
            .iter()
            .filter(|(k, _)| k.product == product)
            .map(|(k, v)| (k.region.clone(), *v))
            .collect()
    }

    pub fn product_total(&self, product: &str) -> f64 {
        self.values
            .iter()
            .filter(|(k, _)| k.product == product)
            .map(|(_, v)| v)
            .sum()
    }

    pub fn total(&self) -> f64 {
        self.values.values().sum()
    }

    /// Drop regions outside the universe.
    pub fn restrict_to(&self, universe: &RegionUniverse) -> Self {
        let values = self
            .values
            .iter()
            .filter(|(k, _)| universe.contains(&k.region))
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        Self { values }
    }

    pub(crate) fn scale_product(&mut self, product: &str, factor: f64) {
        for (key, value) in self.values.iter_mut() {
            if key.product == product {
                *value *= factor;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Pairs + prior
// ---------------------------------------------------------------------------

/// Ordered (origin, destination) region pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OdPair {
    pub origin: String,
    pub destination: String,
}

impl OdPair {
    pub fn new(origin: &str, destination: &str) -> Self {
        Self {
            origin: origin.to_string(),
            destination: destination.to_string(),
        }
    }
}

/// Relative likelihood that a unit of flow moves along a pair, any product.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prior {
    weights: BTreeMap<OdPair, f64>,
}

impl Prior {
    pub fn from_weights(weights: BTreeMap<OdPair, f64>) -> Self {
        Self { weights }
    }

    pub fn get(&self, origin: &str, destination: &str) -> Option<f64> {
        self.weights.get(&OdPair::new(origin, destination)).copied()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OdPair, f64)> {
        self.weights.iter().map(|(k, v)| (k, *v))
    }

    /// Divide every weight by the total. A zero-total prior is returned unchanged.
    pub fn normalized(mut self) -> Self {
        let total = self.total();
        if total > 0.0 {
            for w in self.weights.values_mut() {
                *w /= total;
            }
        }
        self
    }
}

/// Per-product working matrix: (origin, destination) → quantity.
///
/// Kept as an explicit composite-key map; axis totals are computed on demand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OdMatrix {
    cells: BTreeMap<OdPair, f64>,
}

impl OdMatrix {
    pub fn from_cells(cells: BTreeMap<OdPair, f64>) -> Self {
        Self { cells }
    }

    pub fn get(&self, origin: &str, destination: &str) -> Option<f64> {
        self.cells.get(&OdPair::new(origin, destination)).copied()
    }

    pub fn set(&mut self, origin: &str, destination: &str, value: f64) {
        self.cells.insert(OdPair::new(origin, destination), value);
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OdPair, f64)> {
        self.cells.iter().map(|(k, v)| (k, *v))
    }

    pub fn total(&self) -> f64 {
        self.cells.values().sum()
    }

    /// Sum of cells per region along `axis` (row sums for origin).
    pub fn axis_sums(&self, axis: Axis) -> BTreeMap<String, f64> {
        let mut sums: BTreeMap<String, f64> = BTreeMap::new();
        for (pair, value) in &self.cells {
            *sums.entry(axis.of(pair).to_string()).or_insert(0.0) += value;
        }
        sums
    }

    pub fn row_sums(&self) -> BTreeMap<String, f64> {
        self.axis_sums(Axis::Origin)
    }

    pub fn col_sums(&self) -> BTreeMap<String, f64> {
        self.axis_sums(Axis::Destination)
    }

    /// Multiply every cell of slice `k` along `axis` by `factors[k]`.
    /// Slices without a factor are left unchanged.
    pub fn scale_axis(&mut self, axis: Axis, factors: &BTreeMap<String, f64>) {
        for (pair, value) in self.cells.iter_mut() {
            if let Some(f) = factors.get(axis.of(pair)) {
                *value *= f;
            }
        }
    }

    pub fn into_cells(self) -> BTreeMap<OdPair, f64> {
        self.cells
    }
}

// ---------------------------------------------------------------------------
// Diagnostics + output
// ---------------------------------------------------------------------------

/// Axis of an O-D matrix: rows are origins, columns are destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Origin,
    Destination,
}

impl Axis {
    pub fn flip(self) -> Self {
        match self {
            Self::Origin => Self::Destination,
            Self::Destination => Self::Origin,
        }
    }

    /// The region of `pair` that lies on this axis.
    pub fn of<'a>(&self, pair: &'a OdPair) -> &'a str {
        match self {
            Self::Origin => &pair.origin,
            Self::Destination => &pair.destination,
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Origin => write!(f, "origin"),
            Self::Destination => write!(f, "destination"),
        }
    }
}

/// Per-product outcome of the balancing loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvergenceDiagnostics {
    pub product: String,
    pub converged: bool,
    pub iterations_used: usize,
    /// Last observed `max |1 - f|` over the scaled axis.
    pub residual: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EstimateSummary {
    pub products: usize,
    pub converged: usize,
    pub not_converged: usize,
    pub not_converged_products: Vec<String>,
    pub max_residual: f64,
    pub total_production: f64,
    pub total_consumption: f64,
    pub total_flow: f64,
    pub flow_cells: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EstimateMeta {
    pub config_name: String,
    pub prior_source: String,
    pub regions: usize,
    pub engine_version: String,
    pub run_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EstimateResult {
    pub meta: EstimateMeta,
    pub summary: EstimateSummary,
    pub diagnostics: Vec<ConvergenceDiagnostics>,
    pub flows: FlowTable,
}

use std::collections::{BTreeMap, BTreeSet};

use log::warn;
use serde::ser::{Serialize, SerializeSeq, Serializer};

use crate::model::{Axis, OdMatrix, OdPair};

/// Flow key = (product, origin, destination).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct FlowKey {
    pub product: String,
    pub origin: String,
    pub destination: String,
}

/// One long-form row of the flow table.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FlowRow<'a> {
    pub product: &'a str,
    pub origin: &'a str,
    pub destination: &'a str,
    pub quantity: f64,
}

/// (product, origin, destination) → quantity, ordered by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowTable {
    flows: BTreeMap<FlowKey, f64>,
}

/// Fold per-product balanced matrices into one table.
///
/// A key seen twice is summed; that only happens when an upstream step
/// produced the same product twice, so it is logged.
pub fn assemble<I>(balanced: I) -> FlowTable
where
    I: IntoIterator<Item = (String, OdMatrix)>,
{
    let mut table = FlowTable::new();
    let mut duplicates = 0usize;
    for (product, matrix) in balanced {
        for (pair, quantity) in matrix.iter() {
            if table.add(&product, &pair.origin, &pair.destination, quantity) {
                duplicates += 1;
            }
        }
    }
    if duplicates > 0 {
        warn!("flow table: {duplicates} duplicate (product, origin, destination) keys summed");
    }
    table
}

impl FlowTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add to a key; returns true when the key was already present.
    pub fn add(&mut self, product: &str, origin: &str, destination: &str, quantity: f64) -> bool {
        let key = FlowKey {
            product: product.to_string(),
            origin: origin.to_string(),
            destination: destination.to_string(),
        };
        match self.flows.get_mut(&key) {
            Some(existing) => {
                *existing += quantity;
                true
            }
            None => {
                self.flows.insert(key, quantity);
                false
            }
        }
    }

    pub fn get(&self, product: &str, origin: &str, destination: &str) -> Option<f64> {
        self.flows
            .get(&FlowKey {
                product: product.to_string(),
                origin: origin.to_string(),
                destination: destination.to_string(),
            })
            .copied()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FlowKey, f64)> {
        self.flows.iter().map(|(k, v)| (k, *v))
    }

    pub fn rows(&self) -> impl Iterator<Item = FlowRow<'_>> {
        self.flows.iter().map(|(k, v)| FlowRow {
            product: &k.product,
            origin: &k.origin,
            destination: &k.destination,
            quantity: *v,
        })
    }

    pub fn products(&self) -> BTreeSet<&str> {
        self.flows.keys().map(|k| k.product.as_str()).collect()
    }

    pub fn total(&self) -> f64 {
        self.flows.values().sum()
    }

    pub fn product_total(&self, product: &str) -> f64 {
        self.flows
            .iter()
            .filter(|(k, _)| k.product == product)
            .map(|(_, v)| v)
            .sum()
    }

    /// Flows of the listed products only. An empty list selects everything.
    pub fn select(&self, products: &[&str]) -> FlowTable {
        let flows = self
            .flows
            .iter()
            .filter(|(k, _)| selected(products, &k.product))
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        FlowTable { flows }
    }

    /// Per-pair totals over the selected products, keeping totals above `threshold`.
    pub fn pair_totals(&self, products: &[&str], threshold: f64) -> BTreeMap<OdPair, f64> {
        let mut totals: BTreeMap<OdPair, f64> = BTreeMap::new();
        for (k, v) in &self.flows {
            if selected(products, &k.product) {
                *totals.entry(OdPair::new(&k.origin, &k.destination)).or_insert(0.0) += v;
            }
        }
        totals.retain(|_, v| *v > threshold);
        totals
    }

    /// Flows with `region` on `axis`, keyed by the region at the other end.
    ///
    /// `slice(Axis::Origin, "A", ..)` is everything shipped out of A, per destination.
    pub fn slice(&self, axis: Axis, region: &str, products: &[&str]) -> BTreeMap<String, f64> {
        let other = axis.flip();
        let mut out: BTreeMap<String, f64> = BTreeMap::new();
        for (k, v) in &self.flows {
            if !selected(products, &k.product) {
                continue;
            }
            let pair = OdPair::new(&k.origin, &k.destination);
            if axis.of(&pair) == region {
                *out.entry(other.of(&pair).to_string()).or_insert(0.0) += v;
            }
        }
        out
    }

    /// Total flow per region along `axis` (outbound for origin, inbound for destination).
    pub fn region_totals(&self, axis: Axis, products: &[&str]) -> BTreeMap<String, f64> {
        let mut out: BTreeMap<String, f64> = BTreeMap::new();
        for (k, v) in &self.flows {
            if !selected(products, &k.product) {
                continue;
            }
            let region = match axis {
                Axis::Origin => &k.origin,
                Axis::Destination => &k.destination,
            };
            *out.entry(region.clone()).or_insert(0.0) += v;
        }
        out
    }
}

fn selected(products: &[&str], product: &str) -> bool {
    products.is_empty() || products.contains(&product)
}

impl Serialize for FlowTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.flows.len()))?;
        for row in self.rows() {
            seq.serialize_element(&row)?;
        }
        seq.end()
    }
}

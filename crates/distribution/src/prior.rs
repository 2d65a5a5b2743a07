use std::collections::BTreeMap;

use log::{debug, warn};

use crate::error::DistributionError;
use crate::model::{ImpedanceMatrix, OdPair, Prior, RegionUniverse, SampleRow};
use crate::recode::CodeLookup;
use crate::resolve::LabelResolver;

/// Empirical pair frequencies of an observed O-D sample, normalized to sum 1.
///
/// Codes are recoded first (when a lookup is given); rows with an end outside
/// the universe or a non-positive weight are skipped. An empty result is not
/// an error: every seed cell then falls back to the floor value.
pub fn empirical_prior(
    rows: &[SampleRow],
    universe: &RegionUniverse,
    recode: Option<&CodeLookup>,
) -> Result<Prior, DistributionError> {
    let mut weights: BTreeMap<OdPair, f64> = BTreeMap::new();
    let mut outside = 0usize;

    for row in rows {
        let missing = |field: &'static str| DistributionError::MissingField {
            table: "sample".into(),
            line: row.line,
            field,
        };
        let origin = row.origin.as_deref().ok_or_else(|| missing("origin"))?;
        let destination = row.destination.as_deref().ok_or_else(|| missing("destination"))?;
        let weight = row.weight.ok_or_else(|| missing("weight"))?;
        if !weight.is_finite() {
            return Err(DistributionError::InvalidQuantity {
                table: "sample".into(),
                line: row.line,
                value: weight.to_string(),
            });
        }

        let (origin, destination) = match recode {
            Some(lookup) => (lookup.apply(origin.trim()), lookup.apply(destination.trim())),
            None => (origin.trim(), destination.trim()),
        };

        if !universe.contains(origin) || !universe.contains(destination) {
            outside += 1;
            continue;
        }
        if weight <= 0.0 {
            continue;
        }

        *weights.entry(OdPair::new(origin, destination)).or_insert(0.0) += weight;
    }

    debug!(
        "empirical prior: {} sample rows -> {} pairs, {outside} outside the region universe",
        rows.len(),
        weights.len()
    );
    if weights.is_empty() {
        warn!("empirical prior is empty: no sample row falls inside the region universe");
    }

    Ok(Prior::from_weights(weights).normalized())
}

/// Prior derived from an external impedance matrix.
///
/// Labels are resolved to region ids with `resolver`; cells landing on the same
/// (origin, destination) pair are averaged. With `invert`, values are treated
/// as costs and positive cells become `1 / value`. Normalized to sum 1.
pub fn impedance_prior(
    matrix: &ImpedanceMatrix,
    resolver: &LabelResolver,
    invert: bool,
) -> Result<Prior, DistributionError> {
    let ids = matrix
        .labels()
        .iter()
        .map(|label| resolver.resolve(label).map(|r| r.id))
        .collect::<Result<Vec<_>, _>>()?;

    let mut sums: BTreeMap<OdPair, (f64, usize)> = BTreeMap::new();
    for (i, origin) in ids.iter().enumerate() {
        for (j, destination) in ids.iter().enumerate() {
            let raw = matrix.value(i, j);
            let value = if invert {
                if raw > 0.0 {
                    1.0 / raw
                } else {
                    0.0
                }
            } else {
                raw
            };
            let entry = sums.entry(OdPair::new(origin, destination)).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }

    let duplicates = sums.values().filter(|(_, n)| *n > 1).count();
    if duplicates > 0 {
        debug!("impedance prior: {duplicates} pairs averaged over several labels");
    }

    let weights = sums
        .into_iter()
        .map(|(pair, (sum, n))| (pair, sum / n as f64))
        .collect();
    Ok(Prior::from_weights(weights).normalized())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn universe() -> RegionUniverse {
        RegionUniverse::from_ids(["A", "B", "C"])
    }

    #[test]
    fn empirical_frequencies_sum_to_one() {
        let rows = vec![
            SampleRow::new("A", "B", 30.0),
            SampleRow::new("A", "B", 10.0),
            SampleRow::new("B", "C", 40.0),
            SampleRow::new("C", "C", 20.0),
        ];
        let prior = empirical_prior(&rows, &universe(), None).unwrap();
        assert!((prior.total() - 1.0).abs() < 1e-9);
        assert!((prior.get("A", "B").unwrap() - 0.4).abs() < 1e-12);
        assert!((prior.get("B", "C").unwrap() - 0.4).abs() < 1e-12);
        assert!((prior.get("C", "C").unwrap() - 0.2).abs() < 1e-12);
        assert_eq!(prior.get("B", "A"), None);
    }

    #[test]
    fn outside_universe_and_non_positive_skipped() {
        let rows = vec![
            SampleRow::new("A", "B", 10.0),
            SampleRow::new("A", "Z", 50.0),
            SampleRow::new("B", "A", 0.0),
            SampleRow::new("B", "C", -4.0),
        ];
        let prior = empirical_prior(&rows, &universe(), None).unwrap();
        assert_eq!(prior.len(), 1);
        assert_eq!(prior.get("A", "B"), Some(1.0));
    }

    #[test]
    fn recode_applied_before_filtering() {
        let lookup = CodeLookup::from_revisions(vec![("OLD_A".into(), "A".into(), 2016)]);
        let rows = vec![SampleRow::new("OLD_A", "B", 5.0), SampleRow::new("A", "B", 5.0)];
        let prior = empirical_prior(&rows, &universe(), Some(&lookup)).unwrap();
        assert_eq!(prior.get("A", "B"), Some(1.0));
    }

    #[test]
    fn empty_sample_gives_empty_prior() {
        let prior = empirical_prior(&[], &universe(), None).unwrap();
        assert!(prior.is_empty());
        assert_eq!(prior.total(), 0.0);
    }

    #[test]
    fn missing_weight_is_data_error() {
        let mut row = SampleRow::new("A", "B", 1.0);
        row.weight = None;
        let err = empirical_prior(&[row], &universe(), None).unwrap_err();
        assert!(err.is_data_error());
    }

    fn named_universe() -> RegionUniverse {
        RegionUniverse::new(vec![
            crate::model::Region::new("N1", "North Region"),
            crate::model::Region::new("S1", "South Region"),
        ])
    }

    #[test]
    fn impedance_labels_resolved_and_normalized() {
        let matrix = ImpedanceMatrix::new(
            vec!["North Regio".into(), "Sout Region".into()],
            vec![vec![1.0, 3.0], vec![3.0, 1.0]],
        )
        .unwrap();
        let resolver = LabelResolver::new(named_universe().name_lookup());
        let prior = impedance_prior(&matrix, &resolver, false).unwrap();
        assert!((prior.total() - 1.0).abs() < 1e-9);
        assert!((prior.get("N1", "S1").unwrap() - 0.375).abs() < 1e-12);
        assert!((prior.get("N1", "N1").unwrap() - 0.125).abs() < 1e-12);
    }

    #[test]
    fn impedance_duplicates_averaged() {
        // Two labels resolve to the north region: their cells are averaged.
        let matrix = ImpedanceMatrix::new(
            vec!["North Region".into(), "North Regio".into(), "South Region".into()],
            vec![
                vec![0.0, 0.0, 2.0],
                vec![0.0, 0.0, 4.0],
                vec![6.0, 6.0, 0.0],
            ],
        )
        .unwrap();
        let resolver = LabelResolver::new(named_universe().name_lookup());
        let prior = impedance_prior(&matrix, &resolver, false).unwrap();
        // N1->S1 = mean(2, 4) = 3, S1->N1 = mean(6, 6) = 6, total 9
        assert!((prior.get("N1", "S1").unwrap() - 3.0 / 9.0).abs() < 1e-12);
        assert!((prior.get("S1", "N1").unwrap() - 6.0 / 9.0).abs() < 1e-12);
        assert_eq!(prior.get("N1", "N1"), Some(0.0));
    }

    #[test]
    fn impedance_inverted_costs() {
        let matrix = ImpedanceMatrix::new(
            vec!["North Region".into(), "South Region".into()],
            vec![vec![0.0, 1.0], vec![4.0, 0.0]],
        )
        .unwrap();
        let resolver = LabelResolver::new(named_universe().name_lookup());
        let prior = impedance_prior(&matrix, &resolver, true).unwrap();
        // 1/1 and 1/4, zero cost stays zero
        assert!((prior.get("N1", "S1").unwrap() - 0.8).abs() < 1e-12);
        assert!((prior.get("S1", "N1").unwrap() - 0.2).abs() < 1e-12);
        assert_eq!(prior.get("N1", "N1"), Some(0.0));
    }

    #[test]
    fn impedance_threshold_propagates() {
        let matrix =
            ImpedanceMatrix::new(vec!["Elsewhere".into()], vec![vec![1.0]]).unwrap();
        let resolver =
            LabelResolver::new(named_universe().name_lookup()).with_min_similarity(Some(0.9));
        let err = impedance_prior(&matrix, &resolver, false).unwrap_err();
        assert!(matches!(err, DistributionError::AmbiguousMatch { .. }));
    }
}

use std::collections::BTreeSet;

use log::info;

use crate::aggregate::{aggregate_marginals, normalize_to};
use crate::assemble::assemble;
use crate::config::{EstimateConfig, PriorSource};
use crate::error::DistributionError;
use crate::evidence::compute_summary;
use crate::model::{EstimateInput, EstimateMeta, EstimateResult, OdMatrix, Prior, PriorInput, RegionUniverse};
use crate::prior::{empirical_prior, impedance_prior};
use crate::resolve::LabelResolver;
use crate::seed::build_seed;

/// Run an estimation per config. Returns the flow table, per-product
/// diagnostics and a summary.
pub fn run(config: &EstimateConfig, input: &EstimateInput) -> Result<EstimateResult, DistributionError> {
    let universe = input
        .regions
        .filter(config.regions.level, config.regions.country.as_deref());
    if universe.is_empty() {
        return Err(DistributionError::EmptyUniverse {
            level: config.regions.level,
            country: config.regions.country.clone(),
        });
    }

    // Marginals outside the universe have nowhere to go.
    let mut production = aggregate_marginals("production", &input.production, config.production.year)?
        .restrict_to(&universe);
    let consumption = aggregate_marginals("consumption", &input.consumption, config.consumption.year)?
        .restrict_to(&universe);
    if config.balancing.normalize_production {
        normalize_to(&mut production, &consumption);
    }

    let prior = build_prior(config, &input.prior, &universe)?;

    let products: BTreeSet<String> = production
        .products()
        .into_iter()
        .chain(consumption.products())
        .map(String::from)
        .collect();

    let jobs: Vec<(String, OdMatrix)> = products
        .into_iter()
        .map(|product| {
            let seed = build_seed(
                &product,
                &production,
                &consumption,
                &prior,
                &universe,
                config.balancing.seed_floor,
            );
            (product, seed)
        })
        .collect();

    let balanced = config
        .balancing
        .furness()
        .balance_products(jobs, &production, &consumption);

    let mut diagnostics = Vec::with_capacity(balanced.len());
    let mut matrices = Vec::with_capacity(balanced.len());
    for (product, b) in balanced {
        diagnostics.push(b.diagnostics);
        matrices.push((product, b.matrix));
    }

    let flows = assemble(matrices);
    let summary = compute_summary(&diagnostics, &production, &consumption, &flows);

    info!(
        "{}: {} products over {} regions, {} converged, {} not converged",
        config.name,
        summary.products,
        universe.len(),
        summary.converged,
        summary.not_converged
    );

    Ok(EstimateResult {
        meta: EstimateMeta {
            config_name: config.name.clone(),
            prior_source: config.prior.source.to_string(),
            regions: universe.len(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        summary,
        diagnostics,
        flows,
    })
}

/// Build the distribution prior from whichever input the config declares.
pub fn build_prior(
    config: &EstimateConfig,
    input: &PriorInput,
    universe: &RegionUniverse,
) -> Result<Prior, DistributionError> {
    match (config.prior.source, input) {
        (PriorSource::Empirical, PriorInput::Sample { rows, recode }) => {
            empirical_prior(rows, universe, recode.as_ref())
        }
        (PriorSource::Impedance, PriorInput::Impedance(matrix)) => {
            let resolver = LabelResolver::new(universe.name_lookup())
                .with_min_similarity(config.prior.min_similarity);
            impedance_prior(matrix, &resolver, config.prior.invert)
        }
        (source, _) => Err(DistributionError::ConfigValidation(format!(
            "prior source is \"{source}\" but the loaded prior input is of another kind"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::{load_impedance, load_records, load_regions, load_sample};
    use crate::model::{ImpedanceMatrix, RawRecord, Region, SampleRow};

    const TWO_REGIONS: &str = r#"
name = "Two regions"

[regions]
file = "regions.csv"

[production]
file = "p.csv"

[consumption]
file = "c.csv"

[prior]
source = "empirical"
file = "survey.csv"
"#;

    fn two_region_input() -> EstimateInput {
        EstimateInput {
            regions: RegionUniverse::from_ids(["A", "B"]),
            production: vec![RawRecord::new("X", "A", 10.0), RawRecord::new("X", "B", 0.0)],
            consumption: vec![RawRecord::new("X", "A", 0.0), RawRecord::new("X", "B", 10.0)],
            prior: PriorInput::Sample {
                rows: vec![SampleRow::new("A", "B", 1.0)],
                recode: None,
            },
        }
    }

    #[test]
    fn two_region_end_to_end() {
        let config = EstimateConfig::from_toml(TWO_REGIONS).unwrap();
        let result = run(&config, &two_region_input()).unwrap();

        assert_eq!(result.meta.config_name, "Two regions");
        assert_eq!(result.meta.prior_source, "empirical");
        assert_eq!(result.meta.regions, 2);
        assert_eq!(result.diagnostics.len(), 1);
        let d = &result.diagnostics[0];
        assert!(d.converged);
        assert!(d.iterations_used <= 2);

        let flows = &result.flows;
        assert_eq!(flows.len(), 4);
        assert!((flows.get("X", "A", "B").unwrap() - 10.0).abs() <= 0.5);
        assert!(flows.get("X", "A", "A").unwrap() < 0.01);
        assert!(flows.get("X", "B", "A").unwrap() < 0.01);
        assert!(flows.get("X", "B", "B").unwrap() < 0.01);

        assert_eq!(result.summary.products, 1);
        assert_eq!(result.summary.converged, 1);
        assert_eq!(result.summary.total_production, 10.0);
    }

    #[test]
    fn empty_universe_is_an_error() {
        let input = TWO_REGIONS.replace("file = \"regions.csv\"", "file = \"regions.csv\"\nlevel = 3");
        let config = EstimateConfig::from_toml(&input).unwrap();
        let err = run(&config, &two_region_input()).unwrap_err();
        assert_eq!(
            err,
            DistributionError::EmptyUniverse {
                level: Some(3),
                country: None
            }
        );
    }

    #[test]
    fn data_error_aborts_run() {
        let config = EstimateConfig::from_toml(TWO_REGIONS).unwrap();
        let mut input = two_region_input();
        input.production[0].region = None;
        let err = run(&config, &input).unwrap_err();
        assert!(err.is_data_error());
    }

    #[test]
    fn consumed_only_product_reported_not_converged() {
        let config = EstimateConfig::from_toml(TWO_REGIONS).unwrap();
        let mut input = two_region_input();
        // Consumed but never produced: every row target is 0.
        input.consumption.push(RawRecord::new("Y", "A", 5.0));
        let result = run(&config, &input).unwrap();

        let products: Vec<_> = result.diagnostics.iter().map(|d| d.product.as_str()).collect();
        assert_eq!(products, vec!["X", "Y"]);
        assert!(result.flows.product_total("Y") < 1e-9);

        let y = &result.diagnostics[1];
        assert!(!y.converged);
        assert_eq!(y.iterations_used, config.balancing.max_iterations);
        assert!(result.diagnostics[0].converged);
        assert_eq!(result.summary.not_converged, 1);
        assert_eq!(result.summary.not_converged_products, vec!["Y".to_string()]);
    }

    #[test]
    fn prior_kind_must_match_config() {
        let config = EstimateConfig::from_toml(TWO_REGIONS).unwrap();
        let mut input = two_region_input();
        input.prior = PriorInput::Impedance(
            ImpedanceMatrix::new(vec!["A".into()], vec![vec![1.0]]).unwrap(),
        );
        let err = run(&config, &input).unwrap_err();
        assert!(matches!(err, DistributionError::ConfigValidation(_)));
    }

    #[test]
    fn impedance_run_with_named_regions() {
        let toml = r#"
name = "Impedance"

[regions]
file = "nuts.csv"
level = 3
country = "EL"

[production]
file = "p.csv"

[consumption]
file = "c.csv"

[prior]
source = "impedance"
file = "friction.csv"
invert = true
"#;
        let config = EstimateConfig::from_toml(toml).unwrap();

        let regions_csv = "\
NUTS_ID,NUTS_NAME,LEVL_CODE,CNTR_CODE
EL1,North Region,3,EL
EL2,South Region,3,EL
EL0,Whole Country,2,EL
";
        let production_csv = "\
product_name,nuts,quantity
wheat,EL1,80
wheat,EL2,20
wheat,EL0,1000
";
        let consumption_csv = "\
product_name,nuts,quantity
wheat,EL1,40
wheat,EL2,60
";
        let friction_csv = "\
,North Regio,South Regoin
North Regio,1,2
South Regoin,2,1
";

        let input = EstimateInput {
            regions: load_regions(regions_csv, &config.regions).unwrap(),
            production: load_records("production", production_csv, &config.production).unwrap(),
            consumption: load_records("consumption", consumption_csv, &config.consumption).unwrap(),
            prior: PriorInput::Impedance(load_impedance(friction_csv, &config.prior).unwrap()),
        };

        let result = run(&config, &input).unwrap();
        assert_eq!(result.meta.regions, 2);
        assert_eq!(result.meta.prior_source, "impedance");
        // EL0 is outside the universe.
        assert_eq!(result.summary.total_production, 100.0);
        assert!(result.diagnostics[0].converged);

        let out_of_north = result.flows.slice(crate::model::Axis::Origin, "EL1", &[]);
        let total: f64 = out_of_north.values().sum();
        assert!((total - 80.0).abs() <= 80.0 * 0.05);
    }

    #[test]
    fn empirical_run_from_loaded_sample() {
        let config = EstimateConfig::from_toml(TWO_REGIONS).unwrap();
        let sample_csv = "\
origin_nuts,destination_nuts,loaded_weight_kg
A,A,200
A,B,300
B,A,100
B,B,200
A,Z,999
";
        let rows = load_sample(sample_csv, &config.prior).unwrap();
        let input = EstimateInput {
            regions: RegionUniverse::new(vec![Region::new("A", "Alpha"), Region::new("B", "Beta")]),
            production: vec![RawRecord::new("X", "A", 6.0), RawRecord::new("X", "B", 4.0)],
            consumption: vec![RawRecord::new("X", "A", 5.0), RawRecord::new("X", "B", 5.0)],
            prior: PriorInput::Sample { rows, recode: None },
        };
        let result = run(&config, &input).unwrap();
        assert!(result.diagnostics[0].converged);
        assert!((result.flows.total() - 10.0).abs() < 0.5);
    }
}

//! `odflow estimate` and `odflow validate`: config-driven flow estimation.

use std::path::{Path, PathBuf};

use odflow_distribution::config::PriorSource;
use odflow_distribution::load::{load_impedance, load_records, load_regions, load_revisions, load_sample};
use odflow_distribution::{EstimateConfig, EstimateInput, EstimateResult, PriorInput};

use crate::exit_codes::{EXIT_ESTIMATE_INVALID_CONFIG, EXIT_ESTIMATE_NOT_CONVERGED};
use crate::util::{fmt_quantity, pad_right, to_json};
use crate::CliError;

fn read_config(config_path: &Path) -> Result<EstimateConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path)
        .map_err(|e| CliError::io(format!("cannot read config: {e}")))?;
    EstimateConfig::from_toml(&config_str)
        .map_err(|e| CliError::new(EXIT_ESTIMATE_INVALID_CONFIG, e.to_string()))
}

fn read_input(base_dir: &Path, file: &str) -> Result<String, CliError> {
    let path = base_dir.join(file);
    std::fs::read_to_string(&path)
        .map_err(|e| CliError::io(format!("cannot read {}: {e}", path.display())))
}

/// Load every input named by the config. Relative paths resolve against
/// the config file's directory.
fn load_input(config: &EstimateConfig, base_dir: &Path) -> Result<EstimateInput, CliError> {
    let regions = load_regions(&read_input(base_dir, &config.regions.file)?, &config.regions)
        .map_err(CliError::engine)?;
    let production = load_records(
        "production",
        &read_input(base_dir, &config.production.file)?,
        &config.production,
    )
    .map_err(CliError::engine)?;
    let consumption = load_records(
        "consumption",
        &read_input(base_dir, &config.consumption.file)?,
        &config.consumption,
    )
    .map_err(CliError::engine)?;

    let prior_data = read_input(base_dir, &config.prior.file)?;
    let prior = match config.prior.source {
        PriorSource::Empirical => {
            let rows = load_sample(&prior_data, &config.prior).map_err(CliError::engine)?;
            let recode = match config.prior.recode {
                Some(ref recode) => Some(
                    load_revisions(&read_input(base_dir, &recode.file)?, recode).map_err(CliError::engine)?,
                ),
                None => None,
            };
            PriorInput::Sample { rows, recode }
        }
        PriorSource::Impedance => {
            PriorInput::Impedance(load_impedance(&prior_data, &config.prior).map_err(CliError::engine)?)
        }
    };

    Ok(EstimateInput { regions, production, consumption, prior })
}

pub(crate) fn cmd_estimate(
    config_path: PathBuf,
    json_output: bool,
    flows_file: Option<PathBuf>,
    result_file: Option<PathBuf>,
    strict: bool,
) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

    let input = load_input(&config, base_dir)?;
    let result = odflow_distribution::run(&config, &input).map_err(CliError::engine)?;

    // Flags win over [output]; config paths are relative to the config file.
    let flows_path = flows_file.or_else(|| config.output.flows.as_ref().map(|f| base_dir.join(f)));
    let result_path = result_file.or_else(|| config.output.result.as_ref().map(|f| base_dir.join(f)));

    if let Some(ref path) = flows_path {
        write_flows(path, &result)?;
        eprintln!("wrote {}", path.display());
    }

    let needs_json = json_output || result_path.is_some();
    if needs_json {
        let json_str = to_json(&result)?;

        if let Some(ref path) = result_path {
            std::fs::write(path, &json_str)
                .map_err(|e| CliError::io(format!("cannot write result: {e}")))?;
            eprintln!("wrote {}", path.display());
        }
        if json_output {
            println!("{json_str}");
        }
    }

    print_summary(&result);

    let s = &result.summary;
    if s.not_converged > 0 && strict {
        return Err(CliError::new(
            EXIT_ESTIMATE_NOT_CONVERGED,
            format!("{} product(s) did not converge: {}", s.not_converged, s.not_converged_products.join(", ")),
        )
        .with_hint("raise balancing.max_iterations or check that production and consumption totals agree"));
    }

    Ok(())
}

/// Long-form flow table: `product,origin,destination,quantity`.
fn write_flows(path: &Path, result: &EstimateResult) -> Result<(), CliError> {
    let io_err = |e: csv::Error| CliError::io(format!("cannot write {}: {e}", path.display()));

    let mut wtr = csv::Writer::from_path(path).map_err(io_err)?;
    for row in result.flows.rows() {
        wtr.serialize(row).map_err(io_err)?;
    }
    wtr.flush()
        .map_err(|e| CliError::io(format!("cannot write {}: {e}", path.display())))
}

/// Human summary to stderr.
fn print_summary(result: &EstimateResult) {
    let s = &result.summary;
    eprintln!(
        "estimate '{}': {} products over {} regions ({} prior), {} converged, {} not converged",
        result.meta.config_name,
        s.products,
        result.meta.regions,
        result.meta.prior_source,
        s.converged,
        s.not_converged,
    );
    eprintln!(
        "production {}, consumption {}, flow {} in {} cells",
        fmt_quantity(s.total_production),
        fmt_quantity(s.total_consumption),
        fmt_quantity(s.total_flow),
        s.flow_cells,
    );

    if s.not_converged == 0 {
        return;
    }
    eprintln!();
    eprintln!("  {} {} residual", pad_right("product", 24), pad_right("iterations", 10));
    for d in result.diagnostics.iter().filter(|d| !d.converged) {
        eprintln!(
            "  {} {} {:.4}",
            pad_right(&d.product, 24),
            pad_right(&d.iterations_used.to_string(), 10),
            d.residual
        );
    }
}

pub(crate) fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    eprintln!(
        "valid: estimate '{}' with {} prior, tolerance {}, max {} iterations",
        config.name, config.prior.source, config.balancing.tolerance, config.balancing.max_iterations,
    );
    Ok(())
}

//! `odflow resolve`: preview how free-text labels map onto region names.

use std::path::PathBuf;

use odflow_distribution::config::{RegionColumns, RegionsConfig};
use odflow_distribution::load::load_regions;
use odflow_distribution::resolve::{LabelResolver, Resolution};
use odflow_distribution::DistributionError;
use serde::Serialize;

use crate::exit_codes::EXIT_RESOLVE_AMBIGUOUS;
use crate::util::{pad_right, to_json};
use crate::CliError;

#[derive(Serialize)]
struct ResolveRow {
    label: String,
    name: Option<String>,
    id: Option<String>,
    score: f64,
    accepted: bool,
}

impl From<Resolution> for ResolveRow {
    fn from(r: Resolution) -> Self {
        Self {
            label: r.label,
            name: Some(r.name),
            id: Some(r.id),
            score: r.score,
            accepted: true,
        }
    }
}

pub(crate) struct ResolveArgs {
    pub regions: PathBuf,
    pub labels: Vec<String>,
    pub level: Option<u8>,
    pub country: Option<String>,
    pub delimiter: char,
    pub min_similarity: Option<f64>,
    pub json: bool,
}

pub(crate) fn cmd_resolve(args: ResolveArgs) -> Result<(), CliError> {
    if !args.delimiter.is_ascii() {
        return Err(CliError::usage(format!("delimiter must be ASCII, got '{}'", args.delimiter)));
    }
    if let Some(min) = args.min_similarity {
        if !(0.0..=1.0).contains(&min) {
            return Err(CliError::usage(format!("--min-similarity must be within [0, 1], got {min}")));
        }
    }

    let cfg = RegionsConfig {
        file: args.regions.display().to_string(),
        delimiter: args.delimiter.to_string(),
        level: args.level,
        country: args.country.clone(),
        columns: RegionColumns::default(),
    };
    let csv_data = std::fs::read_to_string(&args.regions)
        .map_err(|e| CliError::io(format!("cannot read {}: {e}", args.regions.display())))?;
    let universe = load_regions(&csv_data, &cfg)
        .map_err(CliError::engine)?
        .filter(args.level, args.country.as_deref());
    if universe.is_empty() {
        return Err(CliError::engine(DistributionError::EmptyUniverse {
            level: args.level,
            country: args.country,
        }));
    }

    let resolver = LabelResolver::new(universe.name_lookup()).with_min_similarity(args.min_similarity);

    let mut rows = Vec::with_capacity(args.labels.len());
    let mut rejected = 0usize;
    for label in &args.labels {
        match resolver.resolve(label) {
            Ok(resolution) => rows.push(ResolveRow::from(resolution)),
            Err(DistributionError::AmbiguousMatch { best, score, .. }) => {
                rejected += 1;
                let id = best
                    .as_deref()
                    .and_then(|name| universe.regions().iter().find(|r| r.name == name))
                    .map(|r| r.id.clone());
                rows.push(ResolveRow { label: label.clone(), name: best, id, score, accepted: false });
            }
            Err(e) => return Err(CliError::engine(e)),
        }
    }

    if args.json {
        let json_str = to_json(&rows)?;
        println!("{json_str}");
    } else {
        println!(
            "{} {} {} score",
            pad_right("label", 28),
            pad_right("name", 28),
            pad_right("id", 8)
        );
        for row in &rows {
            let mark = if row.accepted { "" } else { "  (rejected)" };
            println!(
                "{} {} {} {:.3}{mark}",
                pad_right(&row.label, 28),
                pad_right(row.name.as_deref().unwrap_or("-"), 28),
                pad_right(row.id.as_deref().unwrap_or("-"), 8),
                row.score
            );
        }
    }

    if rejected > 0 {
        return Err(CliError::new(
            EXIT_RESOLVE_AMBIGUOUS,
            format!("{rejected} label(s) below minimum similarity"),
        ));
    }
    Ok(())
}

//! CSV text → engine input records.
//!
//! Loaders take the file contents, never a path. Line numbers are 1-based
//! and count the header, so they match what an editor shows.

use log::debug;

use crate::config::{delimiter_byte, MarginalSource, PriorConfig, RecodeConfig, RegionsConfig};
use crate::error::DistributionError;
use crate::model::{ImpedanceMatrix, RawRecord, Region, RegionUniverse, SampleRow};
use crate::recode::CodeLookup;

fn reader<'a>(csv_data: &'a str, delimiter: &str) -> csv::Reader<&'a [u8]> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter_byte(delimiter))
        .trim(csv::Trim::Headers)
        .from_reader(csv_data.as_bytes())
}

fn headers(reader: &mut csv::Reader<&[u8]>) -> Result<Vec<String>, DistributionError> {
    Ok(reader.headers()?.iter().map(|h| h.to_string()).collect())
}

fn column(headers: &[String], table: &str, name: &str) -> Result<usize, DistributionError> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| DistributionError::MissingColumn {
            table: table.into(),
            column: name.into(),
        })
}

fn line_of(record: &csv::StringRecord, fallback: usize) -> usize {
    record
        .position()
        .map(|p| p.line() as usize)
        .unwrap_or(fallback)
}

/// Cell text, or `None` when the cell is blank or absent.
fn text(record: &csv::StringRecord, idx: usize) -> Option<String> {
    record
        .get(idx)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Parse a numeric cell; blank is `None`, unparsable is an error.
fn number<T: std::str::FromStr>(
    record: &csv::StringRecord,
    idx: usize,
    table: &str,
    line: usize,
) -> Result<Option<T>, DistributionError> {
    match record.get(idx).map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| DistributionError::InvalidQuantity {
            table: table.into(),
            line,
            value: raw.into(),
        }),
    }
}

/// Load the boundary table. Level and country columns are optional unless
/// the config filters on them.
pub fn load_regions(
    csv_data: &str,
    cfg: &RegionsConfig,
) -> Result<RegionUniverse, DistributionError> {
    let table = "regions";
    let mut rdr = reader(csv_data, &cfg.delimiter);
    let headers = headers(&mut rdr)?;
    let col = &cfg.columns;

    let id_idx = column(&headers, table, &col.id)?;
    let name_idx = column(&headers, table, &col.name)?;
    let level_idx = match cfg.level {
        Some(_) => Some(column(&headers, table, &col.level)?),
        None => headers.iter().position(|h| *h == col.level),
    };
    let country_idx = match cfg.country {
        Some(_) => Some(column(&headers, table, &col.country)?),
        None => headers.iter().position(|h| *h == col.country),
    };

    let mut regions = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        let line = line_of(&record, i + 2);

        let id = text(&record, id_idx).ok_or_else(|| DistributionError::MissingField {
            table: table.into(),
            line,
            field: "id",
        })?;
        let name = text(&record, name_idx).unwrap_or_else(|| id.clone());

        let mut region = Region::new(id, name);
        if let Some(idx) = level_idx {
            if let Some(level) = number::<u8>(&record, idx, table, line)? {
                region = region.with_level(level);
            }
        }
        if let Some(country) = country_idx.and_then(|idx| text(&record, idx)) {
            region = region.with_country(country);
        }
        regions.push(region);
    }

    debug!("{table}: loaded {} regions", regions.len());
    Ok(RegionUniverse::new(regions))
}

/// Load production or consumption records. Missing cells become `None` and
/// are reported by the aggregator with their line.
pub fn load_records(
    table: &str,
    csv_data: &str,
    cfg: &MarginalSource,
) -> Result<Vec<RawRecord>, DistributionError> {
    let mut rdr = reader(csv_data, &cfg.delimiter);
    let headers = headers(&mut rdr)?;
    let col = &cfg.columns;

    let product_idx = column(&headers, table, &col.product)?;
    let region_idx = column(&headers, table, &col.region)?;
    let quantity_idx = column(&headers, table, &col.quantity)?;
    // The year column is only required when filtering by year.
    let year_idx = match cfg.year {
        Some(_) => Some(column(&headers, table, &col.year)?),
        None => None,
    };

    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        let line = line_of(&record, i + 2);

        let year = match year_idx {
            Some(idx) => number::<i32>(&record, idx, table, line)?,
            None => None,
        };
        rows.push(RawRecord {
            line,
            product: text(&record, product_idx),
            region: text(&record, region_idx),
            quantity: number::<f64>(&record, quantity_idx, table, line)?,
            year,
        });
    }

    Ok(rows)
}

/// Load the O-D sample, applying the configured row filter.
pub fn load_sample(csv_data: &str, cfg: &PriorConfig) -> Result<Vec<SampleRow>, DistributionError> {
    let table = "sample";
    let mut rdr = reader(csv_data, &cfg.delimiter);
    let headers = headers(&mut rdr)?;
    let col = &cfg.columns;

    let origin_idx = column(&headers, table, &col.origin)?;
    let destination_idx = column(&headers, table, &col.destination)?;
    let weight_idx = column(&headers, table, &col.weight)?;
    let filter_idx = match cfg.filter {
        Some(ref filter) => Some(column(&headers, table, &filter.column)?),
        None => None,
    };

    let mut rows = Vec::new();
    let mut filtered = 0usize;
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        let line = line_of(&record, i + 2);

        if let (Some(filter), Some(fi)) = (&cfg.filter, filter_idx) {
            let val = record.get(fi).unwrap_or("").trim();
            if !filter.values.iter().any(|v| v == val) {
                filtered += 1;
                continue;
            }
        }

        rows.push(SampleRow {
            line,
            origin: text(&record, origin_idx),
            destination: text(&record, destination_idx),
            weight: number::<f64>(&record, weight_idx, table, line)?,
        });
    }

    if filtered > 0 {
        debug!("{table}: {filtered} rows excluded by filter");
    }
    Ok(rows)
}

/// Load legacy code revisions (`old`, `new`, `year`).
pub fn load_revisions(csv_data: &str, cfg: &RecodeConfig) -> Result<CodeLookup, DistributionError> {
    let table = "recode";
    let mut rdr = reader(csv_data, &cfg.delimiter);
    let headers = headers(&mut rdr)?;
    let col = &cfg.columns;

    let old_idx = column(&headers, table, &col.old)?;
    let new_idx = column(&headers, table, &col.new)?;
    let year_idx = column(&headers, table, &col.year)?;

    let mut revisions = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        let line = line_of(&record, i + 2);
        let missing = |field: &'static str| DistributionError::MissingField {
            table: table.into(),
            line,
            field,
        };

        let old = text(&record, old_idx).ok_or_else(|| missing("old"))?;
        let new = text(&record, new_idx).ok_or_else(|| missing("new"))?;
        let year = number::<i32>(&record, year_idx, table, line)?.ok_or_else(|| missing("year"))?;
        revisions.push((old, new, year));
    }

    let lookup = CodeLookup::from_revisions(revisions);
    debug!("{table}: {} legacy codes", lookup.len());
    Ok(lookup)
}

/// Load a square impedance matrix.
///
/// The header row holds the column labels. When the header has one more
/// field than there are data columns, the first column of each row holds the
/// row label; row labels must then equal the column labels in order.
pub fn load_impedance(csv_data: &str, cfg: &PriorConfig) -> Result<ImpedanceMatrix, DistributionError> {
    let table = "impedance";
    let mut rdr = reader(csv_data, &cfg.delimiter);
    let headers = headers(&mut rdr)?;

    let records = rdr.records().collect::<Result<Vec<_>, _>>()?;
    let row_labels = headers.len() == records.len() + 1;
    let labels: Vec<String> = if row_labels {
        headers[1..].to_vec()
    } else {
        headers.clone()
    };
    let offset = usize::from(row_labels);

    let mut values = Vec::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        let line = line_of(record, i + 2);
        if row_labels {
            let label = record.get(0).unwrap_or("").trim();
            if labels.get(i).map(String::as_str) != Some(label) {
                return Err(DistributionError::MalformedMatrix(format!(
                    "line {line}: row label '{label}' does not match column label '{}'",
                    labels.get(i).map(String::as_str).unwrap_or("")
                )));
            }
        }

        let mut row = Vec::with_capacity(labels.len());
        for idx in offset..record.len() {
            let value = number::<f64>(record, idx, table, line)?.ok_or_else(|| {
                DistributionError::MissingField {
                    table: table.into(),
                    line,
                    field: "impedance",
                }
            })?;
            row.push(value);
        }
        values.push(row);
    }

    ImpedanceMatrix::new(labels, values)
}

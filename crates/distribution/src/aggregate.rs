use log::debug;

use crate::error::DistributionError;
use crate::model::{MarginalTable, RawRecord};

/// Group records by (product, region) and sum quantities.
///
/// Records with a non-positive quantity are dropped before summing. When
/// `year` is given, only records of that year count and an undated record is
/// a data error. `table` names the source in error messages.
pub fn aggregate_marginals(
    table: &str,
    records: &[RawRecord],
    year: Option<i32>,
) -> Result<MarginalTable, DistributionError> {
    let mut marginals = MarginalTable::new();
    let mut dropped = 0usize;

    for record in records {
        let missing = |field: &'static str| DistributionError::MissingField {
            table: table.to_string(),
            line: record.line,
            field,
        };

        let product = record
            .product
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| missing("product"))?;
        let region = record
            .region
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| missing("region"))?;
        let quantity = record.quantity.ok_or_else(|| missing("quantity"))?;
        if !quantity.is_finite() {
            return Err(DistributionError::InvalidQuantity {
                table: table.to_string(),
                line: record.line,
                value: quantity.to_string(),
            });
        }

        if let Some(wanted) = year {
            let record_year = record.year.ok_or_else(|| missing("year"))?;
            if record_year != wanted {
                continue;
            }
        }

        if quantity <= 0.0 {
            dropped += 1;
            continue;
        }

        marginals.add(product, region, quantity);
    }

    debug!(
        "{table}: {} records -> {} (product, region) totals, {dropped} non-positive dropped",
        records.len(),
        marginals.len()
    );
    Ok(marginals)
}

/// Rescale production so that each product's total matches its consumption total.
///
/// Products missing from either side, or with zero production, are left as is.
pub fn normalize_to(production: &mut MarginalTable, consumption: &MarginalTable) {
    let products: Vec<String> = production.products().into_iter().map(String::from).collect();
    for product in products {
        let produced = production.product_total(&product);
        let consumed = consumption.product_total(&product);
        if produced > 0.0 && consumed > 0.0 {
            production.scale_product(&product, consumed / produced);
        }
    }
}

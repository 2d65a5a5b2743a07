use crate::model::{MarginalTable, OdMatrix, Prior, RegionUniverse};

/// Value given to seed cells that end up zero or unpopulated, so that the
/// balancer can still route flow through them.
pub const DEFAULT_SEED_FLOOR: f64 = 0.001;

/// Gravity seed for one product over every ordered pair of the universe:
/// `production[o] · consumption[d] · prior[o, d]`.
///
/// A cell with any operand absent is not populated; afterwards every zero or
/// unpopulated cell is set to `floor`.
pub fn build_seed(
    product: &str,
    production: &MarginalTable,
    consumption: &MarginalTable,
    prior: &Prior,
    universe: &RegionUniverse,
    floor: f64,
) -> OdMatrix {
    let mut seed = OdMatrix::default();

    for origin in universe.ids() {
        let produced = production.get(product, origin);
        for destination in universe.ids() {
            let value = match (
                produced,
                consumption.get(product, destination),
                prior.get(origin, destination),
            ) {
                (Some(p), Some(c), Some(w)) => p * c * w,
                _ => 0.0,
            };
            let value = if value > 0.0 { value } else { floor };
            seed.set(origin, destination, value);
        }
    }

    seed
}

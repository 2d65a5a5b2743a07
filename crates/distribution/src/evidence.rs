use crate::assemble::FlowTable;
use crate::model::{ConvergenceDiagnostics, EstimateSummary, MarginalTable};

/// Compute summary statistics of a finished run.
pub fn compute_summary(
    diagnostics: &[ConvergenceDiagnostics],
    production: &MarginalTable,
    consumption: &MarginalTable,
    flows: &FlowTable,
) -> EstimateSummary {
    let mut converged = 0;
    let mut not_converged_products = Vec::new();
    let mut max_residual: f64 = 0.0;

    for d in diagnostics {
        if d.converged {
            converged += 1;
        } else {
            not_converged_products.push(d.product.clone());
        }
        if d.residual.is_finite() {
            max_residual = max_residual.max(d.residual);
        }
    }

    EstimateSummary {
        products: diagnostics.len(),
        converged,
        not_converged: not_converged_products.len(),
        not_converged_products,
        max_residual,
        total_production: production.total(),
        total_consumption: consumption.total(),
        total_flow: flows.total(),
        flow_cells: flows.len(),
    }
}

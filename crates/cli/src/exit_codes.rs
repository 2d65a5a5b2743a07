//! CLI Exit Code Registry
//!
//! Single source of truth for `odflow` exit codes. Scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain     | Description                              |
//! |---------|------------|------------------------------------------|
//! | 0       | Universal  | Success                                  |
//! | 1       | Universal  | General error (unspecified)              |
//! | 2       | Universal  | CLI usage error (bad args, missing file) |
//! | 3-9     | estimate   | Config, input and convergence codes      |
//! | 10-19   | resolve    | Label resolution codes                   |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use odflow_distribution::DistributionError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Estimate (3-9)
// =============================================================================

/// Config cannot be parsed or fails validation.
pub const EXIT_ESTIMATE_INVALID_CONFIG: u8 = 3;

/// An input or output file cannot be read or written.
pub const EXIT_ESTIMATE_IO: u8 = 4;

/// Malformed input data: missing field, bad number, missing column.
pub const EXIT_ESTIMATE_DATA: u8 = 5;

/// The region filter left an empty universe.
pub const EXIT_ESTIMATE_EMPTY_UNIVERSE: u8 = 6;

/// At least one product did not converge (only with --strict).
pub const EXIT_ESTIMATE_NOT_CONVERGED: u8 = 7;

// =============================================================================
// Resolve (10-19)
// =============================================================================

/// A label scored below the configured minimum similarity.
pub const EXIT_RESOLVE_AMBIGUOUS: u8 = 10;

/// Impedance matrix is not square or has mismatched labels.
pub const EXIT_RESOLVE_MALFORMED_MATRIX: u8 = 11;

/// Map an engine error to its exit code.
pub fn distribution_exit_code(err: &DistributionError) -> u8 {
    match err {
        DistributionError::ConfigParse(_) | DistributionError::ConfigValidation(_) => {
            EXIT_ESTIMATE_INVALID_CONFIG
        }
        DistributionError::MissingField { .. }
        | DistributionError::InvalidQuantity { .. }
        | DistributionError::MissingColumn { .. }
        | DistributionError::Csv(_) => EXIT_ESTIMATE_DATA,
        DistributionError::EmptyUniverse { .. } => EXIT_ESTIMATE_EMPTY_UNIVERSE,
        DistributionError::AmbiguousMatch { .. } => EXIT_RESOLVE_AMBIGUOUS,
        DistributionError::MalformedMatrix(_) => EXIT_RESOLVE_MALFORMED_MATRIX,
    }
}

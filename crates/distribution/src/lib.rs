//! `odflow-distribution`: origin-destination freight flow estimation.
//!
//! Pure engine crate: receives pre-loaded records, returns a reconciled flow
//! table plus per-product convergence diagnostics. CSV text is parsed here,
//! but no filesystem access happens in this crate.
//!
//! Pipeline: marginals ([`aggregate`]) and a distribution prior ([`prior`])
//! feed the gravity seed ([`seed`]), which is balanced per product by the
//! furness/IPF loop ([`furness`]) and folded into one [`FlowTable`]
//! ([`assemble`]).

pub mod aggregate;
pub mod assemble;
pub mod config;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod furness;
pub mod load;
pub mod model;
pub mod prior;
pub mod recode;
pub mod resolve;
pub mod seed;

pub use assemble::FlowTable;
pub use config::EstimateConfig;
pub use engine::run;
pub use error::DistributionError;
pub use model::{
    Axis, ConvergenceDiagnostics, EstimateInput, EstimateResult, ImpedanceMatrix, MarginalTable,
    OdMatrix, OdPair, Prior, PriorInput, RawRecord, Region, RegionUniverse, SampleRow,
};

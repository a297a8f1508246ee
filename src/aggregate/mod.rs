//! Season-level entity rates with small-sample correction

pub mod job;
pub mod shrinkage;

pub use job::{build_aggregates, collect_inputs, AggregationJob, AggregationReport, RATES_TABLE};
pub use shrinkage::{
    consistency_check, prior_rate, regress, shrink_population, weighted_residual, PopulationRates, RateInput,
    ShrunkRate,
};

//! Wellness datasets, canonical records and row normalization.

mod dataset;
mod dedup;
mod health_model;
mod normalize;
mod upstream_row;

pub use dataset::*;
pub use dedup::*;
pub use health_model::*;
pub use normalize::*;
pub use upstream_row::*;

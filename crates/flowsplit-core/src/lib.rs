//! flowsplit: streamflow disaggregation over a catchment drainage network.
//!
//! A single reference discharge series observed or forecast at a nexus is
//! allocated to the catchments upstream of it, using weights built from
//! drainage area, land-cover runoff yield, soil conductivity and
//! precipitation, optionally shifted by a Manning travel-time lag.

pub mod attributes;
pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod landcover;
pub mod metrics;
pub mod network;
pub mod record;
pub mod series;
pub mod travel_time;
pub mod weights;

pub use config::{ModelConfig, ModelVariant};
pub use engine::{DisaggregationRun, Disaggregator, ReferenceSeries};
pub use error::{DisaggError, Result};
pub use network::{DiffluencePolicy, Network};

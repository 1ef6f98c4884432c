//! JSON interchange: run inputs in, run records out.
//!
//! A [`RunRecord`] keeps the configuration and its label next to the
//! output so a persisted run can be reproduced.
use std::collections::{BTreeMap, HashMap};
use std::io::Write;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::engine::{CatchmentSeries, CellFlag, DisaggregationRun, Disaggregator, ReferenceSeries};
use crate::error::{DisaggError, Result};
use crate::landcover::CoefficientTable;
use crate::network::{CatchmentRecord, Network, NexusRecord};
use crate::series::DailySeries;

/// A daily series as it appears in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRecord {
    pub start: NaiveDate,
    pub values: Vec<f64>,
}

impl SeriesRecord {
    pub fn to_series(&self, entity: &str) -> Result<DailySeries> {
        DailySeries::new(entity, self.start, self.values.clone())
    }
}

/// Everything a run needs, as delivered by upstream collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInputs {
    pub catchments: Vec<CatchmentRecord>,
    pub nexuses: Vec<NexusRecord>,
    /// Catchment id -> daily precipitation.
    #[serde(default)]
    pub precipitation: BTreeMap<String, SeriesRecord>,
    /// Nexus id -> daily reference discharge.
    pub references: BTreeMap<String, SeriesRecord>,
    #[serde(default)]
    pub config: ModelConfig,
    /// Custom land-cover coefficients at `config.land_cover_level`;
    /// the built-in NLCD table when absent.
    #[serde(default)]
    pub coefficients: Option<BTreeMap<u16, f64>>,
}

impl RunInputs {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| DisaggError::invalid_input("run inputs", e.to_string()))
    }

    /// Build the network and run the configured variant.
    pub fn run(&self) -> Result<(Network, DisaggregationRun)> {
        self.config.validate()?;
        let network = Network::build(
            self.catchments.clone(),
            self.nexuses.clone(),
            self.config.diffluence,
        )?;

        let precipitation = self
            .precipitation
            .iter()
            .map(|(id, s)| Ok((id.clone(), s.to_series(id)?)))
            .collect::<Result<HashMap<_, _>>>()?;
        let references = self
            .references
            .iter()
            .map(|(id, s)| ReferenceSeries::new(id.clone(), s.to_series(id)?))
            .collect::<Result<Vec<_>>>()?;

        let table = match &self.coefficients {
            Some(c) => CoefficientTable::new(self.config.land_cover_level, c.clone())?,
            None => CoefficientTable::nlcd(self.config.land_cover_level),
        };

        let run = Disaggregator::with_table(&network, &self.config, &table, &precipitation)?
            .run(&references)?;
        Ok((network, run))
    }
}

/// Persisted form of a [`DisaggregationRun`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub label: String,
    pub config: ModelConfig,
    pub discharge: Vec<CatchmentSeries>,
    pub flags: Vec<CellFlag>,
    pub diagnostic_ids: Vec<String>,
    /// Column name -> one value per entry of `diagnostic_ids`.
    pub diagnostics: BTreeMap<String, Vec<f64>>,
}

impl RunRecord {
    pub fn new(run: &DisaggregationRun, config: &ModelConfig) -> Self {
        let diagnostics = run
            .diagnostics
            .columns()
            .into_iter()
            .map(|(name, values)| (name.to_string(), values.to_vec()))
            .collect();
        Self {
            label: run.label.clone(),
            config: config.clone(),
            discharge: run.table.series().to_vec(),
            flags: run.flags.clone(),
            diagnostic_ids: run.diagnostic_ids.clone(),
            diagnostics,
        }
    }

    /// Suggested file name, e.g. `disaggregated_A_RC_L1_P_K_TT.json`.
    pub fn file_name(&self) -> String {
        format!("disaggregated_{}.json", self.label)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| DisaggError::invalid_input("run record", e.to_string()))
    }

    pub fn write_json<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| DisaggError::invalid_input("run record", e.to_string()))
    }
}

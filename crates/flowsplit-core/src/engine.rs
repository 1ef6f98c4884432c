//! Disaggregation engine.
//!
//! Combines each cohort's reference series with its normalized weights and
//! per-catchment lags into a per-catchment discharge table. Cohorts are
//! independent and run on the rayon pool; results are assembled in cohort
//! order, so repeated runs are bit-identical.
use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::attributes::{resolve_all, CatchmentAttributes};
use crate::config::ModelConfig;
use crate::diagnostics::{CatchmentDiagnostics, DiagnosticsTable};
use crate::error::{DisaggError, Result};
use crate::landcover::CoefficientTable;
use crate::network::{CatchmentIdx, Network, NexusIdx};
use crate::series::DailySeries;
use crate::travel_time::cumulative_travel_time;
use crate::weights::{cohort_weights, WeightTable};

/// Reference discharge observed or forecast at one nexus.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSeries {
    nexus: String,
    series: DailySeries,
}

impl ReferenceSeries {
    /// Discharge must be non-negative on every day.
    pub fn new(nexus: impl Into<String>, series: DailySeries) -> Result<Self> {
        let nexus = nexus.into();
        series.require_non_negative(&nexus)?;
        Ok(Self { nexus, series })
    }

    pub fn nexus(&self) -> &str {
        &self.nexus
    }

    pub fn series(&self) -> &DailySeries {
        &self.series
    }
}

/// A cell left undefined in the output table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellFlag {
    /// `date + lag_days` falls past the end of the reference series.
    OutOfRangeLag {
        catchment: String,
        date: NaiveDate,
        lag_days: i64,
    },
}

/// Reference value `lag_days` after `date`.
pub fn lagged_reference(
    catchment: &str,
    reference: &DailySeries,
    date: NaiveDate,
    lag_days: i64,
) -> Result<f64> {
    Duration::try_days(lag_days)
        .and_then(|lag| date.checked_add_signed(lag))
        .and_then(|target| reference.get(target))
        .ok_or_else(|| DisaggError::OutOfRangeLag {
            catchment: catchment.to_string(),
            date,
            lag_days,
            last: reference.end(),
        })
}

/// Discharge of one cohort, `values[k][t]` for member `k` on day `t`.
#[derive(Debug, Clone, PartialEq)]
pub struct CohortOutput {
    pub nexus: NexusIdx,
    pub members: Vec<CatchmentIdx>,
    pub start: NaiveDate,
    pub values: Vec<Vec<Option<f64>>>,
    pub flags: Vec<CellFlag>,
}

/// Allocate the reference series to the cohort members.
///
/// `Q_k(t) = ref(t + lag_k) · w_k(t)`. A lag running past the reference
/// series leaves the cell `None` and records a [`CellFlag`].
pub fn disaggregate(
    network: &Network,
    cohort: &[CatchmentIdx],
    reference: &ReferenceSeries,
    weights: &WeightTable,
    lags: &[i64],
) -> Result<CohortOutput> {
    let series = &reference.series;
    if weights.members != cohort || lags.len() != cohort.len() {
        return Err(DisaggError::invalid_input(
            &reference.nexus,
            "weights and lags do not match the cohort",
        ));
    }
    if weights.start != series.start() || weights.len() != series.len() {
        return Err(DisaggError::invalid_input(
            &reference.nexus,
            "weight table does not span the reference series",
        ));
    }

    let mut values = Vec::with_capacity(cohort.len());
    let mut flags = Vec::new();

    for (k, (&c, &lag)) in cohort.iter().zip(lags).enumerate() {
        let id = &network.catchment(c).id;
        let mut column = Vec::with_capacity(series.len());
        for t in 0..series.len() {
            let date = series.date(t);
            let q_ref = match lagged_reference(id, series, date, lag) {
                Ok(q) => q,
                Err(DisaggError::OutOfRangeLag {
                    catchment,
                    date,
                    lag_days,
                    ..
                }) => {
                    flags.push(CellFlag::OutOfRangeLag {
                        catchment,
                        date,
                        lag_days,
                    });
                    column.push(None);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let q = q_ref * weights.weight(k, t);
            if q < 0.0 {
                return Err(DisaggError::invalid_input(
                    id,
                    format!("negative discharge {q} on {date}"),
                ));
            }
            // Drops -0.0.
            column.push(Some(if q == 0.0 { 0.0 } else { q }));
        }
        values.push(column);
    }

    Ok(CohortOutput {
        nexus: weights.nexus,
        members: cohort.to_vec(),
        start: series.start(),
        values,
        flags,
    })
}

/// Discharge series of one catchment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatchmentSeries {
    #[serde(skip)]
    pub idx: CatchmentIdx,
    pub catchment: String,
    pub nexus: String,
    pub start: NaiveDate,
    pub values: Vec<Option<f64>>,
}

impl CatchmentSeries {
    pub fn value(&self, date: NaiveDate) -> Option<f64> {
        let offset = (date - self.start).num_days();
        if offset < 0 {
            return None;
        }
        self.values.get(offset as usize).copied().flatten()
    }

    /// Defined values only.
    pub fn defined(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter_map(move |(t, v)| v.map(|q| (self.start + Duration::days(t as i64), q)))
    }
}

/// A day on which a downstream catchment carries less than one upstream of
/// it in the same cohort.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccumulationViolation {
    pub upstream: String,
    pub downstream: String,
    pub date: NaiveDate,
    pub upstream_q: f64,
    pub downstream_q: f64,
}

/// Per-catchment discharge for every disaggregated cohort.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DischargeTable {
    series: Vec<CatchmentSeries>,
    index: HashMap<String, usize>,
}

impl DischargeTable {
    fn push(&mut self, series: CatchmentSeries) {
        self.index.insert(series.catchment.clone(), self.series.len());
        self.series.push(series);
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn series(&self) -> &[CatchmentSeries] {
        &self.series
    }

    pub fn get(&self, catchment: &str) -> Option<&CatchmentSeries> {
        self.index.get(catchment).map(|&i| &self.series[i])
    }

    /// Discharge of `catchment` on `date`; `None` if undefined or absent.
    pub fn value(&self, catchment: &str, date: NaiveDate) -> Option<f64> {
        self.get(catchment).and_then(|s| s.value(date))
    }

    /// Days on which `Q_downstream < Q_upstream` for catchment pairs of the
    /// same cohort. Only meaningful for cumulative-area runs.
    pub fn accumulation_violations(&self, network: &Network) -> Vec<AccumulationViolation> {
        let mut cohorts: Vec<Vec<&CatchmentSeries>> = Vec::new();
        let mut slot: HashMap<&str, usize> = HashMap::new();
        for s in &self.series {
            let k = *slot.entry(s.nexus.as_str()).or_insert_with(|| {
                cohorts.push(Vec::new());
                cohorts.len() - 1
            });
            cohorts[k].push(s);
        }

        let mut out = Vec::new();
        for members in &cohorts {
            let idxs: Vec<CatchmentIdx> = members.iter().map(|s| s.idx).collect();
            let below = network.downstream_within(&idxs);
            for (up, downstream) in members.iter().zip(&below) {
                for down in downstream.iter().map(|&j| members[j]) {
                    for (date, q_up) in up.defined() {
                        if let Some(q_down) = down.value(date) {
                            if q_down < q_up {
                                out.push(AccumulationViolation {
                                    upstream: up.catchment.clone(),
                                    downstream: down.catchment.clone(),
                                    date,
                                    upstream_q: q_up,
                                    downstream_q: q_down,
                                });
                            }
                        }
                    }
                }
            }
        }
        out
    }
}

/// Result of a full run.
#[derive(Debug, Clone, PartialEq)]
pub struct DisaggregationRun {
    pub label: String,
    pub table: DischargeTable,
    pub flags: Vec<CellFlag>,
    /// Catchment ids, one per diagnostics row.
    pub diagnostic_ids: Vec<String>,
    pub diagnostics: DiagnosticsTable,
}

impl DisaggregationRun {
    pub fn flagged(&self) -> usize {
        self.flags.len()
    }
}

struct CohortResult {
    output: CohortOutput,
    diagnostics: Vec<CatchmentDiagnostics>,
}

/// Disaggregation pipeline over one network and configuration.
///
/// Construction resolves attributes and travel times for every catchment;
/// [`Disaggregator::run`] can then be called with any set of references.
#[derive(Debug)]
pub struct Disaggregator<'a> {
    network: &'a Network,
    config: &'a ModelConfig,
    attributes: Vec<CatchmentAttributes>,
    travel_times: Vec<f64>,
    lags: Vec<i64>,
}

impl<'a> Disaggregator<'a> {
    /// Use the built-in NLCD table at the configured level.
    pub fn new(
        network: &'a Network,
        config: &'a ModelConfig,
        precipitation: &HashMap<String, DailySeries>,
    ) -> Result<Self> {
        let table = CoefficientTable::nlcd(config.land_cover_level);
        Self::with_table(network, config, &table, precipitation)
    }

    pub fn with_table(
        network: &'a Network,
        config: &'a ModelConfig,
        table: &CoefficientTable,
        precipitation: &HashMap<String, DailySeries>,
    ) -> Result<Self> {
        config.validate()?;
        if network.policy() != config.diffluence {
            return Err(DisaggError::invalid_config(
                "diffluence",
                format!(
                    "network was built with {:?}, configuration asks for {:?}",
                    network.policy(),
                    config.diffluence
                ),
            ));
        }
        if table.level() != config.land_cover_level {
            return Err(DisaggError::invalid_config(
                "land_cover_level",
                format!(
                    "coefficient table is {}, configuration asks for {}",
                    table.level(),
                    config.land_cover_level
                ),
            ));
        }
        for id in precipitation.keys() {
            network.catchment_idx(id)?;
        }

        let attributes = resolve_all(network, precipitation, table, config)?;

        let mut travel_times = vec![0.0; network.len()];
        let mut lags = vec![0; network.len()];
        if config.include_travel_time {
            for &c in network.topological_order() {
                let t = cumulative_travel_time(network, c)?;
                travel_times[c.0] = t;
                lags[c.0] = config.lag_rounding.to_days(t).ok_or_else(|| {
                    DisaggError::invalid_input(
                        &network.catchment(c).id,
                        format!("travel time {t} s is not finite"),
                    )
                })?;
                debug!(
                    catchment = %network.catchment(c).id,
                    travel_time_s = t,
                    lag_days = lags[c.0],
                    "travel time"
                );
            }
        }

        Ok(Self {
            network,
            config,
            attributes,
            travel_times,
            lags,
        })
    }

    pub fn attributes(&self, idx: CatchmentIdx) -> &CatchmentAttributes {
        &self.attributes[idx.0]
    }

    /// Cumulative travel time to the reference nexus [s].
    pub fn travel_time(&self, idx: CatchmentIdx) -> f64 {
        self.travel_times[idx.0]
    }

    pub fn lag_days(&self, idx: CatchmentIdx) -> i64 {
        self.lags[idx.0]
    }

    /// Disaggregate every cohort that has a reference series.
    ///
    /// Cohorts without a reference are skipped with a warning. Any fatal
    /// error aborts the whole run; out-of-range lags are collected in
    /// [`DisaggregationRun::flags`].
    pub fn run(&self, references: &[ReferenceSeries]) -> Result<DisaggregationRun> {
        let mut by_nexus: HashMap<NexusIdx, &ReferenceSeries> = HashMap::new();
        for r in references {
            let nexus = self.network.nexus_idx(&r.nexus)?;
            if by_nexus.insert(nexus, r).is_some() {
                return Err(DisaggError::invalid_input(
                    &r.nexus,
                    "more than one reference series",
                ));
            }
            if self.network.cohort(nexus).is_empty() {
                warn!(nexus = %r.nexus, "reference series has no cohort");
            }
        }

        let mut jobs = Vec::new();
        for (nexus, members) in self.network.cohorts() {
            match by_nexus.get(&nexus) {
                Some(&r) => jobs.push((nexus, r)),
                None => warn!(
                    nexus = %self.network.nexus(nexus).id,
                    catchments = members.len(),
                    "no reference series, cohort skipped"
                ),
            }
        }

        let results: Vec<CohortResult> = if self.config.parallel {
            jobs.par_iter()
                .map(|&(nexus, r)| self.run_cohort(nexus, r))
                .collect::<Result<_>>()?
        } else {
            jobs.iter()
                .map(|&(nexus, r)| self.run_cohort(nexus, r))
                .collect::<Result<_>>()?
        };

        let mut table = DischargeTable::default();
        let mut flags = Vec::new();
        let mut diagnostic_ids = Vec::new();
        let mut diagnostics = DiagnosticsTable::with_capacity(self.network.len());
        for result in results {
            let nexus_id = &self.network.nexus(result.output.nexus).id;
            for ((&c, values), row) in result
                .output
                .members
                .iter()
                .zip(result.output.values)
                .zip(&result.diagnostics)
            {
                let id = self.network.catchment(c).id.clone();
                table.push(CatchmentSeries {
                    idx: c,
                    catchment: id.clone(),
                    nexus: nexus_id.clone(),
                    start: result.output.start,
                    values,
                });
                diagnostic_ids.push(id);
                diagnostics.push(row);
            }
            flags.extend(result.output.flags);
        }

        info!(
            label = %self.config.label(),
            cohorts = jobs.len(),
            catchments = table.len(),
            flagged = flags.len(),
            "disaggregation finished"
        );

        Ok(DisaggregationRun {
            label: self.config.label(),
            table,
            flags,
            diagnostic_ids,
            diagnostics,
        })
    }

    fn run_cohort(&self, nexus: NexusIdx, reference: &ReferenceSeries) -> Result<CohortResult> {
        let members = self.network.cohort(nexus);
        let series = &reference.series;
        let weights = cohort_weights(
            self.network,
            nexus,
            &self.attributes,
            series.start(),
            series.len(),
            self.config,
        )?;
        let lags: Vec<i64> = members.iter().map(|c| self.lags[c.0]).collect();
        let output = disaggregate(self.network, members, reference, &weights, &lags)?;

        if !output.flags.is_empty() {
            warn!(
                nexus = %reference.nexus,
                flagged = output.flags.len(),
                last = %series.end(),
                "lagged reference runs past the series, cells left undefined"
            );
        }

        let diagnostics = members
            .iter()
            .enumerate()
            .map(|(k, &c)| {
                let catchment = self.network.catchment(c);
                let attrs = &self.attributes[c.0];
                CatchmentDiagnostics {
                    area_km2: catchment.area_km2,
                    cumulative_area_km2: self.network.cumulative_area(c),
                    runoff_yield: attrs.runoff_yield,
                    conductivity: attrs.conductivity,
                    annual_precip: attrs.precipitation.as_ref().map_or(0.0, |p| p.annual),
                    travel_time_s: self.travel_times[c.0],
                    lag_days: self.lags[c.0] as f64,
                    mean_weight: weights.mean_weight(k),
                }
            })
            .collect();

        Ok(CohortResult {
            output,
            diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AreaMode, NormalizationMode, PrecipResolution};
    use crate::network::tests::{catchment, linear_chain, nexus};
    use crate::network::DiffluencePolicy;
    use crate::travel_time::ReachGeometry;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 6, d).unwrap()
    }

    fn reference(nexus: &str, values: Vec<f64>) -> ReferenceSeries {
        ReferenceSeries::new(nexus, DailySeries::new(nexus, day(1), values).unwrap()).unwrap()
    }

    fn area_only(normalization: NormalizationMode) -> ModelConfig {
        ModelConfig {
            area_mode: AreaMode::Incremental,
            normalization,
            precip_resolution: PrecipResolution::None,
            include_conductivity: false,
            include_travel_time: false,
            ..ModelConfig::default()
        }
    }

    fn pair() -> Network {
        Network::build(
            vec![
                catchment("cat-1", 2.0, "nex-out", "nex-out"),
                catchment("cat-2", 8.0, "nex-out", "nex-out"),
            ],
            vec![nexus("nex-out", &[])],
            DiffluencePolicy::Reject,
        )
        .unwrap()
    }

    // -- Lagged lookup --

    #[test]
    fn lagged_reference_reads_future_value() {
        let r = reference("nex-out", vec![1.0, 2.0, 3.0]);
        assert_eq!(lagged_reference("cat-1", r.series(), day(1), 2).unwrap(), 3.0);
    }

    #[test]
    fn lag_past_end_is_out_of_range() {
        let r = reference("nex-out", vec![1.0, 2.0, 3.0]);
        let err = lagged_reference("cat-1", r.series(), day(3), 5).unwrap_err();
        assert_eq!(
            err,
            DisaggError::OutOfRangeLag {
                catchment: "cat-1".to_string(),
                date: day(3),
                lag_days: 5,
                last: day(3),
            }
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn negative_reference_rejected() {
        let s = DailySeries::new("nex-out", day(1), vec![1.0, -1.0]).unwrap();
        assert!(ReferenceSeries::new("nex-out", s).is_err());
    }

    // -- Cohort allocation --

    #[test]
    fn disaggregate_marks_lagged_cells() {
        let net = pair();
        let cfg = area_only(NormalizationMode::Sum);
        let out = net.nexus_idx("nex-out").unwrap();
        let r = reference("nex-out", vec![100.0, 100.0, 100.0]);
        let attrs: Vec<CatchmentAttributes> = (0..2)
            .map(|_| CatchmentAttributes {
                runoff_yield: 0.2,
                conductivity: 1.0,
                precipitation: None,
            })
            .collect();
        let w = cohort_weights(&net, out, &attrs, day(1), 3, &cfg).unwrap();
        let cohort = net.cohort(out);
        let result = disaggregate(&net, cohort, &r, &w, &[0, 1]).unwrap();
        assert_eq!(result.values[0], vec![Some(20.0), Some(20.0), Some(20.0)]);
        assert_eq!(result.values[1][..2], [Some(80.0), Some(80.0)]);
        assert_eq!(result.values[1][2], None);
        assert_eq!(
            result.flags,
            vec![CellFlag::OutOfRangeLag {
                catchment: "cat-2".to_string(),
                date: day(3),
                lag_days: 1,
            }]
        );
    }

    #[test]
    fn disaggregate_rejects_misaligned_weights() {
        let net = pair();
        let cfg = area_only(NormalizationMode::Sum);
        let out = net.nexus_idx("nex-out").unwrap();
        let attrs = vec![
            CatchmentAttributes {
                runoff_yield: 0.2,
                conductivity: 1.0,
                precipitation: None,
            };
            2
        ];
        let w = cohort_weights(&net, out, &attrs, day(1), 2, &cfg).unwrap();
        let r = reference("nex-out", vec![1.0, 2.0, 3.0]);
        assert!(disaggregate(&net, net.cohort(out), &r, &w, &[0, 0]).is_err());
    }

    // -- Full runs --

    #[test]
    fn run_sum_mode_two_catchments() {
        let net = pair();
        let cfg = area_only(NormalizationMode::Sum);
        let d = Disaggregator::new(&net, &cfg, &HashMap::new()).unwrap();
        let run = d.run(&[reference("nex-out", vec![100.0])]).unwrap();
        assert_eq!(run.table.value("cat-1", day(1)), Some(20.0));
        assert_eq!(run.table.value("cat-2", day(1)), Some(80.0));
        assert_eq!(run.flagged(), 0);
        assert_eq!(run.diagnostic_ids, ["cat-1", "cat-2"]);
        assert_eq!(run.diagnostics.mean_weight, vec![0.2, 0.8]);
    }

    #[test]
    fn run_max_mode_two_catchments() {
        let net = pair();
        let cfg = area_only(NormalizationMode::Max);
        let d = Disaggregator::new(&net, &cfg, &HashMap::new()).unwrap();
        let run = d.run(&[reference("nex-out", vec![100.0])]).unwrap();
        assert_eq!(run.table.value("cat-1", day(1)), Some(25.0));
        assert_eq!(run.table.value("cat-2", day(1)), Some(100.0));
    }

    #[test]
    fn cohort_without_reference_is_skipped() {
        let net = pair();
        let cfg = area_only(NormalizationMode::Sum);
        let d = Disaggregator::new(&net, &cfg, &HashMap::new()).unwrap();
        let run = d.run(&[]).unwrap();
        assert!(run.table.is_empty());
        assert!(run.diagnostics.is_empty());
    }

    #[test]
    fn unknown_reference_nexus_is_an_error() {
        let net = pair();
        let cfg = area_only(NormalizationMode::Sum);
        let d = Disaggregator::new(&net, &cfg, &HashMap::new()).unwrap();
        let err = d.run(&[reference("nex-nowhere", vec![1.0])]).unwrap_err();
        assert!(matches!(err, DisaggError::UnknownEntity { kind: "nexus", .. }));
    }

    #[test]
    fn missing_precipitation_is_an_error() {
        let net = pair();
        let cfg = ModelConfig {
            include_conductivity: false,
            include_travel_time: false,
            ..ModelConfig::default()
        };
        let err = Disaggregator::new(&net, &cfg, &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("no precipitation series"));
    }

    #[test]
    fn policy_mismatch_is_a_config_error() {
        let net = pair();
        let cfg = ModelConfig {
            diffluence: DiffluencePolicy::SplitByFraction,
            ..area_only(NormalizationMode::Sum)
        };
        let err = Disaggregator::new(&net, &cfg, &HashMap::new()).unwrap_err();
        assert!(matches!(
            err,
            DisaggError::InvalidConfig {
                field: "diffluence",
                ..
            }
        ));
    }

    #[test]
    fn chain_accumulates_downstream() {
        let net = linear_chain();
        let cfg = ModelConfig {
            area_mode: AreaMode::Cumulative,
            ..area_only(NormalizationMode::Max)
        };
        let d = Disaggregator::new(&net, &cfg, &HashMap::new()).unwrap();
        let run = d.run(&[reference("nex-out", vec![60.0, 30.0])]).unwrap();
        assert_eq!(run.table.value("cat-1", day(1)), Some(10.0));
        assert_eq!(run.table.value("cat-2", day(1)), Some(30.0));
        assert_eq!(run.table.value("cat-3", day(1)), Some(60.0));
        assert!(run.table.accumulation_violations(&net).is_empty());
    }

    #[test]
    fn incremental_mode_can_violate_accumulation() {
        // Upstream catchment larger than the one below it.
        let net = Network::build(
            vec![
                catchment("big", 9.0, "nex-1", "nex-out"),
                catchment("small", 1.0, "nex-out", "nex-out"),
            ],
            vec![nexus("nex-1", &["small"]), nexus("nex-out", &[])],
            DiffluencePolicy::Reject,
        )
        .unwrap();
        let cfg = area_only(NormalizationMode::Sum);
        let d = Disaggregator::new(&net, &cfg, &HashMap::new()).unwrap();
        let run = d.run(&[reference("nex-out", vec![10.0])]).unwrap();
        let violations = run.table.accumulation_violations(&net);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].upstream, "big");
        assert_eq!(violations[0].downstream, "small");
    }

    #[test]
    fn travel_time_lag_shifts_reference() {
        // Roughness picked for a velocity of 1 m/s over four days of reach.
        let mut slow = catchment("slow", 1.0, "nex-out", "nex-out");
        slow.reach = ReachGeometry {
            length_m: 86_400.0 * 4.0,
            top_width_m: 5.0,
            depth_m: 2.0,
            manning_n: (10.0_f64 / 9.0).powf(2.0 / 3.0) * 0.1,
            slope: 0.01,
        };
        let net = Network::build(
            vec![slow],
            vec![nexus("nex-out", &[])],
            DiffluencePolicy::Reject,
        )
        .unwrap();
        let cfg = ModelConfig {
            include_travel_time: true,
            ..area_only(NormalizationMode::Max)
        };
        let d = Disaggregator::new(&net, &cfg, &HashMap::new()).unwrap();
        let idx = net.catchment_idx("slow").unwrap();
        assert_eq!(d.lag_days(idx), 4);

        let run = d
            .run(&[reference("nex-out", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])])
            .unwrap();
        assert_eq!(run.table.value("slow", day(1)), Some(5.0));
        assert_eq!(run.table.value("slow", day(2)), Some(6.0));
        assert_eq!(run.table.value("slow", day(3)), None);
        assert_eq!(run.flagged(), 4);
    }

    #[test]
    fn near_flat_reach_flags_every_cell() {
        for slope in [1e-20, 1e-300] {
            let mut flat = catchment("flat", 1.0, "nex-out", "nex-out");
            flat.reach = ReachGeometry {
                length_m: 1e4,
                top_width_m: 5.0,
                depth_m: 2.0,
                manning_n: 0.1,
                slope,
            };
            let net = Network::build(
                vec![flat],
                vec![nexus("nex-out", &[])],
                DiffluencePolicy::Reject,
            )
            .unwrap();
            let cfg = ModelConfig {
                include_travel_time: true,
                ..area_only(NormalizationMode::Max)
            };
            let d = Disaggregator::new(&net, &cfg, &HashMap::new()).unwrap();
            assert!(d.lag_days(net.catchment_idx("flat").unwrap()) > 100_000_000);

            let run = d.run(&[reference("nex-out", vec![1.0, 2.0, 3.0])]).unwrap();
            assert_eq!(run.flagged(), 3);
            assert_eq!(run.table.value("flat", day(1)), None);
        }
    }

    #[test]
    fn lag_beyond_calendar_is_out_of_range() {
        let r = reference("nex-out", vec![1.0]);
        let err = lagged_reference("cat-1", r.series(), day(1), i64::MAX).unwrap_err();
        assert!(matches!(err, DisaggError::OutOfRangeLag { lag_days: i64::MAX, .. }));
    }

    #[test]
    fn parallel_and_sequential_runs_agree() {
        let net = linear_chain();
        let parallel = area_only(NormalizationMode::Sum);
        let sequential = ModelConfig {
            parallel: false,
            ..parallel.clone()
        };
        let refs = [reference("nex-out", vec![3.0, 7.0, 11.0])];
        let a = Disaggregator::new(&net, &parallel, &HashMap::new())
            .unwrap()
            .run(&refs)
            .unwrap();
        let b = Disaggregator::new(&net, &sequential, &HashMap::new())
            .unwrap()
            .run(&refs)
            .unwrap();
        assert_eq!(a, b);
    }
}

//! End-to-end disaggregation scenarios.
use std::collections::{BTreeMap, HashMap};

use approx::assert_relative_eq;
use chrono::NaiveDate;

use flowsplit_core::config::{AreaMode, ModelConfig, ModelVariant, NormalizationMode, PrecipResolution};
use flowsplit_core::engine::{CellFlag, Disaggregator, ReferenceSeries};
use flowsplit_core::network::{
    BranchRecord, CatchmentRecord, DiffluencePolicy, Network, NexusRecord,
};
use flowsplit_core::series::DailySeries;
use flowsplit_core::travel_time::{cumulative_travel_time, travel_time_seconds, ReachGeometry};
use flowsplit_core::DisaggError;

fn day(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, m, d).unwrap()
}

fn catchment(id: &str, area: f64, to: &str, reference: &str) -> CatchmentRecord {
    CatchmentRecord {
        id: id.to_string(),
        area_km2: area,
        to_nexus: to.to_string(),
        reference_nexus: reference.to_string(),
        land_cover: [(41, 0.5), (82, 0.5)].into_iter().collect(),
        conductivity: 2.0,
        reach: ReachGeometry::placeholder(0.0),
    }
}

fn nexus(id: &str, downstream: &[&str]) -> NexusRecord {
    NexusRecord {
        id: id.to_string(),
        downstream: downstream
            .iter()
            .map(|c| BranchRecord {
                catchment: c.to_string(),
                fraction: None,
            })
            .collect(),
    }
}

fn reference(nexus: &str, start: NaiveDate, values: Vec<f64>) -> ReferenceSeries {
    ReferenceSeries::new(nexus, DailySeries::new(nexus, start, values).unwrap()).unwrap()
}

/// Area-only weights: no yield, precipitation, conductivity or lag.
fn area_only(normalization: NormalizationMode) -> ModelConfig {
    let base = ModelConfig {
        area_mode: AreaMode::Incremental,
        normalization,
        include_travel_time: false,
        ..ModelConfig::default()
    };
    ModelVariant::AreaOnly.configure(&base)
}

/// Reach whose Manning velocity is exactly 1 m/s.
fn unit_velocity_reach(length_m: f64) -> ReachGeometry {
    ReachGeometry {
        length_m,
        top_width_m: 5.0,
        depth_m: 2.0,
        manning_n: (10.0_f64 / 9.0).powf(2.0 / 3.0) * 0.1,
        slope: 0.01,
    }
}

fn two_catchment_cohort() -> Network {
    Network::build(
        vec![
            catchment("cat-1", 2.0, "nex-gauge", "nex-gauge"),
            catchment("cat-2", 8.0, "nex-gauge", "nex-gauge"),
        ],
        vec![nexus("nex-gauge", &[])],
        DiffluencePolicy::Reject,
    )
    .unwrap()
}

// -- Two-catchment cohort --

#[test]
fn sum_normalization_splits_by_area() {
    let net = two_catchment_cohort();
    let cfg = area_only(NormalizationMode::Sum);
    let run = Disaggregator::new(&net, &cfg, &HashMap::new())
        .unwrap()
        .run(&[reference("nex-gauge", day(7, 1), vec![100.0])])
        .unwrap();
    assert_relative_eq!(run.table.value("cat-1", day(7, 1)).unwrap(), 20.0, epsilon = 1e-9);
    assert_relative_eq!(run.table.value("cat-2", day(7, 1)).unwrap(), 80.0, epsilon = 1e-9);
}

#[test]
fn max_normalization_scales_to_largest() {
    let net = two_catchment_cohort();
    let cfg = area_only(NormalizationMode::Max);
    let run = Disaggregator::new(&net, &cfg, &HashMap::new())
        .unwrap()
        .run(&[reference("nex-gauge", day(7, 1), vec![100.0])])
        .unwrap();
    assert_relative_eq!(run.table.value("cat-1", day(7, 1)).unwrap(), 25.0, epsilon = 1e-9);
    assert_relative_eq!(run.table.value("cat-2", day(7, 1)).unwrap(), 100.0, epsilon = 1e-9);
}

#[test]
fn equal_yields_leave_area_split_unchanged() {
    let net = two_catchment_cohort();
    let cfg = ModelVariant::AreaYield.configure(&area_only(NormalizationMode::Sum));
    let run = Disaggregator::new(&net, &cfg, &HashMap::new())
        .unwrap()
        .run(&[reference("nex-gauge", day(7, 1), vec![100.0])])
        .unwrap();
    assert_relative_eq!(run.table.value("cat-1", day(7, 1)).unwrap(), 20.0, epsilon = 1e-9);
}

// -- Linear chain --

#[test]
fn linear_chain_cumulative_area() {
    let net = Network::build(
        vec![
            catchment("a", 1.0, "nex-a", "nex-out"),
            catchment("b", 2.0, "nex-b", "nex-out"),
            catchment("c", 3.0, "nex-out", "nex-out"),
        ],
        vec![nexus("nex-a", &["b"]), nexus("nex-b", &["c"]), nexus("nex-out", &[])],
        DiffluencePolicy::Reject,
    )
    .unwrap();
    let areas: Vec<f64> = ["a", "b", "c"]
        .iter()
        .map(|id| net.cumulative_area(net.catchment_idx(id).unwrap()))
        .collect();
    assert_eq!(areas, vec![1.0, 3.0, 6.0]);
}

// -- Travel time --

#[test]
fn chained_reaches_sum_travel_times() {
    let mut up = catchment("up", 1.0, "nex-mid", "nex-out");
    up.reach = ReachGeometry {
        length_m: 1000.0,
        top_width_m: 5.0,
        depth_m: 2.0,
        manning_n: 0.1,
        slope: 0.01,
    };
    let mut down = catchment("down", 1.0, "nex-out", "nex-out");
    down.reach = ReachGeometry {
        length_m: 2500.0,
        manning_n: 0.05,
        ..up.reach
    };
    let (up_reach, down_reach) = (up.reach, down.reach);

    let net = Network::build(
        vec![up, down],
        vec![nexus("nex-mid", &["down"]), nexus("nex-out", &[])],
        DiffluencePolicy::Reject,
    )
    .unwrap();
    let total = cumulative_travel_time(&net, net.catchment_idx("up").unwrap()).unwrap();
    let expected = travel_time_seconds(&up_reach) + travel_time_seconds(&down_reach);
    assert_relative_eq!(total, expected, epsilon = 1e-9);
    assert_relative_eq!(travel_time_seconds(&up_reach), 932.17, epsilon = 0.01);
}

#[test]
fn five_day_lag_on_last_day_is_flagged() {
    let mut slow = catchment("slow", 1.0, "nex-gauge", "nex-gauge");
    slow.reach = unit_velocity_reach(5.0 * 86_400.0);
    let net = Network::build(vec![slow], vec![nexus("nex-gauge", &[])], DiffluencePolicy::Reject)
        .unwrap();
    let cfg = ModelConfig {
        include_travel_time: true,
        ..area_only(NormalizationMode::Max)
    };
    let d = Disaggregator::new(&net, &cfg, &HashMap::new()).unwrap();
    assert_eq!(d.lag_days(net.catchment_idx("slow").unwrap()), 5);

    let values: Vec<f64> = (1..=10).map(f64::from).collect();
    let run = d.run(&[reference("nex-gauge", day(7, 1), values)]).unwrap();

    assert_eq!(run.table.value("slow", day(7, 10)), None);
    assert!(run.flags.contains(&CellFlag::OutOfRangeLag {
        catchment: "slow".to_string(),
        date: day(7, 10),
        lag_days: 5,
    }));
    assert_eq!(run.flagged(), 5);
    assert_eq!(run.table.value("slow", day(7, 5)), Some(10.0));
}

// -- Precipitation-weighted variants --

#[test]
fn daily_precipitation_moves_weight_with_rain() {
    let net = two_catchment_cohort();
    let cfg = ModelVariant::DailyPrecip.configure(&area_only(NormalizationMode::Sum));
    let mut precipitation = HashMap::new();
    precipitation.insert(
        "cat-1".to_string(),
        DailySeries::new("cat-1", day(7, 1), vec![8.0, 0.0]).unwrap(),
    );
    precipitation.insert(
        "cat-2".to_string(),
        DailySeries::new("cat-2", day(7, 1), vec![2.0, 0.0]).unwrap(),
    );
    let run = Disaggregator::new(&net, &cfg, &precipitation)
        .unwrap()
        .run(&[reference("nex-gauge", day(7, 1), vec![100.0, 100.0])])
        .unwrap();

    // Day 1: area times rain is 2·8 against 8·2.
    assert_relative_eq!(run.table.value("cat-1", day(7, 1)).unwrap(), 50.0, epsilon = 1e-9);
    // Day 2: both dry, floor applies equally, area decides.
    assert_relative_eq!(run.table.value("cat-1", day(7, 2)).unwrap(), 20.0, epsilon = 1e-9);
}

#[test]
fn daily_precipitation_must_cover_reference() {
    let net = two_catchment_cohort();
    let cfg = ModelVariant::DailyPrecip.configure(&area_only(NormalizationMode::Sum));
    let precipitation: HashMap<String, DailySeries> = ["cat-1", "cat-2"]
        .iter()
        .map(|id| (id.to_string(), DailySeries::new(id, day(7, 1), vec![1.0]).unwrap()))
        .collect();
    let err = Disaggregator::new(&net, &cfg, &precipitation)
        .unwrap()
        .run(&[reference("nex-gauge", day(7, 1), vec![1.0, 1.0])])
        .unwrap_err();
    assert!(err.to_string().contains("no precipitation on 2021-07-02"));
}

#[test]
fn negative_precipitation_is_fatal() {
    let net = two_catchment_cohort();
    let cfg = ModelVariant::AnnualPrecip.configure(&area_only(NormalizationMode::Sum));
    let precipitation: HashMap<String, DailySeries> = ["cat-1", "cat-2"]
        .iter()
        .map(|id| (id.to_string(), DailySeries::new(id, day(7, 1), vec![1.0, -1.0]).unwrap()))
        .collect();
    let err = Disaggregator::new(&net, &cfg, &precipitation).unwrap_err();
    assert!(matches!(err, DisaggError::InvalidInput { .. }));
}

#[test]
fn non_positive_conductivity_is_fatal_only_when_used() {
    let mut dry = catchment("cat-1", 2.0, "nex-gauge", "nex-gauge");
    dry.conductivity = 0.0;
    let net = Network::build(
        vec![dry, catchment("cat-2", 8.0, "nex-gauge", "nex-gauge")],
        vec![nexus("nex-gauge", &[])],
        DiffluencePolicy::Reject,
    )
    .unwrap();

    let without = area_only(NormalizationMode::Sum);
    assert!(Disaggregator::new(&net, &without, &HashMap::new()).is_ok());

    let with = ModelConfig {
        include_conductivity: true,
        precip_resolution: PrecipResolution::None,
        ..without
    };
    let err = Disaggregator::new(&net, &with, &HashMap::new()).unwrap_err();
    assert_eq!(
        err,
        DisaggError::InvalidConductivity {
            catchment: "cat-1".to_string(),
            value: 0.0
        }
    );
}

// -- Non-dendritic networks --

#[test]
fn braided_network_conserves_reference_under_split() {
    let split = NexusRecord {
        id: "nex-split".to_string(),
        downstream: vec![
            BranchRecord {
                catchment: "left".to_string(),
                fraction: Some(0.4),
            },
            BranchRecord {
                catchment: "right".to_string(),
                fraction: Some(0.6),
            },
        ],
    };
    let net = Network::build(
        vec![
            catchment("top", 5.0, "nex-split", "nex-out"),
            catchment("left", 1.0, "nex-join", "nex-out"),
            catchment("right", 1.0, "nex-join", "nex-out"),
            catchment("low", 1.0, "nex-out", "nex-out"),
        ],
        vec![split, nexus("nex-join", &["low"]), nexus("nex-out", &[])],
        DiffluencePolicy::SplitByFraction,
    )
    .unwrap();
    assert!(!net.is_dendritic());

    let cfg = ModelConfig {
        area_mode: AreaMode::Cumulative,
        diffluence: DiffluencePolicy::SplitByFraction,
        ..area_only(NormalizationMode::Max)
    };
    let run = Disaggregator::new(&net, &cfg, &HashMap::new())
        .unwrap()
        .run(&[reference("nex-out", day(7, 1), vec![80.0])])
        .unwrap();
    // Cumulative: top 5, left 3, right 4, low 8.
    assert_relative_eq!(run.table.value("low", day(7, 1)).unwrap(), 80.0, epsilon = 1e-9);
    assert_relative_eq!(run.table.value("right", day(7, 1)).unwrap(), 40.0, epsilon = 1e-9);
    assert_relative_eq!(run.table.value("left", day(7, 1)).unwrap(), 30.0, epsilon = 1e-9);
    assert_relative_eq!(run.table.value("top", day(7, 1)).unwrap(), 50.0, epsilon = 1e-9);

    // Each branch carries only its share of the upstream flow.
    let violations = run.table.accumulation_violations(&net);
    assert!(!violations.is_empty());
    assert!(violations.iter().all(|v| v.upstream == "top" && v.downstream != "low"));
}

#[test]
fn braided_network_rejected_by_default() {
    let split = NexusRecord {
        id: "nex-split".to_string(),
        downstream: vec![
            BranchRecord {
                catchment: "left".to_string(),
                fraction: Some(0.5),
            },
            BranchRecord {
                catchment: "right".to_string(),
                fraction: Some(0.5),
            },
        ],
    };
    let err = Network::build(
        vec![
            catchment("top", 1.0, "nex-split", "nex-out"),
            catchment("left", 1.0, "nex-out", "nex-out"),
            catchment("right", 1.0, "nex-out", "nex-out"),
        ],
        vec![split, nexus("nex-out", &[])],
        ModelConfig::default().diffluence,
    )
    .unwrap_err();
    assert!(matches!(err, DisaggError::NonDendriticUnresolved { .. }));
}

// -- Multiple cohorts --

#[test]
fn cohorts_are_normalized_independently() {
    let net = Network::build(
        vec![
            catchment("up-1", 1.0, "nex-gauge", "nex-gauge"),
            catchment("up-2", 3.0, "nex-gauge", "nex-gauge"),
            catchment("down", 6.0, "nex-out", "nex-out"),
        ],
        vec![nexus("nex-gauge", &["down"]), nexus("nex-out", &[])],
        DiffluencePolicy::Reject,
    )
    .unwrap();
    let cfg = area_only(NormalizationMode::Sum);
    let run = Disaggregator::new(&net, &cfg, &HashMap::new())
        .unwrap()
        .run(&[
            reference("nex-gauge", day(7, 1), vec![40.0]),
            reference("nex-out", day(7, 1), vec![100.0]),
        ])
        .unwrap();
    assert_relative_eq!(run.table.value("up-1", day(7, 1)).unwrap(), 10.0, epsilon = 1e-9);
    assert_relative_eq!(run.table.value("up-2", day(7, 1)).unwrap(), 30.0, epsilon = 1e-9);
    assert_relative_eq!(run.table.value("down", day(7, 1)).unwrap(), 100.0, epsilon = 1e-9);
    assert_eq!(run.table.len(), 3);
}

#[test]
fn custom_coefficients_change_the_split() {
    let mut urban = catchment("urban", 1.0, "nex-gauge", "nex-gauge");
    urban.land_cover = [(24, 1.0)].into_iter().collect();
    let mut forest = catchment("forest", 1.0, "nex-gauge", "nex-gauge");
    forest.land_cover = [(41, 1.0)].into_iter().collect();
    let net = Network::build(
        vec![urban, forest],
        vec![nexus("nex-gauge", &[])],
        DiffluencePolicy::Reject,
    )
    .unwrap();
    let cfg = ModelVariant::AreaYield.configure(&area_only(NormalizationMode::Sum));
    let table = flowsplit_core::landcover::CoefficientTable::new(
        cfg.land_cover_level,
        BTreeMap::from([(24, 0.9), (41, 0.1)]),
    )
    .unwrap();
    let run = Disaggregator::with_table(&net, &cfg, &table, &HashMap::new())
        .unwrap()
        .run(&[reference("nex-gauge", day(7, 1), vec![10.0])])
        .unwrap();
    assert_relative_eq!(run.table.value("urban", day(7, 1)).unwrap(), 9.0, epsilon = 1e-9);
    assert_relative_eq!(run.table.value("forest", day(7, 1)).unwrap(), 1.0, epsilon = 1e-9);
}

/// Pure Rust benchmarks for the disaggregation pipeline.
///
/// Builds synthetic basins with a deterministic LCG PRNG, times each model
/// variant with std::time::Instant, and uses std::hint::black_box to
/// prevent dead-code elimination. Set `RUST_LOG=flowsplit_core=info` to see
/// the engine's own logging.
///
/// `cargo run --release -p flowsplit-core --features bench --bin flowsplit-bench`
use std::collections::{BTreeMap, HashMap};
use std::hint::black_box;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing_subscriber::EnvFilter;

use flowsplit_core::config::{ModelConfig, ModelVariant};
use flowsplit_core::engine::{Disaggregator, ReferenceSeries};
use flowsplit_core::error::{DisaggError, Result};
use flowsplit_core::network::{
    BranchRecord, CatchmentRecord, DiffluencePolicy, Network, NexusRecord,
};
use flowsplit_core::series::DailySeries;
use flowsplit_core::travel_time::ReachGeometry;

const REPEATS: usize = 7;
const BASINS: usize = 8;
const DAYS: usize = 365;
const LAND_COVER: [u16; 6] = [11, 21, 41, 52, 81, 90];

/// Simple LCG PRNG for deterministic data generation.
struct Lcg(u64);

impl Lcg {
    fn next_f64(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as f64 / (1u64 << 31) as f64
    }
}

struct Basin {
    network: Network,
    precipitation: HashMap<String, DailySeries>,
    references: Vec<ReferenceSeries>,
}

/// `BASINS` random trees of `per_basin` catchments each, one cohort per
/// basin outlet.
fn make_basin(per_basin: usize, seed: u64) -> Result<Basin> {
    let mut rng = Lcg(seed);
    let start = NaiveDate::from_ymd_opt(2021, 1, 1)
        .ok_or_else(|| DisaggError::invalid_input("bench", "bad start date"))?;
    let mut catchments = Vec::new();
    let mut nexuses = Vec::new();
    let mut precipitation = HashMap::new();
    let mut references = Vec::new();

    for b in 0..BASINS {
        let outlet = format!("nex-{b}-out");
        nexuses.push(NexusRecord {
            id: outlet.clone(),
            downstream: Vec::new(),
        });
        for i in 0..per_basin {
            let id = format!("cat-{b}-{i}");
            // Catchment i drains into the nexus above some earlier catchment.
            let to_nexus = if i == 0 {
                outlet.clone()
            } else {
                let parent = (rng.next_f64() * i as f64) as usize;
                format!("nex-{b}-{parent}")
            };
            nexuses.push(NexusRecord {
                id: format!("nex-{b}-{i}"),
                downstream: vec![BranchRecord {
                    catchment: id.clone(),
                    fraction: None,
                }],
            });

            let first = LAND_COVER[(rng.next_f64() * 6.0) as usize % 6];
            let second = LAND_COVER[(rng.next_f64() * 6.0) as usize % 6];
            let split = 0.2 + rng.next_f64() * 0.6;
            let mut land_cover = BTreeMap::new();
            *land_cover.entry(first).or_insert(0.0) += split;
            *land_cover.entry(second).or_insert(0.0) += 1.0 - split;

            catchments.push(CatchmentRecord {
                id: id.clone(),
                area_km2: 0.5 + rng.next_f64() * 20.0,
                to_nexus,
                reference_nexus: outlet.clone(),
                land_cover,
                conductivity: 0.1 + rng.next_f64() * 5.0,
                reach: ReachGeometry::placeholder(500.0 + rng.next_f64() * 5000.0),
            });

            let rain: Vec<f64> = (0..DAYS)
                .map(|_| {
                    let r = rng.next_f64();
                    if r < 0.6 {
                        0.0
                    } else {
                        r * 25.0
                    }
                })
                .collect();
            precipitation.insert(id.clone(), DailySeries::new(&id, start, rain)?);
        }

        let flow: Vec<f64> = (0..DAYS).map(|_| 5.0 + rng.next_f64() * 100.0).collect();
        references.push(ReferenceSeries::new(
            outlet.clone(),
            DailySeries::new(&outlet, start, flow)?,
        )?);
    }

    Ok(Basin {
        network: Network::build(catchments, nexuses, DiffluencePolicy::Reject)?,
        precipitation,
        references,
    })
}

/// Run a closure `REPEATS` times, return the median duration.
fn median_time<F: FnMut()>(mut f: F) -> Duration {
    let mut times: Vec<Duration> = (0..REPEATS)
        .map(|_| {
            let start = Instant::now();
            f();
            start.elapsed()
        })
        .collect();
    times.sort();
    times[REPEATS / 2]
}

fn bench_variant(
    basin: &Basin,
    variant: ModelVariant,
    parallel: bool,
) -> Result<Duration> {
    let base = ModelConfig {
        parallel,
        ..ModelConfig::default()
    };
    let config = variant.configure(&base);
    let disaggregator = Disaggregator::new(&basin.network, &config, &basin.precipitation)?;

    // Warmup
    black_box(disaggregator.run(&basin.references)?);

    let mut failure = None;
    let dur = median_time(|| {
        if let Err(e) = disaggregator.run(&basin.references).map(black_box) {
            failure = Some(e);
        }
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(dur),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("flowsplit Disaggregation Benchmarks");
    println!("============================================================");
    println!(
        "{:<18} {:>6} {:>9}   {:>12}",
        "Variant", "N", "Threads", "Median (ms)"
    );
    println!("--------------------------------------------------------");

    for per_basin in [50, 500] {
        let basin = make_basin(per_basin, 42)?;
        for variant in ModelVariant::ALL {
            for parallel in [false, true] {
                let dur = bench_variant(&basin, variant, parallel)?;
                let ms = dur.as_secs_f64() * 1000.0;
                let threads = if parallel { "rayon" } else { "1" };
                println!(
                    "{:<18} {:>6} {:>9}      {:>8.2}",
                    format!("{variant:?}"),
                    basin.network.len(),
                    threads,
                    ms
                );
            }
        }
    }

    println!("============================================================");
    Ok(())
}

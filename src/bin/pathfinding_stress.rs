//! Stress harness for the pathfinding pool.
//!
//! Builds a random obstacle field, keeps the workers busy with random requests
//! for a few seconds while pumping `update()` like a game loop, and logs pool
//! statistics once per second.
//!
//! Usage: `pathfinding-stress [config.json]`

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use godo_pathing::tiles::{ChunkedTileMap, Tile};
use godo_pathing::{logging, BrokerConfig, BrokerError, Outcome, PathState, Pathfinding, PathfindingRequest};

const MAP_SIZE: i32 = 256;
const BLOCKED_CHANCE: f64 = 0.2;
const SEED: u64 = 0x5EED;
const REQUESTS_PER_TICK: usize = 16;
const MAX_REQUEST_SPAN: i32 = 48;
const TICK: Duration = Duration::from_millis(16);
const RUN_FOR: Duration = Duration::from_secs(5);

type Tally = Arc<Mutex<HashMap<(Outcome, PathState), usize>>>;

fn build_map(rng: &mut StdRng) -> ChunkedTileMap {
    let map = ChunkedTileMap::new();
    for y in 0..MAP_SIZE {
        for x in 0..MAP_SIZE {
            let tile = if rng.random_bool(BLOCKED_CHANCE) {
                Tile::BLOCKED
            } else {
                Tile::walkable(rng.random_range(1.0..3.0))
            };
            map.set_tile(x, y, tile);
        }
    }
    map
}

fn random_request(rng: &mut StdRng, tally: &Tally) -> PathfindingRequest {
    let start_x = rng.random_range(0..MAP_SIZE);
    let start_y = rng.random_range(0..MAP_SIZE);
    let end_x = (start_x + rng.random_range(-MAX_REQUEST_SPAN..=MAX_REQUEST_SPAN)).clamp(0, MAP_SIZE - 1);
    let end_y = (start_y + rng.random_range(-MAX_REQUEST_SPAN..=MAX_REQUEST_SPAN)).clamp(0, MAP_SIZE - 1);

    let tally = Arc::clone(tally);
    PathfindingRequest::new(start_x, start_y, end_x, end_y, move |outcome, result| {
        *tally.lock().entry((outcome, result.status)).or_insert(0) += 1;
    })
}

fn log_statistics(pathfinding: &Pathfinding) {
    let summary = pathfinding.summary();
    info!(
        pending = summary.pending,
        pooled = summary.pooled_envelopes,
        jobs_per_window = summary.processed_last_window,
        "Pool"
    );
    for (index, stats) in pathfinding.statistics().iter().enumerate() {
        info!(
            worker = index,
            usage = %format!("{:.1}%", stats.average_usage * 100.0),
            jobs = stats.processed_last_window,
            min_us = stats.min_process_time().as_micros() as u64,
            mean_us = stats.mean_process_time().as_micros() as u64,
            max_us = stats.max_process_time().as_micros() as u64,
            "Worker"
        );
    }
}

fn main() -> Result<(), BrokerError> {
    logging::init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!(%path, "Loading config");
            BrokerConfig::from_json_file(path)?
        }
        None => BrokerConfig::default(),
    };
    let stats_window = config.stats_window();

    let mut rng = StdRng::seed_from_u64(SEED);
    let map = Arc::new(build_map(&mut rng));
    info!(tiles = ?map.stats(), "Map ready");

    let pathfinding = Pathfinding::new(config, &map)?;
    pathfinding.start()?;

    let tally: Tally = Arc::default();
    let mut posted = 0usize;
    let started = Instant::now();
    let mut last_report = Instant::now();

    while started.elapsed() < RUN_FOR {
        for _ in 0..REQUESTS_PER_TICK {
            pathfinding.post(random_request(&mut rng, &tally));
            posted += 1;
        }

        pathfinding.update();

        if last_report.elapsed() >= stats_window {
            log_statistics(&pathfinding);
            last_report = Instant::now();
        }
        thread::sleep(TICK);
    }

    pathfinding.shutdown();

    let tally = tally.lock();
    let delivered: usize = tally.values().sum();
    let mut rows: Vec<_> = tally.iter().collect();
    rows.sort_by_key(|((outcome, status), _)| (format!("{outcome:?}"), status.as_str()));
    for ((outcome, status), count) in rows {
        info!(?outcome, %status, count, "Result");
    }

    if delivered != posted {
        warn!(posted, delivered, "Some requests were never delivered");
    } else {
        info!(posted, "All requests delivered");
    }
    Ok(())
}

//! Spatial A* under departure-time weather.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::debug;

use crate::config::SafetyLimits;
use crate::error::{Error, Result};
use crate::geo::{BoundingBox, LatLon};
use crate::weather::MetOcean;

use super::grid::SearchGrid;
use super::{
    Engine, FloatOrd, Itinerary, Leg, RouteSearch, SearchContext, CANCEL_CHECK_INTERVAL, COST_EPSILON,
};

/// Shrinks the heuristic just below the bound so rounding never makes it
/// overestimate.
const HEURISTIC_SLACK: f64 = 1.0 - 1e-9;

/// Grid A* with a great-circle fuel heuristic.
///
/// Weather is sampled once per node at the departure time, so the search
/// does not see weather evolve. Nodes outside the safety limits are removed
/// from the graph, except the start node.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpatialAStar;

impl RouteSearch for SpatialAStar {
    fn engine(&self) -> Engine {
        Engine::Astar
    }

    fn search(&self, start: LatLon, end: LatLon, ctx: &SearchContext<'_>) -> Result<Itinerary> {
        let min_rate = ctx.cost.min_fuel_rate(ctx.speed_kts, ctx.is_laden)?;
        let bbox = BoundingBox::around(start, end, ctx.config.grid_margin_deg);
        let grid = SearchGrid::build(bbox, ctx.config.grid_resolution_deg, ctx.mask);

        let no_path = || Error::no_path(start, end);
        let start_node = grid.nearest_navigable(start).ok_or_else(no_path)?;
        let goal_node = grid.nearest_navigable(end).ok_or_else(no_path)?;

        let weather = (0..grid.len())
            .map(|node| ctx.field.sample(grid.position(node), ctx.departure))
            .collect();
        let layer = SpatialLayer::new(&grid, weather, &ctx.limits, start_node);
        let rate = heuristic_rate(min_rate, ctx.speed_kts, layer.max_current_kts);

        let outcome = shortest_path(ctx, &layer, start_node, goal_node, rate)?.ok_or_else(no_path)?;
        debug!(
            expanded = outcome.expanded,
            score = outcome.score,
            legs = outcome.legs.len(),
            safety_level = ctx.safety_level,
            "a* search finished"
        );

        let mut legs = Vec::with_capacity(outcome.legs.len() + 2);
        let first = ctx
            .field
            .sample(start, ctx.departure)
            .average(&layer.weather[start_node]);
        legs.extend(ctx.connector(start, grid.position(start_node), &first, (start, end))?);
        legs.extend(outcome.legs);
        let last = layer.weather[goal_node].average(&ctx.field.sample(end, ctx.departure));
        legs.extend(ctx.connector(grid.position(goal_node), end, &last, (start, end))?);

        Ok(Itinerary::from_legs(Engine::Astar, ctx, start, legs))
    }
}

/// Grid nodes with their departure-time weather and safety admission.
struct SpatialLayer<'g> {
    grid: &'g SearchGrid,
    weather: Vec<MetOcean>,
    allowed: Vec<bool>,
    max_current_kts: f64,
}

impl<'g> SpatialLayer<'g> {
    fn new(grid: &'g SearchGrid, weather: Vec<MetOcean>, limits: &SafetyLimits, start: usize) -> Self {
        let allowed = weather
            .iter()
            .enumerate()
            .map(|(node, w)| node == start || limits.allows(w.wind_speed_ms(), w.wave_hs))
            .collect();
        let max_current_kts = weather
            .iter()
            .map(MetOcean::current_speed_kts)
            .fold(0.0, f64::max);
        Self {
            grid,
            weather,
            allowed,
            max_current_kts,
        }
    }

    /// Leg between adjacent nodes and its search weight.
    fn edge(&self, ctx: &SearchContext<'_>, from: usize, to: usize) -> Result<Option<(Leg, f64)>> {
        let weather = self.weather[from].average(&self.weather[to]);
        let Some(leg) = ctx.cost_leg(self.grid.position(from), self.grid.position(to), &weather)? else {
            return Ok(None);
        };
        let exposure = ctx.limits.exposure(leg.wind_ms, leg.wave_hs_m);
        let weight = leg.fuel_mt * (1.0 + ctx.config.safety_weight * exposure);
        Ok(Some((leg, weight)))
    }
}

/// Fuel per nautical mile no edge can beat: the lowest fuel rate spread
/// over the fastest possible ground speed.
fn heuristic_rate(min_fuel_rate: f64, speed_kts: f64, max_current_kts: f64) -> f64 {
    min_fuel_rate / (speed_kts + max_current_kts) * HEURISTIC_SLACK
}

struct Outcome {
    score: f64,
    legs: Vec<Leg>,
    expanded: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AStarEntry {
    node: usize,
    estimate: FloatOrd,
    seq: u64,
}

impl AStarEntry {
    fn new(node: usize, cost: f64, heuristic: f64, seq: u64) -> Self {
        Self {
            node,
            estimate: FloatOrd(cost + heuristic),
            seq,
        }
    }
}

impl Ord for AStarEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .estimate
            .cmp(&self.estimate)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for AStarEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A* from `start` to `goal`. A `heuristic_rate` of zero makes this Dijkstra.
fn shortest_path(
    ctx: &SearchContext<'_>,
    layer: &SpatialLayer<'_>,
    start: usize,
    goal: usize,
    heuristic_rate: f64,
) -> Result<Option<Outcome>> {
    let grid = layer.grid;
    let goal_pos = grid.position(goal);
    let heuristic = |node: usize| grid.position(node).distance_nm(&goal_pos) * heuristic_rate;

    let n = grid.len();
    let mut score = vec![f64::INFINITY; n];
    let mut distance = vec![f64::INFINITY; n];
    let mut latest = vec![0u64; n];
    let mut closed = vec![false; n];
    let mut parents: Vec<Option<(usize, Leg)>> = vec![None; n];
    let mut heap = BinaryHeap::new();
    let mut seq = 0u64;
    let mut expanded = 0usize;

    score[start] = 0.0;
    distance[start] = 0.0;
    heap.push(AStarEntry::new(start, 0.0, heuristic(start), seq));

    ctx.check_cancelled()?;
    while let Some(AStarEntry { node, seq: entry_seq, .. }) = heap.pop() {
        if closed[node] || entry_seq != latest[node] {
            continue;
        }
        closed[node] = true;
        expanded += 1;
        if expanded % CANCEL_CHECK_INTERVAL == 0 {
            ctx.check_cancelled()?;
        }

        if node == goal {
            return Ok(Some(Outcome {
                score: score[goal],
                legs: reconstruct_legs(&parents, start, goal),
                expanded,
            }));
        }

        for next in grid.neighbors(node, ctx.config.connectivity) {
            if closed[next] || !layer.allowed[next] {
                continue;
            }
            let Some((leg, weight)) = layer.edge(ctx, node, next)? else {
                continue;
            };
            let next_score = score[node] + weight;
            let next_distance = distance[node] + leg.distance_nm;
            let improves = next_score < score[next] - COST_EPSILON
                || ((next_score - score[next]).abs() <= COST_EPSILON && next_distance < distance[next]);
            if !improves {
                continue;
            }
            score[next] = next_score;
            distance[next] = next_distance;
            parents[next] = Some((node, leg));
            seq += 1;
            latest[next] = seq;
            heap.push(AStarEntry::new(next, next_score, heuristic(next), seq));
        }
    }

    Ok(None)
}

fn reconstruct_legs(parents: &[Option<(usize, Leg)>], start: usize, goal: usize) -> Vec<Leg> {
    let mut legs = Vec::new();
    let mut current = goal;
    while current != start {
        match &parents[current] {
            Some((previous, leg)) => {
                legs.push(*leg);
                current = *previous;
            }
            None => break,
        }
    }
    legs.reverse();
    legs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::routing::mask::{LandMask, OpenSea};
    use crate::routing::{Connectivity, NavigabilityMask, Strategy as RouteStrategy};
    use crate::vessel::{CostModel, VesselSpecs};
    use crate::weather::WeatherField;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use tokio_util::sync::CancellationToken;

    const PERMISSIVE: SafetyLimits = SafetyLimits {
        max_wind_ms: 100.0,
        max_wave_m: 100.0,
    };

    struct Fixture {
        cost: CostModel,
        field: WeatherField,
        config: SearchConfig,
        cancel: CancellationToken,
    }

    impl Fixture {
        fn new(config: SearchConfig) -> Self {
            Self {
                cost: CostModel::new(VesselSpecs::default()).unwrap(),
                field: WeatherField::calm(),
                config,
                cancel: CancellationToken::new(),
            }
        }

        fn ctx<'a>(&'a self, mask: &'a dyn NavigabilityMask, limits: SafetyLimits) -> SearchContext<'a> {
            SearchContext {
                cost: &self.cost,
                field: &self.field,
                mask,
                config: &self.config,
                limits,
                safety_level: 1.0,
                strategy: RouteStrategy::Fuel,
                departure: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
                speed_kts: 14.5,
                is_laden: true,
                cancel: &self.cancel,
            }
        }
    }

    #[test]
    fn calm_meridian_route_matches_great_circle() {
        let fixture = Fixture::new(SearchConfig::default());
        let ctx = fixture.ctx(&OpenSea, PERMISSIVE);
        let start = LatLon::new(10.0, -30.0);
        let end = LatLon::new(15.0, -30.0);

        let itinerary = SpatialAStar.search(start, end, &ctx).unwrap();
        let gc = start.distance_nm(&end);
        assert!((itinerary.total_distance_nm - gc).abs() < 1e-6);

        let rate = fixture.cost.min_fuel_rate(14.5, true).unwrap();
        let calm = fixture
            .cost
            .edge_cost(14.5, 0.0, true, &MetOcean::calm())
            .unwrap()
            .fuel_mt_per_hour;
        assert!(calm >= rate);
        assert!((itinerary.total_fuel_mt - calm * gc / 14.5).abs() < 1e-6);
        assert_eq!(itinerary.waypoints.first().unwrap().position, start);
        assert_eq!(itinerary.waypoints.last().unwrap().position, end);
        assert!(!itinerary.weather_used);
    }

    #[test]
    fn calm_diagonal_route_stays_near_great_circle() {
        let fixture = Fixture::new(SearchConfig::default());
        let ctx = fixture.ctx(&OpenSea, PERMISSIVE);
        let start = LatLon::new(40.0, -20.0);
        let end = LatLon::new(44.0, -14.0);
        let itinerary = SpatialAStar.search(start, end, &ctx).unwrap();
        let gc = start.distance_nm(&end);
        assert!(itinerary.total_distance_nm >= gc - 1e-6);
        // 8-connected grids detour at most ~8% on oblique courses.
        assert!(itinerary.total_distance_nm < gc * 1.1);
    }

    #[test]
    fn endpoints_off_grid_get_connectors() {
        let fixture = Fixture::new(SearchConfig::default());
        let ctx = fixture.ctx(&OpenSea, PERMISSIVE);
        let start = LatLon::new(10.1, -30.2);
        let end = LatLon::new(12.3, -29.9);
        let itinerary = SpatialAStar.search(start, end, &ctx).unwrap();
        assert_eq!(itinerary.waypoints[0].position, start);
        assert_eq!(itinerary.waypoints[1].position, LatLon::new(10.0, -30.0));
        assert_eq!(itinerary.waypoints.last().unwrap().position, end);
        assert_eq!(itinerary.legs.len(), itinerary.waypoints.len() - 1);
        let etas: Vec<_> = itinerary.waypoints.iter().map(|w| w.eta).collect();
        assert!(etas.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn routes_around_land() {
        let fixture = Fixture::new(SearchConfig::default());
        let mask = LandMask::new().with_block(BoundingBox::new(11.2, 13.8, -31.2, -28.8));
        let ctx = fixture.ctx(&mask, PERMISSIVE);
        let start = LatLon::new(10.0, -30.0);
        let end = LatLon::new(15.0, -30.0);
        let itinerary = SpatialAStar.search(start, end, &ctx).unwrap();
        assert!(itinerary
            .waypoints
            .iter()
            .all(|w| mask.is_navigable(w.position)));
        assert!(itinerary.total_distance_nm > start.distance_nm(&end));
    }

    #[test]
    fn enclosed_goal_has_no_path() {
        let fixture = Fixture::new(SearchConfig::default());
        // A ring of land around the goal.
        let mask = LandMask::new()
            .with_block(BoundingBox::new(13.8, 14.2, -31.2, -28.8))
            .with_block(BoundingBox::new(15.8, 16.2, -31.2, -28.8))
            .with_block(BoundingBox::new(13.8, 16.2, -31.2, -30.8))
            .with_block(BoundingBox::new(13.8, 16.2, -29.2, -28.8));
        let ctx = fixture.ctx(&mask, PERMISSIVE);
        let err = SpatialAStar
            .search(LatLon::new(10.0, -30.0), LatLon::new(15.0, -30.0), &ctx)
            .unwrap_err();
        assert!(matches!(err, Error::NoPath { .. }));
    }

    #[test]
    fn speed_above_maximum_is_rejected() {
        let fixture = Fixture::new(SearchConfig::default());
        let mut ctx = fixture.ctx(&OpenSea, PERMISSIVE);
        ctx.speed_kts = 40.0;
        let err = SpatialAStar
            .search(LatLon::new(10.0, -30.0), LatLon::new(15.0, -30.0), &ctx)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSpeed { .. }));
    }

    #[test]
    fn cancelled_search_stops() {
        let fixture = Fixture::new(SearchConfig {
            grid_resolution_deg: 0.1,
            ..SearchConfig::default()
        });
        fixture.cancel.cancel();
        let ctx = fixture.ctx(&OpenSea, PERMISSIVE);
        let err = SpatialAStar
            .search(LatLon::new(10.0, -30.0), LatLon::new(20.0, -20.0), &ctx)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    fn weather_strategy() -> impl Strategy<Value = Vec<MetOcean>> {
        prop::collection::vec(
            (0.0f64..20.0, 0.0f64..360.0, 0.0f64..4.0, 0.0f64..1.0, 0.0f64..360.0),
            25,
        )
        .prop_map(|cells| {
            cells
                .into_iter()
                .map(|(wind, wind_from, hs, current, toward)| {
                    MetOcean::from_wind(wind, wind_from)
                        .with_waves(hs, wind_from)
                        .with_current(current, toward)
                })
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn heuristic_never_overestimates(
            weather in weather_strategy(),
            safety_weight in 0.0f64..2.0,
            sixteen in any::<bool>(),
        ) {
            let fixture = Fixture::new(SearchConfig {
                safety_weight,
                connectivity: if sixteen { Connectivity::Sixteen } else { Connectivity::Eight },
                ..SearchConfig::default()
            });
            let ctx = fixture.ctx(&OpenSea, PERMISSIVE);
            let grid = SearchGrid::build(BoundingBox::new(0.0, 4.0, 0.0, 4.0), 1.0, &OpenSea);
            let layer = SpatialLayer::new(&grid, weather, &PERMISSIVE, 0);
            let min_rate = fixture.cost.min_fuel_rate(ctx.speed_kts, true).unwrap();
            let rate = heuristic_rate(min_rate, ctx.speed_kts, layer.max_current_kts);
            let goal = grid.len() - 1;

            let brute = shortest_path(&ctx, &layer, 0, goal, 0.0).unwrap().unwrap();
            let guided = shortest_path(&ctx, &layer, 0, goal, rate).unwrap().unwrap();

            // Every node's estimate stays below its true cost to the goal.
            for node in 0..grid.len() {
                let truth = shortest_path(&ctx, &layer, node, goal, 0.0).unwrap().unwrap();
                let estimate = grid.position(node).distance_nm(&grid.position(goal)) * rate;
                prop_assert!(estimate <= truth.score + 1e-9);
            }
            prop_assert!((guided.score - brute.score).abs() <= 1e-6 * brute.score.max(1.0));
        }
    }
}

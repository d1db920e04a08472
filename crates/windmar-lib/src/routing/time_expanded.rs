//! Time-expanded Dijkstra over `(cell, time step)` states.
//!
//! Labels carry the exact elapsed time; states are bucketed by
//! `floor(elapsed / step)`. Each transition is costed with the weather of its
//! departure step, and the safety limits are a hard constraint: the target
//! cell at its arrival step and the edge midpoint at departure must both be
//! inside them. A transition may span several steps; the span limit is
//! measured in hours through the water.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{Error, Result};
use crate::geo::{BoundingBox, LatLon};
use crate::weather::{MetOcean, WeatherField};

use super::grid::SearchGrid;
use super::{
    hours, Engine, FloatOrd, Itinerary, Leg, RouteSearch, SearchContext, CANCEL_CHECK_INTERVAL,
    COST_EPSILON,
};

/// Dijkstra over the time-expanded graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeExpanded;

impl RouteSearch for TimeExpanded {
    fn engine(&self) -> Engine {
        Engine::TimeExpanded
    }

    fn search(&self, start: LatLon, end: LatLon, ctx: &SearchContext<'_>) -> Result<Itinerary> {
        // Validates the speed before any grid work.
        ctx.cost.min_fuel_rate(ctx.speed_kts, ctx.is_laden)?;
        let no_path = || Error::no_path(start, end);

        let horizon_hours = match ctx.field.last_valid_time() {
            Some(last) => (last - ctx.departure).num_seconds() as f64 / 3600.0,
            None => ctx.config.max_voyage_hours,
        };
        if horizon_hours <= 0.0 {
            return Err(no_path());
        }

        let bbox = BoundingBox::around(start, end, ctx.config.grid_margin_deg);
        let grid = SearchGrid::build(bbox, ctx.config.te_resolution_deg, ctx.mask);
        let start_node = grid.nearest_navigable(start).ok_or_else(no_path)?;
        let goal_node = grid.nearest_navigable(end).ok_or_else(no_path)?;

        let mut weather = StepWeather::new(ctx.field, &grid, ctx.departure, ctx.config.time_step_hours);
        let first = ctx
            .field
            .sample(start, ctx.departure)
            .average(&weather.at(0, start_node));
        let head = ctx.connector(start, grid.position(start_node), &first, (start, end))?;

        let span_steps = edge_span_steps(ctx, &grid);
        let mut search = StateSearch {
            ctx,
            grid: &grid,
            weather: &mut weather,
            horizon_hours,
            max_edge_hours: ctx.config.time_step_hours * span_steps as f64,
        };
        let origin = head.map_or((0.0, 0.0), |leg| (leg.fuel_mt, leg.hours));
        let arrival = search.run(start_node, goal_node, origin)?.ok_or_else(no_path)?;
        debug!(
            expanded = arrival.expanded,
            states = arrival.states,
            span_steps,
            fuel_mt = arrival.fuel,
            elapsed_hours = arrival.elapsed,
            safety_level = ctx.safety_level,
            "time-expanded search finished"
        );

        let arrival_step = weather.step_of(arrival.elapsed);
        let last = weather
            .at(arrival_step, goal_node)
            .average(&ctx.field.sample(end, ctx.departure + hours(arrival.elapsed)));
        let tail = ctx.connector(grid.position(goal_node), end, &last, (start, end))?;

        let mut legs = Vec::with_capacity(arrival.legs.len() + 2);
        legs.extend(head);
        legs.extend(arrival.legs);
        legs.extend(tail);
        Ok(Itinerary::from_legs(Engine::TimeExpanded, ctx, start, legs))
    }
}

/// Steps one transition may span: the configured limit, or enough for the
/// longest grid edge at the requested speed.
fn edge_span_steps(ctx: &SearchContext<'_>, grid: &SearchGrid) -> u32 {
    match ctx.config.max_steps_per_edge {
        Some(steps) => steps,
        None => {
            let longest_hours = grid.longest_edge_nm(ctx.config.connectivity) / ctx.speed_kts;
            ((longest_hours / ctx.config.time_step_hours).ceil() as u32).max(1)
        }
    }
}

/// Per-step node weather, sampled on first use.
struct StepWeather<'a> {
    field: &'a WeatherField,
    grid: &'a SearchGrid,
    departure: DateTime<Utc>,
    step_hours: f64,
    steps: HashMap<u32, Vec<MetOcean>>,
}

impl<'a> StepWeather<'a> {
    fn new(field: &'a WeatherField, grid: &'a SearchGrid, departure: DateTime<Utc>, step_hours: f64) -> Self {
        Self {
            field,
            grid,
            departure,
            step_hours,
            steps: HashMap::new(),
        }
    }

    fn step_of(&self, elapsed_hours: f64) -> u32 {
        (elapsed_hours / self.step_hours).floor().max(0.0) as u32
    }

    fn valid_time(&self, step: u32) -> DateTime<Utc> {
        self.departure + hours(step as f64 * self.step_hours)
    }

    fn at(&mut self, step: u32, node: usize) -> MetOcean {
        let (field, grid) = (self.field, self.grid);
        let time = self.valid_time(step);
        self.steps.entry(step).or_insert_with(|| {
            (0..grid.len())
                .map(|n| field.sample(grid.position(n), time))
                .collect()
        })[node]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct StateKey {
    node: usize,
    step: u32,
}

struct Label {
    fuel: f64,
    elapsed: f64,
    seq: u64,
    parent: Option<(StateKey, Leg)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueEntry {
    key: StateKey,
    fuel: FloatOrd,
    elapsed: FloatOrd,
    seq: u64,
}

impl QueueEntry {
    fn new(key: StateKey, fuel: f64, elapsed: f64, seq: u64) -> Self {
        Self {
            key,
            fuel: FloatOrd(fuel),
            elapsed: FloatOrd(elapsed),
            seq,
        }
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .fuel
            .cmp(&self.fuel)
            .then_with(|| other.elapsed.cmp(&self.elapsed))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Arrival {
    fuel: f64,
    elapsed: f64,
    legs: Vec<Leg>,
    expanded: usize,
    states: usize,
}

struct StateSearch<'s, 'a> {
    ctx: &'s SearchContext<'a>,
    grid: &'s SearchGrid,
    weather: &'s mut StepWeather<'a>,
    horizon_hours: f64,
    /// Longest transition, hours through the water.
    max_edge_hours: f64,
}

impl StateSearch<'_, '_> {
    fn allowed(&self, weather: &MetOcean) -> bool {
        self.ctx.limits.allows(weather.wind_speed_ms(), weather.wave_hs)
    }

    /// Cheapest arrival at `goal` over all arrival times. `origin` is the
    /// fuel and elapsed hours already spent reaching `start`.
    fn run(&mut self, start: usize, goal: usize, origin: (f64, f64)) -> Result<Option<Arrival>> {
        let (ctx, grid) = (self.ctx, self.grid);
        let (start_fuel, start_elapsed) = origin;
        if start_elapsed > self.horizon_hours {
            return Ok(None);
        }

        let mut labels: HashMap<StateKey, Label> = HashMap::new();
        let mut closed: HashSet<StateKey> = HashSet::new();
        let mut heap = BinaryHeap::new();
        let mut seq = 0u64;
        let mut expanded = 0usize;

        let start_key = StateKey {
            node: start,
            step: self.weather.step_of(start_elapsed),
        };
        labels.insert(
            start_key,
            Label {
                fuel: start_fuel,
                elapsed: start_elapsed,
                seq,
                parent: None,
            },
        );
        heap.push(QueueEntry::new(start_key, start_fuel, start_elapsed, seq));

        ctx.check_cancelled()?;
        while let Some(entry) = heap.pop() {
            let key = entry.key;
            let (fuel, elapsed) = match labels.get(&key) {
                Some(label) if label.seq == entry.seq => (label.fuel, label.elapsed),
                _ => continue,
            };
            if !closed.insert(key) {
                continue;
            }
            expanded += 1;
            if expanded % CANCEL_CHECK_INTERVAL == 0 {
                ctx.check_cancelled()?;
            }

            if key.node == goal {
                return Ok(Some(Arrival {
                    fuel,
                    elapsed,
                    legs: reconstruct_legs(&labels, key),
                    expanded,
                    states: labels.len(),
                }));
            }

            let from = grid.position(key.node);
            let departure_time = self.weather.valid_time(key.step);
            for next in grid.neighbors(key.node, ctx.config.connectivity) {
                let to = grid.position(next);
                let midpoint = ctx.field.sample(from.midpoint(&to), departure_time);
                if !self.allowed(&midpoint) {
                    continue;
                }
                let edge_weather = self
                    .weather
                    .at(key.step, key.node)
                    .average(&self.weather.at(key.step, next));
                let Some(leg) = ctx.cost_leg(from, to, &edge_weather)? else {
                    continue;
                };
                if leg.distance_nm / ctx.speed_kts > self.max_edge_hours + COST_EPSILON {
                    continue;
                }
                let arrival = elapsed + leg.hours;
                if arrival > self.horizon_hours {
                    continue;
                }

                let next_key = StateKey {
                    node: next,
                    step: self.weather.step_of(arrival),
                };
                if closed.contains(&next_key) {
                    continue;
                }
                let at_arrival = self.weather.at(next_key.step, next);
                if !self.allowed(&at_arrival) {
                    continue;
                }

                let next_fuel = fuel + leg.fuel_mt;
                let improves = match labels.get(&next_key) {
                    None => true,
                    Some(existing) => {
                        next_fuel < existing.fuel - COST_EPSILON
                            || ((next_fuel - existing.fuel).abs() <= COST_EPSILON
                                && arrival < existing.elapsed)
                    }
                };
                if !improves {
                    continue;
                }
                seq += 1;
                labels.insert(
                    next_key,
                    Label {
                        fuel: next_fuel,
                        elapsed: arrival,
                        seq,
                        parent: Some((key, leg)),
                    },
                );
                heap.push(QueueEntry::new(next_key, next_fuel, arrival, seq));
            }
        }

        Ok(None)
    }
}

fn reconstruct_legs(labels: &HashMap<StateKey, Label>, goal: StateKey) -> Vec<Leg> {
    let mut legs = Vec::new();
    let mut current = goal;
    while let Some((previous, leg)) = labels.get(&current).and_then(|label| label.parent) {
        legs.push(leg);
        current = previous;
    }
    legs.reverse();
    legs
}

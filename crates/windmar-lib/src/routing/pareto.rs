//! Non-dominated filtering of itineraries on fuel and voyage time.

use super::Itinerary;

/// `a` is no worse than `b` on both objectives and better on one.
fn dominates(a: &Itinerary, b: &Itinerary) -> bool {
    a.total_fuel_mt <= b.total_fuel_mt
        && a.total_hours <= b.total_hours
        && (a.total_fuel_mt < b.total_fuel_mt || a.total_hours < b.total_hours)
}

/// Itineraries not dominated on (fuel, time), sorted by fuel ascending.
///
/// Identical itineraries do not dominate each other, so all copies are kept.
pub fn pareto_front(itineraries: &[Itinerary]) -> Vec<Itinerary> {
    let mut front: Vec<Itinerary> = itineraries
        .iter()
        .filter(|candidate| !itineraries.iter().any(|other| dominates(other, candidate)))
        .cloned()
        .collect();
    front.sort_by(|a, b| a.total_fuel_mt.total_cmp(&b.total_fuel_mt));
    front
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{Engine, Strategy};
    use chrono::Utc;

    fn solution(fuel: f64, hours: f64) -> Itinerary {
        let now = Utc::now();
        Itinerary {
            engine: Engine::Astar,
            strategy: Strategy::Pareto,
            safety_level: 0.0,
            waypoints: Vec::new(),
            legs: Vec::new(),
            total_distance_nm: 100.0,
            total_hours: hours,
            total_fuel_mt: fuel,
            departure: now,
            arrival: now,
            weather_used: false,
            forecast_run_ids: Vec::new(),
        }
    }

    fn fuels(front: &[Itinerary]) -> Vec<f64> {
        front.iter().map(|s| s.total_fuel_mt).collect()
    }

    #[test]
    fn trivial_inputs() {
        assert!(pareto_front(&[]).is_empty());
        assert_eq!(pareto_front(&[solution(50.0, 100.0)]).len(), 1);
    }

    #[test]
    fn dominated_solutions_are_removed() {
        let front = pareto_front(&[solution(50.0, 100.0), solution(60.0, 110.0)]);
        assert_eq!(fuels(&front), vec![50.0]);
    }

    #[test]
    fn trade_offs_are_kept() {
        let front = pareto_front(&[solution(50.0, 120.0), solution(70.0, 90.0)]);
        assert_eq!(front.len(), 2);
    }

    #[test]
    fn identical_solutions_survive() {
        let front = pareto_front(&[solution(50.0, 100.0), solution(50.0, 100.0)]);
        assert!(!front.is_empty());
    }

    #[test]
    fn mixed_front_is_sorted_by_fuel() {
        let front = pareto_front(&[
            solution(80.0, 85.0),
            solution(65.0, 110.0),
            solution(40.0, 130.0),
            solution(60.0, 100.0),
        ]);
        assert_eq!(fuels(&front), vec![40.0, 60.0, 80.0]);
        assert!(front.last().unwrap().total_hours <= front[0].total_hours);
    }
}

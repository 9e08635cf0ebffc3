//! Crew summary computed once when a session completes
//!
//! Pure functions over the membership history and the ledger; nothing here
//! touches coordinator state.

use chrono::{DateTime, Utc};
use growdash_common::harvest::{
    CompletionInputs, CrewMembership, CrewRole, CrewSummary, LedgerAggregates, MemberTiming,
    OperatorTotals, PlantRecord, RecordingPace, RoleTiming, SessionRecord, StrainBreakdown,
    TripMetrics,
};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Strain label for records without one
pub const UNKNOWN_STRAIN: &str = "unknown";

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn summarize(
    session: &SessionRecord,
    memberships: &[CrewMembership],
    plants: &[PlantRecord],
    inputs: CompletionInputs,
    now: DateTime<Utc>,
) -> CrewSummary {
    let end = session.completed_at.unwrap_or(now);
    let carry_types: HashMap<Uuid, &str> = inputs
        .carrier_assignments
        .iter()
        .map(|a| (a.operator_id, a.carry_type.as_str()))
        .collect();

    let members = memberships
        .iter()
        .map(|m| MemberTiming {
            operator_id: m.operator_id,
            operator_name: m.operator_name.clone(),
            role: m.role,
            carry_type: (m.role == CrewRole::Carrying)
                .then(|| carry_types.get(&m.operator_id).map(|c| c.to_string()))
                .flatten(),
            joined_at: m.joined_at,
            left_at: m.left_at,
            duration_ms: m.elapsed_ms(end),
        })
        .collect();

    let ledger = ledger_aggregates(plants, session.expected_plant_count);
    let trips = trip_metrics(plants.len(), &inputs);

    CrewSummary {
        session_id: session.id,
        computed_at: now,
        session_duration_ms: (end - session.started_at).num_milliseconds().max(0),
        roles: role_timings(memberships, end),
        operators: operator_totals(memberships, plants, &carry_types, end),
        members,
        ledger,
        trips,
        pace: recording_pace(plants),
        inputs,
    }
}

/// Elapsed time per role, in `CrewRole::ALL` order, roles never held omitted
pub fn role_timings(memberships: &[CrewMembership], end: DateTime<Utc>) -> Vec<RoleTiming> {
    CrewRole::ALL
        .iter()
        .filter_map(|&role| {
            let held: Vec<&CrewMembership> = memberships.iter().filter(|m| m.role == role).collect();
            if held.is_empty() {
                return None;
            }
            Some(RoleTiming {
                role,
                elapsed_ms: held.iter().map(|m| m.elapsed_ms(end)).sum(),
                memberships: held.len(),
            })
        })
        .collect()
}

/// One entry per operator, in order of first appearance
///
/// Operators who recorded plants without ever holding a membership (scans
/// restored from history) still get an entry.
pub fn operator_totals(
    memberships: &[CrewMembership],
    plants: &[PlantRecord],
    carry_types: &HashMap<Uuid, &str>,
    end: DateTime<Utc>,
) -> Vec<OperatorTotals> {
    let mut order: Vec<Uuid> = Vec::new();
    let mut totals: HashMap<Uuid, OperatorTotals> = HashMap::new();

    let mut entry = |id: Uuid, name: &str| -> Uuid {
        if !totals.contains_key(&id) {
            order.push(id);
            totals.insert(
                id,
                OperatorTotals {
                    operator_id: id,
                    operator_name: name.to_string(),
                    elapsed_ms: 0,
                    roles: Vec::new(),
                    plants_recorded: 0,
                    wet_weight_grams: 0,
                    carry_type: carry_types.get(&id).map(|c| c.to_string()),
                },
            );
        }
        id
    };

    let mut touched: Vec<(Uuid, &CrewMembership)> = Vec::new();
    for m in memberships {
        touched.push((entry(m.operator_id, &m.operator_name), m));
    }
    let mut recorders: Vec<(Uuid, &PlantRecord)> = Vec::new();
    for p in plants {
        recorders.push((entry(p.recorded_by, &p.recorded_by_name), p));
    }

    for (id, m) in touched {
        if let Some(t) = totals.get_mut(&id) {
            t.elapsed_ms += m.elapsed_ms(end);
            if !t.roles.contains(&m.role) {
                t.roles.push(m.role);
            }
        }
    }
    for (id, p) in recorders {
        if let Some(t) = totals.get_mut(&id) {
            t.plants_recorded += 1;
            t.wet_weight_grams += p.wet_weight_grams as u64;
        }
    }

    order
        .into_iter()
        .filter_map(|id| totals.remove(&id))
        .collect()
}

pub fn ledger_aggregates(plants: &[PlantRecord], expected_plants: u32) -> LedgerAggregates {
    let total_wet_grams: u64 = plants.iter().map(|p| p.wet_weight_grams as u64).sum();

    let mut by_strain: BTreeMap<&str, (usize, u64)> = BTreeMap::new();
    for plant in plants {
        let strain = plant
            .strain
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_STRAIN);
        let slot = by_strain.entry(strain).or_insert((0, 0));
        slot.0 += 1;
        slot.1 += plant.wet_weight_grams as u64;
    }

    LedgerAggregates {
        total_plants: plants.len(),
        expected_plants,
        total_wet_grams,
        average_wet_grams: (!plants.is_empty())
            .then(|| round1(total_wet_grams as f64 / plants.len() as f64)),
        per_strain: by_strain
            .into_iter()
            .map(|(strain, (count, grams))| StrainBreakdown {
                strain: strain.to_string(),
                plants: count,
                wet_weight_grams: grams,
            })
            .collect(),
    }
}

/// Carrying effort; each metric needs its own inputs
pub fn trip_metrics(plant_count: usize, inputs: &CompletionInputs) -> TripMetrics {
    let plants = plant_count as f64;
    let distance = inputs.distance_to_scale_m.filter(|d| *d > 0.0);

    let trips = |per_trip: Option<u32>| -> Option<u32> {
        distance?;
        let per_trip = per_trip.filter(|n| *n > 0)?;
        Some(plant_count.div_ceil(per_trip as usize) as u32)
    };
    let round_trip = |trips: Option<u32>| -> Option<f64> {
        Some(round1(trips? as f64 * distance? * 2.0))
    };

    let pot_trips = trips(inputs.pots_per_trip);
    let plant_trips = trips(inputs.plants_per_trip);

    TripMetrics {
        pot_trips,
        plant_trips,
        pot_distance_m: round_trip(pot_trips),
        plant_distance_m: round_trip(plant_trips),
        total_weight_carried_kg: inputs.pot_weight_kg.map(|w| round1(plants * w)),
        total_branches: inputs.branches_per_plant.map(|b| round1(plants * b)),
    }
}

/// Speed between the first and last record; needs at least two records
pub fn recording_pace(plants: &[PlantRecord]) -> RecordingPace {
    if plants.len() < 2 {
        return RecordingPace::default();
    }

    let mut times: Vec<DateTime<Utc>> = plants.iter().map(|p| p.recorded_at).collect();
    times.sort();

    let gaps: Vec<f64> = times
        .windows(2)
        .map(|w| (w[1] - w[0]).num_milliseconds() as f64 / 1000.0)
        .collect();

    let span_minutes = (times[times.len() - 1] - times[0]).num_milliseconds() as f64 / 60_000.0;

    RecordingPace {
        plants_per_minute: (span_minutes > 0.0).then(|| round1(plants.len() as f64 / span_minutes)),
        fastest_gap_secs: gaps.iter().copied().reduce(f64::min).map(round1),
        slowest_gap_secs: gaps.iter().copied().reduce(f64::max).map(round1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use growdash_common::harvest::{CarrierAssignment, Operator, SessionStatus};

    fn session(started_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> SessionRecord {
        SessionRecord {
            id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            room_name: "Flower 1".to_string(),
            expected_plant_count: 50,
            status: SessionStatus::Completed,
            started_at,
            completed_at: Some(completed_at),
        }
    }

    fn plant_at(n: u32, grams: u32, by: &Operator, at: DateTime<Utc>, strain: Option<&str>) -> PlantRecord {
        let mut p = PlantRecord::new(n, grams, by.id, by.name.clone(), strain.map(str::to_string));
        p.recorded_at = at;
        p
    }

    fn stint(op: &Operator, role: CrewRole, from: DateTime<Utc>, to: DateTime<Utc>) -> CrewMembership {
        let mut m = CrewMembership::open(op, role, from);
        m.left_at = Some(to);
        m
    }

    #[test]
    fn test_summary_counts_and_totals() {
        let t0 = Utc::now();
        let ana = Operator::new(Uuid::new_v4(), "Ana");
        let ben = Operator::new(Uuid::new_v4(), "Ben");

        let memberships = vec![
            stint(&ana, CrewRole::Cutting, t0, t0 + Duration::minutes(10)),
            stint(&ana, CrewRole::Weighing, t0 + Duration::minutes(10), t0 + Duration::minutes(30)),
            stint(&ben, CrewRole::Carrying, t0, t0 + Duration::minutes(30)),
        ];
        let plants: Vec<PlantRecord> = (1..=5)
            .map(|n| plant_at(n, 100 * n, &ana, t0 + Duration::minutes(10 + n as i64), Some("Gelato")))
            .collect();
        let inputs = CompletionInputs {
            carrier_assignments: vec![CarrierAssignment {
                operator_id: ben.id,
                carry_type: "pots".to_string(),
            }],
            ..Default::default()
        };

        let summary = summarize(
            &session(t0, t0 + Duration::minutes(30)),
            &memberships,
            &plants,
            inputs,
            t0 + Duration::minutes(30),
        );

        assert_eq!(summary.session_duration_ms, 30 * 60_000);
        assert_eq!(summary.ledger.total_plants, 5);
        assert_eq!(summary.ledger.total_wet_grams, 1500);
        assert_eq!(summary.ledger.average_wet_grams, Some(300.0));

        let weighing = summary.roles.iter().find(|r| r.role == CrewRole::Weighing).unwrap();
        assert_eq!(weighing.elapsed_ms, 20 * 60_000);

        let ana_totals = &summary.operators[0];
        assert_eq!(ana_totals.operator_id, ana.id);
        assert_eq!(ana_totals.elapsed_ms, 30 * 60_000);
        assert_eq!(ana_totals.roles, vec![CrewRole::Cutting, CrewRole::Weighing]);
        assert_eq!(ana_totals.plants_recorded, 5);

        let ben_member = summary.members.iter().find(|m| m.operator_id == ben.id).unwrap();
        assert_eq!(ben_member.carry_type.as_deref(), Some("pots"));
        assert_eq!(summary.operators[1].carry_type.as_deref(), Some("pots"));
    }

    #[test]
    fn test_per_strain_breakdown_sorted_with_unknown() {
        let ana = Operator::new(Uuid::new_v4(), "Ana");
        let now = Utc::now();
        let plants = vec![
            plant_at(1, 100, &ana, now, Some("Zkittlez")),
            plant_at(2, 200, &ana, now, Some("Gelato")),
            plant_at(3, 50, &ana, now, None),
            plant_at(4, 300, &ana, now, Some("Gelato")),
        ];

        let aggregates = ledger_aggregates(&plants, 10);
        let strains: Vec<(&str, usize, u64)> = aggregates
            .per_strain
            .iter()
            .map(|s| (s.strain.as_str(), s.plants, s.wet_weight_grams))
            .collect();
        assert_eq!(
            strains,
            vec![("Gelato", 2, 500), ("Zkittlez", 1, 100), ("unknown", 1, 50)]
        );
    }

    #[test]
    fn test_trip_metrics() {
        let inputs = CompletionInputs {
            distance_to_scale_m: Some(25.0),
            pot_weight_kg: Some(1.25),
            branches_per_plant: Some(6.0),
            pots_per_trip: Some(4),
            plants_per_trip: Some(3),
            carrier_assignments: Vec::new(),
        };

        let trips = trip_metrics(10, &inputs);
        assert_eq!(trips.pot_trips, Some(3));
        assert_eq!(trips.plant_trips, Some(4));
        assert_eq!(trips.pot_distance_m, Some(150.0));
        assert_eq!(trips.plant_distance_m, Some(200.0));
        assert_eq!(trips.total_weight_carried_kg, Some(12.5));
        assert_eq!(trips.total_branches, Some(60.0));
    }

    #[test]
    fn test_trip_metrics_need_distance() {
        let inputs = CompletionInputs {
            pots_per_trip: Some(4),
            ..Default::default()
        };
        let trips = trip_metrics(10, &inputs);
        assert_eq!(trips.pot_trips, None);
        assert_eq!(trips.pot_distance_m, None);
    }

    #[test]
    fn test_recording_pace() {
        let ana = Operator::new(Uuid::new_v4(), "Ana");
        let t0 = Utc::now();
        let plants = vec![
            plant_at(1, 100, &ana, t0, None),
            plant_at(2, 100, &ana, t0 + Duration::seconds(20), None),
            plant_at(3, 100, &ana, t0 + Duration::seconds(60), None),
        ];

        let pace = recording_pace(&plants);
        assert_eq!(pace.plants_per_minute, Some(3.0));
        assert_eq!(pace.fastest_gap_secs, Some(20.0));
        assert_eq!(pace.slowest_gap_secs, Some(40.0));

        assert_eq!(recording_pace(&plants[..1]), RecordingPace::default());
    }
}

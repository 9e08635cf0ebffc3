//! End-to-end harvest scenarios against the coordinator
//!
//! In-memory SQLite and a static room directory; no HTTP.

use std::sync::Arc;

use growdash_common::events::{HarvestEvent, LedgerChange};
use growdash_common::harvest::{
    CarrierAssignment, CompletionInputs, CrewRole, Operator, SessionStatus,
};
use growdash_hc::coordinator::{Coordinator, ScanEntry};
use growdash_hc::db::sessions::SessionFilter;
use growdash_hc::fanout::FanoutHub;
use growdash_hc::rooms::{RoomDirectory, RoomInfo, StaticRoomDirectory, StrainRange};
use growdash_hc::HarvestError;
use tokio::sync::broadcast::error::TryRecvError;
use uuid::Uuid;

async fn setup() -> (Arc<Coordinator>, StaticRoomDirectory, sqlx::SqlitePool) {
    let pool = growdash_hc::db::init_memory_pool()
        .await
        .expect("Failed to create in-memory database");
    let rooms = StaticRoomDirectory::new();
    let coordinator = Arc::new(Coordinator::new(
        pool.clone(),
        Arc::new(rooms.clone()),
        FanoutHub::new(64),
    ));
    (coordinator, rooms, pool)
}

fn operator(name: &str) -> Operator {
    Operator::new(Uuid::new_v4(), name)
}

#[tokio::test]
async fn scenario_a_duplicate_plant_keeps_first_record() {
    let (coordinator, rooms, _pool) = setup().await;
    let room = rooms.add_room("Flower 1", 50, Some("Blue Dream")).await;
    let x = operator("Xavier");

    let opened = coordinator.open(room).await.unwrap();
    assert!(opened.created);
    assert_eq!(opened.view.session.expected_plant_count, 50);
    let id = opened.view.session.id;

    coordinator.join(id, &x, CrewRole::Weighing).await.unwrap();
    coordinator.record(id, &x, 1, 210).await.unwrap();

    let err = coordinator.record(id, &x, 1, 300).await.unwrap_err();
    assert!(matches!(err, HarvestError::DuplicatePlant { plant_number: 1 }));

    let view = coordinator.snapshot(id).await.unwrap();
    assert_eq!(view.plants.len(), 1);
    assert_eq!(view.plant(1).unwrap().wet_weight_grams, 210);
    assert_eq!(view.plant(1).unwrap().strain.as_deref(), Some("Blue Dream"));
}

#[tokio::test]
async fn scenario_b_force_join_displaces_weighing_holder() {
    let (coordinator, rooms, _pool) = setup().await;
    let room = rooms.add_room("Flower 2", 20, None).await;
    let (x, y) = (operator("Xavier"), operator("Yara"));
    let id = coordinator.open(room).await.unwrap().view.session.id;

    coordinator.join(id, &x, CrewRole::Weighing).await.unwrap();

    match coordinator.join(id, &y, CrewRole::Weighing).await {
        Err(HarvestError::RoleConflict { current_holder }) => assert_eq!(current_holder, x),
        other => panic!("expected RoleConflict, got {:?}", other),
    }

    let crew = coordinator
        .force_join(id, &y, CrewRole::Weighing)
        .await
        .unwrap();
    let weighing: Vec<_> = crew.iter().filter(|m| m.role == CrewRole::Weighing).collect();
    assert_eq!(weighing.len(), 1);
    assert_eq!(weighing[0].operator_id, y.id);
    assert!(crew.iter().all(|m| m.operator_id != x.id));

    let err = coordinator.record(id, &x, 1, 100).await.unwrap_err();
    assert!(matches!(err, HarvestError::RoleNotHeld { operator } if operator == x.id));

    coordinator.record(id, &y, 1, 100).await.unwrap();
}

#[tokio::test]
async fn scenario_c_completion_summarizes_and_closes() {
    let (coordinator, rooms, _pool) = setup().await;
    let room = rooms.add_room("Flower 3", 10, Some("OG Kush")).await;
    let x = operator("Xavier");
    let id = coordinator.open(room).await.unwrap().view.session.id;
    coordinator.join(id, &x, CrewRole::Weighing).await.unwrap();

    let weights = [210, 180, 305, 150, 240];
    for (i, grams) in weights.iter().enumerate() {
        coordinator
            .record(id, &x, i as i64 + 1, *grams)
            .await
            .unwrap();
    }

    let view = coordinator
        .complete(id, CompletionInputs::default())
        .await
        .unwrap();
    assert_eq!(view.session.status, SessionStatus::Completed);
    assert!(view.session.completed_at.is_some());
    assert!(view.crew.is_empty());

    let summary = coordinator.summary(id).await.unwrap().unwrap();
    assert_eq!(summary.ledger.total_plants, 5);
    assert_eq!(summary.ledger.total_wet_grams, weights.iter().sum::<i64>() as u64);
    assert_eq!(summary.ledger.expected_plants, 10);

    let err = coordinator.record(id, &x, 6, 100).await.unwrap_err();
    assert!(matches!(err, HarvestError::SessionClosed(s) if s == id));

    // Cycle reset signalled to the room service
    let info = rooms.room(room).await.unwrap().unwrap();
    assert!(!info.cycle_active);
}

#[tokio::test]
async fn test_open_returns_existing_in_progress_session() {
    let (coordinator, rooms, _pool) = setup().await;
    let room = rooms.add_room("Veg", 12, None).await;

    let first = coordinator.open(room).await.unwrap();
    let second = coordinator.open(room).await.unwrap();
    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.view.session.id, second.view.session.id);
}

#[tokio::test]
async fn test_open_rejects_unknown_and_inactive_rooms() {
    let (coordinator, rooms, _pool) = setup().await;

    let missing = Uuid::new_v4();
    assert!(matches!(
        coordinator.open(missing).await,
        Err(HarvestError::RoomNotFound(r)) if r == missing
    ));

    let room = rooms.add_room("Dry", 4, None).await;
    rooms.reset_cycle(room).await.unwrap();
    assert!(matches!(
        coordinator.open(room).await,
        Err(HarvestError::RoomInactive(_))
    ));
}

#[tokio::test]
async fn test_record_validates_input() {
    let (coordinator, rooms, _pool) = setup().await;
    let room = rooms.add_room("Flower 4", 10, None).await;
    let x = operator("Xavier");
    let id = coordinator.open(room).await.unwrap().view.session.id;
    coordinator.join(id, &x, CrewRole::Weighing).await.unwrap();

    assert!(matches!(
        coordinator.record(id, &x, 0, 100).await,
        Err(HarvestError::InvalidPlantNumber { plant_number: 0 })
    ));
    assert!(matches!(
        coordinator.record(id, &x, -3, 100).await,
        Err(HarvestError::InvalidPlantNumber { .. })
    ));
    assert!(matches!(
        coordinator.record(id, &x, 1, 0).await,
        Err(HarvestError::InvalidWeight { grams: 0 })
    ));
    assert!(matches!(
        coordinator.record(id, &x, 1, -5).await,
        Err(HarvestError::InvalidWeight { .. })
    ));

    // Plant numbers above the room's count are accepted
    coordinator.record(id, &x, 11, 120).await.unwrap();
}

#[tokio::test]
async fn test_non_weighing_roles_cannot_write() {
    let (coordinator, rooms, _pool) = setup().await;
    let room = rooms.add_room("Flower 5", 10, None).await;
    let (x, c) = (operator("Xavier"), operator("Cam"));
    let id = coordinator.open(room).await.unwrap().view.session.id;
    coordinator.join(id, &x, CrewRole::Weighing).await.unwrap();
    coordinator.join(id, &c, CrewRole::Cutting).await.unwrap();
    coordinator.record(id, &x, 1, 200).await.unwrap();

    assert!(matches!(
        coordinator.record(id, &c, 2, 200).await,
        Err(HarvestError::RoleNotHeld { .. })
    ));
    assert!(matches!(
        coordinator.remove(id, &c, 1).await,
        Err(HarvestError::RoleNotHeld { .. })
    ));
    assert!(matches!(
        coordinator
            .annotate(id, &c, 1, Some("wrong pot".to_string()))
            .await,
        Err(HarvestError::RoleNotHeld { .. })
    ));
}

#[tokio::test]
async fn test_non_exclusive_roles_have_many_holders() {
    let (coordinator, rooms, _pool) = setup().await;
    let room = rooms.add_room("Flower 6", 10, None).await;
    let id = coordinator.open(room).await.unwrap().view.session.id;

    for name in ["A", "B", "C"] {
        coordinator
            .join(id, &operator(name), CrewRole::Cutting)
            .await
            .unwrap();
    }
    let view = coordinator.snapshot(id).await.unwrap();
    assert_eq!(view.holders_of(CrewRole::Cutting).count(), 3);
}

#[tokio::test]
async fn test_role_switch_closes_previous_membership() {
    let (coordinator, rooms, _pool) = setup().await;
    let room = rooms.add_room("Flower 7", 10, None).await;
    let x = operator("Xavier");
    let id = coordinator.open(room).await.unwrap().view.session.id;

    coordinator.join(id, &x, CrewRole::Cutting).await.unwrap();
    let crew = coordinator.join(id, &x, CrewRole::Hanging).await.unwrap();
    assert_eq!(crew.len(), 1);
    assert_eq!(crew[0].role, CrewRole::Hanging);

    let crew = coordinator.leave(id, &x).await.unwrap();
    assert!(crew.is_empty());

    // Full history is kept for the summary
    let view = coordinator.complete(id, CompletionInputs::default()).await.unwrap();
    let summary = view.summary.unwrap();
    assert_eq!(summary.members.len(), 2);
    assert!(summary.members.iter().all(|m| m.left_at.is_some()));
}

#[tokio::test]
async fn test_remove_and_annotate() {
    let (coordinator, rooms, _pool) = setup().await;
    let room = rooms.add_room("Flower 8", 10, None).await;
    let x = operator("Xavier");
    let id = coordinator.open(room).await.unwrap().view.session.id;
    coordinator.join(id, &x, CrewRole::Weighing).await.unwrap();
    coordinator.record(id, &x, 4, 200).await.unwrap();

    let view = coordinator
        .annotate(id, &x, 4, Some("  stem only  ".to_string()))
        .await
        .unwrap();
    assert_eq!(view.plant(4).unwrap().error_note.as_deref(), Some("stem only"));

    let view = coordinator
        .annotate(id, &x, 4, Some("   ".to_string()))
        .await
        .unwrap();
    assert!(view.plant(4).unwrap().error_note.is_none());

    assert!(matches!(
        coordinator.annotate(id, &x, 9, None).await,
        Err(HarvestError::PlantNotFound { plant_number: 9 })
    ));

    let view = coordinator.remove(id, &x, 4).await.unwrap();
    assert!(view.plants.is_empty());

    // Absent plant: no error, nothing changes
    let view = coordinator.remove(id, &x, 4).await.unwrap();
    assert!(view.plants.is_empty());

    // Removed number can be recorded again
    coordinator.record(id, &x, 4, 230).await.unwrap();
}

#[tokio::test]
async fn test_strain_lookup_uses_room_ranges() {
    let (coordinator, rooms, _pool) = setup().await;
    let room_id = Uuid::new_v4();
    rooms
        .insert(RoomInfo {
            id: room_id,
            name: "Mixed".to_string(),
            plant_count: 20,
            cycle_active: true,
            primary_strain: Some("House".to_string()),
            strain_ranges: vec![
                StrainRange {
                    strain: "Gelato".to_string(),
                    start: 1,
                    end: 10,
                },
                StrainRange {
                    strain: "Zkittlez".to_string(),
                    start: 11,
                    end: 20,
                },
            ],
        })
        .await;
    let x = operator("Xavier");
    let id = coordinator.open(room_id).await.unwrap().view.session.id;
    coordinator.join(id, &x, CrewRole::Weighing).await.unwrap();

    coordinator.record(id, &x, 3, 100).await.unwrap();
    coordinator.record(id, &x, 15, 100).await.unwrap();
    let view = coordinator.record(id, &x, 25, 100).await.unwrap();

    assert_eq!(view.plant(3).unwrap().strain.as_deref(), Some("Gelato"));
    assert_eq!(view.plant(15).unwrap().strain.as_deref(), Some("Zkittlez"));
    assert_eq!(view.plant(25).unwrap().strain, None);

    let summary = coordinator
        .complete(id, CompletionInputs::default())
        .await
        .unwrap()
        .summary
        .unwrap();
    let strains: Vec<_> = summary
        .ledger
        .per_strain
        .iter()
        .map(|s| s.strain.as_str())
        .collect();
    assert_eq!(strains, vec!["Gelato", "Zkittlez", "unknown"]);
}

#[tokio::test]
async fn test_ledger_is_ordered_by_record_time() {
    let (coordinator, rooms, _pool) = setup().await;
    let room = rooms.add_room("Flower 9", 10, None).await;
    let x = operator("Xavier");
    let id = coordinator.open(room).await.unwrap().view.session.id;
    coordinator.join(id, &x, CrewRole::Weighing).await.unwrap();

    for n in [7, 2, 5] {
        coordinator.record(id, &x, n, 100).await.unwrap();
    }
    let numbers: Vec<u32> = coordinator
        .snapshot(id)
        .await
        .unwrap()
        .plants
        .iter()
        .map(|p| p.plant_number)
        .collect();
    assert_eq!(numbers, vec![7, 2, 5]);
}

#[tokio::test]
async fn test_completion_inputs_drive_trip_metrics() {
    let (coordinator, rooms, _pool) = setup().await;
    let room = rooms.add_room("Flower 10", 10, None).await;
    let (x, carrier) = (operator("Xavier"), operator("Cory"));
    let id = coordinator.open(room).await.unwrap().view.session.id;
    coordinator.join(id, &x, CrewRole::Weighing).await.unwrap();
    coordinator
        .join(id, &carrier, CrewRole::Carrying)
        .await
        .unwrap();
    for n in 1..=5 {
        coordinator.record(id, &x, n, 200).await.unwrap();
    }

    let inputs = CompletionInputs {
        distance_to_scale_m: Some(12.0),
        pot_weight_kg: Some(1.5),
        branches_per_plant: Some(8.0),
        pots_per_trip: Some(2),
        plants_per_trip: Some(4),
        carrier_assignments: vec![CarrierAssignment {
            operator_id: carrier.id,
            carry_type: "pots".to_string(),
        }],
    };
    let summary = coordinator
        .complete(id, inputs.clone())
        .await
        .unwrap()
        .summary
        .unwrap();

    assert_eq!(summary.inputs, inputs);
    assert_eq!(summary.trips.pot_trips, Some(3));
    assert_eq!(summary.trips.plant_trips, Some(2));
    assert_eq!(summary.trips.pot_distance_m, Some(72.0));
    assert_eq!(summary.trips.plant_distance_m, Some(48.0));
    assert_eq!(summary.trips.total_weight_carried_kg, Some(7.5));
    assert_eq!(summary.trips.total_branches, Some(40.0));

    let cory = summary
        .operators
        .iter()
        .find(|o| o.operator_id == carrier.id)
        .unwrap();
    assert_eq!(cory.carry_type.as_deref(), Some("pots"));
}

#[tokio::test]
async fn test_mutations_after_completion_are_rejected() {
    let (coordinator, rooms, _pool) = setup().await;
    let room = rooms.add_room("Flower 11", 10, None).await;
    let x = operator("Xavier");
    let id = coordinator.open(room).await.unwrap().view.session.id;
    coordinator.join(id, &x, CrewRole::Weighing).await.unwrap();
    coordinator.record(id, &x, 1, 100).await.unwrap();
    let completed = coordinator
        .complete(id, CompletionInputs::default())
        .await
        .unwrap();

    assert!(matches!(
        coordinator.join(id, &x, CrewRole::Cutting).await,
        Err(HarvestError::SessionClosed(_))
    ));
    assert!(matches!(
        coordinator.remove(id, &x, 1).await,
        Err(HarvestError::SessionClosed(_))
    ));
    assert!(matches!(
        coordinator.complete(id, CompletionInputs::default()).await,
        Err(HarvestError::SessionClosed(_))
    ));

    // Summary is computed once and stays put
    let summary = coordinator.summary(id).await.unwrap().unwrap();
    assert_eq!(Some(summary), completed.summary);
    assert!(coordinator.active_for_room(room).await.unwrap().is_none());
}

#[tokio::test]
async fn test_restore_reloads_in_progress_sessions() {
    let (coordinator, rooms, pool) = setup().await;
    let room = rooms.add_room("Flower 12", 10, None).await;
    let x = operator("Xavier");
    let id = coordinator.open(room).await.unwrap().view.session.id;
    coordinator.join(id, &x, CrewRole::Weighing).await.unwrap();
    coordinator.record(id, &x, 1, 150).await.unwrap();
    coordinator.record(id, &x, 2, 175).await.unwrap();

    let done_room = rooms.add_room("Flower 13", 10, None).await;
    let done = coordinator.open(done_room).await.unwrap().view.session.id;
    coordinator
        .complete(done, CompletionInputs::default())
        .await
        .unwrap();

    // Fresh coordinator over the same database
    let restarted = Coordinator::new(pool, Arc::new(rooms.clone()), FanoutHub::new(64));
    assert_eq!(restarted.restore().await.unwrap(), 1);
    assert_eq!(restarted.active_session_id(room).await, Some(id));

    let view = restarted.snapshot(id).await.unwrap();
    assert_eq!(view.plants.len(), 2);
    assert_eq!(view.holders_of(CrewRole::Weighing).count(), 1);

    // Roster survived: the weighing holder can keep recording
    restarted.record(id, &x, 3, 160).await.unwrap();
    assert!(matches!(
        restarted.record(id, &x, 2, 160).await,
        Err(HarvestError::DuplicatePlant { .. })
    ));

    // Completed sessions are still readable, straight from the database
    let old = restarted.snapshot(done).await.unwrap();
    assert_eq!(old.session.status, SessionStatus::Completed);
    assert!(restarted.summary(done).await.unwrap().is_some());
    assert_eq!(restarted.resident_session_count().await, 1);
}

#[tokio::test]
async fn test_completed_sessions_leave_memory() {
    let (coordinator, rooms, _pool) = setup().await;
    let x = operator("Xavier");
    let mut completed = Vec::new();
    for n in 0..20 {
        let room = rooms.add_room(&format!("Flower {}", 100 + n), 5, None).await;
        let id = coordinator.open(room).await.unwrap().view.session.id;
        coordinator.join(id, &x, CrewRole::Weighing).await.unwrap();
        coordinator.record(id, &x, 1, 120).await.unwrap();
        coordinator
            .complete(id, CompletionInputs::default())
            .await
            .unwrap();
        completed.push(id);
    }

    assert_eq!(coordinator.active_session_count().await, 0);
    assert_eq!(coordinator.resident_session_count().await, 0);

    // Reads and rejected writes do not bring them back
    for &id in &completed {
        let view = coordinator.snapshot(id).await.unwrap();
        assert_eq!(view.session.status, SessionStatus::Completed);
        assert_eq!(view.plants.len(), 1);
        assert!(coordinator.summary(id).await.unwrap().is_some());
        assert!(matches!(
            coordinator.record(id, &x, 2, 100).await,
            Err(HarvestError::SessionClosed(_))
        ));
    }
    assert_eq!(coordinator.resident_session_count().await, 0);

    // Open sessions are still held
    let room = rooms.add_room("Flower 200", 5, None).await;
    coordinator.open(room).await.unwrap();
    assert_eq!(coordinator.resident_session_count().await, 1);
}

#[tokio::test]
async fn test_list_sessions_filters() {
    let (coordinator, rooms, _pool) = setup().await;
    let a = rooms.add_room("A", 5, None).await;
    let b = rooms.add_room("B", 5, None).await;
    let sa = coordinator.open(a).await.unwrap().view.session.id;
    let sb = coordinator.open(b).await.unwrap().view.session.id;
    coordinator
        .complete(sa, CompletionInputs::default())
        .await
        .unwrap();

    let all = coordinator
        .list_sessions(&SessionFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    // Newest first
    assert_eq!(all[0].id, sb);

    let completed = coordinator
        .list_sessions(&SessionFilter {
            status: Some(SessionStatus::Completed),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, sa);

    let for_b = coordinator
        .list_sessions(&SessionFilter {
            room_id: Some(b),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(for_b.len(), 1);
    assert_eq!(for_b[0].room_id, b);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let (coordinator, _rooms, _pool) = setup().await;
    let missing = Uuid::new_v4();
    assert!(matches!(
        coordinator.snapshot(missing).await,
        Err(HarvestError::SessionNotFound(s)) if s == missing
    ));
}

#[tokio::test]
async fn test_record_scan_uses_weighing_holder() {
    let (coordinator, rooms, _pool) = setup().await;
    let room = rooms.add_room("Flower 14", 10, None).await;
    let x = operator("Xavier");
    let id = coordinator.open(room).await.unwrap().view.session.id;

    let scan = ScanEntry {
        plant_number: 3,
        wet_weight_grams: 190,
        buffered: true,
        scanned_at: Some(chrono::Utc::now() - chrono::Duration::minutes(5)),
    };
    assert!(matches!(
        coordinator.record_scan(id, scan.clone()).await,
        Err(HarvestError::WeighingVacant(_))
    ));

    coordinator.join(id, &x, CrewRole::Weighing).await.unwrap();
    let view = coordinator.record_scan(id, scan.clone()).await.unwrap();
    let record = view.plant(3).unwrap();
    assert_eq!(record.recorded_by, x.id);
    assert!(record.buffered);
    assert_eq!(record.scanned_at, scan.scanned_at);
}

#[tokio::test]
async fn test_observers_receive_ledger_and_roster_changes() {
    let (coordinator, rooms, _pool) = setup().await;
    let room = rooms.add_room("Flower 15", 10, None).await;
    let x = operator("Xavier");
    let mut lobby = coordinator.fanout().subscribe_lobby();

    let id = coordinator.open(room).await.unwrap().view.session.id;
    assert!(matches!(
        lobby.recv().await.unwrap(),
        HarvestEvent::SessionOpened { session_id, .. } if session_id == id
    ));

    let mut rx = coordinator.fanout().subscribe(id).await;
    coordinator.join(id, &x, CrewRole::Weighing).await.unwrap();
    coordinator.record(id, &x, 1, 200).await.unwrap();
    // Duplicate: rejected without a broadcast
    let _ = coordinator.record(id, &x, 1, 250).await;
    coordinator.remove(id, &x, 1).await.unwrap();
    // Absent: nothing to broadcast
    coordinator.remove(id, &x, 1).await.unwrap();
    coordinator
        .complete(id, CompletionInputs::default())
        .await
        .unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let HarvestEvent::LedgerChanged { change, .. } = &event {
            kinds.push(format!("{:?}", change));
        } else {
            kinds.push(event.event_type().to_string());
        }
    }
    assert_eq!(
        kinds,
        vec![
            "RosterChanged".to_string(),
            format!("{:?}", LedgerChange::Recorded { plant_number: 1 }),
            format!("{:?}", LedgerChange::Removed { plant_number: 1 }),
            "SessionCompleted".to_string(),
        ]
    );

    // Completion releases the session channel and ends its observers
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Closed)));
    assert_eq!(coordinator.fanout().channel_count().await, 0);

    assert!(matches!(
        lobby.recv().await.unwrap(),
        HarvestEvent::SessionCompleted { session_id, .. } if session_id == id
    ));
}

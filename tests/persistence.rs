use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use ulid::Ulid;

use fleetbook::command::Driver;
use fleetbook::engine::{Engine, EngineError};
use fleetbook::model::*;
use fleetbook::notify::NotifyHub;
use fleetbook::store::{FleetDirectory, LocalStore, ReservationStore};

const H: Ms = 3_600_000;

fn wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("fleetbook_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

fn engine_on(store: Arc<LocalStore>, vehicles: &[Ulid]) -> Engine {
    Engine::new(
        store,
        Arc::new(FleetDirectory::with_vehicles(vehicles.iter().copied())),
        Arc::new(NotifyHub::new()),
    )
}

fn booking(vehicle: Ulid, start: Ms, end: Ms) -> NewReservation {
    NewReservation {
        id: None,
        resource_id: vehicle,
        start,
        end,
        holder: "student-42".into(),
        purpose: "lesson".into(),
        activate: false,
    }
}

#[tokio::test]
async fn reservations_survive_restart() {
    let path = wal_path("restart.wal");
    let a = Ulid::new();
    let b = Ulid::new();

    let (kept, canceled, moved) = {
        let store = Arc::new(LocalStore::open(&path).unwrap());
        let engine = engine_on(store, &[a, b]);
        let kept = engine.create(booking(a, 0, H)).await.unwrap();
        let canceled = engine.create(booking(a, H, 2 * H)).await.unwrap();
        engine.cancel(canceled.id).await.unwrap();
        let moved = engine.create(booking(a, 2 * H, 3 * H)).await.unwrap();
        let changes = ReservationChanges {
            resource_id: Some(b),
            holder: Some("student-43".into()),
            ..Default::default()
        };
        let moved = engine.update(moved.id, changes).await.unwrap();
        (kept, canceled, moved)
    };

    let store = Arc::new(LocalStore::open(&path).unwrap());
    assert_eq!(store.reservation_count(), 3);
    assert_eq!(store.get(kept.id).await.unwrap(), kept);
    assert_eq!(store.get(moved.id).await.unwrap(), moved);
    assert_eq!(
        store.get(canceled.id).await.unwrap().status,
        ReservationStatus::Canceled
    );

    // The replayed timeline still enforces exclusivity.
    let engine = engine_on(store, &[a, b]);
    assert!(matches!(
        engine.create(booking(a, 0, H)).await,
        Err(EngineError::ResourceUnavailable(_))
    ));
    engine.create(booking(a, H, 2 * H)).await.unwrap();
}

#[tokio::test]
async fn compaction_keeps_state_and_resets_counter() {
    let path = wal_path("compact.wal");
    let vehicle = Ulid::new();

    let ids = {
        let store = Arc::new(LocalStore::open(&path).unwrap());
        let engine = engine_on(store.clone(), &[vehicle]);
        let mut ids = Vec::new();
        for i in 0..10 {
            let r = engine
                .create(booking(vehicle, i * H, (i + 1) * H))
                .await
                .unwrap();
            engine.activate(r.id).await.unwrap();
            ids.push(r.id);
        }
        assert_eq!(store.appends_since_compact().await, 20);

        store.compact().await.unwrap();
        assert_eq!(store.appends_since_compact().await, 0);

        engine.complete(ids[0]).await.unwrap();
        ids
    };

    let store = LocalStore::open(&path).unwrap();
    assert_eq!(store.reservation_count(), 10);
    assert_eq!(
        store.get(ids[0]).await.unwrap().status,
        ReservationStatus::Completed
    );
    for id in &ids[1..] {
        assert_eq!(store.get(*id).await.unwrap().status, ReservationStatus::Active);
    }
}

#[tokio::test]
async fn registered_vehicles_survive_restart() {
    let wal = wal_path("fleet.wal");
    let vehicles = wal.with_file_name("vehicles.json");
    let seeded = Ulid::new();

    let open = |seed: Vec<Ulid>| {
        let store = Arc::new(LocalStore::open(&wal).unwrap());
        let directory = Arc::new(FleetDirectory::open(&vehicles, seed).unwrap());
        let engine = Engine::new(store, directory.clone(), Arc::new(NotifyHub::new()));
        Driver::new(engine, directory)
    };

    let registered = {
        let driver = open(vec![seeded]);
        let response = driver.handle_line(r#"{"op":"register_vehicle"}"#).await;
        assert_eq!(response["data"]["added"], true);
        response["data"]["id"].as_str().unwrap().to_string()
    };

    // Restart without seeding anything: both vehicles are still known.
    let driver = open(Vec::new());
    for vehicle in [registered, seeded.to_string()] {
        let created = driver
            .handle_line(
                &json!({
                    "op": "create",
                    "vehicle": vehicle,
                    "start": "2024-03-01T09:00:00Z",
                    "end": "2024-03-01T10:00:00Z",
                    "holder": "student-42",
                })
                .to_string(),
            )
            .await;
        assert_eq!(created["ok"], true, "{created}");
    }
}

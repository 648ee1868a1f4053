use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio_test::assert_ok;
use ulid::Ulid;

use huddle::audit::{ActivityKind, MemoryAuditLog};
use huddle::config::Config;
use huddle::effects::Dispatcher;
use huddle::engine::{now_ms, Engine, EngineError};
use huddle::model::*;
use huddle::notify::{Notification, NotifyHub};

const H: Ms = 3_600_000;
const M: Ms = 60_000;

// ── Test infrastructure ──────────────────────────────────────

struct Office {
    engine: Arc<Engine>,
    hub: Arc<NotifyHub>,
    audit: Arc<MemoryAuditLog>,
    admin: Actor,
    room: Room,
    /// Midnight, two days out.
    day: Ms,
}

fn data_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("huddle_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

async fn open_office(dir: PathBuf) -> Office {
    let config = Config {
        data_dir: dir,
        ..Config::default()
    };
    let hub = Arc::new(NotifyHub::new());
    let audit = Arc::new(MemoryAuditLog::default());
    let effects = Dispatcher::spawn(hub.clone(), audit.clone(), config.effect_queue, config.effect_timeout);
    let engine = Arc::new(Engine::new(config.journal_path(), effects).unwrap());
    let admin = Actor::admin(Ulid::new());

    let room = match engine.list_rooms(true).await.into_iter().next() {
        Some(room) => room,
        None => engine
            .create_room(
                &admin,
                RoomSpec {
                    name: "Room R".into(),
                    location: "HQ 3F".into(),
                    capacity: 4,
                    amenities: vec!["screen".into()],
                    active: true,
                },
            )
            .await
            .unwrap(),
    };
    let day = (now_ms() / (24 * H) + 2) * 24 * H;
    Office {
        engine,
        hub,
        audit,
        admin,
        room,
        day,
    }
}

fn book(office: &Office, from: Ms, to: Ms) -> NewBooking {
    NewBooking {
        room_id: office.room.id,
        start: office.day + from,
        end: office.day + to,
        purpose: "planning".into(),
    }
}

fn assert_no_overlap(bookings: &[Booking]) {
    let live: Vec<&Booking> = bookings.iter().filter(|b| b.status.holds_slot()).collect();
    for (i, a) in live.iter().enumerate() {
        for b in &live[i + 1..] {
            assert!(!a.span.overlaps(&b.span), "{} overlaps {}", a.span, b.span);
        }
    }
}

// ── Scenarios ────────────────────────────────────────────────

#[tokio::test]
async fn full_lifecycle_through_the_public_api() {
    let office = open_office(data_dir()).await;
    let engine = &office.engine;
    let user = Actor::user(Ulid::new());
    let mut inbox = office.hub.subscribe_all();

    // A: book 09:00-10:00, then 09:30-10:30 conflicts.
    let b = engine.create_booking(&user, book(&office, 9 * H, 10 * H)).await.unwrap();
    assert_eq!(b.status, BookingStatus::Pending);
    let clash = engine
        .create_booking(&Actor::user(Ulid::new()), book(&office, 9 * H + 30 * M, 10 * H + 30 * M))
        .await;
    assert!(matches!(clash, Err(EngineError::Conflict(id)) if id == b.id));

    // B: approve, then the owner moves it to 14:00-15:00.
    engine
        .change_status(&office.admin, b.id, StatusChange::to(BookingStatus::Approved))
        .await
        .unwrap();
    let moved = engine
        .reschedule_booking(
            &user,
            b.id,
            Reschedule {
                start: Some(office.day + 14 * H),
                end: Some(office.day + 15 * H),
                purpose: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(moved.status, BookingStatus::Approved);

    // D: owner cancels with a reason, and can no longer move it.
    let cancelled = engine
        .change_status(&user, b.id, StatusChange::cancel("meeting moved"))
        .await
        .unwrap();
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("meeting moved"));
    let late_move = engine
        .reschedule_booking(
            &user,
            b.id,
            Reschedule {
                start: Some(office.day + 16 * H),
                end: Some(office.day + 17 * H),
                purpose: None,
            },
        )
        .await;
    assert!(matches!(
        late_move,
        Err(EngineError::InvalidTransition { .. } | EngineError::Forbidden(_))
    ));

    let mut kinds = Vec::new();
    while let Ok(Ok(n)) = tokio::time::timeout(Duration::from_millis(500), inbox.recv()).await {
        kinds.push(n.kind());
        if kinds.len() == 4 {
            break;
        }
    }
    assert_eq!(kinds, vec!["created", "status_changed", "rescheduled", "status_changed"]);

    let users_trail = office.audit.recent(10, Some(user.id)).await;
    assert!(users_trail.iter().any(|r| r.kind == ActivityKind::BookingReschedule));
}

#[tokio::test]
async fn rejection_is_final() {
    let office = open_office(data_dir()).await;
    let user = Actor::user(Ulid::new());
    let b = office
        .engine
        .create_booking(&user, book(&office, 9 * H, 10 * H))
        .await
        .unwrap();

    // C
    office
        .engine
        .change_status(&office.admin, b.id, StatusChange::to(BookingStatus::Rejected))
        .await
        .unwrap();
    let again = office
        .engine
        .change_status(&office.admin, b.id, StatusChange::to(BookingStatus::Approved))
        .await;
    assert!(matches!(again, Err(EngineError::InvalidTransition { .. })));
    assert_eq!(
        office.engine.get_booking(b.id).await.unwrap().status,
        BookingStatus::Rejected
    );
}

#[tokio::test]
async fn concurrent_identical_requests_admit_one() {
    let office = open_office(data_dir()).await;

    // E, repeated over several slots so the race has many chances to bite.
    for slot in 0..8 {
        let start = 8 * H + slot * H;
        let attempts = (0..8).map(|_| {
            let engine = office.engine.clone();
            let req = book(&office, start, start + H);
            tokio::spawn(async move { engine.create_booking(&Actor::user(Ulid::new()), req).await })
        });
        let results: Vec<_> = join_all(attempts).await.into_iter().map(|r| r.unwrap()).collect();
        let admitted = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(EngineError::Conflict(_))))
            .count();
        assert_eq!((admitted, conflicts), (1, 7), "slot {slot}");
    }

    let all = office.engine.bookings_for_room(office.room.id).await.unwrap();
    assert_eq!(all.len(), 8);
    assert_no_overlap(&all);
}

#[tokio::test]
async fn mixed_concurrent_traffic_keeps_slots_disjoint() {
    let office = open_office(data_dir()).await;
    let tasks = (0..64).map(|i: i64| {
        let engine = office.engine.clone();
        let admin = office.admin;
        // Overlapping 90-minute requests every 30 minutes.
        let req = book(&office, 8 * H + (i % 16) * 30 * M, 8 * H + (i % 16) * 30 * M + 90 * M);
        tokio::spawn(async move {
            let user = Actor::user(Ulid::new());
            if let Ok(b) = engine.create_booking(&user, req).await {
                match i % 3 {
                    0 => {
                        let _ = engine
                            .change_status(&admin, b.id, StatusChange::to(BookingStatus::Approved))
                            .await;
                    }
                    1 => {
                        let _ = engine
                            .change_status(&user, b.id, StatusChange::cancel("clash"))
                            .await;
                    }
                    _ => {}
                }
            }
        })
    });
    for t in join_all(tasks).await {
        t.unwrap();
    }

    let all = office.engine.bookings_for_room(office.room.id).await.unwrap();
    assert!(!all.is_empty());
    assert_no_overlap(&all);
}

#[tokio::test]
async fn restart_replays_committed_state() {
    let dir = data_dir();
    let user = Actor::user(Ulid::new());
    let (room_id, booking_id, day) = {
        let office = open_office(dir.clone()).await;
        let b = office
            .engine
            .create_booking(&user, book(&office, 9 * H, 10 * H))
            .await
            .unwrap();
        office
            .engine
            .change_status(&office.admin, b.id, StatusChange::to(BookingStatus::Approved))
            .await
            .unwrap();
        assert_ok!(office.engine.compact_journal().await);
        office
            .engine
            .change_status(&user, b.id, StatusChange::cancel("<i>ill</i>"))
            .await
            .unwrap();
        (office.room.id, b.id, office.day)
    };

    let office = open_office(dir).await;
    assert_eq!(office.room.id, room_id);
    let b = office.engine.get_booking(booking_id).await.unwrap();
    assert_eq!(b.status, BookingStatus::Cancelled);
    assert_eq!(b.cancellation_reason.as_deref(), Some("ill"));
    assert_eq!(office.engine.bookings_for_user(user.id).await.len(), 1);

    // Cancelled slot can be taken again.
    let free = office
        .engine
        .free_slots(room_id, Span::new(day + 9 * H, day + 10 * H), 0)
        .await
        .unwrap();
    assert_eq!(free, vec![Span::new(day + 9 * H, day + 10 * H)]);
}

#[tokio::test]
async fn room_subscribers_only_hear_their_room() {
    let office = open_office(data_dir()).await;
    let other = office
        .engine
        .create_room(
            &office.admin,
            RoomSpec {
                name: "Annex".into(),
                location: "HQ 1F".into(),
                capacity: 2,
                amenities: vec![],
                active: true,
            },
        )
        .await
        .unwrap();
    let mut rx = office.hub.subscribe(other.id);
    let user = Actor::user(Ulid::new());

    office
        .engine
        .create_booking(&user, book(&office, 9 * H, 10 * H))
        .await
        .unwrap();
    let annex = office
        .engine
        .create_booking(
            &user,
            NewBooking {
                room_id: other.id,
                start: office.day + 9 * H,
                end: office.day + 10 * H,
                purpose: "1:1".into(),
            },
        )
        .await
        .unwrap();

    let n = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(n, Notification::Created(ref b) if b.id == annex.id));
}

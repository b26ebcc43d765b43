//! End-to-end flows through the engine: frames arrive over a scripted push
//! session, snapshots come from the fake poll source.

mod support;

use dispatch_core::{
    AlertConfig, AlertKind, EngineConfig, EngineParts, EventBus, ManualClock,
    Reconciler, Signal, Subscription, SyncEngine, Topic, visual::ColorToken,
};
use dispatch_model::{
    DutyStatus, EntityId, EntityKind, Incident, IncidentId, IncidentPriority,
    IncidentStatus, OperatorFilters, Personnel, PersonnelId, Position,
    PushFrame, events::names,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use support::{FakePollSource, NoAssets, Peer, ScriptedTransport, t0};
use tokio::time::timeout;

struct Console {
    engine: SyncEngine,
    peer: Peer,
    source: Arc<FakePollSource>,
}

fn at(secs: i64) -> chrono::DateTime<chrono::Utc> {
    t0() + chrono::Duration::seconds(secs)
}

fn stamp(secs: i64) -> String {
    at(secs).to_rfc3339()
}

fn incident_id(raw: &str) -> IncidentId {
    IncidentId::new(raw).unwrap()
}

async fn console() -> Console {
    let transport = Arc::new(ScriptedTransport::default());
    let peer = transport.queue_session();
    let source = Arc::new(FakePollSource::default());
    let engine = SyncEngine::new(
        EngineConfig::default(),
        EngineParts {
            transport,
            source: source.clone(),
            fetcher: Arc::new(NoAssets),
            clock: Arc::new(ManualClock::new(at(60))),
        },
    );
    let mut state = engine.channel().watch_state();
    engine.channel().connect();
    timeout(Duration::from_secs(5), state.wait_for(|s| s.is_connected()))
        .await
        .unwrap()
        .unwrap();
    Console {
        engine,
        peer,
        source,
    }
}

impl Console {
    /// Push a frame that is expected to change the view.
    async fn push(&self, event: &str, data: Value) {
        let mut revision = self.engine.watch_revision();
        let before = *revision.borrow_and_update();
        self.peer.push(event, data).await;
        timeout(Duration::from_secs(5), revision.wait_for(|r| *r > before))
            .await
            .expect("frame applied")
            .unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn critical_incident_outranks_a_stale_snapshot() {
    let console = console().await;
    let id = EntityId::from(incident_id("INC-1"));
    let acknowledgements = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&acknowledgements);
    let _sub = console.engine.bus().subscribe(
        Topic::Acknowledgements,
        move |signal| {
            if let Signal::AcknowledgementsChanged { responders, .. } = signal {
                seen.lock().push(*responders);
            }
        },
    );

    console
        .push(
            names::INCIDENT_CREATED,
            json!({
                "id": "INC-1",
                "status": "PENDING_VERIFICATION",
                "priority": "CRITICAL",
                "location": {"lat": -6.2, "lng": 106.8},
                "respondersCount": 0,
                "updatedAt": stamp(10),
            }),
        )
        .await;

    let markers = console.engine.project();
    let marker = markers.find(&id).unwrap();
    assert_eq!(marker.color, ColorToken::Red);
    assert!(marker.urgent);
    let alerts = console.engine.showing_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::CallToAction);

    *console.source.incidents.lock() = vec![
        Incident::new(incident_id("INC-1"))
            .with_status(IncidentStatus::Verified)
            .with_priority(IncidentPriority::Medium)
            .with_position(Position::new(-6.2, 106.8))
            .with_last_event_at(at(5)),
    ];
    console.engine.poll_once().await.unwrap();
    let markers = console.engine.project();
    assert_eq!(markers.find(&id).unwrap().color, ColorToken::Red);
    let stored = console.engine.reconciler().get(&id).unwrap();
    assert_eq!(
        stored.as_incident().unwrap().priority,
        Some(IncidentPriority::Critical)
    );

    console
        .push(
            names::INCIDENT_UPDATED,
            json!({
                "id": "INC-1",
                "status": "RESPONDING",
                "respondersCount": 2,
                "updatedAt": stamp(20),
            }),
        )
        .await;
    let markers = console.engine.project();
    let marker = markers.find(&id).unwrap();
    assert_eq!(marker.color, ColorToken::Amber);
    assert!(marker.urgent);
    assert_eq!(console.engine.showing_alerts().len(), 1);
    assert_eq!(*acknowledgements.lock(), vec![Some(2)]);

    assert!(console.engine.interact(&id));
    assert!(console.engine.showing_alerts().is_empty());
    assert!(!console.engine.interact(&id));
}

#[tokio::test(start_paused = true)]
async fn off_duty_responder_leaves_the_map_but_not_the_store() {
    let console = console().await;
    let id = EntityId::from(PersonnelId::new("P-7").unwrap());

    *console.source.personnel.lock() = vec![
        Personnel::new(PersonnelId::new("P-7").unwrap())
            .with_name("Putri Lestari")
            .with_duty_status(DutyStatus::OnDuty)
            .with_position(Position::new(-6.21, 106.81))
            .with_last_event_at(at(5)),
    ];
    console.engine.poll_once().await.unwrap();
    let markers = console.engine.project();
    let marker = markers.find(&id).unwrap();
    assert_eq!(marker.kind, EntityKind::Personnel);
    assert_eq!(marker.color, ColorToken::Green);

    console
        .push(
            names::PERSONNEL_STATUS,
            json!({"personnelId": "P-7", "status": "OFF_DUTY", "timestamp": stamp(30)}),
        )
        .await;
    assert!(console.engine.project().find(&id).is_none());

    // The roster endpoint only serves on-duty staff, so P-7 drops out of it.
    console.source.personnel.lock().clear();
    console.engine.poll_once().await.unwrap();
    let stored = console.engine.reconciler().get(&id).unwrap();
    let person = stored.as_personnel().unwrap();
    assert_eq!(person.duty_status, Some(DutyStatus::OffDuty));
    assert_eq!(person.name.as_deref(), Some("Putri Lestari"));

    console
        .push(
            names::PERSONNEL_LOCATION_UPDATED,
            json!({"personnelId": "P-7", "lat": -6.3, "lng": 106.9, "timestamp": stamp(40)}),
        )
        .await;
    assert!(console.engine.project().find(&id).is_none());
    let stored = console.engine.reconciler().get(&id).unwrap();
    assert_eq!(
        stored.as_personnel().unwrap().position,
        Some(Position::new(-6.3, 106.9))
    );
}

fn count_raised(
    engine: &SyncEngine,
) -> (Arc<Mutex<Vec<IncidentId>>>, Subscription) {
    let raised = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&raised);
    let sub = engine.bus().subscribe(Topic::Alerts, move |signal| {
        if let Signal::AlertRaised(record) = signal {
            seen.lock().push(record.incident.clone());
        }
    });
    (raised, sub)
}

fn medium_incident(raw: &str, secs: i64) -> Value {
    json!({
        "id": raw,
        "status": "VERIFIED",
        "priority": "MEDIUM",
        "location": {"lat": 1.0, "lng": 2.0},
        "updatedAt": stamp(secs),
    })
}

#[tokio::test(start_paused = true)]
async fn creation_seen_by_push_then_poll_alerts_once() {
    let console = console().await;
    let (raised, _sub) = count_raised(&console.engine);

    console
        .push(names::INCIDENT_CREATED, medium_incident("INC-2", 10))
        .await;
    *console.source.incidents.lock() =
        vec![serde_json::from_value(medium_incident("INC-2", 10)).unwrap()];
    console.engine.poll_once().await.unwrap();

    assert_eq!(*raised.lock(), vec![incident_id("INC-2")]);
    assert_eq!(console.engine.project().count(EntityKind::Incident), 1);
    let alerts = console.engine.showing_alerts();
    assert_eq!(alerts[0].kind, AlertKind::Notice);
}

#[tokio::test(start_paused = true)]
async fn creation_seen_by_poll_then_push_alerts_once() {
    let console = console().await;
    let (raised, _sub) = count_raised(&console.engine);

    *console.source.incidents.lock() =
        vec![serde_json::from_value(medium_incident("INC-3", 10)).unwrap()];
    console.engine.poll_once().await.unwrap();
    assert_eq!(console.engine.project().count(EntityKind::Incident), 1);

    // The duplicate carries nothing new, so the following frame is what
    // proves it has been processed.
    console
        .peer
        .push(names::INCIDENT_CREATED, medium_incident("INC-3", 10))
        .await;
    console
        .push(names::INCIDENT_CREATED, medium_incident("INC-4", 12))
        .await;

    assert_eq!(
        *raised.lock(),
        vec![incident_id("INC-3"), incident_id("INC-4")]
    );
    assert_eq!(console.engine.project().count(EntityKind::Incident), 2);
}

#[tokio::test(start_paused = true)]
async fn deleted_incident_is_not_revived_by_a_lagging_snapshot() {
    let console = console().await;
    let id = EntityId::from(incident_id("INC-5"));
    console
        .push(names::INCIDENT_CREATED, medium_incident("INC-5", 10))
        .await;
    console
        .push(names::INCIDENT_DELETED, json!({"incidentId": "INC-5"}))
        .await;
    assert!(console.engine.project().find(&id).is_none());

    *console.source.incidents.lock() =
        vec![serde_json::from_value(medium_incident("INC-5", 10)).unwrap()];
    console.engine.poll_once().await.unwrap();
    assert!(console.engine.reconciler().get(&id).is_none());

    console
        .push(names::INCIDENT_UPDATED, medium_incident("INC-5", 90))
        .await;
    assert!(console.engine.project().find(&id).is_some());
}

fn reconciler() -> Reconciler {
    Reconciler::new(
        Arc::new(ManualClock::new(at(60))),
        EventBus::default(),
        AlertConfig::default(),
        true,
    )
}

#[test]
fn newest_event_wins_in_either_order() {
    let older = PushFrame::new(
        names::INCIDENT_UPDATED,
        json!({
            "id": "INC-6",
            "status": "RESPONDING",
            "respondersCount": 1,
            "title": "Flooded underpass",
            "updatedAt": stamp(10),
        }),
    );
    let newer = PushFrame::new(
        names::INCIDENT_UPDATED,
        json!({
            "id": "INC-6",
            "status": "ARRIVED",
            "respondersCount": 2,
            "updatedAt": stamp(20),
        }),
    );
    let id = EntityId::from(incident_id("INC-6"));

    for order in [[&older, &newer], [&newer, &older]] {
        let reconciler = reconciler();
        for frame in order {
            reconciler.apply_frame(frame);
        }
        let stored = reconciler.get(&id).unwrap();
        let incident = stored.as_incident().unwrap();
        assert_eq!(incident.status, Some(IncidentStatus::Arrived));
        assert_eq!(incident.responders_count, Some(2));
        assert_eq!(incident.title.as_deref(), Some("Flooded underpass"));
        assert_eq!(incident.last_event_at, Some(at(20)));
    }
}

#[tokio::test(start_paused = true)]
async fn operator_filters_reproject_without_new_data() {
    let console = console().await;
    *console.source.incidents.lock() = vec![
        Incident::new(incident_id("INC-7"))
            .with_status(IncidentStatus::Responding)
            .with_priority(IncidentPriority::High)
            .with_position(Position::new(-6.2, 106.8))
            .with_last_event_at(at(5)),
        Incident::new(incident_id("INC-8"))
            .with_status(IncidentStatus::Verified)
            .with_priority(IncidentPriority::Low)
            .with_position(Position::new(-6.3, 106.7))
            .with_last_event_at(at(5)),
    ];
    console.engine.poll_once().await.unwrap();
    assert_eq!(console.engine.project().count(EntityKind::Incident), 2);

    let mut revision = console.engine.watch_revision();
    let before = *revision.borrow_and_update();
    let mut filters = OperatorFilters::default();
    filters.priorities.insert(IncidentPriority::High);
    console.engine.set_filters(filters.clone());

    assert!(*revision.borrow() > before);
    assert_eq!(console.engine.filters(), filters);
    let markers = console.engine.project();
    assert_eq!(markers.count(EntityKind::Incident), 1);
    assert!(markers.find(&EntityId::from(incident_id("INC-7"))).is_some());
}

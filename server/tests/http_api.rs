//! HTTP contract of the competition service, driven through `axum-test`.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use common::Competition;
use topout_scoring::api::{
    AdvanceResponse, AdvanceStatus, ErrorBody, RecordAttemptRequest, RegistrationRequest,
    StartOrderSlot, StartOrderUpdate,
};
use topout_scoring::{
    AttemptLedgerEntry, Climber, ClimberId, CompetitionResults, Gender, JudgeAction, LedgerKey,
    RoundId, StartlistEntry,
};
use topout_server::{AppState, build_router};

fn server(state: AppState) -> TestServer {
    TestServer::new(build_router(state)).unwrap()
}

fn entry(climber: ClimberId, boulder: topout_scoring::BoulderId, taps: &[JudgeAction]) -> AttemptLedgerEntry {
    taps.iter()
        .fold(AttemptLedgerEntry::fresh(LedgerKey::new(climber, boulder)), |e, a| e.apply(*a))
}

/// Alex tops boulder 1 first go, Blair gets its zone on the second try.
async fn score_qualification(server: &TestServer, comp: &Competition) {
    let [alex, blair, _] = comp.climbers;
    let entries = [
        entry(alex, comp.boulders[0], &[JudgeAction::Top]),
        entry(blair, comp.boulders[0], &[JudgeAction::Attempt, JudgeAction::Zone]),
    ];
    for e in entries {
        server
            .post("/api/attempts")
            .json(&RecordAttemptRequest::new(comp.id, &e))
            .await
            .assert_status_ok();
    }
}

#[tokio::test]
async fn recorded_attempts_show_up_in_ledger_and_results() {
    let comp = Competition::new();
    let server = server(comp.state());
    let [alex, blair, casey] = comp.climbers;

    score_qualification(&server, &comp).await;

    let ledger: Vec<AttemptLedgerEntry> = server
        .get(&format!("/api/competitions/{}/ledger", comp.id))
        .add_query_param("round", comp.qualification)
        .await
        .json();
    assert_eq!(ledger.len(), 2);

    let blair_only: Vec<AttemptLedgerEntry> = server
        .get(&format!("/api/competitions/{}/ledger", comp.id))
        .add_query_param("climber", blair)
        .await
        .json();
    assert_eq!(blair_only.len(), 1);
    assert_eq!(
        (blair_only[0].zone_attempts, blair_only[0].top_attempts),
        (2, 2)
    );

    let results: CompetitionResults = server
        .get(&format!("/api/competitions/{}/results", comp.id))
        .await
        .json();
    let qualification = &results[0].rounds[0];
    assert_eq!(qualification.label, "Qualification");
    let ranking: Vec<(ClimberId, u32)> = qualification
        .results
        .iter()
        .map(|row| (row.result.climber_id, row.result.rank))
        .collect();
    assert_eq!(ranking, vec![(alex, 1), (blair, 2), (casey, 3)]);
    assert!((qualification.results[0].result.total_score - 25.0).abs() < 1e-9);
}

#[tokio::test]
async fn writes_are_published_to_observers() {
    let comp = Competition::new();
    let state = comp.state();
    let mut observer = state.hub.subscribe(comp.id).await;
    let server = server(state);

    score_qualification(&server, &comp).await;

    let first: CompetitionResults = serde_json::from_str(&observer.recv().await.unwrap()).unwrap();
    let second: CompetitionResults = serde_json::from_str(&observer.recv().await.unwrap()).unwrap();
    assert_eq!(first[0].rounds[0].results[0].result.tops, 1);
    assert_eq!(second[0].rounds[0].results[1].result.zones, 1);
}

#[tokio::test]
async fn invalid_entries_are_rejected() {
    let comp = Competition::new();
    let server = server(comp.state());

    let mut top_without_zone = AttemptLedgerEntry::fresh(LedgerKey::new(comp.climbers[0], comp.boulders[0]));
    top_without_zone.top_reached = true;
    top_without_zone.top_attempts = 1;
    let response = server
        .post("/api/attempts")
        .json(&RecordAttemptRequest::new(comp.id, &top_without_zone))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json::<ErrorBody>().code, "VALIDATION_ERROR");

    let unknown_boulder = entry(comp.climbers[0], topout_scoring::BoulderId::new(), &[JudgeAction::Zone]);
    server
        .post("/api/attempts")
        .json(&RecordAttemptRequest::new(comp.id, &unknown_boulder))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let garbled = server
        .post("/api/attempts")
        .bytes(axum::body::Bytes::from_static(b"{\"climber_id\":"))
        .content_type("application/json")
        .await;
    garbled.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(garbled.json::<ErrorBody>().code, "BAD_REQUEST");
}

#[tokio::test]
async fn advancement_runs_once() {
    let comp = Competition::new();
    let server = server(comp.state());
    let [alex, blair, _] = comp.climbers;

    // Nothing scored yet.
    let early = server
        .post(&format!("/api/rounds/{}/advance", comp.qualification))
        .await;
    early.assert_status(StatusCode::CONFLICT);
    assert_eq!(early.json::<AdvanceResponse>().status, AdvanceStatus::Error);

    score_qualification(&server, &comp).await;

    let response = server
        .post(&format!("/api/rounds/{}/advance", comp.qualification))
        .await;
    response.assert_status_ok();
    let body: AdvanceResponse = response.json();
    assert_eq!(body.status, AdvanceStatus::Ok);
    assert_eq!(body.advanced, 2);
    assert!(body.message.is_none());

    let finalists: Vec<StartlistEntry> = server
        .get(&format!("/api/competitions/{}/startlist", comp.id))
        .add_query_param("category", "Men")
        .add_query_param("round", "Final")
        .await
        .json();
    let order: Vec<(ClimberId, u32)> = finalists.iter().map(|e| (e.climber_id, e.start_order)).collect();
    assert_eq!(order, vec![(alex, 1), (blair, 2)]);

    let again = server
        .post(&format!("/api/rounds/{}/advance", comp.qualification))
        .await;
    again.assert_status(StatusCode::CONFLICT);
    let body: AdvanceResponse = again.json();
    assert_eq!(body.advanced, 0);
    assert!(body.message.unwrap().contains("already completed"));

    server
        .post(&format!("/api/rounds/{}/advance", comp.final_round))
        .await
        .assert_status(StatusCode::CONFLICT);
    server
        .post(&format!("/api/rounds/{}/advance", RoundId::new()))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn advancing_nobody_still_publishes_completion() {
    let mut comp = Competition::new();
    comp.fixture.rounds[0].advance_count = 0;
    let state = comp.state();
    let mut observer = state.hub.subscribe(comp.id).await;
    let server = server(state);

    score_qualification(&server, &comp).await;
    observer.recv().await.unwrap();
    observer.recv().await.unwrap();

    let response = server
        .post(&format!("/api/rounds/{}/advance", comp.qualification))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<AdvanceResponse>().advanced, 0);

    let snapshot: CompetitionResults = serde_json::from_str(&observer.recv().await.unwrap()).unwrap();
    assert!(snapshot[0].rounds[0].completed);
}

#[tokio::test]
async fn start_order_is_replaced_only_when_current() {
    let comp = Competition::new();
    let server = server(comp.state());
    let [alex, blair, casey] = comp.climbers;

    let update = |order: Vec<(ClimberId, u32)>| StartOrderUpdate {
        competition_id: comp.id,
        category: "Men".into(),
        round: "Qualification".into(),
        order: order
            .into_iter()
            .map(|(climber_id, start_order)| StartOrderSlot {
                climber_id,
                start_order,
            })
            .collect(),
    };

    let reversed: Vec<StartlistEntry> = server
        .post("/api/startlist/order")
        .json(&update(vec![(casey, 1), (blair, 2), (alex, 3)]))
        .await
        .json();
    assert_eq!(
        reversed.iter().map(|e| e.climber_id).collect::<Vec<_>>(),
        vec![casey, blair, alex]
    );

    // Built from a list that did not know about Casey.
    server
        .post("/api/startlist/order")
        .json(&update(vec![(alex, 1), (blair, 2)]))
        .await
        .assert_status(StatusCode::CONFLICT);

    server
        .post("/api/startlist/order")
        .json(&update(vec![(alex, 1), (blair, 2), (casey, 5)]))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    let stored: Vec<StartlistEntry> = server
        .get(&format!("/api/competitions/{}/startlist", comp.id))
        .add_query_param("category", "Men")
        .add_query_param("round", "Qualification")
        .await
        .json();
    assert_eq!(stored, reversed);
}

#[tokio::test]
async fn startlist_lookup_needs_known_labels() {
    let comp = Competition::new();
    let server = server(comp.state());
    let path = format!("/api/competitions/{}/startlist", comp.id);

    server
        .get(&path)
        .add_query_param("category", "Men")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    server
        .get(&path)
        .add_query_param("category", "Women")
        .add_query_param("round", "Final")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn registration_appends_and_removal_renumbers() {
    let comp = Competition::new();
    let server = server(comp.state());
    let [alex, blair, casey] = comp.climbers;
    let drew = Climber {
        id: ClimberId::new(),
        name: "Drew".into(),
        gender: Gender::Male,
        age_group: "Open".into(),
    };
    let request = RegistrationRequest {
        round_id: comp.qualification,
        climber: drew.clone(),
    };

    let added: StartlistEntry = server
        .post("/api/startlist/registrations")
        .json(&request)
        .await
        .json();
    assert_eq!(added.start_order, 4);

    let repeated: StartlistEntry = server
        .post("/api/startlist/registrations")
        .json(&request)
        .await
        .json();
    assert_eq!(repeated, added);

    let results: CompetitionResults = server
        .get(&format!("/api/competitions/{}/results", comp.id))
        .await
        .json();
    assert!(results[0].rounds[0].results.iter().any(|row| row.name == "Drew"));

    let remove = format!("/api/startlist/registrations/{}/{}", comp.qualification, blair);
    server.delete(&remove).await.assert_status(StatusCode::NO_CONTENT);
    server.delete(&remove).await.assert_status(StatusCode::NOT_FOUND);

    let remaining: Vec<StartlistEntry> = server
        .get(&format!("/api/competitions/{}/startlist", comp.id))
        .add_query_param("category", "Men")
        .add_query_param("round", "Qualification")
        .await
        .json();
    let order: Vec<(ClimberId, u32)> = remaining.iter().map(|e| (e.climber_id, e.start_order)).collect();
    assert_eq!(order, vec![(alex, 1), (casey, 2), (drew.id, 3)]);
}

#[tokio::test]
async fn service_endpoints() {
    let comp = Competition::new();
    let server = server(comp.state());

    let health = server.get("/health").await;
    health.assert_status_ok();
    assert!(health.headers().contains_key("x-request-id"));
    assert_eq!(health.json::<serde_json::Value>()["status"], "healthy");

    // This state never installed a recorder.
    server
        .get("/metrics")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);

    let missing = server.get("/api/competitions").await;
    missing.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(missing.json::<ErrorBody>().code, "NOT_FOUND");
}

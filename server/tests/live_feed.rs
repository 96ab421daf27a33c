//! Client sessions and the live result channel against a real listener.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect

mod common;

use common::Competition;
use futures::StreamExt;
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use topout_runtime::Store;
use topout_runtime::retry::RetryPolicy;
use topout_scoring::api::{AdvanceStatus, RecordAttemptRequest};
use topout_scoring::{
    ApiError, AttemptLedgerEntry, ClimberId, CompetitionApi, CompetitionResults, HttpCompetitionApi,
    JudgeAction, LedgerFilter, LedgerKey, LiveView, ReorderAction, ReorderEnvironment,
    ReorderReducer, ReorderState, ResultChannel, ScoringAction, ScoringEnvironment, ScoringReducer,
    ScoringState, StartlistQuery, WsResultTransport,
};
use topout_server::build_router;

async fn spawn_server(comp: &Competition) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(axum::serve(listener, build_router(comp.state())).into_future());
    addr
}

fn http_api(addr: SocketAddr) -> HttpCompetitionApi {
    HttpCompetitionApi::new(format!("http://{addr}"), Duration::from_secs(5)).unwrap()
}

fn quick_policy(max_retries: usize) -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(max_retries)
        .initial_delay(Duration::from_millis(10))
        .max_delay(Duration::from_millis(50))
        .jitter(false)
        .build()
}

/// Poll `check` until it yields a value or five seconds pass.
async fn eventually<T, F, Fut>(mut check: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(value) = check().await {
            return value;
        }
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn results_where<P>(channel: &ResultChannel, predicate: P) -> CompetitionResults
where
    P: Fn(&CompetitionResults) -> bool,
{
    eventually(|| async {
        match channel.view().await {
            LiveView::Results(snapshot) if predicate(&snapshot) => Some(snapshot),
            _ => None,
        }
    })
    .await
}

#[tokio::test]
async fn first_message_is_the_current_snapshot() {
    let comp = Competition::new();
    let addr = spawn_server(&comp).await;

    let url = format!("ws://{addr}/results/{}", comp.id);
    let (mut socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    let message = socket.next().await.unwrap().unwrap();
    let snapshot: CompetitionResults = serde_json::from_str(&message.into_text().unwrap()).unwrap();

    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].label, "Men");
    let labels: Vec<&str> = snapshot[0].rounds.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, vec!["Qualification", "Final"]);
    assert_eq!(snapshot[0].rounds[0].results.len(), 3);
}

#[tokio::test]
async fn observers_follow_judge_writes() {
    let comp = Competition::new();
    let addr = spawn_server(&comp).await;
    let api = http_api(addr);
    let [alex, blair, _] = comp.climbers;

    let transport = Arc::new(WsResultTransport::new(format!("ws://{addr}")));
    let channel = ResultChannel::open(transport, comp.id, quick_policy(3));
    results_where(&channel, |s| s[0].rounds[0].results.len() == 3).await;

    // Blair tops a boulder, then Alex tops both.
    let writes = [
        (blair, comp.boulders[0]),
        (alex, comp.boulders[0]),
        (alex, comp.boulders[1]),
    ];
    for (climber, boulder) in writes {
        let entry = AttemptLedgerEntry::fresh(LedgerKey::new(climber, boulder)).apply(JudgeAction::Top);
        api.record_attempt(RecordAttemptRequest::new(comp.id, &entry))
            .await
            .unwrap();
    }

    let snapshot = results_where(&channel, |s| s[0].rounds[0].results[0].result.tops == 2).await;
    let leaders: Vec<(ClimberId, u32)> = snapshot[0].rounds[0]
        .results
        .iter()
        .take(2)
        .map(|row| (row.result.climber_id, row.result.rank))
        .collect();
    assert_eq!(leaders, vec![(alex, 1), (blair, 2)]);
    assert!(channel.state(|s| s.connected).await);

    channel.close().await;
}

#[tokio::test]
async fn unreachable_feed_becomes_a_connectivity_error() {
    // Bind and release a port so nothing listens on it.
    let addr = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();
    let transport = Arc::new(WsResultTransport::new(format!("ws://{addr}")));
    let channel = ResultChannel::open(transport, topout_scoring::CompetitionId::new(), quick_policy(1));

    let message = eventually(|| async {
        match channel.view().await {
            LiveView::ConnectivityError(message) => Some(message),
            _ => None,
        }
    })
    .await;
    assert!(!message.is_empty());
}

#[tokio::test]
async fn judge_and_organizer_sessions_over_http() {
    let comp = Competition::new();
    let addr = spawn_server(&comp).await;
    let api: Arc<dyn CompetitionApi> = Arc::new(http_api(addr));
    let [alex, blair, casey] = comp.climbers;

    let judge = Store::new(
        ScoringState::new(comp.id, LedgerFilter::round(comp.qualification)),
        ScoringReducer::new(),
        ScoringEnvironment::new(Arc::clone(&api)),
    );
    let taps = [
        (casey, JudgeAction::Attempt),
        (casey, JudgeAction::Zone),
        (blair, JudgeAction::Top),
    ];
    for (climber, action) in taps {
        judge
            .send(ScoringAction::Judge {
                key: LedgerKey::new(climber, comp.boulders[0]),
                action,
            })
            .await
            .unwrap()
            .wait()
            .await;
    }
    assert!(judge.state(|s| s.in_flight.is_empty() && s.error.is_none()).await);

    let stored = api
        .fetch_ledger(comp.id, LedgerFilter::round(comp.qualification))
        .await
        .unwrap();
    assert_eq!(stored.len(), 2);

    let response = api.advance_round(comp.qualification).await.unwrap();
    assert_eq!(response.status, AdvanceStatus::Ok);
    assert_eq!(response.advanced, 2);
    assert!(matches!(
        api.advance_round(comp.qualification).await,
        Err(ApiError::Conflict(_))
    ));

    let query = StartlistQuery {
        competition_id: comp.id,
        category: "Men".into(),
        round: "Final".into(),
    };
    let organizer = Store::new(
        ReorderState::new(query.clone(), comp.final_round),
        ReorderReducer::new(),
        ReorderEnvironment::new(Arc::clone(&api)),
    );
    organizer.send(ReorderAction::Load).await.unwrap().wait().await;
    assert_eq!(organizer.state(ReorderState::climbers).await, vec![blair, casey]);

    organizer
        .send(ReorderAction::Move { from: 0, to: 1 })
        .await
        .unwrap()
        .wait()
        .await;
    assert!(organizer.state(|s| s.phase.is_stable() && s.error.is_none()).await);

    let final_order: Vec<ClimberId> = api
        .fetch_startlist(query)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.climber_id)
        .collect();
    assert_eq!(final_order, vec![casey, blair]);
    assert!(!final_order.contains(&alex));
}

//! End-to-end scenarios against an in-process fixture backend.
//!
//! The fixture is a small axum app that mimics the scheduling API:
//! bearer-token auth with a refresh exchange, paginated list endpoints,
//! a deliberately slow capacity POST (so the optimistic row is
//! observable), a failable stage PATCH, and a push channel that emits
//! one order delta per connection.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State, ws::WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde_json::{Value, json};

use shopfloor::SyncClient;
use shopfloor::cache::QueryParams;
use shopfloor::config::ShopfloorConfig;
use shopfloor::errors::ApiError;
use shopfloor::live::{LiveBridge, StreamResource};
use shopfloor::models::{CapacityDraft, StagePatch, is_provisional};
use shopfloor::storage::{CredentialStore, Scope, StoredIdentity, TokenPair};

// ── Fixture backend ───────────────────────────────────────────────────

#[derive(Debug)]
struct BackendState {
    valid_access: String,
    refresh_token: String,
    refresh_calls: usize,
    orders_fetches: usize,
    capacities: Vec<Value>,
    orders: Vec<Value>,
    stages: Vec<Value>,
    fail_stage_patch: bool,
    capacity_post_delay: Duration,
}

impl Default for BackendState {
    fn default() -> Self {
        Self {
            valid_access: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
            refresh_calls: 0,
            orders_fetches: 0,
            capacities: vec![
                json!({"id": 1, "category": 2, "per_day": 300}),
                json!({"id": 2, "category": 3, "per_day": 150}),
            ],
            orders: vec![
                json!({
                    "id": "INV-100", "invoice": "100", "customer": "Acme Metal",
                    "ship_date": null, "c_name": "Acme", "c_city": "Dayton",
                    "count_items": 2, "completed": false,
                    "sales_order": null, "origin_items": []
                }),
                json!({
                    "id": "INV-101", "invoice": "101", "customer": "Globex",
                    "ship_date": null, "c_name": "Globex", "c_city": "Akron",
                    "count_items": 1, "completed": false,
                    "sales_order": null, "origin_items": []
                }),
            ],
            stages: vec![
                json!({"id": 1, "name": "Cutting", "position": 1, "color": "#111", "flow": 1, "item_ids": []}),
                json!({"id": 2, "name": "Bending", "position": 2, "color": "#222", "flow": 1, "item_ids": []}),
                json!({"id": 3, "name": "Packing", "position": 3, "color": "#333", "flow": 1, "item_ids": []}),
            ],
            fail_stage_patch: false,
            capacity_post_delay: Duration::ZERO,
        }
    }
}

type Shared = Arc<Mutex<BackendState>>;

fn page(rows: &[Value]) -> Value {
    json!({"count": rows.len(), "next": null, "previous": null, "results": rows})
}

fn authorized(headers: &HeaderMap, state: &Shared) -> bool {
    let expected = format!("Bearer {}", state.lock().unwrap().valid_access);
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "token expired"})),
    )
        .into_response()
}

async fn refresh_handler(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut guard = state.lock().unwrap();
    guard.refresh_calls += 1;
    if body.get("refresh").and_then(Value::as_str) == Some(guard.refresh_token.as_str()) {
        guard.valid_access = "access-fresh".to_string();
        (StatusCode::OK, Json(json!({"access": "access-fresh"}))).into_response()
    } else {
        unauthorized()
    }
}

async fn capacities_list(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&headers, &state) {
        return unauthorized();
    }
    let rows = state.lock().unwrap().capacities.clone();
    Json(page(&rows)).into_response()
}

async fn capacities_post(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers, &state) {
        return unauthorized();
    }
    let delay = state.lock().unwrap().capacity_post_delay;
    tokio::time::sleep(delay).await;
    let row = json!({
        "id": 77,
        "category": body["category"],
        "per_day": body["per_day"],
    });
    state.lock().unwrap().capacities.push(row.clone());
    (StatusCode::CREATED, Json(row)).into_response()
}

async fn orders_list(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&headers, &state) {
        return unauthorized();
    }
    let rows = {
        let mut guard = state.lock().unwrap();
        guard.orders_fetches += 1;
        guard.orders.clone()
    };
    Json(page(&rows)).into_response()
}

async fn stages_list(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&headers, &state) {
        return unauthorized();
    }
    let rows = state.lock().unwrap().stages.clone();
    Json(page(&rows)).into_response()
}

async fn stages_patch(
    State(state): State<Shared>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers, &state) {
        return unauthorized();
    }
    let mut guard = state.lock().unwrap();
    if guard.fail_stage_patch {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"position": ["invalid position"]})),
        )
            .into_response();
    }
    for row in guard.stages.iter_mut() {
        if row["id"] == json!(id) {
            if let Some(position) = body.get("position") {
                row["position"] = position.clone();
            }
        }
    }
    (StatusCode::OK, Json(json!({}))).into_response()
}

/// Push channel: marks INV-100 completed server-side, emits the delta,
/// then stays open until the client goes away.
async fn ws_orders(State(state): State<Shared>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |mut socket| async move {
        {
            let mut guard = state.lock().unwrap();
            if let Some(row) = guard.orders.iter_mut().find(|r| r["id"] == json!("INV-100")) {
                row["completed"] = json!(true);
            }
        }
        let delta = json!({"id": "INV-100", "completed": true}).to_string();
        let _ = socket
            .send(axum::extract::ws::Message::Text(delta.into()))
            .await;
        while let Some(Ok(_)) = socket.recv().await {}
    })
}

async fn spawn_backend(state: Shared) -> String {
    let app = Router::new()
        .route("/token/refresh/", post(refresh_handler))
        .route("/capacities/", get(capacities_list).post(capacities_post))
        .route("/orders/", get(orders_list))
        .route("/stages/", get(stages_list))
        .route("/stages/{id}/", patch(stages_patch))
        .route("/ws/orders/", get(ws_orders))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/", addr)
}

// ── Client fixture ────────────────────────────────────────────────────

struct Fixture {
    client: SyncClient,
    store: Arc<CredentialStore>,
    state: Shared,
    config: ShopfloorConfig,
    _dir: tempfile::TempDir,
}

async fn fixture_with(state: BackendState, access: &str) -> Fixture {
    let state = Arc::new(Mutex::new(state));
    let base_url = spawn_backend(state.clone()).await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(CredentialStore::open(dir.path()));
    store
        .store_pair(
            TokenPair {
                access: access.to_string(),
                refresh: "refresh-1".to_string(),
            },
            StoredIdentity { id: 1 },
            Scope::Durable,
        )
        .unwrap();

    let mut config = ShopfloorConfig::default();
    config.api.base_url = base_url;
    let client = SyncClient::new(&config, store.clone()).unwrap();
    Fixture {
        client,
        store,
        state,
        config,
        _dir: dir,
    }
}

async fn fixture(state: BackendState) -> Fixture {
    fixture_with(state, "access-1").await
}

// ── Scenarios ─────────────────────────────────────────────────────────

#[tokio::test]
async fn optimistic_capacity_add_shows_provisional_row_then_server_id() {
    let fixture = fixture(BackendState {
        capacity_post_delay: Duration::from_millis(200),
        ..Default::default()
    })
    .await;
    let params = QueryParams::new().offset(0).limit(10);

    let mut view = fixture.client.capacities(params.clone());
    let before = view.settled().await.unwrap();
    assert_eq!(before.results.len(), 2);

    let add = {
        let client = fixture.client.clone();
        let params = params.clone();
        tokio::spawn(async move {
            client
                .add_capacity(
                    CapacityDraft {
                        category: 5,
                        per_day: 500,
                    },
                    Some(&params),
                )
                .await
        })
    };

    // The row is visible before the slow POST resolves, under a
    // provisional id.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let speculative = view.current().expect("optimistic view decodes");
    assert_eq!(speculative.results.len(), 3);
    let new_row = &speculative.results[2];
    assert_eq!(new_row.per_day, 500);
    assert!(is_provisional(new_row.id), "id {} should be provisional", new_row.id);

    let created = add.await.unwrap().unwrap();
    assert_eq!(created.id, 77);

    // The invalidation refetch replaces the provisional id with the
    // server-assigned one.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let rows = view.current().expect("view decodes");
        if rows.results.len() == 3 && rows.results.iter().all(|r| !is_provisional(r.id)) {
            assert!(rows.results.iter().any(|r| r.id == 77));
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "reconciliation timed out");
        view.subscription().changed().await;
    }
}

#[tokio::test]
async fn failed_stage_move_restores_card_positions() {
    let fixture = fixture(BackendState {
        fail_stage_patch: true,
        ..Default::default()
    })
    .await;
    let params = QueryParams::new().set("flow", 1);

    let mut board = fixture.client.stages(params.clone());
    let before = board.settled().await.unwrap();
    let original: Vec<(i64, i64)> = before.results.iter().map(|s| (s.id, s.position)).collect();

    let err = fixture
        .client
        .patch_stage(
            1,
            StagePatch {
                position: Some(3),
                ..Default::default()
            },
            Some(&params),
        )
        .await
        .unwrap_err();

    // The failure carries the field-level payload for the form...
    match &err {
        ApiError::Validation { fields } => {
            assert_eq!(fields["position"], vec!["invalid position"]);
        }
        other => panic!("expected validation error, got {:?}", other),
    }

    // ...and the board snapped back to where it was.
    let after = board.current().expect("board decodes");
    let restored: Vec<(i64, i64)> = after.results.iter().map(|s| (s.id, s.position)).collect();
    assert_eq!(restored, original);
}

#[tokio::test]
async fn expired_token_refreshes_transparently_and_replays_once() {
    let fixture = fixture_with(BackendState::default(), "stale-access").await;

    let mut view = fixture
        .client
        .capacities(QueryParams::new().offset(0).limit(10));
    let rows = view.settled().await.unwrap();

    // The caller never saw the 401.
    assert_eq!(rows.results.len(), 2);
    assert_eq!(fixture.state.lock().unwrap().refresh_calls, 1);
    // The refreshed token landed in the same (durable) scope.
    let pair = fixture.store.token_pair().unwrap();
    assert_eq!(pair.access, "access-fresh");
    assert_eq!(pair.refresh, "refresh-1");
    assert_eq!(fixture.store.active_scope(), Some(Scope::Durable));
}

#[tokio::test]
async fn concurrent_unauthorized_requests_share_one_refresh_exchange() {
    let fixture = fixture_with(BackendState::default(), "stale-access").await;
    let params = QueryParams::new().offset(0).limit(10);

    let mut handles = Vec::new();
    for _ in 0..3 {
        let client = fixture.client.clone();
        let params = params.clone();
        handles.push(tokio::spawn(async move {
            // Distinct keys, so each subscription fires its own request.
            client.capacities(params).settled().await
        }));
    }
    // Same key three ways would dedupe in the cache; vary the params so
    // three real requests hit the backend at once.
    let mut a = fixture.client.capacities(params.clone().set("category", 1));
    let mut b = fixture.client.capacities(params.clone().set("category", 2));
    let mut c = fixture.client.capacities(params.clone().set("category", 3));
    let (ra, rb, rc) = tokio::join!(a.settled(), b.settled(), c.settled());
    ra.unwrap();
    rb.unwrap();
    rc.unwrap();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(
        fixture.state.lock().unwrap().refresh_calls,
        1,
        "concurrent 401s must share one refresh exchange"
    );
}

#[tokio::test]
async fn failed_refresh_clears_credentials_and_signals_logout() {
    let fixture = fixture_with(
        BackendState {
            refresh_token: "rotated-elsewhere".to_string(),
            ..Default::default()
        },
        "stale-access",
    )
    .await;

    let mut auth_state = fixture.client.api().auth_state();
    let mut view = fixture
        .client
        .capacities(QueryParams::new().offset(0).limit(10));
    let err = view.settled().await;

    assert!(err.is_err(), "terminal auth failure must surface");
    assert!(fixture.store.token_pair().is_none(), "credentials cleared");
    assert_eq!(
        *auth_state.borrow_and_update(),
        shopfloor::api::AuthState::Anonymous
    );
}

#[tokio::test]
async fn push_delta_updates_subscribed_order_row_and_schedules_refetch() {
    let fixture = fixture(BackendState::default()).await;
    let params = QueryParams::new().offset(0).limit(25);

    let mut view = fixture.client.orders(params);
    let before = view.settled().await.unwrap();
    assert!(!before.results[0].completed);
    let fetches_before = fixture.state.lock().unwrap().orders_fetches;

    let bridge = Arc::new(LiveBridge::new(
        &fixture.config,
        StreamResource::Orders,
        fixture.client.cache().clone(),
        fixture.store.clone(),
    ));
    let runner = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.run().await })
    };

    // The pushed delta lands in the subscribed row without a reload.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let page = view.current().expect("orders decode");
        let row = page.results.iter().find(|o| o.id == "INV-100").unwrap();
        if row.completed {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "merge timed out");
        view.subscription().changed().await;
    }

    // And a reconciling refetch was scheduled on top of the merge.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while fixture.state.lock().unwrap().orders_fetches == fetches_before {
        assert!(tokio::time::Instant::now() < deadline, "refetch timed out");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    bridge.shutdown();
    let _ = runner.await;
}

//! End-to-end syncs against an in-process API under virtual time

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};
use syncline_core::{ApiError, ClientError, ManualClock, Page, PageRequest, RateLimitedClient, RetryPolicy, Transport};
use syncline_engine::cursor::params;
use syncline_engine::{
    BookmarkPath, BookmarkStore, CursorKind, JsonLinesSink, MemorySink, StreamConfig, SyncConfig,
    SyncContext, SyncError, run_sync,
};
use tempfile::TempDir;

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 4, d, 0, 0, 0).unwrap()
}

fn rec(id: u64, updated_at: &str) -> Value {
    json!({"id": id, "updated_at": updated_at})
}

fn parse(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
}

/// Serves records per resource honoring window, order, page and since_id
/// parameters; can inject one rate limit, per-resource failures and
/// resources that answer in descending order.
#[derive(Default)]
struct MockApi {
    data: Mutex<HashMap<String, Vec<Value>>>,
    calls: Mutex<Vec<PageRequest>>,
    rate_limit_at: Mutex<Option<(usize, Duration)>>,
    failures: Mutex<HashMap<String, u16>>,
    reversed: Mutex<BTreeSet<String>>,
}

impl MockApi {
    fn with(self, resource: &str, records: Vec<Value>) -> Self {
        self.data.lock().unwrap().insert(resource.to_string(), records);
        self
    }

    fn calls(&self) -> Vec<PageRequest> {
        self.calls.lock().unwrap().clone()
    }

    fn calls_for(&self, resource: &str) -> Vec<PageRequest> {
        self.calls()
            .into_iter()
            .filter(|r| r.resource == resource)
            .collect()
    }

    fn serve(&self, request: &PageRequest) -> Result<Page, ApiError> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(request.clone());
            calls.len() - 1
        };
        if let Some((at, wait)) = *self.rate_limit_at.lock().unwrap() {
            if at == index {
                return Err(ApiError::RateLimited { retry_after: wait });
            }
        }
        if let Some(&status) = self.failures.lock().unwrap().get(&request.resource) {
            return Err(ApiError::Http {
                status: Some(status),
                message: "scripted failure".into(),
            });
        }

        let data = self.data.lock().unwrap();
        let mut records: Vec<Value> = data
            .get(&request.resource)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|r| {
                let ts = parse(r["updated_at"].as_str().unwrap());
                request.get(params::UPDATED_MIN).map_or(true, |m| ts >= parse(m))
                    && request.get(params::UPDATED_MAX).map_or(true, |m| ts < parse(m))
            })
            .filter(|r| {
                let since = request
                    .get(params::SINCE_ID)
                    .map_or(0, |s| s.parse::<u64>().unwrap());
                request.get(params::SINCE_ID).is_none() || r["id"].as_u64().unwrap() > since
            })
            .collect();
        if request.get(params::ORDER).is_some_and(|o| o.starts_with("id")) {
            records.sort_by_key(|r| r["id"].as_u64().unwrap());
        } else {
            records.sort_by_key(|r| parse(r["updated_at"].as_str().unwrap()));
        }

        let limit: usize = request.get(params::LIMIT).map_or(250, |l| l.parse().unwrap());
        let page: usize = request.get(params::PAGE).map_or(1, |p| p.parse().unwrap());
        let mut records: Vec<Value> = records
            .into_iter()
            .skip((page - 1) * limit)
            .take(limit)
            .collect();
        if self.reversed.lock().unwrap().contains(&request.resource) {
            records.reverse();
        }
        Ok(Page::new(records))
    }
}

struct Handle(Arc<MockApi>);

impl Transport for Handle {
    fn fetch(&self, request: &PageRequest) -> Result<Page, ApiError> {
        self.0.serve(request)
    }
}

fn context<S: syncline_engine::Sink>(
    api: &Arc<MockApi>,
    clock: &Arc<ManualClock>,
    bookmarks: BookmarkStore,
    sink: S,
) -> SyncContext<S> {
    let client = RateLimitedClient::new(
        Box::new(Handle(api.clone())),
        RetryPolicy::default(),
        clock.clone(),
    );
    let config = SyncConfig {
        start_date: day(1),
        page_size: 2,
        ..SyncConfig::default()
    };
    SyncContext::new(config, Arc::new(client), bookmarks, sink).with_interrupt(|| false)
}

fn orders() -> StreamConfig {
    StreamConfig::new("orders", "orders").incremental("updated_at")
}

fn products() -> StreamConfig {
    StreamConfig::new("products", "products").incremental("updated_at")
}

fn variants() -> StreamConfig {
    StreamConfig::new("variants", "products/{parent_id}/variants")
        .incremental("updated_at")
        .child_of("products")
}

fn ids(records: Vec<&Value>) -> Vec<u64> {
    records.iter().map(|r| r["id"].as_u64().unwrap()).collect()
}

fn orders_dataset() -> Vec<Value> {
    vec![
        rec(1, "2021-04-01T10:00:00Z"),
        rec(2, "2021-04-03T00:00:00Z"),
        rec(3, "2021-04-06T00:00:00Z"),
        rec(4, "2021-04-09T00:00:00Z"),
        rec(5, "2021-04-16T00:00:00Z"),
        rec(6, "2021-04-20T23:00:00Z"),
    ]
}

#[test]
fn three_windows_from_start_date_to_now() {
    let api = Arc::new(MockApi::default().with("orders", orders_dataset()));
    let clock = Arc::new(ManualClock::new(day(21)));
    let mut ctx = context(&api, &clock, BookmarkStore::in_memory(), MemorySink::new());

    let summary = run_sync(&mut ctx, &[orders()]).unwrap();

    let mins: BTreeSet<String> = api
        .calls()
        .iter()
        .filter_map(|r| r.get(params::UPDATED_MIN).map(String::from))
        .collect();
    let maxes: BTreeSet<String> = api
        .calls()
        .iter()
        .filter_map(|r| r.get(params::UPDATED_MAX).map(String::from))
        .collect();
    assert_eq!(
        mins.into_iter().collect::<Vec<_>>(),
        vec!["2021-04-01T00:00:00Z", "2021-04-08T00:00:00Z", "2021-04-15T00:00:00Z"]
    );
    assert_eq!(
        maxes.into_iter().collect::<Vec<_>>(),
        vec!["2021-04-08T00:00:00Z", "2021-04-15T00:00:00Z", "2021-04-21T00:00:00Z"]
    );

    assert_eq!(summary.get("orders").unwrap().windows, 3);
    assert_eq!(summary.total_records(), 6);
    assert_eq!(ids(ctx.sink.records("orders")), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(
        ctx.bookmarks.get(&BookmarkPath::root("orders"), "updated_at"),
        Some(day(21))
    );
    assert_eq!(ctx.bookmarks.currently_syncing(), None);
}

#[test]
fn bookmark_is_monotonic_across_syncs() {
    let api = Arc::new(MockApi::default().with("orders", orders_dataset()));
    let clock = Arc::new(ManualClock::new(day(21)));
    let mut ctx = context(&api, &clock, BookmarkStore::in_memory(), MemorySink::new());
    let path = BookmarkPath::root("orders");

    run_sync(&mut ctx, &[orders()]).unwrap();
    let first = ctx.bookmarks.get(&path, "updated_at").unwrap();

    clock.set(day(25));
    run_sync(&mut ctx, &[orders()]).unwrap();
    let second = ctx.bookmarks.get(&path, "updated_at").unwrap();
    assert!(second >= first);
    assert_eq!(second, day(25));

    // An end date in the past sweeps nothing and leaves the bookmark alone
    ctx.config.end_date = Some(day(10));
    run_sync(&mut ctx, &[orders()]).unwrap();
    assert_eq!(ctx.bookmarks.get(&path, "updated_at"), Some(second));

    // Every state message carries a non-decreasing bookmark
    let marks: Vec<DateTime<Utc>> = ctx
        .sink
        .states()
        .iter()
        .filter_map(|s| s["bookmarks"]["orders"]["updated_at"].as_str().map(parse))
        .collect();
    assert!(marks.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn no_record_loss_across_window_boundary() {
    let records = vec![
        rec(1, "2021-04-07T23:59:59Z"),
        rec(2, "2021-04-08T00:00:00Z"),
        rec(3, "2021-04-08T00:00:01Z"),
        rec(4, "2021-04-14T23:59:59Z"),
        rec(5, "2021-04-15T00:00:00Z"),
    ];
    let api = Arc::new(MockApi::default().with("orders", records));
    let clock = Arc::new(ManualClock::new(day(21)));
    let mut ctx = context(&api, &clock, BookmarkStore::in_memory(), MemorySink::new());

    run_sync(&mut ctx, &[orders()]).unwrap();
    assert_eq!(ids(ctx.sink.records("orders")), vec![1, 2, 3, 4, 5]);

    // Records touched after the first run show up exactly once in the next
    api.data
        .lock()
        .unwrap()
        .get_mut("orders")
        .unwrap()
        .push(rec(6, "2021-04-22T00:00:00Z"));
    clock.set(day(23));
    ctx.sink.messages.clear();
    run_sync(&mut ctx, &[orders()]).unwrap();
    assert_eq!(ids(ctx.sink.records("orders")), vec![6]);
}

#[test]
fn interrupted_sync_resumes_without_extra_duplicates() {
    let dir = TempDir::new().unwrap();
    let state_path = dir.path().join("state.json");
    let api = Arc::new(MockApi::default().with("orders", orders_dataset()));
    let clock = Arc::new(ManualClock::new(day(21)));

    // Uninterrupted reference run
    let mut reference = context(&api, &clock, BookmarkStore::in_memory(), MemorySink::new());
    run_sync(&mut reference, &[orders()]).unwrap();
    let expected = ids(reference.sink.records("orders"));

    // Interrupt after the first window commits
    let checks = AtomicUsize::new(0);
    let mut first = context(
        &api,
        &clock,
        BookmarkStore::open(&state_path).unwrap(),
        MemorySink::new(),
    )
    .with_interrupt(move || checks.fetch_add(1, Ordering::SeqCst) == 0);
    let err = run_sync(&mut first, &[orders()]).unwrap_err();
    assert!(matches!(err, SyncError::Interrupted));

    let reopened = BookmarkStore::open(&state_path).unwrap();
    assert_eq!(
        reopened.get(&BookmarkPath::root("orders"), "updated_at"),
        Some(day(8))
    );
    assert_eq!(reopened.currently_syncing(), Some("orders"));

    let mut second = context(&api, &clock, reopened, MemorySink::new());
    run_sync(&mut second, &[orders()]).unwrap();

    let mut resumed = ids(first.sink.records("orders"));
    resumed.extend(ids(second.sink.records("orders")));
    assert_eq!(resumed, expected);
    assert_eq!(
        BookmarkStore::open(&state_path).unwrap().currently_syncing(),
        None
    );
}

#[test]
fn child_bookmark_later_than_parent_uses_min_start() {
    let api = Arc::new(
        MockApi::default()
            .with(
                "products",
                vec![rec(1, "2021-04-02T00:00:00Z"), rec(2, "2021-04-12T00:00:00Z")],
            )
            .with(
                "products/1/variants",
                vec![rec(11, "2021-04-05T00:00:00Z"), rec(12, "2021-04-11T00:00:00Z")],
            )
            .with("products/2/variants", vec![rec(21, "2021-04-15T00:00:00Z")]),
    );
    let clock = Arc::new(ManualClock::new(day(21)));
    let mut store = BookmarkStore::in_memory();
    store.set(&BookmarkPath::root("products"), "updated_at", day(1));
    store.set(
        &BookmarkPath::nested("products", "variants"),
        "updated_at",
        day(10),
    );
    let mut ctx = context(&api, &clock, store, MemorySink::new());

    run_sync(&mut ctx, &[products(), variants()]).unwrap();

    let first_parent = &api.calls_for("products")[0];
    assert_eq!(first_parent.get(params::UPDATED_MIN), Some("2021-04-01T00:00:00Z"));
    for call in api.calls_for("products/1/variants") {
        assert_eq!(call.get(params::UPDATED_MIN), Some("2021-04-10T00:00:00Z"));
        assert_eq!(call.get(params::UPDATED_MAX), Some("2021-04-21T00:00:00Z"));
    }

    assert_eq!(ids(ctx.sink.records("products")), vec![1, 2]);
    assert_eq!(ids(ctx.sink.records("variants")), vec![12, 21]);
    assert_eq!(
        ctx.bookmarks.get(&BookmarkPath::nested("products", "variants"), "updated_at"),
        Some(day(21))
    );
    assert_eq!(
        ctx.bookmarks.get(&BookmarkPath::root("products"), "updated_at"),
        Some(day(21))
    );
    assert_eq!(ctx.sink.schemas(), vec!["products", "variants"]);
}

#[test]
fn earlier_child_bookmark_pulls_parent_start_back() {
    let api = Arc::new(
        MockApi::default()
            .with(
                "products",
                vec![rec(1, "2021-04-11T00:00:00Z"), rec(2, "2021-04-16T00:00:00Z")],
            )
            .with("products/1/variants", vec![rec(11, "2021-04-12T00:00:00Z")])
            .with("products/2/variants", vec![rec(21, "2021-04-17T00:00:00Z")]),
    );
    let clock = Arc::new(ManualClock::new(day(21)));
    let mut store = BookmarkStore::in_memory();
    store.set(&BookmarkPath::root("products"), "updated_at", day(15));
    store.set(
        &BookmarkPath::nested("products", "variants"),
        "updated_at",
        day(10),
    );
    let mut ctx = context(&api, &clock, store, MemorySink::new());

    run_sync(&mut ctx, &[products(), variants()]).unwrap();

    assert_eq!(
        api.calls_for("products")[0].get(params::UPDATED_MIN),
        Some("2021-04-10T00:00:00Z")
    );
    // product 1 is revisited for its child but not re-emitted
    assert_eq!(ids(ctx.sink.records("products")), vec![2]);
    assert_eq!(ids(ctx.sink.records("variants")), vec![11, 21]);

    // Windows below the parent bookmark never touch it
    let parent_marks: Vec<String> = ctx
        .sink
        .states()
        .iter()
        .filter_map(|s| s["bookmarks"]["products"]["updated_at"].as_str().map(String::from))
        .collect();
    assert_eq!(
        parent_marks,
        vec!["2021-04-17T00:00:00Z", "2021-04-21T00:00:00Z", "2021-04-21T00:00:00Z"]
    );
}

#[test]
fn unselected_parent_is_traversed_but_not_emitted() {
    let api = Arc::new(
        MockApi::default()
            .with("products", vec![rec(1, "2021-04-02T00:00:00Z")])
            .with("products/1/variants", vec![rec(11, "2021-04-03T00:00:00Z")]),
    );
    let clock = Arc::new(ManualClock::new(day(8)));
    let mut ctx = context(&api, &clock, BookmarkStore::in_memory(), MemorySink::new());

    let summary = run_sync(&mut ctx, &[products().deselected(), variants()]).unwrap();

    assert!(ctx.sink.records("products").is_empty());
    assert_eq!(ids(ctx.sink.records("variants")), vec![11]);
    assert_eq!(ctx.sink.schemas(), vec!["variants"]);
    assert!(summary.get("products").is_none());
    assert_eq!(
        ctx.bookmarks.get(&BookmarkPath::root("products"), "updated_at"),
        None
    );
    assert_eq!(
        ctx.bookmarks.get(&BookmarkPath::nested("products", "variants"), "updated_at"),
        Some(day(8))
    );
}

#[test]
fn rate_limit_mid_window_loses_nothing() {
    let records = (1..=5)
        .map(|id| rec(id, &format!("2021-04-0{}T00:00:00Z", id + 1)))
        .collect();
    let api = Arc::new(MockApi::default().with("orders", records));
    *api.rate_limit_at.lock().unwrap() = Some((1, Duration::from_secs(3)));
    let clock = Arc::new(ManualClock::new(day(8)));
    let mut ctx = context(&api, &clock, BookmarkStore::in_memory(), MemorySink::new());

    run_sync(&mut ctx, &[orders()]).unwrap();

    let calls = api.calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[1], calls[2]);
    let pages: BTreeSet<&str> = calls.iter().filter_map(|c| c.get(params::PAGE)).collect();
    assert_eq!(pages.len(), 3);
    assert!(clock.total_slept() >= Duration::from_secs(3));
    assert_eq!(ids(ctx.sink.records("orders")), vec![1, 2, 3, 4, 5]);
}

#[test]
fn fatal_error_aborts_run_and_keeps_resume_point() {
    let api = Arc::new(
        MockApi::default()
            .with("orders", orders_dataset())
            .with("customers", vec![rec(1, "2021-04-02T00:00:00Z")]),
    );
    api.failures.lock().unwrap().insert("orders".into(), 404);
    let clock = Arc::new(ManualClock::new(day(21)));
    let mut ctx = context(&api, &clock, BookmarkStore::in_memory(), MemorySink::new());
    let customers = StreamConfig::new("customers", "customers").incremental("updated_at");

    let err = run_sync(&mut ctx, &[orders(), customers]).unwrap_err();

    assert!(matches!(err, SyncError::Client(ClientError::Fatal(_))));
    assert_eq!(api.calls().len(), 1);
    assert!(api.calls_for("customers").is_empty());
    assert_eq!(ctx.bookmarks.currently_syncing(), Some("orders"));
    assert_eq!(
        ctx.bookmarks.get(&BookmarkPath::root("orders"), "updated_at"),
        None
    );
}

#[test]
fn interrupted_tree_goes_first_on_next_run() {
    let api = Arc::new(
        MockApi::default()
            .with("orders", orders_dataset())
            .with("products", vec![rec(1, "2021-04-02T00:00:00Z")]),
    );
    let clock = Arc::new(ManualClock::new(day(21)));
    let mut store = BookmarkStore::in_memory();
    store.set_currently_syncing(Some("products"));
    let mut ctx = context(&api, &clock, store, MemorySink::new());

    run_sync(&mut ctx, &[orders(), products()]).unwrap();

    assert_eq!(api.calls()[0].resource, "products");
    assert_eq!(ctx.bookmarks.currently_syncing(), None);
}

#[test]
fn since_id_stream_pages_by_id() {
    let records = vec![
        rec(3, "2021-04-02T00:00:00Z"),
        rec(1, "2021-04-03T00:00:00Z"),
        rec(2, "2021-04-04T00:00:00Z"),
    ];
    let api = Arc::new(MockApi::default().with("events", records));
    let clock = Arc::new(ManualClock::new(day(8)));
    let mut ctx = context(&api, &clock, BookmarkStore::in_memory(), MemorySink::new());
    let events = StreamConfig::new("events", "events")
        .incremental("updated_at")
        .with_cursor(CursorKind::SinceId);

    run_sync(&mut ctx, &[events]).unwrap();

    let calls = api.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].get(params::SINCE_ID), Some("0"));
    assert_eq!(calls[0].get(params::ORDER), Some("id asc"));
    assert_eq!(calls[1].get(params::SINCE_ID), Some("2"));
    assert_eq!(ids(ctx.sink.records("events")), vec![1, 2, 3]);
}

#[test]
fn json_lines_output_orders_records_before_state() {
    let api = Arc::new(MockApi::default().with("orders", vec![rec(1, "2021-04-02T00:00:00Z")]));
    let clock = Arc::new(ManualClock::new(day(8)));
    let mut ctx = context(&api, &clock, BookmarkStore::in_memory(), JsonLinesSink::new(Vec::new()));

    run_sync(&mut ctx, &[orders()]).unwrap();

    let out = String::from_utf8(ctx.sink.into_inner()).unwrap();
    let types: Vec<String> = out
        .lines()
        .map(|l| serde_json::from_str::<Value>(l).unwrap()["type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(types, vec!["SCHEMA", "RECORD", "STATE", "STATE"]);
}

#[test]
fn interrupted_parent_sweep_holds_child_bookmark() {
    let dir = TempDir::new().unwrap();
    let state_path = dir.path().join("state.json");
    let api = Arc::new(
        MockApi::default()
            .with(
                "products",
                vec![rec(1, "2021-04-02T00:00:00Z"), rec(2, "2021-04-12T00:00:00Z")],
            )
            .with("products/2/variants", vec![rec(21, "2021-04-05T00:00:00Z")]),
    );
    let clock = Arc::new(ManualClock::new(day(21)));
    let streams = [products(), variants()];

    let mut reference = context(&api, &clock, BookmarkStore::in_memory(), MemorySink::new());
    run_sync(&mut reference, &streams).unwrap();
    assert_eq!(ids(reference.sink.records("variants")), vec![21]);

    let checks = AtomicUsize::new(0);
    let mut first = context(
        &api,
        &clock,
        BookmarkStore::open(&state_path).unwrap(),
        MemorySink::new(),
    )
    .with_interrupt(move || checks.fetch_add(1, Ordering::SeqCst) == 0);
    let err = run_sync(&mut first, &streams).unwrap_err();
    assert!(matches!(err, SyncError::Interrupted));

    // The parent advanced past its first window, the child did not: product 2
    // still owns a variant older than 04-08
    let reopened = BookmarkStore::open(&state_path).unwrap();
    assert_eq!(
        reopened.get(&BookmarkPath::root("products"), "updated_at"),
        Some(day(8))
    );
    assert_eq!(
        reopened.get(&BookmarkPath::nested("products", "variants"), "updated_at"),
        None
    );
    for state in first.sink.states() {
        assert!(state["bookmarks"]["products"]["variants"].is_null());
    }

    let mut second = context(&api, &clock, reopened, MemorySink::new());
    run_sync(&mut second, &streams).unwrap();

    let mut products_seen = ids(first.sink.records("products"));
    products_seen.extend(ids(second.sink.records("products")));
    assert_eq!(products_seen, vec![1, 2]);
    let mut variants_seen = ids(first.sink.records("variants"));
    variants_seen.extend(ids(second.sink.records("variants")));
    assert_eq!(variants_seen, vec![21]);
    assert_eq!(
        second.bookmarks.get(&BookmarkPath::nested("products", "variants"), "updated_at"),
        Some(day(21))
    );
}

#[test]
fn child_lookback_band_is_fetched_but_not_emitted() {
    let api = Arc::new(
        MockApi::default()
            .with(
                "products",
                vec![rec(1, "2021-04-13T00:00:00Z"), rec(2, "2021-04-18T00:00:00Z")],
            )
            .with(
                "products/1/variants",
                vec![
                    rec(11, "2021-04-11T00:00:00Z"),
                    rec(12, "2021-04-13T00:00:00Z"),
                    rec(13, "2021-04-16T00:00:00Z"),
                ],
            )
            .with("products/2/variants", vec![rec(21, "2021-04-19T00:00:00Z")]),
    );
    let clock = Arc::new(ManualClock::new(day(21)));
    let mut store = BookmarkStore::in_memory();
    store.set(&BookmarkPath::root("products"), "updated_at", day(15));
    store.set(
        &BookmarkPath::nested("products", "variants"),
        "updated_at",
        day(15),
    );
    let mut ctx = context(&api, &clock, store, MemorySink::new());
    let variants = variants().with_lookback(chrono::Duration::days(3));

    run_sync(&mut ctx, &[products(), variants]).unwrap();

    assert_eq!(
        api.calls_for("products")[0].get(params::UPDATED_MIN),
        Some("2021-04-12T00:00:00Z")
    );
    let child_calls = api.calls_for("products/1/variants");
    assert!(!child_calls.is_empty());
    for call in child_calls {
        assert_eq!(call.get(params::UPDATED_MIN), Some("2021-04-12T00:00:00Z"));
    }
    // 12 lies in the lookback band: served, filtered by the child bookmark
    assert_eq!(ids(ctx.sink.records("variants")), vec![13, 21]);
    assert_eq!(ids(ctx.sink.records("products")), vec![2]);
    assert_eq!(
        ctx.bookmarks.get(&BookmarkPath::root("products"), "updated_at"),
        Some(day(21))
    );
}

#[test]
fn child_lookback_is_clamped_to_start_date() {
    let api = Arc::new(
        MockApi::default()
            .with("products", vec![rec(1, "2021-04-03T00:00:00Z")])
            .with("products/1/variants", vec![rec(11, "2021-04-01T12:00:00Z")]),
    );
    let clock = Arc::new(ManualClock::new(day(8)));
    let mut store = BookmarkStore::in_memory();
    store.set(
        &BookmarkPath::nested("products", "variants"),
        "updated_at",
        day(2),
    );
    let mut ctx = context(&api, &clock, store, MemorySink::new());
    let variants = variants().with_lookback(chrono::Duration::days(5));

    run_sync(&mut ctx, &[products(), variants]).unwrap();

    assert_eq!(
        api.calls_for("products")[0].get(params::UPDATED_MIN),
        Some("2021-04-01T00:00:00Z")
    );
    for call in api.calls_for("products/1/variants") {
        assert_eq!(call.get(params::UPDATED_MIN), Some("2021-04-01T00:00:00Z"));
    }
    assert!(ctx.sink.records("variants").is_empty());
}

#[test]
fn out_of_order_child_page_aborts_with_bookmarks_intact() {
    let api = Arc::new(
        MockApi::default()
            .with(
                "products",
                vec![rec(1, "2021-04-02T00:00:00Z"), rec(2, "2021-04-12T00:00:00Z")],
            )
            .with("products/1/variants", vec![rec(11, "2021-04-03T00:00:00Z")])
            .with(
                "products/2/variants",
                vec![rec(21, "2021-04-12T00:00:00Z"), rec(22, "2021-04-13T00:00:00Z")],
            ),
    );
    api.reversed
        .lock()
        .unwrap()
        .insert("products/2/variants".into());
    let clock = Arc::new(ManualClock::new(day(21)));
    let mut store = BookmarkStore::in_memory();
    store.set(
        &BookmarkPath::nested("products", "variants"),
        "updated_at",
        day(1),
    );
    let mut ctx = context(&api, &clock, store, MemorySink::new());
    let variants = variants().with_cursor(CursorKind::SinceId);

    let err = run_sync(&mut ctx, &[products(), variants]).unwrap_err();

    assert!(matches!(err, SyncError::OutOfOrder(_)));
    assert_eq!(ids(ctx.sink.records("variants")), vec![11]);
    assert_eq!(
        ctx.bookmarks.get(&BookmarkPath::root("products"), "updated_at"),
        Some(day(8))
    );
    assert_eq!(
        ctx.bookmarks.get(&BookmarkPath::nested("products", "variants"), "updated_at"),
        Some(day(1))
    );
    assert_eq!(ctx.bookmarks.currently_syncing(), Some("products"));
}

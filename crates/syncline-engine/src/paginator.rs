//! Windowed pagination: exhaust every page of one window, lazily
//!
//! Records are yielded as soon as their page arrives; nothing is buffered
//! beyond the current page. For since-id pagination each page is checked
//! against the ordering contract before any of its records are yielded.

use std::collections::VecDeque;
use std::fmt;

use chrono::SecondsFormat;
use serde_json::Value;
use syncline_core::{Page, PageRequest, RateLimitedClient};

use crate::cursor::{CursorStrategy, params};
use crate::error::SyncError;
use crate::stream::{CursorKind, StreamConfig};
use crate::window::Window;

/// The remote API returned a page that breaks its documented ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderingViolation {
    pub resource: String,
    pub kind: ViolationKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// A record's id is below the token that requested the page
    BelowToken { id: u64, token: u64 },
    /// The page's last record does not carry its maximum id
    LastNotMax { last: u64, max: u64 },
    /// A record has no usable numeric id
    MissingId { index: usize },
}

impl fmt::Display for OrderingViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: pagination out of order: ", self.resource)?;
        match &self.kind {
            ViolationKind::BelowToken { id, token } => {
                write!(f, "id {id} returned for since_id {token}")
            }
            ViolationKind::LastNotMax { last, max } => {
                write!(f, "last id {last} is not the page maximum {max}")
            }
            ViolationKind::MissingId { index } => write!(f, "record {index} has no numeric id"),
        }
    }
}

impl std::error::Error for OrderingViolation {}

/// Tracks the since-id ordering token across the pages of one window.
#[derive(Debug, Clone)]
pub struct OrderingGuard {
    token: Option<u64>,
}

impl OrderingGuard {
    pub fn new() -> Self {
        Self { token: None }
    }

    pub fn token(&self) -> Option<u64> {
        self.token
    }

    /// Validate one page and advance the token to its maximum id.
    pub fn check(
        &mut self,
        stream: &StreamConfig,
        request: &PageRequest,
        page: &Page,
    ) -> Result<(), OrderingViolation> {
        let violation = |kind| OrderingViolation {
            resource: request.resource.clone(),
            kind,
        };

        let mut ids = Vec::with_capacity(page.len());
        for (index, record) in page.records.iter().enumerate() {
            ids.push(
                stream
                    .record_id(record)
                    .ok_or_else(|| violation(ViolationKind::MissingId { index }))?,
            );
        }

        if let Some(token) = self.token {
            if let Some(&id) = ids.iter().find(|&&id| id < token) {
                return Err(violation(ViolationKind::BelowToken { id, token }));
            }
        }

        if let (Some(&last), Some(&max)) = (ids.last(), ids.iter().max()) {
            if last != max {
                return Err(violation(ViolationKind::LastNotMax { last, max }));
            }
            self.token = Some(max);
        }
        Ok(())
    }
}

impl Default for OrderingGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds sweeps for one stream.
#[derive(Debug, Clone, Copy)]
pub struct WindowedPaginator<'a> {
    client: &'a RateLimitedClient,
    stream: &'a StreamConfig,
    page_size: usize,
}

impl<'a> WindowedPaginator<'a> {
    pub fn new(client: &'a RateLimitedClient, stream: &'a StreamConfig, page_size: usize) -> Self {
        Self {
            client,
            stream,
            page_size,
        }
    }

    /// Filter parameters shared by every page of a sweep
    pub fn base_request(
        &self,
        strategy: &CursorStrategy,
        window: Option<Window>,
        parent_id: Option<&str>,
    ) -> PageRequest {
        let resource = match parent_id {
            Some(id) => self.stream.scoped_resource(id),
            None => self.stream.resource.clone(),
        };
        let mut request = PageRequest::new(resource).with(params::LIMIT, self.page_size.to_string());

        if let Some(window) = window {
            request.set(
                params::UPDATED_MIN,
                window.min.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            );
            request.set(
                params::UPDATED_MAX,
                window.max.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            );
        }
        // ascending order is what makes watermark advancement sound
        if let Some(field) = strategy.order_field(self.stream.bookmark_key()) {
            request.set(params::ORDER, format!("{field} asc"));
        }
        if let (Some(id), Some(param)) = (parent_id, self.stream.parent_param.as_deref()) {
            request.set(param, id);
        }
        request
    }

    /// Lazily yield every record of `window` (or of the whole resource when
    /// `None`). Restart by calling `sweep` again with the same window.
    pub fn sweep(&self, window: Option<Window>, parent_id: Option<&str>) -> Sweep<'a> {
        let mut strategy = CursorStrategy::for_stream(self.stream);
        let base = self.base_request(&strategy, window, parent_id);
        let first = strategy.first_request(&base);
        let guard = (self.stream.cursor == CursorKind::SinceId).then(OrderingGuard::new);
        Sweep {
            client: self.client,
            stream: self.stream,
            page_size: self.page_size,
            strategy,
            base,
            next: Some(first),
            buffer: VecDeque::new(),
            guard,
            pages: 0,
        }
    }
}

/// One in-flight sweep. Finite; ends after the first error.
pub struct Sweep<'a> {
    client: &'a RateLimitedClient,
    stream: &'a StreamConfig,
    page_size: usize,
    strategy: CursorStrategy,
    base: PageRequest,
    next: Option<PageRequest>,
    buffer: VecDeque<Value>,
    guard: Option<OrderingGuard>,
    pages: usize,
}

impl Sweep<'_> {
    /// Pages fetched so far
    pub fn pages(&self) -> usize {
        self.pages
    }
}

impl Iterator for Sweep<'_> {
    type Item = Result<Value, SyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Some(Ok(record));
            }
            let request = self.next.take()?;
            let page = match self.client.execute(&request) {
                Ok(page) => page,
                Err(e) => return Some(Err(e.into())),
            };
            if let Some(guard) = &mut self.guard {
                if let Err(violation) = guard.check(self.stream, &request, &page) {
                    log::error!("{violation}");
                    return Some(Err(violation.into()));
                }
            }
            self.pages += 1;
            log::debug!(
                "{}: page {} returned {} records",
                self.stream.name,
                self.pages,
                page.len()
            );
            self.next = self
                .strategy
                .next_request(&page, &self.base, self.page_size);
            self.buffer.extend(page.records);
        }
    }
}

impl std::iter::FusedIterator for Sweep<'_> {}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use syncline_core::{ApiError, ManualClock, RetryPolicy, Transport};

    use super::*;

    /// Serves pages keyed by the value of one pagination parameter
    struct PagedTransport {
        key: &'static str,
        pages: HashMap<String, Result<Page, fn() -> ApiError>>,
        log: Arc<Mutex<Vec<PageRequest>>>,
        rate_limit_once: Mutex<Option<(String, Duration)>>,
    }

    impl Transport for PagedTransport {
        fn fetch(&self, request: &PageRequest) -> Result<Page, ApiError> {
            self.log.lock().unwrap().push(request.clone());
            let position = request.get(self.key).unwrap_or("").to_string();
            let mut rl = self.rate_limit_once.lock().unwrap();
            if rl.as_ref().is_some_and(|(at, _)| *at == position) {
                let (_, wait) = rl.take().unwrap();
                return Err(ApiError::RateLimited { retry_after: wait });
            }
            match self.pages.get(&position) {
                Some(Ok(page)) => Ok(page.clone()),
                Some(Err(make)) => Err(make()),
                None => Ok(Page::default()),
            }
        }
    }

    fn records(ids: &[u64]) -> Vec<Value> {
        ids.iter()
            .map(|id| json!({"id": id, "updated_at": "2021-04-02T00:00:00Z"}))
            .collect()
    }

    fn setup(
        key: &'static str,
        pages: Vec<(&str, Result<Page, fn() -> ApiError>)>,
        rate_limit_once: Option<(&str, Duration)>,
    ) -> (RateLimitedClient, Arc<Mutex<Vec<PageRequest>>>, Arc<ManualClock>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2021, 4, 21, 0, 0, 0).unwrap(),
        ));
        let transport = PagedTransport {
            key,
            pages: pages
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            log: log.clone(),
            rate_limit_once: Mutex::new(rate_limit_once.map(|(k, d)| (k.to_string(), d))),
        };
        let client = RateLimitedClient::new(Box::new(transport), RetryPolicy::default(), clock.clone());
        (client, log, clock)
    }

    fn window() -> Window {
        Window::new(
            Utc.with_ymd_and_hms(2021, 4, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2021, 4, 8, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn first_request_carries_window_and_order() {
        let (client, log, _) = setup("page", vec![], None);
        let stream = StreamConfig::new("orders", "orders.json").incremental("updated_at");
        let paginator = WindowedPaginator::new(&client, &stream, 250);
        assert_eq!(paginator.sweep(Some(window()), None).count(), 0);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        let req = &log[0];
        assert_eq!(req.resource, "orders.json");
        assert_eq!(req.get(params::UPDATED_MIN), Some("2021-04-01T00:00:00Z"));
        assert_eq!(req.get(params::UPDATED_MAX), Some("2021-04-08T00:00:00Z"));
        assert_eq!(req.get(params::ORDER), Some("updated_at asc"));
        assert_eq!(req.get(params::LIMIT), Some("250"));
        assert_eq!(req.get(params::PAGE), Some("1"));
    }

    #[test]
    fn page_number_sweep_yields_all_pages() {
        let pages = vec![
            ("1", Ok(Page::new(records(&[1, 2])))),
            ("2", Ok(Page::new(records(&[3, 4])))),
            ("3", Ok(Page::new(records(&[5])))),
        ];
        let (client, log, _) = setup("page", pages, None);
        let stream = StreamConfig::new("orders", "orders").incremental("updated_at");
        let ids: Vec<u64> = WindowedPaginator::new(&client, &stream, 2)
            .sweep(Some(window()), None)
            .map(|r| r.unwrap()["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[test]
    fn rate_limit_on_page_two_is_transparent() {
        let pages = vec![
            ("1", Ok(Page::new(records(&[1, 2])))),
            ("2", Ok(Page::new(records(&[3, 4])))),
            ("3", Ok(Page::new(records(&[5])))),
        ];
        let (client, log, clock) = setup("page", pages, Some(("2", Duration::from_secs(3))));
        let stream = StreamConfig::new("orders", "orders").incremental("updated_at");
        let paginator = WindowedPaginator::new(&client, &stream, 2);
        let mut sweep = paginator.sweep(Some(window()), None);
        let ids: Vec<u64> = sweep
            .by_ref()
            .map(|r| r.unwrap()["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(sweep.pages(), 3);
        // page 2 requested twice, identical both times
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 4);
        assert_eq!(log[1], log[2]);
        assert!(clock.total_slept() >= Duration::from_secs(3));
    }

    #[test]
    fn opaque_cursor_sweep_follows_tokens() {
        let pages = vec![
            ("", Ok(Page::new(records(&[1, 2])).with_cursor("c2"))),
            ("c2", Ok(Page::new(records(&[3])))),
        ];
        let (client, log, _) = setup("cursor", pages, None);
        let stream = StreamConfig::new("products", "products")
            .incremental("updated_at")
            .with_cursor(CursorKind::OpaqueCursor);
        let count = WindowedPaginator::new(&client, &stream, 2)
            .sweep(Some(window()), None)
            .filter(Result::is_ok)
            .count();
        assert_eq!(count, 3);
        let log = log.lock().unwrap();
        assert_eq!(log[1].get(params::CURSOR), Some("c2"));
        // filters are kept on continuation requests
        assert_eq!(log[1].get(params::UPDATED_MIN), Some("2021-04-01T00:00:00Z"));
    }

    #[test]
    fn since_id_violation_halts_before_page_three() {
        let pages = vec![
            ("0", Ok(Page::new(records(&[1, 2])))),
            // last element is not the page maximum
            ("2", Ok(Page::new(records(&[5, 3])))),
            ("3", Ok(Page::new(records(&[6, 7])))),
        ];
        let (client, log, _) = setup("since_id", pages, None);
        let stream = StreamConfig::new("orders", "orders")
            .incremental("updated_at")
            .with_cursor(CursorKind::SinceId);
        let results: Vec<_> = WindowedPaginator::new(&client, &stream, 2)
            .sweep(Some(window()), None)
            .collect();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok() && results[1].is_ok());
        match &results[2] {
            Err(SyncError::OutOfOrder(v)) => {
                assert_eq!(v.kind, ViolationKind::LastNotMax { last: 3, max: 5 });
            }
            other => panic!("expected ordering violation, got {other:?}"),
        }
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn since_id_orders_by_id() {
        let (client, log, _) = setup("since_id", vec![], None);
        let stream = StreamConfig::new("orders", "orders")
            .incremental("updated_at")
            .with_cursor(CursorKind::SinceId);
        let _ = WindowedPaginator::new(&client, &stream, 2)
            .sweep(Some(window()), None)
            .count();
        assert_eq!(log.lock().unwrap()[0].get(params::ORDER), Some("id asc"));
    }

    #[test]
    fn fatal_error_ends_sweep() {
        fn forbidden() -> ApiError {
            ApiError::Http {
                status: Some(403),
                message: "forbidden".into(),
            }
        }
        let pages = vec![
            ("1", Ok(Page::new(records(&[1, 2])))),
            ("2", Err(forbidden as fn() -> ApiError)),
        ];
        let (client, _, _) = setup("page", pages, None);
        let stream = StreamConfig::new("orders", "orders").incremental("updated_at");
        let results: Vec<_> = WindowedPaginator::new(&client, &stream, 2)
            .sweep(Some(window()), None)
            .collect();
        assert_eq!(results.len(), 3);
        assert!(matches!(results[2], Err(SyncError::Client(_))));
    }

    #[test]
    fn child_sweep_is_scoped_to_parent() {
        let (client, log, _) = setup("page", vec![], None);
        let stream = StreamConfig::new("variants", "products/{parent_id}/variants.json")
            .incremental("updated_at")
            .child_of("products")
            .with_parent_param("product_id");
        let _ = WindowedPaginator::new(&client, &stream, 50)
            .sweep(Some(window()), Some("42"))
            .count();
        let log = log.lock().unwrap();
        assert_eq!(log[0].resource, "products/42/variants.json");
        assert_eq!(log[0].get("product_id"), Some("42"));
    }

    #[test]
    fn full_table_sweep_has_no_time_filter() {
        let (client, log, _) = setup("page", vec![], None);
        let stream = StreamConfig::new("shop", "shop.json").full_table();
        let _ = WindowedPaginator::new(&client, &stream, 50).sweep(None, None).count();
        let log = log.lock().unwrap();
        assert_eq!(log[0].get(params::UPDATED_MIN), None);
        assert_eq!(log[0].get(params::ORDER), None);
    }

    #[test]
    fn guard_rejects_id_below_token() {
        let stream = StreamConfig::new("orders", "orders");
        let request = PageRequest::new("orders");
        let mut guard = OrderingGuard::new();
        guard
            .check(&stream, &request, &Page::new(records(&[3, 8])))
            .unwrap();
        assert_eq!(guard.token(), Some(8));
        let err = guard
            .check(&stream, &request, &Page::new(records(&[7, 9])))
            .unwrap_err();
        assert_eq!(err.kind, ViolationKind::BelowToken { id: 7, token: 8 });
    }

    #[test]
    fn guard_accepts_equal_to_token_and_empty_pages() {
        let stream = StreamConfig::new("orders", "orders");
        let request = PageRequest::new("orders");
        let mut guard = OrderingGuard::new();
        guard
            .check(&stream, &request, &Page::new(records(&[4])))
            .unwrap();
        guard
            .check(&stream, &request, &Page::new(records(&[4, 6])))
            .unwrap();
        guard.check(&stream, &request, &Page::default()).unwrap();
        assert_eq!(guard.token(), Some(6));
    }

    #[test]
    fn guard_rejects_missing_id() {
        let stream = StreamConfig::new("orders", "orders");
        let mut guard = OrderingGuard::new();
        let err = guard
            .check(
                &stream,
                &PageRequest::new("orders"),
                &Page::new(vec![json!({"id": 1}), json!({"name": "x"})]),
            )
            .unwrap_err();
        assert_eq!(err.kind, ViolationKind::MissingId { index: 1 });
    }
}

//! Property-based tests for the capture engine

use super::entry::ConsoleLogEntry;
use super::event::{RequestEvent, ResponseEvent};
use super::*;
use proptest::prelude::*;
use serde_json::json;

// ============================================================================
// Generators
// ============================================================================

const URLS: [&str; 3] = ["https://a.test/", "https://a.test/api", "https://b.test/app.js"];
const TYPES: [&str; 4] = ["document", "script", "xhr", "image"];

fn arb_request() -> impl Strategy<Value = RequestEvent> {
    (0..URLS.len(), 0..TYPES.len(), "[0-9]{1,4}").prop_map(|(url, kind, id)| RequestEvent {
        request_id: id,
        url: URLS[url].to_string(),
        method: "GET".to_string(),
        headers: json!({}),
        resource_type: TYPES[kind].to_string(),
        post_data: None,
    })
}

fn arb_console_entry() -> impl Strategy<Value = ConsoleLogEntry> {
    (
        prop_oneof![Just("log"), Just("warn")],
        prop_oneof![Just("a"), Just("b"), Just("c")],
        0u32..1000,
    )
        .prop_map(|(kind, text, ts)| ConsoleLogEntry {
            kind: kind.to_string(),
            text: text.to_string(),
            location: None,
            timestamp: f64::from(ts),
            stack_trace: None,
            args: None,
            page: None,
            error: None,
        })
}

fn response_for(url: &str, status: i64) -> ResponseEvent {
    ResponseEvent {
        request_id: None,
        url: url.to_string(),
        status,
        status_text: String::new(),
        headers: json!({}),
        body: None,
    }
}

fn is_ascending(timestamps: &[f64]) -> bool {
    timestamps.windows(2).all(|w| w[0] <= w[1])
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn snapshot_is_bounded_ordered_subset(
        requests in prop::collection::vec((arb_request(), 0u32..10_000), 0..30),
        last_n in 0usize..40,
    ) {
        let config = CaptureConfig::default();
        let store = EventStore::shared();
        for (request, ts) in &requests {
            lock_store(&store).record_request(request, f64::from(*ts), &config);
        }

        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let records = runtime.block_on(snapshot_requests(&store, last_n));

        prop_assert!(records.len() <= last_n);
        prop_assert_eq!(records.len(), last_n.min(requests.len()));
        let timestamps: Vec<f64> = records.iter().map(RequestRecord::timestamp).collect();
        prop_assert!(is_ascending(&timestamps));
        for record in &records {
            prop_assert!(URLS.contains(&record.url()));
        }
    }

    #[test]
    fn disabled_capture_rejects_everything(request in arb_request()) {
        let config = CaptureConfig { enabled: false, ..CaptureConfig::default() };
        prop_assert!(!should_capture(&request, &config));
    }

    #[test]
    fn unmatched_responses_never_change_request_count(
        requests in prop::collection::vec(arb_request(), 0..10),
        stray in prop::collection::vec(0i64..600, 0..10),
    ) {
        let config = CaptureConfig::default();
        let mut store = EventStore::new();
        for request in &requests {
            store.record_request(request, 1.0, &config);
        }
        for status in stray {
            store.attach_response(&response_for("https://unmatched.test/", status), 2.0, &config);
        }
        prop_assert_eq!(store.requests().len(), requests.len());
        prop_assert!(store.requests().iter().all(|entry| entry.response.is_none()));
    }

    #[test]
    fn same_url_responses_pair_in_order(statuses in prop::collection::vec(100i64..600, 1..8)) {
        let config = CaptureConfig::default();
        let mut store = EventStore::new();
        for (i, _) in statuses.iter().enumerate() {
            let request = RequestEvent {
                request_id: i.to_string(),
                url: URLS[0].to_string(),
                method: "GET".to_string(),
                headers: json!({}),
                resource_type: "fetch".to_string(),
                post_data: None,
            };
            store.record_request(&request, 1.0, &config);
        }
        for status in &statuses {
            prop_assert!(store.attach_response(&response_for(URLS[0], *status), 2.0, &config));
        }
        prop_assert!(!store.attach_response(&response_for(URLS[0], 999), 3.0, &config));

        let attached: Vec<i64> = store
            .requests()
            .iter()
            .filter_map(|entry| entry.response.as_ref().map(|r| r.status))
            .collect();
        prop_assert_eq!(attached, statuses);
    }

    #[test]
    fn dedup_preserves_every_occurrence(
        entries in prop::collection::vec(arb_console_entry(), 0..40),
    ) {
        let groups = dedup(&entries, usize::MAX);

        prop_assert_eq!(groups.iter().map(|g| g.count).sum::<usize>(), entries.len());
        for group in &groups {
            prop_assert!(group.count >= 1);
            prop_assert_eq!(group.timestamps.len(), group.count);
            prop_assert_eq!(group.count > 1, group.text.contains("重复"));
        }
        for pair in groups.windows(2) {
            prop_assert!(pair[0].kind != pair[1].kind || pair[0].original_text() != pair[1].original_text());
        }
    }

    #[test]
    fn dedup_respects_last_n(
        entries in prop::collection::vec(arb_console_entry(), 0..40),
        last_n in 0usize..10,
    ) {
        let all = dedup(&entries, usize::MAX);
        let bounded = dedup(&entries, last_n);

        prop_assert_eq!(bounded.len(), last_n.min(all.len()));
        let timestamps: Vec<f64> = bounded.iter().map(|g| g.timestamp).collect();
        prop_assert!(is_ascending(&timestamps));
    }
}

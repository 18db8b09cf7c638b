#![no_main]

use std::sync::LazyLock;

use airtable_mcp::server::dispatch::{Dispatcher, Reply};
use libfuzzer_sys::fuzz_target;

static DISPATCHER: LazyLock<Option<Dispatcher>> = LazyLock::new(sentinel_fuzz::offline_dispatcher);

fuzz_target!(|data: &[u8]| {
    let Some(dispatcher) = DISPATCHER.as_ref() else {
        return;
    };
    let Ok(rt) = tokio::runtime::Builder::new_current_thread().enable_all().build() else {
        return;
    };
    let caller = sentinel_fuzz::full_caller();

    // Every body yields a reply: a parse failure or one response per envelope.
    match rt.block_on(dispatcher.dispatch_body(data, &caller)) {
        Ok(dispatched) => {
            if let Reply::Batch(replies) = &dispatched.reply {
                let envelopes = serde_json::from_slice::<serde_json::Value>(data)
                    .ok()
                    .and_then(|v| v.as_array().map(Vec::len));
                assert_eq!(envelopes, Some(replies.len()));
            }
            let _ = serde_json::to_vec(&dispatched.reply);
        }
        Err(failure) => assert_eq!(failure.0.error_code(), Some(-32700)),
    }
});

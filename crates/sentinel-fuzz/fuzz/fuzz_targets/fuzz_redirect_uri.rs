#![no_main]

use airtable_mcp::server::oauth::engine::is_valid_redirect_uri;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(uri) = std::str::from_utf8(data) else {
        return;
    };
    if is_valid_redirect_uri(uri) {
        // Accepted URIs are absolute.
        assert!(uri.contains(':'));
    }
});

#![no_main]

use airtable_mcp::server::oauth::pkce::{challenge_s256, verify_s256};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (&str, &str)| {
    let (verifier, candidate) = input;
    let challenge = challenge_s256(verifier);
    assert_eq!(challenge.len(), 43);
    assert!(verify_s256(verifier, &challenge));
    if candidate != challenge {
        assert!(!verify_s256(verifier, candidate));
    }
});

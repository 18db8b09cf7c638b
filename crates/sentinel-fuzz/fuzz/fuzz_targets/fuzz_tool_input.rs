#![no_main]

use libfuzzer_sys::fuzz_target;
use sentinel_fuzz::models::{
    CreateTableInput, DeleteRecordsInput, ListRecordsInput, SearchRecordsInput,
    UpdateRecordsInput, search_formula,
};

fuzz_target!(|data: &[u8]| {
    let Ok(json) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    let _ = serde_json::from_value::<ListRecordsInput>(json.clone());
    let _ = serde_json::from_value::<UpdateRecordsInput>(json.clone());
    let _ = serde_json::from_value::<DeleteRecordsInput>(json.clone());
    let _ = serde_json::from_value::<CreateTableInput>(json.clone());

    if let Ok(input) = serde_json::from_value::<SearchRecordsInput>(json) {
        let formula = search_formula(&input.search_term, &input.field_ids);
        assert!(formula.starts_with("SEARCH(\""));
    }
});

#![no_main]
use libfuzzer_sys::fuzz_target;
use popen_core::StreamIntent;

fuzz_target!(|data: &str| {
    if let Ok(intent) = data.parse::<StreamIntent>() {
        // Display must produce something that parses back to the same intent.
        let shown = intent.to_string();
        assert_eq!(shown.parse::<StreamIntent>().ok(), Some(intent), "{shown:?}");
    }
});

#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

/// A semi-structured plan so we get past the TOML layer more often than
/// with pure bytes.
#[derive(Arbitrary, Debug)]
struct PlanArb {
    argv: Vec<String>,
    cwd: Option<String>,
    close_fds: bool,
    bufsize: u16,
    stdout: String,
    raw_tail: Vec<u8>,
}

fuzz_target!(|input: PlanArb| {
    let mut text = format!(
        "argv = {:?}\nclose_fds = {}\nbufsize = {}\n",
        input.argv, input.close_fds, input.bufsize
    );
    if let Some(cwd) = &input.cwd {
        text.push_str(&format!("cwd = {cwd:?}\n"));
    }
    text.push_str(&format!("[streams]\nstdout = {:?}\n", input.stdout));

    let mut bytes = text.into_bytes();
    // Trailing garbage exercises the UTF-8 and TOML error paths.
    bytes.extend_from_slice(&input.raw_tail);

    // Expectation: never panic. Either Ok(_) or a clean Err(_).
    if let Ok(config) = popen::plan::parse_plan(&bytes) {
        let rendered = popen::plan::render_plan(&config).expect("parsed plan must render");
        let again = popen::plan::parse_plan(rendered.as_bytes()).expect("rendered plan must parse");
        assert_eq!(again, config);
    }
});

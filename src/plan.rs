use anyhow::{Context, Result, bail};
use popen_core::ProcessConfig;
use std::path::Path;

/// Parse a TOML launch plan into a [`ProcessConfig`].
pub fn parse_plan(bytes: &[u8]) -> Result<ProcessConfig> {
    // empty / whitespace-only guard (keeps a nice error)
    if bytes.is_empty() || bytes.iter().all(|b| b.is_ascii_whitespace()) {
        bail!("Plan is empty");
    }

    let s = std::str::from_utf8(bytes).context("Plan is not valid UTF-8")?;

    let config: ProcessConfig =
        toml::from_str(s).context("Plan TOML is invalid or does not match the expected schema")?;

    if config.executable.is_none() {
        match config.argv.first() {
            None => bail!("Plan: 'argv' must be non-empty when 'executable' is not set"),
            Some(first) if first.trim().is_empty() => bail!("Plan: 'argv[0]' must be non-blank"),
            Some(_) => {}
        }
    }
    config.validate().context("Plan does not describe a runnable process")?;

    Ok(config)
}

pub fn load_plan(path: &Path) -> Result<ProcessConfig> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    parse_plan(&bytes).with_context(|| format!("parsing {}", path.display()))
}

/// Render a config back to plan-file TOML.
pub fn render_plan(config: &ProcessConfig) -> Result<String> {
    toml::to_string(config).context("serializing plan")
}


#[cfg(test)]
mod prop {
    use super::*;
    use popen_core::StreamIntent;
    use proptest::prelude::*;
    use proptest::{collection::vec, string::string_regex};

    fn s_arg() -> impl Strategy<Value = String> {
        string_regex("[a-zA-Z0-9._/-]{1,12}").unwrap()
    }

    fn s_intent() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("inherit".to_string()),
            Just("pipe".to_string()),
            Just("null".to_string()),
            (0i32..64).prop_map(|fd| format!("fd:{fd}")),
            s_arg().prop_map(|p| format!("append:/tmp/{p}")),
            s_arg().prop_map(|p| format!("truncate:/tmp/{p}")),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

        #[test]
        fn generated_plans_parse(
            argv in vec(s_arg(), 1..6),
            close_fds in any::<bool>(),
            bufsize in 0usize..65536,
            out in s_intent(),
            err in s_intent(),
        ) {
            let text = format!(
                "argv = {argv:?}\nclose_fds = {close_fds}\nbufsize = {bufsize}\n\
                 [streams]\nstdout = {out:?}\nstderr = {err:?}\n"
            );
            let cfg = parse_plan(text.as_bytes()).unwrap();
            prop_assert_eq!(cfg.argv, argv);
            prop_assert_eq!(cfg.close_fds, close_fds);
            prop_assert_eq!(cfg.bufsize, bufsize);
            prop_assert_eq!(cfg.streams.stdout, out.parse::<StreamIntent>().unwrap());
            prop_assert_eq!(cfg.streams.stderr, err.parse::<StreamIntent>().unwrap());
        }

        #[test]
        fn arbitrary_bytes_never_panic(bytes in vec(any::<u8>(), 0..256)) {
            let _ = parse_plan(&bytes);
        }
    }
}

//! The exec image: every C string and pointer table the child needs,
//! built in the parent so the child never allocates.

use nix::libc::c_char;
use popen_core::{PopenError, ProcessConfig, Result};
use std::collections::BTreeMap;
use std::ffi::{CStr, CString, OsStr, OsString};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::ptr;

/// Search path used when the merged environment has no `PATH`.
pub const DEFAULT_PATH: &str = "/usr/bin:/bin";

pub(crate) struct ExecImage {
    program: CString,
    // Owners of the pointed-to bytes; the pointer tables below borrow them.
    _argv: Vec<CString>,
    _envp: Vec<CString>,
    argv_ptrs: Vec<*const c_char>,
    envp_ptrs: Vec<*const c_char>,
    cwd: Option<CString>,
}

impl ExecImage {
    pub(crate) fn prepare(config: &ProcessConfig) -> Result<Self> {
        config.validate()?;

        let env = merge_env(std::env::vars_os(), &config.env);
        let search = env
            .iter()
            .find(|(k, _)| k.as_bytes() == b"PATH")
            .map(|(_, v)| v.as_os_str());
        let program = resolve_program(config.program()?, search);

        let argv = config
            .effective_argv()?
            .into_iter()
            .map(|arg| cstring(arg.into_bytes(), "argument"))
            .collect::<Result<Vec<_>>>()?;
        let envp = env
            .into_iter()
            .map(|(k, v)| {
                let mut entry = k.into_vec();
                entry.push(b'=');
                entry.extend(v.into_vec());
                cstring(entry, "environment entry")
            })
            .collect::<Result<Vec<_>>>()?;
        let cwd = config
            .cwd
            .as_ref()
            .map(|dir| cstring(dir.as_os_str().as_bytes().to_vec(), "cwd"))
            .transpose()?;

        Ok(Self {
            program: cstring(program.into_os_string().into_vec(), "executable")?,
            argv_ptrs: null_terminated(&argv),
            envp_ptrs: null_terminated(&envp),
            _argv: argv,
            _envp: envp,
            cwd,
        })
    }

    pub(crate) fn program(&self) -> &CStr {
        &self.program
    }

    pub(crate) fn argv_ptr(&self) -> *const *const c_char {
        self.argv_ptrs.as_ptr()
    }

    pub(crate) fn envp_ptr(&self) -> *const *const c_char {
        self.envp_ptrs.as_ptr()
    }

    pub(crate) fn cwd(&self) -> Option<&CStr> {
        self.cwd.as_deref()
    }
}

fn cstring(bytes: Vec<u8>, what: &str) -> Result<CString> {
    CString::new(bytes)
        .map_err(|e| PopenError::InvalidConfig(format!("{what} contains a NUL byte: {e}")))
}

fn null_terminated(strings: &[CString]) -> Vec<*const c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(ptr::null()))
        .collect()
}

/// The child's environment: `inherited` with `overrides` laid over it.
/// A key present in both takes the override value; nothing else is dropped.
pub(crate) fn merge_env<I>(
    inherited: I,
    overrides: &BTreeMap<String, String>,
) -> Vec<(OsString, OsString)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut merged: Vec<(OsString, OsString)> = inherited
        .into_iter()
        .filter(|(k, _)| k.to_str().map_or(true, |k| !overrides.contains_key(k)))
        .collect();
    merged.extend(
        overrides
            .iter()
            .map(|(k, v)| (OsString::from(k), OsString::from(v))),
    );
    merged
}

/// Look a bare program name up in `search` (a `PATH` value). Names with a
/// slash are used as given; a name that is not found is passed through so
/// exec fails in the child with the usual error.
pub(crate) fn resolve_program(program: &Path, search: Option<&OsStr>) -> PathBuf {
    if program.as_os_str().as_bytes().contains(&b'/') {
        return program.to_path_buf();
    }
    let search = search.unwrap_or_else(|| OsStr::new(DEFAULT_PATH));
    for dir in search.as_bytes().split(|b| *b == b':') {
        let dir = if dir.is_empty() {
            Path::new(".")
        } else {
            Path::new(OsStr::from_bytes(dir))
        };
        let candidate = dir.join(program);
        if is_executable(&candidate) {
            return candidate;
        }
    }
    program.to_path_buf()
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use popen_core::StreamIntent;
    use std::fs;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(OsString, OsString)> {
        pairs
            .iter()
            .map(|(k, v)| (OsString::from(k), OsString::from(v)))
            .collect()
    }

    #[test]
    fn merge_env_overrides_only_matching_keys() {
        let mut overrides = BTreeMap::new();
        overrides.insert("HOME".to_string(), "/override".to_string());
        overrides.insert("FOO".to_string(), "bar".to_string());
        let mut merged = merge_env(vars(&[("HOME", "/root"), ("LANG", "C")]), &overrides);
        merged.sort();
        assert_eq!(
            merged,
            vars(&[("FOO", "bar"), ("HOME", "/override"), ("LANG", "C")])
        );
    }

    #[test]
    fn merge_env_without_overrides_is_identity() {
        let inherited = vars(&[("A", "1"), ("B", "2")]);
        assert_eq!(merge_env(inherited.clone(), &BTreeMap::new()), inherited);
    }

    #[test]
    fn resolve_keeps_paths_with_a_slash() {
        assert_eq!(
            resolve_program(Path::new("./run.sh"), Some(OsStr::new("/bin"))),
            PathBuf::from("./run.sh")
        );
    }

    #[test]
    fn resolve_searches_path_in_order() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        for dir in [a.path(), b.path()] {
            let tool = dir.join("tool");
            fs::write(&tool, "#!/bin/sh\n").unwrap();
            fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();
        }
        let search = format!("{}:{}", a.path().display(), b.path().display());
        assert_eq!(
            resolve_program(Path::new("tool"), Some(OsStr::new(&search))),
            a.path().join("tool")
        );
    }

    #[test]
    fn resolve_skips_non_executable_files() {
        let a = tempfile::tempdir().unwrap();
        fs::write(a.path().join("data"), "x").unwrap();
        let search = a.path().as_os_str();
        assert_eq!(
            resolve_program(Path::new("data"), Some(search)),
            PathBuf::from("data")
        );
    }

    #[test]
    fn prepare_null_terminates_tables() {
        let cfg = ProcessConfig::new(["/bin/echo", "hi"]).env("FOO", "bar");
        let image = ExecImage::prepare(&cfg).unwrap();
        assert_eq!(image.program().to_bytes(), b"/bin/echo");
        assert_eq!(image.argv_ptrs.len(), 3);
        assert!(image.argv_ptrs[2].is_null());
        assert!(image.envp_ptrs.last().unwrap().is_null());
        assert!(image
            ._envp
            .iter()
            .any(|e| e.as_bytes() == b"FOO=bar"));
    }

    #[test]
    fn prepare_rejects_nul_in_arguments() {
        let cfg = ProcessConfig::new(["/bin/echo", "a\0b"]).stdout(StreamIntent::Pipe);
        let err = ExecImage::prepare(&cfg).err().unwrap();
        assert!(matches!(err, PopenError::InvalidConfig(_)), "{err}");
    }
}

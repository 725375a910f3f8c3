use std::fmt;

/// Upper bound on what a failing child writes to the error channel.
pub const DIAGNOSTIC_CAP: usize = 1024;

/// Shown when the child wrote bytes that decode to nothing printable.
const FALLBACK_DIAGNOSTIC: &str = "child failed before exec without a diagnostic";

/// Fixed-capacity message buffer filled inside the forked child.
///
/// Lives on the stack and never allocates, so it is safe to format into
/// between fork and exec. Anything past [`DIAGNOSTIC_CAP`] is dropped,
/// always on a char boundary.
pub struct Diagnostic {
    buf: [u8; DIAGNOSTIC_CAP],
    len: usize,
    truncated: bool,
}

impl Diagnostic {
    pub const fn new() -> Self {
        Self {
            buf: [0; DIAGNOSTIC_CAP],
            len: 0,
            truncated: false,
        }
    }

    /// `"<step>: <description> (errno <n>)"`
    pub fn child_failure(step: &str, description: &str, errno: i32) -> Self {
        let mut d = Self::new();
        let _ = fmt::write(
            &mut d,
            format_args!("{step}: {description} (errno {errno})"),
        );
        d
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

impl Default for Diagnostic {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Write for Diagnostic {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.truncated {
            return Ok(());
        }
        let room = DIAGNOSTIC_CAP - self.len;
        let mut take = s.len().min(room);
        while !s.is_char_boundary(take) {
            take -= 1;
        }
        if take < s.len() {
            self.truncated = true;
        }
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        // Silent: once truncated, later writes are dropped too.
        Ok(())
    }
}

/// What the parent learned from draining the error channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecReport {
    /// End of stream with no data: close-on-exec fired, the image was replaced.
    Replaced,
    /// The child failed before exec and said why.
    Failed(String),
}

impl ExecReport {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self::Replaced;
        }
        let text = String::from_utf8_lossy(bytes);
        let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
        if text.is_empty() {
            Self::Failed(FALLBACK_DIAGNOSTIC.to_owned())
        } else {
            Self::Failed(text.to_owned())
        }
    }

    pub fn is_replaced(&self) -> bool {
        matches!(self, Self::Replaced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write;

    #[test]
    fn child_failure_formats_step_and_errno() {
        let d = Diagnostic::child_failure("execve failed", "No such file or directory", 2);
        assert_eq!(
            std::str::from_utf8(d.as_bytes()).unwrap(),
            "execve failed: No such file or directory (errno 2)"
        );
        assert!(!d.is_truncated());
    }

    #[test]
    fn long_messages_are_capped() {
        let mut d = Diagnostic::new();
        for _ in 0..200 {
            write!(d, "0123456789").unwrap();
        }
        assert_eq!(d.len(), DIAGNOSTIC_CAP);
        assert!(d.is_truncated());
    }

    #[test]
    fn truncation_never_splits_a_char() {
        let mut d = Diagnostic::new();
        d.write_str(&"a".repeat(DIAGNOSTIC_CAP - 1)).unwrap();
        d.write_str("é").unwrap();
        assert_eq!(d.len(), DIAGNOSTIC_CAP - 1);
        assert!(std::str::from_utf8(d.as_bytes()).is_ok());
    }

    #[test]
    fn empty_read_means_replaced() {
        assert_eq!(ExecReport::from_bytes(b""), ExecReport::Replaced);
        assert!(ExecReport::from_bytes(b"").is_replaced());
    }

    #[test]
    fn non_empty_read_means_failed() {
        assert_eq!(
            ExecReport::from_bytes(b"chdir failed: Permission denied (errno 13)\n"),
            ExecReport::Failed("chdir failed: Permission denied (errno 13)".into())
        );
    }

    #[test]
    fn blank_payload_still_reports_failure() {
        match ExecReport::from_bytes(b"\0\0 ") {
            ExecReport::Failed(msg) => assert!(!msg.is_empty()),
            ExecReport::Replaced => panic!("blank payload must not count as exec"),
        }
    }
}

#[cfg(test)]
mod prop {
    use super::*;
    use proptest::prelude::*;
    use std::fmt::Write;

    proptest! {
        #[test]
        fn diagnostic_is_bounded_valid_utf8_prefix(parts in proptest::collection::vec(".{0,300}", 0..12)) {
            let mut d = Diagnostic::new();
            let mut whole = String::new();
            for p in &parts {
                d.write_str(p).unwrap();
                whole.push_str(p);
            }
            prop_assert!(d.len() <= DIAGNOSTIC_CAP);
            let text = std::str::from_utf8(d.as_bytes()).unwrap();
            prop_assert!(whole.starts_with(text));
            prop_assert_eq!(d.is_truncated(), text.len() < whole.len());
        }

        #[test]
        fn any_non_empty_payload_is_a_failure(bytes in proptest::collection::vec(any::<u8>(), 1..DIAGNOSTIC_CAP)) {
            match ExecReport::from_bytes(&bytes) {
                ExecReport::Failed(msg) => prop_assert!(!msg.is_empty()),
                ExecReport::Replaced => prop_assert!(false, "non-empty payload read as success"),
            }
        }
    }
}

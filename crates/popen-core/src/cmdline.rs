/// Delimiters used when a command is given as a single string.
pub const DEFAULT_DELIMS: &str = " \t";

/// Split `line` on any character in `delims`. Runs of delimiters do not
/// produce empty arguments.
pub fn split(line: &str, delims: &str) -> Vec<String> {
    line.split(|c: char| delims.contains(c))
        .filter(|tok| !tok.is_empty())
        .map(str::to_owned)
        .collect()
}

pub fn join<S: AsRef<str>>(parts: &[S], sep: &str) -> String {
    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push_str(sep);
        }
        out.push_str(part.as_ref());
    }
    out
}


#[cfg(test)]
mod prop {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn split_tokens_are_never_empty_and_never_contain_delims(line in "[a-z \\t]{0,64}") {
            for tok in split(&line, DEFAULT_DELIMS) {
                prop_assert!(!tok.is_empty());
                prop_assert!(!tok.contains(' ') && !tok.contains('\t'));
            }
        }

        #[test]
        fn join_then_split_recovers_words(words in proptest::collection::vec("[a-z0-9]{1,8}", 0..8)) {
            let line = join(&words, " ");
            prop_assert_eq!(split(&line, DEFAULT_DELIMS), words);
        }
    }
}

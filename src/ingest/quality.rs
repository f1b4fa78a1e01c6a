//! Admission quality gate.
//!
//! Decides whether a raw candidate snippet is admissible to the corpus.
//! Checks run in a fixed order and short-circuit on the first failure, so
//! every rejection carries exactly one reason.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::config::GateConfig;

/// Markers that suggest the snippet was never finished: a bare ellipsis
/// token, or TODO followed by FIXME on the same line.
static INCOMPLETE_MARKERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"\.\.\.").unwrap(),
        Regex::new(r"(?i)TODO.*FIXME").unwrap(),
    ]
});

/// Why a candidate snippet was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("snippet is empty or whitespace-only")]
    Empty,
    #[error("snippet has fewer non-empty lines than the minimum")]
    TooShort,
    #[error("snippet exceeds the maximum line count")]
    TooLong,
    #[error("comment lines exceed the allowed ratio")]
    TooManyComments,
    #[error("unbalanced brackets outside string literals")]
    UnbalancedBrackets,
    #[error("snippet contains incompleteness markers")]
    IncompleteMarker,
}

/// Configurable admission gate. Stateless apart from its bounds.
#[derive(Debug, Clone)]
pub struct QualityGate {
    min_lines: usize,
    max_lines: usize,
    max_comment_ratio: f32,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(&GateConfig::default())
    }
}

impl QualityGate {
    pub fn new(config: &GateConfig) -> Self {
        Self {
            min_lines: config.min_lines,
            max_lines: config.max_lines,
            max_comment_ratio: config.max_comment_ratio,
        }
    }

    /// Validate a raw candidate. On success returns the text trimmed of
    /// leading/trailing whitespace, otherwise unchanged; the gate never
    /// rewrites code content.
    pub fn admit(&self, raw: &str) -> Result<String, RejectReason> {
        if raw.trim().is_empty() {
            return Err(RejectReason::Empty);
        }

        let code = raw.trim();
        let lines: Vec<&str> = code.split('\n').collect();
        let non_empty = lines.iter().filter(|l| !l.trim().is_empty()).count();

        if non_empty < self.min_lines {
            return Err(RejectReason::TooShort);
        }
        if lines.len() > self.max_lines {
            return Err(RejectReason::TooLong);
        }

        let comment_count = lines.iter().filter(|l| is_comment_line(l)).count();
        let comment_ratio = comment_count as f32 / lines.len() as f32;
        if comment_ratio > self.max_comment_ratio {
            return Err(RejectReason::TooManyComments);
        }

        if !brackets_balanced(code) {
            return Err(RejectReason::UnbalancedBrackets);
        }

        if INCOMPLETE_MARKERS.iter().any(|re| re.is_match(code)) {
            return Err(RejectReason::IncompleteMarker);
        }

        Ok(code.to_string())
    }
}

/// Single-line `#` / `//` comments and block-comment delimiter lines.
fn is_comment_line(line: &str) -> bool {
    let stripped = line.trim();
    stripped.starts_with('#')
        || stripped.starts_with("//")
        || stripped.starts_with("/*")
        || stripped.ends_with("*/")
}

/// Left-to-right bracket scan with a string-literal toggle, so bracket
/// characters inside `'...'` or `"..."` are ignored. Returns false on a
/// mismatched closer or leftover open delimiters.
fn brackets_balanced(code: &str) -> bool {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut string_char = '\0';

    for ch in code.chars() {
        if ch == '"' || ch == '\'' {
            if !in_string {
                in_string = true;
                string_char = ch;
            } else if ch == string_char {
                in_string = false;
            }
            continue;
        }

        if in_string {
            continue;
        }

        match ch {
            '(' | '[' | '{' => stack.push(ch),
            ')' | ']' | '}' => {
                let expected = match stack.pop() {
                    Some('(') => ')',
                    Some('[') => ']',
                    Some('{') => '}',
                    _ => return false,
                };
                if ch != expected {
                    return false;
                }
            }
            _ => {}
        }
    }

    stack.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> QualityGate {
        QualityGate::default()
    }

    /// A well-formed snippet comfortably above the minimum line count.
    fn good_code() -> String {
        (0..8)
            .map(|i| format!("let x{i} = compute({i});"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_empty_input_rejected() {
        assert_eq!(gate().admit(""), Err(RejectReason::Empty));
        assert_eq!(gate().admit("   \n\t  "), Err(RejectReason::Empty));
    }

    #[test]
    fn test_short_snippet_rejected() {
        assert_eq!(
            gate().admit("let a = 1;\nlet b = 2;"),
            Err(RejectReason::TooShort)
        );
    }

    #[test]
    fn test_blank_lines_do_not_count_toward_minimum() {
        let padded = "let a = 1;\n\n\n\nlet b = 2;\n\n\n";
        assert_eq!(gate().admit(padded), Err(RejectReason::TooShort));
    }

    #[test]
    fn test_long_snippet_rejected() {
        let long: String = (0..250).map(|i| format!("line {i}\n")).collect();
        assert_eq!(gate().admit(&long), Err(RejectReason::TooLong));
    }

    #[test]
    fn test_comment_heavy_snippet_rejected() {
        let code = "// a\n// b\n// c\n// d\n// e\n// f\nlet x = 1;\nlet y = 2;";
        assert_eq!(gate().admit(code), Err(RejectReason::TooManyComments));
    }

    #[test]
    fn test_hash_comments_counted() {
        let code = "# a\n# b\n# c\n# d\n# e\n# f\nx = 1\ny = 2";
        assert_eq!(gate().admit(code), Err(RejectReason::TooManyComments));
    }

    #[test]
    fn test_unmatched_closing_bracket_rejected() {
        let code = format!("{}\nreturn results);", good_code());
        assert_eq!(gate().admit(&code), Err(RejectReason::UnbalancedBrackets));
    }

    #[test]
    fn test_unclosed_open_bracket_rejected() {
        let code = format!("fn broken() {{\n{}", good_code());
        assert_eq!(gate().admit(&code), Err(RejectReason::UnbalancedBrackets));
    }

    #[test]
    fn test_mismatched_bracket_pair_rejected() {
        let code = format!("{}\nlet v = [1, 2, 3);", good_code());
        assert_eq!(gate().admit(&code), Err(RejectReason::UnbalancedBrackets));
    }

    #[test]
    fn test_bracket_inside_string_literal_ignored() {
        let code = format!("{}\nlet s = \"closing ) here\";", good_code());
        assert!(gate().admit(&code).is_ok());
    }

    #[test]
    fn test_bracket_inside_single_quoted_string_ignored() {
        let code = format!("{}\nlet s = 'unmatched ] inside';", good_code());
        assert!(gate().admit(&code).is_ok());
    }

    #[test]
    fn test_ellipsis_marker_rejected() {
        let code = format!("{}\nhandle_rest(...);", good_code());
        assert_eq!(gate().admit(&code), Err(RejectReason::IncompleteMarker));
    }

    #[test]
    fn test_todo_fixme_marker_rejected() {
        let code = format!("{}\n// TODO this is broken, FIXME", good_code());
        assert_eq!(gate().admit(&code), Err(RejectReason::IncompleteMarker));
    }

    #[test]
    fn test_lone_todo_is_fine() {
        let code = format!("{}\n// TODO tighten bounds", good_code());
        assert!(gate().admit(&code).is_ok());
    }

    #[test]
    fn test_admitted_code_is_trimmed_but_unmodified() {
        let body = good_code();
        let raw = format!("\n\n{body}\n\n");
        let admitted = gate().admit(&raw).unwrap();
        assert_eq!(admitted, body);
    }

    #[test]
    fn test_rejection_order_empty_before_short() {
        // Whitespace-only fails as Empty, not TooShort.
        assert_eq!(gate().admit("\n\n\n"), Err(RejectReason::Empty));
    }

    #[test]
    fn test_custom_bounds_respected() {
        let gate = QualityGate::new(&GateConfig {
            min_lines: 1,
            max_lines: 2,
            max_comment_ratio: 0.5,
        });
        assert!(gate.admit("let a = 1;").is_ok());
        assert_eq!(
            gate.admit("a\nb\nc"),
            Err(RejectReason::TooLong)
        );
    }
}

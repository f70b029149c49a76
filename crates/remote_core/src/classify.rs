//! Lexical calling-convention detection.
//!
//! Recognized shapes, checked in order:
//!
//! - `fnWebSocket(` anywhere: [`Mode::Websocket`].
//! - `fnRaw(` anywhere: `Function { manual, manual }`.
//! - input is `manual` when the first `fn(` call has zero arguments or a single
//!   argument (no schema); `devalue` when a `// @monoserve devalue` or
//!   `// @monoserve devalue:input` comment is present; otherwise `json`.
//! - output is `manual` when a `new Response(` or `Response.json(` style
//!   expression appears that is not directly thrown; `devalue` when a
//!   `// @monoserve devalue` or `// @monoserve devalue:output` comment is
//!   present; otherwise `json`.
//!
//! Markers inside unrelated string literals are not told apart from real ones.

use std::sync::LazyLock;

use regex::Regex;

use crate::mode::{Codec, Mode};

static WEBSOCKET_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bfnWebSocket\s*\(").expect("valid websocket regex"));
static RAW_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bfnRaw\s*\(").expect("valid raw regex"));
static FN_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^.\w$])fn\s*\(").expect("valid fn regex"));
static DEVALUE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?://|/\*)\s*@monoserve\s+devalue(?::(input|output))?\b")
        .expect("valid marker regex")
});
static RESPONSE_CTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bnew\s+Response\s*\(|\bResponse\s*\.\s*(?:json|redirect|error)\s*\(")
        .expect("valid response regex")
});

/// Decides a module's [`Mode`] from its source text.
pub trait Classifier: Send + Sync {
    fn classify(&self, source: &str) -> Mode;
}

/// The default token-pattern classifier.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalClassifier;

impl Classifier for LexicalClassifier {
    fn classify(&self, source: &str) -> Mode {
        if WEBSOCKET_ENTRY.is_match(source) {
            return Mode::Websocket;
        }
        if RAW_ENTRY.is_match(source) {
            return Mode::function(Codec::Manual, Codec::Manual);
        }
        Mode::function(input_codec(source), output_codec(source))
    }
}

pub fn classify(source: &str) -> Mode {
    LexicalClassifier.classify(source)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Input,
    Output,
}

fn input_codec(source: &str) -> Codec {
    if registration_arg_count(source).is_some_and(|count| count <= 1) {
        return Codec::Manual;
    }
    if has_devalue_marker(source, Side::Input) {
        return Codec::Devalue;
    }
    Codec::Json
}

fn output_codec(source: &str) -> Codec {
    if constructs_response(source) {
        return Codec::Manual;
    }
    if has_devalue_marker(source, Side::Output) {
        return Codec::Devalue;
    }
    Codec::Json
}

fn has_devalue_marker(source: &str, side: Side) -> bool {
    DEVALUE_MARKER
        .captures_iter(source)
        .any(|caps| match caps.get(1).map(|m| m.as_str()) {
            None => true,
            Some("input") => side == Side::Input,
            Some(_) => side == Side::Output,
        })
}

fn constructs_response(source: &str) -> bool {
    RESPONSE_CTOR
        .find_iter(source)
        .any(|found| !preceded_by_throw(&source[..found.start()]))
}

fn preceded_by_throw(before: &str) -> bool {
    let trimmed = before.trim_end();
    match trimmed.strip_suffix("throw") {
        Some(rest) => !rest
            .chars()
            .next_back()
            .is_some_and(|ch| ch.is_alphanumeric() || ch == '_' || ch == '$'),
        None => false,
    }
}

/// Number of top-level arguments in the first `fn(...)` call, if any.
fn registration_arg_count(source: &str) -> Option<usize> {
    let found = FN_CALL.find(source)?;
    count_arguments(&source[found.end()..])
}

/// Counts comma-separated arguments up to the closing parenthesis, skipping
/// nested brackets, string literals and comments. `None` if unbalanced.
fn count_arguments(rest: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut args = 0usize;
    let mut segment_has_token = false;
    let mut chars = rest.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' | '\'' | '`' => {
                skip_string(&mut chars, ch);
                segment_has_token = true;
            }
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            '(' | '[' | '{' => {
                depth += 1;
                segment_has_token = true;
            }
            ')' | ']' | '}' => {
                if depth == 0 {
                    if ch != ')' {
                        return None;
                    }
                    if segment_has_token {
                        args += 1;
                    }
                    return Some(args);
                }
                depth -= 1;
            }
            ',' if depth == 0 => {
                if segment_has_token {
                    args += 1;
                }
                segment_has_token = false;
            }
            ch if ch.is_whitespace() => {}
            _ => segment_has_token = true,
        }
    }
    None
}

fn skip_string(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, quote: char) {
    let mut escaped = false;
    for ch in chars.by_ref() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == quote {
            break;
        }
    }
}

// Recovers tool calls from free-form model text. Three notations, in order of
// precedence: delimited `<|tool_call|>name(args)<|tool_call|>`, marker-suffixed
// `name(args)<|tool_call|>`, and bare `name(args)` at a line or sentence end
// (allow-listed names only). Identical call text is emitted once, in text order.
use std::collections::HashSet;
use std::fmt;
use std::ops::Range;

use regex::Regex;

use crate::errors::{DeskPilotError, DeskPilotResult};

pub const DEFAULT_MARKER: &str = "<|tool_call|>";

/// Tools that may be written without any marker.
pub const BARE_CALL_NAMES: &[&str] = &[
    "mouse_click",
    "type_text",
    "scroll_window",
    "close_window",
    "clear_input",
    "wait",
    "press_hotkey",
    "pause_task",
    "complete_task",
];

const CALL_PATTERN: &str =
    r#"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(((?:"(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|[^()"'])*)\)"#;
const INNER_PATTERN: &str = r"(?s)^\s*([A-Za-z_][A-Za-z0-9_]*)\s*\((.*)\)\s*$";
const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?', '。', '！', '？'];

#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl ArgValue {
    /// Numeric view; numeric-looking strings are coerced.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Str(s) => s.trim().parse().ok(),
            Self::Bool(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(i) => Some(*i != 0),
            Self::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" => Some(true),
                "false" | "no" => Some(false),
                _ => None,
            },
            Self::Float(_) => None,
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Arguments in the order they were written. A repeated key keeps its first
/// position and takes the later value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs(Vec<(String, ArgValue)>);

impl ToolArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: ArgValue) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(ArgValue::as_f64)
    }

    pub fn i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(ArgValue::as_i64)
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(ArgValue::as_bool)
    }

    /// String view of any value; numbers are formatted.
    pub fn string(&self, key: &str) -> Option<String> {
        self.get(key).map(ToString::to_string)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>> FromIterator<(K, ArgValue)> for ToolArgs {
    fn from_iter<T: IntoIterator<Item = (K, ArgValue)>>(iter: T) -> Self {
        let mut args = Self::new();
        for (k, v) in iter {
            args.insert(k, v);
        }
        args
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: ToolArgs,
}

impl fmt::Display for ToolCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, (k, v)) in self.arguments.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match v {
                ArgValue::Str(s) => write!(f, "{k}={s:?}")?,
                other => write!(f, "{k}={other}")?,
            }
        }
        f.write_str(")")
    }
}

pub struct ToolCallParser {
    marker: String,
    delimited: Regex,
    inner: Regex,
    call: Regex,
}

impl ToolCallParser {
    pub fn new(marker: &str) -> DeskPilotResult<Self> {
        if marker.is_empty() {
            return Err(DeskPilotError::Config("tool call marker must not be empty".into()));
        }
        let m = regex::escape(marker);
        let compile = |p: &str| Regex::new(p).map_err(|e| DeskPilotError::Config(format!("bad parser pattern: {e}")));
        Ok(Self {
            marker: marker.to_string(),
            delimited: compile(&format!("(?s){m}(.*?){m}"))?,
            inner: compile(INNER_PATTERN)?,
            call: compile(CALL_PATTERN)?,
        })
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn parse(&self, text: &str) -> Vec<ToolCall> {
        let mut claimed: HashSet<Range<usize>> = HashSet::new();
        let mut found: Vec<(usize, &str, ToolCall)> = Vec::new();
        let (mut delimited, mut suffixed, mut bare) = (0usize, 0usize, 0usize);

        for caps in self.delimited.captures_iter(text) {
            let Some(body) = caps.get(1) else { continue };
            let Some(inner) = self.inner.captures(body.as_str()) else {
                if !body.as_str().trim().is_empty() {
                    tracing::debug!(span = %body.as_str().trim(), "delimited text is not a call");
                }
                continue;
            };
            let (Some(name), Some(args)) = (inner.get(1), inner.get(2)) else {
                continue;
            };
            let span = body.start() + name.start()..body.start() + args.end() + 1;
            if !claimed.insert(span.clone()) {
                continue;
            }
            if let Some(call) = build_call(name.as_str(), args.as_str()) {
                delimited += 1;
                found.push((span.start, text[span].trim(), call));
            }
        }

        for caps in self.call.captures_iter(text) {
            let (Some(whole), Some(name), Some(args)) = (caps.get(0), caps.get(1), caps.get(2)) else {
                continue;
            };
            let span = whole.range();
            if claimed.contains(&span) {
                continue;
            }
            let rest = &text[span.end..];
            let is_suffixed = rest.trim_start().starts_with(self.marker.as_str());
            let is_bare = !is_suffixed && BARE_CALL_NAMES.contains(&name.as_str()) && ends_sentence(rest);
            if !is_suffixed && !is_bare {
                continue;
            }
            claimed.insert(span.clone());
            if let Some(call) = build_call(name.as_str(), args.as_str()) {
                if is_suffixed {
                    suffixed += 1;
                } else {
                    bare += 1;
                }
                found.push((span.start, whole.as_str().trim(), call));
            }
        }

        // Identical call text runs once, at its first position.
        found.sort_by_key(|(start, _, _)| *start);
        let mut seen: HashSet<&str> = HashSet::new();
        let before = found.len();
        found.retain(|(_, raw, _)| seen.insert(*raw));
        tracing::debug!(
            delimited,
            suffixed,
            bare,
            duplicates = before - found.len(),
            total = found.len(),
            "tool calls parsed"
        );
        found.into_iter().map(|(_, _, call)| call).collect()
    }
}

/// True when `rest` (text right after a call) begins with end of input, a
/// line break or a sentence terminator, ignoring spaces and tabs.
fn ends_sentence(rest: &str) -> bool {
    let rest = rest.trim_start_matches([' ', '\t']);
    match rest.chars().next() {
        None => true,
        Some('\n' | '\r') => true,
        Some(c) => SENTENCE_TERMINATORS.contains(&c),
    }
}

fn build_call(name: &str, args: &str) -> Option<ToolCall> {
    match parse_arguments(args) {
        Ok(arguments) => Some(ToolCall {
            name: name.to_string(),
            arguments,
        }),
        Err(reason) => {
            tracing::warn!(tool = %name, args = %args, %reason, "skipping malformed tool call");
            None
        }
    }
}

/// Parses `key=value, key="value", …`.
pub fn parse_arguments(args: &str) -> Result<ToolArgs, String> {
    let mut out = ToolArgs::new();
    for piece in split_top_level(args)? {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        let (key, value) = piece
            .split_once('=')
            .ok_or_else(|| format!("argument without a name: {piece}"))?;
        let key = key.trim();
        if !is_identifier(key) {
            return Err(format!("invalid argument name: {key:?}"));
        }
        out.insert(key, parse_value(value.trim())?);
    }
    Ok(out)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Splits on commas that are not inside quotes.
fn split_top_level(args: &str) -> Result<Vec<&str>, String> {
    let mut pieces = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in args.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            ',' => {
                pieces.push(&args[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if quote.is_some() {
        return Err("unterminated string".into());
    }
    pieces.push(&args[start..]);
    Ok(pieces)
}

fn parse_value(raw: &str) -> Result<ArgValue, String> {
    if raw.is_empty() {
        return Err("missing value".into());
    }
    for q in ['"', '\''] {
        if raw.starts_with(q) {
            if raw.len() < 2 || !raw.ends_with(q) {
                return Err(format!("unbalanced quotes in {raw}"));
            }
            return Ok(ArgValue::Str(unescape(&raw[1..raw.len() - 1])));
        }
    }
    if is_float_literal(raw) {
        if let Ok(v) = raw.parse::<f64>() {
            return Ok(ArgValue::Float(v));
        }
    }
    if is_int_literal(raw) {
        if let Ok(v) = raw.parse::<i64>() {
            return Ok(ArgValue::Int(v));
        }
    }
    match raw {
        "true" | "True" => Ok(ArgValue::Bool(true)),
        "false" | "False" => Ok(ArgValue::Bool(false)),
        other if other.chars().any(|c| c.is_whitespace() || "()\"'".contains(c)) => {
            Err(format!("unquoted value is not a single token: {other}"))
        }
        other => Ok(ArgValue::Str(other.to_string())),
    }
}

fn is_int_literal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn is_float_literal(s: &str) -> bool {
    let body = s.strip_prefix('-').unwrap_or(s);
    match body.split_once('.') {
        Some((int, frac)) => {
            !int.is_empty()
                && !frac.is_empty()
                && int.chars().all(|c| c.is_ascii_digit())
                && frac.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

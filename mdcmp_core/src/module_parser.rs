//! Splits decoded program-module text into a global-variable block, a
//! global-context block, and named procedure/function units. The module
//! language uses Cyrillic keywords and CRLF line structure; parsing is a
//! line-oriented scan, not a grammar.

use std::collections::BTreeMap;
use tracing::debug;

const HEADER_SEPARATORS: [&str; 2] = ["\r\nПроцед", "\r\nФунк"];
const FUNCTION_PREFIX: &str = "ция ";
const PROCEDURE_PREFIX: &str = "ура ";
const FUNCTION_KEYWORD: &str = "Функция";
const PROCEDURE_KEYWORD: &str = "Процедура";
const FUNCTION_END: &str = "КонецФункции";
const PROCEDURE_END: &str = "КонецПроцедуры";
const VAR_KEYWORD: &str = "перем ";
const EXPORT_KEYWORD: &str = "экспорт";
const FORWARD_KEYWORD: &str = "далее";
const FORWARD_TERMINATOR: &str = "Далее";
const BY_VALUE_MARKER: &str = "Знач ";

/// Minimum header length: a unit segment must carry at least the keyword
/// remainder ("ция " / "ура ").
const MIN_SEGMENT_CHARS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Procedure,
    Function,
}

impl UnitKind {
    fn keyword(self) -> &'static str {
        match self {
            UnitKind::Procedure => PROCEDURE_KEYWORD,
            UnitKind::Function => FUNCTION_KEYWORD,
        }
    }

    fn terminator(self) -> &'static str {
        match self {
            UnitKind::Procedure => PROCEDURE_END,
            UnitKind::Function => FUNCTION_END,
        }
    }
}

/// A single procedure or function.
#[derive(Debug, Clone)]
pub struct Unit {
    pub kind: UnitKind,
    /// Signature key: keyword plus bare name, unique within a module.
    pub name: String,
    pub parameters: Vec<String>,
    /// Text before the declaration line, carried over from the previous
    /// unit's tail.
    pub pre_comment: String,
    /// Declaration line through the terminator keyword, inclusive.
    pub body: String,
    pub public: bool,
    pub forward_declared: bool,
    /// Remainder after the terminator; becomes the next parse's carry text.
    pub tail: String,
}

impl Unit {
    fn new(kind: UnitKind, name: String) -> Self {
        Self {
            kind,
            name,
            parameters: Vec::new(),
            pre_comment: String::new(),
            body: String::new(),
            public: false,
            forward_declared: false,
            tail: String::new(),
        }
    }

    /// Parses a unit's source text into this record. Called once for a plain
    /// unit; called a second time with the real body for a unit first seen as
    /// a forward declaration, in which case the signature captured by the
    /// first call is kept.
    fn parse_text(&mut self, source: &str) {
        self.tail = String::new();

        if !self.forward_declared {
            let mut window = String::new();
            for line in source.split("\r\n").filter(|l| !l.is_empty()) {
                if line.chars().count() < 2 {
                    continue;
                }
                if line.starts_with("//") {
                    continue;
                }
                if line.contains('(') || window.contains('(') {
                    if !line.contains(')') {
                        window.push_str(&line.replace('\t', ""));
                        continue;
                    }
                    window.push_str(&line.replace('\t', ""));

                    if let (Some(open), Some(close)) = (window.find('('), window.find(')')) {
                        if close > open {
                            for parameter in window[open + 1..close].split(',') {
                                if parameter.is_empty() {
                                    continue;
                                }
                                let parameter = parameter.replace(BY_VALUE_MARKER, "");
                                let parameter = parameter
                                    .split('=')
                                    .next()
                                    .unwrap_or("")
                                    .trim_matches(' ');
                                self.parameters.push(parameter.to_string());
                            }
                        }
                    }

                    let lowered = window.to_lowercase();
                    self.public = lowered.contains(EXPORT_KEYWORD);
                    self.forward_declared = lowered.contains(FORWARD_KEYWORD);

                    if self.forward_declared {
                        // signature only; the real body arrives in a later
                        // parse of the same unit name
                        let mut stripped = String::new();
                        for l in source.split("\r\n").filter(|l| !l.is_empty()) {
                            if l.chars().count() > 2 && !l.starts_with("//") {
                                stripped.push_str(l);
                                stripped.push_str("\r\n");
                            }
                        }
                        if let Some(idx) = stripped.find(FORWARD_TERMINATOR) {
                            self.tail = stripped[idx + FORWARD_TERMINATOR.len()..].to_string();
                        }
                        return;
                    }
                    break;
                }
            }
        }

        let keyword = self.kind.keyword();
        let terminator = self.kind.terminator();
        let end_needle = format!("\r\n{}", terminator);

        if let Some(end_idx) = find_ci(source, &end_needle) {
            let decl = find_ci(source, &format!("\r\n{}", keyword))
                .map(|i| i + 2)
                .unwrap_or(0);
            self.pre_comment = source[..decl].to_string();
            self.body = source[decl..end_idx + 2 + terminator.len()].to_string();

            let tail_start = find_ci(source, terminator)
                .map(|i| i + terminator.len())
                .unwrap_or(source.len());
            let mut tail = source[tail_start..].to_string();

            // fixed comment markers re-anchor the tail so the marker line
            // survives into the next unit's pre-comment
            if let Some(i) = tail.find("\r\n//+") {
                tail = tail[i + 2..].to_string();
            } else if let Some(i) = tail.find("\r\n//*") {
                tail = tail[i + 2..].to_string();
            } else if let Some(i) = tail.find("\r\n///") {
                tail = tail[i + 2..].to_string();
                if let Some(j) = tail.find("\r\n") {
                    tail = tail[j + 2..].to_string();
                }
            }
            self.tail = tail;
        }
    }
}

/// A parsed program module.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub text: String,
    pub global_vars: Option<String>,
    pub global_context: Option<String>,
    pub units: BTreeMap<String, Unit>,
}

/// Splits module text into global blocks and units.
pub fn parse_module(text: &str) -> Module {
    let mut module = Module {
        text: text.to_string(),
        ..Default::default()
    };

    // carry threads each unit's tail into the next unit's pre-comment;
    // None means the carry drained into the global-variable block
    let mut carry: Option<String> = Some(String::new());

    for segment in split_any(text, &HEADER_SEPARATORS) {
        if segment.chars().count() < MIN_SEGMENT_CHARS {
            continue;
        }

        let kind = if segment.starts_with(FUNCTION_PREFIX) {
            UnitKind::Function
        } else if segment.starts_with(PROCEDURE_PREFIX) {
            UnitKind::Procedure
        } else {
            if segment.to_lowercase().contains(VAR_KEYWORD) {
                for line in segment.split("\r\n").filter(|l| !l.is_empty()) {
                    if !line.starts_with('/') {
                        append_line(&mut module.global_vars, line);
                    }
                }
                carry = None;
            }
            continue;
        };

        // both prefixes are four characters / seven bytes
        let rest = &segment[FUNCTION_PREFIX.len()..];
        let Some(paren) = rest.find('(') else {
            debug!("skipping unit segment without parameter list");
            continue;
        };
        let name = format!("{} {}", kind.keyword(), rest[..paren].trim());
        let unit_text = format!(
            "{}\r\n{} {}",
            carry.as_deref().unwrap_or(""),
            kind.keyword(),
            rest
        );

        let tail = if let Some(unit) = module.units.get_mut(&name) {
            unit.parse_text(&unit_text);
            unit.tail.clone()
        } else {
            let mut unit = Unit::new(kind, name.clone());
            unit.parse_text(&unit_text);
            let tail = unit.tail.clone();
            module.units.insert(name, unit);
            tail
        };

        if tail.to_lowercase().contains(VAR_KEYWORD) {
            module
                .global_vars
                .get_or_insert_with(String::new)
                .push_str(&tail);
            carry = None;
        } else {
            carry = Some(tail);
        }
    }

    if let Some(trailing) = carry {
        for line in trailing.split("\r\n").filter(|l| !l.is_empty()) {
            if !line.starts_with('/') {
                append_line(&mut module.global_context, line);
            }
        }
    }

    module
}

fn append_line(slot: &mut Option<String>, line: &str) {
    let target = slot.get_or_insert_with(String::new);
    target.push_str(line);
    target.push_str("\r\n");
}

/// Splits on any of the given separators, dropping empty segments.
fn split_any<'a>(text: &'a str, separators: &[&str]) -> Vec<&'a str> {
    let mut segments = Vec::new();
    let mut rest = text;
    loop {
        let next = separators
            .iter()
            .filter_map(|sep| rest.find(sep).map(|i| (i, sep.len())))
            .min();
        match next {
            Some((idx, len)) => {
                if idx > 0 {
                    segments.push(&rest[..idx]);
                }
                rest = &rest[idx + len..];
            }
            None => {
                if !rest.is_empty() {
                    segments.push(rest);
                }
                break;
            }
        }
    }
    segments
}

/// Case-insensitive find. Case folding is length-preserving for the ASCII
/// and Cyrillic ranges this language uses, so the returned byte offset is
/// valid in the original string.
fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_lowercase().find(&needle.to_lowercase())
}

//! Case conversion and tense guessing for event names.
//!
//! Tense rules are ordered (suffix pattern, replacement) pairs. The first
//! pattern matching the end of the name (case-insensitively) wins and the
//! result is camel-cased; when nothing matches a fixed fallback is used.

use std::sync::LazyLock;

use regex::Regex;

pub const PROGRESSIVE_FALLBACK: &str = "executing";
pub const PAST_FALLBACK: &str = "executed";

const PROGRESSIVE_RULES: &[(&str, &str)] = &[
    ("ate", "ating"),
    ("ish", "ishing"),
    ("it", "itting"),
    ("ive", "iving"),
    ("mpt", "mpting"),
    ("n", "nning"),
    ("ost", "osting"),
    ("([aeiou])d", "${1}ding"),
    ("([aeiou][^aeiou])e", "${1}ing"),
    ("(n|dr)d", "${1}ding"),
    ("e(ct|pt|r|d|l)", "e${1}ing"),
];

const PAST_RULES: &[(&str, &str)] = &[
    ("ind", "ound"),
    ("ish", "ished"),
    ("it", "itted"),
    ("mpt", "mpted"),
    ("n", "nned"),
    ("ost", "osted"),
    ("([^aeiou])e", "${1}ed"),
    ("([aeiou])d", "${1}ded"),
    ("(n|d|r)d", "${1}ded"),
    ("e(ct|pt|r|d|l)", "e${1}ed"),
];

struct TenseTable {
    rules: Vec<(Regex, &'static str)>,
    fallback: &'static str,
}

impl TenseTable {
    fn compile(rules: &[(&'static str, &'static str)], fallback: &'static str) -> Self {
        let rules = rules
            .iter()
            .map(|(pattern, replacement)| {
                let re = Regex::new(&format!("(?i){pattern}$")).expect("static tense pattern");
                (re, *replacement)
            })
            .collect();
        Self { rules, fallback }
    }

    fn apply(&self, name: &str) -> String {
        for (re, replacement) in &self.rules {
            if re.is_match(name) {
                return camel(&re.replace(name, *replacement));
            }
        }
        self.fallback.to_string()
    }
}

static PROGRESSIVE: LazyLock<TenseTable> =
    LazyLock::new(|| TenseTable::compile(PROGRESSIVE_RULES, PROGRESSIVE_FALLBACK));

static PAST: LazyLock<TenseTable> = LazyLock::new(|| TenseTable::compile(PAST_RULES, PAST_FALLBACK));

/// `"Create"` → `"creating"`, `"Find"` → `"finding"`.
pub fn progressive(name: &str) -> String {
    PROGRESSIVE.apply(name)
}

/// `"Create"` → `"created"`, `"Find"` → `"found"`.
pub fn past(name: &str) -> String {
    PAST.apply(name)
}

/// Words of a name: splits on separators and on lower→upper case changes.
fn words(value: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for ch in value.chars() {
        if !ch.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_lowercase() || ch.is_numeric();
        current.push(ch);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn upper_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `"foo bar_baz"` → `"FooBarBaz"`. Existing capitals are kept.
pub fn studly(value: &str) -> String {
    words(value).iter().map(|w| upper_first(w)).collect()
}

/// `"foo bar bazzed"` → `"fooBarBazzed"`.
pub fn camel(value: &str) -> String {
    let studly = studly(value);
    let mut chars = studly.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `"fooBar"` → `"foo_bar"`.
pub fn snake(value: &str) -> String {
    words(value)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Last path segment of a type name, without generic parameters.
///
/// `"app::commands::Create<T>"` → `"Create"`.
pub fn simple_type_name(type_name: &str) -> &str {
    let base = type_name.split('<').next().unwrap_or(type_name);
    base.rsplit("::").next().unwrap_or(base)
}

//! Compact mutation notation used by LAPIS and the dashboard.
//!
//! Accepted shapes (case-insensitive):
//!
//! * substitution `[SEGMENT:][REF]POSITION[ALT]`, e.g. `S:N501Y`, `A23403G`, `123`
//! * deletion `[SEGMENT:][REF]POSITION-`, e.g. `A23403-`, `ORF1a:S3675-`
//! * insertion `ins_[SEGMENT:]POSITION:SYMBOLS`, e.g. `ins_22204:GAGCCAGAA`
//!
//! Every shape is tried against the nucleotide alphabet first and the amino
//! acid alphabet second. The amino acid shapes require the gene segment, with
//! an opt-in exception for substitutions.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use serde::Serialize;

use crate::error::DashboardError;
use crate::sync::lock;

const NUCLEOTIDE_SYMBOLS: &str = "ACGTRYSWKMBDHVN";
const AMINO_ACID_SYMBOLS: &str = "ACDEFGHIKLMNPQRSTVWY*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Alphabet {
    Nucleotide,
    AminoAcid,
}

impl Alphabet {
    fn contains(self, symbol: char) -> bool {
        let symbols = match self {
            Alphabet::Nucleotide => NUCLEOTIDE_SYMBOLS,
            Alphabet::AminoAcid => AMINO_ACID_SYMBOLS,
        };
        symbols.contains(symbol.to_ascii_uppercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentRule {
    Optional,
    Required,
}

/// Grammar variants in the order they are tried.
const GRAMMARS: [(Alphabet, SegmentRule); 2] = [
    (Alphabet::Nucleotide, SegmentRule::Optional),
    (Alphabet::AminoAcid, SegmentRule::Required),
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Substitution {
    pub segment: Option<String>,
    pub value_at_reference: Option<char>,
    pub position: u32,
    pub substitution_value: Option<char>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deletion {
    pub segment: Option<String>,
    pub value_at_reference: Option<char>,
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Insertion {
    pub segment: Option<String>,
    pub position: u32,
    pub inserted_symbols: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Mutation {
    Substitution(Substitution),
    Deletion(Deletion),
    Insertion(Insertion),
}

/// The point mutations that occupy a single position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SubstitutionOrDeletion {
    Substitution(Substitution),
    Deletion(Deletion),
}

impl Substitution {
    pub fn new(
        segment: Option<&str>,
        value_at_reference: Option<char>,
        position: u32,
        substitution_value: Option<char>,
    ) -> Self {
        Self {
            segment: segment.map(str::to_string),
            value_at_reference: value_at_reference.map(|c| c.to_ascii_uppercase()),
            position,
            substitution_value: substitution_value.map(|c| c.to_ascii_uppercase()),
        }
    }

    /// Parses a substitution code; `allow_amino_acid_without_segment` adds a
    /// last grammar for amino acid codes that omit the gene.
    pub fn parse(code: &str, allow_amino_acid_without_segment: bool) -> Option<Self> {
        let mut grammars = GRAMMARS.to_vec();
        if allow_amino_acid_without_segment {
            grammars.push((Alphabet::AminoAcid, SegmentRule::Optional));
        }
        grammars.into_iter().find_map(|(alphabet, rule)| {
            let point = parse_point(code, alphabet, rule)?;
            let alt = match point.tail {
                Tail::None => None,
                Tail::Symbol(symbol) => Some(symbol),
                Tail::Dash => return None,
            };
            Some(Substitution::new(
                point.segment,
                point.reference,
                point.position,
                alt,
            ))
        })
    }

    pub fn code(&self) -> String {
        let mut code = segment_prefix(self.segment.as_deref());
        if let Some(reference) = self.value_at_reference {
            code.push(reference);
        }
        code.push_str(&self.position.to_string());
        if let Some(value) = self.substitution_value {
            code.push(value);
        }
        code
    }
}

impl Deletion {
    pub fn new(segment: Option<&str>, value_at_reference: Option<char>, position: u32) -> Self {
        Self {
            segment: segment.map(str::to_string),
            value_at_reference: value_at_reference.map(|c| c.to_ascii_uppercase()),
            position,
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        GRAMMARS.iter().find_map(|&(alphabet, rule)| {
            let point = parse_point(code, alphabet, rule)?;
            match point.tail {
                Tail::Dash => Some(Deletion::new(
                    point.segment,
                    point.reference,
                    point.position,
                )),
                _ => None,
            }
        })
    }

    pub fn code(&self) -> String {
        let mut code = segment_prefix(self.segment.as_deref());
        if let Some(reference) = self.value_at_reference {
            code.push(reference);
        }
        code.push_str(&self.position.to_string());
        code.push('-');
        code
    }
}

impl Insertion {
    pub fn new(segment: Option<&str>, position: u32, inserted_symbols: &str) -> Self {
        Self {
            segment: segment.map(str::to_string),
            position,
            inserted_symbols: inserted_symbols.to_ascii_uppercase(),
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        let prefix = code.get(..4)?;
        if !prefix.eq_ignore_ascii_case("ins_") {
            return None;
        }
        let body = &code[4..];
        let parts = body.split(':').collect::<Vec<_>>();
        let (segment, position, symbols) = match parts.as_slice() {
            [position, symbols] => (None, *position, *symbols),
            [segment, position, symbols] => (Some(*segment), *position, *symbols),
            _ => return None,
        };
        if let Some(segment) = segment {
            if !is_segment_name(segment) {
                return None;
            }
        }
        let position = parse_position(position)?;

        GRAMMARS.iter().find_map(|&(alphabet, rule)| {
            if rule == SegmentRule::Required && segment.is_none() {
                return None;
            }
            if !is_insertion_payload(symbols, alphabet) {
                return None;
            }
            Some(Insertion::new(segment, position, symbols))
        })
    }

    pub fn code(&self) -> String {
        format!(
            "ins_{}{}:{}",
            segment_prefix(self.segment.as_deref()),
            self.position,
            self.inserted_symbols
        )
    }
}

impl Mutation {
    /// Tries insertion, deletion and substitution in turn. The shapes are
    /// disjoint, so at most one of them can match a given code.
    pub fn parse(code: &str) -> Option<Self> {
        let code = code.trim();
        if let Some(insertion) = Insertion::parse(code) {
            return Some(Mutation::Insertion(insertion));
        }
        if let Some(deletion) = Deletion::parse(code) {
            return Some(Mutation::Deletion(deletion));
        }
        Substitution::parse(code, false).map(Mutation::Substitution)
    }

    pub fn code(&self) -> String {
        match self {
            Mutation::Substitution(m) => m.code(),
            Mutation::Deletion(m) => m.code(),
            Mutation::Insertion(m) => m.code(),
        }
    }

    pub fn segment(&self) -> Option<&str> {
        match self {
            Mutation::Substitution(m) => m.segment.as_deref(),
            Mutation::Deletion(m) => m.segment.as_deref(),
            Mutation::Insertion(m) => m.segment.as_deref(),
        }
    }

    pub fn position(&self) -> u32 {
        match self {
            Mutation::Substitution(m) => m.position,
            Mutation::Deletion(m) => m.position,
            Mutation::Insertion(m) => m.position,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Mutation::Substitution(_) => "substitution",
            Mutation::Deletion(_) => "deletion",
            Mutation::Insertion(_) => "insertion",
        }
    }
}

impl SubstitutionOrDeletion {
    pub fn parse(code: &str) -> Option<Self> {
        match Mutation::parse(code)? {
            Mutation::Substitution(m) => Some(SubstitutionOrDeletion::Substitution(m)),
            Mutation::Deletion(m) => Some(SubstitutionOrDeletion::Deletion(m)),
            Mutation::Insertion(_) => None,
        }
    }

    pub fn code(&self) -> String {
        match self {
            SubstitutionOrDeletion::Substitution(m) => m.code(),
            SubstitutionOrDeletion::Deletion(m) => m.code(),
        }
    }

    pub fn position(&self) -> u32 {
        match self {
            SubstitutionOrDeletion::Substitution(m) => m.position,
            SubstitutionOrDeletion::Deletion(m) => m.position,
        }
    }

    pub fn segment(&self) -> Option<&str> {
        match self {
            SubstitutionOrDeletion::Substitution(m) => m.segment.as_deref(),
            SubstitutionOrDeletion::Deletion(m) => m.segment.as_deref(),
        }
    }
}

impl TryFrom<Mutation> for SubstitutionOrDeletion {
    type Error = DashboardError;

    fn try_from(value: Mutation) -> Result<Self, Self::Error> {
        match value {
            Mutation::Substitution(m) => Ok(SubstitutionOrDeletion::Substitution(m)),
            Mutation::Deletion(m) => Ok(SubstitutionOrDeletion::Deletion(m)),
            Mutation::Insertion(m) => Err(DashboardError::UnexpectedMutationType {
                code: m.code(),
                expected: "substitution or deletion".to_string(),
            }),
        }
    }
}

impl From<SubstitutionOrDeletion> for Mutation {
    fn from(value: SubstitutionOrDeletion) -> Self {
        match value {
            SubstitutionOrDeletion::Substitution(m) => Mutation::Substitution(m),
            SubstitutionOrDeletion::Deletion(m) => Mutation::Deletion(m),
        }
    }
}

macro_rules! display_code {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.code())
                }
            }
        )*
    };
}

display_code!(Substitution, Deletion, Insertion, Mutation, SubstitutionOrDeletion);

impl FromStr for Mutation {
    type Err = DashboardError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Mutation::parse(value).ok_or_else(|| DashboardError::InvalidMutationCode(value.to_string()))
    }
}

impl FromStr for SubstitutionOrDeletion {
    type Err = DashboardError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.parse::<Mutation>()?.try_into()
    }
}

/// Display order: unsegmented first, then by segment name, position, and
/// finally the code itself so the order is total.
pub fn compare_mutations(left: &Mutation, right: &Mutation) -> Ordering {
    left.segment()
        .cmp(&right.segment())
        .then_with(|| left.position().cmp(&right.position()))
        .then_with(|| left.code().cmp(&right.code()))
}

/// Memoizes parsing by exact code string. Failed parses are remembered too.
#[derive(Debug, Default)]
pub struct MutationParseCache {
    entries: Mutex<HashMap<String, Option<Mutation>>>,
}

impl MutationParseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&self, code: &str) -> Option<Mutation> {
        if let Some(hit) = lock(&self.entries).get(code) {
            return hit.clone();
        }
        let parsed = Mutation::parse(code);
        lock(&self.entries).insert(code.to_string(), parsed.clone());
        parsed
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

enum Tail {
    None,
    Symbol(char),
    Dash,
}

struct Point<'a> {
    segment: Option<&'a str>,
    reference: Option<char>,
    position: u32,
    tail: Tail,
}

/// Shared shape of substitutions and deletions: `[SEG:][REF]POS[TAIL]`.
fn parse_point(code: &str, alphabet: Alphabet, rule: SegmentRule) -> Option<Point<'_>> {
    let (segment, body) = match code.split_once(':') {
        Some((segment, body)) => {
            if !is_segment_name(segment) {
                return None;
            }
            (Some(segment), body)
        }
        None => (None, code),
    };
    if rule == SegmentRule::Required && segment.is_none() {
        return None;
    }

    let mut chars = body.chars().peekable();
    let reference = match chars.peek() {
        Some(&c) if !c.is_ascii_digit() => {
            if !alphabet.contains(c) {
                return None;
            }
            chars.next();
            Some(c)
        }
        _ => None,
    };

    let mut digits = String::new();
    while let Some(&c) = chars.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    let position = parse_position(&digits)?;

    let tail = match chars.next() {
        None => Tail::None,
        Some('-') => Tail::Dash,
        Some(c) if alphabet.contains(c) => Tail::Symbol(c),
        Some(_) => return None,
    };
    if chars.next().is_some() {
        return None;
    }

    Some(Point {
        segment,
        reference,
        position,
        tail,
    })
}

fn parse_position(digits: &str) -> Option<u32> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn is_segment_name(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_insertion_payload(symbols: &str, alphabet: Alphabet) -> bool {
    if symbols.is_empty() {
        return false;
    }
    let mut chars = symbols.chars();
    while let Some(c) = chars.next() {
        match c {
            '?' => {}
            '.' => {
                if chars.next() != Some('*') {
                    return false;
                }
            }
            c if alphabet.contains(c) => {}
            _ => return false,
        }
    }
    true
}

fn segment_prefix(segment: Option<&str>) -> String {
    match segment {
        Some(segment) => format!("{segment}:"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn parse_cache_survives_a_poisoned_lock() {
        let cache = MutationParseCache::new();
        assert!(cache.parse("A1G").is_some());
        thread::scope(|scope| {
            let holder = scope.spawn(|| {
                let _entries = cache.entries.lock().unwrap();
                panic!("holder panicked");
            });
            assert!(holder.join().is_err());
        });
        assert!(cache.entries.is_poisoned());

        assert!(cache.parse("C2T").is_some());
        assert!(cache.parse("A1G").is_some());
        assert_eq!(cache.len(), 2);
    }
}

//! XSD constraining facets
//!
//! A simple type carries one effective [`FacetSet`]: the facets of every
//! restriction step merged from the primitive down. Merging is where
//! tightening is enforced; a facet that loosens or contradicts an inherited
//! one is rejected with `InvalidFacetDerivation`.
//!
//! Checks run in a fixed order: whitespace normalization, length, value
//! range, digits, pattern, enumeration.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use regex::Regex;

use crate::error::{Error, Result, SchemaError, SchemaErrorKind, ValidationError};
use crate::names::{NAME_EXTRA_RANGES, NAME_START_RANGES};

use super::values::{AtomicValue, SimpleValue};

/// White space handling modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WhiteSpace {
    /// Preserve all white space
    Preserve,
    /// Replace tabs and newlines with spaces
    Replace,
    /// Replace and collapse multiple spaces
    Collapse,
}

impl WhiteSpace {
    /// Parse from string value
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "preserve" => Ok(WhiteSpace::Preserve),
            "replace" => Ok(WhiteSpace::Replace),
            "collapse" => Ok(WhiteSpace::Collapse),
            _ => Err(Error::Value(format!(
                "Invalid whiteSpace value: '{}'. Must be 'preserve', 'replace', or 'collapse'",
                s
            ))),
        }
    }

    /// Normalize a string according to this white space mode
    pub fn normalize(&self, s: &str) -> String {
        match self {
            WhiteSpace::Preserve => s.to_string(),
            WhiteSpace::Replace => s.replace(['\t', '\n', '\r'], " "),
            WhiteSpace::Collapse => s
                .split(|c| matches!(c, ' ' | '\t' | '\n' | '\r'))
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

impl fmt::Display for WhiteSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WhiteSpace::Preserve => "preserve",
            WhiteSpace::Replace => "replace",
            WhiteSpace::Collapse => "collapse",
        };
        f.write_str(s)
    }
}

/// Constraining facet kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FacetKind {
    /// length
    Length,
    /// minLength
    MinLength,
    /// maxLength
    MaxLength,
    /// pattern
    Pattern,
    /// enumeration
    Enumeration,
    /// whiteSpace
    WhiteSpace,
    /// maxInclusive
    MaxInclusive,
    /// maxExclusive
    MaxExclusive,
    /// minInclusive
    MinInclusive,
    /// minExclusive
    MinExclusive,
    /// totalDigits
    TotalDigits,
    /// fractionDigits
    FractionDigits,
    /// explicitTimezone (XSD 1.1)
    ExplicitTimezone,
}

impl FacetKind {
    /// Map a facet element local name to its kind
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "length" => FacetKind::Length,
            "minLength" => FacetKind::MinLength,
            "maxLength" => FacetKind::MaxLength,
            "pattern" => FacetKind::Pattern,
            "enumeration" => FacetKind::Enumeration,
            "whiteSpace" => FacetKind::WhiteSpace,
            "maxInclusive" => FacetKind::MaxInclusive,
            "maxExclusive" => FacetKind::MaxExclusive,
            "minInclusive" => FacetKind::MinInclusive,
            "minExclusive" => FacetKind::MinExclusive,
            "totalDigits" => FacetKind::TotalDigits,
            "fractionDigits" => FacetKind::FractionDigits,
            "explicitTimezone" => FacetKind::ExplicitTimezone,
            _ => return None,
        })
    }

    /// Facet element local name
    pub fn name(&self) -> &'static str {
        match self {
            FacetKind::Length => "length",
            FacetKind::MinLength => "minLength",
            FacetKind::MaxLength => "maxLength",
            FacetKind::Pattern => "pattern",
            FacetKind::Enumeration => "enumeration",
            FacetKind::WhiteSpace => "whiteSpace",
            FacetKind::MaxInclusive => "maxInclusive",
            FacetKind::MaxExclusive => "maxExclusive",
            FacetKind::MinInclusive => "minInclusive",
            FacetKind::MinExclusive => "minExclusive",
            FacetKind::TotalDigits => "totalDigits",
            FacetKind::FractionDigits => "fractionDigits",
            FacetKind::ExplicitTimezone => "explicitTimezone",
        }
    }
}

impl fmt::Display for FacetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A facet as written on one restriction step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Facet {
    /// Facet kind
    pub kind: FacetKind,
    /// Lexical value of the `value` attribute
    pub value: String,
    /// Whether derived types may not change the facet
    pub fixed: bool,
}

impl Facet {
    /// Create a non-fixed facet
    pub fn new(kind: FacetKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            fixed: false,
        }
    }

    /// Create a fixed facet
    pub fn fixed(kind: FacetKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            fixed: true,
        }
    }
}

// =============================================================================
// Patterns
// =============================================================================

/// Compiled pattern facet
#[derive(Debug, Clone)]
pub struct PatternFacet {
    /// XSD regular expression as written in the schema
    pub source: String,
    regex: Regex,
}

impl PatternFacet {
    /// Compile an XSD regular expression
    pub fn new(pattern: &str) -> std::result::Result<Self, String> {
        let translated = translate_pattern(pattern)?;
        let regex = Regex::new(&translated)
            .map_err(|e| format!("invalid pattern '{}': {}", pattern, e))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Whether the whole value matches
    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl PartialEq for PatternFacet {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

fn class_body(ranges: &[(char, char)]) -> String {
    ranges
        .iter()
        .map(|&(lo, hi)| format!("\\x{{{:X}}}-\\x{{{:X}}}", lo as u32, hi as u32))
        .collect()
}

/// Translate an XSD regular expression into an anchored `regex` pattern
///
/// XSD patterns are implicitly anchored, treat `^` and `$` as literals, add
/// the `\i`/`\c` name escapes and character class subtraction `[a-z-[aeiou]]`.
pub fn translate_pattern(pattern: &str) -> std::result::Result<String, String> {
    let name_start = class_body(NAME_START_RANGES);
    let name_char = format!("{}{}", name_start, class_body(NAME_EXTRA_RANGES));

    let mut out = String::with_capacity(pattern.len() + 16);
    out.push_str("^(?:");
    let mut chars = pattern.chars().peekable();
    let mut depth = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| format!("pattern '{}' ends with a lone backslash", pattern))?;
                match (escaped, depth > 0) {
                    ('i', false) => out.push_str(&format!("[{}]", name_start)),
                    ('I', false) => out.push_str(&format!("[^{}]", name_start)),
                    ('c', false) => out.push_str(&format!("[{}]", name_char)),
                    ('C', false) => out.push_str(&format!("[^{}]", name_char)),
                    ('i', true) => out.push_str(&name_start),
                    ('c', true) => out.push_str(&name_char),
                    ('I' | 'C', true) => {
                        return Err(format!(
                            "pattern '{}': negated name escapes inside a character class are not supported",
                            pattern
                        ))
                    }
                    ('p' | 'P', _) => {
                        out.push('\\');
                        out.push(escaped);
                        for next in chars.by_ref() {
                            out.push(next);
                            if next == '}' {
                                break;
                            }
                        }
                    }
                    (other, _) => {
                        out.push('\\');
                        out.push(other);
                    }
                }
            }
            '[' => {
                depth += 1;
                out.push('[');
                if chars.peek() == Some(&'^') {
                    chars.next();
                    out.push('^');
                }
            }
            ']' if depth > 0 => {
                depth -= 1;
                out.push(']');
            }
            '-' if depth > 0 && chars.peek() == Some(&'[') => {
                chars.next();
                depth += 1;
                out.push_str("&&[^");
            }
            '&' | '~' if depth > 0 => {
                out.push('\\');
                out.push(c);
            }
            '^' | '$' if depth == 0 => {
                out.push('\\');
                out.push(c);
            }
            '.' if depth == 0 => out.push_str("[^\\n\\r]"),
            other => out.push(other),
        }
    }

    if depth != 0 {
        return Err(format!("pattern '{}' has an unterminated character class", pattern));
    }
    out.push_str(")$");
    Ok(out)
}

// =============================================================================
// Effective facet set
// =============================================================================

/// A value-range bound
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    /// Bound value
    pub value: AtomicValue,
    /// Whether the bound itself is admitted
    pub inclusive: bool,
}

/// explicitTimezone facet values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplicitTimezone {
    /// A timezone must be present
    Required,
    /// A timezone must be absent
    Prohibited,
    /// Either is fine
    Optional,
}

/// Merged facets of a simple type
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FacetSet {
    /// whiteSpace, when set explicitly somewhere in the chain
    pub whitespace: Option<WhiteSpace>,
    /// length
    pub length: Option<usize>,
    /// minLength
    pub min_length: Option<usize>,
    /// maxLength
    pub max_length: Option<usize>,
    /// Lower value bound
    pub min: Option<Bound>,
    /// Upper value bound
    pub max: Option<Bound>,
    /// totalDigits
    pub total_digits: Option<u32>,
    /// fractionDigits
    pub fraction_digits: Option<u32>,
    /// Pattern levels: ANDed across levels, ORed within one level
    pub patterns: Vec<Vec<PatternFacet>>,
    /// Allowed values
    pub enumeration: Option<Vec<SimpleValue>>,
    /// explicitTimezone
    pub explicit_timezone: Option<ExplicitTimezone>,
    /// Facets fixed by some step of the chain, with their lexical value
    pub fixed: Vec<(FacetKind, String)>,
}

/// Callbacks used to interpret facet values in the base type's value space
pub struct FacetValues<'a> {
    /// Parse a lexical value in the base value space, without facet checks
    pub parse: &'a dyn Fn(&str) -> std::result::Result<AtomicValue, String>,
    /// Fully validate a lexical value against the base type
    pub validate: &'a dyn Fn(&str) -> std::result::Result<SimpleValue, String>,
}

fn facet_error(message: String) -> SchemaError {
    SchemaError::new(SchemaErrorKind::InvalidFacetDerivation, message)
}

fn parse_count<T: std::str::FromStr>(facet: &Facet) -> std::result::Result<T, SchemaError> {
    facet.value.trim().parse::<T>().map_err(|_| {
        facet_error(format!(
            "{} value '{}' is not a non-negative integer",
            facet.kind, facet.value
        ))
    })
}

impl FacetSet {
    /// Merge the facets of one restriction step onto the base's facets
    pub fn derive(
        base: &FacetSet,
        facets: &[Facet],
        admitted: &HashSet<FacetKind>,
        values: &FacetValues<'_>,
    ) -> std::result::Result<FacetSet, SchemaError> {
        let mut merged = base.clone();
        let mut level_patterns = Vec::new();
        let mut enumeration: Option<Vec<SimpleValue>> = None;
        let mut seen = HashSet::new();

        for facet in facets {
            if !admitted.contains(&facet.kind) {
                return Err(facet_error(format!(
                    "facet '{}' is not applicable to the base type",
                    facet.kind
                )));
            }
            if !matches!(facet.kind, FacetKind::Pattern | FacetKind::Enumeration)
                && !seen.insert(facet.kind)
            {
                return Err(facet_error(format!(
                    "facet '{}' is specified more than once",
                    facet.kind
                )));
            }
            if let Some((_, fixed)) = base.fixed.iter().find(|(k, _)| *k == facet.kind) {
                if fixed.trim() != facet.value.trim() {
                    return Err(facet_error(format!(
                        "facet '{}' is fixed to '{}' and cannot be changed to '{}'",
                        facet.kind, fixed, facet.value
                    )));
                }
            }
            if facet.fixed && !merged.fixed.iter().any(|(k, _)| *k == facet.kind) {
                merged.fixed.push((facet.kind, facet.value.clone()));
            }

            match facet.kind {
                FacetKind::WhiteSpace => {
                    let ws = WhiteSpace::from_str(facet.value.trim())
                        .map_err(|e| facet_error(e.to_string()))?;
                    if let Some(current) = base.whitespace {
                        if ws < current {
                            return Err(facet_error(format!(
                                "whiteSpace '{}' loosens inherited '{}'",
                                ws, current
                            )));
                        }
                    }
                    merged.whitespace = Some(ws);
                }
                FacetKind::Length => {
                    let n: usize = parse_count(facet)?;
                    if base.length.is_some_and(|l| l != n)
                        || base.min_length.is_some_and(|m| n < m)
                        || base.max_length.is_some_and(|m| n > m)
                    {
                        return Err(facet_error(format!(
                            "length {} contradicts inherited length facets",
                            n
                        )));
                    }
                    merged.length = Some(n);
                }
                FacetKind::MinLength => {
                    let n: usize = parse_count(facet)?;
                    if base.min_length.is_some_and(|m| n < m)
                        || base.max_length.is_some_and(|m| n > m)
                        || base.length.is_some_and(|l| n > l)
                    {
                        return Err(facet_error(format!(
                            "minLength {} loosens or contradicts inherited length facets",
                            n
                        )));
                    }
                    merged.min_length = Some(n);
                }
                FacetKind::MaxLength => {
                    let n: usize = parse_count(facet)?;
                    if base.max_length.is_some_and(|m| n > m)
                        || base.min_length.is_some_and(|m| n < m)
                        || base.length.is_some_and(|l| n < l)
                    {
                        return Err(facet_error(format!(
                            "maxLength {} loosens or contradicts inherited length facets",
                            n
                        )));
                    }
                    merged.max_length = Some(n);
                }
                FacetKind::TotalDigits => {
                    let n: u32 = parse_count(facet)?;
                    if n == 0 || base.total_digits.is_some_and(|m| n > m) {
                        return Err(facet_error(format!(
                            "totalDigits {} loosens the inherited value",
                            n
                        )));
                    }
                    merged.total_digits = Some(n);
                }
                FacetKind::FractionDigits => {
                    let n: u32 = parse_count(facet)?;
                    if base.fraction_digits.is_some_and(|m| n > m) {
                        return Err(facet_error(format!(
                            "fractionDigits {} loosens the inherited value",
                            n
                        )));
                    }
                    merged.fraction_digits = Some(n);
                }
                FacetKind::MinInclusive | FacetKind::MinExclusive => {
                    let value = (values.parse)(facet.value.trim()).map_err(|e| {
                        facet_error(format!("{} value is invalid: {}", facet.kind, e))
                    })?;
                    let bound = Bound {
                        value,
                        inclusive: facet.kind == FacetKind::MinInclusive,
                    };
                    check_lower_tightens(&bound, base)?;
                    merged.min = Some(bound);
                }
                FacetKind::MaxInclusive | FacetKind::MaxExclusive => {
                    let value = (values.parse)(facet.value.trim()).map_err(|e| {
                        facet_error(format!("{} value is invalid: {}", facet.kind, e))
                    })?;
                    let bound = Bound {
                        value,
                        inclusive: facet.kind == FacetKind::MaxInclusive,
                    };
                    check_upper_tightens(&bound, base)?;
                    merged.max = Some(bound);
                }
                FacetKind::Pattern => {
                    let pattern = PatternFacet::new(&facet.value).map_err(|e| {
                        SchemaError::new(SchemaErrorKind::InvalidComponent, e)
                    })?;
                    level_patterns.push(pattern);
                }
                FacetKind::Enumeration => {
                    let value = (values.validate)(&facet.value).map_err(|e| {
                        facet_error(format!(
                            "enumeration value '{}' is not valid for the base type: {}",
                            facet.value, e
                        ))
                    })?;
                    enumeration.get_or_insert_with(Vec::new).push(value);
                }
                FacetKind::ExplicitTimezone => {
                    let tz = match facet.value.trim() {
                        "required" => ExplicitTimezone::Required,
                        "prohibited" => ExplicitTimezone::Prohibited,
                        "optional" => ExplicitTimezone::Optional,
                        other => {
                            return Err(facet_error(format!(
                                "invalid explicitTimezone value '{}'",
                                other
                            )))
                        }
                    };
                    if let Some(current) = base.explicit_timezone {
                        if current != ExplicitTimezone::Optional && current != tz {
                            return Err(facet_error(format!(
                                "explicitTimezone '{}' contradicts the inherited value",
                                facet.value
                            )));
                        }
                    }
                    merged.explicit_timezone = Some(tz);
                }
            }
        }

        if !level_patterns.is_empty() {
            merged.patterns.push(level_patterns);
        }
        if enumeration.is_some() {
            merged.enumeration = enumeration;
        }
        merged.check_consistency()?;
        Ok(merged)
    }

    fn check_consistency(&self) -> std::result::Result<(), SchemaError> {
        if let (Some(min), Some(max)) = (self.min_length, self.max_length) {
            if min > max {
                return Err(facet_error(format!(
                    "minLength {} is greater than maxLength {}",
                    min, max
                )));
            }
        }
        if let (Some(total), Some(fraction)) = (self.total_digits, self.fraction_digits) {
            if fraction > total {
                return Err(facet_error(format!(
                    "fractionDigits {} is greater than totalDigits {}",
                    fraction, total
                )));
            }
        }
        if let (Some(min), Some(max)) = (&self.min, &self.max) {
            let ok = match min.value.partial_cmp(&max.value) {
                Some(Ordering::Less) => true,
                Some(Ordering::Equal) => min.inclusive && max.inclusive,
                _ => false,
            };
            if !ok {
                return Err(facet_error(format!(
                    "lower bound {} is not below upper bound {}",
                    min.value, max.value
                )));
            }
        }
        Ok(())
    }

    /// Check a length measured in the value space's natural unit
    pub fn check_length(&self, length: usize) -> std::result::Result<(), ValidationError> {
        if let Some(expected) = self.length {
            if length != expected {
                return Err(ValidationError::facet(format!(
                    "length {} differs from the required length {}",
                    length, expected
                )));
            }
        }
        if let Some(min) = self.min_length {
            if length < min {
                return Err(ValidationError::facet(format!(
                    "length {} is below minLength {}",
                    length, min
                )));
            }
        }
        if let Some(max) = self.max_length {
            if length > max {
                return Err(ValidationError::facet(format!(
                    "length {} exceeds maxLength {}",
                    length, max
                )));
            }
        }
        Ok(())
    }

    /// Check the value-range facets using the value space ordering
    pub fn check_range(&self, value: &AtomicValue) -> std::result::Result<(), ValidationError> {
        if let Some(min) = &self.min {
            let ok = match value.partial_cmp(&min.value) {
                Some(Ordering::Greater) => true,
                Some(Ordering::Equal) => min.inclusive,
                _ => false,
            };
            if !ok {
                let facet = if min.inclusive { "minInclusive" } else { "minExclusive" };
                return Err(ValidationError::facet(format!(
                    "value {} violates {} {}",
                    value, facet, min.value
                )));
            }
        }
        if let Some(max) = &self.max {
            let ok = match value.partial_cmp(&max.value) {
                Some(Ordering::Less) => true,
                Some(Ordering::Equal) => max.inclusive,
                _ => false,
            };
            if !ok {
                let facet = if max.inclusive { "maxInclusive" } else { "maxExclusive" };
                return Err(ValidationError::facet(format!(
                    "value {} violates {} {}",
                    value, facet, max.value
                )));
            }
        }
        Ok(())
    }

    /// Check totalDigits and fractionDigits
    pub fn check_digits(&self, value: &AtomicValue) -> std::result::Result<(), ValidationError> {
        let Some((total, fraction)) = value.digits() else {
            return Ok(());
        };
        if let Some(max) = self.total_digits {
            if total > max {
                return Err(ValidationError::facet(format!(
                    "value {} has {} digits, totalDigits is {}",
                    value, total, max
                )));
            }
        }
        if let Some(max) = self.fraction_digits {
            if fraction > max {
                return Err(ValidationError::facet(format!(
                    "value {} has {} fraction digits, fractionDigits is {}",
                    value, fraction, max
                )));
            }
        }
        Ok(())
    }

    /// Check explicitTimezone
    pub fn check_timezone(&self, value: &AtomicValue) -> std::result::Result<(), ValidationError> {
        let (Some(tz), AtomicValue::Temporal(t)) = (self.explicit_timezone, value) else {
            return Ok(());
        };
        match (tz, t.offset.is_some()) {
            (ExplicitTimezone::Required, false) => {
                Err(ValidationError::facet(format!("value {} requires a timezone", value)))
            }
            (ExplicitTimezone::Prohibited, true) => Err(ValidationError::facet(format!(
                "value {} must not have a timezone",
                value
            ))),
            _ => Ok(()),
        }
    }

    /// Check pattern levels against a lexical form
    pub fn check_patterns(&self, lexical: &str) -> std::result::Result<(), ValidationError> {
        for level in &self.patterns {
            if !level.iter().any(|p| p.is_match(lexical)) {
                let sources: Vec<&str> = level.iter().map(|p| p.source.as_str()).collect();
                return Err(ValidationError::facet(format!(
                    "value '{}' does not match pattern {}",
                    lexical,
                    sources.join(" | ")
                )));
            }
        }
        Ok(())
    }

    /// Check enumeration by value equality
    pub fn check_enumeration(&self, value: &SimpleValue) -> std::result::Result<(), ValidationError> {
        if let Some(allowed) = &self.enumeration {
            if !allowed.iter().any(|a| a.value_eq(value)) {
                let listed: Vec<String> = allowed.iter().map(|a| a.to_lexical()).collect();
                return Err(ValidationError::facet(format!(
                    "value '{}' is not one of the enumerated values",
                    value
                ))
                .with_expected(listed));
            }
        }
        Ok(())
    }
}

fn check_lower_tightens(bound: &Bound, base: &FacetSet) -> std::result::Result<(), SchemaError> {
    if let Some(current) = &base.min {
        let ok = match bound.value.partial_cmp(&current.value) {
            Some(Ordering::Greater) => true,
            Some(Ordering::Equal) => current.inclusive || !bound.inclusive,
            _ => false,
        };
        if !ok {
            return Err(facet_error(format!(
                "lower bound {} loosens inherited lower bound {}",
                bound.value, current.value
            )));
        }
    }
    if let Some(current) = &base.max {
        let ok = match bound.value.partial_cmp(&current.value) {
            Some(Ordering::Less) => true,
            Some(Ordering::Equal) => current.inclusive && bound.inclusive,
            _ => false,
        };
        if !ok {
            return Err(facet_error(format!(
                "lower bound {} is above inherited upper bound {}",
                bound.value, current.value
            )));
        }
    }
    Ok(())
}

fn check_upper_tightens(bound: &Bound, base: &FacetSet) -> std::result::Result<(), SchemaError> {
    if let Some(current) = &base.max {
        let ok = match bound.value.partial_cmp(&current.value) {
            Some(Ordering::Less) => true,
            Some(Ordering::Equal) => current.inclusive || !bound.inclusive,
            _ => false,
        };
        if !ok {
            return Err(facet_error(format!(
                "upper bound {} loosens inherited upper bound {}",
                bound.value, current.value
            )));
        }
    }
    if let Some(current) = &base.min {
        let ok = match bound.value.partial_cmp(&current.value) {
            Some(Ordering::Greater) => true,
            Some(Ordering::Equal) => current.inclusive && bound.inclusive,
            _ => false,
        };
        if !ok {
            return Err(facet_error(format!(
                "upper bound {} is below inherited lower bound {}",
                bound.value, current.value
            )));
        }
    }
    Ok(())
}

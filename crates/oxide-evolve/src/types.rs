//! Column type normalization.
//!
//! Databases report column types in many spellings (`character varying`,
//! `varchar(255)`, `int4`, `integer auto_increment`, ...). Both sides of a
//! comparison go through [`normalize`] so that equivalent spellings compare
//! equal.

use std::fmt;

/// A dialect-independent type token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalType(String);

impl CanonicalType {
    /// The token every array type normalizes to.
    pub const ARRAY: &'static str = "array";

    /// Wraps an already-normalized token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns whether this is the array type.
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.0 == Self::ARRAY
    }
}

impl fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalizes a reported or compiled column type.
#[must_use]
pub fn normalize(raw: &str) -> CanonicalType {
    let mut t = raw.trim().to_lowercase();

    if t.ends_with("[]") || t == CanonicalType::ARRAY {
        return CanonicalType::new(CanonicalType::ARRAY);
    }

    for modifier in [" auto_increment", " unsigned", " zerofill"] {
        while let Some(stripped) = t.strip_suffix(modifier) {
            t = stripped.trim_end().to_string();
        }
    }

    // varchar(255) -> varchar, numeric(10, 2) -> numeric
    if let Some(open) = t.find('(') {
        if let Some(close) = t.rfind(')').filter(|close| *close > open) {
            let rest = t[close + 1..].trim().to_string();
            t = t[..open].trim_end().to_string();
            if !rest.is_empty() {
                t = format!("{t} {rest}");
            }
        }
    }

    let canonical = match t.as_str() {
        "serial" | "int" | "int4" | "integer" | "mediumint" => "integer",
        "bigserial" | "int8" | "bigint" => "bigint",
        "smallserial" | "int2" | "smallint" => "smallint",
        "character varying" | "varchar" => "varchar",
        "character" | "bpchar" | "char" => "char",
        "timestamp without time zone" | "timestamp" | "datetime" => "timestamp",
        "timestamp with time zone" | "timestamptz" => "timestamptz",
        "time without time zone" | "time" => "time",
        "decimal" | "real" | "float" | "float4" | "float8" | "double" | "double precision"
        | "numeric" => "numeric",
        "bool" | "boolean" => "boolean",
        other => other,
    };
    CanonicalType::new(canonical)
}

/// Returns whether a column of type `from` can be turned into `to` with a
/// plain cast. Arrays never convert in either direction.
#[must_use]
pub fn can_convert(from: &CanonicalType, to: &CanonicalType) -> bool {
    !from.is_array() && !to.is_array()
}

/// Normalizes a column default for comparison: sequences count as no
/// default, casts and quotes are stripped.
#[must_use]
pub fn normalize_default(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("null") || raw.starts_with("nextval(") {
        return None;
    }
    let without_cast = raw.split("::").next().unwrap_or(raw);
    Some(without_cast.trim_matches('\'').to_string())
}

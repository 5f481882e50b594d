//! Label sets identifying a series.
//!
//! A [`Labels`] value is always sorted by name with unique names, so two
//! label sets with the same content have the same canonical byte encoding
//! and the same [`Labels::stable_hash`].

use crate::error::SpecError;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the synthetic label that tells the targets of one series spec apart.
pub const TARGET_LABEL: &str = "__blockgen_target__";

/// Separator used in the canonical encoding. Never valid inside UTF-8 text.
const SEPARATOR: u8 = 0xff;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// A single name/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Sorted set of labels with unique names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Labels(Vec<Label>);

impl Labels {
    /// Create an empty label set.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Build a label set from name/value pairs.
    ///
    /// Names are validated and must be unique.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, SpecError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut labels: Vec<Label> = pairs
            .into_iter()
            .map(|(k, v)| Label::new(k, v))
            .collect();
        for label in &labels {
            validate_name(&label.name)?;
        }
        labels.sort();
        if let Some(dup) = labels.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(SpecError::DuplicateLabel(dup[0].name.clone()));
        }
        Ok(Self(labels))
    }

    /// Parse labels given as `name="value"` strings, as used on the command line.
    pub fn parse_flags<S: AsRef<str>>(flags: &[S]) -> Result<Self, SpecError> {
        let mut pairs = Vec::with_capacity(flags.len());
        for flag in flags {
            let flag = flag.as_ref();
            let (name, raw_value) = flag
                .split_once('=')
                .ok_or_else(|| SpecError::InvalidLabelFormat(flag.to_string()))?;
            let value =
                unquote(raw_value).ok_or_else(|| SpecError::InvalidLabelFormat(flag.to_string()))?;
            pairs.push((name.to_string(), value));
        }
        Self::from_pairs(pairs)
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Label> {
        self.0.iter()
    }

    /// Get a label value by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .binary_search_by(|l| l.name.as_str().cmp(name))
            .ok()
            .map(|idx| self.0[idx].value.as_str())
    }

    /// Set a label, replacing any existing value with the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let label = Label::new(name, value);
        match self
            .0
            .binary_search_by(|l| l.name.as_str().cmp(label.name.as_str()))
        {
            Ok(idx) => self.0[idx] = label,
            Err(idx) => self.0.insert(idx, label),
        }
    }

    /// Merge two label sets. Labels from `overrides` win on name collision.
    pub fn merge(&self, overrides: &Labels) -> Labels {
        let mut merged = self.clone();
        for label in overrides.iter() {
            merged.set(label.name.clone(), label.value.clone());
        }
        merged
    }

    /// Canonical byte encoding: `name 0xff value 0xff` for every label in order.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let size = self
            .0
            .iter()
            .map(|l| l.name.len() + l.value.len() + 2)
            .sum();
        let mut buf = Vec::with_capacity(size);
        for label in &self.0 {
            buf.extend_from_slice(label.name.as_bytes());
            buf.push(SEPARATOR);
            buf.extend_from_slice(label.value.as_bytes());
            buf.push(SEPARATOR);
        }
        buf
    }

    /// 64-bit FNV-1a hash of the canonical encoding.
    ///
    /// Stable across processes, machines and releases.
    pub fn stable_hash(&self) -> u64 {
        fnv1a64(&self.canonical_bytes())
    }
}

/// Decode a double-quoted string literal with backslash escapes, or a
/// backquoted raw string. Returns `None` for anything malformed.
fn unquote(raw: &str) -> Option<String> {
    if let Some(inner) = raw.strip_prefix('`').and_then(|r| r.strip_suffix('`')) {
        return (!inner.contains('`')).then(|| inner.to_string());
    }
    let inner = raw.strip_prefix('"')?.strip_suffix('"')?;

    let mut out: Vec<u8> = Vec::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' | '\n' => return None,
            '\\' => {}
            _ => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                continue;
            }
        }
        let escaped = match chars.next()? {
            'a' => '\x07',
            'b' => '\x08',
            'f' => '\x0c',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'v' => '\x0b',
            '\\' => '\\',
            '"' => '"',
            'x' => {
                out.push(u8::try_from(hex_digits(&mut chars, 2)?).ok()?);
                continue;
            }
            'u' => char::from_u32(hex_digits(&mut chars, 4)?)?,
            'U' => char::from_u32(hex_digits(&mut chars, 8)?)?,
            d @ '0'..='7' => {
                let mut value = d.to_digit(8)?;
                for _ in 0..2 {
                    value = value * 8 + chars.next()?.to_digit(8)?;
                }
                out.push(u8::try_from(value).ok()?);
                continue;
            }
            _ => return None,
        };
        let mut buf = [0u8; 4];
        out.extend_from_slice(escaped.encode_utf8(&mut buf).as_bytes());
    }
    String::from_utf8(out).ok()
}

fn hex_digits(chars: &mut std::str::Chars<'_>, count: usize) -> Option<u32> {
    let mut value = 0u32;
    for _ in 0..count {
        value = value * 16 + chars.next()?.to_digit(16)?;
    }
    Some(value)
}

/// 64-bit FNV-1a.
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

fn validate_name(name: &str) -> Result<(), SpecError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(SpecError::InvalidLabelName(name.to_string()))
    }
}

impl<'a> IntoIterator for &'a Labels {
    type Item = &'a Label;
    type IntoIter = std::slice::Iter<'a, Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, label) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={:?}", label.name, label.value)?;
        }
        write!(f, "}}")
    }
}

impl Serialize for Labels {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for label in &self.0 {
            map.serialize_entry(&label.name, &label.value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Labels {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LabelsVisitor;

        impl<'de> Visitor<'de> for LabelsVisitor {
            type Value = Labels;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of label names to values")
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Labels, E> {
                Ok(Labels::new())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Labels, A::Error> {
                let mut pairs: Vec<(String, String)> = Vec::new();
                while let Some((name, value)) = access.next_entry::<String, LabelValue>()? {
                    pairs.push((name, value.0));
                }
                Labels::from_pairs(pairs).map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_any(LabelsVisitor)
    }
}

/// Label value that also accepts plain YAML scalars such as `replica: 0`.
struct LabelValue(String);

impl<'de> Deserialize<'de> for LabelValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = LabelValue;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a label value")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<LabelValue, E> {
                Ok(LabelValue(v.to_string()))
            }

            fn visit_string<E: serde::de::Error>(self, v: String) -> Result<LabelValue, E> {
                Ok(LabelValue(v))
            }

            fn visit_bool<E: serde::de::Error>(self, v: bool) -> Result<LabelValue, E> {
                Ok(LabelValue(v.to_string()))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<LabelValue, E> {
                Ok(LabelValue(v.to_string()))
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<LabelValue, E> {
                Ok(LabelValue(v.to_string()))
            }

            fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<LabelValue, E> {
                Ok(LabelValue(v.to_string()))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

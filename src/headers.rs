//! Thread-safe header container with typed accessors.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A header value.
///
/// Parsed frames only ever produce [`HeaderValue::Str`]; the numeric variants
/// exist for headers built locally (e.g. for [`EslClient::send_event`](crate::EslClient::send_event)).
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    /// Text value, as received on the wire.
    Str(String),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Floating point, rendered with three decimals.
    Float(f64),
}

impl HeaderValue {
    /// Text form: integers in base 10, floats with three decimals.
    pub fn to_text(&self) -> String {
        match self {
            HeaderValue::Str(s) => s.clone(),
            HeaderValue::Int(i) => i.to_string(),
            HeaderValue::UInt(u) => u.to_string(),
            HeaderValue::Float(f) => format!("{:.3}", f),
        }
    }

    /// Integer form: text is parsed as decimal (0 on failure), floats are
    /// truncated toward zero, unsigned values saturate at `i64::MAX`.
    pub fn to_int(&self) -> i64 {
        match self {
            HeaderValue::Str(s) => s
                .parse()
                .unwrap_or(0),
            HeaderValue::Int(i) => *i,
            HeaderValue::UInt(u) => i64::try_from(*u).unwrap_or(i64::MAX),
            HeaderValue::Float(f) => f.trunc() as i64,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<String> for HeaderValue {
    fn from(s: String) -> Self {
        HeaderValue::Str(s)
    }
}

impl From<&str> for HeaderValue {
    fn from(s: &str) -> Self {
        HeaderValue::Str(s.to_string())
    }
}

macro_rules! impl_from_int {
    ($variant:ident as $target:ty: $($t:ty),+) => {
        $(
            impl From<$t> for HeaderValue {
                fn from(v: $t) -> Self {
                    HeaderValue::$variant(<$target>::from(v))
                }
            }
        )+
    };
}

impl_from_int!(Int as i64: i8, i16, i32, i64);
impl_from_int!(UInt as u64: u8, u16, u32, u64);
impl_from_int!(Float as f64: f32, f64);

impl From<usize> for HeaderValue {
    fn from(v: usize) -> Self {
        HeaderValue::UInt(v as u64)
    }
}

/// Header name to value map, safe to share between tasks.
///
/// Reads take a shared lock and may run concurrently; writes are exclusive.
/// Names are case-sensitive.
#[derive(Default)]
pub struct EslHeaders {
    inner: RwLock<HashMap<String, HeaderValue>>,
}

impl EslHeaders {
    /// Create an empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, HeaderValue>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, HeaderValue>> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite a header.
    pub fn set(&self, key: impl Into<String>, value: impl Into<HeaderValue>) {
        self.write()
            .insert(key.into(), value.into());
    }

    /// Value of a header, if present.
    pub fn get(&self, key: &str) -> Option<HeaderValue> {
        self.read()
            .get(key)
            .cloned()
    }

    /// Header as text, empty if absent.
    pub fn get_string(&self, key: &str) -> String {
        self.read()
            .get(key)
            .map(HeaderValue::to_text)
            .unwrap_or_default()
    }

    /// Header as integer, 0 if absent or unparseable.
    pub fn get_int(&self, key: &str) -> i64 {
        self.read()
            .get(key)
            .map(HeaderValue::to_int)
            .unwrap_or(0)
    }

    /// Remove a header, returning its value if it existed.
    pub fn remove(&self, key: &str) -> Option<HeaderValue> {
        self.write()
            .remove(key)
    }

    /// Whether a header is present.
    pub fn exists(&self, key: &str) -> bool {
        self.read()
            .contains_key(key)
    }

    /// All header names.
    pub fn keys(&self) -> BTreeSet<String> {
        self.read()
            .keys()
            .cloned()
            .collect()
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.read()
            .len()
    }

    /// `true` when no header is set.
    pub fn is_empty(&self) -> bool {
        self.read()
            .is_empty()
    }

    /// Snapshot of all headers as text, sorted by name.
    pub fn to_vec(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.to_text()))
            .collect();
        pairs.sort();
        pairs
    }

    /// Append to an existing value with `;`, as repeated wire headers fold.
    pub(crate) fn append(&self, key: &str, value: String) {
        let mut map = self.write();
        match map.get_mut(key) {
            Some(HeaderValue::Str(existing)) => {
                existing.push(';');
                existing.push_str(&value);
            }
            _ => {
                map.insert(key.to_string(), HeaderValue::Str(value));
            }
        }
    }
}

impl Clone for EslHeaders {
    fn clone(&self) -> Self {
        Self {
            inner: RwLock::new(self.read().clone()),
        }
    }
}

impl PartialEq for EslHeaders {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || *self.read() == *other.read()
    }
}

impl fmt::Debug for EslHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.to_vec())
            .finish()
    }
}

/// `k1=v1 | k2=v2`, sorted by name; empty when there are no headers.
impl fmt::Display for EslHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .to_vec()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        f.write_str(&rendered.join(" | "))
    }
}

impl<K, V> FromIterator<(K, V)> for EslHeaders
where
    K: Into<String>,
    V: Into<HeaderValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            inner: RwLock::new(map),
        }
    }
}

use std::{borrow::Cow, fmt};

use indexmap::IndexMap;

/// Name of a measurement field.
pub type FieldName = Cow<'static, str>;

/// Field that a scalar measurement is stored under.
pub const VALUE_FIELD: &str = "value";

/// Field that timing helpers store elapsed milliseconds under.
pub const DURATION_FIELD: &str = "duration";

/// The kind of a field value, as declared by a series column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Signed or unsigned integer.
    Integer,

    /// Floating-point number.
    Float,

    /// UTF-8 string.
    String,

    /// Boolean.
    Boolean,
}

impl FieldKind {
    /// Gets the name of this kind, for use in diagnostics.
    pub const fn as_str(self) -> &'static str {
        match self {
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::String => "string",
            FieldKind::Boolean => "boolean",
        }
    }
}

/// A single field value.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// Signed integer.
    Integer(i64),

    /// Unsigned integer that may not fit in an `i64`.
    UInteger(u64),

    /// Floating-point number.
    Float(f64),

    /// String.
    Str(String),

    /// Boolean.
    Boolean(bool),
}

impl FieldValue {
    /// Gets the kind of this value.
    pub const fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Integer(_) | FieldValue::UInteger(_) => FieldKind::Integer,
            FieldValue::Float(_) => FieldKind::Float,
            FieldValue::Str(_) => FieldKind::String,
            FieldValue::Boolean(_) => FieldKind::Boolean,
        }
    }

    /// Whether or not this value is accepted by a column of the given kind.
    ///
    /// Integers are accepted by float columns, as every integer the worker reports (counts,
    /// milliseconds) is representable there.
    pub fn is_compatible_with(&self, kind: FieldKind) -> bool {
        let own = self.kind();
        own == kind || (own == FieldKind::Integer && kind == FieldKind::Float)
    }

    /// Gets this value as a signed integer, if it is one and it fits.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            FieldValue::UInteger(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Gets this value as a string slice, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(v) => write!(f, "{v}"),
            FieldValue::UInteger(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Str(v) => write!(f, "{v:?}"),
            FieldValue::Boolean(v) => write!(f, "{v}"),
        }
    }
}

/// The structured payload of one data point.
///
/// Fields keep the order they were inserted in. Inserting a field that already exists replaces its
/// value in place.
///
/// Scalars convert into a measurement holding a single `value` field, so `Measurement::from(42)` is
/// equal to `{value: 42}`. Structured inputs (arrays or vectors of pairs, or an existing
/// measurement) convert without any change to their fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Measurement {
    fields: IndexMap<FieldName, FieldValue>,
}

impl Measurement {
    /// Creates an empty `Measurement`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a `Measurement` holding `value` under the `value` field.
    pub fn scalar<V>(value: V) -> Self
    where
        V: Into<FieldValue>,
    {
        Self::new().with_field(VALUE_FIELD, value)
    }

    /// Adds a field, replacing any existing field with the same name.
    #[must_use]
    pub fn with_field<N, V>(mut self, name: N, value: V) -> Self
    where
        N: Into<FieldName>,
        V: Into<FieldValue>,
    {
        self.insert(name, value);
        self
    }

    /// Inserts a field, returning the value it replaced, if any.
    pub fn insert<N, V>(&mut self, name: N, value: V) -> Option<FieldValue>
    where
        N: Into<FieldName>,
        V: Into<FieldValue>,
    {
        self.fields.insert(name.into(), value.into())
    }

    /// Gets the value of a field.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Merges `other` into this measurement.
    ///
    /// Fields in `other` win over fields of the same name in `self`.
    #[must_use]
    pub fn merge(mut self, other: Measurement) -> Self {
        self.fields.extend(other.fields);
        self
    }

    /// Gets the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over the fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_ref(), value))
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        f.write_str("}")
    }
}

macro_rules! impl_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    FieldValue::$variant(value.into())
                }
            }

            impl From<$ty> for Measurement {
                fn from(value: $ty) -> Self {
                    Measurement::scalar(value)
                }
            }
        )*
    };
}

impl_scalar!(
    i8 => Integer,
    i16 => Integer,
    i32 => Integer,
    i64 => Integer,
    u8 => Integer,
    u16 => Integer,
    u32 => Integer,
    u64 => UInteger,
    f32 => Float,
    f64 => Float,
    bool => Boolean,
    String => Str,
);

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_owned())
    }
}

impl From<&str> for Measurement {
    fn from(value: &str) -> Self {
        Measurement::scalar(value)
    }
}

impl From<usize> for FieldValue {
    fn from(value: usize) -> Self {
        FieldValue::UInteger(value as u64)
    }
}

impl From<usize> for Measurement {
    fn from(value: usize) -> Self {
        Measurement::scalar(value)
    }
}

impl<N, V> FromIterator<(N, V)> for Measurement
where
    N: Into<FieldName>,
    V: Into<FieldValue>,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut measurement = Measurement::new();
        for (name, value) in iter {
            measurement.insert(name, value);
        }
        measurement
    }
}

impl<N, V, const SIZE: usize> From<[(N, V); SIZE]> for Measurement
where
    N: Into<FieldName>,
    V: Into<FieldValue>,
{
    fn from(fields: [(N, V); SIZE]) -> Self {
        fields.into_iter().collect()
    }
}

impl<N, V> From<Vec<(N, V)>> for Measurement
where
    N: Into<FieldName>,
    V: Into<FieldValue>,
{
    fn from(fields: Vec<(N, V)>) -> Self {
        fields.into_iter().collect()
    }
}

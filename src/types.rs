use crate::conversions::column_type_to_str;
use crate::error::GpkgError;
use crate::geometry::{ByteOrder, EnvelopePolicy, GeometryValue};
use rusqlite::types::ValueRef;

/// Logical type of an attribute column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Boolean,
    Integer,
    Double,
    Text,
    Blob,
    /// ISO-8601 date stored as text.
    Date,
    /// ISO-8601 timestamp stored as text.
    DateTime,
}

impl ColumnType {
    /// SQL type used when declaring the column.
    pub fn sql_name(self) -> &'static str {
        column_type_to_str(self)
    }

    /// Whether `value` can be stored in a column of this type. `Null` is
    /// accepted here; nullability is the column's business.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::Boolean, Value::Integer(v)) => *v == 0 || *v == 1,
            (Self::Integer, Value::Integer(_)) => true,
            (Self::Double, Value::Real(_) | Value::Integer(_)) => true,
            (Self::Text | Self::Date | Self::DateTime, Value::Text(_)) => true,
            (Self::Blob, Value::Blob(_)) => true,
            _ => false,
        }
    }
}

/// Attribute column definition of a feature table.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
}

impl ColumnSpec {
    /// A nullable, non-key column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            primary_key: false,
        }
    }

    /// The integer primary key column of a feature table.
    pub fn primary_key(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Integer,
            nullable: false,
            primary_key: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Z/M flag of a geometry column, as stored in `gpkg_geometry_columns`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum ZmFlag {
    #[default]
    Prohibited = 0,
    Mandatory = 1,
    Optional = 2,
}

impl ZmFlag {
    /// Whether a geometry that does (or does not) carry the axis satisfies the flag.
    pub fn allows(self, present: bool) -> bool {
        match self {
            Self::Prohibited => !present,
            Self::Mandatory => present,
            Self::Optional => true,
        }
    }
}

/// Owned dynamic value of a row column.
///
/// Mirrors SQLite's dynamic typing, plus a decoded geometry for the
/// geometry column.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Geometry(GeometryValue),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
            Self::Geometry(_) => "geometry",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_geometry(&self) -> Option<&GeometryValue> {
        match self {
            Self::Geometry(geometry) => Some(geometry),
            _ => None,
        }
    }
}

/// Text that is not valid UTF-8 is kept as `Blob` so no bytes are lost.
impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(v) => Self::Integer(v),
            ValueRef::Real(v) => Self::Real(v),
            ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => Self::Text(text.to_string()),
                Err(_) => {
                    log::debug!("non UTF-8 text of {} bytes read as a blob", bytes.len());
                    Self::Blob(bytes.to_vec())
                }
            },
            ValueRef::Blob(bytes) => Self::Blob(bytes.to_vec()),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl From<GeometryValue> for Value {
    fn from(value: GeometryValue) -> Self {
        Self::Geometry(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl TryFrom<Value> for i64 {
    type Error = GpkgError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Integer(v) => Ok(v),
            other => Err(GpkgError::ValueTypeMismatch {
                expected: "integer",
                actual: other.type_name(),
            }),
        }
    }
}

impl TryFrom<Value> for i32 {
    type Error = GpkgError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let v = i64::try_from(value)?;
        i32::try_from(v).map_err(|_| GpkgError::ValueOutOfRange { target: "i32" })
    }
}

impl TryFrom<Value> for f64 {
    type Error = GpkgError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Real(v) => Ok(v),
            Value::Integer(v) => Ok(v as f64),
            other => Err(GpkgError::ValueTypeMismatch {
                expected: "real",
                actual: other.type_name(),
            }),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = GpkgError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Integer(v) => Ok(v != 0),
            other => Err(GpkgError::ValueTypeMismatch {
                expected: "boolean",
                actual: other.type_name(),
            }),
        }
    }
}

impl TryFrom<Value> for String {
    type Error = GpkgError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Text(v) => Ok(v),
            other => Err(GpkgError::ValueTypeMismatch {
                expected: "text",
                actual: other.type_name(),
            }),
        }
    }
}

impl TryFrom<Value> for Vec<u8> {
    type Error = GpkgError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Blob(v) => Ok(v),
            other => Err(GpkgError::ValueTypeMismatch {
                expected: "blob",
                actual: other.type_name(),
            }),
        }
    }
}

impl TryFrom<Value> for GeometryValue {
    type Error = GpkgError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Geometry(v) => Ok(v),
            other => Err(GpkgError::ValueTypeMismatch {
                expected: "geometry",
                actual: other.type_name(),
            }),
        }
    }
}

// `NULL` converts to `None`; anything else goes through the plain conversion.
macro_rules! impl_try_from_value_for_option {
    ($($ty:ty),*) => {
        $(
            impl TryFrom<Value> for Option<$ty> {
                type Error = GpkgError;

                fn try_from(value: Value) -> Result<Self, Self::Error> {
                    match value {
                        Value::Null => Ok(None),
                        other => <$ty>::try_from(other).map(Some),
                    }
                }
            }
        )*
    };
}

impl_try_from_value_for_option!(i64, i32, f64, bool, String, Vec<u8>, GeometryValue);

/// Settings carried by a `Gpkg` handle.
#[derive(Clone, Debug, PartialEq)]
pub struct GpkgConfig {
    /// Envelope written into geometry blobs on insert and update.
    pub envelope: EnvelopePolicy,
    /// Byte order of written geometry blobs.
    pub byte_order: ByteOrder,
    /// Rows fetched per query by the lazy row sequence. 0 is treated as 1.
    pub read_page_size: u32,
}

impl Default for GpkgConfig {
    fn default() -> Self {
        Self {
            envelope: EnvelopePolicy::Xy,
            byte_order: ByteOrder::LittleEndian,
            read_page_size: 256,
        }
    }
}

impl GpkgConfig {
    pub(crate) fn page_size(&self) -> u32 {
        self.read_page_size.max(1)
    }
}

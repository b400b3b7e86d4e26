use crate::geometry::Dimension;
use std::error::Error;
use std::fmt;

/// Crate error type for GeoPackage operations.
#[derive(Debug)]
pub enum GpkgError {
    /// Wraps errors returned by `rusqlite`.
    Sql(rusqlite::Error),
    /// Wraps errors returned by the `wkb` crate.
    Wkb(wkb::error::WkbError),
    /// Bad magic, unknown version, or otherwise unreadable GeoPackage binary header.
    MalformedHeader(String),
    /// Envelope contents indicator outside 0..=4.
    UnsupportedEnvelopeCode(u8),
    /// Blob holds fewer bytes than the header or payload promises.
    TruncatedPayload { len: usize, required: usize },
    /// A WKB geometry type code (or type name) outside the recognized set.
    UnsupportedGeometryType(String),
    /// Coordinates or child geometries disagree with the declared dimension.
    DimensionMismatch {
        expected: Dimension,
        found: Dimension,
    },
    /// Invalid `z` / `m` flags in GeoPackage metadata.
    InvalidDimension { z: i8, m: i8 },
    /// Referenced `srs_id` does not exist in the spatial reference registry.
    UnknownSrsId { srs_id: i32 },
    /// The `srs_id` is already registered with a different definition.
    DuplicateSrsId { srs_id: i32 },
    /// A feature table with the same name is already registered.
    DuplicateTable { table_name: String },
    /// No feature table with this name is registered.
    UnknownTable { table_name: String },
    /// Declared geometry type is not one of the GeoPackage core geometry types.
    InvalidGeometryType(String),
    /// Table has no integer primary key column.
    MissingPrimaryKey { table_name: String },
    /// Table declares more than one primary key column.
    CompositePrimaryKeyUnsupported { table_name: String },
    /// Two columns of one table share a name.
    DuplicateColumn { table_name: String, column: String },
    /// A column type declared in SQLite metadata is not supported by this crate.
    UnsupportedColumnType {
        column: String,
        declared_type: String,
    },
    /// System tables reference tables or SRS ids missing from the store.
    InconsistentMetadata(String),
    /// A row does not fit the registered table schema.
    SchemaViolation(String),
    /// No row with the given primary key.
    RowNotFound { table_name: String, id: i64 },
    /// A decoded geometry carries a different SRS id than its table declares.
    SrsMismatch {
        table_name: String,
        expected: i32,
        found: i32,
    },
    /// Dynamic `Value` type did not match the expected conversion target.
    ValueTypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    /// Numeric conversion failed because the value is out of range.
    ValueOutOfRange { target: &'static str },
    /// Write attempted through a read-only container handle.
    ReadOnly,
    Message(String),
}

impl fmt::Display for GpkgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql(err) => write!(f, "{err}"),
            Self::Wkb(err) => write!(f, "{err}"),
            Self::MalformedHeader(reason) => write!(f, "malformed gpkg geometry header: {reason}"),
            Self::UnsupportedEnvelopeCode(code) => {
                write!(f, "unsupported gpkg geometry envelope code: {code}")
            }
            Self::TruncatedPayload { len, required } => write!(
                f,
                "truncated gpkg geometry: got {len} bytes, required {required}"
            ),
            Self::UnsupportedGeometryType(ty) => write!(f, "unsupported geometry type: {ty}"),
            Self::DimensionMismatch { expected, found } => write!(
                f,
                "geometry dimension mismatch: expected {expected:?}, found {found:?}"
            ),
            Self::InvalidDimension { z, m } => {
                write!(f, "invalid geometry dimension flags (z={z}, m={m})")
            }
            Self::UnknownSrsId { srs_id } => {
                write!(f, "srs_id {srs_id} not found in gpkg_spatial_ref_sys")
            }
            Self::DuplicateSrsId { srs_id } => write!(
                f,
                "srs_id {srs_id} is already registered with a different definition"
            ),
            Self::DuplicateTable { table_name } => {
                write!(f, "feature table already exists: {table_name}")
            }
            Self::UnknownTable { table_name } => write!(f, "no such feature table: {table_name}"),
            Self::InvalidGeometryType(ty) => write!(f, "invalid geometry type: {ty}"),
            Self::MissingPrimaryKey { table_name } => {
                write!(f, "no integer primary key column found for table: {table_name}")
            }
            Self::CompositePrimaryKeyUnsupported { table_name } => write!(
                f,
                "composite primary keys are not supported for table: {table_name}"
            ),
            Self::DuplicateColumn { table_name, column } => {
                write!(f, "duplicate column '{column}' in table: {table_name}")
            }
            Self::UnsupportedColumnType {
                column,
                declared_type,
            } => write!(
                f,
                "unsupported column type for column '{column}': {declared_type}"
            ),
            Self::InconsistentMetadata(reason) => write!(f, "inconsistent metadata: {reason}"),
            Self::SchemaViolation(reason) => write!(f, "schema violation: {reason}"),
            Self::RowNotFound { table_name, id } => {
                write!(f, "no row with primary key {id} in table: {table_name}")
            }
            Self::SrsMismatch {
                table_name,
                expected,
                found,
            } => write!(
                f,
                "geometry in table {table_name} has srs_id {found}, table declares {expected}"
            ),
            Self::ValueTypeMismatch { expected, actual } => {
                write!(f, "expected {expected}, got {actual}")
            }
            Self::ValueOutOfRange { target } => write!(f, "value out of range for {target}"),
            Self::ReadOnly => write!(f, "operation not allowed on read-only connection"),
            Self::Message(message) => write!(f, "{message}"),
        }
    }
}

impl Error for GpkgError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sql(err) => Some(err),
            Self::Wkb(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for GpkgError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sql(err)
    }
}

impl From<wkb::error::WkbError> for GpkgError {
    fn from(err: wkb::error::WkbError) -> Self {
        Self::Wkb(err)
    }
}

pub type Result<T> = std::result::Result<T, GpkgError>;

use crate::error::GpkgError;
use crate::geometry::GeometryType;
use crate::types::{ColumnType, ZmFlag};

#[inline]
pub(crate) fn geometry_type_to_str(geometry_type: GeometryType) -> &'static str {
    match geometry_type {
        GeometryType::Geometry => "GEOMETRY",
        GeometryType::Point => "POINT",
        GeometryType::LineString => "LINESTRING",
        GeometryType::Polygon => "POLYGON",
        GeometryType::MultiPoint => "MULTIPOINT",
        GeometryType::MultiLineString => "MULTILINESTRING",
        GeometryType::MultiPolygon => "MULTIPOLYGON",
        GeometryType::GeometryCollection => "GEOMETRYCOLLECTION",
    }
}

#[inline]
pub(crate) fn geometry_type_from_str(geometry_type_str: &str) -> Result<GeometryType, GpkgError> {
    let s = geometry_type_str.trim();
    if s.eq_ignore_ascii_case("GEOMETRY") {
        Ok(GeometryType::Geometry)
    } else if s.eq_ignore_ascii_case("POINT") {
        Ok(GeometryType::Point)
    } else if s.eq_ignore_ascii_case("LINESTRING") {
        Ok(GeometryType::LineString)
    } else if s.eq_ignore_ascii_case("POLYGON") {
        Ok(GeometryType::Polygon)
    } else if s.eq_ignore_ascii_case("MULTIPOINT") {
        Ok(GeometryType::MultiPoint)
    } else if s.eq_ignore_ascii_case("MULTILINESTRING") {
        Ok(GeometryType::MultiLineString)
    } else if s.eq_ignore_ascii_case("MULTIPOLYGON") {
        Ok(GeometryType::MultiPolygon)
    } else if s.eq_ignore_ascii_case("GEOMETRYCOLLECTION") {
        Ok(GeometryType::GeometryCollection)
    } else {
        Err(GpkgError::InvalidGeometryType(geometry_type_str.to_string()))
    }
}

#[inline]
pub(crate) fn zm_flags_to_i8(z: ZmFlag, m: ZmFlag) -> (i8, i8) {
    (z as i8, m as i8)
}

#[inline]
pub(crate) fn zm_flags_from_i8(z: i8, m: i8) -> Result<(ZmFlag, ZmFlag), GpkgError> {
    let flag = |value: i8| match value {
        0 => Some(ZmFlag::Prohibited),
        1 => Some(ZmFlag::Mandatory),
        2 => Some(ZmFlag::Optional),
        _ => None,
    };
    match (flag(z), flag(m)) {
        (Some(z), Some(m)) => Ok((z, m)),
        _ => Err(GpkgError::InvalidDimension { z, m }),
    }
}

#[inline]
pub(crate) fn column_type_to_str(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Boolean => "BOOLEAN",
        ColumnType::Integer => "INTEGER",
        ColumnType::Double => "DOUBLE",
        ColumnType::Text => "TEXT",
        ColumnType::Blob => "BLOB",
        ColumnType::Date => "DATE",
        ColumnType::DateTime => "DATETIME",
    }
}

/// Map a declared SQLite column type to a logical column type.
///
/// Length-limited declarations such as `TEXT(38)` or `BLOB(16)` map to their
/// base type.
#[inline]
pub(crate) fn column_type_from_str(column_type_str: &str) -> Option<ColumnType> {
    let s = match column_type_str.split_once('(') {
        Some((base, _)) => base.trim(),
        None => column_type_str.trim(),
    };
    if s.eq_ignore_ascii_case("TINYINT")
        || s.eq_ignore_ascii_case("SMALLINT")
        || s.eq_ignore_ascii_case("MEDIUMINT")
        || s.eq_ignore_ascii_case("INT")
        || s.eq_ignore_ascii_case("INTEGER")
    {
        Some(ColumnType::Integer)
    } else if s.eq_ignore_ascii_case("DOUBLE")
        || s.eq_ignore_ascii_case("FLOAT")
        || s.eq_ignore_ascii_case("REAL")
    {
        Some(ColumnType::Double)
    } else if s.eq_ignore_ascii_case("TEXT") {
        Some(ColumnType::Text)
    } else if s.eq_ignore_ascii_case("BOOLEAN") {
        Some(ColumnType::Boolean)
    } else if s.eq_ignore_ascii_case("BLOB") {
        Some(ColumnType::Blob)
    } else if s.eq_ignore_ascii_case("DATE") {
        Some(ColumnType::Date)
    } else if s.eq_ignore_ascii_case("DATETIME") {
        Some(ColumnType::DateTime)
    } else {
        None
    }
}

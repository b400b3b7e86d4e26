//! WKB payload handling on top of the `wkb` crate.
//!
//! The `wkb` reader trusts element counts, recurses once per nested
//! collection, and reads the members of a multi geometry with the byte order
//! and dimension of their parent. `scan` walks the payload first, without
//! recursion, and rejects anything that would break those assumptions. Only
//! then is the buffer handed to `wkb::reader::Wkb`.

use super::{ByteOrder, Dimension, Geometry, GeometryType, GeometryValue};
use crate::error::{GpkgError, Result};
use wkb::Endianness;
use wkb::error::WkbError;
use wkb::reader::Wkb;
use wkb::writer::WriteOptions;

/// Deepest nesting of multi geometries and collections accepted on read and write.
pub(crate) const MAX_NESTING_DEPTH: usize = 64;

const EWKB_FLAG_Z: u32 = 0x8000_0000;
const EWKB_FLAG_M: u32 = 0x4000_0000;
const EWKB_FLAG_SRID: u32 = 0x2000_0000;
const EWKB_FLAGS: u32 = EWKB_FLAG_Z | EWKB_FLAG_M | EWKB_FLAG_SRID;

// byte order marker + type code
const HEADER_LEN: usize = 5;
const COUNT_LEN: usize = 4;
const SRID_LEN: usize = 4;

/// Byte order, type and dimension announced by one WKB geometry header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct WkbHeader {
    pub(crate) byte_order: ByteOrder,
    pub(crate) geometry_type: GeometryType,
    pub(crate) dimension: Dimension,
    pub(crate) has_srid: bool,
}

impl WkbHeader {
    /// Read the header of the geometry starting at `offset`.
    pub(crate) fn read(buf: &[u8], offset: usize) -> Result<Self> {
        let byte_order = match buf.get(offset) {
            Some(0) => ByteOrder::BigEndian,
            Some(1) => ByteOrder::LittleEndian,
            Some(other) => {
                return Err(GpkgError::MalformedHeader(format!(
                    "invalid wkb byte order marker {other:#04x}"
                )));
            }
            None => {
                return Err(GpkgError::TruncatedPayload {
                    len: buf.len(),
                    required: offset + 1,
                });
            }
        };
        let code = read_u32(buf, offset + 1, byte_order)?;
        let (geometry_type, dimension, has_srid) = split_type_code(code)?;
        Ok(Self {
            byte_order,
            geometry_type,
            dimension,
            has_srid,
        })
    }

    fn len(&self) -> usize {
        if self.has_srid {
            HEADER_LEN + SRID_LEN
        } else {
            HEADER_LEN
        }
    }
}

/// Split an ISO (e.g. 1003 = Polygon Z) or extended (flag bits) WKB type
/// code into type, dimension and the embedded SRID flag.
pub(crate) fn split_type_code(code: u32) -> Result<(GeometryType, Dimension, bool)> {
    let unsupported = || GpkgError::UnsupportedGeometryType(format!("wkb type code {code}"));

    let base = code & !EWKB_FLAGS;
    let dimension = match base / 1000 {
        0 => Dimension::from_flags(code & EWKB_FLAG_Z != 0, code & EWKB_FLAG_M != 0),
        // ISO dimension offsets and extended flags do not mix
        _ if code & EWKB_FLAGS != 0 => return Err(unsupported()),
        1 => Dimension::Xyz,
        2 => Dimension::Xym,
        3 => Dimension::Xyzm,
        _ => return Err(unsupported()),
    };
    let geometry_type = match base % 1000 {
        1 => GeometryType::Point,
        2 => GeometryType::LineString,
        3 => GeometryType::Polygon,
        4 => GeometryType::MultiPoint,
        5 => GeometryType::MultiLineString,
        6 => GeometryType::MultiPolygon,
        7 => GeometryType::GeometryCollection,
        _ => return Err(unsupported()),
    };
    Ok((geometry_type, dimension, code & EWKB_FLAG_SRID != 0))
}

struct OpenContainer {
    header: WkbHeader,
    remaining: u32,
}

/// Walk a whole WKB payload and return its top-level header together with
/// the number of bytes the geometry occupies.
pub(crate) fn scan(buf: &[u8]) -> Result<(WkbHeader, usize)> {
    let top = WkbHeader::read(buf, 0)?;
    let mut open: Vec<OpenContainer> = Vec::new();
    let mut offset = 0;

    loop {
        let header = WkbHeader::read(buf, offset)?;
        if let Some(parent) = open.last() {
            check_member(&parent.header, &header)?;
        }
        offset += header.len();

        let coord_len = coord_len(header.dimension);
        match header.geometry_type {
            GeometryType::Point => {
                offset += coord_len;
                ensure(buf, offset)?;
            }
            GeometryType::LineString => {
                offset = skip_coords(buf, offset, header.byte_order, coord_len)?;
            }
            GeometryType::Polygon => {
                let rings = read_count(buf, offset, header.byte_order, COUNT_LEN)?;
                offset += COUNT_LEN;
                for _ in 0..rings {
                    offset = skip_coords(buf, offset, header.byte_order, coord_len)?;
                }
            }
            GeometryType::MultiPoint
            | GeometryType::MultiLineString
            | GeometryType::MultiPolygon
            | GeometryType::GeometryCollection => {
                if open.len() >= MAX_NESTING_DEPTH {
                    return Err(too_deep());
                }
                let min_member_len = match header.geometry_type {
                    GeometryType::MultiPoint => HEADER_LEN + coord_len,
                    GeometryType::GeometryCollection => HEADER_LEN,
                    _ => HEADER_LEN + COUNT_LEN,
                };
                let count = read_count(buf, offset, header.byte_order, min_member_len)?;
                offset += COUNT_LEN;
                if count > 0 {
                    open.push(OpenContainer {
                        header,
                        remaining: count,
                    });
                    continue;
                }
            }
            GeometryType::Geometry => {
                return Err(GpkgError::UnsupportedGeometryType(
                    "generic GEOMETRY has no wkb encoding".to_string(),
                ));
            }
        }

        // one geometry is complete; close every container it completes
        loop {
            let Some(parent) = open.last_mut() else {
                return Ok((top, offset));
            };
            parent.remaining -= 1;
            if parent.remaining > 0 {
                break;
            }
            open.pop();
        }
    }
}

fn check_member(parent: &WkbHeader, member: &WkbHeader) -> Result<()> {
    if member.dimension != parent.dimension {
        return Err(GpkgError::DimensionMismatch {
            expected: parent.dimension,
            found: member.dimension,
        });
    }
    let expected = match parent.geometry_type {
        GeometryType::MultiPoint => GeometryType::Point,
        GeometryType::MultiLineString => GeometryType::LineString,
        GeometryType::MultiPolygon => GeometryType::Polygon,
        _ => return Ok(()),
    };
    if member.geometry_type != expected {
        return Err(GpkgError::UnsupportedGeometryType(format!(
            "{} member in {}",
            member.geometry_type.name(),
            parent.geometry_type.name()
        )));
    }
    // members of a multi geometry are read with the parent's layout
    if member.byte_order != parent.byte_order || member.has_srid {
        return Err(GpkgError::MalformedHeader(format!(
            "{} member with its own byte order or srid",
            parent.geometry_type.name()
        )));
    }
    Ok(())
}

/// Reject geometries nested deeper than the reader accepts.
pub(crate) fn check_nesting(geometry: &Geometry) -> Result<()> {
    let mut pending = vec![(geometry, 0usize)];
    while let Some((geometry, enclosing)) = pending.pop() {
        let depth = match geometry {
            Geometry::Point(_) | Geometry::LineString(_) | Geometry::Polygon(_) => enclosing,
            Geometry::MultiPoint(_) | Geometry::MultiLineString(_) | Geometry::MultiPolygon(_) => {
                enclosing + 1
            }
            Geometry::GeometryCollection(members) => {
                pending.extend(members.iter().map(|member| (member, enclosing + 1)));
                enclosing + 1
            }
        };
        if depth > MAX_NESTING_DEPTH {
            return Err(too_deep());
        }
    }
    Ok(())
}

pub(crate) fn too_deep() -> GpkgError {
    GpkgError::MalformedHeader(format!(
        "geometries nested deeper than {MAX_NESTING_DEPTH} levels"
    ))
}

/// Decode a WKB payload. The SRS id of the result is undefined (0).
pub(crate) fn decode(buf: &[u8]) -> Result<GeometryValue> {
    scan(buf)?;
    let wkb = Wkb::try_new(buf).map_err(decode_error)?;
    GeometryValue::from_geometry(&wkb)
}

/// Append `value` as ISO WKB in the given byte order.
pub(crate) fn encode(buf: &mut Vec<u8>, value: &GeometryValue, byte_order: ByteOrder) -> Result<()> {
    check_nesting(&value.geometry)?;

    let mut found = None;
    value.geometry.visit_coords(&mut |coord| {
        if found.is_none() && coord.dimension() != value.dimension {
            found = Some(coord.dimension());
        }
    });
    if let Some(found) = found {
        return Err(GpkgError::DimensionMismatch {
            expected: value.dimension,
            found,
        });
    }

    let options = WriteOptions {
        endianness: match byte_order {
            ByteOrder::BigEndian => Endianness::BigEndian,
            ByteOrder::LittleEndian => Endianness::LittleEndian,
        },
    };
    wkb::writer::write_geometry(buf, &value.view(), &options)?;
    Ok(())
}

fn decode_error(err: WkbError) -> GpkgError {
    match err {
        WkbError::IncorrectType(_) | WkbError::NotYetImplemented(_) => {
            GpkgError::UnsupportedGeometryType(err.to_string())
        }
        other => GpkgError::MalformedHeader(other.to_string()),
    }
}

fn coord_len(dimension: Dimension) -> usize {
    match dimension {
        Dimension::Xy => 16,
        Dimension::Xyz | Dimension::Xym => 24,
        Dimension::Xyzm => 32,
    }
}

fn ensure(buf: &[u8], end: usize) -> Result<()> {
    if end > buf.len() {
        return Err(GpkgError::TruncatedPayload {
            len: buf.len(),
            required: end,
        });
    }
    Ok(())
}

fn read_u32(buf: &[u8], offset: usize, order: ByteOrder) -> Result<u32> {
    ensure(buf, offset + 4)?;
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    Ok(match order {
        ByteOrder::BigEndian => u32::from_be_bytes(bytes),
        ByteOrder::LittleEndian => u32::from_le_bytes(bytes),
    })
}

// A corrupt count must fail here, before the `wkb` reader sizes a buffer by it.
fn read_count(buf: &[u8], offset: usize, order: ByteOrder, min_item_len: usize) -> Result<u32> {
    let count = read_u32(buf, offset, order)?;
    let end = (offset + COUNT_LEN).saturating_add((count as usize).saturating_mul(min_item_len));
    ensure(buf, end)?;
    Ok(count)
}

fn skip_coords(buf: &[u8], offset: usize, order: ByteOrder, coord_len: usize) -> Result<usize> {
    let count = read_count(buf, offset, order, coord_len)?;
    Ok(offset + COUNT_LEN + count as usize * coord_len)
}

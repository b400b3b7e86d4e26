//! GeoPackage binary geometry encoding.
//!
//! ```text
//! magic "GP" | version | flags | srs_id (i32) | envelope (0/4/6/6/8 f64) | WKB
//! ```
//!
//! Flags: bit 0 byte order (1 = little endian), bits 1-3 envelope code,
//! bit 4 empty geometry, bit 5 extended geometry type, bits 6-7 reserved.
// cf. https://www.geopackage.org/spec140/index.html#gpb_format

use super::payload::{self, WkbHeader};
use super::{Coord, Dimension, Geometry, GeometryValue};
use crate::error::{GpkgError, Result};

const MAGIC: [u8; 2] = [0x47, 0x50];
const VERSION: u8 = 0;

const FLAG_LITTLE_ENDIAN: u8 = 0b0000_0001;
const FLAG_ENVELOPE_MASK: u8 = 0b0000_1110;
const FLAG_EMPTY: u8 = 0b0001_0000;
const FLAG_EXTENDED: u8 = 0b0010_0000;
const FLAG_RESERVED: u8 = 0b1100_0000;

/// Length of the header without envelope.
pub(crate) const FIXED_HEADER_LEN: usize = 8;

/// Forward-only reader over the header bytes that reports short input as
/// `TruncatedPayload`.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(GpkgError::TruncatedPayload {
                len: self.buf.len(),
                required: self.pos + n,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(self.take(N)?);
        Ok(bytes)
    }

    fn read_i32(&mut self, order: ByteOrder) -> Result<i32> {
        let bytes = self.read_array()?;
        Ok(match order {
            ByteOrder::BigEndian => i32::from_be_bytes(bytes),
            ByteOrder::LittleEndian => i32::from_le_bytes(bytes),
        })
    }

    fn read_f64(&mut self, order: ByteOrder) -> Result<f64> {
        let bytes = self.read_array()?;
        Ok(match order {
            ByteOrder::BigEndian => f64::from_be_bytes(bytes),
            ByteOrder::LittleEndian => f64::from_le_bytes(bytes),
        })
    }
}

/// Byte order of multi-byte fields in the header and WKB payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ByteOrder {
    BigEndian,
    #[default]
    LittleEndian,
}

/// Which envelope axes to store when encoding.
///
/// Z and M ranges are only written when the geometry carries that
/// dimension, so the resulting envelope code is the smallest one that covers
/// both the request and the data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EnvelopePolicy {
    None,
    #[default]
    Xy,
    Xyz,
    Xym,
    Xyzm,
}

/// Bounding box stored in a GeoPackage binary header.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Envelope {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub z_range: Option<(f64, f64)>,
    pub m_range: Option<(f64, f64)>,
}

impl Envelope {
    pub(crate) fn from_coord(coord: &Coord, dimension: Dimension) -> Self {
        let z_range = coord.z.filter(|_| dimension.has_z()).map(|z| (z, z));
        let m_range = coord.m.filter(|_| dimension.has_m()).map(|m| (m, m));
        Self {
            min_x: coord.x,
            max_x: coord.x,
            min_y: coord.y,
            max_y: coord.y,
            z_range,
            m_range,
        }
    }

    pub(crate) fn expand(&mut self, coord: &Coord) {
        self.min_x = self.min_x.min(coord.x);
        self.max_x = self.max_x.max(coord.x);
        self.min_y = self.min_y.min(coord.y);
        self.max_y = self.max_y.max(coord.y);
        if let (Some((min, max)), Some(z)) = (self.z_range.as_mut(), coord.z) {
            *min = min.min(z);
            *max = max.max(z);
        }
        if let (Some((min, max)), Some(m)) = (self.m_range.as_mut(), coord.m) {
            *min = min.min(m);
            *max = max.max(m);
        }
    }

    /// Envelope contents indicator code (1..=4).
    pub fn code(&self) -> u8 {
        match (self.z_range.is_some(), self.m_range.is_some()) {
            (false, false) => 1,
            (true, false) => 2,
            (false, true) => 3,
            (true, true) => 4,
        }
    }

    /// Values in storage order: `[minx, maxx, miny, maxy, (minz, maxz), (minm, maxm)]`.
    pub fn values(&self) -> Vec<f64> {
        let mut values = vec![self.min_x, self.max_x, self.min_y, self.max_y];
        if let Some((min, max)) = self.z_range {
            values.extend([min, max]);
        }
        if let Some((min, max)) = self.m_range {
            values.extend([min, max]);
        }
        values
    }

    fn restrict(self, policy: EnvelopePolicy) -> Option<Self> {
        match policy {
            EnvelopePolicy::None => None,
            EnvelopePolicy::Xy => Some(Self {
                z_range: None,
                m_range: None,
                ..self
            }),
            EnvelopePolicy::Xyz => Some(Self {
                m_range: None,
                ..self
            }),
            EnvelopePolicy::Xym => Some(Self {
                z_range: None,
                ..self
            }),
            EnvelopePolicy::Xyzm => Some(self),
        }
    }
}

// Number of envelope bytes for an envelope code.
fn envelope_len(code: u8) -> Result<usize> {
    match code {
        0 => Ok(0),
        1 => Ok(32),
        2 | 3 => Ok(48),
        4 => Ok(64),
        _ => Err(GpkgError::UnsupportedEnvelopeCode(code)),
    }
}

/// Parsed GeoPackage binary header.
#[derive(Clone, Debug, PartialEq)]
pub struct GpbHeader {
    pub version: u8,
    pub byte_order: ByteOrder,
    pub empty: bool,
    pub extended: bool,
    pub srs_id: i32,
    pub envelope: Option<Envelope>,
}

impl GpbHeader {
    /// Parse only the header of a GeoPackage geometry blob.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Self::read(&mut Cursor::new(bytes))
    }

    fn read(cursor: &mut Cursor<'_>) -> Result<Self> {
        let available = cursor.remaining();
        let magic = cursor.take(available.min(MAGIC.len()))?;
        if magic != &MAGIC[..magic.len()] {
            return Err(GpkgError::MalformedHeader(format!("bad magic {magic:02x?}")));
        }
        if magic.len() < MAGIC.len() {
            return Err(GpkgError::TruncatedPayload {
                len: available,
                required: FIXED_HEADER_LEN,
            });
        }

        let version = cursor.read_u8()?;
        if version != VERSION {
            return Err(GpkgError::MalformedHeader(format!(
                "unsupported version {version}"
            )));
        }

        let flags = cursor.read_u8()?;
        if flags & FLAG_RESERVED != 0 {
            return Err(GpkgError::MalformedHeader(format!(
                "reserved flag bits set in {flags:#04x}"
            )));
        }
        let byte_order = if flags & FLAG_LITTLE_ENDIAN != 0 {
            ByteOrder::LittleEndian
        } else {
            ByteOrder::BigEndian
        };
        let envelope_code = (flags & FLAG_ENVELOPE_MASK) >> 1;
        envelope_len(envelope_code)?;

        let srs_id = cursor.read_i32(byte_order)?;
        let envelope = read_envelope(cursor, envelope_code, byte_order)?;

        Ok(Self {
            version,
            byte_order,
            empty: flags & FLAG_EMPTY != 0,
            extended: flags & FLAG_EXTENDED != 0,
            srs_id,
            envelope,
        })
    }

    pub fn envelope_code(&self) -> u8 {
        self.envelope.as_ref().map_or(0, Envelope::code)
    }

    pub fn flags(&self) -> u8 {
        let mut flags = self.envelope_code() << 1;
        if self.byte_order == ByteOrder::LittleEndian {
            flags |= FLAG_LITTLE_ENDIAN;
        }
        if self.empty {
            flags |= FLAG_EMPTY;
        }
        if self.extended {
            flags |= FLAG_EXTENDED;
        }
        flags
    }

    /// Header length in bytes, envelope included.
    pub fn encoded_len(&self) -> usize {
        FIXED_HEADER_LEN + self.envelope.as_ref().map_or(0, |env| env.values().len() * 8)
    }

    fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&MAGIC);
        buf.push(self.version);
        buf.push(self.flags());
        match self.byte_order {
            ByteOrder::BigEndian => buf.extend_from_slice(&self.srs_id.to_be_bytes()),
            ByteOrder::LittleEndian => buf.extend_from_slice(&self.srs_id.to_le_bytes()),
        }
        for value in self.envelope.iter().flat_map(Envelope::values) {
            match self.byte_order {
                ByteOrder::BigEndian => buf.extend_from_slice(&value.to_be_bytes()),
                ByteOrder::LittleEndian => buf.extend_from_slice(&value.to_le_bytes()),
            }
        }
    }
}

fn read_envelope(cursor: &mut Cursor<'_>, code: u8, order: ByteOrder) -> Result<Option<Envelope>> {
    if code == 0 {
        return Ok(None);
    }

    let min_x = cursor.read_f64(order)?;
    let max_x = cursor.read_f64(order)?;
    let min_y = cursor.read_f64(order)?;
    let max_y = cursor.read_f64(order)?;
    let z_range = if matches!(code, 2 | 4) {
        Some((cursor.read_f64(order)?, cursor.read_f64(order)?))
    } else {
        None
    };
    let m_range = if matches!(code, 3 | 4) {
        Some((cursor.read_f64(order)?, cursor.read_f64(order)?))
    } else {
        None
    };

    Ok(Some(Envelope {
        min_x,
        max_x,
        min_y,
        max_y,
        z_range,
        m_range,
    }))
}

/// Decode a GeoPackage geometry blob.
///
/// The returned value carries the SRS id found in the header. For blobs with
/// the empty bit set only the WKB type is read, and an empty geometry of that
/// type is returned. The WKB payload may be ISO or extended WKB.
pub fn decode_gpkg_geometry(bytes: &[u8]) -> Result<GeometryValue> {
    let mut cursor = Cursor::new(bytes);
    let header = GpbHeader::read(&mut cursor)?;
    let wkb = cursor.rest();
    let wkb_header = WkbHeader::read(wkb, 0)?;

    // The extended bit announces a non-core type, which a core type code contradicts.
    if header.extended {
        return Err(GpkgError::MalformedHeader(format!(
            "extended geometry flag set on core type {}",
            wkb_header.geometry_type.name()
        )));
    }

    if header.empty {
        let geometry = Geometry::empty(wkb_header.geometry_type).ok_or_else(|| {
            GpkgError::UnsupportedGeometryType(wkb_header.geometry_type.name().to_string())
        })?;
        return Ok(GeometryValue {
            geometry,
            dimension: wkb_header.dimension,
            srs_id: header.srs_id,
        });
    }

    Ok(payload::decode(wkb)?.with_srs_id(header.srs_id))
}

/// Encode a geometry as a little-endian GeoPackage geometry blob.
pub fn encode_gpkg_geometry(value: &GeometryValue, envelope: EnvelopePolicy) -> Result<Vec<u8>> {
    encode_gpkg_geometry_with(value, envelope, ByteOrder::LittleEndian)
}

/// Encode a geometry as a GeoPackage geometry blob in the given byte order.
pub fn encode_gpkg_geometry_with(
    value: &GeometryValue,
    envelope: EnvelopePolicy,
    byte_order: ByteOrder,
) -> Result<Vec<u8>> {
    payload::check_nesting(&value.geometry)?;
    let empty = value.is_empty();
    let envelope = if empty {
        None
    } else {
        value.envelope().and_then(|env| env.restrict(envelope))
    };
    let header = GpbHeader {
        version: VERSION,
        byte_order,
        empty,
        extended: false,
        srs_id: value.srs_id,
        envelope,
    };

    let mut buf = Vec::with_capacity(header.encoded_len() + 64);
    header.write(&mut buf);
    payload::encode(&mut buf, value, byte_order)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::{
        ByteOrder, EnvelopePolicy, FIXED_HEADER_LEN, GpbHeader, decode_gpkg_geometry,
        encode_gpkg_geometry, encode_gpkg_geometry_with,
    };
    use crate::Result;
    use crate::error::GpkgError;
    use crate::geometry::{Coord, Dimension, Geometry, GeometryType, GeometryValue};

    fn square(offset: f64) -> Vec<Coord> {
        vec![
            Coord::xy(offset, offset),
            Coord::xy(offset + 3.0, offset),
            Coord::xy(offset + 3.0, offset + 3.0),
            Coord::xy(offset, offset + 3.0),
            Coord::xy(offset, offset),
        ]
    }

    fn sample_values() -> Vec<GeometryValue> {
        let line = vec![Coord::xy(0.0, 0.0), Coord::xy(1.5, 1.0), Coord::xy(2.0, 0.5)];
        vec![
            GeometryValue::point(1.0, 2.0),
            GeometryValue::new(Geometry::LineString(line.clone())),
            GeometryValue::new(Geometry::Polygon(vec![square(0.0), square(1.0)])),
            GeometryValue::new(Geometry::MultiPoint(vec![Coord::xy(1.0, 1.0), Coord::xy(2.0, 2.0)])),
            GeometryValue::new(Geometry::MultiLineString(vec![
                line.clone(),
                vec![Coord::xy(-1.0, -1.0), Coord::xy(-2.0, -3.0)],
            ])),
            GeometryValue::new(Geometry::MultiPolygon(vec![vec![square(0.0)], vec![square(10.0)]])),
            GeometryValue::new(Geometry::GeometryCollection(vec![
                Geometry::Point(Some(Coord::xy(-1.0, -2.0))),
                Geometry::GeometryCollection(vec![
                    Geometry::LineString(line),
                    Geometry::Point(None),
                ]),
                Geometry::Polygon(vec![square(5.0)]),
            ])),
            GeometryValue::new(Geometry::Point(Some(Coord::xyz(1.0, 2.0, 3.0)))).with_srs_id(4326),
            GeometryValue::new(Geometry::LineString(vec![
                Coord::xym(0.0, 0.0, 5.0),
                Coord::xym(1.0, 1.0, 6.0),
            ]))
            .with_srs_id(-1),
            GeometryValue::new(Geometry::Polygon(vec![vec![
                Coord::xyzm(0.0, 0.0, 1.0, 10.0),
                Coord::xyzm(2.0, 0.0, 2.0, 11.0),
                Coord::xyzm(2.0, 2.0, 3.0, 12.0),
                Coord::xyzm(0.0, 0.0, 1.0, 10.0),
            ]])),
        ]
    }

    fn empty_values() -> Vec<GeometryValue> {
        [
            GeometryType::Point,
            GeometryType::LineString,
            GeometryType::Polygon,
            GeometryType::MultiPoint,
            GeometryType::MultiLineString,
            GeometryType::MultiPolygon,
            GeometryType::GeometryCollection,
        ]
        .into_iter()
        .filter_map(Geometry::empty)
        .map(|geometry| GeometryValue::new(geometry).with_srs_id(4326))
        .collect()
    }

    #[test]
    fn roundtrips_all_variants_in_both_byte_orders() -> Result<()> {
        for value in sample_values().into_iter().chain(empty_values()) {
            for order in [ByteOrder::LittleEndian, ByteOrder::BigEndian] {
                for policy in [EnvelopePolicy::None, EnvelopePolicy::Xyzm] {
                    let blob = encode_gpkg_geometry_with(&value, policy, order)?;
                    assert_eq!(decode_gpkg_geometry(&blob)?, value, "{value:?} {order:?}");
                }
            }
        }
        Ok(())
    }

    #[test]
    fn writes_header_layout() -> Result<()> {
        let value = GeometryValue::point(1.0, 2.0).with_srs_id(4326);
        let blob = encode_gpkg_geometry(&value, EnvelopePolicy::Xy)?;

        // little endian, envelope code 1
        assert_eq!(&blob[..4], &[0x47, 0x50, 0x00, 0x03]);
        assert_eq!(&blob[4..8], &4326i32.to_le_bytes());
        assert_eq!(&blob[8..16], &1.0f64.to_le_bytes());

        let blob = encode_gpkg_geometry_with(&value, EnvelopePolicy::None, ByteOrder::BigEndian)?;
        assert_eq!(&blob[..4], &[0x47, 0x50, 0x00, 0x00]);
        assert_eq!(&blob[4..8], &4326i32.to_be_bytes());
        assert_eq!(blob[8], 0x00); // WKB byte order marker follows directly
        Ok(())
    }

    #[test]
    fn envelope_codes_have_documented_sizes() -> Result<()> {
        let value = GeometryValue::new(Geometry::LineString(vec![
            Coord::xyzm(0.0, 5.0, -1.0, 100.0),
            Coord::xyzm(4.0, 1.0, 7.0, 50.0),
        ]));
        let payload_len = encode_gpkg_geometry(&value, EnvelopePolicy::None)?.len() - FIXED_HEADER_LEN;

        let cases = [
            (EnvelopePolicy::None, 0u8, 0usize),
            (EnvelopePolicy::Xy, 1, 4),
            (EnvelopePolicy::Xyz, 2, 6),
            (EnvelopePolicy::Xym, 3, 6),
            (EnvelopePolicy::Xyzm, 4, 8),
        ];
        for (policy, code, doubles) in cases {
            let blob = encode_gpkg_geometry(&value, policy)?;
            assert_eq!(blob.len(), FIXED_HEADER_LEN + doubles * 8 + payload_len);

            let header = GpbHeader::parse(&blob)?;
            assert_eq!(header.envelope_code(), code);
            assert_eq!(header.encoded_len(), FIXED_HEADER_LEN + doubles * 8);
            if let Some(envelope) = header.envelope {
                assert_eq!(envelope.values().len(), doubles);
                assert_eq!(
                    (envelope.min_x, envelope.max_x, envelope.min_y, envelope.max_y),
                    (0.0, 4.0, 1.0, 5.0)
                );
                if code == 2 || code == 4 {
                    assert_eq!(envelope.z_range, Some((-1.0, 7.0)));
                }
                if code == 3 || code == 4 {
                    assert_eq!(envelope.m_range, Some((50.0, 100.0)));
                }
            }
        }
        Ok(())
    }

    #[test]
    fn envelope_skips_axes_the_geometry_lacks() -> Result<()> {
        let blob = encode_gpkg_geometry(&GeometryValue::point(1.0, 1.0), EnvelopePolicy::Xyzm)?;
        assert_eq!(GpbHeader::parse(&blob)?.envelope_code(), 1);
        Ok(())
    }

    #[test]
    fn empty_geometry_sets_flag_without_envelope() -> Result<()> {
        let value = GeometryValue::new(Geometry::Polygon(Vec::new()));
        let blob = encode_gpkg_geometry(&value, EnvelopePolicy::Xy)?;
        let header = GpbHeader::parse(&blob)?;
        assert!(header.empty);
        assert_eq!(header.envelope, None);
        assert_eq!(blob[3], 0b0001_0001);
        Ok(())
    }

    #[test]
    fn empty_flag_ignores_payload_after_type() -> Result<()> {
        // empty bit set, then only a WKB header for an XYZ MultiPolygon
        let mut blob = vec![0x47, 0x50, 0x00, 0b0001_0001, 0, 0, 0, 0];
        blob.extend_from_slice(&[0x01, 0xEE, 0x03, 0x00, 0x00]);
        let value = decode_gpkg_geometry(&blob)?;
        assert_eq!(value.geometry, Geometry::MultiPolygon(Vec::new()));
        assert_eq!(value.dimension, Dimension::Xyz);
        Ok(())
    }

    #[test]
    fn rejects_bad_magic() {
        let mut blob = vec![0x00, 0x00, 0x00, 0x01, 0, 0, 0, 0];
        blob.extend_from_slice(&[0x01, 0x01, 0x00, 0x00, 0x00]);
        blob.extend_from_slice(&[0; 16]);
        assert!(matches!(
            decode_gpkg_geometry(&blob),
            Err(GpkgError::MalformedHeader(_))
        ));
        assert!(matches!(
            decode_gpkg_geometry(&[0x00]),
            Err(GpkgError::MalformedHeader(_))
        ));
    }

    #[test]
    fn rejects_unknown_version() {
        let blob = vec![0x47, 0x50, 0x01, 0x01, 0, 0, 0, 0];
        assert!(matches!(
            GpbHeader::parse(&blob),
            Err(GpkgError::MalformedHeader(_))
        ));
    }

    #[test]
    fn rejects_invalid_envelope_code() {
        let mut blob = vec![0x47, 0x50, 0x00, 0x0A, 0, 0, 0, 0];
        blob.extend_from_slice(&[0; 16]);
        assert!(matches!(
            decode_gpkg_geometry(&blob),
            Err(GpkgError::UnsupportedEnvelopeCode(5))
        ));
    }

    #[test]
    fn rejects_truncated_blobs() -> Result<()> {
        let value = GeometryValue::new(Geometry::Polygon(vec![square(0.0)]));
        let blob = encode_gpkg_geometry(&value, EnvelopePolicy::Xy)?;

        for cut in [1, 5, FIXED_HEADER_LEN + 8, blob.len() - 1] {
            let result = decode_gpkg_geometry(&blob[..cut]);
            assert!(
                matches!(result, Err(GpkgError::TruncatedPayload { .. })),
                "cut at {cut}: {result:?}"
            );
        }
        Ok(())
    }

    #[test]
    fn rejects_unknown_wkb_type() {
        let mut blob = vec![0x47, 0x50, 0x00, 0x01, 0, 0, 0, 0];
        blob.extend_from_slice(&[0x01, 0x11, 0x00, 0x00, 0x00]);
        blob.extend_from_slice(&[0; 16]);
        assert!(matches!(
            decode_gpkg_geometry(&blob),
            Err(GpkgError::UnsupportedGeometryType(_))
        ));
    }

    #[test]
    fn rejects_extended_flag_on_core_type() -> Result<()> {
        let mut blob = encode_gpkg_geometry(&GeometryValue::point(0.0, 0.0), EnvelopePolicy::None)?;
        blob[3] |= 0b0010_0000;
        assert!(GpbHeader::parse(&blob)?.extended);
        assert!(matches!(
            decode_gpkg_geometry(&blob),
            Err(GpkgError::MalformedHeader(_))
        ));
        Ok(())
    }
}

//! Translation between `GeometryValue` and other geometry models.
//!
//! Anything implementing `geo_traits::GeometryTrait<T = f64>` can be turned
//! into a `GeometryValue` (geo-types, wkt, the `wkb` reader, ...). Plain WKB
//! goes through the `wkb` crate's reader and writer.

use super::payload::{self, MAX_NESTING_DEPTH};
use super::{ByteOrder, Coord, Dimension, Geometry, GeometryValue, UNDEFINED_GEOGRAPHIC_SRS_ID};
use crate::error::{GpkgError, Result};
use geo_traits::{
    CoordTrait, Dimensions, GeometryCollectionTrait, GeometryTrait, LineStringTrait,
    MultiLineStringTrait, MultiPointTrait, MultiPolygonTrait, PointTrait, PolygonTrait,
};

impl GeometryValue {
    /// Convert any `geo_traits` geometry. The SRS id is left undefined (0).
    ///
    /// Collections nested deeper than 64 levels are rejected with
    /// `GpkgError::MalformedHeader`.
    ///
    /// Example:
    /// ```
    /// use geopackage::{Geometry, GeometryValue};
    ///
    /// let line = geo_types::LineString::from(vec![(0.0, 0.0), (1.0, 2.0)]);
    /// let value = GeometryValue::from_geometry(&line)?.with_srs_id(4326);
    /// assert!(matches!(value.geometry, Geometry::LineString(ref coords) if coords.len() == 2));
    /// # Ok::<(), geopackage::GpkgError>(())
    /// ```
    pub fn from_geometry<G: GeometryTrait<T = f64>>(geometry: &G) -> Result<Self> {
        let dimension = dimension_from_traits(geometry.dim())?;
        let geometry = convert_geometry(geometry, 0)?;

        let mut found = None;
        geometry.visit_coords(&mut |coord| {
            if found.is_none() && coord.dimension() != dimension {
                found = Some(coord.dimension());
            }
        });
        if let Some(found) = found {
            return Err(GpkgError::DimensionMismatch {
                expected: dimension,
                found,
            });
        }

        Ok(Self {
            geometry,
            dimension,
            srs_id: UNDEFINED_GEOGRAPHIC_SRS_ID,
        })
    }

    /// Convert a plain (ISO or extended) WKB geometry. This is the same
    /// payload reader `decode_gpkg_geometry` uses after the GeoPackage header.
    pub fn from_wkb(bytes: &[u8]) -> Result<Self> {
        payload::decode(bytes)
    }

    /// Write the geometry as little-endian ISO WKB, without GeoPackage header.
    pub fn to_wkb(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        payload::encode(&mut buf, self, ByteOrder::LittleEndian)?;
        Ok(buf)
    }
}

fn dimension_from_traits(dim: Dimensions) -> Result<Dimension> {
    match dim {
        Dimensions::Xy => Ok(Dimension::Xy),
        Dimensions::Xyz => Ok(Dimension::Xyz),
        Dimensions::Xym => Ok(Dimension::Xym),
        Dimensions::Xyzm => Ok(Dimension::Xyzm),
        Dimensions::Unknown(n) => Err(GpkgError::UnsupportedGeometryType(format!(
            "coordinates with {n} dimensions"
        ))),
    }
}

// `enclosing` counts the multi geometries and collections around `geometry`.
fn convert_geometry<G: GeometryTrait<T = f64>>(geometry: &G, enclosing: usize) -> Result<Geometry> {
    use geo_traits::GeometryType as GeoType;

    let is_container = matches!(
        geometry.as_type(),
        GeoType::MultiPoint(_)
            | GeoType::MultiLineString(_)
            | GeoType::MultiPolygon(_)
            | GeoType::GeometryCollection(_)
    );
    if is_container && enclosing >= MAX_NESTING_DEPTH {
        return Err(payload::too_deep());
    }

    let converted = match geometry.as_type() {
        GeoType::Point(point) => Geometry::Point(point.coord().map(|coord| convert_coord(&coord))),
        GeoType::LineString(line) => Geometry::LineString(convert_line_string(line)),
        GeoType::Polygon(polygon) => Geometry::Polygon(convert_polygon(polygon)),
        GeoType::MultiPoint(multi) => Geometry::MultiPoint(
            multi
                .points()
                .map(|point| {
                    // keep empty members so the member count survives; WKB stores them as NaN
                    point.coord().map_or_else(
                        || nan_coord(dimension_from_traits(point.dim()).unwrap_or_default()),
                        |coord| convert_coord(&coord),
                    )
                })
                .collect(),
        ),
        GeoType::MultiLineString(multi) => Geometry::MultiLineString(
            multi
                .line_strings()
                .map(|line| convert_line_string(&line))
                .collect(),
        ),
        GeoType::MultiPolygon(multi) => Geometry::MultiPolygon(
            multi
                .polygons()
                .map(|polygon| convert_polygon(&polygon))
                .collect(),
        ),
        GeoType::GeometryCollection(collection) => Geometry::GeometryCollection(
            collection
                .geometries()
                .map(|member| convert_geometry(&member, enclosing + 1))
                .collect::<Result<Vec<_>>>()?,
        ),
        GeoType::Rect(_) => return Err(GpkgError::UnsupportedGeometryType("RECT".to_string())),
        GeoType::Triangle(_) => {
            return Err(GpkgError::UnsupportedGeometryType("TRIANGLE".to_string()));
        }
        GeoType::Line(_) => return Err(GpkgError::UnsupportedGeometryType("LINE".to_string())),
    };
    Ok(converted)
}

fn convert_coord<C: CoordTrait<T = f64>>(coord: &C) -> Coord {
    let (x, y) = coord.x_y();
    match coord.dim() {
        Dimensions::Xyz => Coord::xyz(x, y, coord.nth_or_panic(2)),
        Dimensions::Xym => Coord::xym(x, y, coord.nth_or_panic(2)),
        Dimensions::Xyzm => Coord::xyzm(x, y, coord.nth_or_panic(2), coord.nth_or_panic(3)),
        Dimensions::Xy | Dimensions::Unknown(_) => Coord::xy(x, y),
    }
}

fn nan_coord(dimension: Dimension) -> Coord {
    Coord {
        x: f64::NAN,
        y: f64::NAN,
        z: dimension.has_z().then_some(f64::NAN),
        m: dimension.has_m().then_some(f64::NAN),
    }
}

fn convert_line_string<L: LineStringTrait<T = f64>>(line: &L) -> Vec<Coord> {
    line.coords().map(|coord| convert_coord(&coord)).collect()
}

fn convert_polygon<P: PolygonTrait<T = f64>>(polygon: &P) -> Vec<Vec<Coord>> {
    let mut rings = Vec::with_capacity(polygon.num_interiors() + 1);
    if let Some(exterior) = polygon.exterior() {
        rings.push(convert_line_string(&exterior));
    }
    rings.extend(polygon.interiors().map(|ring| convert_line_string(&ring)));
    rings
}

#[cfg(test)]
mod tests {
    use crate::Result;
    use crate::error::GpkgError;
    use crate::geometry::payload::MAX_NESTING_DEPTH;
    use crate::geometry::{
        Coord, Dimension, EnvelopePolicy, Geometry, GeometryValue, decode_gpkg_geometry,
        encode_gpkg_geometry,
    };
    use geo_types::{LineString, MultiPoint, Point, Polygon};
    use std::str::FromStr;
    use wkb::reader::Wkb;
    use wkt::Wkt;

    fn parse_wkt(text: &str) -> Result<Wkt<f64>> {
        Wkt::from_str(text).map_err(|err| GpkgError::Message(err.to_string()))
    }

    #[test]
    fn converts_geo_types_polygon_with_hole() -> Result<()> {
        let exterior = LineString::from(vec![(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 0.0)]);
        let hole = LineString::from(vec![(1.0, 1.0), (2.0, 1.0), (2.0, 2.0), (1.0, 1.0)]);
        let polygon = Polygon::new(exterior, vec![hole]);

        let value = GeometryValue::from_geometry(&polygon)?;
        assert_eq!(value.dimension, Dimension::Xy);
        assert_eq!(value.srs_id, 0);
        match value.geometry {
            Geometry::Polygon(rings) => {
                assert_eq!(rings.len(), 2);
                assert_eq!(rings[0][1], Coord::xy(4.0, 0.0));
                assert_eq!(rings[1][2], Coord::xy(2.0, 2.0));
            }
            other => panic!("unexpected geometry: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn converts_wkt_with_z_and_m() -> Result<()> {
        let point_z = GeometryValue::from_geometry(&parse_wkt("POINT Z (1 2 3)")?)?;
        assert_eq!(point_z.dimension, Dimension::Xyz);
        assert_eq!(point_z.geometry, Geometry::Point(Some(Coord::xyz(1.0, 2.0, 3.0))));

        let line_m = GeometryValue::from_geometry(&parse_wkt("LINESTRING M (0 0 5, 1 1 6)")?)?;
        assert_eq!(line_m.dimension, Dimension::Xym);
        assert_eq!(
            line_m.geometry,
            Geometry::LineString(vec![Coord::xym(0.0, 0.0, 5.0), Coord::xym(1.0, 1.0, 6.0)])
        );

        let polygon_zm = GeometryValue::from_geometry(&parse_wkt(
            "POLYGON ZM ((0 0 1 10, 2 0 2 11, 2 2 3 12, 0 0 1 10))",
        )?)?;
        assert_eq!(polygon_zm.dimension, Dimension::Xyzm);

        for value in [point_z, line_m, polygon_zm] {
            let blob = encode_gpkg_geometry(&value, EnvelopePolicy::Xyzm)?;
            assert_eq!(decode_gpkg_geometry(&blob)?, value);
        }
        Ok(())
    }

    #[test]
    fn reads_wkb_written_by_the_wkb_crate() -> Result<()> {
        let multi = MultiPoint::from(vec![Point::new(1.0, 5.0), Point::new(-2.0, 3.0)]);
        let mut buf = Vec::new();
        wkb::writer::write_geometry(&mut buf, &multi, &Default::default())?;

        let from_wkb = GeometryValue::from_wkb(&buf)?;
        assert_eq!(from_wkb, GeometryValue::from_geometry(&multi)?);
        assert_eq!(
            from_wkb.geometry,
            Geometry::MultiPoint(vec![Coord::xy(1.0, 5.0), Coord::xy(-2.0, 3.0)])
        );
        Ok(())
    }

    #[test]
    fn extended_wkb_reads_the_same_with_or_without_gpkg_header() -> Result<()> {
        // EWKB Point Z, type code 0x80000001
        let mut ewkb = vec![0x01, 0x01, 0x00, 0x00, 0x80];
        for value in [1.0f64, 2.0, 3.0] {
            ewkb.extend_from_slice(&value.to_le_bytes());
        }
        let mut blob = vec![0x47, 0x50, 0x00, 0x01];
        blob.extend_from_slice(&4326i32.to_le_bytes());
        blob.extend_from_slice(&ewkb);

        let plain = GeometryValue::from_wkb(&ewkb)?;
        let wrapped = decode_gpkg_geometry(&blob)?;
        assert_eq!(plain.geometry, Geometry::Point(Some(Coord::xyz(1.0, 2.0, 3.0))));
        assert_eq!(wrapped, plain.with_srs_id(4326));
        Ok(())
    }

    #[test]
    fn rejects_foreign_geometry_nested_too_deep() {
        let mut geometry = Geometry::Point(Some(Coord::xy(0.0, 0.0)));
        for _ in 0..=MAX_NESTING_DEPTH {
            geometry = Geometry::GeometryCollection(vec![geometry]);
        }
        let value = GeometryValue::new(geometry);
        assert!(matches!(
            GeometryValue::from_geometry(&value.view()),
            Err(GpkgError::MalformedHeader(_))
        ));
    }

    #[test]
    fn wkb_crate_reads_our_wkb() -> Result<()> {
        let value = GeometryValue::from_geometry(&parse_wkt(
            "GEOMETRYCOLLECTION (POINT (-1 -2), LINESTRING (0 0, 1.5 1), POLYGON ((0 0, 3 0, 3 3, 0 0)))",
        )?)?;
        let buf = value.to_wkb()?;
        let wkb = Wkb::try_new(&buf)?;
        assert_eq!(GeometryValue::from_geometry(&wkb)?, value);
        Ok(())
    }
}

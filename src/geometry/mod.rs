//! Neutral geometry value and its GeoPackage binary codec.
//!
//! `GeometryValue` is the only geometry representation the rest of the crate
//! deals with. Foreign geometry models are translated at the boundary by the
//! adapters in `adapter.rs`. `gpb.rs` handles the GeoPackage header and
//! `payload.rs` hands the WKB payload to the `wkb` crate, which writes
//! through the `geo_traits` views in `traits.rs`.

mod adapter;
pub(crate) mod gpb;
mod payload;
mod traits;

pub use gpb::{
    ByteOrder, Envelope, EnvelopePolicy, GpbHeader, decode_gpkg_geometry, encode_gpkg_geometry,
    encode_gpkg_geometry_with,
};
pub use traits::GeometryView;

use crate::conversions::{geometry_type_from_str, geometry_type_to_str};
use crate::error::GpkgError;
use std::str::FromStr;

/// SRS id of the undefined Cartesian reference system.
///
/// GeoPackage reserves `-1` for coordinates in an unknown planar system.
/// Every container registers it, and a geometry tagged with it is written
/// under the SRS id of the table it goes into.
pub const UNDEFINED_CARTESIAN_SRS_ID: i32 = -1;
/// SRS id of the undefined geographic reference system.
///
/// GeoPackage reserves `0` for longitude/latitude in an unknown datum. Like
/// `-1` it is always registered and adopts the table's SRS id on write. It is
/// also the SRS id a `GeometryValue` starts out with.
pub const UNDEFINED_GEOGRAPHIC_SRS_ID: i32 = 0;

/// Coordinate dimensionality of a geometry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Dimension {
    #[default]
    Xy,
    Xyz,
    Xym,
    Xyzm,
}

impl Dimension {
    pub fn from_flags(has_z: bool, has_m: bool) -> Self {
        match (has_z, has_m) {
            (false, false) => Self::Xy,
            (true, false) => Self::Xyz,
            (false, true) => Self::Xym,
            (true, true) => Self::Xyzm,
        }
    }

    pub fn has_z(self) -> bool {
        matches!(self, Self::Xyz | Self::Xyzm)
    }

    pub fn has_m(self) -> bool {
        matches!(self, Self::Xym | Self::Xyzm)
    }
}

/// Geometry type as declared for a geometry column or tagged in WKB.
///
/// `Geometry` is the generic column type; no `GeometryValue` carries it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GeometryType {
    Geometry,
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
}

impl GeometryType {
    /// Upper-case GeoPackage name, e.g. `MULTIPOLYGON`.
    pub fn name(self) -> &'static str {
        geometry_type_to_str(self)
    }

    /// Whether a column declared with `self` may store a geometry of type `actual`.
    pub fn accepts(self, actual: GeometryType) -> bool {
        match self {
            Self::Geometry => true,
            Self::GeometryCollection => matches!(
                actual,
                Self::GeometryCollection
                    | Self::MultiPoint
                    | Self::MultiLineString
                    | Self::MultiPolygon
            ),
            declared => declared == actual,
        }
    }
}

impl FromStr for GeometryType {
    type Err = GpkgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        geometry_type_from_str(s)
    }
}

/// A single position. `z` and `m` are present exactly when the owning
/// geometry's dimension has them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
    pub m: Option<f64>,
}

impl Coord {
    pub fn xy(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            z: None,
            m: None,
        }
    }

    pub fn xyz(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z: Some(z),
            m: None,
        }
    }

    pub fn xym(x: f64, y: f64, m: f64) -> Self {
        Self {
            x,
            y,
            z: None,
            m: Some(m),
        }
    }

    pub fn xyzm(x: f64, y: f64, z: f64, m: f64) -> Self {
        Self {
            x,
            y,
            z: Some(z),
            m: Some(m),
        }
    }

    pub fn dimension(&self) -> Dimension {
        Dimension::from_flags(self.z.is_some(), self.m.is_some())
    }
}

impl From<(f64, f64)> for Coord {
    fn from((x, y): (f64, f64)) -> Self {
        Self::xy(x, y)
    }
}

/// Coordinate sequences of one geometry, tagged by type.
///
/// Polygon rings are stored exterior first. Ring closure is the caller's
/// business: the codec round-trips whatever it is given.
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    /// `None` is the empty point.
    Point(Option<Coord>),
    LineString(Vec<Coord>),
    Polygon(Vec<Vec<Coord>>),
    MultiPoint(Vec<Coord>),
    MultiLineString(Vec<Vec<Coord>>),
    MultiPolygon(Vec<Vec<Vec<Coord>>>),
    GeometryCollection(Vec<Geometry>),
}

impl Geometry {
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Self::Point(_) => GeometryType::Point,
            Self::LineString(_) => GeometryType::LineString,
            Self::Polygon(_) => GeometryType::Polygon,
            Self::MultiPoint(_) => GeometryType::MultiPoint,
            Self::MultiLineString(_) => GeometryType::MultiLineString,
            Self::MultiPolygon(_) => GeometryType::MultiPolygon,
            Self::GeometryCollection(_) => GeometryType::GeometryCollection,
        }
    }

    /// The empty geometry of a given type. `None` for the generic type.
    pub fn empty(geometry_type: GeometryType) -> Option<Self> {
        let geometry = match geometry_type {
            GeometryType::Geometry => return None,
            GeometryType::Point => Self::Point(None),
            GeometryType::LineString => Self::LineString(Vec::new()),
            GeometryType::Polygon => Self::Polygon(Vec::new()),
            GeometryType::MultiPoint => Self::MultiPoint(Vec::new()),
            GeometryType::MultiLineString => Self::MultiLineString(Vec::new()),
            GeometryType::MultiPolygon => Self::MultiPolygon(Vec::new()),
            GeometryType::GeometryCollection => Self::GeometryCollection(Vec::new()),
        };
        Some(geometry)
    }

    /// True when the geometry has no parts at its top level.
    ///
    /// A collection holding only empty members is not empty in this sense,
    /// so that it survives an encode/decode cycle with its members.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Point(coord) => coord.is_none(),
            Self::LineString(coords) | Self::MultiPoint(coords) => coords.is_empty(),
            Self::Polygon(rings) | Self::MultiLineString(rings) => rings.is_empty(),
            Self::MultiPolygon(polygons) => polygons.is_empty(),
            Self::GeometryCollection(members) => members.is_empty(),
        }
    }

    /// Visit every coordinate in storage order.
    pub fn visit_coords(&self, f: &mut dyn FnMut(&Coord)) {
        match self {
            Self::Point(coord) => coord.iter().for_each(|c| f(c)),
            Self::LineString(coords) | Self::MultiPoint(coords) => coords.iter().for_each(|c| f(c)),
            Self::Polygon(rings) | Self::MultiLineString(rings) => {
                rings.iter().flatten().for_each(|c| f(c))
            }
            Self::MultiPolygon(polygons) => polygons.iter().flatten().flatten().for_each(|c| f(c)),
            Self::GeometryCollection(members) => {
                for member in members {
                    member.visit_coords(f);
                }
            }
        }
    }
}

/// A geometry together with its dimensionality and SRS id.
#[derive(Clone, Debug, PartialEq)]
pub struct GeometryValue {
    pub geometry: Geometry,
    pub dimension: Dimension,
    pub srs_id: i32,
}

impl GeometryValue {
    /// Wrap a geometry, inferring the dimension from its first coordinate
    /// (XY when it has none). The SRS id starts out undefined geographic (0).
    pub fn new(geometry: Geometry) -> Self {
        let mut dimension = None;
        geometry.visit_coords(&mut |coord| {
            dimension.get_or_insert(coord.dimension());
        });
        Self {
            geometry,
            dimension: dimension.unwrap_or_default(),
            srs_id: UNDEFINED_GEOGRAPHIC_SRS_ID,
        }
    }

    pub fn with_dimension(mut self, dimension: Dimension) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_srs_id(mut self, srs_id: i32) -> Self {
        self.srs_id = srs_id;
        self
    }

    pub fn point(x: f64, y: f64) -> Self {
        Self::new(Geometry::Point(Some(Coord::xy(x, y))))
    }

    pub fn geometry_type(&self) -> GeometryType {
        self.geometry.geometry_type()
    }

    pub fn is_empty(&self) -> bool {
        self.geometry.is_empty()
    }

    /// Bounding envelope over all coordinates, with Z/M ranges when the
    /// dimension carries them. `None` when there are no coordinates.
    pub fn envelope(&self) -> Option<Envelope> {
        let mut envelope: Option<Envelope> = None;
        let dimension = self.dimension;
        self.geometry.visit_coords(&mut |coord| match envelope.as_mut() {
            Some(env) => env.expand(coord),
            None => envelope = Some(Envelope::from_coord(coord, dimension)),
        });
        envelope
    }
}

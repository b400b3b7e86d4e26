//! `geo_traits` implementations over borrowed `Geometry` data.
//!
//! `Geometry` does not store its dimension, so each view pairs a slice of the
//! geometry with the dimension of the owning `GeometryValue`. This is what the
//! `wkb` writer consumes, and it lets any `geo_traits` consumer read a
//! `GeometryValue` without copying it.

use super::{Coord, Dimension, Geometry, GeometryValue};
use geo_traits::{
    CoordTrait, Dimensions, GeometryCollectionTrait, GeometryTrait, LineStringTrait,
    MultiLineStringTrait, MultiPointTrait, MultiPolygonTrait, PointTrait, PolygonTrait,
    UnimplementedLine, UnimplementedRect, UnimplementedTriangle,
};

impl From<Dimension> for Dimensions {
    fn from(value: Dimension) -> Self {
        match value {
            Dimension::Xy => Self::Xy,
            Dimension::Xyz => Self::Xyz,
            Dimension::Xym => Self::Xym,
            Dimension::Xyzm => Self::Xyzm,
        }
    }
}

impl GeometryValue {
    /// Borrow the geometry as a `geo_traits::GeometryTrait` implementation.
    ///
    /// ```
    /// use geo_traits::{GeometryTrait, GeometryType};
    /// use geopackage::GeometryValue;
    ///
    /// let value = GeometryValue::point(1.0, 2.0);
    /// assert!(matches!(value.view().as_type(), GeometryType::Point(_)));
    /// ```
    pub fn view(&self) -> GeometryView<'_> {
        GeometryView::new(&self.geometry, self.dimension)
    }
}

impl CoordTrait for Coord {
    type T = f64;

    fn dim(&self) -> Dimensions {
        self.dimension().into()
    }

    fn x(&self) -> f64 {
        self.x
    }

    fn y(&self) -> f64 {
        self.y
    }

    fn nth_or_panic(&self, n: usize) -> f64 {
        match (n, self.z, self.m) {
            (0, _, _) => self.x,
            (1, _, _) => self.y,
            (2, Some(z), _) => z,
            (2, None, Some(m)) => m,
            (3, Some(_), Some(m)) => m,
            _ => panic!("coordinate of dimension {:?} has no axis {n}", self.dimension()),
        }
    }
}

/// A `Geometry` borrowed together with its dimension.
#[derive(Clone, Copy, Debug)]
pub enum GeometryView<'a> {
    Point(PointView<'a>),
    LineString(LineStringView<'a>),
    Polygon(PolygonView<'a>),
    MultiPoint(MultiPointView<'a>),
    MultiLineString(MultiLineStringView<'a>),
    MultiPolygon(MultiPolygonView<'a>),
    GeometryCollection(CollectionView<'a>),
}

impl<'a> GeometryView<'a> {
    pub fn new(geometry: &'a Geometry, dimension: Dimension) -> Self {
        match geometry {
            Geometry::Point(coord) => Self::Point(PointView {
                coord: coord.as_ref(),
                dimension,
            }),
            Geometry::LineString(coords) => Self::LineString(LineStringView { coords, dimension }),
            Geometry::Polygon(rings) => Self::Polygon(PolygonView { rings, dimension }),
            Geometry::MultiPoint(points) => Self::MultiPoint(MultiPointView { points, dimension }),
            Geometry::MultiLineString(lines) => {
                Self::MultiLineString(MultiLineStringView { lines, dimension })
            }
            Geometry::MultiPolygon(polygons) => {
                Self::MultiPolygon(MultiPolygonView { polygons, dimension })
            }
            Geometry::GeometryCollection(members) => {
                Self::GeometryCollection(CollectionView { members, dimension })
            }
        }
    }

    fn dimension(&self) -> Dimension {
        match self {
            Self::Point(view) => view.dimension,
            Self::LineString(view) => view.dimension,
            Self::Polygon(view) => view.dimension,
            Self::MultiPoint(view) => view.dimension,
            Self::MultiLineString(view) => view.dimension,
            Self::MultiPolygon(view) => view.dimension,
            Self::GeometryCollection(view) => view.dimension,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PointView<'a> {
    coord: Option<&'a Coord>,
    dimension: Dimension,
}

#[derive(Clone, Copy, Debug)]
pub struct LineStringView<'a> {
    coords: &'a [Coord],
    dimension: Dimension,
}

#[derive(Clone, Copy, Debug)]
pub struct PolygonView<'a> {
    rings: &'a [Vec<Coord>],
    dimension: Dimension,
}

#[derive(Clone, Copy, Debug)]
pub struct MultiPointView<'a> {
    points: &'a [Coord],
    dimension: Dimension,
}

#[derive(Clone, Copy, Debug)]
pub struct MultiLineStringView<'a> {
    lines: &'a [Vec<Coord>],
    dimension: Dimension,
}

#[derive(Clone, Copy, Debug)]
pub struct MultiPolygonView<'a> {
    polygons: &'a [Vec<Vec<Coord>>],
    dimension: Dimension,
}

#[derive(Clone, Copy, Debug)]
pub struct CollectionView<'a> {
    members: &'a [Geometry],
    dimension: Dimension,
}

impl<'a> GeometryTrait for GeometryView<'a> {
    type T = f64;
    type PointType<'b>
        = PointView<'a>
    where
        Self: 'b;
    type LineStringType<'b>
        = LineStringView<'a>
    where
        Self: 'b;
    type PolygonType<'b>
        = PolygonView<'a>
    where
        Self: 'b;
    type MultiPointType<'b>
        = MultiPointView<'a>
    where
        Self: 'b;
    type MultiLineStringType<'b>
        = MultiLineStringView<'a>
    where
        Self: 'b;
    type MultiPolygonType<'b>
        = MultiPolygonView<'a>
    where
        Self: 'b;
    type GeometryCollectionType<'b>
        = CollectionView<'a>
    where
        Self: 'b;
    type RectType<'b>
        = UnimplementedRect<f64>
    where
        Self: 'b;
    type TriangleType<'b>
        = UnimplementedTriangle<f64>
    where
        Self: 'b;
    type LineType<'b>
        = UnimplementedLine<f64>
    where
        Self: 'b;

    fn dim(&self) -> Dimensions {
        self.dimension().into()
    }

    fn as_type(
        &self,
    ) -> geo_traits::GeometryType<
        '_,
        Self::PointType<'_>,
        Self::LineStringType<'_>,
        Self::PolygonType<'_>,
        Self::MultiPointType<'_>,
        Self::MultiLineStringType<'_>,
        Self::MultiPolygonType<'_>,
        Self::GeometryCollectionType<'_>,
        Self::RectType<'_>,
        Self::TriangleType<'_>,
        Self::LineType<'_>,
    > {
        use geo_traits::GeometryType as B;
        match self {
            Self::Point(view) => B::Point(view),
            Self::LineString(view) => B::LineString(view),
            Self::Polygon(view) => B::Polygon(view),
            Self::MultiPoint(view) => B::MultiPoint(view),
            Self::MultiLineString(view) => B::MultiLineString(view),
            Self::MultiPolygon(view) => B::MultiPolygon(view),
            Self::GeometryCollection(view) => B::GeometryCollection(view),
        }
    }
}

// Every view is also a geometry of its own kind.
macro_rules! impl_geometry_for_view {
    ($view:ident, $variant:ident) => {
        impl<'a> GeometryTrait for $view<'a> {
            type T = f64;
            type PointType<'b>
                = PointView<'a>
            where
                Self: 'b;
            type LineStringType<'b>
                = LineStringView<'a>
            where
                Self: 'b;
            type PolygonType<'b>
                = PolygonView<'a>
            where
                Self: 'b;
            type MultiPointType<'b>
                = MultiPointView<'a>
            where
                Self: 'b;
            type MultiLineStringType<'b>
                = MultiLineStringView<'a>
            where
                Self: 'b;
            type MultiPolygonType<'b>
                = MultiPolygonView<'a>
            where
                Self: 'b;
            type GeometryCollectionType<'b>
                = CollectionView<'a>
            where
                Self: 'b;
            type RectType<'b>
                = UnimplementedRect<f64>
            where
                Self: 'b;
            type TriangleType<'b>
                = UnimplementedTriangle<f64>
            where
                Self: 'b;
            type LineType<'b>
                = UnimplementedLine<f64>
            where
                Self: 'b;

            fn dim(&self) -> Dimensions {
                self.dimension.into()
            }

            fn as_type(
                &self,
            ) -> geo_traits::GeometryType<
                '_,
                Self::PointType<'_>,
                Self::LineStringType<'_>,
                Self::PolygonType<'_>,
                Self::MultiPointType<'_>,
                Self::MultiLineStringType<'_>,
                Self::MultiPolygonType<'_>,
                Self::GeometryCollectionType<'_>,
                Self::RectType<'_>,
                Self::TriangleType<'_>,
                Self::LineType<'_>,
            > {
                geo_traits::GeometryType::$variant(self)
            }
        }
    };
}

impl_geometry_for_view!(PointView, Point);
impl_geometry_for_view!(LineStringView, LineString);
impl_geometry_for_view!(PolygonView, Polygon);
impl_geometry_for_view!(MultiPointView, MultiPoint);
impl_geometry_for_view!(MultiLineStringView, MultiLineString);
impl_geometry_for_view!(MultiPolygonView, MultiPolygon);
impl_geometry_for_view!(CollectionView, GeometryCollection);

impl<'a> PointTrait for PointView<'a> {
    type CoordType<'b>
        = Coord
    where
        Self: 'b;

    fn coord(&self) -> Option<Coord> {
        self.coord.copied()
    }
}

impl<'a> LineStringTrait for LineStringView<'a> {
    type CoordType<'b>
        = Coord
    where
        Self: 'b;

    fn num_coords(&self) -> usize {
        self.coords.len()
    }

    unsafe fn coord_unchecked(&self, i: usize) -> Coord {
        self.coords[i]
    }
}

impl<'a> PolygonTrait for PolygonView<'a> {
    type RingType<'b>
        = LineStringView<'a>
    where
        Self: 'b;

    fn exterior(&self) -> Option<LineStringView<'a>> {
        self.rings.first().map(|coords| LineStringView {
            coords,
            dimension: self.dimension,
        })
    }

    fn num_interiors(&self) -> usize {
        self.rings.len().saturating_sub(1)
    }

    unsafe fn interior_unchecked(&self, i: usize) -> LineStringView<'a> {
        LineStringView {
            coords: &self.rings[i + 1],
            dimension: self.dimension,
        }
    }
}

impl<'a> MultiPointTrait for MultiPointView<'a> {
    type InnerPointType<'b>
        = PointView<'a>
    where
        Self: 'b;

    fn num_points(&self) -> usize {
        self.points.len()
    }

    unsafe fn point_unchecked(&self, i: usize) -> PointView<'a> {
        PointView {
            coord: Some(&self.points[i]),
            dimension: self.dimension,
        }
    }
}

impl<'a> MultiLineStringTrait for MultiLineStringView<'a> {
    type InnerLineStringType<'b>
        = LineStringView<'a>
    where
        Self: 'b;

    fn num_line_strings(&self) -> usize {
        self.lines.len()
    }

    unsafe fn line_string_unchecked(&self, i: usize) -> LineStringView<'a> {
        LineStringView {
            coords: &self.lines[i],
            dimension: self.dimension,
        }
    }
}

impl<'a> MultiPolygonTrait for MultiPolygonView<'a> {
    type InnerPolygonType<'b>
        = PolygonView<'a>
    where
        Self: 'b;

    fn num_polygons(&self) -> usize {
        self.polygons.len()
    }

    unsafe fn polygon_unchecked(&self, i: usize) -> PolygonView<'a> {
        PolygonView {
            rings: &self.polygons[i],
            dimension: self.dimension,
        }
    }
}

impl<'a> GeometryCollectionTrait for CollectionView<'a> {
    type GeometryType<'b>
        = GeometryView<'a>
    where
        Self: 'b;

    fn num_geometries(&self) -> usize {
        self.members.len()
    }

    unsafe fn geometry_unchecked(&self, i: usize) -> GeometryView<'a> {
        GeometryView::new(&self.members[i], self.dimension)
    }
}

#[cfg(test)]
mod tests {
    use crate::Result;
    use crate::geometry::{Coord, Geometry, GeometryValue};
    use geo_traits::{
        CoordTrait, Dimensions, GeometryCollectionTrait, GeometryTrait, GeometryType,
        PolygonTrait,
    };

    #[test]
    fn coord_axes_follow_dimension() {
        let xym = Coord::xym(1.0, 2.0, 7.0);
        assert_eq!(xym.dim(), Dimensions::Xym);
        assert_eq!(xym.nth(2), Some(7.0));
        assert_eq!(xym.nth(3), None);

        let xyzm = Coord::xyzm(1.0, 2.0, 3.0, 4.0);
        assert_eq!(xyzm.nth(2), Some(3.0));
        assert_eq!(xyzm.nth(3), Some(4.0));
    }

    #[test]
    fn polygon_view_splits_exterior_and_holes() {
        let value = GeometryValue::new(Geometry::Polygon(vec![
            vec![Coord::xy(0.0, 0.0), Coord::xy(4.0, 0.0), Coord::xy(0.0, 4.0), Coord::xy(0.0, 0.0)],
            vec![Coord::xy(1.0, 1.0), Coord::xy(2.0, 1.0), Coord::xy(1.0, 2.0), Coord::xy(1.0, 1.0)],
        ]));
        let view = value.view();
        match view.as_type() {
            GeometryType::Polygon(polygon) => {
                assert_eq!(polygon.num_interiors(), 1);
                assert!(polygon.exterior().is_some());
            }
            _ => panic!("expected a polygon view"),
        }
    }

    #[test]
    fn collection_members_keep_the_collection_dimension() -> Result<()> {
        let value = GeometryValue::new(Geometry::GeometryCollection(vec![
            Geometry::Point(None),
            Geometry::LineString(vec![Coord::xyz(0.0, 0.0, 1.0), Coord::xyz(1.0, 1.0, 2.0)]),
        ]));
        let view = value.view();
        assert_eq!(view.dim(), Dimensions::Xyz);
        match view.as_type() {
            GeometryType::GeometryCollection(collection) => {
                assert_eq!(collection.num_geometries(), 2);
                for member in collection.geometries() {
                    assert_eq!(member.dim(), Dimensions::Xyz);
                }
            }
            _ => panic!("expected a collection view"),
        }

        // the view reads back into an identical value
        assert_eq!(GeometryValue::from_geometry(&view)?, value);
        Ok(())
    }
}

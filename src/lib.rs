//! GeoPackage container manager built on top of rusqlite.
//!
//! ## Overview
//!
//! - `Gpkg` represents a whole GeoPackage container.
//! - `SpatialRefRegistry` holds the spatial reference systems of the container.
//! - `SchemaRegistry` holds the feature and attribute table descriptors of the
//!   container.
//! - `GpkgLayer` reads and writes the rows of a single feature or attribute table.
//! - `Row` is one row read from a layer; `Value` is a single column value.
//! - `GeometryValue` is a decoded geometry together with its SRS id.
//!
//! `Gpkg` is the entry point and supports several open modes:
//!
//! - `Gpkg::open_read_only(path)`: open an existing file without write access.
//! - `Gpkg::open(path)`: open an existing file for read/write.
//! - `Gpkg::new(path)`: create a new file.
//! - `Gpkg::new_in_memory()`: create a transient in-memory GeoPackage.
//!
//! Opening a container loads both registries from its metadata tables and
//! fails with `GpkgError::InconsistentMetadata` when they reference tables or
//! spatial reference systems that do not exist.
//!
//! ## Short usage
//!
//! ```
//! use geopackage::{
//!     ColumnSpec, ColumnType, Coord, FeatureTableDescriptor, Geometry, GeometryColumn,
//!     GeometryType, GeometryValue, Gpkg, SpatialRefSys, Value,
//! };
//!
//! let mut gpkg = Gpkg::new_in_memory()?;
//! gpkg.register_srs(SpatialRefSys::wgs84())?;
//! gpkg.create_layer(
//!     FeatureTableDescriptor::new(
//!         "census",
//!         GeometryColumn::new("geom", GeometryType::Polygon, 4326),
//!     )
//!     .with_column(ColumnSpec::primary_key("id"))
//!     .with_column(ColumnSpec::new("tract", ColumnType::Text)),
//! )?;
//!
//! let census = gpkg.get_layer("census")?;
//! let polygon = GeometryValue::new(Geometry::Polygon(vec![vec![
//!     Coord::xy(0.0, 0.0),
//!     Coord::xy(1.0, 0.0),
//!     Coord::xy(1.0, 1.0),
//!     Coord::xy(0.0, 0.0),
//! ]]))
//! .with_srs_id(4326);
//! census.insert([
//!     ("geom", Value::from(polygon.clone())),
//!     ("tract", Value::from("0001.00")),
//! ])?;
//!
//! for row in census.rows()? {
//!     let row = row?;
//!     assert_eq!(row.geometry(), Some(&polygon));
//!     assert!(row.srs_mismatch().is_none());
//! }
//! # Ok::<(), geopackage::GpkgError>(())
//! ```
//!
//! ## Reader
//!
//! ```no_run
//! use geopackage::{Gpkg, Value};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gpkg = Gpkg::open_read_only("data.gpkg")?;
//!     for layer_name in gpkg.list_layers() {
//!         let layer = gpkg.get_layer(layer_name)?;
//!         for row in layer.rows()? {
//!             let row = row?;
//!             if let Some(mismatch) = row.srs_mismatch() {
//!                 eprintln!("row {} uses srs_id {}", row.id(), mismatch.found);
//!             }
//!             for (name, value) in row.columns() {
//!                 match value {
//!                     Value::Geometry(geometry) => {
//!                         println!("  {name} = {:?}", geometry.geometry_type())
//!                     }
//!                     other => println!("  {name} = {other:?}"),
//!                 }
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Rows are fetched lazily in pages of `GpkgConfig::read_page_size`, so large
//! tables can be scanned without holding them in memory.
//!
//! `Value` is the crate's owned dynamic value. It mirrors SQLite's dynamic
//! typing (null, integer, real, text, blob) plus a decoded geometry. Convert
//! using `try_into()`; `NULL` converts to `None` when the target is an
//! `Option<T>`:
//!
//! ```
//! use geopackage::Value;
//!
//! let value = Value::Null;
//! let maybe_i64: Option<i64> = value.try_into()?;
//! assert_eq!(maybe_i64, None);
//! # Ok::<(), geopackage::GpkgError>(())
//! ```
//!
//! ## Geometries from other crates
//!
//! Any geometry implementing `geo_traits::GeometryTrait<T = f64>` converts
//! into a `GeometryValue`:
//!
//! ```
//! use geopackage::{Coord, Geometry, GeometryValue};
//!
//! let point = geo_types::Point::new(1.0, 2.0);
//! let value = GeometryValue::from_geometry(&point)?.with_srs_id(4326);
//! assert_eq!(value.geometry, Geometry::Point(Some(Coord::xy(1.0, 2.0))));
//! # Ok::<(), geopackage::GpkgError>(())
//! ```
//!
//! ## Geometry codec
//!
//! `encode_gpkg_geometry` and `decode_gpkg_geometry` convert between
//! `GeometryValue` and the GeoPackage binary format without any container:
//!
//! ```
//! use geopackage::{EnvelopePolicy, GeometryValue, decode_gpkg_geometry, encode_gpkg_geometry};
//!
//! let point = GeometryValue::point(1.0, 2.0).with_srs_id(4326);
//! let blob = encode_gpkg_geometry(&point, EnvelopePolicy::Xy)?;
//! assert_eq!(&blob[..2], b"GP");
//! assert_eq!(decode_gpkg_geometry(&blob)?, point);
//! # Ok::<(), geopackage::GpkgError>(())
//! ```
mod conversions;
mod error;
mod geometry;
mod gpkg;
mod ogc_sql;
mod sql_functions;
mod types;

pub use error::{GpkgError, Result};
pub use geometry::{
    ByteOrder, Coord, Dimension, Envelope, EnvelopePolicy, Geometry, GeometryType, GeometryValue,
    GeometryView, GpbHeader, UNDEFINED_CARTESIAN_SRS_ID, UNDEFINED_GEOGRAPHIC_SRS_ID, decode_gpkg_geometry,
    encode_gpkg_geometry, encode_gpkg_geometry_with,
};
pub use gpkg::{
    FeatureTableDescriptor, GeometryColumn, Gpkg, GpkgLayer, GpkgRowIter, Row, SchemaRegistry,
    SpatialRefRegistry, SpatialRefSys, SrsMismatch, ValidationIssue,
};
pub use sql_functions::register_spatial_functions;
pub use types::{ColumnSpec, ColumnType, GpkgConfig, Value, ZmFlag};

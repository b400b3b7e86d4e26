//! GeoPackage container surface backed by rusqlite.
//!
//! `Gpkg` owns the connection and the two registries; `GpkgLayer` reads and
//! writes rows of one feature or attribute table.

mod gpkg;
mod layer;
mod row;
mod schema;
mod scope;
mod srs;

pub use gpkg::Gpkg;
pub use layer::GpkgLayer;
pub use row::{GpkgRowIter, Row, SrsMismatch};
pub use schema::{FeatureTableDescriptor, GeometryColumn, SchemaRegistry, ValidationIssue};
pub use srs::{SpatialRefRegistry, SpatialRefSys};

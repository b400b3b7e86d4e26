use crate::conversions::{column_type_from_str, geometry_type_from_str, zm_flags_from_i8};
use crate::error::{GpkgError, Result};
use crate::geometry::{Dimension, GeometryType};
use crate::ogc_sql::{
    SQL_SELECT_ORPHAN_GEOMETRY_COLUMNS, SQL_SELECT_USER_TABLES, SQL_TABLE_COLUMNS,
    SQL_TABLE_EXISTS,
};
use crate::types::{ColumnSpec, ColumnType, ZmFlag};
use std::collections::HashSet;
use std::fmt;

use super::srs::SpatialRefRegistry;

/// Descriptor of a feature table's geometry column, as stored in
/// `gpkg_geometry_columns`.
#[derive(Clone, Debug, PartialEq)]
pub struct GeometryColumn {
    pub name: String,
    pub geometry_type: GeometryType,
    pub srs_id: i32,
    pub z: ZmFlag,
    pub m: ZmFlag,
    pub nullable: bool,
}

impl GeometryColumn {
    /// A nullable XY geometry column.
    pub fn new(name: impl Into<String>, geometry_type: GeometryType, srs_id: i32) -> Self {
        Self {
            name: name.into(),
            geometry_type,
            srs_id,
            z: ZmFlag::Prohibited,
            m: ZmFlag::Prohibited,
            nullable: true,
        }
    }

    pub fn with_z(mut self, z: ZmFlag) -> Self {
        self.z = z;
        self
    }

    pub fn with_m(mut self, m: ZmFlag) -> Self {
        self.m = m;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Whether geometries of `dimension` satisfy the column's Z/M flags.
    pub fn allows_dimension(&self, dimension: Dimension) -> bool {
        self.z.allows(dimension.has_z()) && self.m.allows(dimension.has_m())
    }
}

/// A user table: its name, geometry column and attribute columns.
///
/// `columns` holds every non-geometry column, the integer primary key
/// included, in table order. An attribute table (`data_type` `attributes`
/// in `gpkg_contents`) has no geometry column.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureTableDescriptor {
    pub table_name: String,
    pub geometry_column: Option<GeometryColumn>,
    pub columns: Vec<ColumnSpec>,
}

impl FeatureTableDescriptor {
    pub fn new(table_name: impl Into<String>, geometry_column: GeometryColumn) -> Self {
        Self {
            table_name: table_name.into(),
            geometry_column: Some(geometry_column),
            columns: Vec::new(),
        }
    }

    /// A table without geometry.
    ///
    /// Example:
    /// ```
    /// use geopackage::{ColumnSpec, ColumnType, FeatureTableDescriptor, Gpkg, Value};
    ///
    /// let mut gpkg = Gpkg::new_in_memory()?;
    /// gpkg.create_layer(
    ///     FeatureTableDescriptor::attributes("owners")
    ///         .with_column(ColumnSpec::primary_key("OBJECTID"))
    ///         .with_column(ColumnSpec::new("name", ColumnType::Text)),
    /// )?;
    /// assert!(gpkg.list_layers().is_empty());
    /// assert_eq!(gpkg.list_attribute_tables(), vec!["owners"]);
    ///
    /// let owners = gpkg.get_layer("owners")?;
    /// let id = owners.insert([("name", "Ngata")])?;
    /// assert_eq!(owners.get(id)?.get("name"), Some(&Value::from("Ngata")));
    /// # Ok::<(), geopackage::GpkgError>(())
    /// ```
    pub fn attributes(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            geometry_column: None,
            columns: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    /// SRS id of the geometry column. `None` for attribute tables.
    pub fn srs_id(&self) -> Option<i32> {
        self.geometry_column.as_ref().map(|column| column.srs_id)
    }

    pub fn geometry_type(&self) -> Option<GeometryType> {
        self.geometry_column.as_ref().map(|column| column.geometry_type)
    }

    pub fn is_attributes(&self) -> bool {
        self.geometry_column.is_none()
    }

    /// The `gpkg_contents.data_type` of the table.
    pub(crate) fn data_type(&self) -> &'static str {
        if self.is_attributes() {
            "attributes"
        } else {
            "features"
        }
    }

    /// The primary key column, when exactly one is declared.
    pub fn primary_key(&self) -> Option<&ColumnSpec> {
        let mut keys = self.columns.iter().filter(|c| c.primary_key);
        match (keys.next(), keys.next()) {
            (Some(key), None) => Some(key),
            _ => None,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Non-key, non-geometry columns in table order.
    pub fn attribute_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| !c.primary_key)
    }

    /// Problems with the descriptor itself, independent of any registry.
    pub(crate) fn structural_issues(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let table_name = &self.table_name;

        let keys: Vec<&ColumnSpec> = self.columns.iter().filter(|c| c.primary_key).collect();
        match keys.as_slice() {
            [] => issues.push(ValidationIssue::MissingPrimaryKey {
                table_name: table_name.clone(),
            }),
            [key] if key.column_type != ColumnType::Integer => {
                issues.push(ValidationIssue::MissingPrimaryKey {
                    table_name: table_name.clone(),
                })
            }
            [_] => {}
            _ => issues.push(ValidationIssue::CompositePrimaryKey {
                table_name: table_name.clone(),
                columns: keys.iter().map(|c| c.name.clone()).collect(),
            }),
        }

        let mut seen = HashSet::with_capacity(self.columns.len() + 1);
        if let Some(geometry) = &self.geometry_column {
            seen.insert(geometry.name.to_ascii_lowercase());
        }
        for column in &self.columns {
            // SQLite column names are case-insensitive
            if !seen.insert(column.name.to_ascii_lowercase()) {
                issues.push(ValidationIssue::DuplicateColumn {
                    table_name: table_name.clone(),
                    column: column.name.clone(),
                });
            }
        }

        issues
    }
}

/// A single consistency problem found by `validate`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationIssue {
    UnresolvedSrs { table_name: String, srs_id: i32 },
    MissingPrimaryKey { table_name: String },
    CompositePrimaryKey { table_name: String, columns: Vec<String> },
    DuplicateColumn { table_name: String, column: String },
    /// The table is registered but absent from the store.
    MissingTable { table_name: String },
    /// The feature table has no `gpkg_geometry_columns` row.
    MissingGeometryColumnsRow { table_name: String },
}

impl ValidationIssue {
    pub fn table_name(&self) -> &str {
        match self {
            Self::UnresolvedSrs { table_name, .. }
            | Self::MissingPrimaryKey { table_name }
            | Self::CompositePrimaryKey { table_name, .. }
            | Self::DuplicateColumn { table_name, .. }
            | Self::MissingTable { table_name }
            | Self::MissingGeometryColumnsRow { table_name } => table_name,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedSrs { table_name, srs_id } => {
                write!(f, "{table_name}: srs_id {srs_id} is not registered")
            }
            Self::MissingPrimaryKey { table_name } => {
                write!(f, "{table_name}: no integer primary key column")
            }
            Self::CompositePrimaryKey {
                table_name,
                columns,
            } => write!(
                f,
                "{table_name}: more than one primary key column ({})",
                columns.join(", ")
            ),
            Self::DuplicateColumn { table_name, column } => {
                write!(f, "{table_name}: duplicate column '{column}'")
            }
            Self::MissingTable { table_name } => write!(f, "{table_name}: table does not exist"),
            Self::MissingGeometryColumnsRow { table_name } => {
                write!(f, "{table_name}: no gpkg_geometry_columns entry")
            }
        }
    }
}

impl From<ValidationIssue> for GpkgError {
    fn from(issue: ValidationIssue) -> Self {
        match issue {
            ValidationIssue::UnresolvedSrs { srs_id, .. } => GpkgError::UnknownSrsId { srs_id },
            ValidationIssue::MissingPrimaryKey { table_name } => {
                GpkgError::MissingPrimaryKey { table_name }
            }
            ValidationIssue::CompositePrimaryKey { table_name, .. } => {
                GpkgError::CompositePrimaryKeyUnsupported { table_name }
            }
            ValidationIssue::DuplicateColumn { table_name, column } => {
                GpkgError::DuplicateColumn { table_name, column }
            }
            issue @ (ValidationIssue::MissingTable { .. }
            | ValidationIssue::MissingGeometryColumnsRow { .. }) => {
                GpkgError::InconsistentMetadata(issue.to_string())
            }
        }
    }
}

/// In-memory catalog of feature and attribute tables, in registration order.
///
/// Table names are matched ignoring ASCII case, as SQLite does.
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    tables: Vec<FeatureTableDescriptor>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that `descriptor` could be registered, without registering it.
    pub fn check_registration(
        &self,
        descriptor: &FeatureTableDescriptor,
        srs: &SpatialRefRegistry,
    ) -> Result<()> {
        if self.contains(&descriptor.table_name) {
            return Err(GpkgError::DuplicateTable {
                table_name: descriptor.table_name.clone(),
            });
        }
        if let Some(srs_id) = descriptor.srs_id() {
            srs.resolve(srs_id)?;
        }
        match descriptor.structural_issues().into_iter().next() {
            Some(issue) => Err(issue.into()),
            None => Ok(()),
        }
    }

    /// Register a feature table. On error nothing is added.
    pub fn register_table(
        &mut self,
        descriptor: FeatureTableDescriptor,
        srs: &SpatialRefRegistry,
    ) -> Result<()> {
        self.check_registration(&descriptor, srs)?;
        self.tables.push(descriptor);
        Ok(())
    }

    pub fn get(&self, table_name: &str) -> Result<&FeatureTableDescriptor> {
        self.tables
            .iter()
            .find(|t| t.table_name.eq_ignore_ascii_case(table_name))
            .ok_or_else(|| GpkgError::UnknownTable {
                table_name: table_name.to_string(),
            })
    }

    pub fn contains(&self, table_name: &str) -> bool {
        self.tables
            .iter()
            .any(|t| t.table_name.eq_ignore_ascii_case(table_name))
    }

    /// Feature table names in registration order.
    pub fn list(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| !t.is_attributes())
            .map(|t| t.table_name.as_str())
            .collect()
    }

    /// Attribute table names in registration order.
    pub fn list_attributes(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| t.is_attributes())
            .map(|t| t.table_name.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureTableDescriptor> {
        self.tables.iter()
    }

    pub(crate) fn remove(&mut self, table_name: &str) -> Option<FeatureTableDescriptor> {
        let idx = self
            .tables
            .iter()
            .position(|t| t.table_name.eq_ignore_ascii_case(table_name))?;
        Some(self.tables.remove(idx))
    }

    /// Full consistency pass over every registered table. Reports all
    /// problems instead of stopping at the first one.
    pub fn validate(&self, srs: &SpatialRefRegistry) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for table in &self.tables {
            if let Some(srs_id) = table.srs_id()
                && !srs.contains(srs_id)
            {
                issues.push(ValidationIssue::UnresolvedSrs {
                    table_name: table.table_name.clone(),
                    srs_id,
                });
            }
            issues.extend(table.structural_issues());
        }
        issues
    }

    /// Rebuild the registry from the container's metadata tables.
    ///
    /// Every `features` row of `gpkg_contents` must have a matching
    /// `gpkg_geometry_columns` row, an existing table containing the geometry
    /// column, and a registered SRS. An `attributes` row must name an
    /// existing table and have no geometry column. Anything else, or a
    /// primary key not declared `INTEGER`, is `InconsistentMetadata`.
    pub(crate) fn discover(conn: &rusqlite::Connection, srs: &SpatialRefRegistry) -> Result<Self> {
        let orphans = conn
            .prepare(SQL_SELECT_ORPHAN_GEOMETRY_COLUMNS)?
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        if let Some(orphan) = orphans.first() {
            return Err(GpkgError::InconsistentMetadata(format!(
                "gpkg_geometry_columns references table '{orphan}' missing from gpkg_contents"
            )));
        }

        let mut stmt = conn.prepare(SQL_SELECT_USER_TABLES)?;
        let entries = stmt
            .query_map([], |row| {
                Ok(ContentsEntry {
                    table_name: row.get(0)?,
                    data_type: row.get(1)?,
                    contents_srs_id: row.get(2)?,
                    column_name: row.get(3)?,
                    geometry_type_name: row.get(4)?,
                    srs_id: row.get(5)?,
                    z: row.get(6)?,
                    m: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<ContentsEntry>, _>>()?;

        let mut registry = Self::new();
        for entry in entries {
            let descriptor = entry.into_descriptor(conn, srs)?;
            registry.register_table(descriptor, srs)?;
        }
        log::debug!("discovered {} user tables", registry.tables.len());
        Ok(registry)
    }
}

struct ContentsEntry {
    table_name: String,
    data_type: String,
    contents_srs_id: Option<i32>,
    column_name: Option<String>,
    geometry_type_name: Option<String>,
    srs_id: Option<i32>,
    z: Option<i8>,
    m: Option<i8>,
}

impl ContentsEntry {
    fn into_descriptor(
        self,
        conn: &rusqlite::Connection,
        srs: &SpatialRefRegistry,
    ) -> Result<FeatureTableDescriptor> {
        let table_name = self.table_name;
        let exists: bool = conn.query_row(SQL_TABLE_EXISTS, [&table_name], |row| row.get(0))?;
        if !exists {
            return Err(GpkgError::InconsistentMetadata(format!(
                "gpkg_contents lists table '{table_name}' which does not exist"
            )));
        }

        if self.data_type == "attributes" {
            if self.column_name.is_some() {
                return Err(GpkgError::InconsistentMetadata(format!(
                    "attribute table '{table_name}' has a gpkg_geometry_columns entry"
                )));
            }
            let (columns, _) = read_columns(conn, &table_name, None)?;
            return Ok(FeatureTableDescriptor {
                table_name,
                geometry_column: None,
                columns,
            });
        }

        let (Some(column_name), Some(geometry_type_name), Some(srs_id), Some(z), Some(m)) =
            (self.column_name, self.geometry_type_name, self.srs_id, self.z, self.m)
        else {
            return Err(GpkgError::InconsistentMetadata(format!(
                "feature table '{table_name}' has no gpkg_geometry_columns entry"
            )));
        };

        if !srs.contains(srs_id) {
            return Err(GpkgError::InconsistentMetadata(format!(
                "table '{table_name}' references srs_id {srs_id} missing from gpkg_spatial_ref_sys"
            )));
        }
        if let Some(contents_srs_id) = self.contents_srs_id
            && contents_srs_id != srs_id
        {
            log::warn!(
                "table '{table_name}': gpkg_contents srs_id {contents_srs_id} differs from gpkg_geometry_columns srs_id {srs_id}"
            );
        }

        let geometry_type = geometry_type_from_str(&geometry_type_name)?;
        let (z, m) = zm_flags_from_i8(z, m)?;

        let (columns, geometry_nullable) = read_columns(conn, &table_name, Some(&column_name))?;
        let Some(nullable) = geometry_nullable else {
            return Err(GpkgError::InconsistentMetadata(format!(
                "geometry column '{column_name}' does not exist in table '{table_name}'"
            )));
        };

        Ok(FeatureTableDescriptor {
            table_name,
            geometry_column: Some(GeometryColumn {
                name: column_name,
                geometry_type,
                srs_id,
                z,
                m,
                nullable,
            }),
            columns,
        })
    }
}

/// Read a table's columns from `pragma_table_info`, leaving out the geometry
/// column. The second value is the geometry column's nullability, `None`
/// when it was not found.
fn read_columns(
    conn: &rusqlite::Connection,
    table_name: &str,
    geometry_column: Option<&str>,
) -> Result<(Vec<ColumnSpec>, Option<bool>)> {
    let mut stmt = conn.prepare(SQL_TABLE_COLUMNS)?;
    let rows = stmt
        .query_map([table_name], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, i32>(3)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut geometry_nullable = None;
    let mut columns = Vec::with_capacity(rows.len());
    for (name, declared_type, not_null, pk) in rows {
        if geometry_column == Some(name.as_str()) {
            geometry_nullable = Some(!not_null);
            continue;
        }
        let primary_key = pk != 0;
        // Only INTEGER PRIMARY KEY aliases the rowid, which inserts return.
        if primary_key && !declared_type.trim().eq_ignore_ascii_case("INTEGER") {
            return Err(GpkgError::InconsistentMetadata(format!(
                "primary key '{name}' of table '{table_name}' is declared {declared_type}, not INTEGER"
            )));
        }
        // cf. https://www.geopackage.org/spec140/index.html#_sqlite_container
        let column_type = column_type_from_str(&declared_type).ok_or_else(|| {
            GpkgError::UnsupportedColumnType {
                column: name.clone(),
                declared_type: declared_type.clone(),
            }
        })?;
        columns.push(ColumnSpec {
            name,
            column_type,
            nullable: !not_null && !primary_key,
            primary_key,
        });
    }
    Ok((columns, geometry_nullable))
}

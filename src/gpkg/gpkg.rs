use crate::conversions::zm_flags_to_i8;
use crate::error::{GpkgError, Result};
use crate::ogc_sql::{
    SQL_DELETE_GPKG_CONTENTS, SQL_DELETE_GPKG_EXTENSIONS, SQL_DELETE_GPKG_GEOMETRY_COLUMNS,
    SQL_GEOMETRY_COLUMNS_ROW_EXISTS, SQL_INSERT_GPKG_CONTENTS, SQL_INSERT_GPKG_GEOMETRY_COLUMNS,
    SQL_TABLE_EXISTS, initialize_gpkg, insert_srs, quote_ident, sql_create_table, sql_drop_table,
};
use crate::sql_functions::register_spatial_functions;
use crate::types::GpkgConfig;
use rusqlite::OpenFlags;
use std::path::Path;

use super::layer::GpkgLayer;
use super::schema::{FeatureTableDescriptor, SchemaRegistry, ValidationIssue};
use super::scope::WriteScope;
use super::srs::{SpatialRefRegistry, SpatialRefSys};

#[derive(Debug)]
/// GeoPackage container handle.
///
/// Owns the SQLite connection together with the spatial reference and schema
/// registries loaded from it. Registering reference systems or tables needs
/// `&mut self`; reading and writing rows goes through `GpkgLayer`, which
/// borrows the handle.
pub struct Gpkg {
    conn: rusqlite::Connection,
    read_only: bool,
    config: GpkgConfig,
    srs: SpatialRefRegistry,
    schema: SchemaRegistry,
}

impl Gpkg {
    /// Open an existing GeoPackage in read-only mode.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = rusqlite::Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::from_connection(conn, true)
    }

    /// Open an existing GeoPackage in read-write mode.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GpkgError::Message(format!(
                "GeoPackage file does not exist: {}",
                path.display()
            )));
        }

        let conn = rusqlite::Connection::open(path)?;
        Self::from_connection(conn, false)
    }

    /// Create a new GeoPackage file. Fails if the file already exists.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(GpkgError::Message(format!(
                "GeoPackage file already exists: {}",
                path.display()
            )));
        }

        let conn = rusqlite::Connection::open(path)?;
        initialize_gpkg(&conn)?;
        log::info!("created GeoPackage {}", path.display());
        Self::from_connection(conn, false)
    }

    /// Create a new GeoPackage in memory.
    pub fn new_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;
        initialize_gpkg(&conn)?;
        Self::from_connection(conn, false)
    }

    /// Wrap an already initialized connection: register the SQL functions,
    /// load the spatial reference systems, then discover the feature tables.
    pub(crate) fn from_connection(conn: rusqlite::Connection, read_only: bool) -> Result<Self> {
        register_spatial_functions(&conn)?;

        let mut srs = SpatialRefRegistry::load(&conn)?;
        let missing = srs.ensure_defaults();
        if !missing.is_empty() && !read_only {
            let scope = WriteScope::begin(&conn)?;
            for default in &missing {
                insert_srs(&conn, default)?;
            }
            scope.commit()?;
            log::info!("added {} missing default spatial reference systems", missing.len());
        }

        let schema = SchemaRegistry::discover(&conn, &srs)?;

        Ok(Self {
            conn,
            read_only,
            config: GpkgConfig::default(),
            srs,
            schema,
        })
    }

    /// Replace the handle's configuration.
    ///
    /// Example:
    /// ```
    /// use geopackage::{EnvelopePolicy, Gpkg, GpkgConfig};
    ///
    /// let gpkg = Gpkg::new_in_memory()?.with_config(GpkgConfig {
    ///     envelope: EnvelopePolicy::None,
    ///     read_page_size: 1024,
    ///     ..GpkgConfig::default()
    /// });
    /// assert_eq!(gpkg.config().read_page_size, 1024);
    /// # Ok::<(), geopackage::GpkgError>(())
    /// ```
    pub fn with_config(mut self, config: GpkgConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &GpkgConfig {
        &self.config
    }

    /// Spatial reference systems known to this container.
    pub fn srs(&self) -> &SpatialRefRegistry {
        &self.srs
    }

    /// Feature and attribute tables known to this container.
    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    /// Register a spatial reference system in `gpkg_spatial_ref_sys`.
    ///
    /// GeoPackage layers must reference a valid `srs_id`. This crate does not
    /// bundle an EPSG catalog, so callers register what they need. An
    /// identical definition that is already registered is accepted as is.
    ///
    /// Example: register EPSG:3857 (Web Mercator / Pseudo-Mercator).
    /// ```
    /// use geopackage::{Gpkg, SpatialRefSys};
    ///
    /// let mut gpkg = Gpkg::new_in_memory()?;
    /// let definition = r#"PROJCS["WGS 84 / Pseudo-Mercator",GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563]],PRIMEM["Greenwich",0],UNIT["degree",0.0174532925199433]],PROJECTION["Mercator_1SP"],UNIT["metre",1],AUTHORITY["EPSG","3857"]]"#;
    /// gpkg.register_srs(
    ///     SpatialRefSys::new("WGS 84 / Pseudo-Mercator", 3857, "EPSG", 3857, definition)
    ///         .with_description("Web Mercator / Pseudo-Mercator (EPSG:3857)"),
    /// )?;
    /// assert_eq!(gpkg.srs().resolve(3857)?.organization, "EPSG");
    /// # Ok::<(), geopackage::GpkgError>(())
    /// ```
    pub fn register_srs(&mut self, srs: SpatialRefSys) -> Result<()> {
        self.ensure_writable()?;
        if !self.srs.check(&srs)? {
            return Ok(());
        }

        let scope = WriteScope::begin(&self.conn)?;
        insert_srs(&self.conn, &srs)?;
        scope.commit()?;

        log::info!(
            "registered srs_id {} ({}:{})",
            srs.srs_id,
            srs.organization,
            srs.organization_coordsys_id
        );
        self.srs.register(srs)
    }

    /// Create a feature table and register it.
    ///
    /// A descriptor built with `FeatureTableDescriptor::attributes` creates an
    /// attribute table instead: it is listed in `gpkg_contents` with data type
    /// `attributes` and gets no `gpkg_geometry_columns` row.
    ///
    /// The descriptor is validated first; on any error neither the store nor
    /// the registry is changed. Table names are compared ignoring ASCII case.
    ///
    /// Example:
    /// ```
    /// use geopackage::{
    ///     ColumnSpec, ColumnType, FeatureTableDescriptor, GeometryColumn, GeometryType, Gpkg,
    /// };
    ///
    /// let mut gpkg = Gpkg::new_in_memory()?;
    /// let descriptor = FeatureTableDescriptor::new(
    ///     "roads",
    ///     GeometryColumn::new("geom", GeometryType::LineString, -1),
    /// )
    /// .with_column(ColumnSpec::primary_key("fid"))
    /// .with_column(ColumnSpec::new("name", ColumnType::Text));
    /// gpkg.create_layer(descriptor)?;
    /// assert_eq!(gpkg.list_layers(), vec!["roads"]);
    /// # Ok::<(), geopackage::GpkgError>(())
    /// ```
    pub fn create_layer(&mut self, descriptor: FeatureTableDescriptor) -> Result<GpkgLayer<'_>> {
        self.ensure_writable()?;
        self.schema.check_registration(&descriptor, &self.srs)?;

        let table_name = descriptor.table_name.clone();
        let scope = WriteScope::begin(&self.conn)?;
        self.conn
            .execute_batch(&sql_create_table(&table_name, &column_defs(&descriptor)))?;
        self.conn.execute(
            SQL_INSERT_GPKG_CONTENTS,
            rusqlite::params![
                table_name,
                descriptor.data_type(),
                table_name,
                descriptor.srs_id()
            ],
        )?;
        if let Some(geometry) = &descriptor.geometry_column {
            let (z, m) = zm_flags_to_i8(geometry.z, geometry.m);
            self.conn.execute(
                SQL_INSERT_GPKG_GEOMETRY_COLUMNS,
                rusqlite::params![
                    table_name,
                    geometry.name,
                    geometry.geometry_type.name(),
                    geometry.srs_id,
                    z,
                    m
                ],
            )?;
        }
        scope.commit()?;

        let data_type = descriptor.data_type();
        self.schema.register_table(descriptor, &self.srs)?;
        log::info!("created {data_type} table '{table_name}'");
        self.get_layer(&table_name)
    }

    /// Look up a registered feature or attribute table.
    pub fn get_layer(&self, layer_name: &str) -> Result<GpkgLayer<'_>> {
        let descriptor = self.schema.get(layer_name)?;
        GpkgLayer::new(self, descriptor)
    }

    /// List the names of the feature tables in registration order.
    pub fn list_layers(&self) -> Vec<&str> {
        self.schema.list()
    }

    /// List the names of the attribute tables in registration order.
    pub fn list_attribute_tables(&self) -> Vec<&str> {
        self.schema.list_attributes()
    }

    /// Drop a feature or attribute table and its metadata rows.
    pub fn delete_layer(&mut self, layer_name: &str) -> Result<()> {
        self.ensure_writable()?;
        let layer_name = self.schema.get(layer_name)?.table_name.clone();
        let layer_name = layer_name.as_str();

        let scope = WriteScope::begin(&self.conn)?;
        self.conn.execute_batch(&sql_drop_table(layer_name))?;
        self.conn.execute(SQL_DELETE_GPKG_GEOMETRY_COLUMNS, [layer_name])?;
        self.conn.execute(SQL_DELETE_GPKG_EXTENSIONS, [layer_name])?;
        self.conn.execute(SQL_DELETE_GPKG_CONTENTS, [layer_name])?;
        scope.commit()?;

        self.schema.remove(layer_name);
        log::info!("deleted table '{layer_name}'");
        Ok(())
    }

    /// Check the registries against each other and against the store.
    /// Every problem found is reported.
    pub fn validate(&self) -> Result<Vec<ValidationIssue>> {
        let mut issues = self.schema.validate(&self.srs);
        for table in self.schema.iter() {
            let table_name = &table.table_name;
            let exists: bool = self
                .conn
                .query_row(SQL_TABLE_EXISTS, [table_name], |row| row.get(0))?;
            if !exists {
                issues.push(ValidationIssue::MissingTable {
                    table_name: table_name.clone(),
                });
            }
            if table.is_attributes() {
                continue;
            }
            let described: bool =
                self.conn
                    .query_row(SQL_GEOMETRY_COLUMNS_ROW_EXISTS, [table_name], |row| row.get(0))?;
            if !described {
                issues.push(ValidationIssue::MissingGeometryColumnsRow {
                    table_name: table_name.clone(),
                });
            }
        }
        Ok(issues)
    }

    /// Run several writes as one unit: they all become visible if `f`
    /// returns `Ok`, and none of them otherwise.
    ///
    /// Example:
    /// ```
    /// use geopackage::{
    ///     ColumnSpec, FeatureTableDescriptor, GeometryColumn, GeometryType, GeometryValue, Gpkg,
    ///     GpkgError, Value,
    /// };
    ///
    /// let mut gpkg = Gpkg::new_in_memory()?;
    /// gpkg.create_layer(
    ///     FeatureTableDescriptor::new("pins", GeometryColumn::new("geom", GeometryType::Point, 0))
    ///         .with_column(ColumnSpec::primary_key("fid")),
    /// )?;
    ///
    /// let result: Result<(), GpkgError> = gpkg.atomic(|gpkg| {
    ///     let pins = gpkg.get_layer("pins")?;
    ///     pins.insert([("geom", Value::from(GeometryValue::point(1.0, 1.0)))])?;
    ///     Err(GpkgError::Message("changed my mind".to_string()))
    /// });
    /// assert!(result.is_err());
    /// assert_eq!(gpkg.get_layer("pins")?.count()?, 0);
    /// # Ok::<(), geopackage::GpkgError>(())
    /// ```
    pub fn atomic<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        self.ensure_writable()?;
        let scope = WriteScope::begin(&self.conn)?;
        let out = f(self)?;
        scope.commit()?;
        Ok(out)
    }

    /// Close the connection, reporting any error SQLite returns.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, err)| GpkgError::Sql(err))
    }

    pub(crate) fn connection(&self) -> &rusqlite::Connection {
        &self.conn
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(GpkgError::ReadOnly);
        }
        Ok(())
    }
}

/// Column definitions for `CREATE TABLE`: primary key, geometry if any, then
/// the remaining columns in descriptor order.
fn column_defs(descriptor: &FeatureTableDescriptor) -> String {
    let mut defs = Vec::with_capacity(descriptor.columns.len() + 1);
    if let Some(key) = descriptor.primary_key() {
        defs.push(format!(
            "{} INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL",
            quote_ident(&key.name)
        ));
    }

    if let Some(geometry) = &descriptor.geometry_column {
        let not_null = if geometry.nullable { "" } else { " NOT NULL" };
        defs.push(format!(
            "{} {}{not_null}",
            quote_ident(&geometry.name),
            geometry.geometry_type.name()
        ));
    }

    for column in descriptor.attribute_columns() {
        let not_null = if column.nullable { "" } else { " NOT NULL" };
        defs.push(format!(
            "{} {}{not_null}",
            quote_ident(&column.name),
            column.column_type.sql_name()
        ));
    }
    defs.join(", ")
}

use crate::Value;
use crate::error::{GpkgError, Result};
use crate::geometry::{
    Envelope, GeometryValue, UNDEFINED_CARTESIAN_SRS_ID, UNDEFINED_GEOGRAPHIC_SRS_ID,
    encode_gpkg_geometry_with,
};
use crate::ogc_sql::{
    SQL_SELECT_EXTENT, SQL_SELECT_LAST_CHANGE, SQL_TOUCH_LAST_CHANGE, SQL_UPDATE_EXTENT,
    sql_compute_extent, sql_count_rows, sql_delete_all, sql_delete_row, sql_insert_row,
    sql_row_exists, sql_select_row_by_id, sql_select_rows_page, sql_update_row,
};
use crate::types::ColumnSpec;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use std::collections::HashSet;
use std::sync::Arc;

use super::row::{GpkgRowIter, Row, RowLayout};
use super::schema::{FeatureTableDescriptor, GeometryColumn};
use super::scope::WriteScope;
use super::srs::SpatialRefSys;
use super::Gpkg;

type Bounds = (Option<f64>, Option<f64>, Option<f64>, Option<f64>);

#[derive(Debug)]
/// Row access to one registered feature or attribute table.
///
/// Every write runs in its own write scope, so a failed call leaves the
/// table as it was. Group several writes with `Gpkg::atomic`.
pub struct GpkgLayer<'a> {
    gpkg: &'a Gpkg,
    descriptor: &'a FeatureTableDescriptor,
    primary_key: &'a str,
}

impl<'a> GpkgLayer<'a> {
    pub(crate) fn new(gpkg: &'a Gpkg, descriptor: &'a FeatureTableDescriptor) -> Result<Self> {
        let primary_key = descriptor
            .primary_key()
            .map(|column| column.name.as_str())
            .ok_or_else(|| GpkgError::MissingPrimaryKey {
                table_name: descriptor.table_name.clone(),
            })?;
        Ok(Self {
            gpkg,
            descriptor,
            primary_key,
        })
    }

    pub fn name(&self) -> &'a str {
        &self.descriptor.table_name
    }

    pub fn descriptor(&self) -> &'a FeatureTableDescriptor {
        self.descriptor
    }

    /// The spatial reference system of the geometry column. `None` for an
    /// attribute table.
    pub fn srs(&self) -> Result<Option<&'a SpatialRefSys>> {
        self.descriptor
            .srs_id()
            .map(|srs_id| self.gpkg.srs().resolve(srs_id))
            .transpose()
    }

    /// Lazily read rows in primary key order.
    ///
    /// `filter` is an SQL boolean expression over the table's columns, spliced
    /// into the `WHERE` clause as is. `fields` restricts the columns read; the
    /// primary key is always included and comes first. Rows whose geometry
    /// SRS id differs from the table's are returned with
    /// `Row::srs_mismatch` set.
    ///
    /// Example:
    /// ```
    /// use geopackage::{
    ///     ColumnSpec, ColumnType, FeatureTableDescriptor, GeometryColumn, GeometryType,
    ///     GeometryValue, Gpkg, Value,
    /// };
    ///
    /// let mut gpkg = Gpkg::new_in_memory()?;
    /// gpkg.create_layer(
    ///     FeatureTableDescriptor::new("wells", GeometryColumn::new("geom", GeometryType::Point, 0))
    ///         .with_column(ColumnSpec::primary_key("fid"))
    ///         .with_column(ColumnSpec::new("depth", ColumnType::Double)),
    /// )?;
    /// let wells = gpkg.get_layer("wells")?;
    /// for depth in [12.5, 80.0, 140.0] {
    ///     wells.insert([
    ///         ("geom", Value::from(GeometryValue::point(0.0, 0.0))),
    ///         ("depth", Value::from(depth)),
    ///     ])?;
    /// }
    ///
    /// let mut depths = Vec::new();
    /// for row in wells.read(Some("depth > 50"), Some(&["depth"]))? {
    ///     let row = row?;
    ///     let depth: f64 = row.get("depth").cloned().unwrap_or_default().try_into()?;
    ///     depths.push(depth);
    /// }
    /// assert_eq!(depths, vec![80.0, 140.0]);
    /// # Ok::<(), geopackage::GpkgError>(())
    /// ```
    pub fn read(&self, filter: Option<&str>, fields: Option<&[&str]>) -> Result<GpkgRowIter<'a>> {
        let columns = self.projection(fields)?;
        let page_size = self.gpkg.config().page_size();
        let sql = sql_select_rows_page(
            self.name(),
            self.primary_key,
            columns.iter().map(String::as_str),
            filter,
            page_size,
        );
        let stmt = self.gpkg.connection().prepare(&sql)?;
        Ok(GpkgRowIter::new(stmt, self.layout(columns), page_size))
    }

    /// Lazily read every row with every column.
    pub fn rows(&self) -> Result<GpkgRowIter<'a>> {
        self.read(None, None)
    }

    /// Read one row by primary key.
    pub fn get(&self, id: i64) -> Result<Row> {
        let columns = self.projection(None)?;
        let sql =
            sql_select_row_by_id(self.name(), self.primary_key, columns.iter().map(String::as_str));
        let layout = self.layout(columns);

        let mut stmt = self.gpkg.connection().prepare(&sql)?;
        let mut rows = stmt.query([id])?;
        let Some(row) = rows.next()? else {
            return Err(self.row_not_found(id));
        };
        let values = layout.read_raw(row)?;
        layout.decode(values)
    }

    pub fn count(&self) -> Result<i64> {
        Ok(self
            .gpkg
            .connection()
            .query_row(&sql_count_rows(self.name()), [], |row| row.get(0))?)
    }

    /// Insert a row given as `(column, value)` pairs and return its primary key.
    ///
    /// Columns left out get their SQL default (`NULL` for attributes, a fresh
    /// key for the primary key). A geometry whose SRS id is undefined (0 or
    /// -1) is stored with the table's SRS id.
    ///
    /// Example:
    /// ```
    /// use geopackage::{
    ///     ColumnSpec, ColumnType, FeatureTableDescriptor, GeometryColumn, GeometryType,
    ///     GeometryValue, Gpkg, Value,
    /// };
    ///
    /// let mut gpkg = Gpkg::new_in_memory()?;
    /// gpkg.create_layer(
    ///     FeatureTableDescriptor::new("towns", GeometryColumn::new("geom", GeometryType::Point, 0))
    ///         .with_column(ColumnSpec::primary_key("fid"))
    ///         .with_column(ColumnSpec::new("name", ColumnType::Text).not_null()),
    /// )?;
    /// let towns = gpkg.get_layer("towns")?;
    /// let id = towns.insert([
    ///     ("geom", Value::from(GeometryValue::point(139.7, 35.7))),
    ///     ("name", Value::from("Tokyo")),
    /// ])?;
    /// assert_eq!(towns.get(id)?.get("name"), Some(&Value::from("Tokyo")));
    /// # Ok::<(), geopackage::GpkgError>(())
    /// ```
    pub fn insert<I, K, V>(&self, values: I) -> Result<i64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.gpkg.ensure_writable()?;
        let values = self.check_values(values, true)?;
        let sql = sql_insert_row(self.name(), values.iter().map(|(name, _)| name.as_str()));

        let conn = self.gpkg.connection();
        let scope = WriteScope::begin(conn)?;
        conn.prepare_cached(&sql)?
            .execute(params_from_iter(values.into_iter().map(|(_, value)| value)))?;
        let id = conn.last_insert_rowid();
        conn.execute(SQL_TOUCH_LAST_CHANGE, [self.name()])?;
        scope.commit()?;
        Ok(id)
    }

    /// Update the given columns of one row. Other columns are left untouched.
    ///
    /// Example:
    /// ```
    /// use geopackage::{
    ///     ColumnSpec, ColumnType, FeatureTableDescriptor, GeometryColumn, GeometryType, Gpkg,
    ///     GpkgError, Value,
    /// };
    ///
    /// let mut gpkg = Gpkg::new_in_memory()?;
    /// gpkg.create_layer(
    ///     FeatureTableDescriptor::new("towns", GeometryColumn::new("geom", GeometryType::Point, 0))
    ///         .with_column(ColumnSpec::primary_key("fid"))
    ///         .with_column(ColumnSpec::new("population", ColumnType::Integer)),
    /// )?;
    /// let towns = gpkg.get_layer("towns")?;
    /// let id = towns.insert([("population", 100)])?;
    /// towns.update(id, [("population", 120)])?;
    /// assert_eq!(towns.get(id)?.get("population"), Some(&Value::Integer(120)));
    ///
    /// let missing = towns.update(id + 1, [("population", 1)]);
    /// assert!(matches!(missing, Err(GpkgError::RowNotFound { .. })));
    /// # Ok::<(), geopackage::GpkgError>(())
    /// ```
    pub fn update<I, K, V>(&self, id: i64, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.gpkg.ensure_writable()?;
        let values = self.check_values(values, false)?;
        let conn = self.gpkg.connection();

        if values.is_empty() {
            let exists: bool =
                conn.query_row(&sql_row_exists(self.name(), self.primary_key), [id], |row| {
                    row.get(0)
                })?;
            return if exists {
                Ok(())
            } else {
                Err(self.row_not_found(id))
            };
        }

        let sql = sql_update_row(
            self.name(),
            self.primary_key,
            values.iter().map(|(name, _)| name.as_str()),
        );
        let params = values
            .into_iter()
            .map(|(_, value)| value)
            .chain(std::iter::once(SqlValue::Integer(id)));

        let scope = WriteScope::begin(conn)?;
        let changed = conn.prepare_cached(&sql)?.execute(params_from_iter(params))?;
        if changed == 0 {
            return Err(self.row_not_found(id));
        }
        conn.execute(SQL_TOUCH_LAST_CHANGE, [self.name()])?;
        scope.commit()?;
        Ok(())
    }

    /// Delete one row by primary key.
    pub fn delete(&self, id: i64) -> Result<()> {
        self.gpkg.ensure_writable()?;
        let conn = self.gpkg.connection();

        let scope = WriteScope::begin(conn)?;
        let changed = conn.execute(&sql_delete_row(self.name(), self.primary_key), [id])?;
        if changed == 0 {
            return Err(self.row_not_found(id));
        }
        conn.execute(SQL_TOUCH_LAST_CHANGE, [self.name()])?;
        scope.commit()?;
        Ok(())
    }

    /// Remove all rows from the layer. Returns the number of rows removed.
    pub fn truncate(&self) -> Result<usize> {
        self.gpkg.ensure_writable()?;
        let conn = self.gpkg.connection();

        let scope = WriteScope::begin(conn)?;
        let removed = conn.execute(&sql_delete_all(self.name()), [])?;
        conn.execute(SQL_TOUCH_LAST_CHANGE, [self.name()])?;
        scope.commit()?;
        log::debug!("removed {removed} rows from '{}'", self.name());
        Ok(removed)
    }

    /// Recompute the XY extent of all non-empty geometries and store it in
    /// `gpkg_contents`. `None` when the table holds no such geometry or is an
    /// attribute table.
    pub fn refresh_extent(&self) -> Result<Option<Envelope>> {
        self.gpkg.ensure_writable()?;
        let Some(geometry_column) = self.geometry_column() else {
            return Ok(None);
        };
        let conn = self.gpkg.connection();
        let sql = sql_compute_extent(self.name(), &geometry_column.name);
        let bounds: Bounds = conn.query_row(&sql, [], read_bounds)?;

        let scope = WriteScope::begin(conn)?;
        conn.execute(
            SQL_UPDATE_EXTENT,
            rusqlite::params![self.name(), bounds.0, bounds.1, bounds.2, bounds.3],
        )?;
        scope.commit()?;
        Ok(envelope_from_bounds(bounds))
    }

    /// The extent last stored in `gpkg_contents`.
    pub fn extent(&self) -> Result<Option<Envelope>> {
        let bounds: Bounds =
            self.gpkg
                .connection()
                .query_row(SQL_SELECT_EXTENT, [self.name()], read_bounds)?;
        Ok(envelope_from_bounds(bounds))
    }

    /// `gpkg_contents.last_change`, an ISO-8601 timestamp.
    pub fn last_change(&self) -> Result<String> {
        Ok(self
            .gpkg
            .connection()
            .query_row(SQL_SELECT_LAST_CHANGE, [self.name()], |row| row.get(0))?)
    }

    fn geometry_column(&self) -> Option<&'a GeometryColumn> {
        self.descriptor.geometry_column.as_ref()
    }

    /// Non-key columns to read, in output order.
    fn projection(&self, fields: Option<&[&str]>) -> Result<Vec<String>> {
        let geometry_column = self.geometry_column().map(|column| column.name.as_str());
        let Some(fields) = fields else {
            return Ok(geometry_column
                .map(str::to_string)
                .into_iter()
                .chain(
                    self.descriptor
                        .attribute_columns()
                        .map(|column| column.name.clone()),
                )
                .collect());
        };

        let mut columns: Vec<String> = Vec::with_capacity(fields.len());
        for &field in fields {
            if field == self.primary_key || columns.iter().any(|c| c == field) {
                continue;
            }
            if Some(field) != geometry_column && self.descriptor.column(field).is_none() {
                return Err(self.unknown_column(field));
            }
            columns.push(field.to_string());
        }
        Ok(columns)
    }

    fn layout(&self, columns: Vec<String>) -> Arc<RowLayout> {
        let names = std::iter::once(self.primary_key.to_string())
            .chain(columns)
            .collect();
        Arc::new(RowLayout::new(
            self.name(),
            names,
            self.geometry_column()
                .map(|column| (column.name.as_str(), column.srs_id)),
        ))
    }

    /// Validate a set of column values against the descriptor and convert
    /// them to what is stored.
    fn check_values<I, K, V>(&self, values: I, insert: bool) -> Result<Vec<(String, SqlValue)>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let geometry_column = self.geometry_column();
        let mut seen = HashSet::new();
        let mut checked = Vec::new();

        for (name, value) in values {
            let name = name.as_ref();
            if !seen.insert(name.to_string()) {
                return Err(GpkgError::SchemaViolation(format!(
                    "column '{name}' given more than once"
                )));
            }

            let stored = if let Some(column) = geometry_column.filter(|c| c.name == name) {
                self.check_geometry(column, value.into())?
            } else {
                let column = self
                    .descriptor
                    .column(name)
                    .ok_or_else(|| self.unknown_column(name))?;
                if column.primary_key && !insert {
                    return Err(GpkgError::SchemaViolation(format!(
                        "primary key '{name}' of table '{}' cannot be updated",
                        self.name()
                    )));
                }
                self.check_attribute(column, value.into())?
            };
            checked.push((name.to_string(), stored));
        }

        if insert {
            let required = geometry_column
                .map(|column| (column.name.as_str(), column.nullable))
                .into_iter()
                .chain(
                    self.descriptor
                        .attribute_columns()
                        .map(|column| (column.name.as_str(), column.nullable)),
                );
            for (name, nullable) in required {
                if !nullable && !seen.contains(name) {
                    return Err(GpkgError::SchemaViolation(format!(
                        "required column '{name}' of table '{}' is missing",
                        self.name()
                    )));
                }
            }
        }

        Ok(checked)
    }

    fn check_geometry(&self, column: &GeometryColumn, value: Value) -> Result<SqlValue> {
        match value {
            Value::Null if column.nullable => Ok(SqlValue::Null),
            Value::Null => Err(GpkgError::SchemaViolation(format!(
                "geometry column '{}' of table '{}' is NOT NULL",
                column.name,
                self.name()
            ))),
            Value::Geometry(geometry) => {
                let geometry = self.conform_geometry(column, geometry)?;
                let config = self.gpkg.config();
                let blob = encode_gpkg_geometry_with(&geometry, config.envelope, config.byte_order)?;
                Ok(SqlValue::Blob(blob))
            }
            other => Err(GpkgError::SchemaViolation(format!(
                "geometry column '{}' of table '{}' cannot store a {} value",
                column.name,
                self.name(),
                other.type_name()
            ))),
        }
    }

    /// Check type, Z/M flags and SRS of a geometry, adopting the table's SRS
    /// when the geometry's is undefined.
    fn conform_geometry(
        &self,
        column: &GeometryColumn,
        mut geometry: GeometryValue,
    ) -> Result<GeometryValue> {
        if !column.geometry_type.accepts(geometry.geometry_type()) {
            return Err(GpkgError::SchemaViolation(format!(
                "table '{}' stores {} geometries, got {}",
                self.name(),
                column.geometry_type.name(),
                geometry.geometry_type().name()
            )));
        }
        if !column.allows_dimension(geometry.dimension) {
            return Err(GpkgError::SchemaViolation(format!(
                "{:?} geometry does not satisfy z={:?} m={:?} of table '{}'",
                geometry.dimension,
                column.z,
                column.m,
                self.name()
            )));
        }

        let srs_id = column.srs_id;
        if geometry.srs_id != srs_id {
            if geometry.srs_id != UNDEFINED_CARTESIAN_SRS_ID
                && geometry.srs_id != UNDEFINED_GEOGRAPHIC_SRS_ID
            {
                return Err(GpkgError::SchemaViolation(format!(
                    "geometry has srs_id {}, table '{}' requires {srs_id}",
                    geometry.srs_id,
                    self.name()
                )));
            }
            geometry.srs_id = srs_id;
        }
        Ok(geometry)
    }

    fn check_attribute(&self, column: &ColumnSpec, value: Value) -> Result<SqlValue> {
        if value.is_null() && !column.nullable {
            return Err(GpkgError::SchemaViolation(format!(
                "column '{}' of table '{}' is NOT NULL",
                column.name,
                self.name()
            )));
        }
        if !column.column_type.accepts(&value) {
            return Err(self.type_mismatch(column, &value));
        }

        Ok(match value {
            Value::Null => SqlValue::Null,
            Value::Integer(v) => SqlValue::Integer(v),
            Value::Real(v) => SqlValue::Real(v),
            Value::Text(v) => SqlValue::Text(v),
            Value::Blob(v) => SqlValue::Blob(v),
            Value::Geometry(_) => return Err(self.type_mismatch(column, &value)),
        })
    }

    fn type_mismatch(&self, column: &ColumnSpec, value: &Value) -> GpkgError {
        GpkgError::SchemaViolation(format!(
            "column '{}' ({}) of table '{}' cannot store a {} value",
            column.name,
            column.column_type.sql_name(),
            self.name(),
            value.type_name()
        ))
    }

    fn unknown_column(&self, name: &str) -> GpkgError {
        GpkgError::SchemaViolation(format!(
            "table '{}' has no column '{name}'",
            self.name()
        ))
    }

    fn row_not_found(&self, id: i64) -> GpkgError {
        GpkgError::RowNotFound {
            table_name: self.name().to_string(),
            id,
        }
    }
}

fn read_bounds(row: &rusqlite::Row<'_>) -> rusqlite::Result<Bounds> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn envelope_from_bounds(bounds: Bounds) -> Option<Envelope> {
    match bounds {
        (Some(min_x), Some(min_y), Some(max_x), Some(max_y)) => Some(Envelope {
            min_x,
            max_x,
            min_y,
            max_y,
            z_range: None,
            m_range: None,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::Result;
    use crate::Value;
    use crate::error::GpkgError;
    use crate::geometry::{
        Coord, Dimension, EnvelopePolicy, Geometry, GeometryType, GeometryValue, GpbHeader,
        encode_gpkg_geometry,
    };
    use crate::gpkg::{FeatureTableDescriptor, GeometryColumn, Gpkg, SpatialRefSys};
    use crate::types::{ColumnSpec, ColumnType, GpkgConfig, ZmFlag};

    fn square(x: f64, y: f64, size: f64) -> Geometry {
        Geometry::Polygon(vec![vec![
            Coord::xy(x, y),
            Coord::xy(x + size, y),
            Coord::xy(x + size, y + size),
            Coord::xy(x, y + size),
            Coord::xy(x, y),
        ]])
    }

    fn census_gpkg() -> Result<Gpkg> {
        let mut gpkg = Gpkg::new_in_memory()?;
        gpkg.register_srs(SpatialRefSys::wgs84())?;
        gpkg.create_layer(
            FeatureTableDescriptor::new(
                "census",
                GeometryColumn::new("geom", GeometryType::Polygon, 4326),
            )
            .with_column(ColumnSpec::primary_key("id"))
            .with_column(ColumnSpec::new("tract", ColumnType::Text).not_null())
            .with_column(ColumnSpec::new("population", ColumnType::Integer))
            .with_column(ColumnSpec::new("density", ColumnType::Double))
            .with_column(ColumnSpec::new("urban", ColumnType::Boolean)),
        )?;
        Ok(gpkg)
    }

    fn snapshot(gpkg: &Gpkg, table_name: &str) -> Result<Vec<Vec<(String, Value)>>> {
        gpkg.get_layer(table_name)?
            .rows()?
            .map(|row| {
                row.map(|row| {
                    row.columns()
                        .map(|(name, value)| (name.to_string(), value.clone()))
                        .collect()
                })
            })
            .collect()
    }

    #[test]
    fn inserted_polygon_reads_back_unchanged() -> Result<()> {
        let gpkg = census_gpkg()?;
        let census = gpkg.get_layer("census")?;
        let polygon = GeometryValue::new(square(0.0, 0.0, 2.0)).with_srs_id(4326);

        let id = census.insert([
            ("geom", Value::from(polygon.clone())),
            ("tract", Value::from("0001.00")),
        ])?;

        let rows = census.rows()?.collect::<Result<Vec<_>>>()?;
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.id(), id);
        assert_eq!(row.geometry(), Some(&polygon));
        assert!(row.srs_mismatch().is_none());
        row.check_srs()?;

        let names: Vec<&str> = row.columns().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec!["id", "geom", "tract", "population", "density", "urban"]
        );
        assert_eq!(row.get("population"), Some(&Value::Null));
        Ok(())
    }

    #[test]
    fn undefined_srs_adopts_table_srs() -> Result<()> {
        let gpkg = census_gpkg()?;
        let census = gpkg.get_layer("census")?;
        let polygon = GeometryValue::new(square(1.0, 1.0, 1.0));
        assert_eq!(polygon.srs_id, 0);

        let id = census.insert([("geom", Value::from(polygon)), ("tract", Value::from("a"))])?;
        let blob: Vec<u8> = gpkg.connection().query_row(
            "SELECT geom FROM census WHERE id = ?1",
            [id],
            |row| row.get(0),
        )?;
        assert_eq!(GpbHeader::parse(&blob)?.srs_id, 4326);
        assert_eq!(census.get(id)?.geometry().map(|g| g.srs_id), Some(4326));
        Ok(())
    }

    #[test]
    fn insert_rejects_schema_violations() -> Result<()> {
        let gpkg = census_gpkg()?;
        let census = gpkg.get_layer("census")?;
        let polygon = || Value::from(GeometryValue::new(square(0.0, 0.0, 1.0)));

        let cases: Vec<Vec<(&str, Value)>> = vec![
            // required column missing
            vec![("geom", polygon())],
            // unknown column
            vec![("tract", Value::from("a")), ("nope", Value::from(1))],
            // wrong attribute type
            vec![("tract", Value::from("a")), ("population", Value::from("many"))],
            vec![("tract", Value::from("a")), ("urban", Value::from(2))],
            // explicit NULL in a NOT NULL column
            vec![("tract", Value::Null)],
            // wrong geometry type
            vec![
                ("tract", Value::from("a")),
                ("geom", Value::from(GeometryValue::point(0.0, 0.0))),
            ],
            // geometry column given a non-geometry value
            vec![("tract", Value::from("a")), ("geom", Value::from(vec![1u8, 2]))],
            // Z on an XY table
            vec![
                ("tract", Value::from("a")),
                (
                    "geom",
                    Value::from(GeometryValue::new(Geometry::Polygon(vec![vec![
                        Coord::xyz(0.0, 0.0, 1.0),
                        Coord::xyz(1.0, 0.0, 1.0),
                        Coord::xyz(0.0, 1.0, 1.0),
                        Coord::xyz(0.0, 0.0, 1.0),
                    ]]))),
                ),
            ],
            // foreign SRS
            vec![
                ("tract", Value::from("a")),
                (
                    "geom",
                    Value::from(GeometryValue::new(square(0.0, 0.0, 1.0)).with_srs_id(3857)),
                ),
            ],
            // same column twice
            vec![("tract", Value::from("a")), ("tract", Value::from("b"))],
        ];

        for values in cases {
            let result = census.insert(values.clone());
            assert!(
                matches!(result, Err(GpkgError::SchemaViolation(_))),
                "{values:?} gave {result:?}"
            );
        }
        assert_eq!(census.count()?, 0);
        Ok(())
    }

    #[test]
    fn update_missing_row_leaves_table_unchanged() -> Result<()> {
        let gpkg = census_gpkg()?;
        let census = gpkg.get_layer("census")?;
        let id = census.insert([
            ("geom", Value::from(GeometryValue::new(square(0.0, 0.0, 1.0)))),
            ("tract", Value::from("a")),
            ("population", Value::from(10)),
        ])?;
        let before = snapshot(&gpkg, "census")?;

        let result = census.update(id + 100, [("population", Value::from(11))]);
        assert!(matches!(
            result,
            Err(GpkgError::RowNotFound { ref table_name, id: missing }) if table_name == "census" && missing == id + 100
        ));
        assert!(matches!(
            census.update(id + 100, Vec::<(&str, Value)>::new()),
            Err(GpkgError::RowNotFound { .. })
        ));
        assert_eq!(snapshot(&gpkg, "census")?, before);
        Ok(())
    }

    #[test]
    fn partial_update_keeps_other_columns() -> Result<()> {
        let gpkg = census_gpkg()?;
        let census = gpkg.get_layer("census")?;
        let polygon = GeometryValue::new(square(0.0, 0.0, 1.0)).with_srs_id(4326);
        let id = census.insert([
            ("geom", Value::from(polygon.clone())),
            ("tract", Value::from("a")),
            ("population", Value::from(10)),
            ("urban", Value::from(true)),
        ])?;

        census.update(
            id,
            [("population", Value::from(25)), ("density", Value::from(2.5))],
        )?;
        let row = census.get(id)?;
        assert_eq!(row.geometry(), Some(&polygon));
        assert_eq!(row.get("tract"), Some(&Value::from("a")));
        assert_eq!(row.get("population"), Some(&Value::Integer(25)));
        assert_eq!(row.get("density"), Some(&Value::Real(2.5)));
        let urban: bool = row.get("urban").cloned().unwrap_or_default().try_into()?;
        assert!(urban);

        census.update(id, [("geom", Value::Null)])?;
        assert_eq!(census.get(id)?.geometry(), None);

        assert!(matches!(
            census.update(id, [("id", Value::from(99))]),
            Err(GpkgError::SchemaViolation(_))
        ));
        Ok(())
    }

    #[test]
    fn delete_and_truncate() -> Result<()> {
        let gpkg = census_gpkg()?;
        let census = gpkg.get_layer("census")?;
        let mut ids = Vec::new();
        for tract in ["a", "b", "c"] {
            ids.push(census.insert([("tract", tract)])?);
        }

        census.delete(ids[1])?;
        assert_eq!(census.count()?, 2);
        assert!(matches!(
            census.delete(ids[1]),
            Err(GpkgError::RowNotFound { .. })
        ));
        assert!(matches!(
            census.get(ids[1]),
            Err(GpkgError::RowNotFound { .. })
        ));

        assert_eq!(census.truncate()?, 2);
        assert_eq!(census.count()?, 0);
        Ok(())
    }

    #[test]
    fn read_projects_filters_and_pages() -> Result<()> {
        let gpkg = census_gpkg()?.with_config(GpkgConfig {
            read_page_size: 2,
            ..GpkgConfig::default()
        });
        let census = gpkg.get_layer("census")?;
        for population in 1..=7 {
            census.insert([
                ("tract", Value::from(format!("t{population}"))),
                ("population", Value::from(population)),
            ])?;
        }

        let rows = census
            .read(None, Some(&["population", "tract", "id"]))?
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(rows.len(), 7);
        let names: Vec<&str> = rows[0].columns().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["id", "population", "tract"]);
        assert!(rows[0].get("geom").is_none());
        let ids: Vec<i64> = rows.iter().map(|row| row.id()).collect();
        assert_eq!(ids, (1..=7).collect::<Vec<i64>>());

        let populations = census
            .read(Some("population % 2 = 0"), Some(&["population"]))?
            .map(|row| row.and_then(|mut row| i64::try_from(row.take("population").unwrap_or_default())))
            .collect::<Result<Vec<i64>>>()?;
        assert_eq!(populations, vec![2, 4, 6]);

        assert!(matches!(
            census.read(None, Some(&["missing"])),
            Err(GpkgError::SchemaViolation(_))
        ));
        Ok(())
    }

    #[test]
    fn row_sequence_is_lazy() -> Result<()> {
        let gpkg = census_gpkg()?.with_config(GpkgConfig {
            read_page_size: 1,
            ..GpkgConfig::default()
        });
        let census = gpkg.get_layer("census")?;
        census.insert([("tract", "a")])?;
        census.insert([("tract", "b")])?;

        let mut rows = census.rows()?;
        let first = rows.next().expect("first row")?;
        assert_eq!(first.get("tract"), Some(&Value::from("a")));

        // a row added mid-scan past the cursor is still seen
        census.insert([("tract", "c")])?;
        let rest = rows.collect::<Result<Vec<_>>>()?;
        let tracts: Vec<&Value> = rest.iter().filter_map(|row| row.get("tract")).collect();
        assert_eq!(tracts, vec![&Value::from("b"), &Value::from("c")]);
        Ok(())
    }

    #[test]
    fn foreign_srs_rows_are_flagged_not_dropped() -> Result<()> {
        let gpkg = census_gpkg()?;
        let census = gpkg.get_layer("census")?;
        let foreign = encode_gpkg_geometry(
            &GeometryValue::new(square(0.0, 0.0, 1.0)).with_srs_id(3857),
            EnvelopePolicy::Xy,
        )?;
        gpkg.connection().execute(
            "INSERT INTO census (geom, tract) VALUES (?1, 'legacy')",
            [foreign],
        )?;
        census.insert([("tract", "fresh")])?;

        let rows = census.rows()?.collect::<Result<Vec<_>>>()?;
        assert_eq!(rows.len(), 2);
        let mismatch = rows[0].srs_mismatch().expect("flagged");
        assert_eq!((mismatch.expected, mismatch.found), (4326, 3857));
        assert!(matches!(
            rows[0].check_srs(),
            Err(GpkgError::SrsMismatch { .. })
        ));
        assert!(rows[1].srs_mismatch().is_none());
        Ok(())
    }

    #[test]
    fn corrupt_geometry_ends_the_sequence_with_an_error() -> Result<()> {
        let gpkg = census_gpkg()?;
        let census = gpkg.get_layer("census")?;
        gpkg.connection().execute(
            "INSERT INTO census (geom, tract) VALUES (x'00000000', 'broken')",
            [],
        )?;
        census.insert([("tract", "fine")])?;

        let mut rows = census.rows()?;
        assert!(matches!(
            rows.next(),
            Some(Err(GpkgError::MalformedHeader(_)))
        ));
        assert!(rows.next().is_none());
        Ok(())
    }

    #[test]
    fn atomic_groups_writes() -> Result<()> {
        let gpkg = census_gpkg()?;
        let result: Result<()> = gpkg.atomic(|gpkg| {
            let census = gpkg.get_layer("census")?;
            census.insert([("tract", "a")])?;
            census.insert([("tract", Value::Null)])?;
            Ok(())
        });
        assert!(matches!(result, Err(GpkgError::SchemaViolation(_))));
        assert_eq!(gpkg.get_layer("census")?.count()?, 0);

        gpkg.atomic(|gpkg| {
            let census = gpkg.get_layer("census")?;
            census.insert([("tract", "a")])?;
            census.insert([("tract", "b")])?;
            Ok(())
        })?;
        assert_eq!(gpkg.get_layer("census")?.count()?, 2);
        Ok(())
    }

    #[test]
    fn extent_follows_geometries() -> Result<()> {
        let gpkg = census_gpkg()?.with_config(GpkgConfig {
            envelope: EnvelopePolicy::None,
            ..GpkgConfig::default()
        });
        let census = gpkg.get_layer("census")?;
        assert_eq!(census.refresh_extent()?, None);

        census.insert([
            ("geom", Value::from(GeometryValue::new(square(0.0, 0.0, 1.0)))),
            ("tract", Value::from("a")),
        ])?;
        census.insert([
            ("geom", Value::from(GeometryValue::new(square(-3.0, 5.0, 2.0)))),
            ("tract", Value::from("b")),
        ])?;
        census.insert([
            (
                "geom",
                Value::from(GeometryValue::new(Geometry::Polygon(Vec::new()))),
            ),
            ("tract", Value::from("empty")),
        ])?;

        let extent = census.refresh_extent()?.expect("extent");
        assert_eq!(
            (extent.min_x, extent.min_y, extent.max_x, extent.max_y),
            (-3.0, 0.0, 1.0, 7.0)
        );
        assert_eq!(census.extent()?, Some(extent));
        Ok(())
    }

    #[test]
    fn writes_touch_last_change() -> Result<()> {
        let gpkg = census_gpkg()?;
        let census = gpkg.get_layer("census")?;
        gpkg.connection().execute(
            "UPDATE gpkg_contents SET last_change = '2000-01-01T00:00:00.000Z'",
            [],
        )?;

        census.insert([("tract", "a")])?;
        let last_change = census.last_change()?;
        assert_ne!(last_change, "2000-01-01T00:00:00.000Z");
        assert!(last_change.ends_with('Z'));
        Ok(())
    }

    #[test]
    fn zm_flags_and_generic_columns() -> Result<()> {
        let mut gpkg = Gpkg::new_in_memory()?;
        gpkg.create_layer(
            FeatureTableDescriptor::new(
                "tracks",
                GeometryColumn::new("geom", GeometryType::Geometry, -1)
                    .with_z(ZmFlag::Mandatory)
                    .with_m(ZmFlag::Optional),
            )
            .with_column(ColumnSpec::primary_key("fid")),
        )?;
        let tracks = gpkg.get_layer("tracks")?;

        let line_zm = GeometryValue::new(Geometry::LineString(vec![
            Coord::xyzm(0.0, 0.0, 1.0, 0.0),
            Coord::xyzm(1.0, 1.0, 2.0, 5.0),
        ]));
        let point_z = GeometryValue::new(Geometry::Point(Some(Coord::xyz(0.0, 0.0, 3.0))));
        let point_xy = GeometryValue::point(0.0, 0.0);

        let id = tracks.insert([("geom", line_zm.clone())])?;
        tracks.insert([("geom", point_z)])?;
        assert!(matches!(
            tracks.insert([("geom", point_xy)]),
            Err(GpkgError::SchemaViolation(_))
        ));

        let stored = tracks.get(id)?;
        let geometry = stored.geometry().expect("geometry");
        assert_eq!(geometry.dimension, Dimension::Xyzm);
        assert_eq!(geometry.geometry, line_zm.geometry);
        assert_eq!(geometry.srs_id, -1);
        Ok(())
    }

    #[test]
    fn read_only_layer_rejects_writes() -> Result<()> {
        let path = std::env::temp_dir().join(format!(
            "geopackage_layer_read_only_{}.gpkg",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        {
            let mut gpkg = Gpkg::new(&path)?;
            gpkg.create_layer(
                FeatureTableDescriptor::new("pins", GeometryColumn::new("geom", GeometryType::Point, 0))
                    .with_column(ColumnSpec::primary_key("fid")),
            )?
            .insert([("geom", GeometryValue::point(1.0, 2.0))])?;
        }

        let gpkg = Gpkg::open_read_only(&path)?;
        let pins = gpkg.get_layer("pins")?;
        assert_eq!(pins.count()?, 1);
        assert!(matches!(
            pins.insert([("geom", GeometryValue::point(0.0, 0.0))]),
            Err(GpkgError::ReadOnly)
        ));
        assert!(matches!(pins.delete(1), Err(GpkgError::ReadOnly)));
        assert!(matches!(pins.truncate(), Err(GpkgError::ReadOnly)));
        drop(gpkg);

        let _ = std::fs::remove_file(&path);
        Ok(())
    }
}

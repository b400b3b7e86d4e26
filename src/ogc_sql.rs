// cf. https://www.geopackage.org/spec140/index.html#table_definition_sql

use crate::gpkg::SpatialRefSys;

// "GPKG" in ASCII, written to the SQLite header so tools can identify the file.
pub(crate) const GPKG_APPLICATION_ID: i32 = 0x4750_4B47;
// GeoPackage 1.4.0
pub(crate) const GPKG_USER_VERSION: i32 = 10400;

// gpkg_spatial_ref_sys: the SRS catalog referenced by gpkg_contents and
// gpkg_geometry_columns to describe spatial reference systems.
pub(crate) const SQL_GPKG_SPATIAL_REF_SYS: &str = "
CREATE TABLE gpkg_spatial_ref_sys (
  srs_name TEXT NOT NULL,
  srs_id INTEGER PRIMARY KEY,
  organization TEXT NOT NULL,
  organization_coordsys_id INTEGER NOT NULL,
  definition  TEXT NOT NULL,
  description TEXT
);
";

// gpkg_contents: lists all geospatial contents in the package with identifying
// and descriptive metadata for user display and access.
pub(crate) const SQL_GPKG_CONTENTS: &str = "
CREATE TABLE gpkg_contents (
  table_name TEXT NOT NULL PRIMARY KEY,
  data_type TEXT NOT NULL,
  identifier TEXT UNIQUE,
  description TEXT DEFAULT '',
  last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
  min_x DOUBLE,
  min_y DOUBLE,
  max_x DOUBLE,
  max_y DOUBLE,
  srs_id INTEGER,
  CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
";

// gpkg_geometry_columns: identifies geometry columns and geometry types for
// vector feature user data tables.
pub(crate) const SQL_GPKG_GEOMETRY_COLUMNS: &str = "
CREATE TABLE gpkg_geometry_columns (
  table_name TEXT NOT NULL,
  column_name TEXT NOT NULL,
  geometry_type_name TEXT NOT NULL,
  srs_id INTEGER NOT NULL,
  z TINYINT NOT NULL,
  m TINYINT NOT NULL,
  CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
  CONSTRAINT uk_gc_table_name UNIQUE (table_name),
  CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
  CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys (srs_id)
);
";

// gpkg_extensions: declares which extensions apply to the GeoPackage, a table,
// or a column so clients can detect requirements without scanning user tables.
pub(crate) const SQL_GPKG_EXTENSIONS: &str = "
CREATE TABLE gpkg_extensions (
  table_name TEXT,
  column_name TEXT,
  extension_name TEXT NOT NULL,
  definition TEXT NOT NULL,
  scope TEXT NOT NULL,
  CONSTRAINT ge_tce UNIQUE (table_name, column_name, extension_name)
);
";

pub(crate) const SQL_INSERT_SRS: &str = "
INSERT INTO gpkg_spatial_ref_sys
  (srs_name, srs_id, organization, organization_coordsys_id, definition, description)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6)
";

pub(crate) const SQL_SELECT_SRS: &str = "
SELECT srs_name, srs_id, organization, organization_coordsys_id, definition, description
FROM gpkg_spatial_ref_sys
ORDER BY srs_id
";

pub(crate) const SQL_INSERT_GPKG_CONTENTS: &str = "
INSERT INTO gpkg_contents
  (table_name, data_type, identifier, description, srs_id)
VALUES
  (?1, ?2, ?3, '', ?4)
";

pub(crate) const SQL_INSERT_GPKG_GEOMETRY_COLUMNS: &str = "
INSERT INTO gpkg_geometry_columns
  (table_name, column_name, geometry_type_name, srs_id, z, m)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6)
";

// Feature and attribute tables in registration order. A NULL column_name
// means the table has no gpkg_geometry_columns row.
pub(crate) const SQL_SELECT_USER_TABLES: &str = "
SELECT c.table_name, c.data_type, c.srs_id,
       g.column_name, g.geometry_type_name, g.srs_id, g.z, g.m
FROM gpkg_contents c
LEFT JOIN gpkg_geometry_columns g ON g.table_name = c.table_name
WHERE c.data_type IN ('features', 'attributes')
ORDER BY c.rowid
";

pub(crate) const SQL_SELECT_ORPHAN_GEOMETRY_COLUMNS: &str = "
SELECT table_name FROM gpkg_geometry_columns
WHERE table_name NOT IN (SELECT table_name FROM gpkg_contents)
";

pub(crate) const SQL_GEOMETRY_COLUMNS_ROW_EXISTS: &str =
    "SELECT EXISTS(SELECT 1 FROM gpkg_geometry_columns WHERE table_name = ?1)";

pub(crate) const SQL_TABLE_EXISTS: &str =
    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)";

pub(crate) const SQL_TABLE_COLUMNS: &str =
    r#"SELECT name, type, "notnull", pk FROM pragma_table_info(?1) ORDER BY cid"#;

pub(crate) const SQL_DELETE_GPKG_CONTENTS: &str = "DELETE FROM gpkg_contents WHERE table_name = ?1";

pub(crate) const SQL_DELETE_GPKG_GEOMETRY_COLUMNS: &str =
    "DELETE FROM gpkg_geometry_columns WHERE table_name = ?1";

pub(crate) const SQL_DELETE_GPKG_EXTENSIONS: &str =
    "DELETE FROM gpkg_extensions WHERE table_name = ?1";

pub(crate) const SQL_TOUCH_LAST_CHANGE: &str = "
UPDATE gpkg_contents
SET last_change = strftime('%Y-%m-%dT%H:%M:%fZ','now')
WHERE table_name = ?1
";

pub(crate) const SQL_UPDATE_EXTENT: &str = "
UPDATE gpkg_contents
SET min_x = ?2, min_y = ?3, max_x = ?4, max_y = ?5
WHERE table_name = ?1
";

pub(crate) const SQL_SELECT_EXTENT: &str =
    "SELECT min_x, min_y, max_x, max_y FROM gpkg_contents WHERE table_name = ?1";

pub(crate) const SQL_SELECT_LAST_CHANGE: &str =
    "SELECT last_change FROM gpkg_contents WHERE table_name = ?1";

/// Quote an SQL identifier, doubling embedded quotes.
pub(crate) fn quote_ident(name: &str) -> String {
    format!(r#""{}""#, name.replace('"', r#""""#))
}

pub(crate) fn sql_create_table(layer_name: &str, column_defs: &str) -> String {
    format!("CREATE TABLE {} ({})", quote_ident(layer_name), column_defs)
}

pub(crate) fn sql_drop_table(layer_name: &str) -> String {
    format!("DROP TABLE {}", quote_ident(layer_name))
}

/// One page of a keyset scan. `?1` is the last primary key seen, or NULL for
/// the first page.
pub(crate) fn sql_select_rows_page<'a, I>(
    layer_name: &str,
    primary_key_column: &str,
    columns: I,
    filter: Option<&str>,
    page_size: u32,
) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let pk = quote_ident(primary_key_column);
    let columns = std::iter::once(pk.clone())
        .chain(columns.into_iter().map(quote_ident))
        .collect::<Vec<String>>()
        .join(", ");
    let filter_clause = match filter {
        Some(filter) => format!("({filter}) AND "),
        None => String::new(),
    };

    format!(
        "SELECT {columns} FROM {} WHERE {filter_clause}(?1 IS NULL OR {pk} > ?1) ORDER BY {pk} LIMIT {page_size}",
        quote_ident(layer_name),
    )
}

pub(crate) fn sql_select_row_by_id<'a, I>(
    layer_name: &str,
    primary_key_column: &str,
    columns: I,
) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let pk = quote_ident(primary_key_column);
    let columns = std::iter::once(pk.clone())
        .chain(columns.into_iter().map(quote_ident))
        .collect::<Vec<String>>()
        .join(", ");
    format!(
        "SELECT {columns} FROM {} WHERE {pk} = ?1",
        quote_ident(layer_name)
    )
}

pub(crate) fn sql_insert_row<'a, I>(layer_name: &str, columns: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let columns: Vec<String> = columns.into_iter().map(quote_ident).collect();
    if columns.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", quote_ident(layer_name));
    }
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<String>>()
        .join(",");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(layer_name),
        columns.join(","),
        placeholders
    )
}

/// `UPDATE` assigning `?1..?n` to the given columns; the primary key is `?{n+1}`.
pub(crate) fn sql_update_row<'a, I>(layer_name: &str, primary_key_column: &str, columns: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let assignments: Vec<String> = columns
        .into_iter()
        .enumerate()
        .map(|(idx, name)| format!("{}=?{}", quote_ident(name), idx + 1))
        .collect();
    let id_idx = assignments.len() + 1;
    format!(
        "UPDATE {} SET {} WHERE {}=?{}",
        quote_ident(layer_name),
        assignments.join(","),
        quote_ident(primary_key_column),
        id_idx
    )
}

pub(crate) fn sql_row_exists(layer_name: &str, primary_key_column: &str) -> String {
    format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1)",
        quote_ident(layer_name),
        quote_ident(primary_key_column)
    )
}

pub(crate) fn sql_delete_row(layer_name: &str, primary_key_column: &str) -> String {
    format!(
        "DELETE FROM {} WHERE {} = ?1",
        quote_ident(layer_name),
        quote_ident(primary_key_column)
    )
}

pub(crate) fn sql_delete_all(layer_name: &str) -> String {
    format!("DELETE FROM {}", quote_ident(layer_name))
}

pub(crate) fn sql_count_rows(layer_name: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", quote_ident(layer_name))
}

// Relies on the ST_* functions registered in sql_functions.rs.
pub(crate) fn sql_compute_extent(layer_name: &str, geometry_column: &str) -> String {
    format!(
        "SELECT MIN(ST_MinX({c})), MIN(ST_MinY({c})), MAX(ST_MaxX({c})), MAX(ST_MaxY({c}))
FROM {t} WHERE {c} NOT NULL AND NOT ST_IsEmpty({c})",
        t = quote_ident(layer_name),
        c = quote_ident(geometry_column),
    )
}

pub(crate) fn initialize_gpkg(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "application_id", GPKG_APPLICATION_ID)?;
    conn.pragma_update(None, "user_version", GPKG_USER_VERSION)?;
    conn.execute_batch(SQL_GPKG_SPATIAL_REF_SYS)?;
    conn.execute_batch(SQL_GPKG_CONTENTS)?;
    conn.execute_batch(SQL_GPKG_GEOMETRY_COLUMNS)?;
    conn.execute_batch(SQL_GPKG_EXTENSIONS)?;
    for srs in SpatialRefSys::defaults() {
        insert_srs(conn, &srs)?;
    }
    Ok(())
}

pub(crate) fn insert_srs(conn: &rusqlite::Connection, srs: &SpatialRefSys) -> rusqlite::Result<()> {
    conn.execute(
        SQL_INSERT_SRS,
        rusqlite::params![
            srs.srs_name,
            srs.srs_id,
            srs.organization,
            srs.organization_coordsys_id,
            srs.definition,
            srs.description
        ],
    )?;
    Ok(())
}

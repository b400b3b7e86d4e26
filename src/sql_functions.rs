use crate::error::Result;
use crate::geometry::{Envelope, GpbHeader, decode_gpkg_geometry};
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::{Type, ValueRef};
use rusqlite::{Connection, Error};

/// Register the spatial SQL helper functions (`ST_MinX`, `ST_MinY`, `ST_MaxX`,
/// `ST_MaxY`, `ST_IsEmpty`) in the provided connection.
///
/// `Gpkg` does this for its own connection; call it directly only when
/// working with a bare `rusqlite::Connection`.
///
/// Example:
/// ```
/// use rusqlite::Connection;
/// use geopackage::register_spatial_functions;
///
/// let conn = Connection::open_in_memory()?;
/// register_spatial_functions(&conn)?;
/// # Ok::<(), geopackage::GpkgError>(())
/// ```
pub fn register_spatial_functions(conn: &Connection) -> Result<()> {
    register_bounds_component(conn, "ST_MinX", |e| e.min_x)?;
    register_bounds_component(conn, "ST_MinY", |e| e.min_y)?;
    register_bounds_component(conn, "ST_MaxX", |e| e.max_x)?;
    register_bounds_component(conn, "ST_MaxY", |e| e.max_y)?;
    register_st_isempty(conn)?;
    Ok(())
}

fn register_st_isempty(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "ST_IsEmpty",
        1,
        FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let blob = match blob_from_ctx(ctx)? {
                Some(blob) => blob,
                None => return Ok(None),
            };
            let is_empty = envelope_of(blob)?.is_none();
            Ok(Some(i64::from(is_empty)))
        },
    )?;
    Ok(())
}

fn register_bounds_component<F>(conn: &Connection, name: &str, f: F) -> Result<()>
where
    F: Fn(Envelope) -> f64 + Copy + Send + Sync + 'static,
{
    conn.create_scalar_function(name, 1, FunctionFlags::SQLITE_DETERMINISTIC, move |ctx| {
        let blob = match blob_from_ctx(ctx)? {
            Some(blob) => blob,
            None => return Ok(None),
        };
        Ok(envelope_of(blob)?.map(f))
    })?;
    Ok(())
}

fn blob_from_ctx<'a>(ctx: &'a Context<'a>) -> std::result::Result<Option<&'a [u8]>, Error> {
    match ctx.get_raw(0) {
        ValueRef::Null => Ok(None),
        ValueRef::Blob(blob) => Ok(Some(blob)),
        _ => Err(Error::InvalidFunctionParameterType(0, Type::Blob)),
    }
}

/// Envelope of a GeoPackage geometry blob. The header envelope is used when
/// present; otherwise the geometry is decoded.
fn envelope_of(blob: &[u8]) -> std::result::Result<Option<Envelope>, Error> {
    let header = GpbHeader::parse(blob).map_err(|err| Error::UserFunctionError(Box::new(err)))?;
    if header.empty {
        return Ok(None);
    }
    if let Some(envelope) = header.envelope {
        return Ok(Some(envelope));
    }
    let value =
        decode_gpkg_geometry(blob).map_err(|err| Error::UserFunctionError(Box::new(err)))?;
    Ok(value.envelope())
}

#[cfg(test)]
mod tests {
    use super::register_spatial_functions;
    use crate::geometry::{
        Coord, EnvelopePolicy, Geometry, GeometryValue, encode_gpkg_geometry,
    };
    use rusqlite::{Connection, params};

    fn blob(geometry: Geometry, policy: EnvelopePolicy) -> crate::Result<Vec<u8>> {
        encode_gpkg_geometry(&GeometryValue::new(geometry).with_srs_id(4326), policy)
    }

    fn bounds(conn: &Connection, blob: &[u8]) -> crate::Result<(f64, f64, f64, f64)> {
        Ok(conn.query_row(
            "SELECT ST_MinX(?1), ST_MaxX(?1), ST_MinY(?1), ST_MaxY(?1)",
            params![blob],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?)
    }

    #[test]
    fn st_bounds_for_point() -> crate::Result<()> {
        let conn = Connection::open_in_memory()?;
        register_spatial_functions(&conn)?;

        let blob = blob(
            Geometry::Point(Some(Coord::xy(1.5, -2.0))),
            EnvelopePolicy::None,
        )?;
        assert_eq!(bounds(&conn, &blob)?, (1.5, 1.5, -2.0, -2.0));

        let empty: i64 = conn.query_row("SELECT ST_IsEmpty(?1)", params![blob], |row| row.get(0))?;
        assert_eq!(empty, 0);
        Ok(())
    }

    #[test]
    fn st_is_empty_for_empty_linestring() -> crate::Result<()> {
        let conn = Connection::open_in_memory()?;
        register_spatial_functions(&conn)?;

        let blob = blob(Geometry::LineString(Vec::new()), EnvelopePolicy::Xy)?;
        let (minx, empty): (Option<f64>, i64) =
            conn.query_row("SELECT ST_MinX(?1), ST_IsEmpty(?1)", params![blob], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;

        assert!(minx.is_none());
        assert_eq!(empty, 1);
        Ok(())
    }

    #[test]
    fn st_bounds_agree_with_and_without_header_envelope() -> crate::Result<()> {
        let conn = Connection::open_in_memory()?;
        register_spatial_functions(&conn)?;

        let collection = Geometry::GeometryCollection(vec![
            Geometry::Point(Some(Coord::xy(5.0, -1.0))),
            Geometry::LineString(vec![Coord::xy(-2.0, 2.0), Coord::xy(1.0, 3.0)]),
        ]);
        let with_envelope = blob(collection.clone(), EnvelopePolicy::Xy)?;
        let without_envelope = blob(collection, EnvelopePolicy::None)?;

        assert_eq!(bounds(&conn, &with_envelope)?, (-2.0, 5.0, -1.0, 3.0));
        assert_eq!(bounds(&conn, &without_envelope)?, (-2.0, 5.0, -1.0, 3.0));
        Ok(())
    }

    #[test]
    fn st_functions_pass_null_through_and_reject_garbage() -> crate::Result<()> {
        let conn = Connection::open_in_memory()?;
        register_spatial_functions(&conn)?;

        let minx: Option<f64> = conn.query_row("SELECT ST_MinX(NULL)", [], |row| row.get(0))?;
        assert!(minx.is_none());

        let result: rusqlite::Result<Option<f64>> =
            conn.query_row("SELECT ST_MinX(?1)", params![vec![0u8, 0, 0, 0]], |row| row.get(0));
        assert!(result.is_err());
        Ok(())
    }
}

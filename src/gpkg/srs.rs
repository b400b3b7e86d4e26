use crate::error::{GpkgError, Result};
use crate::geometry::{UNDEFINED_CARTESIAN_SRS_ID, UNDEFINED_GEOGRAPHIC_SRS_ID};
use crate::ogc_sql::SQL_SELECT_SRS;
use std::collections::BTreeMap;

/// A spatial reference system as stored in `gpkg_spatial_ref_sys`.
// cf. https://www.geopackage.org/spec140/index.html#gpkg_spatial_ref_sys_cols
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpatialRefSys {
    pub srs_name: String,
    pub srs_id: i32,
    pub organization: String,
    pub organization_coordsys_id: i32,
    /// Well-known text definition.
    pub definition: String,
    pub description: Option<String>,
}

impl SpatialRefSys {
    pub fn new(
        srs_name: impl Into<String>,
        srs_id: i32,
        organization: impl Into<String>,
        organization_coordsys_id: i32,
        definition: impl Into<String>,
    ) -> Self {
        Self {
            srs_name: srs_name.into(),
            srs_id,
            organization: organization.into(),
            organization_coordsys_id,
            definition: definition.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The undefined Cartesian SRS (-1) every GeoPackage carries.
    pub fn undefined_cartesian() -> Self {
        Self::new(
            "Undefined Cartesian SRS",
            UNDEFINED_CARTESIAN_SRS_ID,
            "NONE",
            UNDEFINED_CARTESIAN_SRS_ID,
            "undefined",
        )
        .with_description("undefined Cartesian coordinate reference system")
    }

    /// The undefined geographic SRS (0) every GeoPackage carries.
    pub fn undefined_geographic() -> Self {
        Self::new(
            "Undefined geographic SRS",
            UNDEFINED_GEOGRAPHIC_SRS_ID,
            "NONE",
            UNDEFINED_GEOGRAPHIC_SRS_ID,
            "undefined",
        )
        .with_description("undefined geographic coordinate reference system")
    }

    /// EPSG:4326. Not registered in new containers; pass it to
    /// `Gpkg::register_srs` when needed.
    pub fn wgs84() -> Self {
        const EPSG4326_WKT: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AXIS["Latitude",NORTH],AXIS["Longitude",EAST],AUTHORITY["EPSG","4326"]]"#;
        Self::new("WGS 84", 4326, "EPSG", 4326, EPSG4326_WKT)
            .with_description("longitude/latitude coordinates in decimal degrees on the WGS 84 spheroid")
    }

    /// EPSG:3857, the spherical Mercator used by web maps.
    pub fn web_mercator() -> Self {
        const EPSG3857_WKT: &str = r#"PROJCS["WGS 84 / Pseudo-Mercator",GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]],PROJECTION["Mercator_1SP"],PARAMETER["central_meridian",0],PARAMETER["scale_factor",1],PARAMETER["false_easting",0],PARAMETER["false_northing",0],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AXIS["Easting",EAST],AXIS["Northing",NORTH],AUTHORITY["EPSG","3857"]]"#;
        Self::new("WGS 84 / Pseudo-Mercator", 3857, "EPSG", 3857, EPSG3857_WKT)
            .with_description("Web Mercator / Pseudo-Mercator (EPSG:3857)")
    }

    /// Built-in definition for an EPSG code, or `None` when the crate does
    /// not ship one.
    ///
    /// Only 4326 and 3857 are bundled. The ESRI alias 102100 maps to 3857.
    ///
    /// Example:
    /// ```
    /// use geopackage::{Gpkg, SpatialRefSys};
    ///
    /// let mut gpkg = Gpkg::new_in_memory()?;
    /// if let Some(srs) = SpatialRefSys::from_epsg(102100) {
    ///     gpkg.register_srs(srs)?;
    /// }
    /// assert_eq!(gpkg.srs().resolve(3857)?.srs_name, "WGS 84 / Pseudo-Mercator");
    /// # Ok::<(), geopackage::GpkgError>(())
    /// ```
    pub fn from_epsg(code: i32) -> Option<Self> {
        match code {
            4326 => Some(Self::wgs84()),
            3857 | 102100 => Some(Self::web_mercator()),
            _ => None,
        }
    }

    pub(crate) fn defaults() -> [Self; 2] {
        [Self::undefined_cartesian(), Self::undefined_geographic()]
    }

    pub fn is_undefined(&self) -> bool {
        self.srs_id == UNDEFINED_CARTESIAN_SRS_ID || self.srs_id == UNDEFINED_GEOGRAPHIC_SRS_ID
    }
}

/// In-memory catalog of spatial reference systems keyed by SRS id.
///
/// The undefined SRS ids -1 and 0 are always present.
#[derive(Clone, Debug)]
pub struct SpatialRefRegistry {
    entries: BTreeMap<i32, SpatialRefSys>,
}

impl Default for SpatialRefRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SpatialRefRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            entries: BTreeMap::new(),
        };
        registry.ensure_defaults();
        registry
    }

    /// Add the undefined SRS ids if missing. Returns the ones that were added.
    pub fn ensure_defaults(&mut self) -> Vec<SpatialRefSys> {
        let mut added = Vec::new();
        for srs in SpatialRefSys::defaults() {
            if !self.entries.contains_key(&srs.srs_id) {
                self.entries.insert(srs.srs_id, srs.clone());
                added.push(srs);
            }
        }
        added
    }

    /// Check whether `srs` could be registered. `Ok(false)` means an identical
    /// definition is already present.
    pub fn check(&self, srs: &SpatialRefSys) -> Result<bool> {
        match self.entries.get(&srs.srs_id) {
            Some(existing) if existing == srs => Ok(false),
            Some(_) => Err(GpkgError::DuplicateSrsId { srs_id: srs.srs_id }),
            None => Ok(true),
        }
    }

    /// Register a definition. Registering an identical definition again is a
    /// no-op; a different definition under a taken id is `DuplicateSrsId`.
    pub fn register(&mut self, srs: SpatialRefSys) -> Result<()> {
        if self.check(&srs)? {
            self.entries.insert(srs.srs_id, srs);
        }
        Ok(())
    }

    pub fn resolve(&self, srs_id: i32) -> Result<&SpatialRefSys> {
        self.entries
            .get(&srs_id)
            .ok_or(GpkgError::UnknownSrsId { srs_id })
    }

    pub fn contains(&self, srs_id: i32) -> bool {
        self.entries.contains_key(&srs_id)
    }

    /// Look a definition up by organization (case-insensitive) and code.
    pub fn find(&self, organization: &str, organization_coordsys_id: i32) -> Option<&SpatialRefSys> {
        self.entries.values().find(|srs| {
            srs.organization.eq_ignore_ascii_case(organization)
                && srs.organization_coordsys_id == organization_coordsys_id
        })
    }

    /// Definitions in SRS id order.
    pub fn iter(&self) -> impl Iterator<Item = &SpatialRefSys> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read every row of `gpkg_spatial_ref_sys`. Defaults missing from the
    /// table are added in memory only.
    pub(crate) fn load(conn: &rusqlite::Connection) -> Result<Self> {
        let mut stmt = conn.prepare(SQL_SELECT_SRS)?;
        let rows = stmt.query_map([], |row| {
            Ok(SpatialRefSys {
                srs_name: row.get(0)?,
                srs_id: row.get(1)?,
                organization: row.get(2)?,
                organization_coordsys_id: row.get(3)?,
                definition: row.get(4)?,
                description: row.get(5)?,
            })
        })?;

        let mut entries = BTreeMap::new();
        for srs in rows {
            let srs = srs?;
            entries.insert(srs.srs_id, srs);
        }
        log::debug!("loaded {} spatial reference systems", entries.len());
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::{SpatialRefRegistry, SpatialRefSys};
    use crate::Result;
    use crate::error::GpkgError;

    #[test]
    fn defaults_are_always_present() -> Result<()> {
        let mut registry = SpatialRefRegistry::new();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve(-1)?.organization, "NONE");
        assert_eq!(registry.resolve(0)?.organization_coordsys_id, 0);
        assert!(registry.ensure_defaults().is_empty());
        assert!(matches!(
            registry.resolve(4326),
            Err(GpkgError::UnknownSrsId { srs_id: 4326 })
        ));
        Ok(())
    }

    #[test]
    fn resolves_registered_definition() -> Result<()> {
        let mut registry = SpatialRefRegistry::new();
        let wgs84 = SpatialRefSys::wgs84();
        registry.register(wgs84.clone())?;
        assert_eq!(registry.resolve(4326)?, &wgs84);
        assert_eq!(registry.find("epsg", 4326), Some(&wgs84));
        assert_eq!(registry.find("EPSG", 3857), None);
        Ok(())
    }

    #[test]
    fn reregistering_identical_definition_is_a_noop() -> Result<()> {
        let mut registry = SpatialRefRegistry::new();
        registry.register(SpatialRefSys::wgs84())?;
        registry.register(SpatialRefSys::wgs84())?;
        assert_eq!(registry.len(), 3);
        Ok(())
    }

    #[test]
    fn bundled_epsg_definitions() -> Result<()> {
        assert_eq!(SpatialRefSys::from_epsg(4326), Some(SpatialRefSys::wgs84()));

        let mercator = SpatialRefSys::from_epsg(3857).expect("3857 is bundled");
        assert_eq!((mercator.srs_id, mercator.organization_coordsys_id), (3857, 3857));
        assert!(mercator.definition.starts_with("PROJCS[\"WGS 84 / Pseudo-Mercator\""));
        assert_eq!(SpatialRefSys::from_epsg(102100), Some(mercator.clone()));
        assert_eq!(SpatialRefSys::from_epsg(2193), None);

        let mut registry = SpatialRefRegistry::new();
        registry.register(mercator)?;
        assert_eq!(registry.find("EPSG", 3857).map(|srs| srs.srs_id), Some(3857));
        Ok(())
    }

    #[test]
    fn conflicting_definition_is_rejected() -> Result<()> {
        let mut registry = SpatialRefRegistry::new();
        registry.register(SpatialRefSys::wgs84())?;

        let conflicting = SpatialRefSys::new("Not WGS 84", 4326, "EPSG", 4326, "GEOGCS[...]");
        let err = registry.register(conflicting).unwrap_err();
        assert!(matches!(err, GpkgError::DuplicateSrsId { srs_id: 4326 }));
        assert_eq!(registry.resolve(4326)?.srs_name, "WGS 84");

        let redefined_default = SpatialRefSys::new("mine", 0, "NONE", 0, "undefined");
        assert!(matches!(
            registry.register(redefined_default),
            Err(GpkgError::DuplicateSrsId { srs_id: 0 })
        ));
        Ok(())
    }
}

use crate::Value;
use crate::error::{GpkgError, Result};
use crate::geometry::{GeometryValue, decode_gpkg_geometry};
use rusqlite::Statement;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Column layout shared by every row of one read.
///
/// The primary key is always column 0.
#[derive(Debug)]
pub(crate) struct RowLayout {
    table_name: String,
    expected_srs_id: i32,
    names: Vec<String>,
    geometry_index: Option<usize>,
    index_by_name: HashMap<String, usize>,
}

impl RowLayout {
    /// `geometry` is the geometry column's name and SRS id, if the table has one.
    pub(crate) fn new(table_name: &str, names: Vec<String>, geometry: Option<(&str, i32)>) -> Self {
        let index_by_name: HashMap<String, usize> = names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();
        let (geometry_index, expected_srs_id) = match geometry {
            Some((column, srs_id)) => (index_by_name.get(column).copied(), srs_id),
            None => (None, 0),
        };
        Self {
            table_name: table_name.to_string(),
            expected_srs_id,
            geometry_index,
            names,
            index_by_name,
        }
    }

    pub(crate) fn read_raw(&self, row: &rusqlite::Row<'_>) -> rusqlite::Result<Vec<Value>> {
        let mut values = Vec::with_capacity(self.names.len());
        for idx in 0..self.names.len() {
            values.push(Value::from(row.get_ref(idx)?));
        }
        Ok(values)
    }

    /// Turn raw stored values into a `Row`, decoding the geometry column.
    pub(crate) fn decode(self: &Arc<Self>, mut values: Vec<Value>) -> Result<Row> {
        let id = match values.first() {
            Some(Value::Integer(id)) => *id,
            other => {
                return Err(GpkgError::SchemaViolation(format!(
                    "primary key of table '{}' is not an integer: {:?}",
                    self.table_name, other
                )));
            }
        };

        let mut srs_mismatch = None;
        if let Some(idx) = self.geometry_index {
            let raw = std::mem::replace(&mut values[idx], Value::Null);
            values[idx] = match raw {
                Value::Null => Value::Null,
                Value::Blob(bytes) => {
                    let geometry = decode_gpkg_geometry(&bytes)?;
                    if geometry.srs_id != self.expected_srs_id {
                        log::warn!(
                            "row {id} of table '{}' has srs_id {}, table declares {}",
                            self.table_name,
                            geometry.srs_id,
                            self.expected_srs_id
                        );
                        srs_mismatch = Some(SrsMismatch {
                            table_name: self.table_name.clone(),
                            expected: self.expected_srs_id,
                            found: geometry.srs_id,
                        });
                    }
                    Value::Geometry(geometry)
                }
                other => {
                    return Err(GpkgError::SchemaViolation(format!(
                        "geometry column '{}' of table '{}' holds a {} value in row {id}",
                        self.names[idx],
                        self.table_name,
                        other.type_name()
                    )));
                }
            };
        }

        Ok(Row {
            id,
            layout: Arc::clone(self),
            values,
            srs_mismatch,
        })
    }
}

/// A decoded geometry whose SRS id differs from its table's.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SrsMismatch {
    pub table_name: String,
    pub expected: i32,
    pub found: i32,
}

/// A row of a user table: column name to value, primary key first, then
/// the geometry column if any, then attributes in table order (or in the order
/// requested by a projection).
#[derive(Clone, Debug)]
pub struct Row {
    id: i64,
    layout: Arc<RowLayout>,
    values: Vec<Value>,
    srs_mismatch: Option<SrsMismatch>,
}

impl Row {
    /// Return the primary key value.
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        let idx = *self.layout.index_by_name.get(column)?;
        self.values.get(idx)
    }

    /// Move a value out of the row, leaving `Null` behind.
    pub fn take(&mut self, column: &str) -> Option<Value> {
        let idx = *self.layout.index_by_name.get(column)?;
        self.values.get_mut(idx).map(std::mem::take)
    }

    /// The decoded geometry, if the geometry column was read and is not NULL.
    pub fn geometry(&self) -> Option<&GeometryValue> {
        let idx = self.layout.geometry_index?;
        self.values.get(idx)?.as_geometry()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.layout
            .names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Set when the stored geometry's SRS id differs from the table's. The
    /// row is still usable.
    pub fn srs_mismatch(&self) -> Option<&SrsMismatch> {
        self.srs_mismatch.as_ref()
    }

    /// Turn a flagged SRS mismatch into an error.
    pub fn check_srs(&self) -> Result<()> {
        match &self.srs_mismatch {
            Some(mismatch) => Err(GpkgError::SrsMismatch {
                table_name: mismatch.table_name.clone(),
                expected: mismatch.expected,
                found: mismatch.found,
            }),
            None => Ok(()),
        }
    }
}

/// Lazy, forward-only sequence of rows.
///
/// Rows are fetched from the store in pages of `read_page_size` in primary
/// key order and decoded one at a time as the iterator advances. No statement
/// stays active between pages. After an error the iterator is finished.
pub struct GpkgRowIter<'a> {
    stmt: Statement<'a>,
    layout: Arc<RowLayout>,
    buffer: VecDeque<Vec<Value>>,
    last_id: Option<i64>,
    page_size: u32,
    last_page: bool,
    end_or_invalid_state: bool,
}

impl<'a> GpkgRowIter<'a> {
    pub(crate) fn new(stmt: Statement<'a>, layout: Arc<RowLayout>, page_size: u32) -> Self {
        Self {
            stmt,
            layout,
            buffer: VecDeque::new(),
            last_id: None,
            page_size,
            last_page: false,
            end_or_invalid_state: false,
        }
    }

    fn fetch_page(&mut self) -> Result<()> {
        let mut rows = self.stmt.query([self.last_id])?;
        let mut fetched = 0u32;
        while let Some(row) = rows.next()? {
            let values = self.layout.read_raw(row)?;
            if let Some(Value::Integer(id)) = values.first() {
                self.last_id = Some(*id);
            }
            self.buffer.push_back(values);
            fetched += 1;
        }
        if fetched < self.page_size {
            self.last_page = true;
        }
        Ok(())
    }
}

impl Iterator for GpkgRowIter<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.end_or_invalid_state {
            return None;
        }

        if self.buffer.is_empty() {
            if self.last_page {
                self.end_or_invalid_state = true;
                return None;
            }
            if let Err(err) = self.fetch_page() {
                self.end_or_invalid_state = true;
                return Some(Err(err));
            }
        }

        let Some(values) = self.buffer.pop_front() else {
            self.end_or_invalid_state = true;
            return None;
        };

        match self.layout.decode(values) {
            Ok(row) => Some(Ok(row)),
            Err(err) => {
                self.end_or_invalid_state = true;
                Some(Err(err))
            }
        }
    }
}

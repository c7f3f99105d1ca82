//! Result rows and their metadata.

use std::sync::Arc;

use crate::error::{DslError, DslResult};
use crate::field::Field;
use crate::value::{FromValue, Value};

/// Name, declared type and nullability of one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    name: String,
    type_name: String,
    nullable: Option<bool>,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, nullable: Option<bool>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            nullable,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend type name, e.g. `int8` or `text`.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// `None` when the backend does not report nullability.
    pub fn nullable(&self) -> Option<bool> {
        self.nullable
    }
}

/// Column layout of a result set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowMetadata {
    columns: Vec<ColumnMetadata>,
}

impl RowMetadata {
    pub fn new(columns: Vec<ColumnMetadata>) -> Self {
        Self { columns }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(ColumnMetadata::name).collect()
    }

    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    /// Column by name; exact match first, then ASCII case-insensitive.
    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.index_of(name).map(|idx| &self.columns[idx])
    }

    pub fn column_at(&self, index: usize) -> Option<&ColumnMetadata> {
        self.columns.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .or_else(|| self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(name)))
    }
}

/// One decoded result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    metadata: Arc<RowMetadata>,
    values: Vec<Value>,
}

impl Row {
    /// Pair values with their layout; the counts must agree.
    pub fn new(metadata: Arc<RowMetadata>, values: Vec<Value>) -> DslResult<Self> {
        if metadata.column_count() != values.len() {
            return Err(DslError::Other(format!(
                "row has {} values for {} columns",
                values.len(),
                metadata.column_count()
            )));
        }
        Ok(Self { metadata, values })
    }

    pub fn metadata(&self) -> &RowMetadata {
        &self.metadata
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Decode the column a field refers to.
    pub fn get<T: FromValue>(&self, field: &Field<T>) -> DslResult<T> {
        let idx = field
            .column()
            .index_in(&self.metadata)
            .ok_or_else(|| DslError::decode(field.label(), "column not present in result"))?;
        self.decode_at(idx, field.label())
    }

    pub fn get_by_name<T: FromValue>(&self, name: &str) -> DslResult<T> {
        let idx = self
            .metadata
            .index_of(name)
            .ok_or_else(|| DslError::decode(name, "column not present in result"))?;
        self.decode_at(idx, name)
    }

    pub fn get_at<T: FromValue>(&self, index: usize) -> DslResult<T> {
        let name = self
            .metadata
            .column_at(index)
            .map(|c| c.name().to_string())
            .ok_or_else(|| DslError::decode(index.to_string(), "column index out of range"))?;
        self.decode_at(index, &name)
    }

    fn decode_at<T: FromValue>(&self, idx: usize, name: &str) -> DslResult<T> {
        let value = self
            .values
            .get(idx)
            .ok_or_else(|| DslError::decode(name, "column index out of range"))?;
        T::from_value(value).map_err(|message| DslError::decode(name, message))
    }
}

/// Rows of one executed query, in backend order, plus their layout.
#[derive(Debug)]
pub struct RowCursor {
    metadata: Arc<RowMetadata>,
    rows: std::vec::IntoIter<Row>,
}

impl RowCursor {
    pub fn new(metadata: Arc<RowMetadata>, rows: Vec<Row>) -> Self {
        Self {
            metadata,
            rows: rows.into_iter(),
        }
    }

    /// Cursor over no rows, keeping the layout.
    pub fn empty(metadata: Arc<RowMetadata>) -> Self {
        Self::new(metadata, Vec::new())
    }

    pub fn metadata(&self) -> &RowMetadata {
        &self.metadata
    }

    pub fn into_metadata(self) -> Arc<RowMetadata> {
        self.metadata
    }
}

impl Iterator for RowCursor {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.rows.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> Arc<RowMetadata> {
        Arc::new(RowMetadata::new(vec![
            ColumnMetadata::new("id", "int8", Some(false)),
            ColumnMetadata::new("name", "varchar", None),
        ]))
    }

    #[test]
    fn metadata_lookup() {
        let meta = metadata();
        assert_eq!(meta.column_count(), 2);
        assert_eq!(meta.column_names(), vec!["id", "name"]);
        assert_eq!(meta.column("NAME").map(ColumnMetadata::type_name), Some("varchar"));
        assert_eq!(meta.column_at(0).and_then(ColumnMetadata::nullable), Some(false));
        assert!(meta.column("missing").is_none());
    }

    #[test]
    fn row_new_checks_width() {
        assert!(Row::new(metadata(), vec![Value::Int(1)]).is_err());
    }

    #[test]
    fn row_reads_by_field_name_and_index() {
        let row = Row::new(metadata(), vec![Value::Int(1), Value::Null]).unwrap();
        let id = Field::<i64>::of("t.id").unwrap();
        let name = Field::<Option<String>>::of("name").unwrap();

        assert_eq!(row.get(&id).unwrap(), 1);
        assert_eq!(row.get(&name).unwrap(), None);
        assert_eq!(row.get_by_name::<i64>("ID").unwrap(), 1);
        assert_eq!(row.get_at::<i64>(0).unwrap(), 1);
    }

    #[test]
    fn decode_errors_name_the_column() {
        let row = Row::new(metadata(), vec![Value::Int(1), Value::Null]).unwrap();
        match row.get_by_name::<String>("name") {
            Err(DslError::Decode { column, .. }) => assert_eq!(column, "name"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(row.get_at::<i64>(5).is_err());
    }
}

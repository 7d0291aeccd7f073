//! Tuple schemas.

use crate::access::value::DataType;

/// Ordered field layout shared by every tuple in a heap file. Immutable
/// once a file is bound to it.
#[derive(Debug, Clone)]
pub struct TupleDesc {
    fields: Vec<(DataType, String)>,
}

impl TupleDesc {
    pub fn new(fields: Vec<(DataType, String)>) -> Self {
        Self { fields }
    }

    /// Builds a schema with generated field names `f0`, `f1`, ...
    pub fn from_types(types: Vec<DataType>) -> Self {
        let fields = types
            .into_iter()
            .enumerate()
            .map(|(i, t)| (t, format!("f{}", i)))
            .collect();
        Self { fields }
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field_type(&self, i: usize) -> DataType {
        self.fields[i].0
    }

    pub fn field_name(&self, i: usize) -> &str {
        &self.fields[i].1
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(_, n)| n == name)
    }

    pub fn types(&self) -> impl Iterator<Item = DataType> + '_ {
        self.fields.iter().map(|(t, _)| *t)
    }

    /// Byte length of one tuple under this schema.
    pub fn byte_len(&self) -> usize {
        self.fields.iter().map(|(t, _)| t.byte_len()).sum()
    }
}

/// Two schemas are equal when their field types match in order; names do
/// not participate.
impl PartialEq for TupleDesc {
    fn eq(&self, other: &Self) -> bool {
        self.field_count() == other.field_count() && self.types().eq(other.types())
    }
}

impl Eq for TupleDesc {}

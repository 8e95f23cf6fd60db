//! Maps table ids to their heap files and schemas.

use std::sync::Arc;

use indexmap::IndexMap;
use log::debug;
use parking_lot::RwLock;

use crate::error::DbError;
use crate::heap_file::HeapFile;
use crate::tuple::TupleDesc;

#[derive(Debug)]
struct TableEntry {
    name: String,
    file: Arc<HeapFile>,
}

#[derive(Debug, Default)]
pub struct Catalog {
    tables: RwLock<IndexMap<u32, TableEntry>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `file` under `name` and returns its table id. An existing
    /// table with the same name or id is replaced.
    pub fn add_table(&self, file: HeapFile, name: &str) -> u32 {
        let table_id = file.table_id();
        let mut tables = self.tables.write();
        tables.retain(|&id, entry| id == table_id || entry.name != name);
        debug!(
            "[Catalog::add_table] {name} -> table {table_id} ({:?})",
            file.path()
        );
        tables.insert(
            table_id,
            TableEntry {
                name: name.to_string(),
                file: Arc::new(file),
            },
        );
        table_id
    }

    pub fn schema_of(&self, table_id: u32) -> Result<Arc<TupleDesc>, DbError> {
        self.heap_file(table_id).map(|file| file.desc().clone())
    }

    pub fn heap_file(&self, table_id: u32) -> Result<Arc<HeapFile>, DbError> {
        self.tables
            .read()
            .get(&table_id)
            .map(|entry| entry.file.clone())
            .ok_or(DbError::NoSuchTable(table_id))
    }

    pub fn table_id(&self, name: &str) -> Option<u32> {
        self.tables
            .read()
            .iter()
            .find(|(_, entry)| entry.name == name)
            .map(|(&id, _)| id)
    }

    pub fn table_name(&self, table_id: u32) -> Option<String> {
        self.tables
            .read()
            .get(&table_id)
            .map(|entry| entry.name.clone())
    }

    /// Registered table ids in registration order.
    pub fn table_ids(&self) -> Vec<u32> {
        self.tables.read().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;
    use tempfile::tempdir;

    #[test]
    fn lookup_by_id_and_name() {
        let dir = tempdir().unwrap();
        let desc = Arc::new(TupleDesc::with_names(&[Type::Int], &["a"]));
        let catalog = Catalog::new();

        let first = HeapFile::open(dir.path().join("t1.dat"), desc.clone(), 4096).unwrap();
        let second = HeapFile::open(dir.path().join("t2.dat"), desc.clone(), 4096).unwrap();
        let id1 = catalog.add_table(first, "t1");
        let id2 = catalog.add_table(second, "t2");

        assert_eq!(catalog.table_ids(), vec![id1, id2]);
        assert_eq!(catalog.table_id("t2"), Some(id2));
        assert_eq!(catalog.table_name(id1).as_deref(), Some("t1"));
        assert_eq!(*catalog.schema_of(id1).unwrap(), *desc);
        let missing = (0..).find(|id| *id != id1 && *id != id2).unwrap();
        assert!(matches!(
            catalog.schema_of(missing),
            Err(DbError::NoSuchTable(_))
        ));
    }

    #[test]
    fn same_name_replaces_table() {
        let dir = tempdir().unwrap();
        let desc = Arc::new(TupleDesc::from_types(&[Type::Int]));
        let catalog = Catalog::new();

        let old = catalog.add_table(
            HeapFile::open(dir.path().join("old.dat"), desc.clone(), 4096).unwrap(),
            "t",
        );
        let new = catalog.add_table(
            HeapFile::open(dir.path().join("new.dat"), desc, 4096).unwrap(),
            "t",
        );

        assert_eq!(catalog.table_id("t"), Some(new));
        assert!(catalog.heap_file(old).is_err());
        assert_eq!(catalog.table_ids(), vec![new]);
    }
}

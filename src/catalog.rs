use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::heap_file::HeapFile;
use crate::tuple::TupleDesc;
use crate::types::Type;

/// One catalog-registered table: its backing file plus the schema
/// detail the catalog carries on top of it.
pub struct TableEntry {
    pub name: String,
    pub primary_key: Option<String>,
    pub heap_file: Arc<HeapFile>,
}

pub struct Catalog {
    // maps table name to table
    tables: RwLock<HashMap<String, Arc<TableEntry>>>,
    // maps table id to table
    table_ids: RwLock<HashMap<usize, Arc<TableEntry>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog {
            tables: RwLock::new(HashMap::new()),
            table_ids: RwLock::new(HashMap::new()),
        }
    }

    pub fn add_table(&self, file: HeapFile, name: String) {
        self.add_table_with_key(file, name, None);
    }

    pub fn add_table_with_key(&self, file: HeapFile, name: String, primary_key: Option<String>) {
        let heap_file = Arc::new(file);
        let file_id = heap_file.get_id();
        let entry = Arc::new(TableEntry {
            name: name.clone(),
            primary_key,
            heap_file,
        });
        self.tables.write().unwrap().insert(name, Arc::clone(&entry));
        self.table_ids.write().unwrap().insert(file_id, entry);
    }

    /// Retrieves the table with the specified name
    pub fn get_table_from_name(&self, name: &str) -> Option<Arc<HeapFile>> {
        self.tables
            .read()
            .unwrap()
            .get(name)
            .map(|e| Arc::clone(&e.heap_file))
    }

    /// Retrieves the table with the specified id
    pub fn get_table_from_id(&self, id: usize) -> Option<Arc<HeapFile>> {
        self.table_ids
            .read()
            .unwrap()
            .get(&id)
            .map(|e| Arc::clone(&e.heap_file))
    }

    /// Retrieves the tuple descriptor for the specified table
    pub fn get_tuple_desc(&self, table_id: usize) -> Option<TupleDesc> {
        self.get_table_from_id(table_id)
            .map(|t| t.get_tuple_desc().clone())
    }

    pub fn get_primary_key(&self, table_id: usize) -> Option<String> {
        self.table_ids
            .read()
            .unwrap()
            .get(&table_id)
            .and_then(|e| e.primary_key.clone())
    }

    /// Loads a schema file, creating each table's backing file under
    /// `data/`.
    pub fn load_schema(&self, schema_file_path: &str) {
        self.load_schema_in_dir(schema_file_path, Path::new("data"));
    }

    /// Parses lines of the form `tablename (col1 type1, col2 type2, ...,
    /// pk col1)`, where `type` is `int` or `string(n)` and the trailing
    /// `pk colname` token is optional.
    pub fn load_schema_in_dir(&self, schema_file_path: &str, data_dir: &Path) {
        let schema_file = File::open(schema_file_path).expect("schema file must exist");
        let reader = BufReader::new(schema_file);
        for line in reader.lines() {
            let line = line.expect("schema file must be valid utf-8");
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let open = line.find('(').expect("schema line missing '('");
            let close = line.rfind(')').expect("schema line missing ')'");
            let table_name = line[..open].trim().to_string();
            let body = &line[open + 1..close];

            let mut field_types = vec![];
            let mut field_names = vec![];
            let mut primary_key = None;
            for token in body.split(',') {
                let token = token.trim();
                if token.is_empty() {
                    continue;
                }
                if let Some(rest) = token.strip_prefix("pk ") {
                    primary_key = Some(rest.trim().to_string());
                    continue;
                }
                let mut parts = token.split_whitespace();
                let field_name = parts.next().expect("column needs a name").to_string();
                let field_type_str = parts.next().expect("column needs a type");
                field_names.push(field_name);
                field_types.push(parse_type(field_type_str));
            }

            let path = data_dir.join(format!("{}.dat", table_name));
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .open(&path)
                .expect("cannot open table file");
            let td = TupleDesc::new(field_types, field_names);
            let heap_file = HeapFile::new(file, &path, td);
            self.add_table_with_key(heap_file, table_name, primary_key);
        }
    }
}

fn parse_type(s: &str) -> Type {
    if s.eq_ignore_ascii_case("int") {
        return Type::Int;
    }
    if let Some(rest) = s.strip_prefix("string(").and_then(|r| r.strip_suffix(')')) {
        let len: usize = rest.trim().parse().expect("string length must be a number");
        return Type::Str(len);
    }
    panic!("invalid field type: {}", s);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn load_schema_parses_types_and_primary_key() {
        let dir = tempdir().unwrap();
        let schema_path = dir.path().join("schema.txt");
        let mut f = File::create(&schema_path).unwrap();
        writeln!(f, "students (id int, name string(32), pk id)").unwrap();
        drop(f);

        let catalog = Catalog::new();
        catalog.load_schema_in_dir(schema_path.to_str().unwrap(), dir.path());

        let table = catalog.get_table_from_name("students").unwrap();
        let td = table.get_tuple_desc();
        assert_eq!(td.get_num_fields(), 2);
        assert_eq!(td.get_field_type(0), Some(&Type::Int));
        assert_eq!(td.get_field_type(1), Some(&Type::Str(32)));
        assert_eq!(catalog.get_primary_key(table.get_id()), Some("id".to_string()));
    }

    #[test]
    fn load_schema_without_primary_key() {
        let dir = tempdir().unwrap();
        let schema_path = dir.path().join("schema.txt");
        let mut f = File::create(&schema_path).unwrap();
        writeln!(f, "logs (message string(64))").unwrap();
        drop(f);

        let catalog = Catalog::new();
        catalog.load_schema_in_dir(schema_path.to_str().unwrap(), dir.path());

        let table = catalog.get_table_from_name("logs").unwrap();
        assert_eq!(catalog.get_primary_key(table.get_id()), None);
    }
}

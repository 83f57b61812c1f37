use std::fs;
use std::path::Path;

use log::info;

use campusdb::cursor::DbIterator;
use campusdb::database;
use campusdb::error::OpError;
use campusdb::fields::{FieldVal, IntField, StringField};
use campusdb::transaction::TransactionId;
use campusdb::tuple::Tuple;

/// Inserts under a fresh transaction each attempt, retrying on deadlock
/// abort the way a client driving this core is expected to.
fn insert_with_retry(table_id: usize, make_tuple: impl Fn() -> Tuple) {
    loop {
        let tid = TransactionId::new();
        let bp = database::get_global_db().get_buffer_pool();
        match bp.insert_tuple(tid, table_id, make_tuple()) {
            Ok(()) => {
                bp.transaction_complete(tid, true);
                return;
            }
            Err(OpError::TransactionAborted) => {
                bp.transaction_complete(tid, false);
                continue;
            }
            Err(e) => panic!("unexpected error inserting tuple: {e}"),
        }
    }
}

fn main() {
    env_logger::init();

    let data_dir = Path::new("data");
    fs::create_dir_all(data_dir).expect("cannot create data directory");
    let schema_path = data_dir.join("schemas.txt");
    fs::write(&schema_path, "students (id int, name string(32), pk id)\n").expect("cannot write schema file");

    let db = database::get_global_db();
    db.get_catalog()
        .load_schema_in_dir(schema_path.to_str().unwrap(), data_dir);

    let table = db.get_catalog().get_table_from_name("students").unwrap();
    let table_id = table.get_id();
    info!("loaded table 'students' (id {})", table_id);

    for i in 0..5 {
        let table = table.clone();
        let name = format!("student_{i}");
        insert_with_retry(table_id, move || {
            Tuple::new(
                vec![
                    FieldVal::IntField(IntField::new(i)),
                    FieldVal::StringField(StringField::new(name.clone(), 32)),
                ],
                table.get_tuple_desc(),
            )
        });
    }

    let tid = TransactionId::new();
    let mut iter = table.iterator(tid);
    iter.open().expect("scan open failed");
    while let Some(t) = iter.next().expect("scan step failed") {
        println!("{t}");
    }
    iter.close();
    db.get_buffer_pool().transaction_complete(tid, true);
}

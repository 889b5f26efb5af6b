//! Shared fixtures for the integration tests: a seeded in-memory backend
//! and the table layouts the scenarios use.

#![allow(dead_code)]

use rowset::{ColumnDef, DataType, IndexDef, MemoryBackend, OwnedValue, Session, TableDef};
use std::rc::Rc;
use std::sync::Arc;

/// `t(id pk auto, numb int, recversion)`.
pub fn numbers_table() -> TableDef {
    TableDef::new(
        "t",
        vec![
            ColumnDef::new("id", DataType::Int8).auto_generate(),
            ColumnDef::new("numb", DataType::Int4),
            ColumnDef::new("recversion", DataType::Int8).version_counter(),
        ],
    )
    .with_primary_key(vec!["id"])
}

/// `orders(id pk, date, amount, recversion)` with an index on `date`.
pub fn orders_table() -> TableDef {
    TableDef::new(
        "orders",
        vec![
            ColumnDef::new("id", DataType::Int8).auto_generate(),
            ColumnDef::new("date", DataType::Int8),
            ColumnDef::new("amount", DataType::Int4),
            ColumnDef::new("recversion", DataType::Int8).version_counter(),
        ],
    )
    .with_primary_key(vec!["id"])
    .with_index(IndexDef::new("ix_orders_date", vec!["date"], false))
}

/// `batches(id pk, created, label)` with an index on `created`.
pub fn batches_table() -> TableDef {
    TableDef::new(
        "batches",
        vec![
            ColumnDef::new("id", DataType::Int8).auto_generate(),
            ColumnDef::new("created", DataType::Int8),
            ColumnDef::new("label", DataType::Text),
        ],
    )
    .with_primary_key(vec!["id"])
    .with_index(IndexDef::new("ix_batches_created", vec!["created"], false))
}

pub fn backend_with_numbers(numbs: &[i64]) -> MemoryBackend {
    let backend = MemoryBackend::new();
    backend.create_table(numbers_table());
    let rows = numbs
        .iter()
        .enumerate()
        .map(|(i, n)| {
            vec![
                OwnedValue::Int(i as i64 + 1),
                OwnedValue::Int(*n),
                OwnedValue::Int(1),
            ]
        })
        .collect();
    backend.load_rows("t", rows).unwrap();
    backend
}

pub fn session_over(backend: &MemoryBackend) -> Rc<Session> {
    Session::new(Arc::new(backend.clone()))
}

pub fn int(v: &OwnedValue) -> i64 {
    v.as_int().expect("integer value")
}

use pit::{Backend, ColumnType, ErrorKind, FileBackend, FilterConstraintSet, StorageConfig};
use pit::normalize::normalize_json;
use object_store::memory::InMemory;
use polars::prelude::*;
use serde_json::{json, Value as Json};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn path_of(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().into_owned()
}

fn dump(dest: &str, payload: &str) {
    let table = normalize_json(payload).unwrap();
    FileBackend::new()
        .ingest(dest, &table, &StorageConfig::default())
        .unwrap();
}

fn retrieve_json(sources: &[String]) -> Json {
    let table = FileBackend::new()
        .retrieve(sources, &StorageConfig::default())
        .unwrap();
    serde_json::to_value(table.to_records()).unwrap()
}

/// Write a Parquet file the way another producer would
fn write_external(path: &Path, df: &mut DataFrame) {
    let mut file = std::fs::File::create(path).unwrap();
    ParquetWriter::new(&mut file).finish(df).unwrap();
}

#[test]
fn test_round_trip_null_fills_absent_keys() {
    let dir = TempDir::new().unwrap();
    let dest = path_of(&dir, "people.parquet");
    dump(
        &dest,
        r#"[{"id": 1, "name": "ada", "score": 9.5}, {"id": 2, "name": "bob"}]"#,
    );

    assert_eq!(
        retrieve_json(&[dest]),
        json!([
            {"id": 1, "name": "ada", "score": 9.5},
            {"id": 2, "name": "bob", "score": null}
        ])
    );
}

#[test]
fn test_overwrite_leaves_no_residue() {
    let dir = TempDir::new().unwrap();
    let dest = path_of(&dir, "t.parquet");
    dump(&dest, r#"[{"a": 1}, {"a": 2}, {"a": 3}]"#);
    dump(&dest, r#"[{"b": "x"}]"#);

    assert_eq!(retrieve_json(&[dest]), json!([{"b": "x"}]));
}

#[test]
fn test_schema_union_across_files() {
    let dir = TempDir::new().unwrap();
    let x = path_of(&dir, "x.parquet");
    let y = path_of(&dir, "y.parquet");
    dump(&x, r#"[{"a": 1}]"#);
    dump(&y, r#"[{"b": 2}]"#);

    assert_eq!(
        retrieve_json(&[x, y]),
        json!([{"a": 1, "b": null}, {"a": null, "b": 2}])
    );
}

#[test]
fn test_conflicting_domains_widen() {
    let dir = TempDir::new().unwrap();
    let x = path_of(&dir, "x.parquet");
    let y = path_of(&dir, "y.parquet");
    let z = path_of(&dir, "z.parquet");
    dump(&x, r#"[{"v": 1, "w": 1}]"#);
    dump(&y, r#"[{"v": 2.5, "w": "two"}]"#);
    dump(&z, r#"[{"v": null}]"#);

    let table = FileBackend::new()
        .retrieve(&[x, y, z], &StorageConfig::default())
        .unwrap();
    let types: Vec<_> = table.schema().columns.iter().map(|c| c.column_type).collect();
    assert_eq!(types, vec![ColumnType::Float, ColumnType::String]);
    assert_eq!(
        serde_json::to_value(table.to_records()).unwrap(),
        json!([
            {"v": 1.0, "w": "1"},
            {"v": 2.5, "w": "two"},
            {"v": null, "w": null}
        ])
    );
}

#[test]
fn test_search_empty_constraints_equals_retrieve() {
    let dir = TempDir::new().unwrap();
    let x = path_of(&dir, "x.parquet");
    dump(&x, r#"[{"a": 1, "b": "x"}, {"a": 2, "b": "y"}]"#);

    let backend = FileBackend::new();
    let config = StorageConfig::default();
    let sources = vec![x];
    let searched = backend
        .search(&sources, &FilterConstraintSet::new(), &config)
        .unwrap();
    let retrieved = backend.retrieve(&sources, &config).unwrap();
    assert_eq!(searched, retrieved);
}

#[test]
fn test_conjunctive_filter() {
    let dir = TempDir::new().unwrap();
    let x = path_of(&dir, "x.parquet");
    dump(&x, r#"[{"a": 1, "b": "x"}, {"a": 1, "b": "y"}]"#);

    let constraints = FilterConstraintSet::parse("a=1 b=x").unwrap();
    let matched = FileBackend::new()
        .search(&[x], &constraints, &StorageConfig::default())
        .unwrap();
    assert_eq!(
        serde_json::to_value(matched.to_records()).unwrap(),
        json!([{"a": 1, "b": "x"}])
    );
}

#[test]
fn test_filter_on_text_widened_column_compares_text() {
    let dir = TempDir::new().unwrap();
    let x = path_of(&dir, "x.parquet");
    let y = path_of(&dir, "y.parquet");
    dump(&x, r#"[{"code": 3}]"#);
    dump(&y, r#"[{"code": "3"}, {"code": "03"}]"#);

    let constraints = FilterConstraintSet::parse("code=3").unwrap();
    let matched = FileBackend::new()
        .search(&[x, y], &constraints, &StorageConfig::default())
        .unwrap();
    assert_eq!(
        serde_json::to_value(matched.to_records()).unwrap(),
        json!([{"code": "3"}, {"code": "3"}])
    );
}

#[test]
fn test_unknown_column_is_an_error() {
    let dir = TempDir::new().unwrap();
    let x = path_of(&dir, "x.parquet");
    dump(&x, r#"[{"a": 1}]"#);

    let constraints = FilterConstraintSet::parse("z=1").unwrap();
    let err = FileBackend::new()
        .search(&[x], &constraints, &StorageConfig::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownColumn);
}

#[test]
fn test_empty_source_list() {
    let backend = FileBackend::new();
    let config = StorageConfig::default();
    assert_eq!(
        backend.retrieve(&[], &config).unwrap_err().kind(),
        ErrorKind::EmptyInput
    );
    assert_eq!(
        backend
            .search(&[], &FilterConstraintSet::new(), &config)
            .unwrap_err()
            .kind(),
        ErrorKind::EmptyInput
    );
}

#[test]
fn test_missing_and_corrupt_sources() {
    let dir = TempDir::new().unwrap();
    let missing = path_of(&dir, "missing.parquet");
    let corrupt = dir.path().join("corrupt.parquet");
    std::fs::write(&corrupt, b"definitely not parquet").unwrap();

    let backend = FileBackend::new();
    let config = StorageConfig::default();
    assert_eq!(
        backend.retrieve(&[missing], &config).unwrap_err().kind(),
        ErrorKind::SourceNotFound
    );
    assert_eq!(
        backend
            .retrieve(&[corrupt.to_string_lossy().into_owned()], &config)
            .unwrap_err()
            .kind(),
        ErrorKind::MalformedSource
    );
}

#[test]
fn test_reads_files_from_other_producers() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("loans.parquet");
    let mut df = df![
        "loan_id" => ["1001", "1002"],
        "emi_number" => [1i32, 2],
        "principal_amount" => [100000.0f32, 50000.0],
    ]
    .unwrap();
    write_external(&path, &mut df);

    let table = FileBackend::new()
        .retrieve(&[path.to_string_lossy().into_owned()], &StorageConfig::default())
        .unwrap();
    let types: Vec<_> = table.schema().columns.iter().map(|c| c.column_type).collect();
    assert_eq!(
        types,
        vec![ColumnType::String, ColumnType::Integer, ColumnType::Float]
    );
    assert_eq!(
        serde_json::to_value(table.to_records()).unwrap(),
        json!([
            {"loan_id": "1001", "emi_number": 1, "principal_amount": 100000.0},
            {"loan_id": "1002", "emi_number": 2, "principal_amount": 50000.0}
        ])
    );
}

#[test]
fn test_empty_payload_is_rejected_and_nothing_written() {
    let dir = TempDir::new().unwrap();
    let dest = path_of(&dir, "empty.parquet");
    let table = normalize_json("[]").unwrap();

    let err = FileBackend::new()
        .ingest(&dest, &table, &StorageConfig::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyInput);
    assert!(!Path::new(&dest).exists());
}

#[test]
fn test_null_only_source_does_not_widen() {
    let dir = TempDir::new().unwrap();
    let x = path_of(&dir, "x.parquet");
    let z = path_of(&dir, "z.parquet");
    dump(&x, r#"[{"v": 1}]"#);
    dump(&z, r#"[{"v": null}]"#);

    let backend = FileBackend::new();
    let config = StorageConfig::default();
    let sources = vec![x, z];
    let table = backend.retrieve(&sources, &config).unwrap();
    assert_eq!(table.schema().columns[0].column_type, ColumnType::Integer);
    assert_eq!(
        serde_json::to_value(table.to_records()).unwrap(),
        json!([{"v": 1}, {"v": null}])
    );

    let matched = backend
        .search(&sources, &FilterConstraintSet::parse("v=1").unwrap(), &config)
        .unwrap();
    assert_eq!(serde_json::to_value(matched.to_records()).unwrap(), json!([{"v": 1}]));
}

#[test]
fn test_remote_round_trip() {
    let backend = FileBackend::with_object_store(Arc::new(InMemory::new()));
    let config = StorageConfig::default();
    let table = normalize_json(r#"[{"id": 1, "name": "ada"}, {"id": 2}]"#).unwrap();

    backend
        .ingest("s3://reports/2024/people.parquet", &table, &config)
        .unwrap();
    let loaded = backend
        .retrieve(&["s3://reports/2024/people.parquet".to_string()], &config)
        .unwrap();
    assert_eq!(loaded, table);

    let err = backend
        .retrieve(&["s3://reports/2025/people.parquet".to_string()], &config)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceNotFound);
}

#[test]
fn test_remote_and_local_sources_merge() {
    let dir = TempDir::new().unwrap();
    let local = path_of(&dir, "local.parquet");
    let backend = FileBackend::with_object_store(Arc::new(InMemory::new()));
    let config = StorageConfig::default();

    backend
        .ingest(&local, &normalize_json(r#"[{"a": 1}]"#).unwrap(), &config)
        .unwrap();
    backend
        .ingest("s3://bucket/remote.parquet", &normalize_json(r#"[{"a": 2.5}]"#).unwrap(), &config)
        .unwrap();

    let merged = backend
        .retrieve(&[local, "s3://bucket/remote.parquet".to_string()], &config)
        .unwrap();
    assert_eq!(
        serde_json::to_value(merged.to_records()).unwrap(),
        json!([{"a": 1.0}, {"a": 2.5}])
    );
}

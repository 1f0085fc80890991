// SPDX-License-Identifier: MIT
//! Reference resolution within and across files

use std::path::Path;

use asdf_container::{AsdfError, AsdfFile, Config, Document, Entry, NDArray, Reference};
use serde_yaml::Value;

fn write(dir: &Path, name: &str, document: &Document) {
    document.write_file(dir.join(name)).unwrap();
}

fn open(path: impl AsRef<Path>) -> AsdfFile {
    AsdfFile::open_with_config(path, Config::default()).unwrap()
}

#[test]
fn test_external_array_reference() {
    let dir = tempfile::tempdir().unwrap();

    let mut target = Document::new();
    target.insert("data", NDArray::from_vec(vec![3i32, 1, 4, 1, 5], vec![5]).unwrap());
    write(dir.path(), "target.asdf", &target);

    let mut source = Document::new();
    source.insert("link", Reference::new(Some("target.asdf"), &["data"]));
    source.insert("again", Reference::new(Some("target.asdf"), &["data"]));
    write(dir.path(), "source.asdf", &source);

    let mut file = open(dir.path().join("source.asdf"));
    let link = file.ndarray(&["link"]).unwrap();
    assert_eq!(link.to_vec::<i32>().unwrap(), vec![3, 1, 4, 1, 5]);
    assert_eq!(file.arena().len(), 2);

    let again = file.ndarray(&["again"]).unwrap();
    assert_eq!(file.arena().len(), 2);
    assert!(again.memoized().ptr_eq(link.memoized()));
}

#[test]
fn test_chain_across_files() {
    let dir = tempfile::tempdir().unwrap();

    let mut b = Document::new();
    b.insert("values", NDArray::from_vec(vec![1.5f64, 2.5], vec![2]).unwrap());
    b.insert("alias", Reference::new(None, &["values"]));
    write(dir.path(), "b.asdf", &b);

    let mut a = Document::new();
    a.insert("link", Reference::new(Some("b.asdf"), &["alias"]));
    write(dir.path(), "a.asdf", &a);

    let mut file = open(dir.path().join("a.asdf"));
    let link = file.ndarray(&["link"]).unwrap();
    assert_eq!(link.to_vec::<f64>().unwrap(), vec![1.5, 2.5]);
}

#[test]
fn test_cycle_across_files() {
    let dir = tempfile::tempdir().unwrap();

    let mut a = Document::new();
    a.insert("x", Reference::new(Some("b.asdf"), &["y"]));
    write(dir.path(), "a.asdf", &a);

    let mut b = Document::new();
    b.insert("y", Reference::new(Some("a.asdf"), &["x"]));
    write(dir.path(), "b.asdf", &b);

    let mut file = open(dir.path().join("a.asdf"));
    let start = Reference::new(None, &["x"]);
    assert!(matches!(file.resolve(&start), Err(AsdfError::InvalidPath(_))));
}

#[test]
fn test_absolute_file_uri() {
    let dir = tempfile::tempdir().unwrap();

    let mut target = Document::new();
    target.insert("answer", Value::Number(42.into()));
    write(dir.path(), "target.asdf", &target);

    let uri = format!("file://{}", dir.path().join("target.asdf").display());
    let mut source = Document::new();
    source.insert("link", Reference::new(Some(uri.as_str()), &["answer"]));
    let mut file = AsdfFile::from_bytes(source.to_bytes().unwrap(), Config::default()).unwrap();

    let reference = file
        .to_document()
        .unwrap()
        .get("link")
        .and_then(Entry::as_reference)
        .cloned()
        .unwrap();
    let (_, node) = file.resolve(&reference).unwrap();
    assert_eq!(node, Value::Number(42.into()));
}

#[test]
fn test_missing_external_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = Document::new();
    source.insert("link", Reference::new(Some("nowhere.asdf"), &["data"]));
    write(dir.path(), "source.asdf", &source);

    let mut file = open(dir.path().join("source.asdf"));
    assert!(matches!(file.ndarray(&["link"]), Err(AsdfError::Io(_))));
}

#[test]
fn test_keys_with_separators() {
    let key = "a/b~c";
    let mut document = Document::new();
    document.insert(key, Value::String("found".into()));
    let mut file = AsdfFile::from_bytes(document.to_bytes().unwrap(), Config::default()).unwrap();

    let reference = Reference::new(None, &[key]);
    assert_eq!(reference.target(), "#/a~1b~0c");
    let (_, node) = file.resolve(&reference).unwrap();
    assert_eq!(node, Value::String("found".into()));
}

#[test]
fn test_sequence_index_segments() {
    let mut file = AsdfFile::from_bytes(
        b"#ASDF 1.0.0\n---\nitems: [{name: zero}, {name: one}]\n...\n".to_vec(),
        Config::default(),
    )
    .unwrap();

    let (_, node) = file
        .resolve(&Reference::new(None, &["items", "1", "name"]))
        .unwrap();
    assert_eq!(node, Value::String("one".into()));

    for bad in [["items", "2", "name"], ["items", "-1", "name"], ["items", "one", "name"]] {
        assert!(matches!(
            file.resolve(&Reference::new(None, &bad)),
            Err(AsdfError::InvalidPath(_))
        ));
    }
}

use cadtext::cache::TextCache;
use cadtext::pipeline::ScanTarget;
use cadtext::progress::NoopProgress;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn dxf_bytes(text: &str) -> Vec<u8> {
    format!("0\nSECTION\n2\nENTITIES\n0\nTEXT\n8\nL\n1\n{text}\n0\nENDSEC\n0\nEOF\n").into_bytes()
}

fn seed(dir: &Path, name: &str, converted_bytes: &[u8]) -> ScanTarget {
    let source = dir.join(name);
    fs::write(&source, b"drawing").unwrap();
    let output_root = dir.join("output");
    fs::create_dir_all(&output_root).unwrap();
    let converted = output_root
        .join(Path::new(name).with_extension("dxf"));
    fs::write(&converted, converted_bytes).unwrap();
    filetime::set_file_mtime(&converted, filetime::FileTime::from_unix_time(1_000_100, 0))
        .unwrap();
    ScanTarget {
        source,
        output_root,
        converted,
    }
}

fn kw(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

#[test]
fn test_first_update_parses_then_serves() {
    let dir = tempdir().unwrap();
    let target = seed(dir.path(), "plan.dwg", &dxf_bytes("valve station"));
    let targets = vec![target];

    let mut cache = TextCache::open(&targets[0].output_root).unwrap();
    let outcome = cache.update(&targets, u64::MAX, &NoopProgress, None);

    assert_eq!(outcome.cached, 1);
    assert_eq!(outcome.skipped, 0);
    assert_eq!(outcome.failed, 0);
    assert!(outcome.plaintext.is_empty());

    let rows = cache.query(&targets, &kw(&["valve"])).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].object_type, "TEXT");
    assert_eq!(rows[0].content, "valve station");
    assert_eq!(rows[0].file_name, "plan.dwg");
}

#[test]
fn test_unchanged_file_is_skipped() {
    let dir = tempdir().unwrap();
    let targets = vec![seed(dir.path(), "plan.dwg", &dxf_bytes("valve"))];

    let mut cache = TextCache::open(&targets[0].output_root).unwrap();
    let first = cache.update(&targets, u64::MAX, &NoopProgress, None);
    let second = cache.update(&targets, u64::MAX, &NoopProgress, None);

    assert_eq!(first.cached, 1);
    assert_eq!(second.cached, 0);
    assert_eq!(second.skipped, 1);

    let rows = cache.query(&targets, &kw(&["valve"])).unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn test_changed_interchange_is_reparsed() {
    let dir = tempdir().unwrap();
    let targets = vec![seed(dir.path(), "plan.dwg", &dxf_bytes("old pump"))];

    let mut cache = TextCache::open(&targets[0].output_root).unwrap();
    cache.update(&targets, u64::MAX, &NoopProgress, None);

    fs::write(&targets[0].converted, dxf_bytes("new valve")).unwrap();
    filetime::set_file_mtime(
        &targets[0].converted,
        filetime::FileTime::from_unix_time(2_000_000, 0),
    )
    .unwrap();

    let outcome = cache.update(&targets, u64::MAX, &NoopProgress, None);
    assert_eq!(outcome.cached, 1);
    assert_eq!(outcome.skipped, 0);

    // Old rows are replaced, not appended to.
    let old = cache.query(&targets, &kw(&["pump"])).unwrap();
    let new = cache.query(&targets, &kw(&["valve"])).unwrap();
    assert!(old.is_empty());
    assert_eq!(new.len(), 1);
}

#[test]
fn test_corrupt_interchange_routes_to_plain_text() {
    let dir = tempdir().unwrap();
    let targets = vec![seed(dir.path(), "broken.dwg", b"not an interchange file")];

    let mut cache = TextCache::open(&targets[0].output_root).unwrap();
    let first = cache.update(&targets, u64::MAX, &NoopProgress, None);

    assert_eq!(first.failed, 1);
    assert_eq!(first.plaintext.len(), 1);

    // A rerun over the same unparseable file routes to plain text again
    // without counting a fresh failure.
    let second = cache.update(&targets, u64::MAX, &NoopProgress, None);
    assert_eq!(second.failed, 0);
    assert_eq!(second.plaintext.len(), 1);

    let rows = cache.query(&targets, &kw(&["interchange"])).unwrap();
    assert!(rows.is_empty());
}

#[test]
fn test_oversize_interchange_is_not_cached() {
    let dir = tempdir().unwrap();
    let targets = vec![seed(dir.path(), "big.dwg", &dxf_bytes("valve"))];

    let mut cache = TextCache::open(&targets[0].output_root).unwrap();
    let outcome = cache.update(&targets, 4, &NoopProgress, None);

    assert_eq!(outcome.cached, 0);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.plaintext.len(), 1);
}

#[test]
fn test_query_only_returns_requested_files() {
    let dir = tempdir().unwrap();
    let first = seed(dir.path(), "one.dwg", &dxf_bytes("valve one"));
    let second = seed(dir.path(), "two.dwg", &dxf_bytes("valve two"));
    let both = vec![first, second];

    let mut cache = TextCache::open(&both[0].output_root).unwrap();
    cache.update(&both, u64::MAX, &NoopProgress, None);

    let rows = cache.query(&both[..1], &kw(&["valve"])).unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].file_name, "one.dwg");
}

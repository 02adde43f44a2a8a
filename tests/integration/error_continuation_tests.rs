use cadtext::cache::CACHE_FILE_NAME;
use cadtext::config::Settings;
use cadtext::pipeline::{Pipeline, PipelineConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn dxf_bytes(text: &str) -> Vec<u8> {
    format!("0\nSECTION\n2\nENTITIES\n0\nTEXT\n8\nL\n1\n{text}\n0\nENDSEC\n0\nEOF\n").into_bytes()
}

fn seed_drawing(dir: &Path, name: &str, converted_bytes: &[u8]) -> PathBuf {
    let source = dir.join(name);
    fs::write(&source, b"drawing bytes").unwrap();
    let out = dir.join("output");
    fs::create_dir_all(&out).unwrap();
    let converted = out.join(Path::new(name).with_extension("dxf"));
    fs::write(&converted, converted_bytes).unwrap();
    filetime::set_file_mtime(&source, filetime::FileTime::from_unix_time(1_000_000, 0)).unwrap();
    filetime::set_file_mtime(&converted, filetime::FileTime::from_unix_time(1_000_100, 0))
        .unwrap();
    source
}

#[test]
fn test_corrupt_cache_database_degrades_to_direct_scan() {
    let dir = tempdir().unwrap();
    seed_drawing(dir.path(), "plan.dwg", &dxf_bytes("main valve"));
    fs::write(
        dir.path().join("output").join(CACHE_FILE_NAME),
        b"not a sqlite database",
    )
    .unwrap();

    let pipeline = Pipeline::new(PipelineConfig::new(Settings::default()));
    let outcome = pipeline
        .run(&[dir.path().to_path_buf()], &[], &["valve".to_string()])
        .unwrap();

    // The unusable database never aborts the run; matches still come
    // back from parsing the interchange file directly.
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.stats.files_cached, 0);
    assert_eq!(outcome.stats.served_from_cache, 0);
}

#[test]
fn test_missing_source_with_fresh_output_still_scans() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("output");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("gone.dxf"), dxf_bytes("main valve")).unwrap();

    // The drawing itself vanished, so nothing must be converted, but the
    // surviving output is still searchable.
    let source = dir.path().join("gone.dwg");
    let pipeline = Pipeline::new(PipelineConfig::new(Settings::default()));
    let outcome = pipeline
        .run(&[], &[source], &["valve".to_string()])
        .unwrap();

    assert_eq!(outcome.stats.outputs_up_to_date, 1);
    assert_eq!(outcome.stats.conversions_run, 0);
    assert_eq!(outcome.results.len(), 1);
}

#[cfg(unix)]
#[test]
fn test_unreadable_interchange_is_tolerated() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let source = seed_drawing(dir.path(), "locked.dwg", &dxf_bytes("valve"));
    let converted = dir.path().join("output").join("locked.dxf");

    let mut perms = fs::metadata(&converted).unwrap().permissions();
    perms.set_mode(0o000);
    fs::set_permissions(&converted, perms).unwrap();

    // Root ignores file modes; skip if the file is still readable
    if fs::File::open(&converted).is_ok() {
        return;
    }

    let pipeline = Pipeline::new(PipelineConfig::new(Settings::default()));
    let outcome = pipeline
        .run(&[], &[source], &["valve".to_string()])
        .unwrap();

    // The unreadable file is reported as a parse failure and yields no
    // rows, without failing the run.
    assert_eq!(outcome.stats.parse_failures, 1);
    assert!(outcome.results.is_empty());
}

use cadtext::config::Settings;
use cadtext::pipeline::{Pipeline, PipelineConfig, ALL_KEYWORD, PLAIN_TEXT_OBJECT_TYPE};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn dxf_bytes(text: &str) -> Vec<u8> {
    format!("0\nSECTION\n2\nENTITIES\n0\nTEXT\n8\nL\n1\n{text}\n0\nENDSEC\n0\nEOF\n").into_bytes()
}

/// Drawing plus an interchange output newer than it, so the run needs no
/// converter.
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

fn kw(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

#[test]
fn test_scan_finds_keywords_across_folders() {
    let dir_a = tempdir().unwrap();
    let dir_b = tempdir().unwrap();
    seed_drawing(dir_a.path(), "boiler.dwg", &dxf_bytes("main valve V-1"));
    seed_drawing(dir_b.path(), "annex.dwg", &dxf_bytes("fire pump P-7"));

    let pipeline = Pipeline::new(PipelineConfig::new(Settings::default()));
    let outcome = pipeline
        .run(
            &[dir_a.path().to_path_buf(), dir_b.path().to_path_buf()],
            &[],
            &kw(&["valve", "pump"]),
        )
        .unwrap();

    assert_eq!(outcome.stats.targets, 2);
    assert_eq!(outcome.results.len(), 2);
    // Rows come back ordered by file name.
    assert_eq!(outcome.results[0].file_name, "annex.dwg");
    assert_eq!(outcome.results[0].keyword, "pump");
    assert_eq!(outcome.results[1].file_name, "boiler.dwg");
    assert_eq!(outcome.results[1].keyword, "valve");
}

#[test]
fn test_second_run_serves_from_cache() {
    let dir = tempdir().unwrap();
    seed_drawing(dir.path(), "plan.dwg", &dxf_bytes("main valve"));

    let pipeline = Pipeline::new(PipelineConfig::new(Settings::default()));
    let folders = [dir.path().to_path_buf()];

    let first = pipeline.run(&folders, &[], &kw(&["valve"])).unwrap();
    assert_eq!(first.stats.files_cached, 1);
    assert_eq!(first.stats.served_from_cache, 0);

    let second = pipeline.run(&folders, &[], &kw(&["valve"])).unwrap();
    assert_eq!(second.stats.files_cached, 0);
    assert_eq!(second.stats.served_from_cache, 1);
    assert_eq!(second.results.len(), 1);
}

#[test]
fn test_empty_keywords_list_every_text() {
    let dir = tempdir().unwrap();
    seed_drawing(dir.path(), "plan.dwg", &dxf_bytes("equipment room"));

    let pipeline = Pipeline::new(PipelineConfig::new(Settings::default()));
    let outcome = pipeline
        .run(&[dir.path().to_path_buf()], &[], &[])
        .unwrap();

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].keyword, ALL_KEYWORD);
    assert_eq!(outcome.results[0].content, "equipment room");
}

#[test]
fn test_unparseable_output_reaches_results_as_plain_text() {
    let dir = tempdir().unwrap();
    seed_drawing(dir.path(), "legacy.dwg", b"binary-ish blob with a valve inside");

    let pipeline = Pipeline::new(PipelineConfig::new(Settings::default()));
    let outcome = pipeline
        .run(&[dir.path().to_path_buf()], &[], &kw(&["valve"]))
        .unwrap();

    assert_eq!(outcome.stats.parse_failures, 1);
    assert_eq!(outcome.stats.plain_text_scans, 1);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].object_type, PLAIN_TEXT_OBJECT_TYPE);
}

#[test]
fn test_filters_cover_result_facets() {
    let dir = tempdir().unwrap();
    seed_drawing(dir.path(), "plan.dwg", &dxf_bytes("valve and more"));

    let pipeline = Pipeline::new(PipelineConfig::new(Settings::default()));
    let outcome = pipeline
        .run(&[dir.path().to_path_buf()], &[], &kw(&["valve"]))
        .unwrap();

    assert!(outcome.filters.files.contains(&"plan.dwg".to_string()));
    assert!(outcome.filters.keywords.contains(&"valve".to_string()));
    assert_eq!(outcome.filters.files[0], ALL_KEYWORD);
}

#[cfg(unix)]
#[test]
fn test_failing_converter_does_not_abort_the_run() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("plan.dwg");
    fs::write(&source, b"drawing").unwrap();

    // /bin/false launches fine and exits non-zero without producing any
    // interchange file; the run carries on and simply finds nothing.
    let mut settings = Settings::default();
    settings.converter_path = PathBuf::from("/bin/false");

    let pipeline = Pipeline::new(PipelineConfig::new(settings));
    let outcome = pipeline
        .run(&[dir.path().to_path_buf()], &[], &kw(&["valve"]))
        .unwrap();

    assert_eq!(outcome.stats.conversions_run, 1);
    assert_eq!(outcome.stats.conversion_failures, 0);
    assert!(outcome.results.is_empty());
}

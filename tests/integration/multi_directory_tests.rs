use cadtext::config::Settings;
use cadtext::pipeline::build_scan_targets;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_folders_and_loose_files_combine() {
    let dir_a = tempdir().unwrap();
    let dir_b = tempdir().unwrap();
    fs::write(dir_a.path().join("one.dwg"), b"x").unwrap();
    fs::write(dir_a.path().join("two.dwg"), b"x").unwrap();
    let loose = dir_b.path().join("three.dwg");
    fs::write(&loose, b"x").unwrap();

    let settings = Settings::default();
    let targets = build_scan_targets(&[dir_a.path().to_path_buf()], &[loose], &settings);

    assert_eq!(targets.len(), 3);
}

#[test]
fn test_loose_file_inside_requested_folder_is_not_doubled() {
    let dir = tempdir().unwrap();
    let inside = dir.path().join("plan.dwg");
    fs::write(&inside, b"x").unwrap();

    let settings = Settings::default();
    let targets = build_scan_targets(&[dir.path().to_path_buf()], &[inside], &settings);

    assert_eq!(targets.len(), 1);
}

#[test]
fn test_nested_subdirectories_are_walked() {
    let dir = tempdir().unwrap();
    let deep = dir.path().join("site").join("floor2");
    fs::create_dir_all(&deep).unwrap();
    fs::write(dir.path().join("top.dwg"), b"x").unwrap();
    fs::write(deep.join("detail.dwg"), b"x").unwrap();

    let settings = Settings::default();
    let targets = build_scan_targets(&[dir.path().to_path_buf()], &[], &settings);

    assert_eq!(targets.len(), 2);
}

#[test]
fn test_conversion_outputs_are_not_rescanned() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("output");
    fs::create_dir_all(&out).unwrap();
    fs::write(dir.path().join("plan.dwg"), b"x").unwrap();
    // A drawing that somehow ended up inside an output folder stays out
    // of the target list, otherwise every run would chain new outputs.
    fs::write(out.join("stray.dwg"), b"x").unwrap();

    let settings = Settings::default();
    let targets = build_scan_targets(&[dir.path().to_path_buf()], &[], &settings);

    assert_eq!(targets.len(), 1);
    assert!(targets[0].source.ends_with("plan.dwg"));
}

#[test]
fn test_uppercase_extensions_match_the_filter() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("UPPER.DWG"), b"x").unwrap();
    fs::write(dir.path().join("notes.txt"), b"x").unwrap();

    let settings = Settings::default();
    let targets = build_scan_targets(&[dir.path().to_path_buf()], &[], &settings);

    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].file_name(), "UPPER.DWG");
}

#[test]
fn test_loose_file_bypasses_the_filter() {
    let dir = tempdir().unwrap();
    let odd = dir.path().join("already.dxf");
    fs::write(&odd, b"x").unwrap();

    let settings = Settings::default();
    let targets = build_scan_targets(&[], &[odd], &settings);

    // Explicitly chosen files are taken as given, the *.dwg filter only
    // applies to folder walks.
    assert_eq!(targets.len(), 1);
}

#[test]
fn test_target_paths_sit_next_to_the_source() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("site.dwg");
    fs::write(&source, b"x").unwrap();

    let settings = Settings::default();
    let targets = build_scan_targets(&[], &[source], &settings);

    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].output_root, dir.path().join("output"));
    assert_eq!(
        targets[0].converted,
        dir.path().join("output").join("site.dxf")
    );
}

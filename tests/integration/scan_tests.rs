use cadtext::pipeline::scan::{scan_plain_text, scan_target_directly};
use cadtext::pipeline::{ScanTarget, PLAIN_TEXT_CONTENT, PLAIN_TEXT_OBJECT_TYPE};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn target_for(source: &Path) -> ScanTarget {
    let output_root = source.parent().unwrap().join("output");
    let converted = output_root
        .join(source.file_name().unwrap())
        .with_extension("dxf");
    ScanTarget {
        source: source.to_path_buf(),
        output_root,
        converted,
    }
}

fn seed(dir: &Path, name: &str, converted_bytes: &[u8]) -> ScanTarget {
    let source = dir.join(name);
    fs::write(&source, b"drawing").unwrap();
    let target = target_for(&source);
    fs::create_dir_all(&target.output_root).unwrap();
    fs::write(&target.converted, converted_bytes).unwrap();
    target
}

fn kw(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

#[test]
fn test_structured_rows_from_disk() {
    let dir = tempdir().unwrap();
    let dxf = "0\nSECTION\n2\nENTITIES\n\
               0\nTEXT\n8\nP-1\n1\nvalve body\n\
               0\nMTEXT\n8\nP-2\n1\n{\\fSimHei;valve seat}\n\
               0\nINSERT\n8\nBLK\n2\nPUMP\n66\n1\n\
               0\nATTRIB\n8\nTAG\n1\nvalve tag\n\
               0\nSEQEND\n\
               0\nENDSEC\n0\nEOF\n";
    let target = seed(dir.path(), "plan.dwg", dxf.as_bytes());

    let results = scan_target_directly(&target, &kw(&["valve"]), u64::MAX);

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].object_type, "TEXT");
    assert_eq!(results[0].content, "valve body");
    assert_eq!(results[0].layer, "P-1");
    assert_eq!(results[1].object_type, "MTEXT");
    assert_eq!(results[1].content, "valve seat");
    assert_eq!(results[2].object_type, "ATTRIB");
    assert_eq!(results[2].content, "valve tag");
    assert!(results.iter().all(|r| r.file_name == "plan.dwg"));
}

#[test]
fn test_oversize_interchange_skips_parsing() {
    let dir = tempdir().unwrap();
    let dxf = "0\nSECTION\n2\nENTITIES\n0\nTEXT\n8\nL\n1\nvalve\n0\nENDSEC\n0\nEOF\n";
    let target = seed(dir.path(), "big.dwg", dxf.as_bytes());

    // Threshold below the file size forces the raw text fallback.
    let results = scan_target_directly(&target, &kw(&["valve"]), 4);

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].object_type, PLAIN_TEXT_OBJECT_TYPE);
    assert_eq!(results[0].content, PLAIN_TEXT_CONTENT);
    assert_eq!(results[0].keyword, "valve");
}

#[test]
fn test_corrupt_interchange_falls_back_to_plain_text() {
    let dir = tempdir().unwrap();
    let target = seed(dir.path(), "broken.dwg", b"not a group code\nvalve station\n");

    let results = scan_target_directly(&target, &kw(&["valve"]), u64::MAX);

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].object_type, PLAIN_TEXT_OBJECT_TYPE);
}

#[test]
fn test_utf16_plain_text_finds_chinese_keyword() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("chinese.dwg");
    fs::write(&source, b"drawing").unwrap();
    let target = target_for(&source);
    fs::create_dir_all(&target.output_root).unwrap();

    let mut bytes = vec![0xFF, 0xFE];
    for unit in "阀门编号 FV-101".encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    fs::write(&target.converted, &bytes).unwrap();

    let results = scan_plain_text(&target.converted, &kw(&["阀门"]), &target).unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].keyword, "阀门");
}

#[test]
fn test_keyword_straddling_read_blocks_is_found() {
    let dir = tempdir().unwrap();
    // Invalid as an interchange file, so scanning drops to raw text,
    // with the keyword crossing the first 8192 byte block.
    let mut content = "z".repeat(8192 - 3);
    content.push_str("valve");
    content.push_str(&"z".repeat(64));
    let target = seed(dir.path(), "huge.dwg", content.as_bytes());

    let results = scan_target_directly(&target, &kw(&["valve"]), u64::MAX);

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].keyword, "valve");
}

#[test]
fn test_no_matches_returns_empty() {
    let dir = tempdir().unwrap();
    let dxf = "0\nSECTION\n2\nENTITIES\n0\nTEXT\n8\nL\n1\npump\n0\nENDSEC\n0\nEOF\n";
    let target = seed(dir.path(), "plan.dwg", dxf.as_bytes());

    let results = scan_target_directly(&target, &kw(&["valve"]), u64::MAX);

    assert!(results.is_empty());
}

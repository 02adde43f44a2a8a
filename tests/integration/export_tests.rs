use cadtext::output::CsvExport;
use cadtext::pipeline::MatchResult;
use std::fs;
use tempfile::tempdir;

fn row(file: &str, keyword: &str, content: &str) -> MatchResult {
    MatchResult {
        file_name: file.to_string(),
        object_type: "TEXT".to_string(),
        layer: "0".to_string(),
        keyword: keyword.to_string(),
        content: content.to_string(),
        source_file_path: format!("/tmp/output/{file}"),
        original_source_path: format!("/tmp/{file}"),
    }
}

#[test]
fn test_export_writes_headers_and_rows() {
    let results = vec![
        row("plan.dwg", "阀门", "主阀门 V-1"),
        row("annex.dwg", "pump", "fire pump"),
    ];

    let text = CsvExport::new(&results).to_string().unwrap();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "文件名,对象类型,图层,关键字,匹配内容");
    assert_eq!(lines[1], "plan.dwg,TEXT,0,阀门,主阀门 V-1");
    assert_eq!(lines[2], "annex.dwg,TEXT,0,pump,fire pump");
}

#[test]
fn test_export_quotes_embedded_commas() {
    let results = vec![row("plan.dwg", "valve", "valve, spare")];

    let text = CsvExport::new(&results).to_string().unwrap();

    assert!(text.contains("\"valve, spare\""));
}

#[test]
fn test_empty_export_still_has_headers() {
    let text = CsvExport::new(&[]).to_string().unwrap();

    assert_eq!(text.trim_end(), "文件名,对象类型,图层,关键字,匹配内容");
}

#[test]
fn test_export_to_file_on_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("matches.csv");
    let results = vec![row("plan.dwg", "泵", "消防泵房")];

    CsvExport::new(&results).write_to_path(&path).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("消防泵房"));
    assert_eq!(text.lines().count(), 2);
}

//! Result Aggregator Integration Tests

use std::collections::HashSet;
use std::path::PathBuf;

use recon_pipeline::ResultAggregator;
use tempfile::TempDir;

fn write_artifacts(temp: &TempDir, contents: &[&str]) -> Vec<PathBuf> {
    contents
        .iter()
        .enumerate()
        .map(|(i, content)| {
            let path = temp.path().join(format!("tool{}.txt", i));
            std::fs::write(&path, content).unwrap();
            path
        })
        .collect()
}

#[test]
fn test_merge_two_overlapping_files() {
    let temp = TempDir::new().unwrap();
    let paths = write_artifacts(&temp, &["a.com\nb.com\n", "b.com\nc.com\n"]);
    let merged = ResultAggregator::new().merge("enum", &paths);
    assert_eq!(merged, vec!["a.com", "b.com", "c.com"]);
}

#[test]
fn test_merge_is_dedup_superset() {
    let temp = TempDir::new().unwrap();
    let inputs = [
        "www.example.com\napi.example.com\n\n  mail.example.com  \n",
        "api.example.com\nvpn.example.com\nwww.example.com\n",
        "",
        "vpn.example.com\r\ndev.example.com\napi.example.com",
    ];
    let paths = write_artifacts(&temp, &inputs);
    let merged = ResultAggregator::new().merge("enum", &paths);

    let input_lines: Vec<&str> = inputs
        .iter()
        .flat_map(|c| c.lines())
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    assert!(merged.len() <= input_lines.len());

    let distinct: HashSet<&str> = input_lines.iter().copied().collect();
    assert_eq!(merged.len(), distinct.len());
    for line in &distinct {
        assert_eq!(merged.iter().filter(|m| m == line).count(), 1);
    }

    let mut first_seen = Vec::new();
    for line in input_lines {
        if !first_seen.contains(&line) {
            first_seen.push(line);
        }
    }
    assert_eq!(merged, first_seen);
}

#[test]
fn test_merge_tolerates_missing_artifact() {
    let temp = TempDir::new().unwrap();
    let mut paths = write_artifacts(&temp, &["a.com\n"]);
    paths.insert(0, temp.path().join("tool-that-found-nothing.txt"));
    let merged = ResultAggregator::new().merge("enum", &paths);
    assert_eq!(merged, vec!["a.com"]);
}

use std::path::PathBuf;

use sketchreel::{HistoryStore, Step};

fn fresh_path(name: &str) -> PathBuf {
    let dir = PathBuf::from("target").join("history_store");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn steps(title: &str) -> Vec<Step> {
    vec![Step::new(title, "desc", "line(0, 0, 1, 1)")]
}

#[test]
fn records_are_most_recent_first_and_deduplicated() {
    let path = fresh_path("dedup.json");
    let mut history = HistoryStore::open(&path, 20).unwrap();
    assert!(history.is_empty());

    history.record("How to boil an egg", steps("a")).unwrap();
    history.record("Tie a knot", steps("b")).unwrap();
    history.record("  how TO boil an EGG ", steps("c")).unwrap();

    let queries: Vec<_> = history.records().iter().map(|r| r.query.as_str()).collect();
    assert_eq!(queries, ["how TO boil an EGG", "Tie a knot"]);
    assert_eq!(history.records()[0].steps[0].title, "c");
    assert!(history.find("tie A KNOT").is_some());

    let reloaded = HistoryStore::open(&path, 20).unwrap();
    assert_eq!(reloaded.records(), history.records());
}

#[test]
fn cap_drops_the_oldest_records() {
    let path = fresh_path("cap.json");
    let mut history = HistoryStore::open(&path, 3).unwrap();
    for i in 0..5 {
        history.record(&format!("query {i}"), steps("s")).unwrap();
    }
    let queries: Vec<_> = history.records().iter().map(|r| r.query.clone()).collect();
    assert_eq!(queries, ["query 4", "query 3", "query 2"]);

    let smaller = HistoryStore::open(&path, 2).unwrap();
    assert_eq!(smaller.len(), 2);
}

#[test]
fn remove_clear_and_invalid_input() {
    let path = fresh_path("remove.json");
    let mut history = HistoryStore::open(&path, 5).unwrap();
    assert!(history.record("   ", steps("s")).is_err());
    assert!(HistoryStore::open(&path, 0).is_err());

    history.record("one", steps("s")).unwrap();
    history.record("two", steps("s")).unwrap();
    assert!(history.remove("ONE").unwrap());
    assert!(!history.remove("one").unwrap());
    assert_eq!(history.len(), 1);

    history.clear().unwrap();
    assert!(HistoryStore::open(&path, 5).unwrap().is_empty());

    std::fs::write(&path, "{not json").unwrap();
    assert!(HistoryStore::open(&path, 5).is_err());
}

use std::fs;

use article_fetcher::{Article, DataStore, FileDataStore, Section, Site, StoreError, Title};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn article(text: &str) -> Article {
    let title = Title::new(Site::wikipedia("en").unwrap(), text).unwrap();
    Article {
        display_title: title.text().to_string(),
        title,
        page_id: Some(42),
        last_modified: None,
        last_modified_by: None,
        description: Some("suspension bridge".into()),
        redirected: None,
        language_count: 3,
        editable: true,
        protection: Vec::new(),
        sections: vec![Section {
            id: 0,
            toc_level: 0,
            level: None,
            line: String::new(),
            anchor: String::new(),
            number: String::new(),
            from_title: None,
            text: "<p>Lead</p>".into(),
        }],
    }
}

#[test]
fn open_creates_missing_store_dir() {
    let temp = TempDir::new().unwrap();
    let new_dir = temp.path().join("articles");
    assert!(!new_dir.exists());

    let store = FileDataStore::open(&new_dir).unwrap();
    assert!(new_dir.is_dir());
    assert_eq!(store.dir(), new_dir.as_path());
    assert_eq!(fs::read_dir(&new_dir).unwrap().count(), 0);
}

#[test]
fn open_rejects_a_file_path() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    let err = FileDataStore::open(&file_path).unwrap_err();
    assert!(matches!(err, StoreError::NotADirectory(ref path) if *path == file_path));
}

#[test]
fn open_removes_partial_articles() {
    let temp = TempDir::new().unwrap();
    let bridge = article("Golden Gate Bridge");
    FileDataStore::new(temp.path()).save_article(&bridge).unwrap();
    fs::write(temp.path().join(".partial-k3j2.json"), "{ half").unwrap();
    fs::write(temp.path().join("notes.txt"), "kept").unwrap();

    let store = FileDataStore::open(temp.path()).unwrap();
    assert!(!temp.path().join(".partial-k3j2.json").exists());
    assert!(temp.path().join("notes.txt").exists());
    assert_eq!(store.article(&bridge.title), Some(bridge));
}

#[test]
fn save_into_a_file_path_leaves_nothing_behind() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    let store = FileDataStore::new(file_path.clone());
    let err = store.save_article(&article("Golden Gate Bridge")).unwrap_err();
    assert!(matches!(err, StoreError::NotADirectory(_)));
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
    assert_eq!(fs::read_to_string(&file_path).unwrap(), "x");
}

#[test]
fn file_store_round_trips_articles() {
    let temp = TempDir::new().unwrap();
    let store = FileDataStore::new(temp.path().join("store"));
    let bridge = article("Golden Gate Bridge");

    assert_eq!(store.article(&bridge.title), None);
    store.save_article(&bridge).unwrap();

    let path = store.path_for(&bridge.title);
    assert!(path.is_file());
    assert!(path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("Golden_Gate_Bridge--"));
    assert_eq!(store.article(&bridge.title), Some(bridge.clone()));

    let mut updated = bridge.clone();
    updated.language_count = 4;
    store.save_article(&updated).unwrap();
    assert_eq!(store.article(&bridge.title), Some(updated));
    assert_eq!(fs::read_dir(store.dir()).unwrap().count(), 1);
}

#[test]
fn file_store_ignores_corrupt_entries() {
    let temp = TempDir::new().unwrap();
    let store = FileDataStore::new(temp.path());
    let bridge = article("Golden Gate Bridge");
    fs::write(store.path_for(&bridge.title), "{ not json").unwrap();

    assert_eq!(store.article(&bridge.title), None);
}

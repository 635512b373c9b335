use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

use frame_engine::config::Configuration;
use frame_engine::events::MediaKind;
use frame_engine::tasks::indexer::MediaIndexer;

fn touch(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, b"x").unwrap();
}

fn config(root: &Path) -> Configuration {
    Configuration {
        static_root: root.to_path_buf(),
        prepared_dir: root.join("prepared"),
        favorites_path: root.join("favorites.json"),
        filter_states_path: root.join("filter_states.json"),
        ..Configuration::default()
    }
}

fn sources(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn derivatives_and_unsupported_files_are_not_base_items() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let immich = cfg.prepared_dir.join("immich");
    for name in [
        "a.jpg",
        "a_polaroid.jpg",
        "a_postcard.jpg",
        "B.JPEG",
        "clip.mp4",
        "clip_thumbnail.jpg",
        "notes.txt",
        ".hidden.jpg",
    ] {
        touch(&immich.join(name));
    }
    std::fs::create_dir_all(immich.join("nested")).unwrap();
    touch(&immich.join("nested/deep.jpg"));

    let items = MediaIndexer::from_disk(&cfg).index(&sources(&["immich"]));
    let names: Vec<&str> = items.iter().map(|i| i.base_name.as_str()).collect();
    assert_eq!(names, vec!["B.JPEG", "a.jpg", "clip.mp4"]);

    let clip = &items[2];
    assert_eq!(clip.kind, MediaKind::Video);
    assert_eq!(clip.display_path, immich.join("clip.mp4"));
    assert_eq!(clip.reported_path(), immich.join("clip_thumbnail.jpg"));
}

#[test]
fn filter_state_selects_existing_variant() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let immich = cfg.prepared_dir.join("immich");
    for name in ["a.jpg", "a_polaroid.jpg", "b.jpg", "c.jpg", "c_postcard.jpg"] {
        touch(&immich.join(name));
    }
    std::fs::write(
        &cfg.filter_states_path,
        r#"{"immich/a.jpg": "polaroid", "immich/b.jpg": "postcard", "immich/c.jpg": "original"}"#,
    )
    .unwrap();

    let items = MediaIndexer::from_disk(&cfg).index(&sources(&["immich"]));
    assert_eq!(items[0].display_path, immich.join("a_polaroid.jpg"));
    // Requested variant was never rendered.
    assert_eq!(items[1].display_path, immich.join("b.jpg"));
    // Sources without a default variant show the base for "original".
    assert_eq!(items[2].display_path, immich.join("c.jpg"));
}

#[test]
fn time_boosted_source_defaults_to_postcard() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let telegram = cfg.prepared_dir.join("telegram");
    for name in [
        "telegram_1700000000_1.jpg",
        "telegram_1700000000_1_postcard.jpg",
        "telegram_1700000100_2.jpg",
        "telegram_1700000100_2_polaroid.jpg",
        "telegram_1700000100_2_postcard.jpg",
        "telegram_1700000200_3.jpg",
    ] {
        touch(&telegram.join(name));
    }
    std::fs::write(
        &cfg.filter_states_path,
        r#"{"telegram/telegram_1700000100_2.jpg": "polaroid"}"#,
    )
    .unwrap();

    let items = MediaIndexer::from_disk(&cfg).index(&sources(&["telegram"]));
    assert_eq!(items.len(), 3);
    assert_eq!(
        items[0].display_path,
        telegram.join("telegram_1700000000_1_postcard.jpg")
    );
    assert_eq!(
        items[1].display_path,
        telegram.join("telegram_1700000100_2_polaroid.jpg")
    );
    assert_eq!(items[2].display_path, telegram.join("telegram_1700000200_3.jpg"));
    assert_eq!(
        items[0].fresh,
        Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    );
}

#[test]
fn missing_source_directory_yields_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    touch(&cfg.prepared_dir.join("immich/a.jpg"));

    let items = MediaIndexer::from_disk(&cfg).index(&sources(&["samba", "immich", "usb"]));
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].source, "immich");
}

#[test]
fn favorites_mark_items_regardless_of_variant() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let immich = cfg.prepared_dir.join("immich");
    for name in ["a.jpg", "a_polaroid.jpg", "b.jpg"] {
        touch(&immich.join(name));
    }
    std::fs::write(&cfg.favorites_path, r#"["immich/a_polaroid.jpg"]"#).unwrap();
    std::fs::write(&cfg.filter_states_path, "not json").unwrap();

    let items = MediaIndexer::from_disk(&cfg).index(&sources(&["immich"]));
    assert!(items[0].favorite);
    assert!(!items[1].favorite);
    assert_eq!(items[0].key(), "immich/a.jpg");
}

use eink_frame::catalog;
use std::fs;
use std::thread::sleep;
use std::time::Duration;
use tempfile::tempdir;

// Keeps creation timestamps of successive entries apart.
fn pause() {
    sleep(Duration::from_millis(50));
}

#[test]
fn all_files_lists_only_frames_in_name_order() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path();
    for name in ["c.bmp", "a.bmp", "b.BMP", "notes.txt", "raw.jpg"] {
        fs::write(dir.join(name), b"x").unwrap();
    }
    fs::create_dir(dir.join("nested.bmp")).unwrap();

    let files = catalog::all_files(dir);
    assert_eq!(
        files,
        vec![dir.join("a.bmp"), dir.join("b.BMP"), dir.join("c.bmp")]
    );
    // Stable across calls.
    assert_eq!(catalog::all_files(dir), files);
}

#[test]
fn most_recent_file_picks_newest_frame() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("z-old.bmp"), b"x").unwrap();
    pause();
    fs::write(dir.join("a-new.bmp"), b"x").unwrap();
    pause();
    fs::write(dir.join("newest.jpg"), b"x").unwrap();

    assert_eq!(catalog::most_recent_file(dir), Some(dir.join("a-new.bmp")));
}

#[test]
fn most_recent_subfolder_picks_newest_directory() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    fs::create_dir(root.join("2024-06-01")).unwrap();
    pause();
    fs::create_dir(root.join("2024-01-01")).unwrap();
    pause();
    fs::write(root.join("stray.bmp"), b"x").unwrap();

    assert_eq!(
        catalog::most_recent_subfolder(root),
        Some(root.join("2024-01-01"))
    );
}

#[test]
fn empty_or_missing_folders_have_nothing_to_display() {
    let tmp = tempdir().unwrap();
    let missing = tmp.path().join("missing");

    assert!(catalog::all_files(tmp.path()).is_empty());
    assert_eq!(catalog::most_recent_file(tmp.path()), None);
    assert_eq!(catalog::most_recent_subfolder(tmp.path()), None);
    assert!(catalog::all_files(&missing).is_empty());
    assert_eq!(catalog::most_recent_subfolder(&missing), None);
}

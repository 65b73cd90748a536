#![cfg(feature = "cli")]

use std::fs;

use emx_zippey::install::{gitattributes_lines, merge_gitattributes, scan_zip_extensions};
use emx_zippey::{write_archive, Decoder, Entry};

#[test]
fn test_scan_finds_zip_based_files() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let archive = write_archive(&[Entry::new("word/document.xml", "<w/>")]).unwrap();

    fs::create_dir_all(root.join("docs/nested")).unwrap();
    fs::create_dir_all(root.join(".git/objects")).unwrap();
    fs::write(root.join("docs/report.docx"), &archive).unwrap();
    fs::write(root.join("docs/nested/lib.JAR"), &archive).unwrap();
    fs::write(root.join("docs/readme.txt"), "plain text").unwrap();
    fs::write(root.join("docs/fake.zip"), "not really a zip").unwrap();
    fs::write(root.join(".git/objects/pack.odt"), &archive).unwrap();
    fs::write(root.join("NOEXT"), &archive).unwrap();

    let patterns = scan_zip_extensions(root).unwrap();
    assert_eq!(patterns, vec!["*.docx", "*.jar"]);
}

#[test]
fn test_scan_counts_empty_archives() {
    let dir = tempfile::tempdir().unwrap();
    let empty = Decoder::new().decode(b"").unwrap();
    fs::write(dir.path().join("blank.xlsx"), empty).unwrap();

    assert_eq!(scan_zip_extensions(dir.path()).unwrap(), vec!["*.xlsx"]);
}

#[test]
fn test_gitattributes_file_merge() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".gitattributes");
    fs::write(&path, "* text=auto\n").unwrap();

    let lines = gitattributes_lines(&["*.docx", "*.pptx"], "zippey");
    let merged = merge_gitattributes(&fs::read_to_string(&path).unwrap(), &lines);
    fs::write(&path, &merged).unwrap();

    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "* text=auto\n*.docx filter=zippey\n*.pptx filter=zippey\n"
    );
}

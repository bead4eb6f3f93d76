use std::fs;
use tempfile::TempDir;

use qagent_core::chunker::Chunker;
use qagent_core::normalize::{Normalizer, SourceFile};
use qagent_core::types::DocumentFormat;

#[test]
fn normalize_and_chunk_files_from_disk() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("rules.md"), "# Coupons\n\nSAVE10 provides $10.00 off orders over $50.\n").unwrap();
    fs::write(dir.join("long.txt"), "word ".repeat(600)).unwrap();

    let normalizer = Normalizer::new();
    let chunker = Chunker::new(1000, 200).unwrap();

    let rules = normalizer.document(&SourceFile::read(&dir.join("rules.md")).unwrap()).unwrap();
    assert_eq!(rules.format, DocumentFormat::Markdown);
    assert_eq!(chunker.chunk(&rules).len(), 1, "short document is a single chunk");

    let long = normalizer.document(&SourceFile::read(&dir.join("long.txt")).unwrap()).unwrap();
    let chunks = chunker.chunk(&long);
    assert!(chunks.len() >= 3, "3000 chars in 1000-char windows");
    for (i, c) in chunks.iter().enumerate() {
        assert_eq!(c.seq, i);
        assert_eq!(c.doc_id, "long.txt");
        assert!(c.text.chars().count() <= 1000);
    }
}

#[test]
fn identical_bytes_give_identical_chunks() {
    let body = "The checkout form requires an email address. ".repeat(80);
    let file = SourceFile::new("guide.txt", body.into_bytes());
    let chunker = Chunker::new(300, 60).unwrap();
    let a = chunker.chunk(&Normalizer::new().document(&file).unwrap());
    let b = chunker.chunk(&Normalizer::new().document(&file).unwrap());
    assert_eq!(a, b);
}

#[test]
fn truncated_pdf_is_rejected_not_fatal() {
    let normalizer = Normalizer::new();
    for bytes in [
        b"%PDF-1.7\n".to_vec(),
        b"%PDF-1.7\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n2 0 obj\n<< /Type /Pa".to_vec(),
        b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\nxref\n0 3\n0000000000 65535 f \ntrailer\n<< /Size 3 /Root 1 0 R >>\nstartxref\n9\n%%EOF".to_vec(),
    ] {
        let err = normalizer.document(&SourceFile::new("broken.pdf", bytes)).unwrap_err();
        assert!(matches!(err, qagent_core::Error::UnsupportedFormat(_)), "{err:?}");
    }

    let text = normalizer.document(&SourceFile::new("after.txt", b"still readable".to_vec())).unwrap();
    assert_eq!(text.text, "still readable");
}

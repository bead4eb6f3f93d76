use proptest::prelude::*;

use qagent_core::chunker::Chunker;
use qagent_core::types::{Document, DocumentFormat};

fn doc(text: String) -> Document {
    Document {
        id: "prop.txt".into(),
        filename: "prop.txt".into(),
        format: DocumentFormat::PlainText,
        byte_len: text.len(),
        text,
        content_hash: String::new(),
        warnings: vec![],
    }
}

fn window() -> impl Strategy<Value = (usize, usize)> {
    (2usize..200).prop_flat_map(|size| (Just(size), 0..size))
}

proptest! {
    #[test]
    fn spans_cover_text_without_gaps(text in "[a-z ]{0,2000}", (size, overlap) in window()) {
        let chunker = Chunker::new(size, overlap).unwrap();
        let n = text.chars().count();
        let spans = chunker.spans(&text);
        if n == 0 {
            prop_assert!(spans.is_empty());
        } else {
            prop_assert_eq!(spans[0].0, 0);
            prop_assert_eq!(spans[spans.len() - 1].1, n);
            for pair in spans.windows(2) {
                prop_assert!(pair[1].0 <= pair[0].1, "gap between windows");
                prop_assert!(pair[1].0 > pair[0].0, "no progress");
                prop_assert!(pair[0].1 - pair[1].0 <= overlap, "overlap exceeds bound");
            }
            for (s, e) in &spans {
                prop_assert!(e - s <= size);
                prop_assert!(e > s);
            }
        }
    }

    #[test]
    fn chunking_is_deterministic(text in "\\PC{0,600}", (size, overlap) in window()) {
        let chunker = Chunker::new(size, overlap).unwrap();
        let a = chunker.chunk(&doc(text.clone()));
        let b = chunker.chunk(&doc(text));
        prop_assert_eq!(a, b);
    }

    #[test]
    fn chunk_text_matches_offsets(text in "[a-zA-Z0-9 éü]{1,800}", (size, overlap) in window()) {
        let d = doc(text);
        let chars: Vec<char> = d.text.chars().collect();
        for c in Chunker::new(size, overlap).unwrap().chunk(&d) {
            let expected: String = chars[c.char_start..c.char_end].iter().collect();
            prop_assert_eq!(c.text, expected);
        }
    }
}

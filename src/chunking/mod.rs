//! Line-based chunking with lexical declaration boundaries.
//!
//! Lines are accumulated until either the next line would push the chunk past
//! the size ceiling (the chunk is flushed *before* that line) or the current
//! line contains a declaration marker (the chunk is flushed *after* it).
//! A single line longer than the ceiling is never split.

pub mod markers;

use crate::models::Chunk;
use markers::MarkerTable;

/// Default soft ceiling on chunk length, in characters.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1500;

/// Output of the chunking process.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOutput {
    pub content: String,
    /// 1-based start line in the original file.
    pub start_line: usize,
    /// 1-based end line in the original file.
    pub end_line: usize,
}

/// Split `content` into chunks of at most `max_chunk_size` characters,
/// closing a chunk after any line containing one of `markers`.
pub fn chunk_lines(content: &str, max_chunk_size: usize, markers: &[String]) -> Vec<ChunkOutput> {
    let mut chunks = Vec::new();
    let mut pending: Vec<&str> = Vec::new();
    let mut pending_len = 0usize;
    let mut start_line = 1usize;

    for line in content.lines() {
        let line_len = line.chars().count();

        if !pending.is_empty() && pending_len + line_len > max_chunk_size {
            flush(&mut chunks, &mut pending, &mut start_line);
            pending_len = 0;
        }

        pending.push(line);
        pending_len += line_len + 1;

        if markers.iter().any(|m| line.contains(m.as_str())) {
            flush(&mut chunks, &mut pending, &mut start_line);
            pending_len = 0;
        }
    }

    if !pending.is_empty() {
        flush(&mut chunks, &mut pending, &mut start_line);
    }

    chunks
}

fn flush(chunks: &mut Vec<ChunkOutput>, pending: &mut Vec<&str>, start_line: &mut usize) {
    let end_line = *start_line + pending.len() - 1;
    chunks.push(ChunkOutput {
        content: pending.join("\n"),
        start_line: *start_line,
        end_line,
    });
    *start_line = end_line + 1;
    pending.clear();
}

/// Chunk one file of a session, choosing markers by the file's extension.
pub fn chunk_file(
    session_key: &str,
    file_path: &str,
    content: &str,
    max_chunk_size: usize,
    markers: &MarkerTable,
) -> Vec<Chunk> {
    chunk_lines(content, max_chunk_size, markers.for_path(file_path))
        .into_iter()
        .enumerate()
        .map(|(i, c)| Chunk {
            session_key: session_key.to_string(),
            file_path: file_path.to_string(),
            chunk_index: i,
            content: c.content,
            start_line: c.start_line,
            end_line: c.end_line,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers(list: &[&str]) -> Vec<String> {
        list.iter().map(|m| m.to_string()).collect()
    }

    fn python_module(lines: usize, def_every: usize) -> String {
        (0..lines)
            .map(|i| {
                if i % def_every == 0 {
                    format!("def handler_{i}(request):")
                } else {
                    format!("    value_{i} = compute(request, {i})")
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_empty_content() {
        assert!(chunk_lines("", 100, &[]).is_empty());
    }

    #[test]
    fn test_small_file_single_chunk() {
        let chunks = chunk_lines("line 1\nline 2\nline 3", 1500, &[]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 3);
        assert_eq!(chunks[0].content, "line 1\nline 2\nline 3");
    }

    #[test]
    fn test_size_boundary_flushes_before_line() {
        // "aaaa" + separator = 5, then "bbbb" would reach 9 > 8.
        let chunks = chunk_lines("aaaa\nbbbb\ncc", 8, &[]);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "aaaa");
        assert_eq!(chunks[1].content, "bbbb\ncc");
        assert_eq!((chunks[1].start_line, chunks[1].end_line), (2, 3));
    }

    #[test]
    fn test_marker_flushes_after_line() {
        let content = "import os\ndef main():\n    pass\nclass Foo:\n    x = 1";
        let chunks = chunk_lines(content, 1500, &markers(&["def ", "class "]));
        let bodies: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(
            bodies,
            vec!["import os\ndef main():", "    pass\nclass Foo:", "    x = 1"]
        );
    }

    #[test]
    fn test_marker_is_lexical_substring() {
        // Matches inside a comment too: no parsing happens.
        let chunks = chunk_lines("# see def below\nx = 1", 1500, &markers(&["def "]));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "# see def below");
    }

    #[test]
    fn test_oversized_single_line_is_not_split() {
        let long = "x".repeat(50);
        let content = format!("a\n{long}\nb");
        let chunks = chunk_lines(&content, 10, &[]);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].content, long);
    }

    #[test]
    fn test_lines_reconstruct_and_respect_ceiling() {
        let content = python_module(700, 37);
        for max in [1, 40, 300, 1500] {
            let chunks = chunk_lines(&content, max, &markers(&["def "]));
            let rebuilt: Vec<&str> = chunks.iter().flat_map(|c| c.content.lines()).collect();
            let original: Vec<&str> = content.lines().collect();
            assert_eq!(rebuilt, original, "max_chunk_size={max}");

            for c in &chunks {
                let single_line = c.start_line == c.end_line;
                assert!(
                    c.content.chars().count() <= max || single_line,
                    "chunk over ceiling: {} chars, max {max}",
                    c.content.chars().count()
                );
            }
        }
    }

    #[test]
    fn test_line_numbers_are_true_offsets() {
        let content = python_module(300, 23);
        let lines: Vec<&str> = content.lines().collect();
        let chunks = chunk_lines(&content, 400, &markers(&["def "]));

        let mut expected_start = 1;
        for c in &chunks {
            assert_eq!(c.start_line, expected_start);
            let slice = lines[c.start_line - 1..c.end_line].join("\n");
            assert_eq!(slice, c.content);
            expected_start = c.end_line + 1;
        }
        assert_eq!(expected_start, lines.len() + 1);
    }

    #[test]
    fn test_readme_yields_one_chunk() {
        let readme: String = (0..50)
            .map(|i| format!("Line {i} of the readme."))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = chunk_file("s1", "README.md", &readme, 1500, &MarkerTable::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].end_line, 50);
    }

    #[test]
    fn test_main_py_splits_at_function_boundaries() {
        let source = python_module(2000, 100);
        let chunks = chunk_file("s1", "main.py", &source, 1500, &MarkerTable::default());
        assert!(chunks.len() > 20, "got {} chunks", chunks.len());

        let lines: Vec<&str> = source.lines().collect();
        let at_def = chunks
            .iter()
            .filter(|c| c.content.lines().last().unwrap().starts_with("def "))
            .count();
        // Every def line closes a chunk; the rest are size-driven splits in between.
        assert_eq!(at_def, 20);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert_eq!(c.session_key, "s1");
            assert_eq!(c.file_path, "main.py");
            assert!(c.content.chars().count() <= 1500);
            assert_eq!(lines[c.end_line - 1], c.content.lines().last().unwrap());
        }
    }
}

//! Markdown chunking for the vector index: split on `#`-prefixed header
//! lines, then further split any section that exceeds `MAX_CHUNK_SIZE`
//! bytes, suffixing continuation parts with `(part n)`.

use serde::{Deserialize, Serialize};

pub const MAX_CHUNK_SIZE: usize = 500;

/// One embeddable unit of a memory file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub file: String,
    pub section: String,
}

/// Split `content` (the body of `file_name`) into chunks by header, then by
/// size.
pub fn chunk_markdown(content: &str, file_name: &str) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_section = "Introduction".to_string();

    for line in content.lines() {
        if line.starts_with('#') {
            if !current.is_empty() {
                add_chunk(&mut chunks, &current.join("\n"), &current_section, file_name);
                current.clear();
            }
            current_section = line.trim_start_matches('#').trim().to_string();
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        add_chunk(&mut chunks, &current.join("\n"), &current_section, file_name);
    }

    chunks
}

fn add_chunk(chunks: &mut Vec<Chunk>, text: &str, section: &str, file_name: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }

    if text.len() <= MAX_CHUNK_SIZE {
        chunks.push(Chunk {
            content: text.to_string(),
            file: file_name.to_string(),
            section: section.to_string(),
        });
        return;
    }

    let mut sub_chunk: Vec<&str> = Vec::new();
    let mut sub_len = 0usize;
    let mut part_num = 1usize;

    for line in text.lines() {
        let line_len = line.len() + 1;
        if sub_len + line_len > MAX_CHUNK_SIZE && !sub_chunk.is_empty() {
            chunks.push(Chunk {
                content: sub_chunk.join("\n").trim().to_string(),
                file: file_name.to_string(),
                section: format!("{section} (part {part_num})"),
            });
            sub_chunk.clear();
            sub_len = 0;
            part_num += 1;
        }
        sub_chunk.push(line);
        sub_len += line_len;
    }

    if !sub_chunk.is_empty() {
        let section_label = if part_num > 1 {
            format!("{section} (part {part_num})")
        } else {
            section.to_string()
        };
        chunks.push(Chunk {
            content: sub_chunk.join("\n").trim().to_string(),
            file: file_name.to_string(),
            section: section_label,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_headers() {
        let md = "# Goals\n- buy a house\n\n## Sub\n- save money\n";
        let chunks = chunk_markdown(md, "Goals.md");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].section, "Goals");
        assert_eq!(chunks[1].section, "Sub");
    }

    #[test]
    fn empty_sections_are_dropped() {
        let md = "# Empty\n\n# Also Empty\n   \n# Real\n- content here\n";
        let chunks = chunk_markdown(md, "Behavior.md");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section, "Real");
    }

    #[test]
    fn oversized_section_splits_into_parts() {
        let line = "- this is a fairly long observation line that repeats\n";
        let body: String = line.repeat(30);
        let md = format!("# Observed Behaviors\n{body}");
        let chunks = chunk_markdown(&md, "Behavior.md");
        assert!(chunks.len() > 1);
        assert!(chunks[0].section.starts_with("Observed Behaviors (part"));
        for c in &chunks {
            assert!(c.content.len() <= MAX_CHUNK_SIZE + line.len());
        }
    }

    #[test]
    fn introduction_section_before_first_header() {
        let md = "some preamble text\n# Goals\n- a goal\n";
        let chunks = chunk_markdown(md, "Goals.md");
        assert_eq!(chunks[0].section, "Introduction");
    }
}

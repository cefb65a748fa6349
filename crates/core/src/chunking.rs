use crate::config::ChunkingConfig;
use crate::models::Chunk;

pub fn chunk_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let mut windows = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + config.chunk_size()).min(chars.len());
        let piece: String = chars[start..end].iter().collect();
        windows.push(piece.trim().to_string());
        start += config.stride();
    }

    windows
}

pub fn build_page_chunks(
    document_id: &str,
    filename: &str,
    page_number: u32,
    page_text: &str,
    config: ChunkingConfig,
) -> Vec<Chunk> {
    chunk_text(page_text, config)
        .into_iter()
        .enumerate()
        .map(|(chunk_index, content)| Chunk {
            id: Chunk::make_id(document_id, page_number, chunk_index),
            document_id: document_id.to_string(),
            filename: filename.to_string(),
            page_number,
            chunk_index,
            content,
        })
        .collect()
}

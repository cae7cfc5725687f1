//! Table formatting for search results and index summaries.

use comfy_table::{
    Attribute, Cell, CellAlignment, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_FULL,
};

use crate::ann::AnnStatus;
use crate::search::{ResultType, SearchResult};
use crate::store::IndexMetadata;

/// Characters of content shown per result row.
const PREVIEW_CHARS: usize = 80;

fn styled_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn header(cells: &[&str]) -> Vec<Cell> {
    cells
        .iter()
        .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
        .collect()
}

/// One row per result: rank, score, location and a content preview.
pub fn create_results_table(results: &[SearchResult]) -> String {
    let mut table = styled_table();
    table.set_header(header(&["#", "Score", "Index", "Location", "Preview"]));

    for (rank, result) in results.iter().enumerate() {
        let location = match result.result_type {
            ResultType::Text => format!(
                "{}#{}",
                result.file_path,
                result.position.unwrap_or_default()
            ),
            ResultType::Vision => format!(
                "{} p.{}",
                result.file_path,
                result.page_number.unwrap_or_default()
            ),
        };
        let mut preview: String = result
            .content
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if let Some((end, _)) = preview.char_indices().nth(PREVIEW_CHARS) {
            preview.truncate(end);
            preview.push('…');
        }
        if let Some(section) = &result.section_context {
            preview = format!("[{section}] {preview}");
        }

        table.add_row(vec![
            Cell::new(rank + 1).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.4}", result.score)).set_alignment(CellAlignment::Right),
            Cell::new(&result.index_name),
            Cell::new(location),
            Cell::new(preview),
        ]);
    }

    table.to_string()
}

/// Counts, dimensions and ANN state of one index.
pub fn create_info_table(metadata: &IndexMetadata, ann: Option<&AnnStatus>) -> String {
    let dimension = |d: Option<usize>| d.map_or_else(|| "-".to_string(), |d| d.to_string());
    let model = |m: &Option<String>| m.clone().unwrap_or_else(|| "-".to_string());

    let mut table = styled_table();
    table.set_header(header(&["Property", "Value"]));
    table.add_row(vec!["Name".to_string(), metadata.name.clone()]);
    table.add_row(vec!["Chunks".to_string(), metadata.chunk_count.to_string()]);
    table.add_row(vec!["Pages".to_string(), metadata.page_count.to_string()]);
    table.add_row(vec![
        "Text dimension".to_string(),
        dimension(metadata.text_dimension),
    ]);
    table.add_row(vec![
        "Page dimension".to_string(),
        dimension(metadata.page_dimension),
    ]);
    table.add_row(vec!["Text model".to_string(), model(&metadata.text_model)]);
    table.add_row(vec!["Vision model".to_string(), model(&metadata.vision_model)]);

    match ann {
        Some(status) => {
            table.add_row(vec![
                "ANN clusters".to_string(),
                status.num_clusters.to_string(),
            ]);
            table.add_row(vec![
                "ANN chunks".to_string(),
                status.num_chunks.to_string(),
            ]);
            table.add_row(vec![
                "Cluster sizes".to_string(),
                format!("{}..{}", status.smallest_cluster, status.largest_cluster),
            ]);
        }
        None => {
            table.add_row(vec!["ANN index".to_string(), "not built".to_string()]);
        }
    }

    table.to_string()
}

pub mod grid;
pub mod infobox;
pub mod labels;
pub mod markup;

use grid::GridTags;

/// Heuristic used to turn a page into open (label-set-per-document) rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStrategy {
    /// Rows and cells of the last table on the page.
    Grid,
    /// `Label:` lines paired with the following line.
    Labels,
}

/// Body → delimiter-joined lines. Structure missing from the body gives an
/// empty list, never an error.
pub fn extract_rows(body: &str, strategy: RowStrategy, tags: &GridTags, delimiter: &str) -> Vec<String> {
    match strategy {
        RowStrategy::Grid => grid::parse_grid(body, tags, delimiter),
        RowStrategy::Labels => labels::render_pairs(&labels::parse_labels(body), delimiter),
    }
}

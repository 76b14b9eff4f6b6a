use super::markup::{find_close, find_open, strip_anchors, strip_tags};

/// Tag names that make up a grid: container > row > cell.
#[derive(Debug, Clone)]
pub struct GridTags {
    pub container: String,
    pub row: String,
    pub cell: String,
}

impl Default for GridTags {
    fn default() -> Self {
        Self {
            container: "table".to_string(),
            row: "tr".to_string(),
            cell: "td".to_string(),
        }
    }
}

/// Inner markup of the last `container` element in `html`.
///
/// The close is the last `</container` in the document and the open is the
/// latest `<container` before it, so with repeated containers this is the
/// final one on the page. Returns None if either tag is missing.
pub fn last_container<'a>(html: &'a str, container: &str) -> Option<&'a str> {
    let lower = html.to_ascii_lowercase();
    let name = container.to_ascii_lowercase();

    let close = lower.rfind(&format!("</{}", name))?;
    let mut open = None;
    let mut at = 0;
    while let Some(pos) = find_open(&lower, &name, at) {
        if pos >= close {
            break;
        }
        open = Some(pos);
        at = pos + 1;
    }
    let open_end = open? + lower[open?..].find('>')? + 1;
    if open_end > close {
        return None;
    }
    Some(&html[open_end..close])
}

/// Extract the rows of the last table-like container as delimiter-joined lines.
///
/// Rows with no non-empty cell are skipped; so are empty cells within a row.
/// A body without the container yields no lines.
pub fn parse_grid(html: &str, tags: &GridTags, delimiter: &str) -> Vec<String> {
    let Some(region) = last_container(html, &tags.container) else {
        return Vec::new();
    };
    let region = clean_region(region);
    let lower = region.to_ascii_lowercase();
    let row_tag = tags.row.to_ascii_lowercase();
    let cell_tag = tags.cell.to_ascii_lowercase();

    let mut lines = Vec::new();
    let mut at = 0;
    while let Some(row_start) = find_open(&lower, &row_tag, at) {
        let row_end = find_close(&lower, &row_tag, row_start).unwrap_or(region.len());

        let mut cells: Vec<String> = Vec::new();
        let mut cell_at = row_start;
        while let Some(cell_start) = find_open(&lower, &cell_tag, cell_at) {
            if cell_start >= row_end {
                break;
            }
            let Some(content_start) = lower[cell_start..].find('>').map(|p| cell_start + p + 1)
            else {
                break;
            };
            let content_end = find_close(&lower, &cell_tag, content_start)
                .unwrap_or(row_end)
                .min(row_end)
                .max(content_start);

            let text = strip_tags(&region[content_start..content_end]);
            let text = text.trim();
            if !text.is_empty() {
                cells.push(text.to_string());
            }
            cell_at = content_end;
        }

        if !cells.is_empty() {
            lines.push(cells.join(delimiter));
        }
        at = row_end.max(row_start + 1);
    }

    lines
}

/// Drop layout whitespace, paragraph filler, non-breaking spaces and anchors.
fn clean_region(region: &str) -> String {
    let flat: String = region
        .chars()
        .filter(|c| !matches!(c, '\r' | '\n' | '\t'))
        .collect();
    let flat = flat
        .replace("<P>", "")
        .replace("<p>", "")
        .replace("</P>", "")
        .replace("</p>", "")
        .replace("&nbsp;", "");
    // Entities stay encoded until strip_tags runs on each cell
    strip_anchors(&flat)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
<table class="nav"><tr><td>Home</td><td>Search</td></tr></table>
<TABLE width="90%">
  <tr><td>APD ID:</td><td>AP00001</td></tr>
  <tr>
    <td><p>Name:</p></td>
    <td><a href="http://example.org/x?y=1">Microcin B17</a></td>
  </tr>
  <tr><td>&nbsp;</td><td>   </td></tr>
  <tr><td>Source:</td><td></td><td>Escherichia&nbsp;coli</td></tr>
</TABLE>
</body></html>"#;

    #[test]
    fn extracts_last_table_only() {
        let lines = parse_grid(PAGE, &GridTags::default(), "\t");
        assert_eq!(
            lines,
            vec![
                "APD ID:\tAP00001",
                "Name:\tMicrocin B17",
                "Source:\tEscherichiacoli",
            ]
        );
    }

    #[test]
    fn last_container_picks_final_instance() {
        let html = "<table><tr><td>a</td></tr></table><table id=2><tr><td>b</td></tr></table>";
        assert_eq!(last_container(html, "table"), Some("<tr><td>b</td></tr>"));
    }

    #[test]
    fn missing_container_yields_nothing() {
        assert!(parse_grid("<div>no table</div>", &GridTags::default(), "\t").is_empty());
        assert!(parse_grid("</table>", &GridTags::default(), "\t").is_empty());
        assert!(parse_grid("", &GridTags::default(), "\t").is_empty());
    }

    #[test]
    fn escaped_brackets_survive_as_text() {
        let html = "<table><tr><td>MIC:</td><td>a &lt; 5, b &gt; 2</td></tr>\
                    <tr><td>Note:</td><td>&lt;td&gt;x</td></tr></table>";
        assert_eq!(
            parse_grid(html, &GridTags::default(), "\t"),
            vec!["MIC:\ta < 5, b > 2", "Note:\t<td>x"]
        );
    }

    #[test]
    fn cells_do_not_leak_across_rows() {
        let html = "<table><tr><td>a</td></tr><tr></tr><tr><td>b</td><td>c</td></tr></table>";
        assert_eq!(parse_grid(html, &GridTags::default(), ","), vec!["a", "b,c"]);
    }

    #[test]
    fn unclosed_cells_bounded_by_row() {
        let html = "<table><tr><td>a<td>b</tr><tr><td>c</td></tr></table>";
        assert_eq!(parse_grid(html, &GridTags::default(), ","), vec!["ab", "c"]);
    }

    #[test]
    fn custom_tags() {
        let tags = GridTags {
            container: "dl".into(),
            row: "div".into(),
            cell: "dd".into(),
        };
        let html = "<dl><div><dd>k</dd><dd>v</dd></div></dl>";
        assert_eq!(parse_grid(html, &tags, "|"), vec!["k|v"]);
    }
}

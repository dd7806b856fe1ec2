use crate::panels::{Marker, TableView};

/// Fixed-width rendering of the reports table for a terminal.
pub fn render_table(table: &TableView) -> String {
    let mut widths: Vec<usize> = table.columns.iter().map(|c| c.chars().count()).collect();
    for row in &table.rows {
        for (i, cell) in row.cells().iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut out = String::new();
    out.push_str(table.heading);
    out.push('\n');
    push_line(&mut out, &table.columns, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let rule: Vec<&str> = rule.iter().map(String::as_str).collect();
    push_line(&mut out, &rule, &widths);
    for row in &table.rows {
        push_line(&mut out, &row.cells(), &widths);
    }
    if table.rows.is_empty() {
        out.push_str("(no reports)\n");
    }
    out
}

fn push_line(out: &mut String, cells: &[&str], widths: &[usize]) {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
        .collect();
    out.push_str(padded.join("  ").trim_end());
    out.push('\n');
}

/// One line per marker: coordinates followed by the popup text.
pub fn render_markers(markers: &[Marker]) -> String {
    let mut out = String::new();
    for marker in markers {
        out.push_str(&format!(
            "[{}] ({:.4}, {:.4}) {}\n",
            marker.id,
            marker.latitude,
            marker.longitude,
            marker.popup.lines().join(" | ")
        ));
    }
    out
}

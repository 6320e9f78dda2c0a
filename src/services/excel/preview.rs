use crate::models::{Table, Value};

/// First `n` rows as pipe-separated lines, header included.
pub fn preview(table: &Table, n: usize) -> String {
    let mut out = table.columns().join(" | ");
    for row in table.rows().iter().take(n) {
        out.push('\n');
        let cells: Vec<String> = row.iter().map(Value::to_string).collect();
        out.push_str(&cells.join(" | "));
    }
    out
}

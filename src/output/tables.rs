use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use crate::report::RunState;

/// Rounded table with a cyan header row.
pub fn table_with_header(labels: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            labels
                .iter()
                .map(|label| Cell::new(*label).fg(TableColor::Cyan)),
        );
    table
}

pub fn state_cell(state: RunState) -> Cell {
    let cell = Cell::new(state.to_string());
    match state {
        RunState::Completed => cell.fg(TableColor::Green),
        RunState::Failed => cell.fg(TableColor::Red),
        _ => cell.fg(TableColor::Yellow),
    }
}

use std::fmt::Write;

use taskboard_core::BoardSnapshot;

/// Plain-text rendering of a snapshot, one column per block.
pub fn render_board(snapshot: &BoardSnapshot) -> String {
    let mut out = String::new();
    for column in snapshot.columns() {
        let _ = writeln!(out, "{} [col-{}] ({})", column.name, column.id, column.tasks.len());
        for task in &column.tasks {
            let _ = writeln!(
                out,
                "  #{:<5} {:>12}  {} ({:?})",
                task.id, task.position, task.title, task.priority
            );
        }
    }
    out
}

use std::path::Path;

use crate::commands::common::{
    conflict_log, conflict_to_item, format_conflict_lines, open_database, ConflictItem,
};
use crate::error::CliError;

pub fn run_conflicts(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let records = conflict_log(open_database(db_path)?).list(limit)?;

    if as_json {
        let json_items = records
            .iter()
            .map(conflict_to_item)
            .collect::<Vec<ConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No conflicts recorded.");
        return Ok(());
    }

    for line in format_conflict_lines(&records) {
        println!("{line}");
    }
    Ok(())
}

pub fn run_conflicts_clear(db_path: &Path) -> Result<(), CliError> {
    let removed = conflict_log(open_database(db_path)?).clear()?;
    println!("Removed {removed} conflict log entr{}", if removed == 1 { "y" } else { "ies" });
    Ok(())
}

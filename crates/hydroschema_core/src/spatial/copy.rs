//! Row copy between two databases driven by the table descriptor.

use crate::db::DbResult;
use crate::model::tables::TableDescriptor;
use log::info;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

/// Copies every row of `table` from `source` into `destination`.
///
/// Only descriptor columns are copied; geometry blobs are copied verbatim.
/// Returns the number of rows inserted.
pub fn copy_table(
    source: &Connection,
    destination: &Connection,
    table: &TableDescriptor,
) -> DbResult<usize> {
    let columns = table.column_names().collect::<Vec<_>>().join(", ");
    let placeholders = (1..=table.columns.len())
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut select = source.prepare(&format!("SELECT {columns} FROM {}", table.name))?;
    let mut insert = destination.prepare(&format!(
        "INSERT INTO {} ({columns}) VALUES ({placeholders})",
        table.name
    ))?;

    let width = table.columns.len();
    let mut rows = select.query([])?;
    let mut copied = 0;
    while let Some(row) = rows.next()? {
        let values = (0..width)
            .map(|index| row.get::<_, Value>(index))
            .collect::<Result<Vec<_>, _>>()?;
        insert.execute(params_from_iter(values))?;
        copied += 1;
    }
    Ok(copied)
}

/// Copies all `models` inside one destination transaction.
pub fn copy_models(
    source: &Connection,
    destination: &mut Connection,
    models: &[TableDescriptor],
) -> DbResult<usize> {
    let tx = destination.transaction()?;
    let mut total = 0;
    for table in models {
        total += copy_table(source, &tx, table)?;
    }
    tx.commit()?;
    info!(
        "event=copy_models module=spatial status=ok tables={} rows={}",
        models.len(),
        total
    );
    Ok(total)
}

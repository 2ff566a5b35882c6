//! Derived view catalogue and its registration in `views_geometry_columns`.

use crate::db::DbResult;
use log::info;
use rusqlite::{params, Connection};

/// One spatial view and the geometry column it exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewDefinition {
    pub name: &'static str,
    /// `SELECT` statement the view is created from.
    pub definition: &'static str,
    pub view_geometry: &'static str,
    pub view_rowid: &'static str,
    pub f_table_name: &'static str,
    pub f_geometry_column: &'static str,
}

pub const ALL_VIEWS: &[ViewDefinition] = &[
    ViewDefinition {
        name: "v2_manhole_view",
        definition: "SELECT manh.rowid AS rowid, manh.id AS manh_id, \
            manh.display_name AS manh_display_name, manh.code AS manh_code, \
            manh.connection_node_id AS manh_connection_node_id, \
            manh.bottom_level AS manh_bottom_level, manh.surface_level AS manh_surface_level, \
            node.id AS node_id, node.storage_area AS node_storage_area, \
            node.initial_waterlevel AS node_initial_waterlevel, node.code AS node_code, \
            node.the_geom AS the_geom \
            FROM v2_manhole AS manh, v2_connection_nodes AS node \
            WHERE manh.connection_node_id = node.id",
        view_geometry: "the_geom",
        view_rowid: "rowid",
        f_table_name: "v2_connection_nodes",
        f_geometry_column: "the_geom",
    },
    ViewDefinition {
        name: "v2_cross_section_location_view",
        definition: "SELECT loc.rowid AS rowid, loc.id AS loc_id, loc.code AS loc_code, \
            loc.reference_level AS loc_reference_level, loc.bank_level AS loc_bank_level, \
            loc.friction_type AS loc_friction_type, loc.friction_value AS loc_friction_value, \
            loc.channel_id AS loc_channel_id, loc.the_geom AS the_geom, \
            chan.code AS chan_code, chan.calculation_type AS chan_calculation_type \
            FROM v2_cross_section_location AS loc \
            LEFT JOIN v2_channel AS chan ON loc.channel_id = chan.id",
        view_geometry: "the_geom",
        view_rowid: "rowid",
        f_table_name: "v2_cross_section_location",
        f_geometry_column: "the_geom",
    },
];

/// Views from older schema revisions that must not survive a recreate.
pub const VIEWS_TO_DELETE: &[&str] = &[
    "v2_crosssection_view",
    "v2_pipe_map_view",
    "v2_imp_surface_view",
];

/// Drops and recreates `views`, then removes `views_to_delete`, in one
/// transaction.
///
/// File version 3 registers views without the `read_only` column.
pub fn recreate_views(
    conn: &mut Connection,
    file_version: u32,
    views: &[ViewDefinition],
    views_to_delete: &[&str],
) -> DbResult<()> {
    let tx = conn.transaction()?;
    for view in views {
        drop_view(&tx, view.name)?;
        tx.execute_batch(&format!("CREATE VIEW {} AS {}", view.name, view.definition))?;
        if file_version == 3 {
            tx.execute(
                "INSERT INTO views_geometry_columns
                    (view_name, view_geometry, view_rowid, f_table_name, f_geometry_column)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    view.name,
                    view.view_geometry,
                    view.view_rowid,
                    view.f_table_name,
                    view.f_geometry_column
                ],
            )?;
        } else {
            tx.execute(
                "INSERT INTO views_geometry_columns
                    (view_name, view_geometry, view_rowid, f_table_name, f_geometry_column, read_only)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                params![
                    view.name,
                    view.view_geometry,
                    view.view_rowid,
                    view.f_table_name,
                    view.f_geometry_column
                ],
            )?;
        }
    }
    for name in views_to_delete {
        drop_view(&tx, name)?;
    }
    tx.commit()?;

    info!(
        "event=views_recreate module=spatial status=ok file_version={} created={} deleted={}",
        file_version,
        views.len(),
        views_to_delete.len()
    );
    Ok(())
}

fn drop_view(conn: &Connection, name: &str) -> DbResult<()> {
    conn.execute_batch(&format!("DROP VIEW IF EXISTS {name}"))?;
    conn.execute(
        "DELETE FROM views_geometry_columns WHERE view_name = ?1",
        [name],
    )?;
    Ok(())
}

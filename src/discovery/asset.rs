use crate::{
    bind_collector::{arg, nullable},
    connection::Connection,
    error::Result,
    tracing_support::LOG_TARGET,
};

/// Rewrite the tag, parent, status and priority of an asset element
///
/// A `parent_id` of 0 clears the parent. Returns the number of rows
/// changed, so 0 means no element has `element_id`.
pub fn update_asset_element(
    conn: &Connection,
    element_id: u32,
    asset_tag: Option<&str>,
    parent_id: u32,
    status: &str,
    priority: u16,
) -> Result<usize> {
    let updated = conn.execute(
        "UPDATE t_bios_asset_element \
         SET asset_tag = :asset_tag, id_parent = :id_parent, status = :status, priority = :priority \
         WHERE id_asset_element = :id",
        (
            arg("asset_tag", asset_tag),
            nullable(parent_id != 0, "id_parent", parent_id),
            arg("status", status),
            arg("priority", priority),
            arg("id", element_id),
        ),
    )?;
    tracing::debug!(target: LOG_TARGET, element_id, updated, "asset element updated");
    Ok(updated)
}

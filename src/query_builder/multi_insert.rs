//! VALUES fragment for multi-row inserts

use crate::bind_collector::indexed_name;

/// Render the VALUES tuples for a `count`-row insert over `columns`
///
/// Row `i` uses the placeholders `:<column>_i`. Returns an empty string for
/// zero rows.
///
/// ```
/// use fty_common_db::multi_insert;
///
/// assert_eq!(multi_insert(&["k", "v"], 2), "(:k_0, :v_0), (:k_1, :v_1)");
/// ```
pub fn multi_insert(columns: &[&str], count: usize) -> String {
    let mut sql = String::new();
    for row in 0..count {
        if row > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push(':');
            sql.push_str(&indexed_name(column, row));
        }
        sql.push(')');
    }
    sql
}

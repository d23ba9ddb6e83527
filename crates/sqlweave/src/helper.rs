//! Helper utilities for naming and text assembly
//!
//! - Fresh-name generation
//! - Deterministic constraint and index names
//! - Hex text

use std::collections::HashSet;

/// Returns `base` if unused, otherwise the first free `base_2`, `base_3`, ...
///
/// # Example
///
/// ```
/// use sqlweave::helper::find_new_name;
/// use std::collections::HashSet;
///
/// let taken = HashSet::from(["col".to_string(), "col_2".to_string()]);
/// assert_eq!(find_new_name(&taken, "col"), "col_3");
/// assert_eq!(find_new_name(&taken, "other"), "other");
/// ```
pub fn find_new_name(taken: &HashSet<String>, base: &str) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }

    let mut i = 2;
    loop {
        let new_name = format!("{}_{}", base, i);
        if !taken.contains(&new_name) {
            return new_name;
        }
        i += 1;
    }
}

/// Creates a name generator that produces `prefix0`, `prefix1`, ...
///
/// # Example
///
/// ```
/// use sqlweave::helper::name_sequence;
///
/// let mut gen = name_sequence("t");
/// assert_eq!(gen(), "t0");
/// assert_eq!(gen(), "t1");
/// ```
pub fn name_sequence(prefix: &str) -> impl FnMut() -> String {
    let prefix = prefix.to_string();
    let mut counter = 0usize;
    move || {
        let name = format!("{}{}", prefix, counter);
        counter += 1;
        name
    }
}

/// Constraint name `{prefix}_{schema}_{table}_{parts...}`.
///
/// The schema segment is left out when the (mapped) schema is empty, so the
/// same table renders the same name on every run.
///
/// # Example
///
/// ```
/// use sqlweave::helper::constraint_name;
///
/// assert_eq!(constraint_name("PK", Some("dbo"), "Users", &[]), "PK_dbo_Users");
/// assert_eq!(constraint_name("UX", None, "Users", &["Email"]), "UX_Users_Email");
/// ```
pub fn constraint_name(prefix: &str, schema: Option<&str>, table: &str, parts: &[&str]) -> String {
    let mut segments = vec![prefix];
    if let Some(schema) = schema.filter(|s| !s.is_empty()) {
        segments.push(schema);
    }
    segments.push(table);
    segments.extend(parts.iter().copied());
    segments.join("_")
}

/// Lowercase hex text of a byte string
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

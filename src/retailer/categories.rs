//! Built-in Home Depot building-materials category ids

use super::Retailer;

/// Category name and BigBox category id pairs
pub const HOME_DEPOT_CATEGORIES: &[(&str, &str)] = &[
    ("Building Materials", "N-5yc1vZaqns"),
    ("Lumber & Composites", "N-5yc1vZbqmz"),
    ("Concrete, Cement & Masonry", "N-5yc1vZaq7q"),
    ("Decking", "N-5yc1vZbqpg"),
    ("Fencing", "N-5yc1vZbqly"),
    ("Moulding & Millwork", "N-5yc1vZbqmk"),
    ("Insulation", "N-5yc1vZasbs"),
    ("Drywall", "N-5yc1vZarxx"),
    ("Roofing", "N-5yc1vZasbm"),
    ("Gutter Systems", "N-5yc1vZar4d"),
    ("Plywood", "N-5yc1vZbqm7"),
    ("Boards, Planks & Panels", "N-5yc1vZbt1a"),
    ("Siding", "N-5yc1vZaq25"),
    ("Ladders", "N-5yc1vZaquu"),
    ("Dimensional Lumber", "N-5yc1vZbqm8"),
    ("Building Hardware", "N-5yc1vZc2ek"),
    ("Ventilation", "N-5yc1vZc4k0"),
    ("Ceilings", "N-5yc1vZaq4z"),
    ("Tools", "N-5yc1vZc1xy"),
];

/// Resolves a category by name (case-insensitive) or by id
///
/// Unknown values are returned unchanged so callers can pass raw ids the
/// table does not list.
pub fn find_category(name_or_id: &str) -> &str {
    let needle = name_or_id.trim();
    HOME_DEPOT_CATEGORIES
        .iter()
        .find(|(name, id)| name.eq_ignore_ascii_case(needle) || *id == needle)
        .map(|(_, id)| *id)
        .unwrap_or(needle)
}

/// Resolves a category for `retailer`
///
/// Only Home Depot has a name table; Lowe's values pass through trimmed.
pub fn resolve_category(retailer: Retailer, name_or_id: &str) -> &str {
    match retailer {
        Retailer::HomeDepot => find_category(name_or_id),
        Retailer::Lowes => name_or_id.trim(),
    }
}

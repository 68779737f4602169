//! Cross-cube dependency markers (spec.md §3 `RuleMarker`, §4.7 marker
//! engine C7). This module holds the marker data type and the pure
//! construction logic; registration with the owning cubes happens through
//! the `Cube::add_from_marker`/`add_to_marker` trait methods (spec.md §6).

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::ast::area::Area;
use crate::ast::{Node, NodeType};
use crate::cube::Cube;
use crate::error::MarkerError;
use crate::ids::{IdentifierType, NO_IDENTIFIER, NO_MAPPING};

static NEXT_MARKER_ID: AtomicU64 = AtomicU64::new(1);

fn next_marker_id() -> u64 {
    NEXT_MARKER_ID.fetch_add(1, Ordering::Relaxed)
}

/// A precomputed cross-cube dependency (spec.md §3 `RuleMarker`).
///
/// Given a `fromCube` base coordinate, `permutations[d]` either equals
/// `NO_IDENTIFIER` (then `fixed[d]` gives the literal destination
/// coordinate) or names the source-dimension index whose value (possibly
/// translated through `mapping[d]`) becomes the destination coordinate in
/// dimension `d`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleMarker {
    pub id: u64,
    pub from_cube: String,
    pub to_cube: String,
    pub from_base: Vec<HashSet<IdentifierType>>,
    pub permutations: Vec<IdentifierType>,
    pub fixed: Vec<IdentifierType>,
    pub use_mapping: bool,
    pub mapping: Vec<Vec<IdentifierType>>,
}

impl RuleMarker {
    /// Same-cube marker, from `[[source-area]]` to the rule's destination
    /// area (spec.md §4.7 "Same-cube marker"). `[[ ]]` does not allow for
    /// permutations: every unpinned destination dimension keeps the
    /// identity permutation.
    pub fn same_cube(cube: &dyn Cube, from_area: &Area, to_area: &Area) -> RuleMarker {
        let dims = cube.dimensions();
        let nd = dims.len();

        let mut permutations: Vec<IdentifierType> = (0..nd as IdentifierType).collect();
        let mut fixed = vec![0u32; nd];
        let mut from_base = Vec::with_capacity(nd);

        for (d, dim) in dims.iter().enumerate() {
            let set = &from_area.sets[d];
            if set.is_empty() {
                from_base.push(HashSet::new());
            } else {
                let elem_id = *set.iter().next().unwrap();
                let base = dim
                    .lookup_element(elem_id)
                    .map(|e| dim.get_base_elements(e.as_ref()))
                    .unwrap_or_default();
                from_base.push(base);
            }
        }

        for d in 0..nd {
            let set = &to_area.sets[d];
            if !set.is_empty() {
                fixed[d] = *set.iter().next().unwrap();
                permutations[d] = NO_IDENTIFIER;
            }
        }

        debug!(cube = cube.name(), "built same-cube marker");

        RuleMarker {
            id: next_marker_id(),
            from_cube: cube.name().to_string(),
            to_cube: cube.name().to_string(),
            from_base,
            permutations,
            fixed,
            use_mapping: false,
            mapping: Vec::new(),
        }
    }

    /// Cross-cube marker via `PALO.MARKER(db, cube, coord1, coord2, ...)`
    /// (spec.md §4.7 "Cross-cube marker"). `path` holds, per `to_cube`
    /// position, either a string-literal node (a `from_cube` element name)
    /// or a variable node (a dimension name shared between the two cubes).
    pub fn cross_cube(
        from_cube: &dyn Cube,
        to_cube: &dyn Cube,
        path: &[Node],
        to_area: &Area,
    ) -> Result<RuleMarker, MarkerError> {
        let from_dims = from_cube.dimensions();
        let to_dims = to_cube.dimensions();

        if path.len() != from_dims.len() {
            return Err(MarkerError::CoordinatesLengthMismatch {
                expected: from_dims.len(),
                got: path.len(),
            });
        }

        // Split into constants and variables, mirroring the per-position
        // parallel vectors the original marker constructor builds.
        let mut constants: Vec<Option<String>> = Vec::with_capacity(path.len());
        let mut variables: Vec<Option<String>> = Vec::with_capacity(path.len());

        for node in path {
            match node {
                Node::String(s) => {
                    constants.push(Some(s.clone()));
                    variables.push(None);
                }
                Node::Variable { name, .. } => {
                    constants.push(None);
                    variables.push(Some(name.clone()));
                }
                other => {
                    return Err(MarkerError::Internal(format!(
                        "unexpected node kind {:?} in PALO.MARKER path",
                        node.node_type()
                    )));
                }
            }
        }

        // A variable becomes constant when the destination area pins the
        // same dimension (spec.md §4.7).
        for (i, var) in variables.iter_mut().enumerate() {
            let Some(name) = var.clone() else { continue };

            let (pos, dim) = to_cube
                .dimension_position(&name)
                .ok_or_else(|| MarkerError::DimensionNotFound(name.clone()))?;

            let set = &to_area.sets[pos];
            if !set.is_empty() {
                let elem_id = *set.iter().next().unwrap();
                if let Some(element) = dim.lookup_element(elem_id) {
                    trace!(
                        variable = %name,
                        element = %element.name(),
                        "variable in rule is constant because of destination pin"
                    );
                    constants[i] = Some(element.name().to_string());
                    *var = None;
                }
            }
        }

        // Unfold each from_cube dimension's constant into base descendants.
        let mut from_base = Vec::with_capacity(from_dims.len());
        for (dim, constant) in from_dims.iter().zip(constants.iter()) {
            match constant {
                None => from_base.push(HashSet::new()),
                Some(name) => {
                    let elem = dim.lookup_element_by_name(name);
                    let base = elem
                        .map(|e| dim.get_base_elements(e.as_ref()))
                        .unwrap_or_default();
                    from_base.push(base);
                }
            }
        }

        // Map variable names back to their from_cube dimension index.
        let var_dim_index: Vec<Option<usize>> = variables
            .iter()
            .map(|v| {
                v.as_ref().and_then(|name| {
                    from_dims.iter().position(|d| d.name() == name)
                })
            })
            .collect();

        let nd = to_dims.len();
        let mut permutations = vec![0u32; nd];
        let mut fixed = vec![0u32; nd];
        // dim_pairs[td] = Some((from_dim_index, to_dim)) for permuted
        // positions, None for fixed positions.
        let mut dim_pairs: Vec<Option<(usize, Arc<dyn crate::cube::Dimension>)>> =
            Vec::with_capacity(nd);

        for (td, to_dim) in to_dims.iter().enumerate() {
            let set = &to_area.sets[td];
            if !set.is_empty() {
                fixed[td] = *set.iter().next().unwrap();
                permutations[td] = NO_IDENTIFIER;
                dim_pairs.push(None);
                continue;
            }

            let matched = var_dim_index
                .iter()
                .enumerate()
                .find(|(_, idx)| {
                    idx.and_then(|i| from_dims.get(i))
                        .map(|d| d.name() == to_dim.name())
                        .unwrap_or(false)
                })
                .map(|(pos, idx)| (pos, idx.unwrap()));

            match matched {
                None => {
                    return Err(MarkerError::DimensionNotFound(to_dim.name().to_string()));
                }
                Some((path_pos, from_dim_idx)) => {
                    permutations[td] = path_pos as IdentifierType;
                    dim_pairs.push(Some((from_dim_idx, to_dim.clone())));
                }
            }
        }

        // Mapping is built for every permuted (non-fixed) destination
        // dimension unconditionally, matching the original constructor: it
        // degenerates to the identity map when the two dimensions share the
        // same elements, so building it even when from/to are the same
        // object is harmless (spec.md §4.7, SPEC_FULL.md §B.3).
        let mut mapping: Vec<Vec<IdentifierType>> = vec![Vec::new(); nd];

        for (td, pair) in dim_pairs.iter().enumerate() {
            let Some((from_idx, to_dim)) = pair else {
                continue;
            };
            let from_dim = &from_dims[*from_idx];
            let max_id = from_dim.maximal_identifier();
            let mut mm = vec![NO_MAPPING; (max_id + 1) as usize];

            for element in from_dim.get_elements() {
                if let Some(to_elem) = to_dim.lookup_element_by_name(element.name()) {
                    trace!(
                        from = element.identifier(),
                        to = to_elem.identifier(),
                        name = element.name(),
                        "using cross-cube element name mapping"
                    );
                    mm[element.identifier() as usize] = to_elem.identifier();
                }
            }

            mapping[td] = mm;
        }

        debug!(
            from = from_cube.name(),
            to = to_cube.name(),
            "built cross-cube marker"
        );

        Ok(RuleMarker {
            id: next_marker_id(),
            from_cube: from_cube.name().to_string(),
            to_cube: to_cube.name().to_string(),
            from_base,
            permutations,
            fixed,
            use_mapping: true,
            mapping,
        })
    }
}

/// Build the marker(s) implied by a rule's internal/external marker nodes,
/// logging and dropping any individual failure rather than propagating it
/// (spec.md §4.7 "Failure modes", §7 "Local recovery": "a partially failing
/// rule still activates").
pub fn build_markers_for_node(
    node: &Node,
    from_cube: &dyn Cube,
    lookup_cube: impl Fn(&str, &str) -> Option<Arc<dyn Cube>>,
    to_area: &Area,
) -> Option<RuleMarker> {
    match node {
        Node::Source {
            area, is_marker, ..
        } if *is_marker => Some(RuleMarker::same_cube(from_cube, area, to_area)),
        Node::FunctionCall { name, params, .. } if name.eq_ignore_ascii_case("PALO.MARKER") => {
            if params.len() < 2 {
                warn!("PALO.MARKER needs at least (database, cube, ...coords)");
                return None;
            }
            let db = match &params[0] {
                Node::String(s) => s.clone(),
                _ => {
                    warn!("PALO.MARKER first parameter must be a database name constant");
                    return None;
                }
            };
            let cube_name = match &params[1] {
                Node::String(s) => s.clone(),
                _ => {
                    warn!("PALO.MARKER second parameter must be a cube name constant");
                    return None;
                }
            };
            let Some(target_cube) = lookup_cube(&db, &cube_name) else {
                warn!(database = %db, cube = %cube_name, "PALO.MARKER target cube not found, dropping marker");
                return None;
            };
            let path = &params[2..];
            match RuleMarker::cross_cube(target_cube.as_ref(), from_cube, path, to_area) {
                Ok(marker) => Some(marker),
                Err(err) => {
                    warn!(error = %err, "dropping marker that failed to construct");
                    None
                }
            }
        }
        _ => None,
    }
}

/// Register a marker with both its source and destination cubes
/// (spec.md §4.7 "Registration").
pub fn register_marker(marker: Arc<RuleMarker>, from_cube: &dyn Cube, to_cube: &dyn Cube) {
    from_cube.add_from_marker(marker.clone());
    to_cube.add_to_marker(marker);
}

/// Unregister a marker from both cubes; must happen before the marker is
/// freed because both lists may be scanned concurrently (spec.md §4.8,
/// §5 "Memory").
pub fn unregister_marker(marker: &RuleMarker, from_cube: &dyn Cube, to_cube: &dyn Cube) {
    from_cube.remove_from_marker(marker.id);
    to_cube.remove_to_marker(marker.id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::area::AreaInput;
    use crate::cube::test_fixtures::sample_cube;

    #[test]
    fn same_cube_marker_fixes_destination_and_unfolds_source() {
        let cube = sample_cube();
        let from_area = Area::resolve(&cube, &AreaInput::names(vec![(None, Some("Units".into()))]))
            .unwrap();
        let to_area = Area::resolve(&cube, &AreaInput::names(vec![(None, Some("Revenue".into()))]))
            .unwrap();

        let marker = RuleMarker::same_cube(&cube, &from_area, &to_area);
        assert_eq!(marker.from_cube, "D");
        assert_eq!(marker.to_cube, "D");
        assert!(!marker.use_mapping);
        // Measure dimension (index 2) should be fixed in the destination.
        assert_eq!(marker.permutations[2], NO_IDENTIFIER);
    }
}

//! Area nodes (spec.md §3 `Area`, §4.2 Area nodes C2): N-dimensional
//! sub-regions described either by name or by id, resolved against a cube
//! into a canonical per-dimension id-set representation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::cube::Cube;
use crate::error::ValidationError;
use crate::ids::IdentifierType;

/// The textual/numeric description of an area before it is resolved against
/// a cube (spec.md §4.2 "by name" / "by id").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AreaInput {
    /// `(dimName?, elemName?)` per token. A missing `dimName` means the
    /// token is unqualified and resolved by the round-robin rule.
    Names(Vec<(Option<String>, Option<String>)>),
    /// `(dimId, elemId)` per token. `dimId < 0` encodes an unqualified form
    /// via `dimId' = -(dimId+1)`; `elemId < 0` means "no restriction".
    Ids(Vec<(i64, i64)>),
}

impl AreaInput {
    pub fn names(tokens: Vec<(Option<String>, Option<String>)>) -> Self {
        AreaInput::Names(tokens)
    }

    pub fn ids(tokens: Vec<(i64, i64)>) -> Self {
        AreaInput::Ids(tokens)
    }

    pub fn len(&self) -> usize {
        match self {
            AreaInput::Names(v) => v.len(),
            AreaInput::Ids(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A resolved N-dimensional sub-region (spec.md §3 `Area`, §4.2). Doubles as
/// the "canonical `nodeArea`" plus the parallel bookkeeping vectors the spec
/// calls for: `dimensionIDs`, `elementIDs`, `isRestricted`, `isQualified`,
/// `elementSequence`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Area {
    /// Per cube-dimension-position set of allowed element ids. Empty = no
    /// restriction on that dimension.
    pub sets: Vec<HashSet<IdentifierType>>,
    pub dimension_ids: Vec<IdentifierType>,
    pub element_ids: Vec<IdentifierType>,
    pub is_restricted: Vec<bool>,
    pub is_qualified: Vec<bool>,
    /// For each input token, the cube position it resolved to, or `-1`.
    pub element_sequence: Vec<i64>,
}

impl Area {
    /// Resolve an `AreaInput` against a cube's dimensions (spec.md §4.2).
    pub fn resolve(cube: &dyn Cube, input: &AreaInput) -> Result<Area, ValidationError> {
        match input {
            AreaInput::Names(tokens) => resolve_names(cube, tokens),
            AreaInput::Ids(tokens) => resolve_ids(cube, tokens),
        }
    }

    /// Best-effort area for parse-only mode (no cube available): one
    /// position per input token, nothing restricted, nothing qualified
    /// beyond what the token itself states (spec.md §4.3 "parse-only mode
    /// ... area descriptions then remain symbolic").
    pub fn symbolic(input: &AreaInput) -> Area {
        let n = input.len();
        let is_qualified = match input {
            AreaInput::Names(tokens) => tokens.iter().map(|(d, _)| d.is_some()).collect(),
            AreaInput::Ids(tokens) => tokens.iter().map(|(d, _)| *d >= 0).collect(),
        };
        Area {
            sets: vec![HashSet::new(); n],
            dimension_ids: vec![0; n],
            element_ids: vec![0; n],
            is_restricted: vec![false; n],
            is_qualified,
            element_sequence: (0..n as i64).collect(),
        }
    }

    pub fn dimension_count(&self) -> usize {
        self.sets.len()
    }

    pub fn is_fully_restricted(&self) -> bool {
        !self.is_restricted.is_empty() && self.is_restricted.iter().all(|r| *r)
    }

    pub fn unrestricted_dimensions(&self) -> Vec<usize> {
        self.is_restricted
            .iter()
            .enumerate()
            .filter(|(_, r)| !**r)
            .map(|(i, _)| i)
            .collect()
    }

    /// The single pinned coordinate tuple when every dimension is
    /// restricted, else `None` (spec.md §4.1 Source node "prebuilds a
    /// single fixedCellPath").
    pub fn fixed_coordinates(&self) -> Option<Vec<IdentifierType>> {
        if self.is_fully_restricted() {
            Some(self.element_ids.clone())
        } else {
            None
        }
    }

    /// `true` iff `coords[d] ∈ sets[d]` for every restricted dimension
    /// (empty set = unrestricted) — spec.md §6 `Cube.isInArea`.
    pub fn contains(&self, coords: &[IdentifierType]) -> bool {
        coords
            .iter()
            .zip(self.sets.iter())
            .all(|(c, s)| s.is_empty() || s.contains(c))
    }

    /// Build an area identical to `self` except dimension `d`'s set is
    /// replaced wholesale (spec.md §4.6 STET rewrite: "destination with
    /// dimension-D coord replaced by R").
    pub fn with_dimension_set(&self, d: usize, set: HashSet<IdentifierType>) -> Area {
        let mut out = self.clone();
        if d < out.sets.len() {
            out.is_restricted[d] = !set.is_empty();
            if let Some(&single) = set.iter().next() {
                if set.len() == 1 {
                    out.element_ids[d] = single;
                }
            }
            out.sets[d] = set;
        }
        out
    }
}

fn resolve_names(
    cube: &dyn Cube,
    tokens: &[(Option<String>, Option<String>)],
) -> Result<Area, ValidationError> {
    let dims = cube.dimensions();
    let n = dims.len();
    let dimension_ids: Vec<IdentifierType> = dims.iter().map(|d| d.identifier()).collect();
    let mut element_ids = vec![0u32; n];
    let mut is_restricted = vec![false; n];
    let mut is_qualified = vec![false; n];
    let mut element_sequence = vec![-1i64; tokens.len()];
    let mut claimed = vec![false; n];

    // Pass 1: dimension-qualified tokens claim their dimension outright.
    for (k, (dim_name, elem_name)) in tokens.iter().enumerate() {
        let Some(dn) = dim_name else { continue };
        let (pos, dim) = cube
            .dimension_position(dn)
            .ok_or_else(|| ValidationError::new(format!("dimension '{dn}' not found")))?;
        if claimed[pos] {
            return Err(ValidationError::new(format!(
                "dimension '{dn}' specified more than once in area"
            )));
        }
        claimed[pos] = true;
        is_qualified[pos] = true;
        element_sequence[k] = pos as i64;
        if let Some(en) = elem_name {
            let elem = dim.lookup_element_by_name(en).ok_or_else(|| {
                ValidationError::new(format!("element '{en}' not found in dimension '{dn}'"))
            })?;
            element_ids[pos] = elem.identifier();
            is_restricted[pos] = true;
        }
    }

    // Pass 2: unqualified tokens resolve by round-robin over the remaining
    // pool, starting at their own input position (spec.md §4.2).
    for (k, (dim_name, elem_name)) in tokens.iter().enumerate() {
        if dim_name.is_some() {
            continue;
        }
        let Some(en) = elem_name else { continue }; // empty placeholder, preserves indexing
        if n == 0 {
            return Err(ValidationError::new("cube has no dimensions"));
        }
        let mut found = None;
        for offset in 0..n {
            let pos = (k + offset) % n;
            if claimed[pos] {
                continue;
            }
            if let Some(elem) = dims[pos].lookup_element_by_name(en) {
                found = Some((pos, elem.identifier()));
                break;
            }
        }
        let (pos, elem_id) = found.ok_or_else(|| {
            ValidationError::new(format!("element '{en}' not found in any remaining dimension"))
        })?;
        claimed[pos] = true;
        element_ids[pos] = elem_id;
        is_restricted[pos] = true;
        element_sequence[k] = pos as i64;
    }

    let mut sets = vec![HashSet::new(); n];
    for d in 0..n {
        if is_restricted[d] {
            sets[d].insert(element_ids[d]);
        }
    }

    Ok(Area {
        sets,
        dimension_ids,
        element_ids,
        is_restricted,
        is_qualified,
        element_sequence,
    })
}

fn resolve_ids(cube: &dyn Cube, tokens: &[(i64, i64)]) -> Result<Area, ValidationError> {
    let dims = cube.dimensions();
    let n = dims.len();
    let dimension_ids: Vec<IdentifierType> = dims.iter().map(|d| d.identifier()).collect();
    let mut element_ids = vec![0u32; n];
    let mut is_restricted = vec![false; n];
    let mut is_qualified = vec![false; n];
    let mut element_sequence = vec![-1i64; tokens.len()];
    let mut claimed = vec![false; n];

    for (k, (dim_id, elem_id)) in tokens.iter().enumerate() {
        if *dim_id < 0 {
            continue;
        }
        let (pos, dim) = cube
            .dimension_position_by_id(*dim_id as IdentifierType)
            .ok_or_else(|| ValidationError::new(format!("dimension id {dim_id} not found")))?;
        if claimed[pos] {
            return Err(ValidationError::new(format!(
                "dimension id {dim_id} specified more than once in area"
            )));
        }
        claimed[pos] = true;
        is_qualified[pos] = true;
        element_sequence[k] = pos as i64;
        if *elem_id >= 0 {
            let elem = dim.lookup_element(*elem_id as IdentifierType).ok_or_else(|| {
                ValidationError::new(format!("element id {elem_id} not found in dimension id {dim_id}"))
            })?;
            element_ids[pos] = elem.identifier();
            is_restricted[pos] = true;
        }
    }

    for (k, (dim_id, elem_id)) in tokens.iter().enumerate() {
        if *dim_id >= 0 {
            continue;
        }
        if *elem_id < 0 {
            continue;
        }
        // Unqualified form: `dimId' = -(dimId+1)` decodes straight back to
        // the dimension identifier it was encoded from -- it names an
        // absolute dimension, not a round-robin starting position.
        // Round-robin (spec.md §4.2, §8's "positional-then-round-robin"
        // property) only ever applies to unqualified element *names*
        // (`resolve_names` above), never ids.
        let decoded = -(*dim_id + 1);
        let (pos, dim) = cube
            .dimension_position_by_id(decoded as IdentifierType)
            .ok_or_else(|| ValidationError::new(format!("dimension id {decoded} not found")))?;
        if claimed[pos] {
            return Err(ValidationError::new(format!(
                "dimension id {decoded} specified more than once in area"
            )));
        }
        let elem = dim.lookup_element(*elem_id as IdentifierType).ok_or_else(|| {
            ValidationError::new(format!("element id {elem_id} not found in dimension id {decoded}"))
        })?;
        claimed[pos] = true;
        element_ids[pos] = elem.identifier();
        is_restricted[pos] = true;
        element_sequence[k] = pos as i64;
    }

    let mut sets = vec![HashSet::new(); n];
    for d in 0..n {
        if is_restricted[d] {
            sets[d].insert(element_ids[d]);
        }
    }

    Ok(Area {
        sets,
        dimension_ids,
        element_ids,
        is_restricted,
        is_qualified,
        element_sequence,
    })
}

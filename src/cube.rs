//! The cube interface this engine consumes (spec.md §6, §1 "opaque
//! collaborator"). The cube storage engine, its dimension hierarchies, and
//! persistence are out of scope — this module only declares the seam and
//! ships an in-memory implementation (`MemoryCube`) used by tests and
//! doctests, the way the teacher engine separates `Cube`/`Dimension` trait
//! surfaces in `schema/catalog.rs` from their concrete storage-backed
//! implementations.

use std::collections::HashSet;
use std::sync::Arc;

use crate::history::RuleHistory;
use crate::ids::{CellPath, IdentifierType};
use crate::marker::RuleMarker;
use crate::value::{CellValue, ElementType};

/// A single element within a dimension (spec.md §3 `Element`).
pub trait Element: std::fmt::Debug + Send + Sync {
    fn identifier(&self) -> IdentifierType;
    fn name(&self) -> &str;
    fn element_type(&self) -> ElementType;
}

/// An ordered collection of elements supporting name/id lookup and
/// ancestor/descendant traversal (spec.md §3 `Dimension`).
pub trait Dimension: std::fmt::Debug + Send + Sync {
    fn identifier(&self) -> IdentifierType;
    fn name(&self) -> &str;

    /// Look up by id; returns `None` when absent. `find_element` and
    /// `lookup_element` are kept as distinct names per spec.md §6 even
    /// though this crate treats them identically — the cube storage engine
    /// historically distinguished "must exist" vs "may not exist" lookups,
    /// a distinction that belongs to the (out-of-scope) storage layer.
    fn lookup_element(&self, id: IdentifierType) -> Option<Arc<dyn Element>>;
    fn find_element(&self, id: IdentifierType) -> Option<Arc<dyn Element>> {
        self.lookup_element(id)
    }

    fn lookup_element_by_name(&self, name: &str) -> Option<Arc<dyn Element>>;
    fn find_element_by_name(&self, name: &str) -> Option<Arc<dyn Element>> {
        self.lookup_element_by_name(name)
    }

    /// All elements of the dimension, in dimension order.
    fn get_elements(&self) -> Vec<Arc<dyn Element>>;

    /// Base (leaf) descendants of `element`; for a base element this is
    /// `{element}` (spec.md §4.7 "unfolded to its base descendants").
    fn get_base_elements(&self, element: &dyn Element) -> HashSet<IdentifierType>;

    /// Ancestors of `element`, used for `containsArea` ancestor-closure
    /// (spec.md §4.6 "Token check").
    fn ancestors(&self, element: &dyn Element) -> HashSet<IdentifierType>;

    /// The largest identifier ever assigned in this dimension, used to size
    /// sparse maps such as cross-cube marker `mapping` arrays (spec.md §3).
    fn maximal_identifier(&self) -> IdentifierType;
}

/// An ordered list of dimensions exposing cell read access and a monotone
/// schema-version token (spec.md §3 `Cube`, §6).
pub trait Cube: std::fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Monotonically increasing; changes whenever schema or membership
    /// changes (spec.md §3, §5).
    fn token(&self) -> u64;

    fn dimensions(&self) -> Vec<Arc<dyn Dimension>>;

    /// Reads a cell. `found = false` means "not populated"; callers treat
    /// that as the zero of the target type, never as an error (spec.md §7
    /// `EvalMissingCell`).
    fn get_cell_value(
        &self,
        path: &CellPath,
        user: Option<&str>,
        history: &mut RuleHistory,
    ) -> (CellValue, bool);

    /// Positional containment: coordinate ∈ set, OR set empty (spec.md §6).
    fn is_in_area(&self, path: &CellPath, area: &[HashSet<IdentifierType>]) -> bool {
        path.coordinates()
            .iter()
            .zip(area.iter())
            .all(|(coord, set)| set.is_empty() || set.contains(coord))
    }

    fn add_from_marker(&self, marker: Arc<RuleMarker>);
    fn remove_from_marker(&self, marker_id: u64);
    fn add_to_marker(&self, marker: Arc<RuleMarker>);
    fn remove_to_marker(&self, marker_id: u64);

    fn from_markers(&self) -> Vec<Arc<RuleMarker>>;
    fn to_markers(&self) -> Vec<Arc<RuleMarker>>;

    /// Classify a coordinate tuple into a full `CellPath` (string/numeric,
    /// base/consolidated) by consulting each dimension's elements. Generic
    /// over any `Cube` impl, so it is a default method rather than something
    /// each storage backend must reimplement (spec.md §3 `CellPath`).
    fn classify_path(&self, coordinates: Vec<IdentifierType>) -> CellPath {
        let dims = self.dimensions();
        let any_string = dims.iter().zip(coordinates.iter()).any(|(d, &c)| {
            d.lookup_element(c)
                .map(|e| e.element_type() == ElementType::String)
                .unwrap_or(false)
        });
        let all_base = dims.iter().zip(coordinates.iter()).all(|(d, &c)| {
            d.lookup_element(c)
                .map(|e| e.element_type() != ElementType::Consolidated)
                .unwrap_or(false)
        });
        CellPath::new(coordinates, any_string, all_base)
    }
}

impl dyn Cube {
    /// Find a dimension's position and handle by name (used throughout
    /// area resolution and marker construction).
    pub fn dimension_position(&self, name: &str) -> Option<(usize, Arc<dyn Dimension>)> {
        self.dimensions()
            .into_iter()
            .enumerate()
            .find(|(_, d)| d.name() == name)
    }

    /// Find a dimension's position and handle by dimension id (spec.md §4.2
    /// "by id" area descriptions).
    pub fn dimension_position_by_id(&self, id: IdentifierType) -> Option<(usize, Arc<dyn Dimension>)> {
        self.dimensions()
            .into_iter()
            .enumerate()
            .find(|(_, d)| d.identifier() == id)
    }
}

// ---------------------------------------------------------------------
// In-memory reference implementation, used by tests and doctests.
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MemoryElement {
    pub identifier: IdentifierType,
    pub name: String,
    pub element_type: ElementType,
    /// Base (leaf) descendants including self if base.
    pub base_descendants: HashSet<IdentifierType>,
    pub ancestor_ids: HashSet<IdentifierType>,
}

impl Element for MemoryElement {
    fn identifier(&self) -> IdentifierType {
        self.identifier
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn element_type(&self) -> ElementType {
        self.element_type
    }
}

#[derive(Debug)]
pub struct MemoryDimension {
    pub identifier: IdentifierType,
    pub name: String,
    pub elements: Vec<Arc<MemoryElement>>,
}

impl MemoryDimension {
    pub fn new(identifier: IdentifierType, name: impl Into<String>) -> Self {
        MemoryDimension {
            identifier,
            name: name.into(),
            elements: Vec::new(),
        }
    }

    /// Add a base (numeric or string) element.
    pub fn with_base_element(mut self, id: IdentifierType, name: impl Into<String>, numeric: bool) -> Self {
        let mut base = HashSet::new();
        base.insert(id);
        self.elements.push(Arc::new(MemoryElement {
            identifier: id,
            name: name.into(),
            element_type: if numeric {
                ElementType::Numeric
            } else {
                ElementType::String
            },
            base_descendants: base,
            ancestor_ids: HashSet::new(),
        }));
        self
    }

    /// Add a consolidated element whose base descendants are `children`.
    pub fn with_consolidated_element(
        mut self,
        id: IdentifierType,
        name: impl Into<String>,
        children: &[IdentifierType],
    ) -> Self {
        let mut base = HashSet::new();
        for &child_id in children {
            if let Some(child) = self.elements.iter().find(|e| e.identifier == child_id) {
                base.extend(&child.base_descendants);
            }
        }
        self.elements.push(Arc::new(MemoryElement {
            identifier: id,
            name: name.into(),
            element_type: ElementType::Consolidated,
            base_descendants: base,
            ancestor_ids: HashSet::new(),
        }));
        // Register this consolidated element as an ancestor of each child.
        let parent_id = id;
        let children_set: HashSet<IdentifierType> = children.iter().copied().collect();
        self.elements = self
            .elements
            .iter()
            .map(|e| {
                if children_set.contains(&e.identifier) {
                    let mut updated = (**e).clone();
                    updated.ancestor_ids.insert(parent_id);
                    Arc::new(updated)
                } else {
                    e.clone()
                }
            })
            .collect();
        self
    }
}

impl Dimension for MemoryDimension {
    fn identifier(&self) -> IdentifierType {
        self.identifier
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn lookup_element(&self, id: IdentifierType) -> Option<Arc<dyn Element>> {
        self.elements
            .iter()
            .find(|e| e.identifier == id)
            .map(|e| e.clone() as Arc<dyn Element>)
    }
    fn lookup_element_by_name(&self, name: &str) -> Option<Arc<dyn Element>> {
        self.elements
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.clone() as Arc<dyn Element>)
    }
    fn get_elements(&self) -> Vec<Arc<dyn Element>> {
        self.elements
            .iter()
            .map(|e| e.clone() as Arc<dyn Element>)
            .collect()
    }
    fn get_base_elements(&self, element: &dyn Element) -> HashSet<IdentifierType> {
        self.elements
            .iter()
            .find(|e| e.identifier == element.identifier())
            .map(|e| e.base_descendants.clone())
            .unwrap_or_default()
    }
    fn ancestors(&self, element: &dyn Element) -> HashSet<IdentifierType> {
        self.elements
            .iter()
            .find(|e| e.identifier == element.identifier())
            .map(|e| e.ancestor_ids.clone())
            .unwrap_or_default()
    }
    fn maximal_identifier(&self) -> IdentifierType {
        self.elements.iter().map(|e| e.identifier).max().unwrap_or(0)
    }
}

/// A sparse in-memory cube: cells are stored only when populated, exactly
/// like the sparse storage model spec.md §3 alludes to (`maximalIdentifier`
/// "used for sparse maps").
#[derive(Debug)]
pub struct MemoryCube {
    name: String,
    dims: Vec<Arc<MemoryDimension>>,
    cells: parking_lot::RwLock<std::collections::HashMap<Vec<IdentifierType>, CellValue>>,
    token: std::sync::atomic::AtomicU64,
    from_markers: dashmap::DashMap<u64, Arc<RuleMarker>>,
    to_markers: dashmap::DashMap<u64, Arc<RuleMarker>>,
}

impl MemoryCube {
    pub fn new(name: impl Into<String>, dims: Vec<MemoryDimension>) -> Self {
        MemoryCube {
            name: name.into(),
            dims: dims.into_iter().map(Arc::new).collect(),
            cells: parking_lot::RwLock::new(std::collections::HashMap::new()),
            token: std::sync::atomic::AtomicU64::new(1),
            from_markers: dashmap::DashMap::new(),
            to_markers: dashmap::DashMap::new(),
        }
    }

    pub fn set_cell(&self, coordinates: Vec<IdentifierType>, value: CellValue) {
        self.cells.write().insert(coordinates, value);
    }

    /// Bump the schema token, e.g. after a dimension/membership change.
    pub fn bump_token(&self) {
        self.token.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    /// A path is base iff every coordinate names a non-consolidated element.
    pub fn path_is_base(&self, coordinates: &[IdentifierType]) -> bool {
        self.dims
            .iter()
            .zip(coordinates.iter())
            .all(|(dim, &coord)| {
                dim.lookup_element(coord)
                    .map(|e| e.element_type() != ElementType::Consolidated)
                    .unwrap_or(false)
            })
    }

    pub fn path_is_string(&self, coordinates: &[IdentifierType]) -> bool {
        self.dims.iter().zip(coordinates.iter()).any(|(dim, &coord)| {
            dim.lookup_element(coord)
                .map(|e| e.element_type() == ElementType::String)
                .unwrap_or(false)
        })
    }

    /// Build a fully classified `CellPath` for the given coordinates.
    pub fn make_path(&self, coordinates: Vec<IdentifierType>) -> CellPath {
        let any_string = self.path_is_string(&coordinates);
        let all_base = self.path_is_base(&coordinates);
        CellPath::new(coordinates, any_string, all_base)
    }
}

impl Cube for MemoryCube {
    fn name(&self) -> &str {
        &self.name
    }

    fn token(&self) -> u64 {
        self.token.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn dimensions(&self) -> Vec<Arc<dyn Dimension>> {
        self.dims.iter().map(|d| d.clone() as Arc<dyn Dimension>).collect()
    }

    fn get_cell_value(
        &self,
        path: &CellPath,
        _user: Option<&str>,
        _history: &mut RuleHistory,
    ) -> (CellValue, bool) {
        match self.cells.read().get(path.coordinates()) {
            Some(v) => (v.clone(), true),
            None => (
                if path.path_type() == crate::ids::PathType::String {
                    CellValue::String(String::new())
                } else {
                    CellValue::Numeric(0.0)
                },
                false,
            ),
        }
    }

    fn add_from_marker(&self, marker: Arc<RuleMarker>) {
        self.from_markers.insert(marker.id, marker);
    }
    fn remove_from_marker(&self, marker_id: u64) {
        self.from_markers.remove(&marker_id);
    }
    fn add_to_marker(&self, marker: Arc<RuleMarker>) {
        self.to_markers.insert(marker.id, marker);
    }
    fn remove_to_marker(&self, marker_id: u64) {
        self.to_markers.remove(&marker_id);
    }
    fn from_markers(&self) -> Vec<Arc<RuleMarker>> {
        self.from_markers.iter().map(|e| e.value().clone()).collect()
    }
    fn to_markers(&self) -> Vec<Arc<RuleMarker>> {
        self.to_markers.iter().map(|e| e.value().clone()).collect()
    }
}

/// Shared fixtures for the `D` cube from spec.md §8 ("End-to-end
/// scenarios"): Year{2023,2024} x Product{A,B,C} x Measure{Units,Revenue}.
/// Exposed crate-wide (not just to this module's own tests) so `marker`,
/// `evaluator`, `optimizer`, and `rule` unit tests share one fixture.
#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;

    pub fn year_dim() -> MemoryDimension {
        MemoryDimension::new(0, "Year")
            .with_base_element(0, "2023", true)
            .with_base_element(1, "2024", true)
    }

    pub fn product_dim() -> MemoryDimension {
        MemoryDimension::new(1, "Product")
            .with_base_element(0, "A", true)
            .with_base_element(1, "B", true)
            .with_base_element(2, "C", true)
    }

    pub fn measure_dim() -> MemoryDimension {
        MemoryDimension::new(2, "Measure")
            .with_base_element(0, "Units", true)
            .with_base_element(1, "Revenue", true)
    }

    pub fn sample_cube() -> MemoryCube {
        MemoryCube::new("D", vec![year_dim(), product_dim(), measure_dim()])
    }
}

#[cfg(test)]
mod tests {
    use super::test_fixtures::sample_cube;
    use super::*;

    #[test]
    fn missing_cell_reads_as_zero() {
        let cube = sample_cube();
        let mut history = RuleHistory::default();
        let path = cube.make_path(vec![1, 0, 0]);
        let (value, found) = cube.get_cell_value(&path, None, &mut history);
        assert!(!found);
        assert_eq!(value, CellValue::Numeric(0.0));
    }

    #[test]
    fn is_in_area_empty_set_means_unrestricted() {
        let cube = sample_cube();
        let path = cube.make_path(vec![1, 0, 0]);
        let area = vec![HashSet::new(), HashSet::new(), HashSet::new()];
        assert!((&cube as &dyn Cube).is_in_area(&path, &area));
    }

    #[test]
    fn token_bumps_on_schema_change() {
        let cube = sample_cube();
        let t0 = cube.token();
        cube.bump_token();
        assert_eq!(cube.token(), t0 + 1);
    }
}

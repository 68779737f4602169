//! A rule engine for a multidimensional (OLAP) cube server.
//!
//! This crate implements the rule language, optimizer, and cross-cube
//! marker/dependency tracking that sit between a cube's storage layer and
//! its `getCellValue` request path. A rule is parsed and validated text
//! (`parser`) into a tagged-enum AST (`ast`), resolved against a cube's
//! dimension schema (`ast::area`), optionally rewritten into a faster
//! equivalent form (`optimizer`), and evaluated against a requested cell
//! path (`evaluator`) by the long-lived `rule::Rule` object that owns all
//! of the above plus its cross-cube dependency markers (`marker`).
//!
//! The cube itself — storage, dimension hierarchies, persistence — is an
//! opaque collaborator behind the `cube::Cube`/`cube::Dimension` traits;
//! this crate ships an in-memory reference implementation
//! (`cube::MemoryCube`) for its own tests but does not implement a real
//! storage engine.
//!
//! # Layout
//!
//! - [`ids`] — `IdentifierType`, `CellPath`: the coordinate primitives
//!   everything else is built from.
//! - [`value`] — the `ValueType` lattice and the `RuleValue`/`CellValue`/
//!   `CellResult` types carried through evaluation.
//! - [`error`] — the error taxonomy (`ParseError`, `ValidationError`,
//!   `MarkerError`, `RuleEngineError`).
//! - [`cube`] — the `Cube`/`Dimension`/`Element` traits this engine
//!   consumes, plus `MemoryCube` for tests.
//! - [`ast`] — the `Node`/`RuleNode` AST and area resolution
//!   (`ast::area`) and rendering (`ast::render`).
//! - [`functions`] — the built-in function registry (arithmetic,
//!   comparison, control, aggregate, string, marker functions).
//! - [`parser`] — the rule-text parser and `parse_and_validate`/
//!   `parse_only` entry points.
//! - [`optimizer`] — STET-rewrite and linearity-detection passes.
//! - [`marker`] — `RuleMarker` construction and registration.
//! - [`history`] — the recursion guard.
//! - [`evaluator`] — applicability and result-projection helpers used by
//!   `rule::Rule::get_value`.
//! - [`rule`] — the `Rule` object lifecycle: creation, re-optimization,
//!   marker (de)registration, and evaluation.
//! - [`config`] — engine configuration (recursion depth, optimizer pass
//!   toggles, log level), layered from file and environment.

pub mod ast;
pub mod config;
pub mod cube;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod history;
pub mod ids;
pub mod marker;
pub mod optimizer;
pub mod parser;
pub mod rule;
pub mod value;

pub use ast::{Node, NodeType, RuleNode, RuleOption, ValidateContext};
pub use config::EngineConfig;
pub use cube::{Cube, Dimension, Element};
pub use error::{MarkerError, ParseError, Result, RuleEngineError, ValidationError};
pub use evaluator::EvalOutcome;
pub use history::RuleHistory;
pub use ids::{CellPath, IdentifierType, PathType};
pub use marker::RuleMarker;
pub use optimizer::{OptimizerOutput, StetRewrite};
pub use parser::{parse_and_validate, parse_only, RuleParser};
pub use rule::Rule;
pub use value::{CellResult, CellValue, ElementType, RuleValue, ValueType};

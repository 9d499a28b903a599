use std::path::Path;

use caps_types::{CapsError, DataMethod, ObjectType, SubType, TransferMethod};
use value_codec::Limits;

use crate::types::*;

/// Every CAPS entry point the object wrappers call.
/// Implemented by NativeCaps (forwards to libcaps) and MockCaps (in-memory test double).
///
/// Methods take `&self`: the native library owns all object state and the
/// wrappers share one table per session. Every status below
/// `CAPS_SUCCESS` comes back as a [`CapsError`].
pub trait CapsApi {
    /// Library version as `(major, minor)`.
    fn revision(&self) -> (i32, i32);

    // ── Problem ─────────────────────────────────────────────────────────

    /// Open (or create) the Problem stored in `problem_dir`.
    fn open(&self, problem_dir: &Path, source: &ProblemSource) -> Result<ObjHandle, CapsError>;

    /// Close a Problem and release every object beneath it.
    fn close(&self, problem: ObjHandle) -> Result<(), CapsError>;

    /// Save the Problem under a new directory.
    fn save(&self, problem: ObjHandle, path: &Path) -> Result<(), CapsError>;

    /// Set the verbosity of native output; returns the previous level.
    fn out_level(&self, problem: ObjHandle, level: i32) -> Result<i32, CapsError>;

    fn write_parameters(&self, problem: ObjHandle, path: &Path) -> Result<(), CapsError>;

    fn read_parameters(&self, problem: ObjHandle, path: &Path) -> Result<(), CapsError>;

    /// Write the bodies of a Problem or Analysis. The format follows the
    /// file extension.
    fn write_geometry(&self, obj: ObjHandle, path: &Path) -> Result<(), CapsError>;

    // ── Objects ─────────────────────────────────────────────────────────

    fn info(&self, obj: ObjHandle) -> Result<ObjectInfo, CapsError>;

    /// Number of children of `otype`/`stype`. `SubType::None` matches any
    /// subtype.
    fn size(&self, obj: ObjHandle, otype: ObjectType, stype: SubType) -> Result<usize, CapsError>;

    /// Child by 1-based index.
    fn child_by_index(
        &self,
        obj: ObjHandle,
        otype: ObjectType,
        stype: SubType,
        index: usize,
    ) -> Result<ObjHandle, CapsError>;

    fn child_by_name(
        &self,
        obj: ObjHandle,
        otype: ObjectType,
        stype: SubType,
        name: &str,
    ) -> Result<ObjHandle, CapsError>;

    /// Delete a user Value or a Bound.
    fn delete(&self, obj: ObjHandle) -> Result<(), CapsError>;

    /// Copy of an attribute as a new user Value. The caller deletes it.
    fn attr_by_name(&self, obj: ObjHandle, name: &str) -> Result<ObjHandle, CapsError>;

    /// Name and copy of the attribute at a 1-based index.
    fn attr_by_index(&self, obj: ObjHandle, index: usize) -> Result<(String, ObjHandle), CapsError>;

    /// Attach a copy of `value` as attribute `name`, replacing any existing one.
    fn set_attr(&self, obj: ObjHandle, name: &str, value: ObjHandle) -> Result<(), CapsError>;

    fn delete_attr(&self, obj: ObjHandle, name: &str) -> Result<(), CapsError>;

    // ── Values ──────────────────────────────────────────────────────────

    /// Create a Parameter or User Value under a Problem.
    fn make_value(
        &self,
        problem: ObjHandle,
        name: &str,
        stype: SubType,
        value: &RawValue,
    ) -> Result<ObjHandle, CapsError>;

    /// Current contents, following any linkage to its source.
    fn get_value(&self, value: ObjHandle) -> Result<RawValue, CapsError>;

    fn set_value(&self, value: ObjHandle, raw: &RawValue) -> Result<(), CapsError>;

    /// Limits and their units, `None` when unbounded.
    fn get_limits(&self, value: ObjHandle) -> Result<Option<(Limits, Option<String>)>, CapsError>;

    /// Set limits, or clear them with `None`.
    fn set_limits(&self, value: ObjHandle, limits: Option<&Limits>, units: Option<&str>) -> Result<(), CapsError>;

    fn get_value_props(&self, value: ObjHandle) -> Result<ValueProps, CapsError>;

    /// Change shape rules. `geometry_parameter` is read-only and ignored.
    fn set_value_props(&self, value: ObjHandle, props: &ValueProps) -> Result<(), CapsError>;

    /// Convert `input` given in `units` into the Value's units.
    fn convert_value(&self, value: ObjHandle, input: f64, units: &str) -> Result<f64, CapsError>;

    /// Copy the contents of `source` into `target` once.
    fn transfer_values(
        &self,
        source: ObjHandle,
        method: TransferMethod,
        target: ObjHandle,
    ) -> Result<(), CapsError>;

    /// Make `target` follow `source`. `None` removes the linkage.
    fn make_linkage(
        &self,
        source: Option<ObjHandle>,
        method: TransferMethod,
        target: ObjHandle,
    ) -> Result<(), CapsError>;

    /// Names of the parameters `value` has sensitivities for.
    fn has_dot(&self, value: ObjHandle) -> Result<Vec<String>, CapsError>;

    fn get_dot(&self, value: ObjHandle, name: &str) -> Result<DotInfo, CapsError>;

    // ── Analyses ────────────────────────────────────────────────────────

    /// Probe an AIM without instantiating it.
    fn query_analysis(&self, problem: ObjHandle, aim: &str) -> Result<AnalysisQuery, CapsError>;

    fn make_analysis(&self, problem: ObjHandle, spec: &AnalysisSpec) -> Result<ObjHandle, CapsError>;

    fn analysis_info(&self, analysis: ObjHandle) -> Result<AnalysisInfo, CapsError>;

    /// Generate the analysis input files.
    fn pre_analysis(&self, analysis: ObjHandle) -> Result<(), CapsError>;

    /// Execute the analysis when the AIM drives execution. Returns 0 when
    /// done, 1 while still running.
    fn run_analysis(&self, analysis: ObjHandle) -> Result<i32, CapsError>;

    /// Read the results back and mark the analysis current.
    fn post_analysis(&self, analysis: ObjHandle) -> Result<(), CapsError>;

    /// Analyses whose outputs are stale.
    fn dirty_analyses(&self, problem: ObjHandle) -> Result<Vec<ObjHandle>, CapsError>;

    /// Free-form JSON request handled by the AIM.
    fn aim_backdoor(&self, analysis: ObjHandle, json: &str) -> Result<String, CapsError>;

    // ── Bounds and data transfer ────────────────────────────────────────

    fn make_bound(&self, problem: ObjHandle, dim: usize, name: &str) -> Result<ObjHandle, CapsError>;

    fn bound_info(&self, bound: ObjHandle) -> Result<BoundInfo, CapsError>;

    /// Close the Bound to further VertexSets and DataSets.
    fn complete_bound(&self, bound: ObjHandle) -> Result<(), CapsError>;

    /// A connected VertexSet when `analysis` is given, unconnected otherwise.
    fn make_vertex_set(
        &self,
        bound: ObjHandle,
        analysis: Option<ObjHandle>,
        name: Option<&str>,
    ) -> Result<ObjHandle, CapsError>;

    fn vertex_set_info(&self, vertex_set: ObjHandle) -> Result<VertexSetInfo, CapsError>;

    fn fill_unconnected_vertex_set(&self, vertex_set: ObjHandle, xyz: &[[f64; 3]]) -> Result<(), CapsError>;

    fn make_data_set(
        &self,
        vertex_set: ObjHandle,
        name: &str,
        method: DataMethod,
        rank: usize,
    ) -> Result<ObjHandle, CapsError>;

    /// Constant startup data returned until the DataSet is filled.
    fn init_data_set(&self, data_set: ObjHandle, startup: &[f64]) -> Result<(), CapsError>;

    fn get_data(&self, data_set: ObjHandle) -> Result<DataSetData, CapsError>;

    fn set_data(&self, data_set: ObjHandle, data: &DataSetData) -> Result<(), CapsError>;

    /// DataSets named `name` across every VertexSet of the Bound.
    fn get_data_sets(&self, bound: ObjHandle, name: &str) -> Result<Vec<ObjHandle>, CapsError>;
}

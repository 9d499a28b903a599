//! Bounds, VertexSets and DataSets: the data-transfer side of a Problem.
//!
//! A Bound is opened, given one VertexSet per participating analysis (or
//! unconnected point clouds) and DataSets on those, then completed. After
//! completion the library discretizes each VertexSet and DataSets can be
//! read and written.

use std::fmt;

use caps_api::{BoundInfo, DataSetData, ObjHandle, ObjectInfo, VertexSetInfo};
use caps_types::{BoundState, CapsError, DataMethod, ObjectType, SubType};
use tracing::{debug, instrument, warn};

use crate::analysis::Analysis;
use crate::attr::Attributes;
use crate::problem::Problem;

/// An owned Bound, deleted on drop.
pub struct Bound<'p> {
    problem: &'p Problem<'p>,
    handle: ObjHandle,
}

impl fmt::Debug for Bound<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bound").field("handle", &self.handle).finish()
    }
}

impl<'p> Bound<'p> {
    pub(crate) fn new(problem: &'p Problem<'p>, handle: ObjHandle) -> Self {
        Self { problem, handle }
    }

    pub fn handle(&self) -> ObjHandle {
        self.handle
    }

    pub fn name(&self) -> Result<String, CapsError> {
        Ok(self.problem.caps().api().info(self.handle)?.name)
    }

    pub fn info(&self) -> Result<BoundInfo, CapsError> {
        self.problem.caps().api().bound_info(self.handle)
    }

    pub fn state(&self) -> Result<BoundState, CapsError> {
        Ok(self.info()?.state)
    }

    /// Close the Bound to new VertexSets and DataSets and discretize it.
    #[instrument(skip(self), fields(bound = ?self.handle))]
    pub fn complete(&self) -> Result<(), CapsError> {
        self.problem.caps().api().complete_bound(self.handle)
    }

    /// A VertexSet on `analysis`' discretization, named after the
    /// analysis unless `name` is given.
    pub fn make_vertex_set(&self, analysis: &Analysis<'_>, name: Option<&str>) -> Result<VertexSet<'p>, CapsError> {
        let h = self
            .problem
            .caps()
            .api()
            .make_vertex_set(self.handle, Some(analysis.handle()), name)?;
        Ok(VertexSet::new(self.problem, h))
    }

    /// A VertexSet filled with explicit points through
    /// [`VertexSet::fill_unconnected`].
    pub fn make_unconnected_vertex_set(&self, name: &str) -> Result<VertexSet<'p>, CapsError> {
        let h = self.problem.caps().api().make_vertex_set(self.handle, None, Some(name))?;
        Ok(VertexSet::new(self.problem, h))
    }

    pub fn vertex_set(&self, name: &str) -> Result<VertexSet<'p>, CapsError> {
        let h = self
            .problem
            .caps()
            .api()
            .child_by_name(self.handle, ObjectType::VertexSet, SubType::None, name)?;
        Ok(VertexSet::new(self.problem, h))
    }

    pub fn vertex_sets(&self) -> Result<Vec<VertexSet<'p>>, CapsError> {
        let api = self.problem.caps().api();
        (1..=api.size(self.handle, ObjectType::VertexSet, SubType::None)?)
            .map(|i| {
                let h = api.child_by_index(self.handle, ObjectType::VertexSet, SubType::None, i)?;
                Ok(VertexSet::new(self.problem, h))
            })
            .collect()
    }

    /// Every DataSet called `name`, one per VertexSet that has it.
    pub fn data_sets(&self, name: &str) -> Result<Vec<DataSet<'p>>, CapsError> {
        Ok(self
            .problem
            .caps()
            .api()
            .get_data_sets(self.handle, name)?
            .into_iter()
            .map(|h| DataSet::new(self.problem, h))
            .collect())
    }
}

impl Attributes for Bound<'_> {
    fn owner(&self) -> &Problem<'_> {
        self.problem
    }

    fn handle(&self) -> ObjHandle {
        self.handle
    }
}

impl Drop for Bound<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.problem.caps().api().delete(self.handle) {
            warn!(bound = ?self.handle, error = %e, "bound not deleted");
        }
    }
}

/// View of a VertexSet inside a Bound.
#[derive(Clone, Copy)]
pub struct VertexSet<'p> {
    problem: &'p Problem<'p>,
    handle: ObjHandle,
}

impl fmt::Debug for VertexSet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VertexSet").field("handle", &self.handle).finish()
    }
}

impl<'p> VertexSet<'p> {
    fn new(problem: &'p Problem<'p>, handle: ObjHandle) -> Self {
        Self { problem, handle }
    }

    pub fn handle(&self) -> ObjHandle {
        self.handle
    }

    pub fn object_info(&self) -> Result<ObjectInfo, CapsError> {
        self.problem.caps().api().info(self.handle)
    }

    pub fn info(&self) -> Result<VertexSetInfo, CapsError> {
        self.problem.caps().api().vertex_set_info(self.handle)
    }

    pub fn is_connected(&self) -> Result<bool, CapsError> {
        Ok(self.object_info()?.stype == SubType::Connected)
    }

    /// Give an unconnected VertexSet its points. Only while the Bound is open.
    pub fn fill_unconnected(&self, xyz: &[[f64; 3]]) -> Result<(), CapsError> {
        debug!(vertex_set = ?self.handle, points = xyz.len(), "filling unconnected vertex set");
        self.problem
            .caps()
            .api()
            .fill_unconnected_vertex_set(self.handle, xyz)
    }

    pub fn make_data_set(&self, name: &str, method: DataMethod, rank: usize) -> Result<DataSet<'p>, CapsError> {
        let h = self
            .problem
            .caps()
            .api()
            .make_data_set(self.handle, name, method, rank)?;
        Ok(DataSet::new(self.problem, h))
    }

    /// A DataSet by name; every VertexSet carries `xyz`.
    pub fn data_set(&self, name: &str) -> Result<DataSet<'p>, CapsError> {
        let h = self
            .problem
            .caps()
            .api()
            .child_by_name(self.handle, ObjectType::DataSet, SubType::None, name)?;
        Ok(DataSet::new(self.problem, h))
    }
}

impl Attributes for VertexSet<'_> {
    fn owner(&self) -> &Problem<'_> {
        self.problem
    }

    fn handle(&self) -> ObjHandle {
        self.handle
    }
}

/// View of a DataSet inside a VertexSet.
#[derive(Clone, Copy)]
pub struct DataSet<'p> {
    problem: &'p Problem<'p>,
    handle: ObjHandle,
}

impl fmt::Debug for DataSet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSet").field("handle", &self.handle).finish()
    }
}

impl<'p> DataSet<'p> {
    fn new(problem: &'p Problem<'p>, handle: ObjHandle) -> Self {
        Self { problem, handle }
    }

    pub fn handle(&self) -> ObjHandle {
        self.handle
    }

    pub fn name(&self) -> Result<String, CapsError> {
        Ok(self.problem.caps().api().info(self.handle)?.name)
    }

    /// Constant per-point data returned until the DataSet is first filled.
    pub fn init(&self, startup: &[f64]) -> Result<(), CapsError> {
        self.problem.caps().api().init_data_set(self.handle, startup)
    }

    pub fn get_data(&self) -> Result<DataSetData, CapsError> {
        self.problem.caps().api().get_data(self.handle)
    }

    /// Fill a User DataSet with `rank` values per point, point-major.
    pub fn set_data(&self, rank: usize, data: &[f64], units: Option<&str>) -> Result<(), CapsError> {
        let npts = if rank == 0 { 0 } else { data.len() / rank };
        self.problem.caps().api().set_data(
            self.handle,
            &DataSetData {
                npts,
                rank,
                data: data.to_vec(),
                units: units.map(str::to_string),
            },
        )
    }
}

impl Attributes for DataSet<'_> {
    fn owner(&self) -> &Problem<'_> {
        self.problem
    }

    fn handle(&self) -> ObjHandle {
        self.handle
    }
}

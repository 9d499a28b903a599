//! An instantiated AIM and its inputs and outputs.

use std::fmt;
use std::path::{Path, PathBuf};

use caps_api::{AnalysisInfo, FieldInfo, ObjHandle, ObjectInfo};
use caps_types::status::CAPS_BADVALUE;
use caps_types::{AnalysisStatus, CapsError, ObjectType, SubType};
use serde_json::Value as Json;
use tracing::{debug, info, instrument};
use value_codec::Value;

use crate::attr::Attributes;
use crate::exec::{run_in_dir, ExecOutcome};
use crate::problem::Problem;
use crate::value::{ValueData, ValueObj};

/// View of an Analysis object. The library owns it; it lives until the
/// Problem closes.
#[derive(Clone, Copy)]
pub struct Analysis<'p> {
    problem: &'p Problem<'p>,
    handle: ObjHandle,
}

impl fmt::Debug for Analysis<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analysis").field("handle", &self.handle).finish()
    }
}

impl PartialEq for Analysis<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl<'p> Analysis<'p> {
    pub(crate) fn new(problem: &'p Problem<'p>, handle: ObjHandle) -> Self {
        Self { problem, handle }
    }

    pub fn handle(&self) -> ObjHandle {
        self.handle
    }

    pub fn problem(&self) -> &'p Problem<'p> {
        self.problem
    }

    pub fn object_info(&self) -> Result<ObjectInfo, CapsError> {
        self.problem.caps().api().info(self.handle)
    }

    pub fn name(&self) -> Result<String, CapsError> {
        Ok(self.object_info()?.name)
    }

    pub fn info(&self) -> Result<AnalysisInfo, CapsError> {
        self.problem.caps().api().analysis_info(self.handle)
    }

    pub fn status(&self) -> Result<AnalysisStatus, CapsError> {
        Ok(self.info()?.status)
    }

    pub fn directory(&self) -> Result<PathBuf, CapsError> {
        Ok(self.info()?.directory)
    }

    /// Fields this AIM can exchange through a Bound.
    pub fn fields(&self) -> Result<Vec<FieldInfo>, CapsError> {
        Ok(self.info()?.fields)
    }

    fn child(&self, stype: SubType, name: &str) -> Result<ValueObj<'p>, CapsError> {
        let h = self
            .problem
            .caps()
            .api()
            .child_by_name(self.handle, ObjectType::Value, stype, name)?;
        Ok(ValueObj::view(self.problem, h))
    }

    fn names(&self, stype: SubType) -> Result<Vec<String>, CapsError> {
        let api = self.problem.caps().api();
        (1..=api.size(self.handle, ObjectType::Value, stype)?)
            .map(|i| {
                let h = api.child_by_index(self.handle, ObjectType::Value, stype, i)?;
                Ok(api.info(h)?.name)
            })
            .collect()
    }

    pub fn input(&self, name: &str) -> Result<ValueObj<'p>, CapsError> {
        self.child(SubType::AnalysisIn, name)
    }

    pub fn output(&self, name: &str) -> Result<ValueObj<'p>, CapsError> {
        self.child(SubType::AnalysisOut, name)
    }

    pub fn input_names(&self) -> Result<Vec<String>, CapsError> {
        self.names(SubType::AnalysisIn)
    }

    pub fn output_names(&self) -> Result<Vec<String>, CapsError> {
        self.names(SubType::AnalysisOut)
    }

    pub fn set_input(&self, name: &str, value: impl Into<Value>) -> Result<(), CapsError> {
        self.input(name)?.set(value)
    }

    pub fn set_input_with_units(&self, name: &str, value: impl Into<Value>, units: &str) -> Result<(), CapsError> {
        self.input(name)?.set_with_units(&value.into(), Some(units))
    }

    pub fn get_input(&self, name: &str) -> Result<ValueData, CapsError> {
        self.input(name)?.get()
    }

    /// An output; fails with `CAPS_DIRTY` until the analysis is current.
    pub fn get_output(&self, name: &str) -> Result<ValueData, CapsError> {
        self.output(name)?.get()
    }

    // ── Execution ───────────────────────────────────────────────────────

    /// Write the input files for the analysis code.
    #[instrument(skip(self), fields(analysis = ?self.handle))]
    pub fn pre(&self) -> Result<(), CapsError> {
        self.problem.caps().api().pre_analysis(self.handle)
    }

    /// Let the AIM run the analysis code. Returns 0 once it has finished.
    #[instrument(skip(self), fields(analysis = ?self.handle))]
    pub fn run(&self) -> Result<i32, CapsError> {
        self.problem.caps().api().run_analysis(self.handle)
    }

    /// Read the results back.
    #[instrument(skip(self), fields(analysis = ?self.handle))]
    pub fn post(&self) -> Result<(), CapsError> {
        self.problem.caps().api().post_analysis(self.handle)
    }

    /// Bring the analysis up to date: pre, run and post as needed. Does
    /// nothing when it already is.
    pub fn execute(&self) -> Result<(), CapsError> {
        let status = self.status()?;
        if status == AnalysisStatus::UpToDate {
            debug!(analysis = ?self.handle, "analysis already current");
            return Ok(());
        }
        if status.needs_pre() {
            self.pre()?;
        }
        if self.status()? == AnalysisStatus::ExecPostRequired {
            self.run()?;
        }
        self.post()
    }

    /// Launch an external analysis code in the analysis directory and wait
    /// for it. Call between [`pre`](Self::pre) and [`post`](Self::post).
    #[instrument(skip(self, args), fields(analysis = ?self.handle))]
    pub fn run_external(&self, program: &str, args: &[&str]) -> Result<ExecOutcome, CapsError> {
        let dir = self.directory()?;
        let outcome = run_in_dir(&dir, program, args)?;
        info!(program, "external analysis finished");
        Ok(outcome)
    }

    /// Send a JSON request to the AIM and parse its JSON reply.
    pub fn aim_backdoor(&self, request: &Json) -> Result<Json, CapsError> {
        let reply = self
            .problem
            .caps()
            .api()
            .aim_backdoor(self.handle, &request.to_string())?;
        serde_json::from_str(&reply)
            .map_err(|e| CapsError::new(CAPS_BADVALUE).with_message(format!("AIM backdoor reply: {e}")))
    }

    /// Export this analysis' bodies.
    pub fn write_geometry(&self, path: impl AsRef<Path>) -> Result<(), CapsError> {
        self.problem.caps().api().write_geometry(self.handle, path.as_ref())
    }
}

impl Attributes for Analysis<'_> {
    fn owner(&self) -> &Problem<'_> {
        self.problem
    }

    fn handle(&self) -> ObjHandle {
        self.handle
    }
}

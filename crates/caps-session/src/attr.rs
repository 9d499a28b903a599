//! Attributes: named values hung on any CAPS object.
//!
//! The library hands attributes out as fresh user Values, so every read
//! here copies the contents out and deletes the temporary object before
//! returning. Setting goes the other way through a temporary user Value.

use caps_api::ObjHandle;
use caps_types::{CapsError, ObjectType, SubType};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::problem::Problem;
use crate::value::{read_value, to_raw, ValueData};

/// One attribute, copied out of the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub data: ValueData,
}

/// Read the temporary Value `h`, then delete it.
fn take(problem: &Problem<'_>, h: ObjHandle) -> Result<ValueData, CapsError> {
    let api = problem.caps().api();
    let data = read_value(problem.caps(), h);
    if let Err(e) = api.delete(h) {
        warn!(?h, error = %e, "attribute copy not deleted");
    }
    data
}

/// Attribute access shared by every wrapper.
pub trait Attributes {
    /// The Problem the object belongs to.
    fn owner(&self) -> &Problem<'_>;

    fn handle(&self) -> ObjHandle;

    fn attribute(&self, name: &str) -> Result<ValueData, CapsError> {
        let h = self.owner().caps().api().attr_by_name(self.handle(), name)?;
        take(self.owner(), h)
    }

    fn attribute_count(&self) -> Result<usize, CapsError> {
        self.owner()
            .caps()
            .api()
            .size(self.handle(), ObjectType::Attributes, SubType::None)
    }

    /// Every attribute, in the order they were first set.
    fn attributes(&self) -> Result<Vec<Attribute>, CapsError> {
        let api = self.owner().caps().api();
        (1..=self.attribute_count()?)
            .map(|i| {
                let (name, h) = api.attr_by_index(self.handle(), i)?;
                Ok(Attribute {
                    name,
                    data: take(self.owner(), h)?,
                })
            })
            .collect()
    }

    fn set_attribute(&self, name: &str, data: &ValueData) -> Result<(), CapsError> {
        let problem = self.owner();
        let api = problem.caps().api();
        let raw = to_raw(&data.value, data.units.as_deref())?;
        let tmp = api.make_value(problem.handle(), name, SubType::User, &raw)?;
        let result = api.set_attr(self.handle(), name, tmp);
        if let Err(e) = api.delete(tmp) {
            warn!(?tmp, error = %e, "attribute source not deleted");
        }
        result
    }

    fn delete_attribute(&self, name: &str) -> Result<(), CapsError> {
        self.owner().caps().api().delete_attr(self.handle(), name)
    }
}

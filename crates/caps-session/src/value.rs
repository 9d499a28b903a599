//! Value objects: parameters, user values, geometry and analysis
//! inputs/outputs.

use std::fmt;

use caps_api::{DotInfo, ObjHandle, ObjectInfo, RawValue, ValueProps};
use caps_types::status::CAPS_UNITERR;
use caps_types::{CapsError, TransferMethod, ValueType};
use caps_units::{Magnitude, Quantity};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use value_codec::{decode, encode, Limits, Value};

use crate::attr::Attributes;
use crate::problem::Problem;
use crate::session::Caps;

/// Decoded contents of a Value object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueData {
    pub value: Value,
    pub units: Option<String>,
}

impl ValueData {
    pub fn new(value: impl Into<Value>, units: Option<&str>) -> Self {
        Self {
            value: value.into(),
            units: units.map(str::to_string),
        }
    }

    pub fn from_quantity(q: &Quantity) -> Self {
        let value = match q.value() {
            Magnitude::Scalar(x) => Value::Double(*x),
            Magnitude::Vector(v) => Value::from(v.clone()),
        };
        Self {
            value,
            units: Some(q.units().to_string()),
        }
    }

    /// The contents as a [`Quantity`]. Needs units and numeric contents.
    pub fn quantity(&self) -> Result<Quantity, CapsError> {
        let units = self
            .units
            .as_deref()
            .ok_or_else(|| CapsError::new(CAPS_UNITERR).with_message("value has no units"))?;
        let magnitude = match &self.value {
            Value::List(_) => self.value.to_f64_vec().map(Magnitude::Vector),
            scalar => scalar.as_f64().map(Magnitude::Scalar),
        };
        let magnitude = magnitude.ok_or_else(|| {
            CapsError::new(CAPS_UNITERR).with_message(format!("{:?} cannot carry units", self.value))
        })?;
        Ok(Quantity::new(magnitude, units))
    }
}

impl fmt::Display for ValueData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.units {
            Some(units) => write!(f, "{:?} {units}", self.value),
            None => write!(f, "{:?}", self.value),
        }
    }
}

/// Encode `value` for the library. Integers carrying units become doubles.
pub(crate) fn to_raw(value: &Value, units: Option<&str>) -> Result<RawValue, CapsError> {
    let mut wire = encode(value)?;
    if units.is_some() && wire.vtype == ValueType::Integer {
        debug!(nrow = wire.nrow, ncol = wire.ncol, "promoting integer value with units");
        wire.promote_to_double();
    }
    Ok(RawValue::new(wire, units.map(str::to_string)))
}

pub(crate) fn read_value(caps: &Caps, h: ObjHandle) -> Result<ValueData, CapsError> {
    let raw = caps.api().get_value(h)?;
    Ok(ValueData {
        value: decode(&raw.wire)?,
        units: raw.units,
    })
}

/// A Value object.
///
/// User values made through [`Problem::make_value`] are owned and deleted
/// on drop; every other Value is a view of an object the library owns.
pub struct ValueObj<'p> {
    problem: &'p Problem<'p>,
    handle: ObjHandle,
    owned: bool,
}

impl fmt::Debug for ValueObj<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueObj")
            .field("handle", &self.handle)
            .field("owned", &self.owned)
            .finish()
    }
}

impl<'p> ValueObj<'p> {
    pub(crate) fn view(problem: &'p Problem<'p>, handle: ObjHandle) -> Self {
        Self {
            problem,
            handle,
            owned: false,
        }
    }

    pub(crate) fn owned(problem: &'p Problem<'p>, handle: ObjHandle) -> Self {
        Self {
            problem,
            handle,
            owned: true,
        }
    }

    pub fn handle(&self) -> ObjHandle {
        self.handle
    }

    pub fn problem(&self) -> &'p Problem<'p> {
        self.problem
    }

    fn caps(&self) -> &'p Caps {
        self.problem.caps()
    }

    pub fn info(&self) -> Result<ObjectInfo, CapsError> {
        self.caps().api().info(self.handle)
    }

    pub fn name(&self) -> Result<String, CapsError> {
        Ok(self.info()?.name)
    }

    /// Contents and units, following any link to its source.
    pub fn get(&self) -> Result<ValueData, CapsError> {
        read_value(self.caps(), self.handle)
    }

    /// Just the decoded contents.
    pub fn value(&self) -> Result<Value, CapsError> {
        Ok(self.get()?.value)
    }

    pub fn quantity(&self) -> Result<Quantity, CapsError> {
        self.get()?.quantity()
    }

    /// Set contents that carry no units.
    pub fn set(&self, value: impl Into<Value>) -> Result<(), CapsError> {
        self.set_with_units(&value.into(), None)
    }

    /// Set contents given in `units`. The library scales them into the
    /// Value's own units.
    #[instrument(skip(self, value), fields(handle = ?self.handle))]
    pub fn set_with_units(&self, value: &Value, units: Option<&str>) -> Result<(), CapsError> {
        let raw = to_raw(value, units)?;
        self.caps().api().set_value(self.handle, &raw)
    }

    pub fn set_quantity(&self, q: &Quantity) -> Result<(), CapsError> {
        let data = ValueData::from_quantity(q);
        self.set_with_units(&data.value, data.units.as_deref())
    }

    pub fn set_data(&self, data: &ValueData) -> Result<(), CapsError> {
        self.set_with_units(&data.value, data.units.as_deref())
    }

    /// Limits and the units they are stated in, `None` when unbounded.
    pub fn limits(&self) -> Result<Option<(Value, Option<String>)>, CapsError> {
        Ok(self
            .caps()
            .api()
            .get_limits(self.handle)?
            .map(|(limits, units)| (limits.to_value(), units)))
    }

    /// Bound the Value by a 2-element `[min, max]`; `None` clears the limits.
    pub fn set_limits(&self, limits: Option<&Value>, units: Option<&str>) -> Result<(), CapsError> {
        let limits = limits.map(Limits::from_value).transpose()?;
        self.caps().api().set_limits(self.handle, limits.as_ref(), units)
    }

    pub fn props(&self) -> Result<ValueProps, CapsError> {
        self.caps().api().get_value_props(self.handle)
    }

    pub fn set_props(&self, props: &ValueProps) -> Result<(), CapsError> {
        self.caps().api().set_value_props(self.handle, props)
    }

    /// `input` in `units`, expressed in this Value's units.
    pub fn convert_value(&self, input: f64, units: &str) -> Result<f64, CapsError> {
        self.caps().api().convert_value(self.handle, input, units)
    }

    /// Copy this Value's contents into `target` once.
    pub fn transfer_to(&self, target: &ValueObj<'_>, method: TransferMethod) -> Result<(), CapsError> {
        self.caps().api().transfer_values(self.handle, method, target.handle)
    }

    /// Make this Value follow `source` from now on.
    pub fn link(&self, source: &ValueObj<'_>, method: TransferMethod) -> Result<(), CapsError> {
        self.caps().api().make_linkage(Some(source.handle), method, self.handle)
    }

    pub fn unlink(&self) -> Result<(), CapsError> {
        self.caps().api().make_linkage(None, TransferMethod::Copy, self.handle)
    }

    pub fn is_linked(&self) -> Result<bool, CapsError> {
        Ok(self.info()?.linked)
    }

    /// Names of the parameters this Value has sensitivities for.
    pub fn has_dot(&self) -> Result<Vec<String>, CapsError> {
        self.caps().api().has_dot(self.handle)
    }

    pub fn get_dot(&self, name: &str) -> Result<DotInfo, CapsError> {
        self.caps().api().get_dot(self.handle, name)
    }
}

impl Attributes for ValueObj<'_> {
    fn owner(&self) -> &Problem<'_> {
        self.problem
    }

    fn handle(&self) -> ObjHandle {
        self.handle
    }
}

impl Drop for ValueObj<'_> {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        if let Err(e) = self.caps().api().delete(self.handle) {
            warn!(handle = ?self.handle, error = %e, "user value not deleted");
        }
    }
}

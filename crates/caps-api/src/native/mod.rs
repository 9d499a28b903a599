//! NativeCaps: forwards every [`CapsApi`] call to libcaps.
//!
//! Handles are the native `capsObj` pointers. Strings cross as `CString`;
//! buffers the library allocates for us are released with `EG_free`, and
//! error lists with `caps_freeError`.

mod ffi;

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::path::Path;
use std::ptr;

use caps_types::status::*;
use caps_types::{
    check, AnalysisStatus, BoundState, CapsError, DataMethod, Dim, ErrorTable, Fixed, NullState, ObjectType,
    SubType, TransferMethod, ValueType,
};
use caps_units::{Derived, UnitSystem};
use chrono::{TimeZone, Utc};
use tracing::{debug, warn};
use value_codec::{Limits, WireData, WireTuple, WireValue};

use crate::traits::CapsApi;
use crate::types::*;

// ── Marshalling helpers ─────────────────────────────────────────────────

fn cstring(s: &str) -> Result<CString, CapsError> {
    CString::new(s).map_err(|_| CapsError::new(CAPS_BADNAME).with_message(format!("embedded NUL in {s:?}")))
}

fn path_cstring(path: &Path) -> Result<CString, CapsError> {
    cstring(&path.to_string_lossy())
}

fn opt_cstring(s: Option<&str>) -> Result<Option<CString>, CapsError> {
    s.map(cstring).transpose()
}

fn opt_ptr(s: &Option<CString>) -> *const c_char {
    s.as_ref().map_or(ptr::null(), |c| c.as_ptr())
}

/// Copy a library-owned C string. Null gives `None`.
///
/// # Safety
/// `p` must be null or point at a NUL-terminated string.
unsafe fn read_str(p: *const c_char) -> Option<String> {
    if p.is_null() {
        None
    } else {
        Some(CStr::from_ptr(p).to_string_lossy().into_owned())
    }
}

/// Copy and release a string the library allocated for the caller.
///
/// # Safety
/// `p` must be null or a NUL-terminated string from the EGADS allocator.
unsafe fn take_str(p: *mut c_char) -> Option<String> {
    let s = read_str(p);
    if !p.is_null() {
        ffi::EG_free(p.cast());
    }
    s
}

fn obj(h: ObjHandle) -> ffi::capsObj {
    h.as_ptr()
}

fn handle(p: ffi::capsObj) -> Result<ObjHandle, CapsError> {
    ObjHandle::from_ptr(p).ok_or_else(|| CapsError::new(CAPS_NULLOBJ))
}

/// A length reported by the library; negative counts read as empty.
fn to_len(n: c_int) -> usize {
    usize::try_from(n).unwrap_or(0)
}

fn count(n: usize) -> Result<c_int, CapsError> {
    c_int::try_from(n).map_err(|_| CapsError::new(CAPS_RANGEERR).with_message(format!("{n} exceeds a C int")))
}

fn decode_enum<T>(raw: c_int, from_raw: fn(i32) -> Option<T>) -> Result<T, CapsError> {
    from_raw(raw).ok_or_else(|| CapsError::new(CAPS_BADTYPE).with_message(format!("unexpected enum value {raw}")))
}

/// Error list returned alongside a status; freed on drop.
struct ErrorList {
    count: c_int,
    errs: *mut ffi::capsErrs,
}

impl ErrorList {
    fn new() -> Self {
        Self {
            count: 0,
            errs: ptr::null_mut(),
        }
    }

    /// Every line of every error, in order.
    fn lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.errs.is_null() {
            return out;
        }
        for i in 1..=self.count {
            let mut err_obj: ffi::capsObj = ptr::null_mut();
            let mut nlines: c_int = 0;
            let mut lines: *mut *mut c_char = ptr::null_mut();
            // SAFETY: errs came from the library and i is within 1..=nError.
            let stat = unsafe { ffi::caps_errorInfo(self.errs, i, &mut err_obj, &mut nlines, &mut lines) };
            if stat != CAPS_SUCCESS || lines.is_null() {
                continue;
            }
            for j in 0..to_len(nlines) {
                // SAFETY: lines holds nlines valid strings.
                if let Some(line) = unsafe { read_str(*lines.add(j)) } {
                    out.push(line);
                }
            }
        }
        out
    }
}

impl Drop for ErrorList {
    fn drop(&mut self) {
        if !self.errs.is_null() {
            // SAFETY: errs is owned by this list and freed exactly once.
            unsafe {
                ffi::caps_freeError(self.errs);
            }
        }
    }
}

/// Payload laid out the way `makeValue`/`setValue` read it.
struct WireBuffer {
    ints: Vec<c_int>,
    reals: Vec<f64>,
    text: Option<CString>,
    tuples: Vec<ffi::capsTuple>,
    tuple_text: Vec<CString>,
    partial: Option<Vec<c_int>>,
}

impl WireBuffer {
    fn new(wire: &WireValue) -> Result<Self, CapsError> {
        let mut buf = Self {
            ints: Vec::new(),
            reals: Vec::new(),
            text: None,
            tuples: Vec::new(),
            tuple_text: Vec::new(),
            partial: wire
                .partial
                .as_ref()
                .map(|mask| mask.iter().map(|m| m.as_raw()).collect()),
        };
        match &wire.data {
            WireData::Null => {}
            WireData::Integers(v) => buf.ints = v.clone(),
            WireData::Doubles(v) => buf.reals = v.clone(),
            WireData::Text(s) => buf.text = Some(cstring(s)?),
            WireData::Tuples(v) => {
                for t in v {
                    buf.tuple_text.push(cstring(&t.name)?);
                    buf.tuple_text.push(cstring(&t.value)?);
                }
                buf.tuples = buf
                    .tuple_text
                    .chunks(2)
                    .map(|pair| ffi::capsTuple {
                        name: pair[0].as_ptr().cast_mut(),
                        value: pair[1].as_ptr().cast_mut(),
                    })
                    .collect();
            }
        }
        Ok(buf)
    }

    fn data(&self, wire: &WireValue) -> *const c_void {
        match wire.data {
            WireData::Null => ptr::null(),
            WireData::Integers(_) => self.ints.as_ptr().cast(),
            WireData::Doubles(_) => self.reals.as_ptr().cast(),
            WireData::Text(_) => opt_ptr(&self.text).cast(),
            WireData::Tuples(_) => self.tuples.as_ptr().cast(),
        }
    }

    fn partial(&mut self) -> *mut c_int {
        self.partial.as_mut().map_or(ptr::null_mut(), |p| p.as_mut_ptr())
    }
}

/// Copy a value the library returned.
///
/// # Safety
/// `data` and `partial` must be null or hold `nrow * ncol` entries of the
/// layout `vtype` implies.
unsafe fn read_wire(vtype: ValueType, nrow: usize, ncol: usize, data: *const c_void, partial: *const c_int) -> WireValue {
    let len = nrow * ncol;
    let data = if data.is_null() {
        WireData::Null
    } else {
        match vtype {
            ValueType::Boolean | ValueType::Integer => {
                WireData::Integers(std::slice::from_raw_parts(data.cast::<c_int>(), len).to_vec())
            }
            ValueType::Double | ValueType::DoubleDot => {
                WireData::Doubles(std::slice::from_raw_parts(data.cast::<f64>(), len).to_vec())
            }
            ValueType::String => WireData::Text(read_str(data.cast()).unwrap_or_default()),
            ValueType::Tuple => WireData::Tuples(
                std::slice::from_raw_parts(data.cast::<ffi::capsTuple>(), len)
                    .iter()
                    .map(|t| WireTuple {
                        name: read_str(t.name).unwrap_or_default(),
                        value: read_str(t.value).unwrap_or_default(),
                    })
                    .collect(),
            ),
            ValueType::Pointer | ValueType::Value => WireData::Null,
        }
    };
    let partial = (!partial.is_null()).then(|| {
        std::slice::from_raw_parts(partial, len)
            .iter()
            .map(|&m| NullState::from_raw(m).unwrap_or(NullState::NotNull))
            .collect()
    });
    WireValue {
        vtype,
        nrow,
        ncol,
        data,
        partial,
    }
}

// ── NativeCaps ──────────────────────────────────────────────────────────

/// libcaps behind [`CapsApi`].
#[derive(Debug, Default)]
pub struct NativeCaps {
    errors: ErrorTable,
}

impl NativeCaps {
    /// Use `errors` to name status codes, usually loaded from the ESP
    /// headers.
    pub fn new(errors: ErrorTable) -> Self {
        Self { errors }
    }

    pub fn error_table(&self) -> &ErrorTable {
        &self.errors
    }

    fn check(&self, status: c_int) -> Result<i32, CapsError> {
        check(status, &self.errors)
    }

    /// Status plus whatever the library reported in its error list.
    fn check_list(&self, status: c_int, list: &ErrorList) -> Result<i32, CapsError> {
        self.check(status).map_err(|e| {
            let lines = list.lines();
            if lines.is_empty() {
                e
            } else {
                e.with_details(lines)
            }
        })
    }

    /// Walk a `(count, array)` pair of handles and free the array.
    ///
    /// # Safety
    /// `objs` must be null or an EGADS allocation holding `n` handles.
    unsafe fn take_handles(n: c_int, objs: *mut ffi::capsObj) -> Vec<ObjHandle> {
        if objs.is_null() {
            return Vec::new();
        }
        let out = std::slice::from_raw_parts(objs, to_len(n))
            .iter()
            .filter_map(|&p| ObjHandle::from_ptr(p))
            .collect();
        ffi::EG_free(objs.cast());
        out
    }
}

impl CapsApi for NativeCaps {
    fn revision(&self) -> (i32, i32) {
        let (mut major, mut minor) = (0, 0);
        // SAFETY: plain out-parameters.
        unsafe { ffi::caps_revision(&mut major, &mut minor) };
        (major, minor)
    }

    fn open(&self, problem_dir: &Path, source: &ProblemSource) -> Result<ObjHandle, CapsError> {
        let file = match source {
            ProblemSource::Csm(p) | ProblemSource::Egads(p) => path_cstring(p)?,
            ProblemSource::Restart => path_cstring(problem_dir)?,
        };
        let name = path_cstring(problem_dir)?;
        let mut out = ptr::null_mut();
        // SAFETY: both strings outlive the call.
        self.check(unsafe { ffi::caps_open(file.as_ptr(), name.as_ptr(), &mut out) })?;
        debug!(dir = %problem_dir.display(), "caps problem opened");
        handle(out)
    }

    fn close(&self, problem: ObjHandle) -> Result<(), CapsError> {
        // SAFETY: problem is a live Problem handle.
        self.check(unsafe { ffi::caps_close(obj(problem)) }).map(drop)
    }

    fn save(&self, problem: ObjHandle, path: &Path) -> Result<(), CapsError> {
        let path = path_cstring(path)?;
        self.check(unsafe { ffi::caps_save(obj(problem), path.as_ptr()) }).map(drop)
    }

    fn out_level(&self, problem: ObjHandle, level: i32) -> Result<i32, CapsError> {
        self.check(unsafe { ffi::caps_outLevel(obj(problem), level) })
    }

    fn write_parameters(&self, problem: ObjHandle, path: &Path) -> Result<(), CapsError> {
        let path = path_cstring(path)?;
        self.check(unsafe { ffi::caps_writeParameters(obj(problem), path.as_ptr()) }).map(drop)
    }

    fn read_parameters(&self, problem: ObjHandle, path: &Path) -> Result<(), CapsError> {
        let path = path_cstring(path)?;
        self.check(unsafe { ffi::caps_readParameters(obj(problem), path.as_ptr()) }).map(drop)
    }

    fn write_geometry(&self, target: ObjHandle, path: &Path) -> Result<(), CapsError> {
        let path = path_cstring(path)?;
        let mut list = ErrorList::new();
        let stat = unsafe { ffi::caps_writeGeometry(obj(target), 0, path.as_ptr(), &mut list.count, &mut list.errs) };
        self.check_list(stat, &list).map(drop)
    }

    fn info(&self, target: ObjHandle) -> Result<ObjectInfo, CapsError> {
        let mut name = ptr::null_mut();
        let (mut otype, mut stype) = (0, 0);
        let (mut link, mut parent) = (ptr::null_mut(), ptr::null_mut());
        let mut own = ffi::capsOwn {
            pname: ptr::null_mut(),
            pID: ptr::null_mut(),
            user: ptr::null_mut(),
            datetime: [0; 6],
            sNum: 0,
        };
        // SAFETY: out-parameters only; the strings stay owned by the object.
        let stat = unsafe {
            ffi::caps_info(obj(target), &mut name, &mut otype, &mut stype, &mut link, &mut parent, &mut own)
        };
        self.check(stat)?;
        let [y, mo, d, h, mi, s] = own.datetime.map(i32::from);
        let stamp = Utc
            .with_ymd_and_hms(y, mo as u32, d as u32, h as u32, mi as u32, s as u32)
            .single();
        // SAFETY: strings returned by caps_info are valid while the object lives.
        let owner = unsafe {
            OwnerInfo {
                process: read_str(own.pname).unwrap_or_default(),
                pid: read_str(own.pID).unwrap_or_default(),
                user: read_str(own.user).unwrap_or_default(),
                stamp,
                sequence: u64::from(own.sNum),
            }
        };
        Ok(ObjectInfo {
            name: unsafe { read_str(name) }.unwrap_or_default(),
            otype: decode_enum(otype, ObjectType::from_raw)?,
            stype: decode_enum(stype, SubType::from_raw)?,
            linked: !link.is_null(),
            parent: ObjHandle::from_ptr(parent),
            owner,
        })
    }

    fn size(&self, target: ObjHandle, otype: ObjectType, stype: SubType) -> Result<usize, CapsError> {
        let mut size = 0;
        let mut list = ErrorList::new();
        let stat = unsafe {
            ffi::caps_size(obj(target), otype.as_raw(), stype.as_raw(), &mut size, &mut list.count, &mut list.errs)
        };
        self.check_list(stat, &list)?;
        Ok(to_len(size))
    }

    fn child_by_index(
        &self,
        target: ObjHandle,
        otype: ObjectType,
        stype: SubType,
        index: usize,
    ) -> Result<ObjHandle, CapsError> {
        let mut out = ptr::null_mut();
        let stat = unsafe { ffi::caps_childByIndex(obj(target), otype.as_raw(), stype.as_raw(), count(index)?, &mut out) };
        self.check(stat)?;
        handle(out)
    }

    fn child_by_name(
        &self,
        target: ObjHandle,
        otype: ObjectType,
        stype: SubType,
        name: &str,
    ) -> Result<ObjHandle, CapsError> {
        let name = cstring(name)?;
        let mut out = ptr::null_mut();
        let stat = unsafe { ffi::caps_childByName(obj(target), otype.as_raw(), stype.as_raw(), name.as_ptr(), &mut out) };
        self.check(stat)?;
        handle(out)
    }

    fn delete(&self, target: ObjHandle) -> Result<(), CapsError> {
        self.check(unsafe { ffi::caps_delete(obj(target)) }).map(drop)
    }

    fn attr_by_name(&self, target: ObjHandle, name: &str) -> Result<ObjHandle, CapsError> {
        let name = cstring(name)?;
        let mut out = ptr::null_mut();
        self.check(unsafe { ffi::caps_attrByName(obj(target), name.as_ptr(), &mut out) })?;
        handle(out)
    }

    fn attr_by_index(&self, target: ObjHandle, index: usize) -> Result<(String, ObjHandle), CapsError> {
        let mut out = ptr::null_mut();
        self.check(unsafe { ffi::caps_attrByIndex(obj(target), count(index)?, &mut out) })?;
        let attr = handle(out)?;
        let name = self.info(attr)?.name;
        Ok((name, attr))
    }

    fn set_attr(&self, target: ObjHandle, name: &str, value: ObjHandle) -> Result<(), CapsError> {
        let name = cstring(name)?;
        self.check(unsafe { ffi::caps_setAttr(obj(target), name.as_ptr(), obj(value)) }).map(drop)
    }

    fn delete_attr(&self, target: ObjHandle, name: &str) -> Result<(), CapsError> {
        let name = cstring(name)?;
        self.check(unsafe { ffi::caps_deleteAttr(obj(target), name.as_ptr()) }).map(drop)
    }

    fn make_value(&self, problem: ObjHandle, name: &str, stype: SubType, value: &RawValue) -> Result<ObjHandle, CapsError> {
        let name = cstring(name)?;
        let units = opt_cstring(value.units.as_deref())?;
        let w = &value.wire;
        let mut buf = WireBuffer::new(w)?;
        let mut out = ptr::null_mut();
        // SAFETY: buf and the strings outlive the call; the library copies the payload.
        let stat = unsafe {
            ffi::caps_makeValue(
                obj(problem),
                name.as_ptr(),
                stype.as_raw(),
                w.vtype.as_raw(),
                count(w.nrow)?,
                count(w.ncol)?,
                buf.data(w),
                buf.partial(),
                opt_ptr(&units),
                &mut out,
            )
        };
        self.check(stat)?;
        handle(out)
    }

    fn get_value(&self, value: ObjHandle) -> Result<RawValue, CapsError> {
        let (mut vtype, mut nrow, mut ncol) = (0, 0, 0);
        let mut data = ptr::null();
        let mut partial = ptr::null();
        let mut units = ptr::null();
        let mut list = ErrorList::new();
        let stat = unsafe {
            ffi::caps_getValue(
                obj(value),
                &mut vtype,
                &mut nrow,
                &mut ncol,
                &mut data,
                &mut partial,
                &mut units,
                &mut list.count,
                &mut list.errs,
            )
        };
        self.check_list(stat, &list)?;
        let vtype = decode_enum(vtype, ValueType::from_raw)?;
        // SAFETY: the buffers belong to the Value and hold nrow*ncol entries.
        let wire = unsafe { read_wire(vtype, to_len(nrow), to_len(ncol), data, partial) };
        Ok(RawValue::new(wire, unsafe { read_str(units) }))
    }

    fn set_value(&self, value: ObjHandle, raw: &RawValue) -> Result<(), CapsError> {
        let units = opt_cstring(raw.units.as_deref())?;
        let w = &raw.wire;
        let mut buf = WireBuffer::new(w)?;
        let mut list = ErrorList::new();
        let stat = unsafe {
            ffi::caps_setValue(
                obj(value),
                w.vtype.as_raw(),
                count(w.nrow)?,
                count(w.ncol)?,
                buf.data(w),
                buf.partial(),
                opt_ptr(&units),
                &mut list.count,
                &mut list.errs,
            )
        };
        self.check_list(stat, &list).map(drop)
    }

    fn get_limits(&self, value: ObjHandle) -> Result<Option<(Limits, Option<String>)>, CapsError> {
        let mut vtype = 0;
        let mut limits = ptr::null();
        let mut units = ptr::null();
        self.check(unsafe { ffi::caps_getLimits(obj(value), &mut vtype, &mut limits, &mut units) })?;
        if limits.is_null() {
            return Ok(None);
        }
        // SAFETY: limits points at two entries of the reported type.
        let limits = unsafe {
            match decode_enum(vtype, ValueType::from_raw)? {
                ValueType::Integer => Limits::Integer(*limits.cast::<[c_int; 2]>()),
                _ => Limits::Double(*limits.cast::<[f64; 2]>()),
            }
        };
        Ok(Some((limits, unsafe { read_str(units) })))
    }

    fn set_limits(&self, value: ObjHandle, limits: Option<&Limits>, units: Option<&str>) -> Result<(), CapsError> {
        let units = opt_cstring(units)?;
        let (vtype, mut ints, mut reals) = match limits {
            Some(Limits::Integer(l)) => (ValueType::Integer, *l, [0.0; 2]),
            Some(Limits::Double(l)) => (ValueType::Double, [0; 2], *l),
            None => (ValueType::Double, [0; 2], [0.0; 2]),
        };
        let data: *mut c_void = match limits {
            Some(Limits::Integer(_)) => ints.as_mut_ptr().cast(),
            Some(Limits::Double(_)) => reals.as_mut_ptr().cast(),
            None => ptr::null_mut(),
        };
        self.check(unsafe { ffi::caps_setLimits(obj(value), vtype.as_raw(), data, opt_ptr(&units)) })
            .map(drop)
    }

    fn get_value_props(&self, value: ObjHandle) -> Result<ValueProps, CapsError> {
        let (mut dim, mut pmtr, mut lfixed, mut sfixed, mut nval) = (0, 0, 0, 0, 0);
        self.check(unsafe {
            ffi::caps_getValueProps(obj(value), &mut dim, &mut pmtr, &mut lfixed, &mut sfixed, &mut nval)
        })?;
        Ok(ValueProps {
            dim: decode_enum(dim, Dim::from_raw)?,
            geometry_parameter: pmtr != 0,
            length: decode_enum(lfixed, Fixed::from_raw)?,
            shape: decode_enum(sfixed, Fixed::from_raw)?,
            null: decode_enum(nval, NullState::from_raw)?,
        })
    }

    fn set_value_props(&self, value: ObjHandle, props: &ValueProps) -> Result<(), CapsError> {
        let stat = unsafe {
            ffi::caps_setValueProps(
                obj(value),
                props.dim.as_raw(),
                props.length.as_raw(),
                props.shape.as_raw(),
                props.null.as_raw(),
            )
        };
        self.check(stat).map(drop)
    }

    fn convert_value(&self, value: ObjHandle, input: f64, units: &str) -> Result<f64, CapsError> {
        let units = cstring(units)?;
        let mut out = 0.0;
        self.check(unsafe { ffi::caps_convertValue(obj(value), input, units.as_ptr(), &mut out) })?;
        Ok(out)
    }

    fn transfer_values(&self, source: ObjHandle, method: TransferMethod, target: ObjHandle) -> Result<(), CapsError> {
        let mut list = ErrorList::new();
        let stat = unsafe {
            ffi::caps_transferValues(obj(source), method.as_raw(), obj(target), &mut list.count, &mut list.errs)
        };
        self.check_list(stat, &list).map(drop)
    }

    fn make_linkage(&self, source: Option<ObjHandle>, method: TransferMethod, target: ObjHandle) -> Result<(), CapsError> {
        let link = source.map_or(ptr::null_mut(), obj);
        self.check(unsafe { ffi::caps_makeLinkage(link, method.as_raw(), obj(target)) }).map(drop)
    }

    fn has_dot(&self, value: ObjHandle) -> Result<Vec<String>, CapsError> {
        let mut n = 0;
        let mut names = ptr::null_mut();
        self.check(unsafe { ffi::caps_hasDot(obj(value), &mut n, &mut names) })?;
        if names.is_null() {
            return Ok(Vec::new());
        }
        // SAFETY: names holds n strings owned by the Value; only the array is ours.
        let out = unsafe {
            let out = std::slice::from_raw_parts(names, to_len(n))
                .iter()
                .filter_map(|&p| read_str(p))
                .collect();
            ffi::EG_free(names.cast());
            out
        };
        Ok(out)
    }

    fn get_dot(&self, value: ObjHandle, name: &str) -> Result<DotInfo, CapsError> {
        let name = cstring(name)?;
        let (mut len, mut rank) = (0, 0);
        let mut dot = ptr::null_mut();
        let mut list = ErrorList::new();
        let stat = unsafe {
            ffi::caps_getDot(obj(value), name.as_ptr(), &mut len, &mut rank, &mut dot, &mut list.count, &mut list.errs)
        };
        self.check_list(stat, &list)?;
        let (len, rank) = (to_len(len), to_len(rank));
        let dot = if dot.is_null() {
            Vec::new()
        } else {
            // SAFETY: dot holds len*rank doubles owned by the Value.
            unsafe { std::slice::from_raw_parts(dot, len * rank).to_vec() }
        };
        Ok(DotInfo { len, rank, dot })
    }

    fn query_analysis(&self, problem: ObjHandle, aim: &str) -> Result<AnalysisQuery, CapsError> {
        let aim = cstring(aim)?;
        let (mut inputs, mut outputs, mut execution) = (0, 0, 0);
        let stat = unsafe { ffi::caps_queryAnalysis(obj(problem), aim.as_ptr(), &mut inputs, &mut outputs, &mut execution) };
        self.check(stat)?;
        Ok(AnalysisQuery {
            inputs: to_len(inputs),
            outputs: to_len(outputs),
            execution,
        })
    }

    fn make_analysis(&self, problem: ObjHandle, spec: &AnalysisSpec) -> Result<ObjHandle, CapsError> {
        let aim = cstring(&spec.aim)?;
        let dir = opt_cstring(spec.name.as_deref())?;
        let unit_system = opt_cstring(spec.unit_system.as_deref())?;
        let intent = opt_cstring(spec.intent.as_deref())?;
        let mut out = ptr::null_mut();
        let stat = unsafe {
            ffi::caps_makeAnalysis(
                obj(problem),
                aim.as_ptr(),
                opt_ptr(&dir),
                opt_ptr(&unit_system),
                opt_ptr(&intent),
                0,
                ptr::null_mut(),
                &mut out,
            )
        };
        self.check(stat)
            .map_err(|e| e.with_message(format!("Failed to load AIM: {}", spec.aim)))?;
        handle(out)
    }

    fn analysis_info(&self, analysis: ObjHandle) -> Result<AnalysisInfo, CapsError> {
        let (mut dir, mut unit_system, mut intent) = (ptr::null_mut(), ptr::null_mut(), ptr::null_mut());
        let (mut nparent, mut parents) = (0, ptr::null_mut());
        let (mut nfield, mut fnames, mut ranks) = (0, ptr::null_mut(), ptr::null_mut());
        let (mut execution, mut status) = (0, 0);
        let stat = unsafe {
            ffi::caps_analysisInfo(
                obj(analysis),
                &mut dir,
                &mut unit_system,
                &mut intent,
                &mut nparent,
                &mut parents,
                &mut nfield,
                &mut fnames,
                &mut ranks,
                &mut execution,
                &mut status,
            )
        };
        self.check(stat)?;
        // SAFETY: the strings and arrays belong to the Analysis and hold the reported counts.
        let fields = unsafe {
            if fnames.is_null() || ranks.is_null() {
                Vec::new()
            } else {
                let n = to_len(nfield);
                let names = std::slice::from_raw_parts(fnames, n);
                let ranks = std::slice::from_raw_parts(ranks, n);
                names
                    .iter()
                    .zip(ranks)
                    .map(|(&name, &rank)| FieldInfo {
                        name: read_str(name).unwrap_or_default(),
                        rank: to_len(rank),
                    })
                    .collect()
            }
        };
        let parents = if parents.is_null() {
            Vec::new()
        } else {
            unsafe { std::slice::from_raw_parts(parents, to_len(nparent)) }
                .iter()
                .filter_map(|&p| ObjHandle::from_ptr(p))
                .collect()
        };
        Ok(AnalysisInfo {
            directory: unsafe { read_str(dir) }.unwrap_or_default().into(),
            unit_system: unsafe { read_str(unit_system) },
            intent: unsafe { read_str(intent) },
            parents,
            fields,
            execution,
            status: decode_enum(status, AnalysisStatus::from_raw)?,
        })
    }

    fn pre_analysis(&self, analysis: ObjHandle) -> Result<(), CapsError> {
        let mut list = ErrorList::new();
        let stat = unsafe { ffi::caps_preAnalysis(obj(analysis), &mut list.count, &mut list.errs) };
        self.check_list(stat, &list).map(drop)
    }

    fn run_analysis(&self, analysis: ObjHandle) -> Result<i32, CapsError> {
        let mut running = 0;
        let mut list = ErrorList::new();
        let stat = unsafe { ffi::caps_runAnalysis(obj(analysis), &mut running, &mut list.count, &mut list.errs) };
        self.check_list(stat, &list)?;
        Ok(running)
    }

    fn post_analysis(&self, analysis: ObjHandle) -> Result<(), CapsError> {
        let mut list = ErrorList::new();
        let stat = unsafe { ffi::caps_postAnalysis(obj(analysis), &mut list.count, &mut list.errs) };
        self.check_list(stat, &list).map(drop)
    }

    fn dirty_analyses(&self, problem: ObjHandle) -> Result<Vec<ObjHandle>, CapsError> {
        let mut n = 0;
        let mut objs = ptr::null_mut();
        self.check(unsafe { ffi::caps_dirtyAnalysis(obj(problem), &mut n, &mut objs) })?;
        // SAFETY: objs is an EGADS allocation of n handles.
        Ok(unsafe { Self::take_handles(n, objs) })
    }

    fn aim_backdoor(&self, analysis: ObjHandle, json: &str) -> Result<String, CapsError> {
        let json = cstring(json)?;
        let mut out = ptr::null_mut();
        let stat = unsafe { ffi::caps_AIMbackdoor(obj(analysis), json.as_ptr(), &mut out) };
        // SAFETY: out is null or an EGADS allocation, released here either way.
        let text = unsafe { take_str(out) };
        self.check(stat)?;
        Ok(text.unwrap_or_default())
    }

    fn make_bound(&self, problem: ObjHandle, dim: usize, name: &str) -> Result<ObjHandle, CapsError> {
        let name = cstring(name)?;
        let mut out = ptr::null_mut();
        self.check(unsafe { ffi::caps_makeBound(obj(problem), count(dim)?, name.as_ptr(), &mut out) })?;
        handle(out)
    }

    fn bound_info(&self, bound: ObjHandle) -> Result<BoundInfo, CapsError> {
        let (mut state, mut dim) = (0, 0);
        let mut plims = [0.0; 4];
        self.check(unsafe { ffi::caps_boundInfo(obj(bound), &mut state, &mut dim, plims.as_mut_ptr()) })?;
        let dim = dim.clamp(0, 3) as usize;
        Ok(BoundInfo {
            state: decode_enum(state, BoundState::from_raw)?,
            dim,
            limits: plims[..(2 * dim).min(4)].to_vec(),
        })
    }

    fn complete_bound(&self, bound: ObjHandle) -> Result<(), CapsError> {
        self.check(unsafe { ffi::caps_completeBound(obj(bound)) }).map(drop)
    }

    fn make_vertex_set(&self, bound: ObjHandle, analysis: Option<ObjHandle>, name: Option<&str>) -> Result<ObjHandle, CapsError> {
        let name = opt_cstring(name)?;
        let mut out = ptr::null_mut();
        let aobj = analysis.map_or(ptr::null_mut(), obj);
        self.check(unsafe { ffi::caps_makeVertexSet(obj(bound), aobj, opt_ptr(&name), &mut out) })?;
        handle(out)
    }

    fn vertex_set_info(&self, vertex_set: ObjHandle) -> Result<VertexSetInfo, CapsError> {
        let (mut gpts, mut dpts) = (0, 0);
        let (mut bound, mut analysis) = (ptr::null_mut(), ptr::null_mut());
        let stat = unsafe { ffi::caps_vertexSetInfo(obj(vertex_set), &mut gpts, &mut dpts, &mut bound, &mut analysis) };
        self.check(stat)?;
        Ok(VertexSetInfo {
            geometry_points: to_len(gpts),
            data_points: to_len(dpts),
            bound: handle(bound)?,
            analysis: ObjHandle::from_ptr(analysis),
        })
    }

    fn fill_unconnected_vertex_set(&self, vertex_set: ObjHandle, xyz: &[[f64; 3]]) -> Result<(), CapsError> {
        let flat: Vec<f64> = xyz.iter().flatten().copied().collect();
        let stat = unsafe { ffi::caps_fillUnVertexSets(obj(vertex_set), count(xyz.len())?, flat.as_ptr()) };
        self.check(stat).map(drop)
    }

    fn make_data_set(&self, vertex_set: ObjHandle, name: &str, method: DataMethod, rank: usize) -> Result<ObjHandle, CapsError> {
        let name = cstring(name)?;
        let mut out = ptr::null_mut();
        let stat =
            unsafe { ffi::caps_makeDataSet(obj(vertex_set), name.as_ptr(), method.as_raw(), count(rank)?, &mut out) };
        self.check(stat)?;
        handle(out)
    }

    fn init_data_set(&self, data_set: ObjHandle, startup: &[f64]) -> Result<(), CapsError> {
        let stat = unsafe { ffi::caps_initDataSet(obj(data_set), count(startup.len())?, startup.as_ptr()) };
        self.check(stat).map(drop)
    }

    fn get_data(&self, data_set: ObjHandle) -> Result<DataSetData, CapsError> {
        let (mut npts, mut rank) = (0, 0);
        let mut data = ptr::null_mut();
        let mut units = ptr::null_mut();
        self.check(unsafe { ffi::caps_getData(obj(data_set), &mut npts, &mut rank, &mut data, &mut units) })?;
        let (npts, rank) = (to_len(npts), to_len(rank));
        let values = if data.is_null() {
            Vec::new()
        } else {
            // SAFETY: data holds npts*rank doubles owned by the DataSet.
            unsafe { std::slice::from_raw_parts(data, npts * rank).to_vec() }
        };
        Ok(DataSetData {
            npts,
            rank,
            data: values,
            units: unsafe { read_str(units) },
        })
    }

    fn set_data(&self, data_set: ObjHandle, data: &DataSetData) -> Result<(), CapsError> {
        let units = opt_cstring(data.units.as_deref())?;
        let stat = unsafe {
            ffi::caps_setData(
                obj(data_set),
                count(data.npts)?,
                count(data.rank)?,
                data.data.as_ptr(),
                opt_ptr(&units),
            )
        };
        self.check(stat).map(drop)
    }

    fn get_data_sets(&self, bound: ObjHandle, name: &str) -> Result<Vec<ObjHandle>, CapsError> {
        let name = cstring(name)?;
        let mut n = 0;
        let mut objs = ptr::null_mut();
        self.check(unsafe { ffi::caps_getDataSets(obj(bound), name.as_ptr(), &mut n, &mut objs) })?;
        Ok(unsafe { Self::take_handles(n, objs) })
    }
}

// ── Units ───────────────────────────────────────────────────────────────

/// The udunits-backed unit calls of libcaps.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeUnits;

impl NativeUnits {
    fn derive(&self, stat: c_int, out: *mut c_char) -> Result<Derived, CapsError> {
        // SAFETY: out is null or an EGADS allocation released here.
        let text = unsafe { take_str(out) };
        if stat != CAPS_SUCCESS {
            return Err(CapsError::new(CAPS_UNITERR).with_message(format!("udunits status {stat}")));
        }
        let text = text.unwrap_or_default();
        Ok(match text.trim().parse::<f64>() {
            Ok(factor) => Derived::Dimensionless(factor),
            Err(_) => Derived::Units(text),
        })
    }
}

impl UnitSystem for NativeUnits {
    fn convert(&self, from: &str, value: f64, to: &str) -> Result<f64, CapsError> {
        let (a, b) = (cstring(from)?, cstring(to)?);
        let mut out = 0.0;
        let stat = unsafe { ffi::caps_convert(a.as_ptr(), value, b.as_ptr(), &mut out) };
        if stat != CAPS_SUCCESS {
            return Err(CapsError::new(CAPS_UNITERR).with_message(format!("cannot convert '{from}' to '{to}'")));
        }
        Ok(out)
    }

    fn multiply(&self, a: &str, b: &str) -> Result<Derived, CapsError> {
        let (ca, cb) = (cstring(a)?, cstring(b)?);
        let mut out = ptr::null_mut();
        let stat = unsafe { ffi::caps_unitMultiply(ca.as_ptr(), cb.as_ptr(), &mut out) };
        self.derive(stat, out)
    }

    fn divide(&self, a: &str, b: &str) -> Result<Derived, CapsError> {
        let (ca, cb) = (cstring(a)?, cstring(b)?);
        let mut out = ptr::null_mut();
        let stat = unsafe { ffi::caps_unitDivide(ca.as_ptr(), cb.as_ptr(), &mut out) };
        self.derive(stat, out)
    }

    fn invert(&self, unit: &str) -> Result<Derived, CapsError> {
        let c = cstring(unit)?;
        let mut out = ptr::null_mut();
        let stat = unsafe { ffi::caps_unitInvert(c.as_ptr(), &mut out) };
        self.derive(stat, out)
    }

    fn raise(&self, unit: &str, power: i32) -> Result<Derived, CapsError> {
        let c = cstring(unit)?;
        let mut out = ptr::null_mut();
        let stat = unsafe { ffi::caps_unitRaise(c.as_ptr(), power, &mut out) };
        self.derive(stat, out)
    }

    fn validate(&self, unit: &str) -> Result<(), CapsError> {
        self.convert(unit, 1.0, unit).map(drop).map_err(|e| {
            warn!(unit, "unit failed to parse");
            e
        })
    }
}

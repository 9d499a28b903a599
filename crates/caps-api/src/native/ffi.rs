//! Raw declarations for libcaps and libegads.
//!
//! Enum arguments travel as `c_int`; the typed enums in caps-types convert
//! with `as_raw`/`from_raw`.

#![allow(non_camel_case_types, non_snake_case)]

use std::os::raw::{c_char, c_double, c_int, c_short, c_ulong, c_void};

/// Opaque `capsObject`.
#[repr(C)]
pub struct capsObject {
    _private: [u8; 0],
}

pub type capsObj = *mut capsObject;

#[repr(C)]
pub struct capsTuple {
    pub name: *mut c_char,
    pub value: *mut c_char,
}

#[repr(C)]
pub struct capsOwn {
    pub pname: *mut c_char,
    pub pID: *mut c_char,
    pub user: *mut c_char,
    pub datetime: [c_short; 6],
    pub sNum: c_ulong,
}

#[repr(C)]
pub struct capsError {
    pub errObj: capsObj,
    pub eType: c_int,
    pub index: c_int,
    pub nLines: c_int,
    pub lines: *mut *mut c_char,
}

#[repr(C)]
pub struct capsErrs {
    pub nError: c_int,
    pub errors: *mut capsError,
}

#[link(name = "egads")]
extern "C" {
    pub fn EG_free(ptr: *mut c_void);
}

#[link(name = "caps")]
extern "C" {
    pub fn caps_revision(major: *mut c_int, minor: *mut c_int);

    pub fn caps_open(filename: *const c_char, pname: *const c_char, pobject: *mut capsObj) -> c_int;
    pub fn caps_close(pobject: capsObj) -> c_int;
    pub fn caps_save(pobject: capsObj, filename: *const c_char) -> c_int;
    pub fn caps_outLevel(pobject: capsObj, outLevel: c_int) -> c_int;
    pub fn caps_writeParameters(pobject: capsObj, filename: *const c_char) -> c_int;
    pub fn caps_readParameters(pobject: capsObj, filename: *const c_char) -> c_int;
    pub fn caps_writeGeometry(
        object: capsObj,
        flag: c_int,
        filename: *const c_char,
        nErr: *mut c_int,
        errors: *mut *mut capsErrs,
    ) -> c_int;

    pub fn caps_info(
        object: capsObj,
        name: *mut *mut c_char,
        otype: *mut c_int,
        stype: *mut c_int,
        link: *mut capsObj,
        parent: *mut capsObj,
        last: *mut capsOwn,
    ) -> c_int;
    pub fn caps_size(
        object: capsObj,
        otype: c_int,
        stype: c_int,
        size: *mut c_int,
        nErr: *mut c_int,
        errors: *mut *mut capsErrs,
    ) -> c_int;
    pub fn caps_childByIndex(object: capsObj, otype: c_int, stype: c_int, index: c_int, child: *mut capsObj) -> c_int;
    pub fn caps_childByName(
        object: capsObj,
        otype: c_int,
        stype: c_int,
        name: *const c_char,
        child: *mut capsObj,
    ) -> c_int;
    pub fn caps_delete(object: capsObj) -> c_int;

    pub fn caps_errorInfo(
        errs: *mut capsErrs,
        eIndex: c_int,
        errObj: *mut capsObj,
        nLines: *mut c_int,
        lines: *mut *mut *mut c_char,
    ) -> c_int;
    pub fn caps_freeError(errs: *mut capsErrs) -> c_int;

    pub fn caps_attrByName(object: capsObj, name: *const c_char, attr: *mut capsObj) -> c_int;
    pub fn caps_attrByIndex(object: capsObj, index: c_int, attr: *mut capsObj) -> c_int;
    pub fn caps_setAttr(object: capsObj, name: *const c_char, attr: capsObj) -> c_int;
    pub fn caps_deleteAttr(object: capsObj, name: *const c_char) -> c_int;

    pub fn caps_makeValue(
        pobject: capsObj,
        vname: *const c_char,
        stype: c_int,
        vtype: c_int,
        nrow: c_int,
        ncol: c_int,
        data: *const c_void,
        partial: *mut c_int,
        units: *const c_char,
        vobj: *mut capsObj,
    ) -> c_int;
    pub fn caps_getValue(
        object: capsObj,
        vtype: *mut c_int,
        nrow: *mut c_int,
        ncol: *mut c_int,
        data: *mut *const c_void,
        partial: *mut *const c_int,
        units: *mut *const c_char,
        nErr: *mut c_int,
        errors: *mut *mut capsErrs,
    ) -> c_int;
    pub fn caps_setValue(
        object: capsObj,
        vtype: c_int,
        nrow: c_int,
        ncol: c_int,
        data: *const c_void,
        partial: *const c_int,
        units: *const c_char,
        nErr: *mut c_int,
        errors: *mut *mut capsErrs,
    ) -> c_int;
    pub fn caps_getLimits(object: capsObj, vtype: *mut c_int, limits: *mut *const c_void, units: *mut *const c_char) -> c_int;
    pub fn caps_setLimits(object: capsObj, vtype: c_int, limits: *mut c_void, units: *const c_char) -> c_int;
    pub fn caps_getValueProps(
        object: capsObj,
        dim: *mut c_int,
        pmtr: *mut c_int,
        lfixed: *mut c_int,
        sfixed: *mut c_int,
        nval: *mut c_int,
    ) -> c_int;
    pub fn caps_setValueProps(object: capsObj, dim: c_int, lfixed: c_int, sfixed: c_int, nval: c_int) -> c_int;
    pub fn caps_convertValue(object: capsObj, inp: c_double, units: *const c_char, outp: *mut c_double) -> c_int;
    pub fn caps_transferValues(
        source: capsObj,
        method: c_int,
        target: capsObj,
        nErr: *mut c_int,
        errors: *mut *mut capsErrs,
    ) -> c_int;
    pub fn caps_makeLinkage(link: capsObj, method: c_int, target: capsObj) -> c_int;
    pub fn caps_hasDot(vobj: capsObj, ndot: *mut c_int, names: *mut *mut *mut c_char) -> c_int;
    pub fn caps_getDot(
        vobj: capsObj,
        name: *const c_char,
        len: *mut c_int,
        rank: *mut c_int,
        dot: *mut *mut c_double,
        nErr: *mut c_int,
        errors: *mut *mut capsErrs,
    ) -> c_int;

    pub fn caps_queryAnalysis(
        pobject: capsObj,
        aname: *const c_char,
        nIn: *mut c_int,
        nOut: *mut c_int,
        execute: *mut c_int,
    ) -> c_int;
    pub fn caps_makeAnalysis(
        pobject: capsObj,
        aname: *const c_char,
        analysisDir: *const c_char,
        unitSys: *const c_char,
        intent: *const c_char,
        nparent: c_int,
        parents: *mut capsObj,
        aobject: *mut capsObj,
    ) -> c_int;
    pub fn caps_analysisInfo(
        aobject: capsObj,
        analysisDir: *mut *mut c_char,
        unitSys: *mut *mut c_char,
        intent: *mut *mut c_char,
        nparent: *mut c_int,
        parents: *mut *mut capsObj,
        nField: *mut c_int,
        fnames: *mut *mut *mut c_char,
        ranks: *mut *mut c_int,
        execute: *mut c_int,
        status: *mut c_int,
    ) -> c_int;
    pub fn caps_preAnalysis(aobject: capsObj, nErr: *mut c_int, errors: *mut *mut capsErrs) -> c_int;
    pub fn caps_runAnalysis(aobject: capsObj, runStatus: *mut c_int, nErr: *mut c_int, errors: *mut *mut capsErrs) -> c_int;
    pub fn caps_postAnalysis(aobject: capsObj, nErr: *mut c_int, errors: *mut *mut capsErrs) -> c_int;
    pub fn caps_dirtyAnalysis(pobject: capsObj, nAobj: *mut c_int, aobjs: *mut *mut capsObj) -> c_int;
    pub fn caps_AIMbackdoor(aobject: capsObj, JSONin: *const c_char, JSONout: *mut *mut c_char) -> c_int;

    pub fn caps_makeBound(pobject: capsObj, dim: c_int, bname: *const c_char, bobj: *mut capsObj) -> c_int;
    pub fn caps_boundInfo(bobject: capsObj, state: *mut c_int, dim: *mut c_int, plims: *mut c_double) -> c_int;
    pub fn caps_completeBound(bobject: capsObj) -> c_int;
    pub fn caps_makeVertexSet(bobject: capsObj, aobject: capsObj, vname: *const c_char, vobj: *mut capsObj) -> c_int;
    pub fn caps_vertexSetInfo(
        vobject: capsObj,
        nGpts: *mut c_int,
        nDpts: *mut c_int,
        bobj: *mut capsObj,
        aobj: *mut capsObj,
    ) -> c_int;
    pub fn caps_fillUnVertexSets(vobject: capsObj, npts: c_int, xyzs: *const c_double) -> c_int;
    pub fn caps_makeDataSet(
        vobject: capsObj,
        dname: *const c_char,
        method: c_int,
        rank: c_int,
        dobj: *mut capsObj,
    ) -> c_int;
    pub fn caps_initDataSet(dobject: capsObj, rank: c_int, startup: *const c_double) -> c_int;
    pub fn caps_getData(
        dobject: capsObj,
        npts: *mut c_int,
        rank: *mut c_int,
        data: *mut *mut c_double,
        units: *mut *mut c_char,
    ) -> c_int;
    pub fn caps_setData(
        dobject: capsObj,
        npts: c_int,
        rank: c_int,
        data: *const c_double,
        units: *const c_char,
    ) -> c_int;
    pub fn caps_getDataSets(bobject: capsObj, dname: *const c_char, nobj: *mut c_int, dobjs: *mut *mut capsObj) -> c_int;

    pub fn caps_convert(inUnit: *const c_char, inVal: c_double, outUnit: *const c_char, outVal: *mut c_double) -> c_int;
    pub fn caps_unitMultiply(inUnits1: *const c_char, inUnits2: *const c_char, outUnits: *mut *mut c_char) -> c_int;
    pub fn caps_unitDivide(inUnits1: *const c_char, inUnits2: *const c_char, outUnits: *mut *mut c_char) -> c_int;
    pub fn caps_unitInvert(inUnit: *const c_char, outUnits: *mut *mut c_char) -> c_int;
    pub fn caps_unitRaise(inUnit: *const c_char, power: c_int, outUnits: *mut *mut c_char) -> c_int;
}

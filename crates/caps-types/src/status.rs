//! Native status codes and the code-to-name lookup table.
//!
//! The EGADS, OpenCSM and CAPS code ranges do not overlap, so one merged
//! table resolves any status returned through the CAPS interface. The
//! built-in entries cover the codes this workspace raises itself; headers
//! shipped with an ESP installation can extend or override them.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

pub const EGADS_OUTSIDE: i32 = 1;
pub const EGADS_SUCCESS: i32 = 0;
pub const EGADS_NOTFOUND: i32 = -1;
pub const EGADS_NULLOBJ: i32 = -2;
pub const EGADS_NOTOBJ: i32 = -3;
pub const EGADS_MALLOC: i32 = -4;
pub const EGADS_INDEXERR: i32 = -5;
pub const EGADS_NONAME: i32 = -6;
pub const EGADS_NODATA: i32 = -7;
pub const EGADS_MIXCNTX: i32 = -8;
pub const EGADS_NOTCNTX: i32 = -9;
pub const EGADS_NOTXFORM: i32 = -10;
pub const EGADS_REFERCE: i32 = -11;
pub const EGADS_NOTTOPO: i32 = -12;
pub const EGADS_EMPTY: i32 = -13;
pub const EGADS_NOTTESS: i32 = -14;
pub const EGADS_NOTGEOM: i32 = -15;
pub const EGADS_RANGERR: i32 = -16;
pub const EGADS_NOLOAD: i32 = -17;
pub const EGADS_NOTMODEL: i32 = -18;
pub const EGADS_WRITERR: i32 = -19;
pub const EGADS_NOTBODY: i32 = -20;
pub const EGADS_GEOMERR: i32 = -21;
pub const EGADS_TOPOERR: i32 = -22;
pub const EGADS_CONSTERR: i32 = -23;
pub const EGADS_DEGEN: i32 = -24;
pub const EGADS_NOTORTHO: i32 = -25;
pub const EGADS_BADSCALE: i32 = -26;
pub const EGADS_OCSEGFLT: i32 = -27;
pub const EGADS_TOPOCNT: i32 = -28;
pub const EGADS_ATTRERR: i32 = -29;
pub const EGADS_EXISTS: i32 = -30;
pub const EGADS_TESSTATE: i32 = -31;
pub const EGADS_READERR: i32 = -32;
pub const EGADS_CNTXTHRD: i32 = -33;
pub const EGADS_SEQUERR: i32 = -34;
pub const EGADS_UVMAP: i32 = -35;
pub const EGADS_EFFCTOBJ: i32 = -36;
pub const EGADS_EXTRAPOL: i32 = -37;

pub const OCSM_FILE_NOT_FOUND: i32 = -201;
pub const OCSM_ILLEGAL_STATEMENT: i32 = -202;
pub const OCSM_NOT_ENOUGH_ARGS: i32 = -203;
pub const OCSM_NAME_ALREADY_DEFINED: i32 = -204;
pub const OCSM_NESTED_TOO_DEEPLY: i32 = -205;
pub const OCSM_IMPROPER_NESTING: i32 = -206;
pub const OCSM_NESTING_NOT_CLOSED: i32 = -207;
pub const OCSM_NOT_MODL_STRUCTURE: i32 = -208;
pub const OCSM_PROBLEM_CREATING_PERTURB: i32 = -209;
pub const OCSM_MISSING_MARK: i32 = -211;
pub const OCSM_INSUFFICIENT_BODYS_ON_STACK: i32 = -212;
pub const OCSM_WRONG_TYPES_ON_STACK: i32 = -213;
pub const OCSM_DID_NOT_CREATE_BODY: i32 = -214;
pub const OCSM_CREATED_TOO_MANY_BODYS: i32 = -215;
pub const OCSM_BODY_NOT_FOUND: i32 = -221;
pub const OCSM_FACE_NOT_FOUND: i32 = -222;
pub const OCSM_EDGE_NOT_FOUND: i32 = -223;
pub const OCSM_NODE_NOT_FOUND: i32 = -224;
pub const OCSM_ILLEGAL_VALUE: i32 = -225;
pub const OCSM_ILLEGAL_ATTRIBUTE: i32 = -226;
pub const OCSM_NAME_NOT_FOUND: i32 = -251;
pub const OCSM_NAME_NOT_UNIQUE: i32 = -252;
pub const OCSM_ILLEGAL_PMTR_INDEX: i32 = -262;
pub const OCSM_ILLEGAL_ARGUMENT: i32 = -267;

pub const CAPS_SUCCESS: i32 = 0;
pub const CAPS_BADRANK: i32 = -301;
pub const CAPS_BADDSETNAME: i32 = -302;
pub const CAPS_NOTFOUND: i32 = -303;
pub const CAPS_BADINDEX: i32 = -304;
pub const CAPS_NOTCHANGED: i32 = -305;
pub const CAPS_BADTYPE: i32 = -306;
pub const CAPS_NULLVALUE: i32 = -307;
pub const CAPS_NULLNAME: i32 = -308;
pub const CAPS_NULLOBJ: i32 = -309;
pub const CAPS_BADOBJECT: i32 = -310;
pub const CAPS_BADVALUE: i32 = -311;
pub const CAPS_PARAMBNDERR: i32 = -312;
pub const CAPS_NOTCONNECT: i32 = -313;
pub const CAPS_NOTPARMTRIC: i32 = -314;
pub const CAPS_READONLYERR: i32 = -315;
pub const CAPS_FIXEDLEN: i32 = -316;
pub const CAPS_BADNAME: i32 = -317;
pub const CAPS_BADMETHOD: i32 = -318;
pub const CAPS_CIRCULARLINK: i32 = -319;
pub const CAPS_UNITERR: i32 = -320;
pub const CAPS_NULLBLIND: i32 = -321;
pub const CAPS_SHAPEERR: i32 = -322;
pub const CAPS_LINKERR: i32 = -323;
pub const CAPS_MISMATCH: i32 = -324;
pub const CAPS_NOTPROBLEM: i32 = -325;
pub const CAPS_RANGEERR: i32 = -326;
pub const CAPS_DIRTY: i32 = -327;
pub const CAPS_HIERARCHERR: i32 = -328;
pub const CAPS_STATEERR: i32 = -329;
pub const CAPS_SOURCEERR: i32 = -330;
pub const CAPS_EXISTS: i32 = -331;
pub const CAPS_IOERR: i32 = -332;
pub const CAPS_DIRERR: i32 = -333;
pub const CAPS_NOTIMPLEMENT: i32 = -334;
pub const CAPS_EXECERR: i32 = -335;
pub const CAPS_CLEAN: i32 = -336;
pub const CAPS_BADINTENT: i32 = -337;

/// OpenCSM headers define many small positive constants; only codes at or
/// below this bound are error statuses.
pub const OCSM_ERROR_BOUND: i32 = -200;

macro_rules! builtin_names {
    ($($code:ident),+ $(,)?) => {
        &[$(($code, stringify!($code))),+]
    };
}

static BUILTIN: &[(i32, &str)] = builtin_names![
    EGADS_OUTSIDE,
    EGADS_NOTFOUND,
    EGADS_NULLOBJ,
    EGADS_NOTOBJ,
    EGADS_MALLOC,
    EGADS_INDEXERR,
    EGADS_NONAME,
    EGADS_NODATA,
    EGADS_MIXCNTX,
    EGADS_NOTCNTX,
    EGADS_NOTXFORM,
    EGADS_REFERCE,
    EGADS_NOTTOPO,
    EGADS_EMPTY,
    EGADS_NOTTESS,
    EGADS_NOTGEOM,
    EGADS_RANGERR,
    EGADS_NOLOAD,
    EGADS_NOTMODEL,
    EGADS_WRITERR,
    EGADS_NOTBODY,
    EGADS_GEOMERR,
    EGADS_TOPOERR,
    EGADS_CONSTERR,
    EGADS_DEGEN,
    EGADS_NOTORTHO,
    EGADS_BADSCALE,
    EGADS_OCSEGFLT,
    EGADS_TOPOCNT,
    EGADS_ATTRERR,
    EGADS_EXISTS,
    EGADS_TESSTATE,
    EGADS_READERR,
    EGADS_CNTXTHRD,
    EGADS_SEQUERR,
    EGADS_UVMAP,
    EGADS_EFFCTOBJ,
    EGADS_EXTRAPOL,
    OCSM_FILE_NOT_FOUND,
    OCSM_ILLEGAL_STATEMENT,
    OCSM_NOT_ENOUGH_ARGS,
    OCSM_NAME_ALREADY_DEFINED,
    OCSM_NESTED_TOO_DEEPLY,
    OCSM_IMPROPER_NESTING,
    OCSM_NESTING_NOT_CLOSED,
    OCSM_NOT_MODL_STRUCTURE,
    OCSM_PROBLEM_CREATING_PERTURB,
    OCSM_MISSING_MARK,
    OCSM_INSUFFICIENT_BODYS_ON_STACK,
    OCSM_WRONG_TYPES_ON_STACK,
    OCSM_DID_NOT_CREATE_BODY,
    OCSM_CREATED_TOO_MANY_BODYS,
    OCSM_BODY_NOT_FOUND,
    OCSM_FACE_NOT_FOUND,
    OCSM_EDGE_NOT_FOUND,
    OCSM_NODE_NOT_FOUND,
    OCSM_ILLEGAL_VALUE,
    OCSM_ILLEGAL_ATTRIBUTE,
    OCSM_NAME_NOT_FOUND,
    OCSM_NAME_NOT_UNIQUE,
    OCSM_ILLEGAL_PMTR_INDEX,
    OCSM_ILLEGAL_ARGUMENT,
    CAPS_SUCCESS,
    CAPS_BADRANK,
    CAPS_BADDSETNAME,
    CAPS_NOTFOUND,
    CAPS_BADINDEX,
    CAPS_NOTCHANGED,
    CAPS_BADTYPE,
    CAPS_NULLVALUE,
    CAPS_NULLNAME,
    CAPS_NULLOBJ,
    CAPS_BADOBJECT,
    CAPS_BADVALUE,
    CAPS_PARAMBNDERR,
    CAPS_NOTCONNECT,
    CAPS_NOTPARMTRIC,
    CAPS_READONLYERR,
    CAPS_FIXEDLEN,
    CAPS_BADNAME,
    CAPS_BADMETHOD,
    CAPS_CIRCULARLINK,
    CAPS_UNITERR,
    CAPS_NULLBLIND,
    CAPS_SHAPEERR,
    CAPS_LINKERR,
    CAPS_MISMATCH,
    CAPS_NOTPROBLEM,
    CAPS_RANGEERR,
    CAPS_DIRTY,
    CAPS_HIERARCHERR,
    CAPS_STATEERR,
    CAPS_SOURCEERR,
    CAPS_EXISTS,
    CAPS_IOERR,
    CAPS_DIRERR,
    CAPS_NOTIMPLEMENT,
    CAPS_EXECERR,
    CAPS_CLEAN,
    CAPS_BADINTENT,
];

/// Name of a built-in status code, if known.
pub fn builtin_name(code: i32) -> Option<&'static str> {
    BUILTIN
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// Merged status-code lookup.
///
/// Built once during session initialization and shared read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ErrorTable {
    names: BTreeMap<i32, String>,
}

impl ErrorTable {
    /// An empty table. Lookups fall through to nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table seeded with the built-in EGADS, OpenCSM and CAPS codes.
    pub fn builtin() -> Self {
        let names = BUILTIN
            .iter()
            .map(|(code, name)| (*code, (*name).to_string()))
            .collect();
        Self { names }
    }

    pub fn name(&self, code: i32) -> Option<&str> {
        self.names.get(&code).map(String::as_str)
    }

    /// Add or replace one entry. Success (0) is always named from CAPS.
    pub fn insert(&mut self, code: i32, name: impl Into<String>) {
        if code == CAPS_SUCCESS {
            return;
        }
        self.names.insert(code, name.into());
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Read `#define NAME <int>` lines out of C header text.
    ///
    /// Lines that are not defines, or whose value is not an integer, are
    /// skipped. With `max_code`, only codes at or below it are taken.
    /// Returns the number of entries added.
    pub fn extend_from_header(&mut self, text: &str, max_code: Option<i32>) -> usize {
        let mut added = 0;
        for line in text.lines() {
            let mut tokens = line.split_whitespace();
            if tokens.next() != Some("#define") {
                continue;
            }
            let (Some(name), Some(value)) = (tokens.next(), tokens.next()) else {
                continue;
            };
            let Ok(code) = value.parse::<i32>() else {
                continue;
            };
            if max_code.is_some_and(|max| code > max) {
                continue;
            }
            self.insert(code, name);
            added += 1;
        }
        added
    }

    /// Like [`extend_from_header`](Self::extend_from_header), reading a file.
    pub fn load_header(&mut self, path: &Path, max_code: Option<i32>) -> io::Result<usize> {
        let text = fs::read_to_string(path)?;
        Ok(self.extend_from_header(&text, max_code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lookup() {
        let table = ErrorTable::builtin();
        assert_eq!(table.name(CAPS_UNITERR), Some("CAPS_UNITERR"));
        assert_eq!(table.name(EGADS_MALLOC), Some("EGADS_MALLOC"));
        assert_eq!(table.name(OCSM_FILE_NOT_FOUND), Some("OCSM_FILE_NOT_FOUND"));
        assert_eq!(table.name(-9999), None);
        assert_eq!(builtin_name(CAPS_SHAPEERR), Some("CAPS_SHAPEERR"));
    }

    #[test]
    fn header_parsing_skips_non_integer_defines() {
        let header = "\
#ifndef CAPSERRORS_H
#define CAPSERRORS_H
#define CAPS_SUCCESS        0
#define CAPS_NEWCODE     -399
#define CAPS_MACRO  (x)
  int unrelated;
";
        let mut table = ErrorTable::new();
        let added = table.extend_from_header(header, None);
        assert_eq!(added, 2);
        assert_eq!(table.name(-399), Some("CAPS_NEWCODE"));
        assert_eq!(table.name(0), None);
    }

    #[test]
    fn header_parsing_respects_bound() {
        let header = "#define OCSM_NODE 600\n#define OCSM_FILE_NOT_FOUND -201\n";
        let mut table = ErrorTable::new();
        table.extend_from_header(header, Some(OCSM_ERROR_BOUND));
        assert_eq!(table.name(600), None);
        assert_eq!(table.name(-201), Some("OCSM_FILE_NOT_FOUND"));
    }
}

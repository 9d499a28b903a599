use crate::status::{builtin_name, ErrorTable, CAPS_SUCCESS};

const RULE_WIDTH: usize = 80;

/// Error raised from a native status code.
///
/// Every fallible call in the workspace surfaces this one type. `name` is
/// the symbolic code name resolved through an [`ErrorTable`], or
/// `UNKNOWN_ERROR` when the code is not in the table.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}", render(.status, .name, .message, .details))]
pub struct CapsError {
    pub status: i32,
    pub name: String,
    pub message: Option<String>,
    pub details: Vec<String>,
}

fn render(status: &i32, name: &str, message: &Option<String>, details: &[String]) -> String {
    let mut out = if name == UNKNOWN {
        format!("CAPS error code {status} (undefined error)")
    } else {
        name.to_string()
    };
    if let Some(message) = message {
        out.push_str(": ");
        out.push_str(message);
    }
    if !details.is_empty() {
        let rule = "=".repeat(RULE_WIDTH);
        out.push_str(":\n");
        out.push_str(&rule);
        out.push('\n');
        for line in details {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&rule);
    }
    out
}

const UNKNOWN: &str = "UNKNOWN_ERROR";

impl CapsError {
    /// Error for `status`, named from the built-in table.
    pub fn new(status: i32) -> Self {
        let name = builtin_name(status).unwrap_or(UNKNOWN).to_string();
        Self {
            status,
            name,
            message: None,
            details: Vec::new(),
        }
    }

    /// Error for `status`, named from a session's merged table.
    pub fn from_status(status: i32, table: &ErrorTable) -> Self {
        let name = table
            .name(status)
            .or_else(|| builtin_name(status))
            .unwrap_or(UNKNOWN)
            .to_string();
        Self {
            status,
            name,
            message: None,
            details: Vec::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_details<I, S>(mut self, details: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.details = details.into_iter().map(Into::into).collect();
        self
    }

    /// Whether this error carries status `code`.
    pub fn is(&self, code: i32) -> bool {
        self.status == code
    }
}

/// Pass through any status at or above `CAPS_SUCCESS`; anything below
/// becomes an error.
pub fn check(status: i32, table: &ErrorTable) -> Result<i32, CapsError> {
    if status >= CAPS_SUCCESS {
        Ok(status)
    } else {
        Err(CapsError::from_status(status, table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{CAPS_BADVALUE, CAPS_UNITERR, EGADS_OUTSIDE};

    #[test]
    fn check_accepts_non_negative() {
        let table = ErrorTable::builtin();
        assert_eq!(check(0, &table), Ok(0));
        assert_eq!(check(EGADS_OUTSIDE, &table), Ok(EGADS_OUTSIDE));
        let err = check(CAPS_UNITERR, &table).unwrap_err();
        assert!(err.is(CAPS_UNITERR));
        assert_eq!(err.name, "CAPS_UNITERR");
    }

    #[test]
    fn display_with_message_and_details() {
        let err = CapsError::new(CAPS_BADVALUE)
            .with_message("List entries must all be same type!")
            .with_details(["first", "second"]);
        let text = err.to_string();
        assert!(text.starts_with("CAPS_BADVALUE: List entries must all be same type!:\n"));
        assert!(text.contains("\nfirst\nsecond\n"));
        assert!(text.ends_with(&"=".repeat(80)));
    }

    #[test]
    fn unknown_code() {
        let err = CapsError::from_status(-12345, &ErrorTable::new());
        assert_eq!(err.name, "UNKNOWN_ERROR");
        assert_eq!(err.to_string(), "CAPS error code -12345 (undefined error)");
    }

    #[test]
    fn session_table_overrides_builtin() {
        let mut table = ErrorTable::builtin();
        table.insert(-399, "CAPS_LATEST");
        assert_eq!(CapsError::from_status(-399, &table).name, "CAPS_LATEST");
    }
}

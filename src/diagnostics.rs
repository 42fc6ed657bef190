use serde::Serialize;

use crate::ir::{FuncRef, Position};

/// A single finding produced by the analysis: a sink call site that may
/// receive a value derived from the clock-read source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[must_use]
pub struct Diagnostic {
    /// Position of the flagged call instruction.
    pub position: Position,
    /// Qualified name of the matched sink function.
    pub callee: String,
    pub message: String,
}

impl Diagnostic {
    /// Build the diagnostic for a sink call reached by the propagator.
    pub fn sink_flow(position: Position, callee: &FuncRef) -> Self {
        let callee = callee.qualified();
        let message = format!(
            "{callee} may use an argument that is a value derived from the clock-read source"
        );
        Self {
            position,
            callee,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::pos;

    #[test]
    fn message_names_the_matched_function() {
        let d = Diagnostic::sink_flow(
            pos("db.go", 31, 13),
            &FuncRef::new("cloud.google.com/go/spanner", "Insert"),
        );
        assert_eq!(d.callee, "cloud.google.com/go/spanner.Insert");
        assert_eq!(
            d.message,
            "cloud.google.com/go/spanner.Insert may use an argument that is a value \
             derived from the clock-read source"
        );
        assert_eq!(d.position.to_string(), "db.go:31:13");
    }
}

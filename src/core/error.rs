use thiserror::Error;

use crate::core::GroupId;

/// Reasons a job attempt is deferred. Both are recoverable: every resource
/// taken during the attempt has been handed back before the error is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("cannot place {requested} GPUs: {unmet} GPUs left unplaced")]
    InfeasibleDemand { requested: u32, unmet: u32 },

    #[error(
        "groups {group_a} and {group_b} need at least {required} circuits but only {matched} could be matched"
    )]
    LinkMinUnreachable {
        group_a: GroupId,
        group_b: GroupId,
        required: u32,
        matched: u32,
    },
}

impl AllocError {
    /// Short machine-friendly tag used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            AllocError::InfeasibleDemand { .. } => "infeasible_demand",
            AllocError::LinkMinUnreachable { .. } => "link_min_unreachable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = AllocError::InfeasibleDemand {
            requested: 4096,
            unmet: 1024,
        };
        assert_eq!(
            err.to_string(),
            "cannot place 4096 GPUs: 1024 GPUs left unplaced"
        );
        assert_eq!(err.kind(), "infeasible_demand");

        let err = AllocError::LinkMinUnreachable {
            group_a: 0,
            group_b: 3,
            required: 1,
            matched: 0,
        };
        assert!(err.to_string().contains("groups 0 and 3"));
        assert_eq!(err.kind(), "link_min_unreachable");
    }
}

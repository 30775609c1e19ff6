//! Stage dependency gate.
//!
//! A stage may run only if every stage it depends on has already been
//! recorded in this run with status `Success`. Stages are walked in declared
//! order, so a dependency declared later is simply missing.

use crate::definition::Stage;
use crate::errors::{EngineError, Result};
use crate::execution::{Execution, NodeStatus};

/// Checks `stage` against the stage records already in `execution`.
///
/// Returns `DependencyNotSatisfied` naming the first dependency that is
/// missing or did not succeed.
pub(crate) fn check(execution: &Execution, stage: &Stage) -> Result<()> {
    for dependency in &stage.depends_on {
        let satisfied = execution
            .stage(dependency)
            .is_some_and(|s| s.status == NodeStatus::Success);
        if !satisfied {
            return Err(EngineError::DependencyNotSatisfied {
                stage: stage.name.clone(),
                dependency: dependency.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{DefinitionKind, DefinitionMeta};
    use crate::execution::{ExecutionParams, StageExecution};

    fn execution_with(stages: Vec<StageExecution>) -> Execution {
        let mut exec = Execution::new(
            DefinitionKind::Pipeline,
            &DefinitionMeta::new("ci"),
            ExecutionParams::manual(),
        );
        exec.stages = stages;
        exec
    }

    fn finished(id: &str, name: &str, status: NodeStatus) -> StageExecution {
        let mut stage = StageExecution::running(id, name);
        stage.status = status;
        stage
    }

    #[test]
    fn test_no_dependencies_always_eligible() {
        assert!(check(&execution_with(vec![]), &Stage::new("build")).is_ok());
    }

    #[test]
    fn test_dependency_by_name_or_id() {
        let exec = execution_with(vec![finished("s-1", "build", NodeStatus::Success)]);

        assert!(check(&exec, &Stage::new("test").depends_on("build")).is_ok());
        assert!(check(&exec, &Stage::new("test").depends_on("s-1")).is_ok());
    }

    #[test]
    fn test_failed_or_skipped_dependency_blocks() {
        for status in [NodeStatus::Failure, NodeStatus::Skipped, NodeStatus::Cancelled] {
            let exec = execution_with(vec![finished("s-1", "build", status)]);
            let err = check(&exec, &Stage::new("test").depends_on("build")).unwrap_err();
            assert_eq!(err.code(), "dependency_not_satisfied");
        }
    }

    #[test]
    fn test_missing_dependency_blocks() {
        let exec = execution_with(vec![finished("s-1", "build", NodeStatus::Success)]);
        let stage = Stage::new("deploy").depends_on("build").depends_on("later");

        match check(&exec, &stage) {
            Err(EngineError::DependencyNotSatisfied { stage, dependency }) => {
                assert_eq!(stage, "deploy");
                assert_eq!(dependency, "later");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

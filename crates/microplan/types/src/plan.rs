use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::{PlanError, PlanResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeAction {
    Create,
    Modify,
    Delete,
}

/// A file a microplan intends to touch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub action: FileChangeAction,
    /// Short description of the change
    #[serde(default)]
    pub what: String,
}

/// One unit of work.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Microplan {
    pub id: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub files: Vec<FileChange>,
    /// How to check the work, e.g. a command or a test name
    #[serde(default)]
    pub verify: String,
}

impl Microplan {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            depends_on: Vec::new(),
            goal: String::new(),
            files: Vec::new(),
            verify: String::new(),
        }
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = goal.into();
        self
    }

    pub fn with_file(mut self, path: impl Into<String>, action: FileChangeAction, what: impl Into<String>) -> Self {
        self.files.push(FileChange {
            path: path.into(),
            action,
            what: what.into(),
        });
        self
    }

    pub fn with_verify(mut self, verify: impl Into<String>) -> Self {
        self.verify = verify.into();
        self
    }
}

/// A task decomposed into microplans.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicroplansDocument {
    #[serde(default)]
    pub task: String,
    pub microplans: Vec<Microplan>,
}

impl MicroplansDocument {
    pub fn new(task: impl Into<String>, microplans: Vec<Microplan>) -> Self {
        Self {
            task: task.into(),
            microplans,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Microplan> {
        self.microplans.iter().find(|m| m.id == id)
    }

    /// Ids present, non-empty and unique; every dependency exists.
    ///
    /// Cycles are checked by the executor, which needs the graph anyway.
    pub fn validate(&self) -> PlanResult<()> {
        if self.microplans.is_empty() {
            return Err(PlanError::EmptyDocument);
        }

        let mut ids = HashSet::new();
        for plan in &self.microplans {
            if plan.id.trim().is_empty() {
                return Err(PlanError::EmptyId);
            }
            if !ids.insert(plan.id.as_str()) {
                return Err(PlanError::DuplicateId(plan.id.clone()));
            }
        }

        for plan in &self.microplans {
            if let Some(missing) = plan.depends_on.iter().find(|d| !ids.contains(d.as_str())) {
                return Err(PlanError::MissingDependency {
                    microplan: plan.id.clone(),
                    dependency: missing.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_document_with_optional_fields_missing() {
        let doc: MicroplansDocument = serde_json::from_str(
            r#"{
                "task": "add login",
                "microplans": [
                    {"id": "a", "depends_on": []},
                    {"id": "b", "depends_on": ["a"], "goal": "wire route",
                     "files": [{"path": "src/routes.ts", "action": "modify", "what": "add /login"}],
                     "verify": "npm test"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(doc.microplans.len(), 2);
        assert_eq!(doc.get("b").unwrap().files[0].action, FileChangeAction::Modify);
        assert!(doc.get("a").unwrap().goal.is_empty());
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn structural_errors() {
        assert_eq!(MicroplansDocument::default().validate(), Err(PlanError::EmptyDocument));

        let dup = MicroplansDocument::new("t", vec![Microplan::new("a"), Microplan::new("a")]);
        assert_eq!(dup.validate(), Err(PlanError::DuplicateId("a".into())));

        let missing = MicroplansDocument::new("t", vec![Microplan::new("a").depends_on(["ghost"])]);
        assert_eq!(
            missing.validate(),
            Err(PlanError::MissingDependency {
                microplan: "a".into(),
                dependency: "ghost".into()
            })
        );

        let blank = MicroplansDocument::new("t", vec![Microplan::new(" ")]);
        assert_eq!(blank.validate(), Err(PlanError::EmptyId));
    }

    #[test]
    fn cycle_error_renders_its_path() {
        let err = PlanError::CycleDetected {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle: a -> b -> a");
    }
}

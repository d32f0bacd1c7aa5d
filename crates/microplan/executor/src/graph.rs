//! Dependency graph checks and topological batching.

use std::collections::{BTreeSet, HashMap};

use microplan_types::{MicroplansDocument, PlanError, PlanResult};

/// `id -> distinct dependency ids`, in document order.
pub(crate) struct PlanGraph<'a> {
    pub order: Vec<&'a str>,
    pub deps: HashMap<&'a str, BTreeSet<&'a str>>,
    pub dependents: HashMap<&'a str, Vec<&'a str>>,
}

impl<'a> PlanGraph<'a> {
    /// Build the graph of a document, rejecting structural errors and cycles.
    pub fn build(doc: &'a MicroplansDocument) -> PlanResult<Self> {
        doc.validate()?;

        let order: Vec<&str> = doc.microplans.iter().map(|m| m.id.as_str()).collect();
        let mut deps: HashMap<&str, BTreeSet<&str>> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for plan in &doc.microplans {
            let set: BTreeSet<&str> = plan.depends_on.iter().map(String::as_str).collect();
            for dep in &set {
                dependents.entry(*dep).or_default().push(plan.id.as_str());
            }
            deps.insert(plan.id.as_str(), set);
        }

        let graph = Self {
            order,
            deps,
            dependents,
        };
        if let Some(path) = graph.find_cycle() {
            return Err(PlanError::CycleDetected { path });
        }
        Ok(graph)
    }

    /// Depth-first search with a recursion stack. Returns the first cycle
    /// found, closed on its starting id.
    fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'g>(
            id: &'g str,
            graph: &PlanGraph<'g>,
            marks: &mut HashMap<&'g str, Mark>,
            stack: &mut Vec<&'g str>,
        ) -> Option<Vec<String>> {
            match marks.get(id) {
                Some(Mark::Done) => return None,
                Some(Mark::Visiting) => {
                    let start = stack.iter().position(|s| *s == id)?;
                    let mut path: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
                    path.push(id.to_string());
                    return Some(path);
                }
                None => {}
            }

            marks.insert(id, Mark::Visiting);
            stack.push(id);
            if let Some(deps) = graph.deps.get(id) {
                for dep in deps {
                    if let Some(cycle) = visit(*dep, graph, marks, stack) {
                        return Some(cycle);
                    }
                }
            }
            stack.pop();
            marks.insert(id, Mark::Done);
            None
        }

        let mut marks = HashMap::new();
        let mut stack = Vec::new();
        self.order
            .iter()
            .find_map(|id| visit(*id, self, &mut marks, &mut stack))
    }

    pub fn in_degrees(&self) -> HashMap<&'a str, usize> {
        self.order
            .iter()
            .map(|id| (*id, self.deps.get(id).map_or(0, BTreeSet::len)))
            .collect()
    }

    pub fn dependents_of(&self, id: &str) -> &[&'a str] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ids of `ids` in document order.
    pub fn sorted(&self, ids: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
        let wanted: BTreeSet<&str> = ids.into_iter().collect();
        self.order
            .iter()
            .copied()
            .filter(|id| wanted.contains(id))
            .collect()
    }
}

/// Group microplans into batches (Kahn's algorithm).
///
/// Every microplan lands in a batch strictly after all of its dependencies.
/// Ids within a batch keep document order. Missing dependencies and cycles
/// are reported before anything else happens.
pub fn topological_sort(doc: &MicroplansDocument) -> PlanResult<Vec<Vec<String>>> {
    let graph = PlanGraph::build(doc)?;
    let mut in_degree = graph.in_degrees();
    let mut ready = graph.sorted(in_degree.iter().filter(|(_, d)| **d == 0).map(|(id, _)| *id));
    let mut batches = Vec::new();

    while !ready.is_empty() {
        let mut next = Vec::new();
        for id in &ready {
            for dependent in graph.dependents_of(id) {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(*dependent);
                    }
                }
            }
        }
        batches.push(ready.iter().map(|s| s.to_string()).collect());
        ready = graph.sorted(next);
    }

    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use microplan_types::Microplan;

    fn doc(plans: Vec<Microplan>) -> MicroplansDocument {
        MicroplansDocument::new("task", plans)
    }

    #[test]
    fn diamond_batches() {
        let d = doc(vec![
            Microplan::new("d").depends_on(["b", "c"]),
            Microplan::new("b").depends_on(["a"]),
            Microplan::new("c").depends_on(["a"]),
            Microplan::new("a"),
        ]);
        assert_eq!(
            topological_sort(&d).unwrap(),
            vec![vec!["a"], vec!["b", "c"], vec!["d"]]
        );
    }

    #[test]
    fn independent_plans_share_the_first_batch() {
        let d = doc(vec![Microplan::new("x"), Microplan::new("y"), Microplan::new("z")]);
        assert_eq!(topological_sort(&d).unwrap(), vec![vec!["x", "y", "z"]]);
    }

    #[test]
    fn repeated_dependency_counts_once() {
        let d = doc(vec![Microplan::new("a"), Microplan::new("b").depends_on(["a", "a"])]);
        assert_eq!(topological_sort(&d).unwrap(), vec![vec!["a"], vec!["b"]]);
    }

    #[test]
    fn cycle_path_is_reported() {
        let d = doc(vec![
            Microplan::new("a"),
            Microplan::new("b").depends_on(["a", "d"]),
            Microplan::new("c").depends_on(["b"]),
            Microplan::new("d").depends_on(["c"]),
        ]);
        assert_eq!(
            topological_sort(&d).unwrap_err(),
            PlanError::CycleDetected {
                path: vec!["b".into(), "d".into(), "c".into(), "b".into()]
            }
        );
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let d = doc(vec![Microplan::new("a").depends_on(["a"])]);
        assert_eq!(
            topological_sort(&d).unwrap_err(),
            PlanError::CycleDetected {
                path: vec!["a".into(), "a".into()]
            }
        );
    }

    #[test]
    fn missing_dependency_is_reported_before_cycles() {
        let d = doc(vec![
            Microplan::new("a").depends_on(["b"]),
            Microplan::new("b").depends_on(["a", "ghost"]),
        ]);
        assert!(matches!(
            topological_sort(&d),
            Err(PlanError::MissingDependency { .. })
        ));
    }
}

//! Node-graph walk: reachability, cycle detection and emission order.

use std::collections::{BTreeMap, BTreeSet};

use stateq_types::Prt;

use crate::error::PrtError;

/// Result of walking a PRT from its root.
#[derive(Debug, Clone, PartialEq)]
pub struct Traversal {
    /// Node indices in reverse postorder: every node comes after all
    /// reachable nodes that can lead into it.
    pub order: Vec<usize>,
    /// Declared nodes the root cannot reach, in declaration order.
    pub orphans: Vec<usize>,
    /// Per node index, the path tokens of predecessor branches that exit
    /// into it.
    pub entries: BTreeMap<usize, Vec<String>>,
}

impl Traversal {
    pub fn root(&self) -> Option<usize> {
        self.order.first().copied()
    }
}

/// Path token recorded when `node` takes its `outcome` branch.
pub fn path_token(node: &str, outcome: bool) -> String {
    format!("{node}-{}", if outcome { "T" } else { "F" })
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Depth-first walk from the root.
///
/// Fails on the first structural fault: a missing root, a branch exiting
/// to an undeclared node, or a node revisited along one path.
pub fn walk(prt: &Prt) -> Result<Traversal, PrtError> {
    let mut index = BTreeMap::new();
    for (i, node) in prt.nodes.iter().enumerate() {
        if index.insert(node.name.as_str(), i).is_some() {
            return Err(PrtError::DuplicateNode(node.name.clone()));
        }
    }
    let root = *index.get(prt.root.as_str()).ok_or_else(|| PrtError::MissingRoot {
        root: prt.root.clone(),
    })?;

    // Successor indices per node: true branch first, then false.
    let mut successors = Vec::with_capacity(prt.nodes.len());
    for node in &prt.nodes {
        let mut next = Vec::new();
        for outcome in [true, false] {
            if let Some(target) = node.branch(outcome).exit.node_target() {
                let t = *index.get(target).ok_or_else(|| PrtError::UnknownExitTarget {
                    node: node.name.clone(),
                    target: target.to_string(),
                })?;
                next.push((outcome, t));
            }
        }
        successors.push(next);
    }

    let mut marks = vec![Mark::Unvisited; prt.nodes.len()];
    let mut postorder = Vec::with_capacity(prt.nodes.len());
    // (node, next successor to try)
    let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
    marks[root] = Mark::OnStack;

    while let Some(frame) = stack.last_mut() {
        let (node, cursor) = *frame;
        match successors[node].get(cursor) {
            Some(&(_, next)) => {
                frame.1 += 1;
                match marks[next] {
                    Mark::Unvisited => {
                        marks[next] = Mark::OnStack;
                        stack.push((next, 0));
                    }
                    Mark::OnStack => {
                        let start = stack.iter().position(|(n, _)| *n == next).unwrap_or(0);
                        let mut path: Vec<String> = stack[start..]
                            .iter()
                            .map(|(n, _)| prt.nodes[*n].name.clone())
                            .collect();
                        path.push(prt.nodes[next].name.clone());
                        return Err(PrtError::Cycle { path });
                    }
                    Mark::Done => {}
                }
            }
            None => {
                marks[node] = Mark::Done;
                postorder.push(node);
                stack.pop();
            }
        }
    }

    let order: Vec<usize> = postorder.into_iter().rev().collect();
    let reachable: BTreeSet<usize> = order.iter().copied().collect();
    let orphans = (0..prt.nodes.len()).filter(|i| !reachable.contains(i)).collect();

    let mut entries: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for &from in &order {
        for &(outcome, to) in &successors[from] {
            entries
                .entry(to)
                .or_default()
                .push(path_token(&prt.nodes[from].name, outcome));
        }
    }

    Ok(Traversal {
        order,
        orphans,
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stateq_types::{Branch, Exit, PrtNode, ScoreMode};

    fn exit(target: Option<&str>) -> Branch {
        Branch {
            exit: match target {
                Some(t) => Exit::Node { target: t.into() },
                None => Exit::End,
            },
            ..Branch::default()
        }
    }

    fn node(name: &str, on_true: Option<&str>, on_false: Option<&str>) -> PrtNode {
        PrtNode {
            name: name.into(),
            test: "AlgEquiv".into(),
            sans: "ans1".into(),
            tans: "1".into(),
            options: String::new(),
            quiet: false,
            true_branch: exit(on_true),
            false_branch: exit(on_false),
        }
    }

    fn prt(root: &str, nodes: Vec<PrtNode>) -> Prt {
        Prt {
            name: "p".into(),
            value: 1.0,
            scoremode: ScoreMode::First,
            feedback_variables: String::new(),
            root: root.into(),
            nodes,
        }
    }

    fn names(p: &Prt, order: &[usize]) -> Vec<String> {
        order.iter().map(|i| p.nodes[*i].name.clone()).collect()
    }

    #[test]
    fn test_diamond_order_puts_join_last() {
        let p = prt(
            "r",
            vec![
                node("j", None, None),
                node("r", Some("a"), Some("b")),
                node("a", Some("j"), None),
                node("b", Some("j"), None),
            ],
        );
        let t = walk(&p).unwrap();
        assert_eq!(names(&p, &t.order), vec!["r", "b", "a", "j"]);
        assert_eq!(t.root(), Some(1));
        assert_eq!(t.entries[&0], vec!["b-T".to_string(), "a-T".to_string()]);
        assert!(t.orphans.is_empty());
    }

    #[test]
    fn test_two_node_cycle() {
        let p = prt("a", vec![node("a", Some("b"), None), node("b", Some("a"), None)]);
        assert_eq!(
            walk(&p),
            Err(PrtError::Cycle {
                path: vec!["a".into(), "b".into(), "a".into()]
            })
        );
    }

    #[test]
    fn test_self_loop() {
        let p = prt("a", vec![node("a", None, Some("a"))]);
        assert!(matches!(walk(&p), Err(PrtError::Cycle { .. })));
    }

    #[test]
    fn test_orphans_are_reported() {
        let p = prt("a", vec![node("a", None, None), node("lost", Some("a"), None)]);
        let t = walk(&p).unwrap();
        assert_eq!(t.order, vec![0]);
        assert_eq!(t.orphans, vec![1]);
    }

    #[test]
    fn test_missing_root_and_unknown_target() {
        let p = prt("nope", vec![node("a", None, None)]);
        assert_eq!(walk(&p), Err(PrtError::MissingRoot { root: "nope".into() }));

        let p = prt("a", vec![node("a", Some("ghost"), None)]);
        assert_eq!(
            walk(&p),
            Err(PrtError::UnknownExitTarget {
                node: "a".into(),
                target: "ghost".into()
            })
        );
    }
}

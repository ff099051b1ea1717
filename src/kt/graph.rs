//! Prerequisite DAG over skills.
//!
//! Skills are stored in an arena sorted by id, so arena index order is
//! identity order and topological ties can be broken on indices alone.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

use crate::kt::error::KtError;
use crate::kt::types::{Skill, SkillId};

#[derive(Debug, Clone)]
pub struct SkillNode {
    pub id: SkillId,
    pub name: String,
    pub code: String,
    pub grade_level: u32,
}

#[derive(Debug, Clone)]
pub struct PrerequisiteGraph {
    nodes: Vec<SkillNode>,
    index: HashMap<SkillId, usize>,
    /// `(prerequisite, dependent)` pairs.
    edges: Vec<(usize, usize)>,
    prerequisites: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    topo: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

impl PrerequisiteGraph {
    pub fn build(skills: &[Skill]) -> Result<Self, KtError> {
        let mut sorted: Vec<&Skill> = skills.iter().collect();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));

        let mut index = HashMap::with_capacity(sorted.len());
        for (i, skill) in sorted.iter().enumerate() {
            if index.insert(skill.id.clone(), i).is_some() {
                return Err(KtError::DuplicateSkill(skill.id.clone()));
            }
        }

        let n = sorted.len();
        let mut prerequisites = vec![Vec::new(); n];
        let mut dependents = vec![Vec::new(); n];
        let mut edges = Vec::new();
        for (i, skill) in sorted.iter().enumerate() {
            let mut seen = HashSet::new();
            for prereq in &skill.prerequisites {
                let &p = index.get(prereq).ok_or_else(|| KtError::UnknownPrerequisite {
                    skill: skill.id.clone(),
                    prerequisite: prereq.clone(),
                })?;
                if seen.insert(p) {
                    prerequisites[i].push(p);
                    dependents[p].push(i);
                    edges.push((p, i));
                }
            }
            prerequisites[i].sort_unstable();
        }
        for list in &mut dependents {
            list.sort_unstable();
        }

        let nodes: Vec<SkillNode> = sorted
            .iter()
            .map(|s| SkillNode {
                id: s.id.clone(),
                name: s.name.clone(),
                code: s.code.clone(),
                grade_level: s.grade_level,
            })
            .collect();

        if let Some(cycle) = find_cycle(&prerequisites) {
            return Err(KtError::CyclicPrerequisite {
                cycle: cycle.into_iter().map(|i| nodes[i].id.clone()).collect(),
            });
        }

        let topo = linearize(&prerequisites, &dependents);

        Ok(Self {
            nodes,
            index,
            edges,
            prerequisites,
            dependents,
            topo,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, skill: &SkillId) -> bool {
        self.index.contains_key(skill)
    }

    pub fn node(&self, skill: &SkillId) -> Option<&SkillNode> {
        self.index.get(skill).map(|&i| &self.nodes[i])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &SkillNode> {
        self.nodes.iter()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn prerequisites_of(&self, skill: &SkillId) -> Result<BTreeSet<&SkillId>, KtError> {
        let i = self.index_of(skill)?;
        Ok(self.prerequisites[i].iter().map(|&p| &self.nodes[p].id).collect())
    }

    pub fn dependents_of(&self, skill: &SkillId) -> Result<BTreeSet<&SkillId>, KtError> {
        let i = self.index_of(skill)?;
        Ok(self.dependents[i].iter().map(|&d| &self.nodes[d].id).collect())
    }

    /// Transitive prerequisites of `skill`, excluding itself.
    pub fn ancestors_of(&self, skill: &SkillId) -> Result<BTreeSet<&SkillId>, KtError> {
        let start = self.index_of(skill)?;
        let mut seen = vec![false; self.nodes.len()];
        let mut stack: Vec<usize> = self.prerequisites[start].clone();
        let mut out = BTreeSet::new();
        while let Some(i) = stack.pop() {
            if std::mem::replace(&mut seen[i], true) {
                continue;
            }
            out.insert(&self.nodes[i].id);
            stack.extend(self.prerequisites[i].iter().copied());
        }
        Ok(out)
    }

    /// True iff `to` transitively requires `from`.
    pub fn is_reachable(&self, from: &SkillId, to: &SkillId) -> Result<bool, KtError> {
        let from = self.index_of(from)?;
        let to = self.index_of(to)?;
        if from == to {
            return Ok(false);
        }
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = self.dependents[from].clone();
        while let Some(i) = stack.pop() {
            if i == to {
                return Ok(true);
            }
            if std::mem::replace(&mut seen[i], true) {
                continue;
            }
            stack.extend(self.dependents[i].iter().copied());
        }
        Ok(false)
    }

    pub fn is_ready(&self, skill: &SkillId, mastered: &HashSet<SkillId>) -> Result<bool, KtError> {
        let i = self.index_of(skill)?;
        Ok(self.prerequisites[i]
            .iter()
            .all(|&p| mastered.contains(&self.nodes[p].id)))
    }

    /// Any valid linearization; ties broken by ascending skill id.
    pub fn topological_order(&self) -> Vec<&SkillId> {
        self.topo.iter().map(|&i| &self.nodes[i].id).collect()
    }

    fn index_of(&self, skill: &SkillId) -> Result<usize, KtError> {
        self.index
            .get(skill)
            .copied()
            .ok_or_else(|| KtError::UnknownSkill(skill.clone()))
    }
}

/// Depth-first search over prerequisite edges. Returns the first cycle found
/// as a closed chain (first node repeated at the end).
fn find_cycle(prerequisites: &[Vec<usize>]) -> Option<Vec<usize>> {
    let mut marks = vec![Mark::Unvisited; prerequisites.len()];

    for start in 0..prerequisites.len() {
        if marks[start] != Mark::Unvisited {
            continue;
        }
        marks[start] = Mark::InProgress;
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];

        while let Some(frame) = stack.last_mut() {
            let (node, cursor) = *frame;
            match prerequisites[node].get(cursor) {
                Some(&next) => {
                    frame.1 += 1;
                    match marks[next] {
                        Mark::Unvisited => {
                            marks[next] = Mark::InProgress;
                            stack.push((next, 0));
                        }
                        Mark::InProgress => {
                            let from = stack.iter().position(|&(n, _)| n == next).unwrap_or(0);
                            let mut cycle: Vec<usize> = stack[from..].iter().map(|&(n, _)| n).collect();
                            cycle.push(next);
                            return Some(cycle);
                        }
                        Mark::Done => {}
                    }
                }
                None => {
                    marks[node] = Mark::Done;
                    stack.pop();
                }
            }
        }
    }

    None
}

fn linearize(prerequisites: &[Vec<usize>], dependents: &[Vec<usize>]) -> Vec<usize> {
    let mut in_degree: Vec<usize> = prerequisites.iter().map(Vec::len).collect();
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|&(_, &d)| d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(prerequisites.len());
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &d in &dependents[i] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                ready.push(Reverse(d));
            }
        }
    }
    order
}

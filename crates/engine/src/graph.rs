//! Step graph validation and compilation; run before storing a workflow.
//!
//! Rules enforced:
//! 1. Step IDs must be unique within the workflow.
//! 2. Every `next_step_id` / `on_error_step_id` must name an existing step.
//!
//! Successor IDs are resolved to indices into the workflow's step list, so a
//! compiled workflow can never hit a dangling reference at run time. Cycles
//! are allowed; the per-execution step ceiling bounds them.

use std::collections::{HashMap, HashSet, VecDeque};

use steps::Step;
use tracing::warn;

use crate::models::Workflow;
use crate::EngineError;

/// Resolved successors of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepLinks {
    pub next: Option<usize>,
    pub on_error: Option<usize>,
}

/// The step graph of a workflow as indices into its step list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepGraph {
    index: HashMap<String, usize>,
    links: Vec<StepLinks>,
}

impl StepGraph {
    /// Index of the entry step, `None` for a workflow without steps.
    pub fn entry(&self) -> Option<usize> {
        (!self.links.is_empty()).then_some(0)
    }

    pub fn links(&self, position: usize) -> StepLinks {
        self.links[position]
    }

    pub fn position(&self, step_id: &str) -> Option<usize> {
        self.index.get(step_id).copied()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Positions reachable from the entry step, in breadth-first order.
    pub fn reachable(&self) -> Vec<usize> {
        let mut seen = vec![false; self.links.len()];
        let mut order = Vec::with_capacity(self.links.len());
        let mut queue: VecDeque<usize> = self.entry().into_iter().collect();

        while let Some(position) = queue.pop_front() {
            if std::mem::replace(&mut seen[position], true) {
                continue;
            }
            order.push(position);
            let links = self.links[position];
            queue.extend(links.next.into_iter().chain(links.on_error));
        }

        order
    }

    /// `true` if following successors can revisit a step.
    pub fn has_cycle(&self) -> bool {
        // Kahn's algorithm: anything left unsorted sits on a cycle.
        let mut in_degree = vec![0usize; self.links.len()];
        for links in &self.links {
            for target in links.next.into_iter().chain(links.on_error) {
                in_degree[target] += 1;
            }
        }

        let mut queue: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(i, _)| i)
            .collect();
        let mut sorted = 0usize;

        while let Some(position) = queue.pop_front() {
            sorted += 1;
            let links = self.links[position];
            for target in links.next.into_iter().chain(links.on_error) {
                in_degree[target] -= 1;
                if in_degree[target] == 0 {
                    queue.push_back(target);
                }
            }
        }

        sorted != self.links.len()
    }
}

/// Validate a step list and resolve its successor references.
///
/// # Errors
/// - [`EngineError::DuplicateStepId`] if two steps share an ID.
/// - [`EngineError::UnknownStepReference`] if a successor names a missing step.
pub fn validate_steps(steps: &[Step]) -> Result<StepGraph, EngineError> {
    // -----------------------------------------------------------------------
    // 1. Ensure step IDs are unique
    // -----------------------------------------------------------------------
    let mut seen_ids: HashSet<&str> = HashSet::with_capacity(steps.len());
    for step in steps {
        if !seen_ids.insert(step.id.as_str()) {
            return Err(EngineError::DuplicateStepId(step.id.clone()));
        }
    }

    let index: HashMap<String, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.clone(), i))
        .collect();

    // -----------------------------------------------------------------------
    // 2. Resolve successor references
    // -----------------------------------------------------------------------
    let resolve = |step: &Step, reference: &Option<String>, field: &'static str| {
        reference
            .as_deref()
            .map(|target| {
                index
                    .get(target)
                    .copied()
                    .ok_or_else(|| EngineError::UnknownStepReference {
                        step_id: step.id.clone(),
                        reference: target.to_owned(),
                        field,
                    })
            })
            .transpose()
    };

    let links = steps
        .iter()
        .map(|step| {
            Ok(StepLinks {
                next: resolve(step, &step.next_step_id, "nextStepId")?,
                on_error: resolve(step, &step.on_error_step_id, "onErrorStepId")?,
            })
        })
        .collect::<Result<Vec<_>, EngineError>>()?;

    Ok(StepGraph { index, links })
}

/// A workflow together with its resolved step graph.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledWorkflow {
    workflow: Workflow,
    graph: StepGraph,
}

impl CompiledWorkflow {
    pub fn compile(workflow: Workflow) -> Result<Self, EngineError> {
        let graph = validate_steps(&workflow.steps)?;
        if graph.has_cycle() {
            warn!(
                workflow_id = %workflow.id,
                "workflow step graph contains a cycle; executions are bounded by the step limit"
            );
        }
        Ok(Self { workflow, graph })
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn graph(&self) -> &StepGraph {
        &self.graph
    }

    pub fn step(&self, position: usize) -> &Step {
        &self.workflow.steps[position]
    }
}

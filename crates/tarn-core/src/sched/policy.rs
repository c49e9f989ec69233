// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The waiting and dispatch queues.
//!
//! A queued task is in exactly one of two places:
//! - **waiting**: at least one argument object is not resident on this node
//! - **dispatch**: all arguments are resident, but no worker owns the task yet
//!
//! Both queues are FIFO in submission order. Assignment only ever considers
//! the head of the dispatch queue; a head whose resource demand cannot be met
//! blocks everything behind it, which keeps wide tasks from starving.

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;

use tarn_protocol::task::{ActorId, IdError, ObjectId, ResourceVector, TaskId, TaskSpec};

/// Where a submitted task was queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Waiting,
    Dispatch,
}

/// The task is already queued; a task id appears at most once.
#[derive(Debug, Error)]
#[error("task {0} is already queued")]
pub struct AlreadyQueued(pub TaskId);

/// A task known to the queues, with its ids parsed once at submission.
#[derive(Debug, Clone)]
pub struct PendingTask {
    pub spec: TaskSpec,
    pub task_id: TaskId,
    pub args: Vec<ObjectId>,
    pub demand: ResourceVector,
    pub actor: Option<ActorId>,
    /// Argument objects not currently in LocalObjects. Maintained by the
    /// policy; empty iff the task is dispatchable.
    missing: HashSet<ObjectId>,
}

impl PendingTask {
    /// Parse a wire spec. Fails on malformed ids, which callers treat as a
    /// protocol violation by the submitting worker.
    pub fn from_spec(spec: TaskSpec) -> Result<Self, IdError> {
        let task_id = spec.task_id()?;
        let args = spec.arg_ids()?;
        let actor = spec.actor()?;
        let demand = spec.demand();
        Ok(Self {
            spec,
            task_id,
            args,
            demand,
            actor,
            missing: HashSet::new(),
        })
    }
}

/// Queue state plus the set of locally resident objects.
#[derive(Debug, Default)]
pub struct SchedulingPolicy {
    waiting: VecDeque<TaskId>,
    dispatch: VecDeque<TaskId>,
    tasks: HashMap<TaskId, PendingTask>,
    local_objects: HashSet<ObjectId>,
    /// Queued tasks by argument object, for promotion/demotion.
    dependents: HashMap<ObjectId, HashSet<TaskId>>,
}

impl SchedulingPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_waiting(&self) -> usize {
        self.waiting.len()
    }

    pub fn num_dispatch(&self) -> usize {
        self.dispatch.len()
    }

    pub fn contains(&self, task_id: TaskId) -> bool {
        self.tasks.contains_key(&task_id)
    }

    pub fn is_local(&self, object_id: ObjectId) -> bool {
        self.local_objects.contains(&object_id)
    }

    pub fn num_local_objects(&self) -> usize {
        self.local_objects.len()
    }

    /// Queue a task according to the availability of its arguments.
    pub fn submit(&mut self, mut task: PendingTask) -> Result<Placement, AlreadyQueued> {
        if self.tasks.contains_key(&task.task_id) {
            return Err(AlreadyQueued(task.task_id));
        }
        let task_id = task.task_id;
        task.missing = task
            .args
            .iter()
            .copied()
            .filter(|arg| !self.local_objects.contains(arg))
            .collect();
        for arg in &task.args {
            self.dependents.entry(*arg).or_default().insert(task_id);
        }
        let placement = if task.missing.is_empty() {
            self.dispatch.push_back(task_id);
            Placement::Dispatch
        } else {
            self.waiting.push_back(task_id);
            Placement::Waiting
        };
        self.tasks.insert(task_id, task);
        Ok(placement)
    }

    /// An object became resident. Every waiting task whose last missing
    /// argument this was moves to the dispatch queue; the move preserves
    /// waiting-queue order. Returns the promoted task ids.
    pub fn object_available(&mut self, object_id: ObjectId) -> Vec<TaskId> {
        self.local_objects.insert(object_id);
        let Some(deps) = self.dependents.get(&object_id) else {
            return Vec::new();
        };
        let deps = deps.clone();

        let mut promoted = Vec::new();
        for task_id in self.waiting.iter().copied() {
            if !deps.contains(&task_id) {
                continue;
            }
            let task = self
                .tasks
                .get_mut(&task_id)
                .expect("queued task has a record");
            task.missing.remove(&object_id);
            if task.missing.is_empty() {
                promoted.push(task_id);
            }
        }
        if !promoted.is_empty() {
            self.waiting.retain(|task_id| !promoted.contains(task_id));
            for task_id in &promoted {
                self.dispatch.push_back(*task_id);
            }
        }
        promoted
    }

    /// An object was evicted. Dispatch-queue tasks depending on it move back
    /// to the waiting queue. Tasks already running are not the policy's
    /// concern — their ongoing execution is the authoritative reference.
    /// Returns the demoted task ids.
    pub fn object_removed(&mut self, object_id: ObjectId) -> Vec<TaskId> {
        self.local_objects.remove(&object_id);
        let Some(deps) = self.dependents.get(&object_id) else {
            return Vec::new();
        };
        let deps = deps.clone();

        for task_id in &deps {
            if let Some(task) = self.tasks.get_mut(task_id) {
                task.missing.insert(object_id);
            }
        }

        let mut demoted = Vec::new();
        self.dispatch.retain(|task_id| {
            if deps.contains(task_id) {
                demoted.push(*task_id);
                false
            } else {
                true
            }
        });
        for task_id in &demoted {
            self.waiting.push_back(*task_id);
        }
        demoted
    }

    /// The head of the dispatch queue, if any. Assignment never looks past
    /// the head.
    pub fn peek_dispatch_head(&self) -> Option<&PendingTask> {
        let task_id = self.dispatch.front()?;
        self.tasks.get(task_id)
    }

    /// Remove and return the head of the dispatch queue.
    pub fn pop_dispatch_head(&mut self) -> Option<PendingTask> {
        let task_id = self.dispatch.pop_front()?;
        Some(self.remove_record(task_id))
    }

    fn remove_record(&mut self, task_id: TaskId) -> PendingTask {
        let task = self
            .tasks
            .remove(&task_id)
            .expect("queued task has a record");
        for arg in &task.args {
            if let Some(set) = self.dependents.get_mut(arg) {
                set.remove(&task_id);
                if set.is_empty() {
                    self.dependents.remove(arg);
                }
            }
        }
        task
    }

    /// Check the queue invariants. Test-only: the operations above maintain
    /// these by construction.
    #[cfg(test)]
    fn check_invariants(&self) {
        use std::collections::BTreeSet;

        let waiting: BTreeSet<TaskId> = self.waiting.iter().copied().collect();
        let dispatch: BTreeSet<TaskId> = self.dispatch.iter().copied().collect();
        assert_eq!(waiting.len(), self.waiting.len(), "duplicate in waiting");
        assert_eq!(dispatch.len(), self.dispatch.len(), "duplicate in dispatch");
        assert!(
            waiting.is_disjoint(&dispatch),
            "task in both waiting and dispatch"
        );

        let queued: BTreeSet<TaskId> = waiting.union(&dispatch).copied().collect();
        let recorded: BTreeSet<TaskId> = self.tasks.keys().copied().collect();
        assert_eq!(queued, recorded, "queue membership out of sync with records");

        for task_id in &waiting {
            let task = &self.tasks[task_id];
            assert!(
                task.args.iter().any(|a| !self.local_objects.contains(a)),
                "waiting task has all arguments available"
            );
            assert!(!task.missing.is_empty());
        }
        for task_id in &dispatch {
            let task = &self.tasks[task_id];
            assert!(
                task.args.iter().all(|a| self.local_objects.contains(a)),
                "dispatch task has an unavailable argument"
            );
            assert!(task.missing.is_empty());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::resources::ResourceLedger;
    use tarn_protocol::task::{SpecBuilder, ID_SIZE};

    fn oid(n: u8) -> ObjectId {
        let mut bytes = [0u8; ID_SIZE];
        bytes[0] = n;
        ObjectId::from_bytes(bytes)
    }

    fn example_task(name: &str, args: &[ObjectId]) -> PendingTask {
        example_task_with_resources(name, args, 1, 0)
    }

    fn example_task_with_resources(
        name: &str,
        args: &[ObjectId],
        cpus: u32,
        gpus: u32,
    ) -> PendingTask {
        let spec = SpecBuilder::new(b"test-driver")
            .function(name.as_bytes())
            .args(args)
            .resources(cpus, gpus)
            .finish();
        PendingTask::from_spec(spec).unwrap()
    }

    /// Emulates the engine's assignment loop with `idle` interchangeable
    /// plain workers: pop the head while it fits and a worker is free.
    fn try_dispatch(
        policy: &mut SchedulingPolicy,
        ledger: &mut ResourceLedger,
        idle: &mut usize,
    ) -> Vec<TaskId> {
        let mut assigned = Vec::new();
        loop {
            let Some(head) = policy.peek_dispatch_head() else {
                break;
            };
            if *idle == 0 || !ledger.fits(head.demand) {
                break;
            }
            let task = policy.pop_dispatch_head().unwrap();
            assert!(ledger.debit(task.demand));
            *idle -= 1;
            assigned.push(task.task_id);
        }
        policy.check_invariants();
        assigned
    }

    #[test]
    fn test_single_dependency_staging() {
        let mut policy = SchedulingPolicy::new();
        let mut ledger = ResourceLedger::new(ResourceVector::new(4, 0));
        let mut idle = 1;

        // Submitted with its input unavailable: waits.
        let task = example_task("t", &[oid(1)]);
        let task_id = task.task_id;
        assert_eq!(policy.submit(task).unwrap(), Placement::Waiting);
        policy.check_invariants();
        assert_eq!((policy.num_waiting(), policy.num_dispatch()), (1, 0));

        // Input arrives: moves to dispatch.
        assert_eq!(policy.object_available(oid(1)), vec![task_id]);
        policy.check_invariants();
        assert_eq!((policy.num_waiting(), policy.num_dispatch()), (0, 1));

        // Worker arrives: assigned.
        assert_eq!(try_dispatch(&mut policy, &mut ledger, &mut idle), vec![task_id]);
        assert_eq!((policy.num_waiting(), policy.num_dispatch()), (0, 0));
    }

    #[test]
    fn test_worker_before_input_keeps_task_waiting() {
        let mut policy = SchedulingPolicy::new();
        let mut ledger = ResourceLedger::new(ResourceVector::new(4, 0));
        let mut idle = 1;

        let task = example_task("t", &[oid(1)]);
        let task_id = task.task_id;
        policy.submit(task).unwrap();

        // A worker is available but the input is not.
        assert!(try_dispatch(&mut policy, &mut ledger, &mut idle).is_empty());
        assert_eq!((policy.num_waiting(), policy.num_dispatch()), (1, 0));

        // Input arrival makes the pending worker pick the task up.
        assert_eq!(policy.object_available(oid(1)), vec![task_id]);
        assert_eq!(try_dispatch(&mut policy, &mut ledger, &mut idle), vec![task_id]);
        assert_eq!((policy.num_waiting(), policy.num_dispatch()), (0, 0));
    }

    #[test]
    fn test_dispatch_demotion_on_eviction() {
        let mut policy = SchedulingPolicy::new();
        let mut ledger = ResourceLedger::new(ResourceVector::new(4, 0));
        let mut idle = 1;

        policy.object_available(oid(1));
        let task = example_task("t", &[oid(1)]);
        let task_id = task.task_id;
        assert_eq!(policy.submit(task).unwrap(), Placement::Dispatch);
        assert_eq!((policy.num_waiting(), policy.num_dispatch()), (0, 1));

        // Eviction demotes the dispatchable task.
        assert_eq!(policy.object_removed(oid(1)), vec![task_id]);
        policy.check_invariants();
        assert_eq!((policy.num_waiting(), policy.num_dispatch()), (1, 0));

        // Re-sealing promotes it again, and a worker drains it.
        assert_eq!(policy.object_available(oid(1)), vec![task_id]);
        assert_eq!((policy.num_waiting(), policy.num_dispatch()), (0, 1));
        assert_eq!(try_dispatch(&mut policy, &mut ledger, &mut idle), vec![task_id]);
        assert_eq!((policy.num_waiting(), policy.num_dispatch()), (0, 0));
    }

    #[test]
    fn test_multi_dependency_staging() {
        let mut policy = SchedulingPolicy::new();
        let mut ledger = ResourceLedger::new(ResourceVector::new(4, 0));
        let mut idle = 1;

        let task = example_task("t", &[oid(1), oid(2)]);
        let task_id = task.task_id;
        policy.submit(task).unwrap();
        assert_eq!((policy.num_waiting(), policy.num_dispatch()), (1, 0));

        // One of two inputs is not enough.
        assert!(policy.object_available(oid(2)).is_empty());
        assert_eq!((policy.num_waiting(), policy.num_dispatch()), (1, 0));

        // Both inputs: dispatchable, then assigned.
        assert_eq!(policy.object_available(oid(1)), vec![task_id]);
        assert_eq!((policy.num_waiting(), policy.num_dispatch()), (0, 1));
        assert_eq!(try_dispatch(&mut policy, &mut ledger, &mut idle), vec![task_id]);
        assert_eq!((policy.num_waiting(), policy.num_dispatch()), (0, 0));
    }

    #[test]
    fn test_multi_dependency_eviction_cycles() {
        let mut policy = SchedulingPolicy::new();

        policy.object_available(oid(1));
        policy.object_available(oid(2));
        let task = example_task("t", &[oid(1), oid(2)]);
        let task_id = task.task_id;
        assert_eq!(policy.submit(task).unwrap(), Placement::Dispatch);

        // Any single eviction demotes; further evictions keep it waiting.
        assert_eq!(policy.object_removed(oid(1)), vec![task_id]);
        assert_eq!((policy.num_waiting(), policy.num_dispatch()), (1, 0));
        assert!(policy.object_removed(oid(2)).is_empty());
        assert_eq!((policy.num_waiting(), policy.num_dispatch()), (1, 0));

        // One input back: still waiting. Flapping the same input changes
        // nothing. Only the full set promotes.
        assert!(policy.object_available(oid(2)).is_empty());
        assert_eq!((policy.num_waiting(), policy.num_dispatch()), (1, 0));
        assert!(policy.object_removed(oid(2)).is_empty());
        assert!(policy.object_available(oid(1)).is_empty());
        assert_eq!((policy.num_waiting(), policy.num_dispatch()), (1, 0));
        assert_eq!(policy.object_available(oid(2)), vec![task_id]);
        assert_eq!((policy.num_waiting(), policy.num_dispatch()), (0, 1));
        policy.check_invariants();
    }

    #[test]
    fn test_removed_then_available_restores_memberships() {
        // Round-trip law: object_removed then object_available for the same
        // oid leaves queue memberships identical to the pre-removal state.
        let mut policy = SchedulingPolicy::new();
        policy.object_available(oid(1));

        let dispatchable = example_task("a", &[oid(1)]);
        let dispatchable_id = dispatchable.task_id;
        let waiting = example_task("b", &[oid(1), oid(9)]);
        let waiting_id = waiting.task_id;
        policy.submit(dispatchable).unwrap();
        policy.submit(waiting).unwrap();
        assert_eq!((policy.num_waiting(), policy.num_dispatch()), (1, 1));

        policy.object_removed(oid(1));
        policy.object_available(oid(1));
        policy.check_invariants();

        assert_eq!((policy.num_waiting(), policy.num_dispatch()), (1, 1));
        assert_eq!(policy.peek_dispatch_head().unwrap().task_id, dispatchable_id);
        assert!(policy.contains(waiting_id));
    }

    #[test]
    fn test_event_order_does_not_affect_final_assignment() {
        // Round-trip law: submit/available/worker in any order end with the
        // same assignment once all three have happened.
        let orders: [[u8; 2]; 2] = [[0, 1], [1, 0]];
        for order in orders {
            let mut policy = SchedulingPolicy::new();
            let mut ledger = ResourceLedger::new(ResourceVector::new(4, 0));
            let mut idle = 0;
            let task = example_task("t", &[oid(1)]);
            let task_id = task.task_id;
            let mut submitted = None;

            for step in order {
                match step {
                    0 => {
                        submitted = Some(policy.submit(task.clone()).unwrap());
                    }
                    _ => {
                        policy.object_available(oid(1));
                    }
                }
                try_dispatch(&mut policy, &mut ledger, &mut idle);
            }
            // Intermediate placement differs with the order...
            match order {
                [0, 1] => assert_eq!(submitted, Some(Placement::Waiting)),
                _ => assert_eq!(submitted, Some(Placement::Dispatch)),
            }
            // ...but the final assignment does not.
            idle = 1;
            assert_eq!(try_dispatch(&mut policy, &mut ledger, &mut idle), vec![task_id]);
            assert_eq!((policy.num_waiting(), policy.num_dispatch()), (0, 0));
        }
    }

    #[test]
    fn test_wide_head_blocks_the_queue() {
        let mut policy = SchedulingPolicy::new();
        let mut ledger = ResourceLedger::new(ResourceVector::new(4, 0));
        let mut idle = 2;

        // Three CPUs are already reserved elsewhere.
        assert!(ledger.debit(ResourceVector::new(3, 0)));

        let wide = example_task_with_resources("wide", &[], 2, 0);
        let narrow = example_task_with_resources("narrow", &[], 1, 0);
        let wide_id = wide.task_id;
        let narrow_id = narrow.task_id;
        policy.submit(wide).unwrap();
        policy.submit(narrow).unwrap();

        // The narrow task fits but sits behind the wide head: nothing runs.
        assert!(try_dispatch(&mut policy, &mut ledger, &mut idle).is_empty());
        assert_eq!(policy.num_dispatch(), 2);

        // Freeing resources unblocks the head first, FIFO after it.
        ledger.credit(ResourceVector::new(3, 0));
        assert_eq!(
            try_dispatch(&mut policy, &mut ledger, &mut idle),
            vec![wide_id, narrow_id]
        );
    }

    #[test]
    fn test_duplicate_submission_is_rejected() {
        let mut policy = SchedulingPolicy::new();
        let task = example_task("t", &[oid(1)]);
        let dup = task.clone();
        policy.submit(task).unwrap();
        assert!(policy.submit(dup).is_err());
        assert_eq!(policy.num_waiting(), 1);
    }

    #[test]
    fn test_popped_tasks_no_longer_react_to_object_events() {
        let mut policy = SchedulingPolicy::new();
        policy.object_available(oid(1));
        let task = example_task("t", &[oid(1)]);
        policy.submit(task).unwrap();

        let popped = policy.pop_dispatch_head().unwrap();
        assert_eq!((policy.num_waiting(), policy.num_dispatch()), (0, 0));

        // The assigned task is running; eviction of its input must not
        // requeue it.
        assert!(policy.object_removed(oid(1)).is_empty());
        assert!(!policy.contains(popped.task_id));
        policy.check_invariants();
    }

    #[test]
    fn test_promotion_preserves_waiting_order() {
        let mut policy = SchedulingPolicy::new();
        let first = example_task("first", &[oid(1)]);
        let second = example_task("second", &[oid(1)]);
        let first_id = first.task_id;
        let second_id = second.task_id;
        policy.submit(first).unwrap();
        policy.submit(second).unwrap();

        assert_eq!(policy.object_available(oid(1)), vec![first_id, second_id]);
        assert_eq!(policy.pop_dispatch_head().unwrap().task_id, first_id);
        assert_eq!(policy.pop_dispatch_head().unwrap().task_id, second_id);
    }
}

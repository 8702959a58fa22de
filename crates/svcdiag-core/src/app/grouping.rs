//! Task set assembly and host grouping.

use std::collections::{BTreeMap, HashSet};

use crate::domain::{AgentId, Task};

/// Union of task listings, deduplicated by task id (first occurrence wins).
pub fn union_tasks<I>(listings: I) -> Vec<Task>
where
    I: IntoIterator<Item = Vec<Task>>,
{
    let mut seen = HashSet::new();
    let mut tasks = Vec::new();
    for task in listings.into_iter().flatten() {
        if seen.insert(task.id.clone()) {
            tasks.push(task);
        }
    }
    tasks
}

/// Partition tasks by the agent they run on.
///
/// Agents are ordered by id; tasks keep their input order within an agent.
/// Every input task lands in exactly one group.
pub fn group_by_agent<I>(tasks: I) -> BTreeMap<AgentId, Vec<Task>>
where
    I: IntoIterator<Item = Task>,
{
    let mut groups: BTreeMap<AgentId, Vec<Task>> = BTreeMap::new();
    for task in tasks {
        groups.entry(task.agent_id.clone()).or_default().push(task);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskId, TaskState};
    use rstest::rstest;

    fn task(id: &str, agent: &str) -> Task {
        Task {
            id: TaskId::parse(id).unwrap(),
            name: id.to_string(),
            agent_id: AgentId::parse(agent).unwrap(),
            state: TaskState::Running,
            framework_id: None,
            executor_id: String::new(),
        }
    }

    #[rstest]
    #[case::single_agent(vec![("t1", "a"), ("t2", "a")])]
    #[case::one_task_per_agent(vec![("t1", "a"), ("t2", "b"), ("t3", "c")])]
    #[case::interleaved(vec![("t1", "b"), ("t2", "a"), ("t3", "b"), ("t4", "a"), ("t5", "c")])]
    #[case::empty(vec![])]
    fn grouping_partitions_the_task_set(#[case] layout: Vec<(&str, &str)>) {
        let tasks: Vec<Task> = layout.iter().map(|(t, a)| task(t, a)).collect();
        let groups = group_by_agent(tasks.clone());

        let mut regrouped: Vec<String> = groups
            .values()
            .flatten()
            .map(|t| t.id.to_string())
            .collect();
        let mut original: Vec<String> = tasks.iter().map(|t| t.id.to_string()).collect();
        regrouped.sort();
        original.sort();
        assert_eq!(regrouped, original);

        for (agent, members) in &groups {
            assert!(members.iter().all(|t| &t.agent_id == agent));
        }
    }

    #[test]
    fn grouping_keeps_discovery_order_within_an_agent() {
        let groups = group_by_agent(vec![task("t3", "a"), task("t1", "b"), task("t2", "a")]);
        let a: Vec<&str> = groups[&AgentId::parse("a").unwrap()]
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(a, vec!["t3", "t2"]);
    }

    #[test]
    fn union_collapses_tasks_listed_twice() {
        let scheduler = vec![task("sched", "a")];
        let service = vec![task("t1", "a"), task("sched", "a"), task("t2", "b")];
        let all = union_tasks([scheduler, service]);
        let ids: Vec<&str> = all.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["sched", "t1", "t2"]);
    }
}

/// RACI rules. Shared by the AI system prompt and the MCP server instructions.
pub const RULES: &str = "\
1. Exactly one Accountable per task. Accountable (A) is the single role that answers for the \
outcome and signs off. Zero Accountables leaves the task orphaned; two or more means nobody is.\n\
2. One letter per cell. A role is Responsible, Accountable, Consulted, Informed, or not involved \
on a task. Never combine letters in one cell. If a role both does the work and owns it, mark A.\n\
3. At least one Responsible where work is done. Responsible (R) roles do the work. Accountable \
may also do the work, but a task with only an A and no R is usually a planning smell.\n\
4. Consulted is two-way, Informed is one-way. Consulted (C) roles give input before or during the \
work. Informed (I) roles are told about progress or the result. Prefer I over C when in doubt, \
to keep decision loops short.\n\
5. Unique role names. Role names are case-insensitively unique: \"QA Engineer\" and \"qa engineer\" \
are the same role. Assignments are keyed by role name, so renaming a role into an existing name \
is refused.\n\
6. Unique task names. Task names are case-insensitively unique.\n\
7. Roles are positions, not people. Use \"Project Manager\" or \"Backend Developer\", not a person's \
name. Several people can fill one role.\n\
8. Spread accountability. A role that is Accountable for more than 60% of tasks is overloaded; \
delegate accountability for some tasks to the roles doing the work.\n\
9. Tasks are deliverables or phases with a clear end (\"Design & Architecture\", \"Testing\"), not \
ongoing activities (\"communication\").\n\
10. Existing assignments win. When regenerating with existing data kept, cells the user already \
set are never overwritten; only new roles, tasks, and empty gaps are filled in.";

#[cfg(test)]
mod tests {
    use super::RULES;

    #[test]
    fn rules_are_numbered_in_order() {
        let numbers: Vec<u32> = RULES
            .lines()
            .filter_map(|l| l.split_once(". ").and_then(|(n, _)| n.parse().ok()))
            .collect();
        assert_eq!(numbers, (1..=10).collect::<Vec<_>>());
    }
}

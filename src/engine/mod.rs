//! Task view engine: per-member stats, filtered and sorted task lists, and
//! due-date classification.
//!
//! Everything here is a pure function of its inputs plus the `DayWindow`
//! captured at construction. Inputs are only borrowed and every call
//! allocates fresh outputs, so one engine can serve concurrent callers.

pub mod filters;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::clock::{Clock, DayWindow};
use crate::config::ViewSettings;
use crate::models::{Status, Task};

pub use filters::{Filter, FilterAction, SortBy, ViewFilters, ViewMode};

/// What a missing due date means for temporal classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingDueDate {
    /// Treated as the Unix epoch: overdue unless done.
    #[default]
    Epoch,
    /// Belongs to no temporal bucket.
    Exclude,
}

/// Aggregate counts over one member's tasks in one tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DerivedStats {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub todo: usize,
    pub overdue: usize,
    pub due_today: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DueClass {
    Overdue,
    DueToday,
    Normal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedTask {
    #[serde(flatten)]
    pub task: Task,
    pub due: DueClass,
}

/// Everything the rendering layer needs for the "my tasks" screen
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub stats: DerivedStats,
    pub tasks: Vec<ClassifiedTask>,
    pub projects: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct TaskViewEngine {
    window: DayWindow,
    missing_due_date: MissingDueDate,
}

impl TaskViewEngine {
    pub fn new(clock: &dyn Clock, settings: &ViewSettings) -> Self {
        Self {
            window: DayWindow::new(clock.now(), settings.offset, settings.upcoming_days),
            missing_due_date: settings.missing_due_date,
        }
    }

    pub fn window(&self) -> &DayWindow {
        &self.window
    }

    pub fn compute_stats(&self, tasks: &[Task], assignee_id: &str, company_id: &str) -> DerivedStats {
        let mut stats = DerivedStats::default();

        for task in tasks.iter().filter(|t| t.is_visible_to(assignee_id, company_id)) {
            stats.total += 1;
            match task.status {
                Status::Done => stats.completed += 1,
                Status::InProgress => stats.in_progress += 1,
                Status::ToDo => stats.todo += 1,
                Status::Other(_) => {}
            }
            if self.is_overdue(task.due_date, &task.status) {
                stats.overdue += 1;
            }
            if !task.status.is_done() && self.is_due_today(task.due_date) {
                stats.due_today += 1;
            }
        }

        stats
    }

    /// Applies every filter predicate, then a stable single-key sort.
    ///
    /// `SortBy::Project` orders by `project_id` as stored, not by project
    /// name; tasks without a project come first.
    pub fn filter_and_sort<'a>(
        &self,
        tasks: &'a [Task],
        assignee_id: &str,
        company_id: &str,
        filters: &ViewFilters,
    ) -> Vec<&'a Task> {
        let mut selected: Vec<&Task> = tasks
            .iter()
            .filter(|t| t.is_visible_to(assignee_id, company_id))
            .filter(|t| filters.matches_search(&t.title, t.description.as_deref()))
            .filter(|t| filters.status.matches(&t.status))
            .filter(|t| filters.priority.matches(&t.priority))
            .filter(|t| match (&filters.project, &t.project_id) {
                (Filter::Any, _) => true,
                (Filter::Value(wanted), Some(project)) => wanted == project,
                (Filter::Value(_), None) => false,
            })
            .filter(|t| self.in_view_mode(t, filters.view_mode))
            .collect();

        // sort_by_key is stable: equal keys keep input order.
        match filters.sort_by {
            SortBy::DueDate => selected.sort_by_key(|t| sort_due(t.due_date)),
            SortBy::Priority => selected.sort_by_key(|t| std::cmp::Reverse(t.priority.rank())),
            SortBy::Project => selected.sort_by(|a, b| a.project_id.cmp(&b.project_id)),
            SortBy::Status => selected.sort_by(|a, b| a.status.as_str().cmp(b.status.as_str())),
        }

        selected
    }

    /// Distinct project ids in first-seen order.
    pub fn list_distinct_projects(tasks: &[Task]) -> Vec<String> {
        let mut seen = HashSet::new();
        tasks
            .iter()
            .filter_map(|t| t.project_id.as_deref())
            .filter(|p| seen.insert(*p))
            .map(str::to_string)
            .collect()
    }

    pub fn classify_due_date(&self, due_date: Option<DateTime<Utc>>, status: &Status) -> DueClass {
        if self.is_overdue(due_date, status) {
            DueClass::Overdue
        } else if self.is_due_today(due_date) {
            DueClass::DueToday
        } else {
            DueClass::Normal
        }
    }

    pub fn view(
        &self,
        tasks: &[Task],
        assignee_id: &str,
        company_id: &str,
        filters: &ViewFilters,
    ) -> TaskView {
        let stats = self.compute_stats(tasks, assignee_id, company_id);
        let visible: Vec<Task> = tasks
            .iter()
            .filter(|t| t.is_visible_to(assignee_id, company_id))
            .cloned()
            .collect();
        let projects = Self::list_distinct_projects(&visible);

        let tasks: Vec<ClassifiedTask> = self
            .filter_and_sort(&visible, assignee_id, company_id, filters)
            .into_iter()
            .map(|task| ClassifiedTask {
                due: self.classify_due_date(task.due_date, &task.status),
                task: task.clone(),
            })
            .collect();

        tracing::debug!(
            assignee_id,
            company_id,
            total = stats.total,
            shown = tasks.len(),
            projects = projects.len(),
            "Computed task view"
        );

        TaskView {
            stats,
            tasks,
            projects,
        }
    }

    fn effective_due(&self, due_date: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        match self.missing_due_date {
            MissingDueDate::Epoch => Some(due_date.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)),
            MissingDueDate::Exclude => due_date,
        }
    }

    fn is_overdue(&self, due_date: Option<DateTime<Utc>>, status: &Status) -> bool {
        !status.is_done()
            && self
                .effective_due(due_date)
                .is_some_and(|due| self.window.is_before_today(due))
    }

    fn is_due_today(&self, due_date: Option<DateTime<Utc>>) -> bool {
        self.effective_due(due_date)
            .is_some_and(|due| self.window.is_today(due))
    }

    fn in_view_mode(&self, task: &Task, mode: ViewMode) -> bool {
        let open = !task.status.is_done();
        match mode {
            ViewMode::All => true,
            ViewMode::Today => open && self.is_due_today(task.due_date),
            ViewMode::Overdue => self.is_overdue(task.due_date, &task.status),
            ViewMode::Upcoming => {
                open && self
                    .effective_due(task.due_date)
                    .is_some_and(|due| self.window.is_upcoming(due))
            }
        }
    }
}

// Missing due dates sort first, as the epoch would.
fn sort_due(due_date: Option<DateTime<Utc>>) -> DateTime<Utc> {
    due_date.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::Priority;
    use chrono::{Duration, FixedOffset, TimeZone};

    const ME: &str = "member-a";
    const CO: &str = "company-c";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 15, 10, 0, 0).unwrap()
    }

    fn settings(missing_due_date: MissingDueDate) -> ViewSettings {
        ViewSettings {
            offset: FixedOffset::east_opt(0).unwrap(),
            upcoming_days: 7,
            missing_due_date,
        }
    }

    fn engine() -> TaskViewEngine {
        TaskViewEngine::new(&FixedClock(now()), &settings(MissingDueDate::Epoch))
    }

    fn midnight() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 15, 0, 0, 0).unwrap()
    }

    fn task(id: &str, status: Status, due: Option<DateTime<Utc>>) -> Task {
        Task {
            id: id.to_string(),
            title: format!("Task {id}"),
            description: None,
            status,
            priority: Priority::Medium,
            due_date: due,
            assignees: vec![ME.to_string()],
            company_id: CO.to_string(),
            project_id: None,
            updated_at: None,
        }
    }

    fn ids(tasks: &[&Task]) -> Vec<String> {
        tasks.iter().map(|t| t.id.clone()).collect()
    }

    #[test]
    fn empty_input_yields_empty_outputs() {
        let engine = engine();
        assert_eq!(engine.compute_stats(&[], ME, CO), DerivedStats::default());
        assert!(engine.filter_and_sort(&[], ME, CO, &ViewFilters::default()).is_empty());
        assert!(TaskViewEngine::list_distinct_projects(&[]).is_empty());
    }

    #[test]
    fn stats_for_example_scenario() {
        let yesterday = midnight() - Duration::hours(12);
        let today = midnight() + Duration::hours(9);
        let tomorrow = midnight() + Duration::days(1) + Duration::hours(9);

        let mut other = task("3", Status::InProgress, Some(tomorrow));
        other.assignees = vec!["member-b".into()];
        let tasks = vec![
            task("1", Status::Done, Some(yesterday)),
            task("2", Status::ToDo, Some(today)),
            other,
        ];

        let stats = engine().compute_stats(&tasks, ME, CO);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.todo, 1);
        assert_eq!(stats.in_progress, 0);
        assert_eq!(stats.overdue, 0);
        assert_eq!(stats.due_today, 1);

        let filters = ViewFilters::default()
            .reduce(FilterAction::SetStatus(Filter::Value(Status::Done)));
        let shown = engine().filter_and_sort(&tasks, ME, CO, &filters);
        assert_eq!(ids(&shown), vec!["1"]);
    }

    #[test]
    fn unknown_status_counts_toward_total_only() {
        let tasks = vec![
            task("1", Status::Other("Blocked".into()), None),
            task("2", Status::ToDo, None),
        ];
        let stats = engine().compute_stats(&tasks, ME, CO);
        assert_eq!(stats.total, 2);
        assert!(stats.completed + stats.in_progress + stats.todo <= stats.total);
        assert_eq!(stats.todo, 1);
    }

    #[test]
    fn tenant_isolation_holds_everywhere() {
        let mut foreign = task("x", Status::ToDo, Some(midnight()));
        foreign.company_id = "company-z".into();
        foreign.project_id = Some("p".into());
        let tasks = vec![foreign];

        let engine = engine();
        assert_eq!(engine.compute_stats(&tasks, ME, CO).total, 0);
        assert!(engine.filter_and_sort(&tasks, ME, CO, &ViewFilters::default()).is_empty());
        assert!(engine.view(&tasks, ME, CO, &ViewFilters::default()).projects.is_empty());
    }

    #[test]
    fn midnight_is_due_today_and_one_millisecond_earlier_is_overdue() {
        let engine = engine();
        assert_eq!(
            engine.classify_due_date(Some(midnight()), &Status::ToDo),
            DueClass::DueToday
        );
        assert_eq!(
            engine.classify_due_date(Some(midnight() - Duration::milliseconds(1)), &Status::ToDo),
            DueClass::Overdue
        );
        assert_eq!(
            engine.classify_due_date(Some(midnight() - Duration::milliseconds(1)), &Status::Done),
            DueClass::Normal
        );
        // Due today stays flagged even when done.
        assert_eq!(
            engine.classify_due_date(Some(midnight()), &Status::Done),
            DueClass::DueToday
        );
        assert_eq!(
            engine.classify_due_date(Some(midnight() + Duration::days(3)), &Status::ToDo),
            DueClass::Normal
        );
    }

    #[test]
    fn missing_due_date_policy() {
        let epoch = engine();
        assert_eq!(epoch.classify_due_date(None, &Status::ToDo), DueClass::Overdue);
        assert_eq!(epoch.compute_stats(&[task("1", Status::ToDo, None)], ME, CO).overdue, 1);

        let exclude = TaskViewEngine::new(&FixedClock(now()), &settings(MissingDueDate::Exclude));
        assert_eq!(exclude.classify_due_date(None, &Status::ToDo), DueClass::Normal);
        assert_eq!(exclude.compute_stats(&[task("1", Status::ToDo, None)], ME, CO).overdue, 0);
    }

    #[test]
    fn view_modes_bucket_by_window() {
        let tasks = vec![
            task("late", Status::ToDo, Some(midnight() - Duration::days(2))),
            task("late-done", Status::Done, Some(midnight() - Duration::days(2))),
            task("today", Status::InProgress, Some(midnight() + Duration::hours(20))),
            task("today-done", Status::Done, Some(midnight() + Duration::hours(1))),
            task("soon", Status::ToDo, Some(midnight() + Duration::days(3))),
            task("edge", Status::ToDo, Some(midnight() + Duration::days(8))),
            task("far", Status::ToDo, Some(midnight() + Duration::days(30))),
        ];
        let engine = engine();
        let run = |mode| {
            let filters = ViewFilters::default().reduce(FilterAction::SetViewMode(mode));
            ids(&engine.filter_and_sort(&tasks, ME, CO, &filters))
        };

        assert_eq!(run(ViewMode::Overdue), vec!["late"]);
        assert_eq!(run(ViewMode::Today), vec!["today"]);
        assert_eq!(run(ViewMode::Upcoming), vec!["soon"]);
        assert_eq!(run(ViewMode::All).len(), tasks.len());
    }

    #[test]
    fn priority_sort_is_descending_and_stable() {
        let mut tasks = Vec::new();
        for (id, priority) in [
            ("low", Priority::Low),
            ("high-1", Priority::High),
            ("medium", Priority::Medium),
            ("high-2", Priority::High),
        ] {
            let mut t = task(id, Status::ToDo, None);
            t.priority = priority;
            tasks.push(t);
        }
        let filters = ViewFilters::default().reduce(FilterAction::SetSortBy(SortBy::Priority));
        let shown = engine().filter_and_sort(&tasks, ME, CO, &filters);
        assert_eq!(ids(&shown), vec!["high-1", "high-2", "medium", "low"]);
    }

    #[test]
    fn due_date_sort_puts_missing_first_and_keeps_ties() {
        let due = midnight() + Duration::days(2);
        let tasks = vec![
            task("later", Status::ToDo, Some(due + Duration::hours(1))),
            task("a", Status::ToDo, Some(due)),
            task("none", Status::ToDo, None),
            task("b", Status::ToDo, Some(due)),
        ];
        let shown = engine().filter_and_sort(&tasks, ME, CO, &ViewFilters::default());
        assert_eq!(ids(&shown), vec!["none", "a", "b", "later"]);
    }

    #[test]
    fn status_and_project_sorts_are_lexicographic() {
        let mut tasks = vec![
            task("1", Status::ToDo, None),
            task("2", Status::Done, None),
            task("3", Status::InProgress, None),
        ];
        tasks[0].project_id = Some("beta".into());
        tasks[1].project_id = Some("alpha".into());

        let by_status = ViewFilters::default().reduce(FilterAction::SetSortBy(SortBy::Status));
        assert_eq!(ids(&engine().filter_and_sort(&tasks, ME, CO, &by_status)), vec!["2", "3", "1"]);

        let by_project = ViewFilters::default().reduce(FilterAction::SetSortBy(SortBy::Project));
        assert_eq!(ids(&engine().filter_and_sort(&tasks, ME, CO, &by_project)), vec!["3", "2", "1"]);
    }

    #[test]
    fn search_and_project_filters_combine() {
        let mut tasks = vec![
            task("1", Status::ToDo, None),
            task("2", Status::ToDo, None),
            task("3", Status::ToDo, None),
        ];
        tasks[0].title = "Write quarterly REPORT".into();
        tasks[0].project_id = Some("ops".into());
        tasks[1].description = Some("attach report".into());
        tasks[1].project_id = Some("sales".into());
        tasks[2].project_id = Some("ops".into());

        let filters = ViewFilters::default().reduce_all([
            FilterAction::SetSearch("report".into()),
            FilterAction::SetProject(Filter::Value("ops".into())),
        ]);
        assert_eq!(ids(&engine().filter_and_sort(&tasks, ME, CO, &filters)), vec!["1"]);
    }

    #[test]
    fn filter_and_sort_is_idempotent_and_leaves_input_alone() {
        let tasks = vec![
            task("b", Status::ToDo, Some(midnight() + Duration::days(1))),
            task("a", Status::ToDo, Some(midnight())),
        ];
        let before = tasks.clone();
        let engine = engine();
        let first = ids(&engine.filter_and_sort(&tasks, ME, CO, &ViewFilters::default()));
        let second = ids(&engine.filter_and_sort(&tasks, ME, CO, &ViewFilters::default()));
        assert_eq!(first, second);
        assert_eq!(tasks, before);
    }

    #[test]
    fn distinct_projects_keep_first_seen_order() {
        let mut tasks = vec![
            task("1", Status::ToDo, None),
            task("2", Status::ToDo, None),
            task("3", Status::ToDo, None),
            task("4", Status::ToDo, None),
        ];
        tasks[0].project_id = Some("zeta".into());
        tasks[1].project_id = Some("alpha".into());
        tasks[2].project_id = Some("zeta".into());
        assert_eq!(TaskViewEngine::list_distinct_projects(&tasks), vec!["zeta", "alpha"]);
    }

    #[test]
    fn view_attaches_due_classes() {
        let tasks = vec![
            task("today", Status::ToDo, Some(midnight() + Duration::hours(3))),
            task("late", Status::ToDo, Some(midnight() - Duration::days(1))),
        ];
        let view = engine().view(&tasks, ME, CO, &ViewFilters::default());
        let classes: Vec<_> = view.tasks.iter().map(|c| (c.task.id.as_str(), c.due)).collect();
        assert_eq!(classes, vec![("late", DueClass::Overdue), ("today", DueClass::DueToday)]);
        assert_eq!(view.stats.total, 2);
    }
}

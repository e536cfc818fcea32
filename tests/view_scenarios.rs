use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use taskview::clock::FixedClock;
use taskview::config::ViewSettings;
use taskview::db::Database;
use taskview::engine::{
    DueClass, Filter, FilterAction, MissingDueDate, SortBy, TaskViewEngine, ViewFilters,
};
use taskview::models::{Priority, Status, Task, TaskPatch};

const A: &str = "member-a";
const B: &str = "member-b";
const C: &str = "company-c";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, 4, 16, 45, 0).unwrap()
}

fn engine_at(at: DateTime<Utc>) -> TaskViewEngine {
    let settings = ViewSettings {
        offset: FixedOffset::east_opt(0).unwrap(),
        upcoming_days: 7,
        missing_due_date: MissingDueDate::Epoch,
    };
    TaskViewEngine::new(&FixedClock(at), &settings)
}

fn task(id: &str, status: Status, due: DateTime<Utc>, assignee: &str) -> Task {
    Task {
        id: id.to_string(),
        title: format!("Task {id}"),
        description: None,
        status,
        priority: Priority::Medium,
        due_date: Some(due),
        assignees: vec![assignee.to_string()],
        company_id: C.to_string(),
        project_id: None,
        updated_at: None,
    }
}

fn scenario() -> Vec<Task> {
    let today = now();
    vec![
        task("1", Status::Done, today - Duration::days(1), A),
        task("2", Status::ToDo, today, A),
        task("3", Status::InProgress, today + Duration::days(1), B),
    ]
}

#[test]
fn example_scenario_stats_and_status_filter() {
    let engine = engine_at(now());
    let tasks = scenario();

    let stats = engine.compute_stats(&tasks, A, C);
    assert_eq!(stats.total, 2);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.overdue, 0);
    assert_eq!(stats.due_today, 1);

    let filters = ViewFilters::default().reduce_all([
        FilterAction::SetStatus(Filter::Value(Status::Done)),
        FilterAction::SetProject(Filter::Any),
    ]);
    let shown: Vec<_> = engine
        .filter_and_sort(&tasks, A, C, &filters)
        .into_iter()
        .map(|t| t.id.as_str())
        .collect();
    assert_eq!(shown, vec!["1"]);
}

#[test]
fn priority_sort_example() {
    let mut tasks = Vec::new();
    for (id, priority) in [("1", Priority::Low), ("2", Priority::High), ("3", Priority::Medium)] {
        let mut t = task(id, Status::ToDo, now(), A);
        t.priority = priority;
        tasks.push(t);
    }

    let filters = ViewFilters::default().reduce(FilterAction::SetSortBy(SortBy::Priority));
    let order: Vec<_> = engine_at(now())
        .filter_and_sort(&tasks, A, C, &filters)
        .into_iter()
        .map(|t| t.priority)
        .collect();
    assert_eq!(order, vec![Priority::High, Priority::Medium, Priority::Low]);
}

#[test]
fn crossing_midnight_moves_a_task_from_today_to_overdue() {
    let due = Utc.with_ymd_and_hms(2024, 11, 4, 9, 0, 0).unwrap();
    let late_evening = Utc.with_ymd_and_hms(2024, 11, 4, 23, 59, 59).unwrap();
    let next_morning = Utc.with_ymd_and_hms(2024, 11, 5, 0, 0, 0).unwrap();

    assert_eq!(
        engine_at(late_evening).classify_due_date(Some(due), &Status::ToDo),
        DueClass::DueToday
    );
    assert_eq!(
        engine_at(next_morning).classify_due_date(Some(due), &Status::ToDo),
        DueClass::Overdue
    );
}

#[test]
fn status_change_through_the_store_is_reflected_in_the_next_view() {
    let db = Database::open_in_memory().unwrap();
    for t in scenario() {
        db.insert_task(&t).unwrap();
    }

    let engine = engine_at(now());
    let before = engine.compute_stats(&db.list_tasks(C).unwrap(), A, C);
    assert_eq!(before.completed, 1);
    assert_eq!(before.due_today, 1);

    let patch = TaskPatch {
        status: Some(Status::Done),
        ..TaskPatch::default()
    };
    assert!(db.update_task(C, "2", &patch, now()).unwrap());

    let after = engine.compute_stats(&db.list_tasks(C).unwrap(), A, C);
    assert_eq!(after.completed, 2);
    assert_eq!(after.todo, 0);
    assert_eq!(after.due_today, 0);
}

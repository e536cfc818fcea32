//! SQLite task store: tenant-scoped reads, row-to-model mapping and updates

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::models::{Priority, Project, Status, Task, TaskPatch};

const TASK_COLUMNS: &str =
    "id, title, description, status, priority, due_date, company_id, project_id, updated_at";

/// Thread-safe database wrapper
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(path).context("Failed to open database")?;
        Self::with_connection(conn)
    }

    /// In-memory database, used by tests and the CLI dry runs
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open database")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))
    }

    /// Initialize the database schema
    fn init(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                company_id TEXT NOT NULL,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL DEFAULT 'To-Do',
                priority TEXT NOT NULL DEFAULT 'medium',
                due_date TEXT,
                company_id TEXT NOT NULL,
                project_id TEXT,
                updated_at TEXT
            );

            CREATE TABLE IF NOT EXISTS task_assignees (
                task_id TEXT NOT NULL,
                member_id TEXT NOT NULL,
                PRIMARY KEY (task_id, member_id),
                FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_company ON tasks(company_id);
            CREATE INDEX IF NOT EXISTS idx_projects_company ON projects(company_id);
            CREATE INDEX IF NOT EXISTS idx_assignees_member ON task_assignees(member_id);
            "#,
        )?;

        Ok(())
    }

    /// All tasks of one company, in insertion order
    pub fn list_tasks(&self, company_id: &str) -> Result<Vec<Task>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE company_id = ?1 ORDER BY rowid"
        ))?;
        let rows = stmt.query_map(params![company_id], task_from_row)?;
        let mut tasks: Vec<Task> = rows.collect::<Result<Vec<_>, _>>()?;

        for task in &mut tasks {
            task.assignees = load_assignees(&conn, &task.id)?;
        }

        Ok(tasks)
    }

    pub fn get_task(&self, company_id: &str, id: &str) -> Result<Option<Task>> {
        let conn = self.lock()?;
        let task = conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND company_id = ?2"),
                params![id, company_id],
                task_from_row,
            )
            .optional()?;

        match task {
            Some(mut task) => {
                task.assignees = load_assignees(&conn, &task.id)?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    pub fn insert_task(&self, task: &Task) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"INSERT INTO tasks (id, title, description, status, priority, due_date,
               company_id, project_id, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params![
                &task.id,
                &task.title,
                &task.description,
                task.status.as_str(),
                task.priority.as_str(),
                task.due_date.map(|d| d.to_rfc3339()),
                &task.company_id,
                &task.project_id,
                task.updated_at.map(|d| d.to_rfc3339()),
            ],
        )?;
        replace_assignees(&tx, &task.id, &task.assignees)?;

        tx.commit()?;
        Ok(())
    }

    /// Apply a partial update. Returns false if the task is not in `company_id`.
    pub fn update_task(
        &self,
        company_id: &str,
        id: &str,
        patch: &TaskPatch,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let exists: Option<String> = tx
            .query_row(
                "SELECT id FROM tasks WHERE id = ?1 AND company_id = ?2",
                params![id, company_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(false);
        }

        if let Some(title) = &patch.title {
            tx.execute("UPDATE tasks SET title = ?2 WHERE id = ?1", params![id, title])?;
        }
        if let Some(description) = &patch.description {
            tx.execute(
                "UPDATE tasks SET description = ?2 WHERE id = ?1",
                params![id, description],
            )?;
        }
        if let Some(status) = &patch.status {
            tx.execute(
                "UPDATE tasks SET status = ?2 WHERE id = ?1",
                params![id, status.as_str()],
            )?;
        }
        if let Some(priority) = patch.priority {
            tx.execute(
                "UPDATE tasks SET priority = ?2 WHERE id = ?1",
                params![id, priority.as_str()],
            )?;
        }
        if let Some(due_date) = &patch.due_date {
            tx.execute(
                "UPDATE tasks SET due_date = ?2 WHERE id = ?1",
                params![id, due_date.map(|d| d.to_rfc3339())],
            )?;
        }
        if let Some(project_id) = &patch.project_id {
            tx.execute(
                "UPDATE tasks SET project_id = ?2 WHERE id = ?1",
                params![id, project_id],
            )?;
        }
        if let Some(assignees) = &patch.assignees {
            replace_assignees(&tx, id, assignees)?;
        }

        tx.execute(
            "UPDATE tasks SET updated_at = ?2 WHERE id = ?1",
            params![id, now.to_rfc3339()],
        )?;

        tx.commit()?;
        Ok(true)
    }

    pub fn list_projects(&self, company_id: &str) -> Result<Vec<Project>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, company_id, name FROM projects WHERE company_id = ?1 ORDER BY name")?;
        let rows = stmt.query_map(params![company_id], |row| {
            Ok(Project {
                id: row.get(0)?,
                company_id: row.get(1)?,
                name: row.get(2)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn project_exists(&self, company_id: &str, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let found: Option<String> = conn
            .query_row(
                "SELECT id FROM projects WHERE id = ?1 AND company_id = ?2",
                params![id, company_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn insert_project(&self, project: &Project) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO projects (id, company_id, name) VALUES (?1, ?2, ?3)",
            params![&project.id, &project.company_id, &project.name],
        )?;
        Ok(())
    }
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let status: String = row.get(3)?;
    let priority: String = row.get(4)?;
    let due_date: Option<String> = row.get(5)?;
    let updated_at: Option<String> = row.get(8)?;

    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: Status::from(status),
        priority: Priority::parse_lenient(&priority),
        due_date: due_date.as_deref().and_then(parse_timestamp),
        assignees: Vec::new(), // Filled by the caller
        company_id: row.get(6)?,
        project_id: row.get(7)?,
        updated_at: updated_at.as_deref().and_then(parse_timestamp),
    })
}

fn load_assignees(conn: &Connection, task_id: &str) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT member_id FROM task_assignees WHERE task_id = ?1 ORDER BY member_id")?;
    let members = stmt
        .query_map(params![task_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(members)
}

fn replace_assignees(conn: &Connection, task_id: &str, assignees: &[String]) -> Result<()> {
    conn.execute(
        "DELETE FROM task_assignees WHERE task_id = ?1",
        params![task_id],
    )?;
    for member_id in assignees {
        conn.execute(
            "INSERT OR IGNORE INTO task_assignees (task_id, member_id) VALUES (?1, ?2)",
            params![task_id, member_id],
        )?;
    }
    Ok(())
}

/// Accepts RFC 3339 or a bare `YYYY-MM-DD` (midnight UTC). Anything else is
/// treated as absent.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

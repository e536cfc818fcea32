//! Filter state for a task view and the transitions that change it.

use serde::{Deserialize, Serialize};

use crate::models::{Priority, Status};

/// Either no constraint or one concrete value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter<T> {
    #[default]
    Any,
    Value(T),
}

impl<T: PartialEq> Filter<T> {
    pub fn matches(&self, value: &T) -> bool {
        match self {
            Self::Any => true,
            Self::Value(wanted) => wanted == value,
        }
    }
}

impl<T> From<Option<T>> for Filter<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Any, Self::Value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortBy {
    #[default]
    DueDate,
    Priority,
    Project,
    Status,
}

/// Coarse temporal bucket applied on top of the explicit filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    All,
    Today,
    Overdue,
    Upcoming,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ViewFilters {
    pub search_query: String,
    pub status: Filter<Status>,
    pub priority: Filter<Priority>,
    pub project: Filter<String>,
    pub sort_by: SortBy,
    pub view_mode: ViewMode,
}

/// One discrete change to a `ViewFilters`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterAction {
    SetSearch(String),
    SetStatus(Filter<Status>),
    SetPriority(Filter<Priority>),
    SetProject(Filter<String>),
    SetSortBy(SortBy),
    SetViewMode(ViewMode),
    Reset,
}

impl ViewFilters {
    /// Returns the filter state after `action`; `self` is consumed, never edited in place.
    #[must_use]
    pub fn reduce(self, action: FilterAction) -> Self {
        match action {
            FilterAction::SetSearch(search_query) => Self { search_query, ..self },
            FilterAction::SetStatus(status) => Self { status, ..self },
            FilterAction::SetPriority(priority) => Self { priority, ..self },
            FilterAction::SetProject(project) => Self { project, ..self },
            FilterAction::SetSortBy(sort_by) => Self { sort_by, ..self },
            FilterAction::SetViewMode(view_mode) => Self { view_mode, ..self },
            FilterAction::Reset => Self::default(),
        }
    }

    /// Folds a batch of actions, in order, starting from `self`.
    #[must_use]
    pub fn reduce_all(self, actions: impl IntoIterator<Item = FilterAction>) -> Self {
        actions.into_iter().fold(self, Self::reduce)
    }

    /// Case-insensitive substring match against title or description.
    pub fn matches_search(&self, title: &str, description: Option<&str>) -> bool {
        if self.search_query.is_empty() {
            return true;
        }
        let needle = self.search_query.to_lowercase();
        title.to_lowercase().contains(&needle)
            || description.is_some_and(|d| d.to_lowercase().contains(&needle))
    }
}

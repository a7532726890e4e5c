use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{PerformanceReport, Report, Role, Task, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Collection {
    Users,
    Reports,
    Tasks,
    PerformanceReports,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Users,
        Collection::Reports,
        Collection::Tasks,
        Collection::PerformanceReports,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Reports => "reports",
            Collection::Tasks => "tasks",
            Collection::PerformanceReports => "performance_reports",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|collection| collection.key() == key)
    }
}

/// Keyed access to the four entity collections.
///
/// Performance reports are append-only: there is no update or delete path.
pub trait Store {
    fn users(&self) -> Result<Vec<User>>;
    fn find_user(&self, email: &str) -> Result<Option<User>>;
    fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>>;
    fn upsert_user(&mut self, user: User) -> Result<()>;
    fn remove_user(&mut self, email: &str) -> Result<bool>;

    fn reports(&self) -> Result<Vec<Report>>;
    fn find_report(&self, id: Uuid) -> Result<Option<Report>>;
    fn upsert_report(&mut self, report: Report) -> Result<()>;

    fn tasks(&self) -> Result<Vec<Task>>;
    fn find_task(&self, id: Uuid) -> Result<Option<Task>>;
    fn find_task_for_report(&self, report_id: Uuid) -> Result<Option<Task>>;
    fn upsert_task(&mut self, task: Task) -> Result<()>;
    fn remove_tasks_for_report(&mut self, report_id: Uuid) -> Result<usize>;

    fn performance_reports(&self) -> Result<Vec<PerformanceReport>>;
    fn append_performance_report(&mut self, report: PerformanceReport) -> Result<()>;

    fn users_by_role(&self, role: Role) -> Result<Vec<User>> {
        Ok(self
            .users()?
            .into_iter()
            .filter(|user| user.role == role)
            .collect())
    }
}

/// In-memory store holding whole collections, loaded from and flushed to one
/// JSON document per collection.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    users: Vec<User>,
    reports: Vec<Report>,
    tasks: Vec<Task>,
    performance_reports: Vec<PerformanceReport>,
    dirty: BTreeSet<Collection>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Missing documents load as empty collections.
    pub fn from_documents(documents: &BTreeMap<String, Value>) -> Result<Self> {
        Ok(Self {
            users: decode(documents, Collection::Users)?,
            reports: decode(documents, Collection::Reports)?,
            tasks: decode(documents, Collection::Tasks)?,
            performance_reports: decode(documents, Collection::PerformanceReports)?,
            dirty: BTreeSet::new(),
        })
    }

    pub fn document(&self, collection: Collection) -> Result<Value> {
        let value = match collection {
            Collection::Users => serde_json::to_value(&self.users)?,
            Collection::Reports => serde_json::to_value(&self.reports)?,
            Collection::Tasks => serde_json::to_value(&self.tasks)?,
            Collection::PerformanceReports => serde_json::to_value(&self.performance_reports)?,
        };
        Ok(value)
    }

    pub fn dirty_documents(&self) -> Result<Vec<(&'static str, Value)>> {
        self.dirty
            .iter()
            .map(|collection| Ok((collection.key(), self.document(*collection)?)))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    fn touch(&mut self, collection: Collection) {
        self.dirty.insert(collection);
    }
}

fn decode<T: DeserializeOwned>(
    documents: &BTreeMap<String, Value>,
    collection: Collection,
) -> Result<Vec<T>> {
    match documents.get(collection.key()) {
        Some(value) => Ok(serde_json::from_value(value.clone())?),
        None => Ok(Vec::new()),
    }
}

fn upsert_by<T, K: PartialEq>(items: &mut Vec<T>, item: T, key: impl Fn(&T) -> K) {
    let wanted = key(&item);
    match items.iter().position(|existing| key(existing) == wanted) {
        Some(index) => items[index] = item,
        None => items.push(item),
    }
}

fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

impl Store for MemoryStore {
    fn users(&self) -> Result<Vec<User>> {
        Ok(self.users.clone())
    }

    fn find_user(&self, email: &str) -> Result<Option<User>> {
        let wanted = email_key(email);
        Ok(self
            .users
            .iter()
            .find(|user| email_key(&user.email) == wanted)
            .cloned())
    }

    fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.iter().find(|user| user.id == id).cloned())
    }

    fn upsert_user(&mut self, user: User) -> Result<()> {
        upsert_by(&mut self.users, user, |user| email_key(&user.email));
        self.touch(Collection::Users);
        Ok(())
    }

    fn remove_user(&mut self, email: &str) -> Result<bool> {
        let wanted = email_key(email);
        let before = self.users.len();
        self.users.retain(|user| email_key(&user.email) != wanted);
        let removed = self.users.len() != before;
        if removed {
            self.touch(Collection::Users);
        }
        Ok(removed)
    }

    fn reports(&self) -> Result<Vec<Report>> {
        Ok(self.reports.clone())
    }

    fn find_report(&self, id: Uuid) -> Result<Option<Report>> {
        Ok(self.reports.iter().find(|report| report.id == id).cloned())
    }

    fn upsert_report(&mut self, report: Report) -> Result<()> {
        upsert_by(&mut self.reports, report, |report| report.id);
        self.touch(Collection::Reports);
        Ok(())
    }

    fn tasks(&self) -> Result<Vec<Task>> {
        Ok(self.tasks.clone())
    }

    fn find_task(&self, id: Uuid) -> Result<Option<Task>> {
        Ok(self.tasks.iter().find(|task| task.id == id).cloned())
    }

    fn find_task_for_report(&self, report_id: Uuid) -> Result<Option<Task>> {
        Ok(self
            .tasks
            .iter()
            .find(|task| task.report_id == report_id)
            .cloned())
    }

    fn upsert_task(&mut self, task: Task) -> Result<()> {
        upsert_by(&mut self.tasks, task, |task| task.id);
        self.touch(Collection::Tasks);
        Ok(())
    }

    fn remove_tasks_for_report(&mut self, report_id: Uuid) -> Result<usize> {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.report_id != report_id);
        let removed = before - self.tasks.len();
        if removed > 0 {
            self.touch(Collection::Tasks);
        }
        Ok(removed)
    }

    fn performance_reports(&self) -> Result<Vec<PerformanceReport>> {
        Ok(self.performance_reports.clone())
    }

    fn append_performance_report(&mut self, report: PerformanceReport) -> Result<()> {
        self.performance_reports.push(report);
        self.touch(Collection::PerformanceReports);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_user(email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            fullname: "Jules Moreno".to_string(),
            email: email.to_string(),
            password: "secret1".to_string(),
            phone: "555-0100".to_string(),
            role: Role::Citizen,
            created_at: Utc::now(),
            rejection_count: 0,
            is_suspended: false,
            suspended_until: None,
            suspended_by: None,
            suspension_reason: None,
        }
    }

    #[test]
    fn upsert_user_replaces_case_insensitively() {
        let mut store = MemoryStore::new();
        store.upsert_user(sample_user("Jules@Example.com")).unwrap();
        let mut updated = sample_user("jules@example.com");
        updated.fullname = "Jules M.".to_string();
        store.upsert_user(updated).unwrap();

        let users = store.users().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].fullname, "Jules M.");
    }

    #[test]
    fn only_touched_collections_are_dirty() {
        let mut store = MemoryStore::new();
        assert!(!store.is_dirty());
        store.upsert_user(sample_user("a@example.com")).unwrap();
        assert_eq!(store.remove_tasks_for_report(Uuid::new_v4()).unwrap(), 0);

        let dirty = store.dirty_documents().unwrap();
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].0, "users");
    }

    #[test]
    fn documents_reload_into_equal_collections() {
        let mut store = MemoryStore::new();
        store.upsert_user(sample_user("a@example.com")).unwrap();

        let mut documents = BTreeMap::new();
        for collection in Collection::ALL {
            documents.insert(
                collection.key().to_string(),
                store.document(collection).unwrap(),
            );
        }
        let reloaded = MemoryStore::from_documents(&documents).unwrap();
        assert_eq!(reloaded.users().unwrap(), store.users().unwrap());
        assert!(reloaded.reports().unwrap().is_empty());
        assert!(!reloaded.is_dirty());
    }
}

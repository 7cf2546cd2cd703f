use std::{fmt, hash::Hash};

use serde::{Deserialize, Serialize};

use crate::model::{Estimate, Group, GroupId, Room, RoomId, Task, TaskId};

/// Something a [`Collection`] can hold: it has an identity and can merge a partial update.
pub trait Entity: Clone {
    type Id: Copy + Eq + Hash + fmt::Debug;
    type Patch;

    fn id(&self) -> Self::Id;
    fn merge(&mut self, patch: &Self::Patch);
}

/// An ordered set of entities plus a "current" pointer.
///
/// The pointer only stores an id. [`Collection::current`] resolves it against the list on every
/// call, so there is no second copy of the current entity that could drift.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection<T: Entity> {
    items: Vec<T>,
    current: Option<T::Id>,
}

impl<T: Entity> Default for Collection<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            current: None,
        }
    }
}

impl<T: Entity> Collection<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            current: None,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: T::Id) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn contains(&self, id: T::Id) -> bool {
        self.get(id).is_some()
    }

    pub fn current(&self) -> Option<&T> {
        self.current.and_then(|id| self.get(id))
    }

    pub fn current_id(&self) -> Option<T::Id> {
        self.current
    }

    pub fn set(&mut self, items: Vec<T>) {
        self.set_with(|_| items);
    }

    /// Replaces the items with a transform of the previous items.
    pub fn set_with(&mut self, f: impl FnOnce(&[T]) -> Vec<T>) {
        self.items = f(&self.items);
        if self.current.is_some_and(|id| !self.contains(id)) {
            self.current = None;
        }
    }

    pub fn add(&mut self, item: T) {
        let id = item.id();
        match self.items.iter_mut().find(|existing| existing.id() == id) {
            Some(existing) => *existing = item,
            None => self.items.push(item),
        }
    }

    pub fn update(&mut self, id: T::Id, patch: &T::Patch) {
        if let Some(item) = self.items.iter_mut().find(|item| item.id() == id) {
            item.merge(patch);
        }
    }

    /// Applies `f` to the entity with `id`, if present.
    pub fn modify(&mut self, id: T::Id, f: impl FnOnce(&mut T)) {
        if let Some(item) = self.items.iter_mut().find(|item| item.id() == id) {
            f(item);
        }
    }

    pub fn remove(&mut self, id: T::Id) -> Option<T> {
        let index = self.items.iter().position(|item| item.id() == id)?;
        if self.current == Some(id) {
            self.current = None;
        }
        Some(self.items.remove(index))
    }

    /// Points "current" at `id`. An id that is not in the collection clears the pointer.
    pub fn select(&mut self, id: Option<T::Id>) {
        self.current = id.filter(|id| self.contains(*id));
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub final_estimate: Option<Estimate>,
}

impl Entity for Task {
    type Id = TaskId;
    type Patch = TaskPatch;

    fn id(&self) -> TaskId {
        self.id
    }

    fn merge(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        if let Some(estimate) = &patch.final_estimate {
            self.final_estimate = Some(estimate.clone());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPatch {
    pub name: Option<String>,
    /// `Some(None)` detaches the room from its group.
    pub group_id: Option<Option<GroupId>>,
}

impl Entity for Room {
    type Id = RoomId;
    type Patch = RoomPatch;

    fn id(&self) -> RoomId {
        self.id
    }

    fn merge(&mut self, patch: &RoomPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(group_id) = patch.group_id {
            self.group_id = group_id;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPatch {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl Entity for Group {
    type Id = GroupId;
    type Patch = GroupPatch;

    fn id(&self) -> GroupId {
        self.id
    }

    fn merge(&mut self, patch: &GroupPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
    }
}

use std::{
    fmt,
    str::FromStr,
    sync::mpsc::{self, Receiver, Sender},
};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub u64);

impl CategoryId {
    pub fn new(id: u64) -> Self {
        CategoryId(id)
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

impl Color {
    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Color {
            red,
            green,
            blue,
            alpha: u8::MAX,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)?;
        if self.alpha != u8::MAX {
            write!(f, "{:02x}", self.alpha)?;
        }
        Ok(())
    }
}

impl FromStr for Color {
    type Err = String;

    /// Parses `#rrggbb` or `#rrggbbaa`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let hex = value.trim().trim_start_matches('#');
        if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
            return Err(format!("Invalid color '{}', expected #rrggbb", value));
        }

        let component = |at: usize| {
            u8::from_str_radix(&hex[at..at + 2], 16)
                .map_err(|_| format!("Invalid color '{}', expected #rrggbb", value))
        };

        Ok(Color {
            red: component(0)?,
            green: component(2)?,
            blue: component(4)?,
            alpha: if hex.len() == 8 { component(6)? } else { u8::MAX },
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub title: String,
    pub color: Color,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CategoryEvent {
    Removed(Category),
}

/// Ordered set of categories with unique, non-empty titles.
///
/// Removal is published to every receiver handed out by [`subscribe`]
/// before `remove` returns. Receivers that have been dropped are pruned on
/// the next publish.
///
/// [`subscribe`]: CategoryRegistry::subscribe
#[derive(Debug)]
pub struct CategoryRegistry {
    categories: Vec<Category>,
    next_category_id: u64,
    subscribers: Vec<Sender<CategoryEvent>>,
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CategoryRegistry {
    pub fn new() -> Self {
        Self {
            categories: Vec::new(),
            next_category_id: 1,
            subscribers: Vec::new(),
        }
    }

    /// Rebuilds a registry from stored categories, in order, applying the
    /// same checks as [`CategoryRegistry::insert`].
    pub fn from_categories(categories: Vec<Category>) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for category in categories {
            let index = registry.len();
            registry.insert(category, index)?;
        }
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    pub fn get(&self, id: CategoryId) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn position(&self, id: CategoryId) -> Option<usize> {
        self.categories.iter().position(|c| c.id == id)
    }

    pub fn find(&self, title: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.title == title)
    }

    /// Allocates an id for a new category. The category is not registered
    /// until it is passed to [`CategoryRegistry::insert`].
    pub fn create(&mut self, title: &str, color: Color) -> Category {
        let id = CategoryId::new(self.next_category_id);
        self.next_category_id += 1;
        Category {
            id,
            title: title.trim().to_string(),
            color,
        }
    }

    pub fn insert(&mut self, mut category: Category, index: usize) -> Result<(), RegistryError> {
        category.title = category.title.trim().to_string();
        self.check_title(&category.title, Some(category.id))?;
        if self.get(category.id).is_some() {
            return Err(RegistryError::DuplicateId(category.id));
        }
        if index > self.categories.len() {
            return Err(RegistryError::IndexOutOfBounds {
                index,
                len: self.categories.len(),
            });
        }

        self.next_category_id = self.next_category_id.max(category.id.0 + 1);
        debug!(
            "event=category_insert module=registry status=ok id={} index={}",
            category.id.0, index
        );
        self.categories.insert(index, category);
        Ok(())
    }

    pub fn rename(&mut self, id: CategoryId, new_title: &str) -> Result<(), RegistryError> {
        let new_title = new_title.trim();
        self.check_title(new_title, Some(id))?;

        let category = self
            .categories
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(RegistryError::UnknownCategory(id))?;
        if category.title != new_title {
            category.title = new_title.to_string();
            debug!(
                "event=category_rename module=registry status=ok id={}",
                id.0
            );
        }
        Ok(())
    }

    pub fn set_color(&mut self, id: CategoryId, color: Color) -> Result<(), RegistryError> {
        let category = self
            .categories
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(RegistryError::UnknownCategory(id))?;
        category.color = color;
        Ok(())
    }

    pub fn move_category(&mut self, from: usize, to: usize) -> Result<(), RegistryError> {
        let len = self.categories.len();
        for index in [from, to] {
            if index >= len {
                return Err(RegistryError::IndexOutOfBounds { index, len });
            }
        }

        let category = self.categories.remove(from);
        self.categories.insert(to, category);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<Category, RegistryError> {
        if index >= self.categories.len() {
            return Err(RegistryError::IndexOutOfBounds {
                index,
                len: self.categories.len(),
            });
        }

        let removed = self.categories.remove(index);
        self.publish(CategoryEvent::Removed(removed.clone()));
        info!(
            "event=category_remove module=registry status=ok id={} subscribers={}",
            removed.id.0,
            self.subscribers.len()
        );
        Ok(removed)
    }

    pub fn subscribe(&mut self) -> Receiver<CategoryEvent> {
        let (sender, receiver) = mpsc::channel();
        self.subscribers.push(sender);
        receiver
    }

    fn publish(&mut self, event: CategoryEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    fn check_title(&self, title: &str, owner: Option<CategoryId>) -> Result<(), RegistryError> {
        if title.is_empty() {
            return Err(RegistryError::EmptyTitle);
        }
        match self.find(title) {
            Some(existing) if Some(existing.id) != owner => {
                Err(RegistryError::DuplicateTitle(title.to_string()))
            }
            _ => Ok(()),
        }
    }
}

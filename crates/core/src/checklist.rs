//! Per-stage checklists carried by every project.

use serde::{Deserialize, Serialize};

/// Maximum length of a single checklist item's text.
pub const MAX_ITEM_TEXT_LENGTH: usize = 500;

/// Maximum number of items in one checklist.
pub const MAX_ITEMS_PER_CHECKLIST: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub text: String,
    pub completed: bool,
}

impl ChecklistItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            completed: false,
        }
    }

    pub fn done(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            completed: true,
        }
    }
}

/// The four independent ordered checklists of a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklists {
    pub design: Vec<ChecklistItem>,
    pub development: Vec<ChecklistItem>,
    pub qa: Vec<ChecklistItem>,
    pub delivery: Vec<ChecklistItem>,
}

impl Checklists {
    fn lists_mut(&mut self) -> [&mut Vec<ChecklistItem>; 4] {
        [
            &mut self.design,
            &mut self.development,
            &mut self.qa,
            &mut self.delivery,
        ]
    }

    /// Copy with every item's `completed` flag cleared. Order and text are
    /// preserved.
    pub fn reset(&self) -> Checklists {
        let mut reset = self.clone();
        for list in reset.lists_mut() {
            for item in list.iter_mut() {
                item.completed = false;
            }
        }
        reset
    }

    pub fn all_items(&self) -> impl Iterator<Item = &ChecklistItem> {
        self.design
            .iter()
            .chain(&self.development)
            .chain(&self.qa)
            .chain(&self.delivery)
    }

    pub fn completed_count(&self) -> usize {
        self.all_items().filter(|i| i.completed).count()
    }
}

/// Validate a checklist supplied at the boundary.
pub fn validate_checklist(name: &str, items: &[ChecklistItem]) -> Result<(), String> {
    if items.len() > MAX_ITEMS_PER_CHECKLIST {
        return Err(format!(
            "{name} checklist has {} items, maximum is {MAX_ITEMS_PER_CHECKLIST}",
            items.len()
        ));
    }
    for (idx, item) in items.iter().enumerate() {
        let text = item.text.trim();
        if text.is_empty() {
            return Err(format!("{name} checklist item {idx} has empty text"));
        }
        if item.text.chars().count() > MAX_ITEM_TEXT_LENGTH {
            return Err(format!(
                "{name} checklist item {idx} exceeds {MAX_ITEM_TEXT_LENGTH} characters"
            ));
        }
    }
    Ok(())
}

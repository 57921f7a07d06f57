use std::fmt;
use std::str::FromStr;

use crate::error::RecordError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    PressKey,
    TypeText,
    Wait,
    ClickAtAnchor,
    ClickAtFixedPoint,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        ActionKind::PressKey,
        ActionKind::TypeText,
        ActionKind::Wait,
        ActionKind::ClickAtAnchor,
        ActionKind::ClickAtFixedPoint,
    ];

    /// Label used by the rule editor and in saved rule files.
    pub fn label(self) -> &'static str {
        match self {
            ActionKind::PressKey => "Press Key",
            ActionKind::TypeText => "Type Text",
            ActionKind::Wait => "Wait (ms)",
            ActionKind::ClickAtAnchor => "Click Found Spot",
            ActionKind::ClickAtFixedPoint => "Click Custom (X,Y)",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ActionKind::PressKey => "press_key",
            ActionKind::TypeText => "type_text",
            ActionKind::Wait => "wait",
            ActionKind::ClickAtAnchor => "click_anchor",
            ActionKind::ClickAtFixedPoint => "click_at",
        }
    }
}

impl FromStr for ActionKind {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.label() == s || k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| RecordError::UnknownAction(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// One keydown + keyup of a key symbol.
    PressKey(String),
    /// Typed one character at a time.
    TypeText(String),
    /// Milliseconds.
    Wait(u64),
    /// Click the anchor of the hit that fired the rule.
    ClickAtAnchor,
    /// Click at "x, y". Parsed when executed.
    ClickAtFixedPoint(String),
}

impl Action {
    /// Build from a kind and its text payload. Wait payloads are
    /// milliseconds, fractional values allowed.
    pub fn from_parts(kind: ActionKind, value: &str) -> Result<Self, RecordError> {
        Ok(match kind {
            ActionKind::PressKey => Action::PressKey(value.trim().to_string()),
            ActionKind::TypeText => Action::TypeText(value.to_string()),
            ActionKind::Wait => {
                let ms: f64 = value
                    .trim()
                    .parse()
                    .map_err(|_| RecordError::BadNumber { field: "wait", value: value.to_string() })?;
                if !ms.is_finite() || ms < 0.0 {
                    return Err(RecordError::BadNumber { field: "wait", value: value.to_string() });
                }
                Action::Wait(ms.round() as u64)
            }
            ActionKind::ClickAtAnchor => Action::ClickAtAnchor,
            ActionKind::ClickAtFixedPoint => Action::ClickAtFixedPoint(value.to_string()),
        })
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::PressKey(_) => ActionKind::PressKey,
            Action::TypeText(_) => ActionKind::TypeText,
            Action::Wait(_) => ActionKind::Wait,
            Action::ClickAtAnchor => ActionKind::ClickAtAnchor,
            Action::ClickAtFixedPoint(_) => ActionKind::ClickAtFixedPoint,
        }
    }

    pub fn value(&self) -> String {
        match self {
            Action::PressKey(s) | Action::TypeText(s) | Action::ClickAtFixedPoint(s) => s.clone(),
            Action::Wait(ms) => ms.to_string(),
            Action::ClickAtAnchor => String::new(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.kind().label(), self.value())
    }
}

/// Ordered actions of one rule. Edits keep the relative order of every
/// element they do not touch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionList {
    items: Vec<Action>,
}

impl ActionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Action) {
        self.items.push(action);
    }

    pub fn remove(&mut self, index: usize) -> Option<Action> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    /// Swap `index` with its predecessor. False at the top or out of range.
    pub fn move_up(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.items.len() {
            return false;
        }
        self.items.swap(index - 1, index);
        true
    }

    /// Swap `index` with its successor. False at the bottom or out of range.
    pub fn move_down(&mut self, index: usize) -> bool {
        if index + 1 >= self.items.len() {
            return false;
        }
        self.items.swap(index, index + 1);
        true
    }

    pub fn get(&self, index: usize) -> Option<&Action> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Action> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<Action> for ActionList {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        Self { items: iter.into_iter().collect() }
    }
}

impl<'a> IntoIterator for &'a ActionList {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

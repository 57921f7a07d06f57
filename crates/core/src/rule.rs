use crate::action::ActionList;
use crate::detector::{DetectionSpec, Detector, MatchDefaults};
use crate::error::RecordError;

/// A named detection condition with the actions to run when it holds.
#[derive(Debug)]
pub struct Rule {
    pub name: String,
    pub spec: DetectionSpec,
    pub detector: Detector,
    pub actions: ActionList,
}

impl Rule {
    pub fn new(
        name: impl Into<String>,
        spec: DetectionSpec,
        actions: ActionList,
        defaults: &MatchDefaults,
    ) -> Result<Self, RecordError> {
        let detector = Detector::new(&spec, defaults)?;
        Ok(Self { name: name.into(), spec, detector, actions })
    }

    /// Short tag for lists: IMG or PXL.
    pub fn tag(&self) -> &'static str {
        if self.spec.is_image() {
            "IMG"
        } else {
            "PXL"
        }
    }
}

/// The ordered, editable rule list plus the editor's selection.
#[derive(Debug, Default)]
pub struct RuleChain {
    rules: Vec<Rule>,
    selected: Option<usize>,
}

impl RuleChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Remove the rule at `index`. A selection on it is cleared, a selection
    /// after it moves down one so it keeps pointing at the same rule.
    pub fn remove(&mut self, index: usize) -> Option<Rule> {
        if index >= self.rules.len() {
            return None;
        }
        let rule = self.rules.remove(index);
        self.selected = match self.selected {
            Some(s) if s == index => None,
            Some(s) if s > index => Some(s - 1),
            other => other,
        };
        Some(rule)
    }

    /// Select a rule, or clear the selection. Out-of-range indices clear it.
    pub fn select(&mut self, index: Option<usize>) {
        self.selected = index.filter(|&i| i < self.rules.len());
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_rule(&self) -> Option<&Rule> {
        self.selected.and_then(|i| self.rules.get(i))
    }

    pub fn selected_rule_mut(&mut self) -> Option<&mut Rule> {
        self.selected.and_then(|i| self.rules.get_mut(i))
    }

    pub fn get(&self, index: usize) -> Option<&Rule> {
        self.rules.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Rule> {
        self.rules.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Image rules need a region snapshot every tick; pixel rules do not.
    pub fn has_image_rules(&self) -> bool {
        self.rules.iter().any(|r| r.spec.is_image())
    }
}

//! Dataset slots: nested sub-aggregations fed by the calculator
//!
//! A slot evaluates its own expressions on every record, folds them into
//! its collected data when its scope's increment fires, and clears when its
//! scope resets. Unlike variables a slot has a single scope for both
//! decisions, and the calculator never reads what it collected.

use crate::error::EvaluationError;
use crate::evaluator::FillExpressionEvaluator;
use crate::expression::{EvaluationMode, ExpressionId};
use crate::group::GroupId;
use crate::scope::{ResetScope, ScopeBinding};
use crate::value::Value;
use std::any::Any;
use std::fmt;

/// Storage behind a dataset slot
pub trait DatasetCollector: Any + fmt::Debug + Send {
    /// Discard everything collected so far
    fn initialize(&mut self);

    /// Evaluate the slot's expressions for the current record
    fn evaluate(&mut self, evaluator: &dyn FillExpressionEvaluator) -> Result<(), EvaluationError>;

    /// Fold the last evaluated values into the collected data
    fn increment(&mut self);

    fn as_any(&self) -> &dyn Any;
}

/// A named dataset slot
#[derive(Debug)]
pub struct ElementDataset {
    name: String,
    scope: ScopeBinding,
    collector: Box<dyn DatasetCollector>,
}

impl ElementDataset {
    pub fn new(
        name: impl Into<String>,
        scope: ResetScope,
        collector: impl DatasetCollector,
    ) -> Self {
        Self {
            name: name.into(),
            scope: ScopeBinding::new(scope),
            collector: Box::new(collector),
        }
    }

    pub fn on_group(mut self, group: GroupId) -> Self {
        self.scope = ScopeBinding::group(group);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> ScopeBinding {
        self.scope
    }

    pub fn collector(&self) -> &dyn DatasetCollector {
        self.collector.as_ref()
    }

    /// Typed access to the collected data
    pub fn collector_as<T: DatasetCollector>(&self) -> Option<&T> {
        self.collector.as_any().downcast_ref::<T>()
    }

    pub fn evaluate(&mut self, evaluator: &dyn FillExpressionEvaluator) -> Result<(), EvaluationError> {
        self.collector.evaluate(evaluator)
    }

    pub fn increment(&mut self) {
        self.collector.increment();
    }

    pub fn initialize(&mut self) {
        self.collector.initialize();
    }
}

/// Collects `(category, value)` pairs, one per category, in first-seen order.
/// A later value for a known category replaces the earlier one.
#[derive(Debug, Clone, Default)]
pub struct CategorySeriesCollector {
    category: Option<ExpressionId>,
    value: Option<ExpressionId>,
    pending: Option<(Value, Value)>,
    entries: Vec<(Value, Value)>,
}

impl CategorySeriesCollector {
    pub fn new(category: Option<ExpressionId>, value: Option<ExpressionId>) -> Self {
        Self {
            category,
            value,
            pending: None,
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[(Value, Value)] {
        &self.entries
    }

    pub fn get(&self, category: &Value) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(c, _)| !c.differs_from(category))
            .map(|(_, v)| v)
    }
}

impl DatasetCollector for CategorySeriesCollector {
    fn initialize(&mut self) {
        self.pending = None;
        self.entries.clear();
    }

    fn evaluate(&mut self, evaluator: &dyn FillExpressionEvaluator) -> Result<(), EvaluationError> {
        let category = evaluator.evaluate(self.category, EvaluationMode::Default)?;
        let value = evaluator.evaluate(self.value, EvaluationMode::Default)?;
        self.pending = Some((category, value));
        Ok(())
    }

    fn increment(&mut self) {
        let Some((category, value)) = self.pending.take() else {
            return;
        };
        match self
            .entries
            .iter_mut()
            .find(|(c, _)| !c.differs_from(&category))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((category, value)),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

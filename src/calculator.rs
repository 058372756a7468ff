//! The calculator: evaluation order across variables, groups and slots
//!
//! The calculator is reactive. The caller drives it once per record
//! ([`Calculator::calculate_variables`]), once per look-ahead pass
//! ([`Calculator::estimate_variables`] then
//! [`Calculator::estimate_group_ruptures`]) and once per confirmed layout
//! boundary ([`Calculator::initialize_variables`]). It never decides on its
//! own which boundary fired.
//!
//! Every pass is fail-fast: the first evaluation error aborts the pass and
//! entities updated before the failure keep their new state.

use crate::dataset::Dataset;
use crate::element_dataset::ElementDataset;
use crate::error::{EvaluationError, EvaluatorInitError};
use crate::evaluator::{EvaluationContext, ExpressionEvaluator, FillExpressionEvaluator};
use crate::expression::{EvaluationMode, ExpressionId};
use crate::group::Group;
use crate::incrementer::ValueProvider;
use crate::scope::ResetScope;
use crate::value::Value;
use crate::variable::{Variable, VariableId, COLUMN_NUMBER, PAGE_NUMBER};
use tracing::{debug, trace};

#[derive(Debug)]
pub struct Calculator<E> {
    evaluator: E,
    dataset: Dataset,
    element_datasets: Vec<ElementDataset>,
    page_number: Option<VariableId>,
    column_number: Option<VariableId>,
}

impl<E: ExpressionEvaluator> Calculator<E> {
    /// Take ownership of a dataset and initialize the evaluator against its
    /// bindings.
    pub fn new(mut evaluator: E, mut dataset: Dataset) -> Result<Self, EvaluatorInitError> {
        evaluator.init(dataset.bindings(), dataset.when_resource_missing())?;
        let element_datasets = dataset.take_element_datasets();
        let page_number = dataset.variable_id(PAGE_NUMBER);
        let column_number = dataset.variable_id(COLUMN_NUMBER);

        debug!(
            dataset = dataset.name(),
            variables = dataset.variables().len(),
            groups = dataset.groups().len(),
            element_datasets = element_datasets.len(),
            "calculator initialized"
        );

        Ok(Self {
            evaluator,
            dataset,
            element_datasets,
            page_number,
            column_number,
        })
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn dataset_mut(&mut self) -> &mut Dataset {
        &mut self.dataset
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn evaluator_mut(&mut self) -> &mut E {
        &mut self.evaluator
    }

    pub fn element_datasets(&self) -> &[ElementDataset] {
        &self.element_datasets
    }

    pub fn element_dataset(&self, name: &str) -> Option<&ElementDataset> {
        self.element_datasets.iter().find(|d| d.name() == name)
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.dataset.variable(name)
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.dataset.group(name)
    }

    pub fn page_number(&self) -> Option<&Variable> {
        self.page_number
            .and_then(|id| self.dataset.variables().get(id.index()))
    }

    pub fn page_number_mut(&mut self) -> Option<&mut Variable> {
        let id = self.page_number?;
        self.dataset.variables_mut().get_mut(id.index())
    }

    pub fn column_number(&self) -> Option<&Variable> {
        self.column_number
            .and_then(|id| self.dataset.variables().get(id.index()))
    }

    pub fn column_number_mut(&mut self) -> Option<&mut Variable> {
        let id = self.column_number?;
        self.dataset.variables_mut().get_mut(id.index())
    }

    /// Advance the dataset to the next record (see [`Dataset::next_record`])
    pub fn next_record<K, I>(&mut self, record: I)
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, Value)>,
    {
        self.dataset.next_record(record);
    }

    fn context(&self) -> EvaluationContext<'_, E> {
        EvaluationContext::new(&self.evaluator, &self.dataset)
    }

    /// Fold the record into every variable and feed every dataset slot
    pub fn calculate_variables(&mut self) -> Result<(), EvaluationError> {
        for index in 0..self.dataset.variables().len() {
            let value = self.fold(index, ValueProvider::Current)?;

            let variable = &mut self.dataset.variables_mut()[index];
            variable.set_value(value);
            variable.set_initialized(false);

            if variable.reset().is_none() || variable.increment().is_none() {
                variable.snapshot();
            }
        }

        for element_dataset in &mut self.element_datasets {
            let context = EvaluationContext::new(&self.evaluator, &self.dataset);
            element_dataset.evaluate(&context)?;

            if element_dataset.scope().is_none() {
                element_dataset.increment();
            }
        }

        Ok(())
    }

    /// Compute every variable's look-ahead value into its estimated value.
    ///
    /// Current values and the initialized flag are left alone, so estimation
    /// never disturbs the authoritative aggregates. Dataset slots are not
    /// estimated.
    pub fn estimate_variables(&mut self) -> Result<(), EvaluationError> {
        for index in 0..self.dataset.variables().len() {
            let value = self.fold(index, ValueProvider::Estimated)?;
            self.dataset.variables_mut()[index].set_estimated_value(value);
        }
        Ok(())
    }

    /// Determine group breaks from estimated values.
    ///
    /// [`Calculator::estimate_variables`] must have run for this record. Must
    /// not be called twice for the same record without an
    /// [`Calculator::initialize_variables`] in between: the group-scoped
    /// snapshot is not idempotent.
    pub fn estimate_group_ruptures(&mut self) -> Result<(), EvaluationError> {
        if self.dataset.groups().is_empty() {
            return Ok(());
        }

        // inner groups first, so that group-incremented variables feeding an
        // outer group's expression get snapshotted before the outer check
        self.detect_changes_inner_to_outer()?;
        self.snapshot_group_increments();
        self.estimate_variables()?;
        self.cascade_changes_outer_to_inner()
    }

    /// Apply a confirmed boundary at `reset` granularity.
    ///
    /// For each variable the increment step (snapshot) runs strictly before
    /// the initialize step, so the snapshot captures the epoch's final value.
    /// A reset that fires together with the variable's increment keeps that
    /// snapshot in `incremented_value`; a reset alone clears it to null.
    pub fn initialize_variables(&mut self, reset: ResetScope) -> Result<(), EvaluationError> {
        debug!(dataset = self.dataset.name(), scope = %reset, "initializing variables");

        for index in 0..self.dataset.variables().len() {
            let incremented = self.increment_variable(index, reset);
            self.initialize_variable(index, reset, incremented)?;
        }

        let groups = self.dataset.groups();
        for element_dataset in &mut self.element_datasets {
            if element_dataset.scope().applies(reset, groups) {
                element_dataset.increment();
                element_dataset.initialize();
            }
        }

        Ok(())
    }

    /// Evaluate an expression in the given mode
    pub fn evaluate(
        &self,
        expression: Option<ExpressionId>,
        mode: EvaluationMode,
    ) -> Result<Value, EvaluationError> {
        self.context().evaluate(expression, mode)
    }

    pub fn evaluate_old(&self, expression: Option<ExpressionId>) -> Result<Value, EvaluationError> {
        self.context().evaluate_old(expression)
    }

    pub fn evaluate_estimated(
        &self,
        expression: Option<ExpressionId>,
    ) -> Result<Value, EvaluationError> {
        self.context().evaluate_estimated(expression)
    }

    pub fn evaluate_current(
        &self,
        expression: Option<ExpressionId>,
    ) -> Result<Value, EvaluationError> {
        self.context().evaluate_current(expression)
    }

    /// Evaluate a variable's expression and fold it through its strategy
    fn fold(&self, index: usize, provider: ValueProvider) -> Result<Value, EvaluationError> {
        let variables = self.dataset.variables();
        let variable = &variables[index];
        let expression_value = match provider {
            ValueProvider::Current => self.context().evaluate_current(variable.expression())?,
            ValueProvider::Estimated => self.context().evaluate_estimated(variable.expression())?,
        };

        variable
            .calculation()
            .increment(variable, expression_value, provider, variables)
            .map_err(|kind| EvaluationError {
                expression: variable.expression(),
                kind,
            })
    }

    fn group_differs(&self, index: usize) -> Result<bool, EvaluationError> {
        let expression = self.dataset.groups()[index].expression();
        let context = self.context();
        let old_value = context.evaluate_old(expression)?;
        let estimated_value = context.evaluate_estimated(expression)?;
        Ok(old_value.differs_from(&estimated_value))
    }

    fn detect_changes_inner_to_outer(&mut self) -> Result<(), EvaluationError> {
        for index in (0..self.dataset.groups().len()).rev() {
            let changed = self.group_differs(index)?;
            self.dataset.groups_mut()[index].set_has_changed(changed);
        }
        Ok(())
    }

    fn snapshot_group_increments(&mut self) {
        let (variables, groups) = self.dataset.variables_and_groups_mut();
        for variable in variables.iter_mut() {
            let increment = variable.increment();
            if increment.is_group() && increment.group_changed(groups) {
                trace!(variable = variable.name(), "group increment snapshot");
                variable.snapshot();
            }
        }
    }

    fn cascade_changes_outer_to_inner(&mut self) -> Result<(), EvaluationError> {
        let mut cascade_changed = false;

        for index in 0..self.dataset.groups().len() {
            let mut is_top_level_change = false;

            if !cascade_changed && self.group_differs(index)? {
                cascade_changed = true;
                is_top_level_change = true;
            }

            let group = &mut self.dataset.groups_mut()[index];
            group.set_has_changed(cascade_changed);
            group.set_top_level_change(is_top_level_change);

            if is_top_level_change {
                debug!(group = group.name(), "group break detected");
            }
        }

        Ok(())
    }

    /// Snapshot the variable if its increment scope is reached by `reset`.
    /// Returns whether a snapshot was taken.
    fn increment_variable(&mut self, index: usize, reset: ResetScope) -> bool {
        let (variables, groups) = self.dataset.variables_and_groups_mut();
        let variable = &mut variables[index];
        let increment = variable.increment();

        if increment.is_none() || increment.applies(reset, groups) {
            trace!(variable = variable.name(), scope = %reset, "increment");
            variable.snapshot();
            true
        } else {
            false
        }
    }

    fn initialize_variable(
        &mut self,
        index: usize,
        reset: ResetScope,
        incremented: bool,
    ) -> Result<(), EvaluationError> {
        let variable = &self.dataset.variables()[index];
        let binding = variable.reset();

        if binding.is_none() {
            let value = self.context().evaluate_current(variable.expression())?;
            let variable = &mut self.dataset.variables_mut()[index];
            variable.set_value(value);
            variable.snapshot();
        } else if binding.applies(reset, self.dataset.groups()) {
            let value = self
                .context()
                .evaluate_current(variable.initial_value_expression())?;
            let variable = &mut self.dataset.variables_mut()[index];
            trace!(variable = variable.name(), scope = %reset, "reset");
            variable.set_value(value);
            variable.set_initialized(true);
            // keep the epoch's final value if this boundary just captured it
            if !incremented {
                variable.set_incremented_value(Value::Null);
            }
        }

        Ok(())
    }
}

impl<E: ExpressionEvaluator> FillExpressionEvaluator for Calculator<E> {
    fn evaluate(
        &self,
        expression: Option<ExpressionId>,
        mode: EvaluationMode,
    ) -> Result<Value, EvaluationError> {
        Calculator::evaluate(self, expression, mode)
    }
}

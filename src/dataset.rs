//! The dataset arena for one fill session
//!
//! A [`Dataset`] owns every entity the calculator works on: parameters,
//! record fields, resource messages, variables (in evaluation order), groups
//! (outer to inner) and dataset slots. Entities refer to each other through
//! [`VariableId`] and [`GroupId`] indices into this arena.

use crate::element_dataset::ElementDataset;
use crate::error::DescriptorError;
use crate::group::{Group, GroupId};
use crate::incrementer::Calculation;
use crate::scope::ResetScope;
use crate::value::Value;
use crate::variable::{Variable, VariableId, COLUMN_NUMBER, PAGE_NUMBER};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a resource expression yields when its key has no message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhenResourceMissing {
    /// Evaluate to null
    #[default]
    Null,
    /// Evaluate to an empty string
    Empty,
    /// Evaluate to the key itself
    Key,
    /// Fail the evaluation
    Error,
}

/// A record field: the current record's value and the previous one's
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Field {
    value: Value,
    old_value: Value,
}

impl Field {
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn old_value(&self) -> &Value {
        &self.old_value
    }
}

/// Name maps an evaluator resolves references against
#[derive(Debug, Clone, Copy)]
pub struct Bindings<'a> {
    pub parameters: &'a HashMap<String, Value>,
    pub fields: &'a HashMap<String, Field>,
    pub variables: &'a HashMap<String, VariableId>,
}

impl Bindings<'_> {
    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }
}

#[derive(Debug)]
pub struct Dataset {
    name: String,
    parameters: HashMap<String, Value>,
    fields: HashMap<String, Field>,
    resources: HashMap<String, String>,
    variables: Vec<Variable>,
    variable_names: HashMap<String, VariableId>,
    groups: Vec<Group>,
    element_datasets: Vec<ElementDataset>,
    when_resource_missing: WhenResourceMissing,
}

impl Dataset {
    /// Create an empty dataset
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: HashMap::new(),
            fields: HashMap::new(),
            resources: HashMap::new(),
            variables: Vec::new(),
            variable_names: HashMap::new(),
            groups: Vec::new(),
            element_datasets: Vec::new(),
            when_resource_missing: WhenResourceMissing::default(),
        }
    }

    /// Add the [`PAGE_NUMBER`] and [`COLUMN_NUMBER`] system variables.
    ///
    /// Both are maintained by the filler; the calculator only resets them
    /// (per report and per page respectively).
    pub fn with_builtin_variables(mut self) -> Self {
        for (name, reset) in [(PAGE_NUMBER, ResetScope::Report), (COLUMN_NUMBER, ResetScope::Page)] {
            if !self.variable_names.contains_key(name) {
                let id = VariableId(self.variables.len());
                self.variables
                    .push(Variable::new(name, Calculation::System).reset_on(reset));
                self.variable_names.insert(name.to_string(), id);
            }
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_parameter(&mut self, name: impl Into<String>, value: Value) {
        self.parameters.insert(name.into(), value);
    }

    pub fn add_field(&mut self, name: impl Into<String>) {
        self.fields.entry(name.into()).or_default();
    }

    pub fn set_resource(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.resources.insert(key.into(), message.into());
    }

    pub fn set_when_resource_missing(&mut self, policy: WhenResourceMissing) {
        self.when_resource_missing = policy;
    }

    /// Append a variable to the evaluation order
    pub fn add_variable(&mut self, variable: Variable) -> Result<VariableId, DescriptorError> {
        if self.variable_names.contains_key(variable.name()) {
            return Err(DescriptorError::DuplicateName(variable.name().to_string()));
        }
        let id = VariableId(self.variables.len());
        self.variable_names.insert(variable.name().to_string(), id);
        self.variables.push(variable);
        Ok(id)
    }

    /// Append a group, nested inside every group added before it
    pub fn add_group(&mut self, group: Group) -> Result<GroupId, DescriptorError> {
        if self.group_id(group.name()).is_some() {
            return Err(DescriptorError::DuplicateName(group.name().to_string()));
        }
        self.groups.push(group);
        Ok(GroupId(self.groups.len() - 1))
    }

    pub fn add_element_dataset(&mut self, element_dataset: ElementDataset) {
        self.element_datasets.push(element_dataset);
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn resource(&self, key: &str) -> Option<&str> {
        self.resources.get(key).map(String::as_str)
    }

    pub fn when_resource_missing(&self) -> WhenResourceMissing {
        self.when_resource_missing
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable_id(&self, name: &str) -> Option<VariableId> {
        self.variable_names.get(name).copied()
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variable_id(name).and_then(|id| self.variables.get(id.index()))
    }

    pub fn variable_mut(&mut self, name: &str) -> Option<&mut Variable> {
        let id = self.variable_id(name)?;
        self.variables.get_mut(id.index())
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn group_id(&self, name: &str) -> Option<GroupId> {
        self.groups
            .iter()
            .position(|g| g.name() == name)
            .map(GroupId)
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.group_id(name).map(|id| &self.groups[id.index()])
    }

    /// Slots declared on this dataset. [`Calculator::new`] moves them into
    /// the calculator, after which this is empty; use
    /// [`Calculator::element_datasets`] instead.
    ///
    /// [`Calculator::new`]: crate::calculator::Calculator::new
    /// [`Calculator::element_datasets`]: crate::calculator::Calculator::element_datasets
    pub fn element_datasets(&self) -> &[ElementDataset] {
        &self.element_datasets
    }

    pub fn bindings(&self) -> Bindings<'_> {
        Bindings {
            parameters: &self.parameters,
            fields: &self.fields,
            variables: &self.variable_names,
        }
    }

    /// Move to the next record.
    ///
    /// Every field's current value becomes its old value and is replaced by
    /// the record's value (null when the record omits it). Every variable's
    /// current value becomes its old value. Names that are not declared
    /// fields are ignored.
    pub fn next_record<K, I>(&mut self, record: I)
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, Value)>,
    {
        for field in self.fields.values_mut() {
            field.old_value = std::mem::take(&mut field.value);
        }
        for (name, value) in record {
            match self.fields.get_mut(name.as_ref()) {
                Some(field) => field.value = value,
                None => tracing::warn!(
                    dataset = %self.name,
                    field = name.as_ref(),
                    "ignoring value for undeclared field"
                ),
            }
        }
        for variable in &mut self.variables {
            let current = variable.value().clone();
            variable.set_old_value(current);
        }
    }

    pub(crate) fn variables_mut(&mut self) -> &mut [Variable] {
        &mut self.variables
    }

    pub(crate) fn groups_mut(&mut self) -> &mut [Group] {
        &mut self.groups
    }

    /// Mutable variables alongside the groups that gate them
    pub(crate) fn variables_and_groups_mut(&mut self) -> (&mut [Variable], &[Group]) {
        (&mut self.variables, &self.groups)
    }

    pub(crate) fn take_element_datasets(&mut self) -> Vec<ElementDataset> {
        std::mem::take(&mut self.element_datasets)
    }
}

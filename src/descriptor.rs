//! Dataset descriptors
//!
//! A [`DatasetDescriptor`] declares everything a fill session aggregates
//! over: parameters, fields, resources, groups, variables and dataset slots.
//! Descriptors load from JSON, TOML or YAML and build into a [`Dataset`]
//! paired with an [`AstEvaluator`] holding every declared expression.
//!
//! ```toml
//! name = "orders"
//! fields = ["region", "amount"]
//!
//! [[groups]]
//! name = "region"
//! expression = { kind = "field", name = "region" }
//!
//! [[variables]]
//! name = "REGION_TOTAL"
//! calculation = "sum"
//! expression = { kind = "field", name = "amount" }
//! reset = "group"
//! reset_group = "region"
//! ```

use crate::calculator::Calculator;
use crate::dataset::{Dataset, WhenResourceMissing};
use crate::element_dataset::{CategorySeriesCollector, ElementDataset};
use crate::error::DescriptorError;
use crate::evaluator::AstEvaluator;
use crate::expression::{Expression, ExpressionId};
use crate::group::Group;
use crate::incrementer::Calculation;
use crate::scope::{ResetScope, ScopeBinding};
use crate::value::Value;
use crate::variable::Variable;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Declarative form of a [`Dataset`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub name: String,

    #[serde(default)]
    pub when_resource_missing: WhenResourceMissing,

    /// Add `PAGE_NUMBER` and `COLUMN_NUMBER`
    #[serde(default = "default_true")]
    pub builtin_variables: bool,

    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,

    #[serde(default)]
    pub fields: Vec<String>,

    #[serde(default)]
    pub resources: BTreeMap<String, String>,

    /// Outermost group first
    #[serde(default)]
    pub groups: Vec<GroupDescriptor>,

    /// In evaluation order
    #[serde(default)]
    pub variables: Vec<VariableDescriptor>,

    #[serde(default)]
    pub element_datasets: Vec<ElementDatasetDescriptor>,
}

fn default_true() -> bool {
    true
}

fn default_report() -> ResetScope {
    ResetScope::Report
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDescriptor {
    pub name: String,

    #[serde(default)]
    pub expression: Option<Expression>,
}

/// Built-in aggregation names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationKind {
    #[default]
    Nothing,
    Count,
    Sum,
    Average,
    Lowest,
    Highest,
    First,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDescriptor {
    pub name: String,

    #[serde(default)]
    pub calculation: CalculationKind,

    #[serde(default)]
    pub expression: Option<Expression>,

    #[serde(default)]
    pub initial_value: Option<Expression>,

    #[serde(default = "default_report")]
    pub reset: ResetScope,

    #[serde(default)]
    pub reset_group: Option<String>,

    #[serde(default)]
    pub increment: ResetScope,

    #[serde(default)]
    pub increment_group: Option<String>,
}

/// A category series slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDatasetDescriptor {
    pub name: String,

    #[serde(default = "default_report")]
    pub scope: ResetScope,

    #[serde(default)]
    pub group: Option<String>,

    #[serde(default)]
    pub category: Option<Expression>,

    #[serde(default)]
    pub value: Option<Expression>,
}

impl DatasetDescriptor {
    pub fn from_json_str(json: &str) -> Result<Self, DescriptorError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_toml_str(toml_str: &str) -> Result<Self, DescriptorError> {
        Ok(toml::from_str(toml_str)?)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, DescriptorError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a descriptor, picking the format from the file extension
    /// (`json`, `toml`, `yaml` or `yml`)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read descriptor: {}", path.display()))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let descriptor = match extension.as_str() {
            "json" => Self::from_json_str(&content),
            "toml" => Self::from_toml_str(&content),
            "yaml" | "yml" => Self::from_yaml_str(&content),
            other => Err(DescriptorError::UnsupportedFormat(other.to_string())),
        };

        descriptor.with_context(|| format!("Failed to load descriptor: {}", path.display()))
    }

    /// Build the dataset and an evaluator holding every declared expression.
    ///
    /// Each `average` variable is preceded by two helper variables,
    /// `<name>_COUNT` and `<name>_SUM`, sharing its expression and scopes.
    pub fn build(&self) -> Result<(Dataset, AstEvaluator), DescriptorError> {
        let mut dataset = Dataset::new(self.name.as_str());
        if self.builtin_variables {
            dataset = dataset.with_builtin_variables();
        }
        dataset.set_when_resource_missing(self.when_resource_missing);
        for (name, value) in &self.parameters {
            dataset.set_parameter(name.as_str(), value.clone());
        }
        for field in &self.fields {
            dataset.add_field(field.as_str());
        }
        for (key, message) in &self.resources {
            dataset.set_resource(key.as_str(), message.as_str());
        }

        let mut evaluator = AstEvaluator::new();

        for group in &self.groups {
            let expression = register(&mut evaluator, &group.expression);
            dataset.add_group(Group::new(group.name.as_str(), expression))?;
        }

        for variable in &self.variables {
            add_variable(&mut dataset, &mut evaluator, variable)?;
        }

        for slot in &self.element_datasets {
            let owner = format!("element dataset '{}'", slot.name);
            let scope = resolve_scope(&dataset, &owner, slot.scope, slot.group.as_deref())?;
            let collector = CategorySeriesCollector::new(
                register(&mut evaluator, &slot.category),
                register(&mut evaluator, &slot.value),
            );
            let mut element_dataset = ElementDataset::new(slot.name.as_str(), scope.scope, collector);
            if let Some(group) = scope.group {
                element_dataset = element_dataset.on_group(group);
            }
            dataset.add_element_dataset(element_dataset);
        }

        Ok((dataset, evaluator))
    }

    /// Build and hand the result to a new [`Calculator`]
    pub fn build_calculator(&self) -> Result<Calculator<AstEvaluator>, DescriptorError> {
        let (dataset, evaluator) = self.build()?;
        Ok(Calculator::new(evaluator, dataset)?)
    }
}

fn register(evaluator: &mut AstEvaluator, expression: &Option<Expression>) -> Option<ExpressionId> {
    expression
        .as_ref()
        .map(|expression| evaluator.register(expression.clone()))
}

fn resolve_scope(
    dataset: &Dataset,
    owner: &str,
    scope: ResetScope,
    group: Option<&str>,
) -> Result<ScopeBinding, DescriptorError> {
    if scope != ResetScope::Group {
        return Ok(ScopeBinding::new(scope));
    }
    let name = group.ok_or_else(|| DescriptorError::MissingGroup {
        owner: owner.to_string(),
    })?;
    let id = dataset
        .group_id(name)
        .ok_or_else(|| DescriptorError::UnknownGroup {
            owner: owner.to_string(),
            group: name.to_string(),
        })?;
    Ok(ScopeBinding::group(id))
}

fn add_variable(
    dataset: &mut Dataset,
    evaluator: &mut AstEvaluator,
    descriptor: &VariableDescriptor,
) -> Result<(), DescriptorError> {
    let owner = format!("variable '{}'", descriptor.name);
    let reset = resolve_scope(dataset, &owner, descriptor.reset, descriptor.reset_group.as_deref())?;
    let increment = resolve_scope(
        dataset,
        &owner,
        descriptor.increment,
        descriptor.increment_group.as_deref(),
    )?;

    let scoped = |mut variable: Variable| {
        variable = match reset.group {
            Some(group) => variable.reset_on_group(group),
            None => variable.reset_on(reset.scope),
        };
        match increment.group {
            Some(group) => variable.increment_on_group(group),
            None => variable.increment_on(increment.scope),
        }
    };

    let expression = register(evaluator, &descriptor.expression);
    let with_expression = |variable: Variable| match expression {
        Some(id) => variable.with_expression(id),
        None => variable,
    };

    let calculation = match descriptor.calculation {
        CalculationKind::Nothing => Calculation::Nothing,
        CalculationKind::Count => Calculation::Count,
        CalculationKind::Sum => Calculation::Sum,
        CalculationKind::Lowest => Calculation::Lowest,
        CalculationKind::Highest => Calculation::Highest,
        CalculationKind::First => Calculation::First,
        CalculationKind::System => Calculation::System,
        CalculationKind::Average => {
            let count = dataset.add_variable(scoped(with_expression(Variable::new(
                format!("{}_COUNT", descriptor.name),
                Calculation::Count,
            ))))?;
            let sum = dataset.add_variable(scoped(with_expression(Variable::new(
                format!("{}_SUM", descriptor.name),
                Calculation::Sum,
            ))))?;
            Calculation::Average { count, sum }
        }
    };

    let mut variable = scoped(with_expression(Variable::new(
        descriptor.name.as_str(),
        calculation,
    )));
    if let Some(initial) = register(evaluator, &descriptor.initial_value) {
        variable = variable.with_initial_value(initial);
    }
    dataset.add_variable(variable)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::GroupId;
    use crate::variable::{COLUMN_NUMBER, PAGE_NUMBER};
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const ORDERS_TOML: &str = r#"
        name = "orders"
        fields = ["region", "amount"]

        [parameters]
        rate = 2

        [[groups]]
        name = "region"
        expression = { kind = "field", name = "region" }

        [[variables]]
        name = "REGION_TOTAL"
        calculation = "sum"
        expression = { kind = "field", name = "amount" }
        initial_value = { kind = "literal", value = 0 }
        reset = "group"
        reset_group = "region"
        increment = "group"
        increment_group = "region"

        [[variables]]
        name = "AVG_AMOUNT"
        calculation = "average"
        expression = { kind = "field", name = "amount" }

        [[element_datasets]]
        name = "by_region"
        scope = "page"
        category = { kind = "field", name = "region" }
        value = { kind = "variable", name = "REGION_TOTAL" }
    "#;

    #[test]
    fn test_toml_descriptor_builds() {
        let descriptor = DatasetDescriptor::from_toml_str(ORDERS_TOML).unwrap();
        assert!(descriptor.builtin_variables);
        assert_eq!(descriptor.parameters.get("rate"), Some(&Value::Int(2)));

        let (dataset, evaluator) = descriptor.build().unwrap();
        let names: Vec<&str> = dataset.variables().iter().map(Variable::name).collect();
        assert_eq!(
            names,
            vec![
                PAGE_NUMBER,
                COLUMN_NUMBER,
                "REGION_TOTAL",
                "AVG_AMOUNT_COUNT",
                "AVG_AMOUNT_SUM",
                "AVG_AMOUNT"
            ]
        );

        let total = dataset.variable("REGION_TOTAL").unwrap();
        assert_eq!(total.reset(), ScopeBinding::group(GroupId(0)));
        assert_eq!(total.increment(), ScopeBinding::group(GroupId(0)));
        assert!(total.initial_value_expression().is_some());

        let average = dataset.variable("AVG_AMOUNT").unwrap();
        assert!(matches!(average.calculation(), Calculation::Average { .. }));
        assert_eq!(average.reset_scope(), ResetScope::Report);
        assert_eq!(average.increment_scope(), ResetScope::None);

        assert_eq!(dataset.element_datasets()[0].scope(), ScopeBinding::new(ResetScope::Page));
        // averages share their expression with the helpers
        assert_eq!(evaluator.len(), 6);
    }

    #[test]
    fn test_json_descriptor_defaults() {
        let descriptor = DatasetDescriptor::from_json_str(
            r#"{
                "name": "plain",
                "builtin_variables": false,
                "variables": [{ "name": "N", "calculation": "count" }]
            }"#,
        )
        .unwrap();
        assert_eq!(descriptor.when_resource_missing, WhenResourceMissing::Null);

        let (dataset, _) = descriptor.build().unwrap();
        assert_eq!(dataset.variables().len(), 1);
        assert_eq!(dataset.variable("N").unwrap().reset_scope(), ResetScope::Report);
    }

    #[test]
    fn test_yaml_descriptor() {
        let descriptor = DatasetDescriptor::from_yaml_str(
            r#"
name: listing
when_resource_missing: key
resources:
  title: Listing
variables:
  - name: ROW
    calculation: count
    expression: { kind: literal, value: 1 }
    reset: page
"#,
        )
        .unwrap();
        let (dataset, _) = descriptor.build().unwrap();
        assert_eq!(dataset.when_resource_missing(), WhenResourceMissing::Key);
        assert_eq!(dataset.resource("title"), Some("Listing"));
        assert_eq!(dataset.variable("ROW").unwrap().reset_scope(), ResetScope::Page);
    }

    #[test]
    fn test_group_scope_requires_group() {
        let descriptor = DatasetDescriptor::from_json_str(
            r#"{ "name": "d", "variables": [{ "name": "V", "reset": "group" }] }"#,
        )
        .unwrap();
        let err = descriptor.build().unwrap_err();
        assert!(matches!(err, DescriptorError::MissingGroup { owner } if owner == "variable 'V'"));
    }

    #[test]
    fn test_unknown_group_rejected() {
        let descriptor = DatasetDescriptor::from_json_str(
            r#"{
                "name": "d",
                "element_datasets": [{ "name": "S", "scope": "group", "group": "city" }]
            }"#,
        )
        .unwrap();
        let err = descriptor.build().unwrap_err();
        assert_eq!(err.to_string(), "element dataset 'S' references unknown group 'city'");
    }

    #[test]
    fn test_group_bound_element_dataset() {
        let descriptor = DatasetDescriptor::from_yaml_str(
            r#"
name: d
fields: [region, city]
groups:
  - name: region
    expression: { kind: field, name: region }
element_datasets:
  - name: cities_per_region
    scope: group
    group: region
    category: { kind: field, name: city }
"#,
        )
        .unwrap();
        let (dataset, _) = descriptor.build().unwrap();
        assert_eq!(
            dataset.element_datasets()[0].scope(),
            ScopeBinding::group(GroupId(0))
        );
    }

    #[test]
    fn test_builtin_name_clash_rejected() {
        let descriptor = DatasetDescriptor::from_json_str(
            r#"{ "name": "d", "variables": [{ "name": "PAGE_NUMBER" }] }"#,
        )
        .unwrap();
        assert!(matches!(
            descriptor.build().unwrap_err(),
            DescriptorError::DuplicateName(name) if name == PAGE_NUMBER
        ));
    }

    #[test]
    fn test_unresolved_reference_fails_calculator() {
        let descriptor = DatasetDescriptor::from_json_str(
            r#"{
                "name": "d",
                "variables": [{ "name": "V", "expression": { "kind": "field", "name": "missing" } }]
            }"#,
        )
        .unwrap();
        let err = descriptor.build_calculator().unwrap_err();
        assert!(matches!(err, DescriptorError::Init(_)));
    }

    #[test]
    fn test_invalid_toml() {
        let err = DatasetDescriptor::from_toml_str("name = ").unwrap_err();
        assert!(matches!(err, DescriptorError::Toml(_)));
    }

    #[test]
    fn test_from_file_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();

        let path = dir.path().join("orders.toml");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(ORDERS_TOML.as_bytes())
            .unwrap();
        let descriptor = DatasetDescriptor::from_file(&path).unwrap();
        assert_eq!(descriptor.name, "orders");

        let path = dir.path().join("orders.ini");
        std::fs::write(&path, "name = orders").unwrap();
        let err = DatasetDescriptor::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to load descriptor"));
        assert!(format!("{:#}", err).contains("unsupported descriptor format 'ini'"));
    }

    #[test]
    fn test_from_file_missing() {
        let err = DatasetDescriptor::from_file("/nonexistent/orders.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read descriptor"));
    }
}

//! Expression evaluation
//!
//! [`ExpressionEvaluator`] is the contract the calculator consumes: given an
//! expression handle it returns a value computed against the old, estimated
//! or current generation of the dataset's bindings. [`AstEvaluator`] is the
//! built-in implementation that walks [`Expression`] trees.

use crate::dataset::{Bindings, Dataset, WhenResourceMissing};
use crate::error::{BindingKind, EvalErrorKind, EvaluationError, EvaluatorInitError};
use crate::expression::{BinaryOperator, EvaluationMode, Expression, ExpressionId, UnaryOperator};
use crate::value::Value;
use std::cmp::Ordering;

/// Expression runtime driven by the calculator
pub trait ExpressionEvaluator {
    /// Resolve the dataset's names once, before any evaluation
    fn init(
        &mut self,
        bindings: Bindings<'_>,
        when_resource_missing: WhenResourceMissing,
    ) -> Result<(), EvaluatorInitError>;

    /// Evaluate against the current record and current variable values
    fn evaluate(&self, expression: ExpressionId, dataset: &Dataset) -> Result<Value, EvaluationError>;

    /// Evaluate against the previous record and previous variable values
    fn evaluate_old(&self, expression: ExpressionId, dataset: &Dataset)
        -> Result<Value, EvaluationError>;

    /// Evaluate against the current record and estimated variable values
    fn evaluate_estimated(
        &self,
        expression: ExpressionId,
        dataset: &Dataset,
    ) -> Result<Value, EvaluationError>;
}

/// Mode-dispatching evaluation, as handed to dataset slots
pub trait FillExpressionEvaluator {
    /// Evaluate `expression` in `mode`. An absent expression is null.
    fn evaluate(
        &self,
        expression: Option<ExpressionId>,
        mode: EvaluationMode,
    ) -> Result<Value, EvaluationError>;
}

/// An evaluator paired with the dataset it reads from
#[derive(Debug)]
pub struct EvaluationContext<'a, E: ?Sized> {
    evaluator: &'a E,
    dataset: &'a Dataset,
}

impl<'a, E: ExpressionEvaluator + ?Sized> EvaluationContext<'a, E> {
    pub fn new(evaluator: &'a E, dataset: &'a Dataset) -> Self {
        Self { evaluator, dataset }
    }

    pub fn evaluate_old(&self, expression: Option<ExpressionId>) -> Result<Value, EvaluationError> {
        match expression {
            Some(id) => self.evaluator.evaluate_old(id, self.dataset),
            None => Ok(Value::Null),
        }
    }

    pub fn evaluate_estimated(
        &self,
        expression: Option<ExpressionId>,
    ) -> Result<Value, EvaluationError> {
        match expression {
            Some(id) => self.evaluator.evaluate_estimated(id, self.dataset),
            None => Ok(Value::Null),
        }
    }

    pub fn evaluate_current(
        &self,
        expression: Option<ExpressionId>,
    ) -> Result<Value, EvaluationError> {
        match expression {
            Some(id) => self.evaluator.evaluate(id, self.dataset),
            None => Ok(Value::Null),
        }
    }
}

impl<E: ExpressionEvaluator + ?Sized> FillExpressionEvaluator for EvaluationContext<'_, E> {
    fn evaluate(
        &self,
        expression: Option<ExpressionId>,
        mode: EvaluationMode,
    ) -> Result<Value, EvaluationError> {
        match mode {
            EvaluationMode::Old => self.evaluate_old(expression),
            EvaluationMode::Estimated => self.evaluate_estimated(expression),
            EvaluationMode::Default => self.evaluate_current(expression),
        }
    }
}

/// Tree-walking evaluator over registered [`Expression`]s
#[derive(Debug, Clone, Default)]
pub struct AstEvaluator {
    expressions: Vec<Expression>,
    when_resource_missing: WhenResourceMissing,
}

impl AstEvaluator {
    /// Create an evaluator with no expressions
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an expression and return its handle
    pub fn register(&mut self, expression: Expression) -> ExpressionId {
        let id = ExpressionId(self.expressions.len() as u32);
        self.expressions.push(expression);
        id
    }

    pub fn expression(&self, id: ExpressionId) -> Option<&Expression> {
        self.expressions.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.expressions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }

    fn evaluate_in(
        &self,
        id: ExpressionId,
        dataset: &Dataset,
        mode: EvaluationMode,
    ) -> Result<Value, EvaluationError> {
        let expression = self
            .expression(id)
            .ok_or(EvaluationError::new(id, EvalErrorKind::UnknownExpression))?;
        self.evaluate_expression(expression, dataset, mode)
            .map_err(|kind| EvaluationError::new(id, kind))
    }

    /// Evaluate an expression tree
    pub fn evaluate_expression(
        &self,
        expr: &Expression,
        dataset: &Dataset,
        mode: EvaluationMode,
    ) -> Result<Value, EvalErrorKind> {
        match expr {
            Expression::Literal { value } => Ok(value.clone()),

            Expression::Parameter { name } => dataset
                .parameter(name)
                .cloned()
                .ok_or_else(|| missing(BindingKind::Parameter, name)),

            Expression::Field { name } => {
                let field = dataset
                    .field(name)
                    .ok_or_else(|| missing(BindingKind::Field, name))?;
                Ok(match mode {
                    EvaluationMode::Old => field.old_value().clone(),
                    EvaluationMode::Estimated | EvaluationMode::Default => field.value().clone(),
                })
            }

            Expression::Variable { name } => {
                let variable = dataset
                    .variable(name)
                    .ok_or_else(|| missing(BindingKind::Variable, name))?;
                Ok(match mode {
                    EvaluationMode::Old => variable.old_value().clone(),
                    EvaluationMode::Estimated => variable.estimated_value().clone(),
                    EvaluationMode::Default => variable.value().clone(),
                })
            }

            Expression::Resource { key } => match dataset.resource(key) {
                Some(message) => Ok(Value::String(message.to_string())),
                None => match self.when_resource_missing {
                    WhenResourceMissing::Null => Ok(Value::Null),
                    WhenResourceMissing::Empty => Ok(Value::String(String::new())),
                    WhenResourceMissing::Key => Ok(Value::String(key.clone())),
                    WhenResourceMissing::Error => Err(EvalErrorKind::MissingResource(key.clone())),
                },
            },

            Expression::BinaryOp { op, left, right } => {
                let left_val = self.evaluate_expression(left, dataset, mode)?;
                match op {
                    BinaryOperator::And if !left_val.is_truthy() => return Ok(left_val),
                    BinaryOperator::Or if left_val.is_truthy() => return Ok(left_val),
                    BinaryOperator::NullCoalesce if !left_val.is_null() => return Ok(left_val),
                    _ => {}
                }
                let right_val = self.evaluate_expression(right, dataset, mode)?;
                self.evaluate_binary_op(*op, left_val, right_val)
            }

            Expression::UnaryOp { op, operand } => {
                let operand_val = self.evaluate_expression(operand, dataset, mode)?;
                self.evaluate_unary_op(*op, operand_val)
            }

            Expression::If {
                condition,
                then_expr,
                else_expr,
            } => {
                let cond_val = self.evaluate_expression(condition, dataset, mode)?;
                if cond_val.is_truthy() {
                    self.evaluate_expression(then_expr, dataset, mode)
                } else {
                    self.evaluate_expression(else_expr, dataset, mode)
                }
            }
        }
    }

    fn evaluate_binary_op(
        &self,
        op: BinaryOperator,
        left: Value,
        right: Value,
    ) -> Result<Value, EvalErrorKind> {
        match op {
            BinaryOperator::Add => left.add(&right),
            BinaryOperator::Subtract => left.subtract(&right),
            BinaryOperator::Multiply => left.multiply(&right),
            BinaryOperator::Divide => left.divide(&right),
            BinaryOperator::Modulo => left.modulo(&right),

            BinaryOperator::Equal => Ok(Value::Bool(values_equal(&left, &right))),
            BinaryOperator::NotEqual => Ok(Value::Bool(!values_equal(&left, &right))),

            BinaryOperator::LessThan => compare(&left, &right, |o| o == Ordering::Less),
            BinaryOperator::LessThanOrEqual => compare(&left, &right, |o| o != Ordering::Greater),
            BinaryOperator::GreaterThan => compare(&left, &right, |o| o == Ordering::Greater),
            BinaryOperator::GreaterThanOrEqual => compare(&left, &right, |o| o != Ordering::Less),

            // short-circuited cases returned earlier
            BinaryOperator::And | BinaryOperator::Or | BinaryOperator::NullCoalesce => Ok(right),

            BinaryOperator::Concat => {
                let part = |v: &Value| if v.is_null() { String::new() } else { v.to_string_repr() };
                Ok(Value::String(format!("{}{}", part(&left), part(&right))))
            }
        }
    }

    fn evaluate_unary_op(&self, op: UnaryOperator, operand: Value) -> Result<Value, EvalErrorKind> {
        match op {
            UnaryOperator::Not => Ok(Value::Bool(!operand.is_truthy())),
            UnaryOperator::Negate => match operand {
                Value::Null => Ok(Value::Null),
                Value::Int(i) => i.checked_neg().map(Value::Int).ok_or_else(|| {
                    EvalErrorKind::TypeMismatch("integer overflow in negation".to_string())
                }),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(EvalErrorKind::TypeMismatch(format!(
                    "cannot negate {}",
                    other.type_name()
                ))),
            },
        }
    }
}

fn missing(kind: BindingKind, name: &str) -> EvalErrorKind {
    EvalErrorKind::MissingBinding {
        kind,
        name: name.to_string(),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(_), Some(_)) => left.compare(right) == Ok(Ordering::Equal),
        _ => !left.differs_from(right),
    }
}

fn compare(
    left: &Value,
    right: &Value,
    test: impl FnOnce(Ordering) -> bool,
) -> Result<Value, EvalErrorKind> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    left.compare(right).map(|o| Value::Bool(test(o)))
}

impl ExpressionEvaluator for AstEvaluator {
    fn init(
        &mut self,
        bindings: Bindings<'_>,
        when_resource_missing: WhenResourceMissing,
    ) -> Result<(), EvaluatorInitError> {
        for (index, expression) in self.expressions.iter().enumerate() {
            let mut unresolved = None;
            expression.for_each_reference(&mut |reference| {
                if unresolved.is_some() {
                    return;
                }
                unresolved = match reference {
                    Expression::Parameter { name } if !bindings.has_parameter(name) => {
                        Some((BindingKind::Parameter, name.clone()))
                    }
                    Expression::Field { name } if !bindings.has_field(name) => {
                        Some((BindingKind::Field, name.clone()))
                    }
                    Expression::Variable { name } if !bindings.has_variable(name) => {
                        Some((BindingKind::Variable, name.clone()))
                    }
                    _ => None,
                };
            });
            if let Some((kind, name)) = unresolved {
                return Err(EvaluatorInitError::UnresolvedReference {
                    expression: ExpressionId(index as u32),
                    kind,
                    name,
                });
            }
        }
        self.when_resource_missing = when_resource_missing;
        Ok(())
    }

    fn evaluate(&self, expression: ExpressionId, dataset: &Dataset) -> Result<Value, EvaluationError> {
        self.evaluate_in(expression, dataset, EvaluationMode::Default)
    }

    fn evaluate_old(
        &self,
        expression: ExpressionId,
        dataset: &Dataset,
    ) -> Result<Value, EvaluationError> {
        self.evaluate_in(expression, dataset, EvaluationMode::Old)
    }

    fn evaluate_estimated(
        &self,
        expression: ExpressionId,
        dataset: &Dataset,
    ) -> Result<Value, EvaluationError> {
        self.evaluate_in(expression, dataset, EvaluationMode::Estimated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incrementer::Calculation;
    use crate::variable::Variable;

    fn orders() -> Dataset {
        let mut dataset = Dataset::new("orders");
        dataset.add_field("city");
        dataset.add_field("amount");
        dataset.set_parameter("rate", Value::Int(2));
        dataset.set_resource("title", "Orders by city");
        dataset
            .add_variable(Variable::new("TOTAL", Calculation::Sum))
            .unwrap();
        dataset
    }

    #[test]
    fn test_evaluate_literal() {
        let mut evaluator = AstEvaluator::new();
        let id = evaluator.register(Expression::literal("hello"));
        let result = evaluator.evaluate(id, &orders());
        assert_eq!(result, Ok(Value::String("hello".to_string())));
    }

    #[test]
    fn test_evaluate_arithmetic() {
        let mut evaluator = AstEvaluator::new();
        let id = evaluator.register(Expression::binary(
            BinaryOperator::Multiply,
            Expression::field("amount"),
            Expression::parameter("rate"),
        ));
        let mut dataset = orders();
        dataset.next_record([("amount", Value::Int(5))]);
        assert_eq!(evaluator.evaluate(id, &dataset), Ok(Value::Int(10)));
    }

    #[test]
    fn test_modulo_overflow_is_an_error() {
        let mut evaluator = AstEvaluator::new();
        let id = evaluator.register(Expression::binary(
            BinaryOperator::Modulo,
            Expression::literal(i64::MIN),
            Expression::literal(-1),
        ));
        let err = evaluator.evaluate(id, &orders()).unwrap_err();
        assert_eq!(err.expression, Some(id));
        assert!(matches!(err.kind, EvalErrorKind::TypeMismatch(_)));
    }

    #[test]
    fn test_field_modes() {
        let mut evaluator = AstEvaluator::new();
        let id = evaluator.register(Expression::field("city"));
        let mut dataset = orders();
        dataset.next_record([("city", Value::from("Oslo"))]);
        dataset.next_record([("city", Value::from("Bergen"))]);

        assert_eq!(evaluator.evaluate_old(id, &dataset), Ok(Value::from("Oslo")));
        assert_eq!(
            evaluator.evaluate_estimated(id, &dataset),
            Ok(Value::from("Bergen"))
        );
        assert_eq!(evaluator.evaluate(id, &dataset), Ok(Value::from("Bergen")));
    }

    #[test]
    fn test_variable_modes() {
        let mut evaluator = AstEvaluator::new();
        let id = evaluator.register(Expression::variable("TOTAL"));
        let mut dataset = orders();
        let total = dataset.variable_mut("TOTAL").unwrap();
        total.set_value(Value::Int(3));
        dataset.next_record(Vec::<(String, Value)>::new());
        let total = dataset.variable_mut("TOTAL").unwrap();
        total.set_value(Value::Int(7));
        total.set_estimated_value(Value::Int(12));

        assert_eq!(evaluator.evaluate_old(id, &dataset), Ok(Value::Int(3)));
        assert_eq!(evaluator.evaluate_estimated(id, &dataset), Ok(Value::Int(12)));
        assert_eq!(evaluator.evaluate(id, &dataset), Ok(Value::Int(7)));
    }

    #[test]
    fn test_resource_policies() {
        let dataset = orders();
        let cases: [(WhenResourceMissing, Result<Value, EvaluationError>); 3] = [
            (WhenResourceMissing::Null, Ok(Value::Null)),
            (WhenResourceMissing::Empty, Ok(Value::from(""))),
            (WhenResourceMissing::Key, Ok(Value::from("subtitle"))),
        ];
        for (policy, expected) in cases {
            let mut evaluator = AstEvaluator::new();
            let id = evaluator.register(Expression::resource("subtitle"));
            evaluator.init(dataset.bindings(), policy).unwrap();
            assert_eq!(evaluator.evaluate(id, &dataset), expected, "{policy:?}");
        }

        let mut evaluator = AstEvaluator::new();
        let found = evaluator.register(Expression::resource("title"));
        let missing = evaluator.register(Expression::resource("subtitle"));
        evaluator
            .init(dataset.bindings(), WhenResourceMissing::Error)
            .unwrap();
        assert_eq!(
            evaluator.evaluate(found, &dataset),
            Ok(Value::from("Orders by city"))
        );
        let err = evaluator.evaluate(missing, &dataset).unwrap_err();
        assert_eq!(err.expression, Some(missing));
        assert_eq!(err.kind, EvalErrorKind::MissingResource("subtitle".to_string()));
    }

    #[test]
    fn test_init_rejects_unresolved_reference() {
        let mut evaluator = AstEvaluator::new();
        evaluator.register(Expression::field("city"));
        evaluator.register(Expression::variable("MISSING"));
        let err = evaluator
            .init(orders().bindings(), WhenResourceMissing::Null)
            .unwrap_err();
        assert_eq!(
            err,
            EvaluatorInitError::UnresolvedReference {
                expression: ExpressionId(1),
                kind: BindingKind::Variable,
                name: "MISSING".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_expression() {
        let evaluator = AstEvaluator::new();
        let err = evaluator.evaluate(ExpressionId(4), &orders()).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::UnknownExpression);
    }

    #[test]
    fn test_short_circuit_and_coalesce() {
        let mut evaluator = AstEvaluator::new();
        let dataset = orders();
        let and = evaluator.register(Expression::binary(
            BinaryOperator::And,
            Expression::literal(false),
            Expression::field("nope"),
        ));
        let coalesce = evaluator.register(Expression::binary(
            BinaryOperator::NullCoalesce,
            Expression::field("amount"),
            Expression::literal(0),
        ));
        assert_eq!(evaluator.evaluate(and, &dataset), Ok(Value::Bool(false)));
        assert_eq!(evaluator.evaluate(coalesce, &dataset), Ok(Value::Int(0)));
    }

    #[test]
    fn test_comparisons_and_if() {
        let mut evaluator = AstEvaluator::new();
        let dataset = orders();
        let id = evaluator.register(Expression::If {
            condition: Box::new(Expression::binary(
                BinaryOperator::GreaterThanOrEqual,
                Expression::literal(2.5),
                Expression::parameter("rate"),
            )),
            then_expr: Box::new(Expression::literal("big")),
            else_expr: Box::new(Expression::literal("small")),
        });
        let eq = evaluator.register(Expression::binary(
            BinaryOperator::Equal,
            Expression::literal(2),
            Expression::literal(2.0),
        ));
        assert_eq!(evaluator.evaluate(id, &dataset), Ok(Value::from("big")));
        assert_eq!(evaluator.evaluate(eq, &dataset), Ok(Value::Bool(true)));
    }

    #[test]
    fn test_context_absent_expression_is_null() {
        let evaluator = AstEvaluator::new();
        let dataset = orders();
        let context = EvaluationContext::new(&evaluator, &dataset);
        for mode in [
            EvaluationMode::Old,
            EvaluationMode::Estimated,
            EvaluationMode::Default,
        ] {
            assert_eq!(context.evaluate(None, mode), Ok(Value::Null));
        }
    }
}

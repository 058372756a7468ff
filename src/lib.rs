//! fillcalc - incremental report aggregation
//!
//! Maintains report variables (sums, counts, averages and friends) across a
//! stream of records, detects group breaks by looking one record ahead, and
//! applies column, page, group and report boundaries as the caller confirms
//! them.
//!
//! ```no_run
//! use fillcalc::{ResetScope, Value};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut calculator = fillcalc::calculator_from_file("orders.toml")?;
//! calculator.initialize_variables(ResetScope::Report)?;
//! calculator.next_record([("amount", Value::Int(3))]);
//! calculator.calculate_variables()?;
//! # Ok(())
//! # }
//! ```

pub mod calculator;
pub mod dataset;
pub mod descriptor;
pub mod element_dataset;
pub mod error;
pub mod evaluator;
pub mod expression;
pub mod group;
pub mod incrementer;
pub mod scope;
pub mod value;
pub mod variable;

use anyhow::{Context, Result};

// Re-export commonly used types
pub use calculator::Calculator;
pub use dataset::{Dataset, WhenResourceMissing};
pub use descriptor::DatasetDescriptor;
pub use element_dataset::{CategorySeriesCollector, DatasetCollector, ElementDataset};
pub use error::{DescriptorError, EvalErrorKind, EvaluationError, EvaluatorInitError};
pub use evaluator::{AstEvaluator, ExpressionEvaluator, FillExpressionEvaluator};
pub use expression::{EvaluationMode, Expression, ExpressionId};
pub use group::{Group, GroupId};
pub use incrementer::{Calculation, Incrementer, ValueProvider};
pub use scope::{ResetScope, ScopeBinding};
pub use value::Value;
pub use variable::{Variable, VariableId};

/// Load a dataset descriptor and build a ready calculator from it
pub fn calculator_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Calculator<AstEvaluator>> {
    let path = path.as_ref();
    let descriptor = DatasetDescriptor::from_file(path)?;
    descriptor
        .build_calculator()
        .with_context(|| format!("Failed to build calculator from: {}", path.display()))
}

/// fillcalc version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

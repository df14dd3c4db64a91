//! The predicate AST conditions are compiled to: a tagged variant tree over
//! operator nodes and leaf literals/var-references, walked structurally
//! with a fail-closed posture on any unknown or malformed shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A node in the predicate AST. Unknown/malformed trees are never
/// constructed from deserialization failure alone — evaluation itself
/// treats any node whose operands don't resolve as required as `false`,
/// matching spec.md §9's fail-closed rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    /// Equality.
    Eq(Box<Condition>, Box<Condition>),
    /// Inequality.
    Ne(Box<Condition>, Box<Condition>),
    /// Less-than.
    Lt(Box<Condition>, Box<Condition>),
    /// Less-than-or-equal.
    Le(Box<Condition>, Box<Condition>),
    /// Greater-than.
    Gt(Box<Condition>, Box<Condition>),
    /// Greater-than-or-equal.
    Ge(Box<Condition>, Box<Condition>),
    /// Logical AND over all children.
    And(Vec<Condition>),
    /// Logical OR over all children.
    Or(Vec<Condition>),
    /// Logical negation.
    Not(Box<Condition>),
    /// Membership: substring match when both sides resolve to strings
    /// (spec.md §9's documented `delete_account` semantics), set
    /// membership when `haystack` resolves to a JSON array.
    In {
        /// The value looked for.
        needle: Box<Condition>,
        /// The string or array searched.
        haystack: Box<Condition>,
    },
    /// Dotted-path lookup into the context document, e.g. `"args.max_results"`.
    Var(String),
    /// A literal value.
    Lit(Value),
}

impl Condition {
    /// Evaluate this condition against a context document, coercing the
    /// result to a boolean. Any node whose operands don't resolve in a
    /// comparable way evaluates to `false`.
    #[must_use]
    pub fn evaluate(&self, ctx: &Value) -> bool {
        match self {
            Condition::Eq(a, b) => values_equal(&a.resolve(ctx), &b.resolve(ctx)),
            Condition::Ne(a, b) => !values_equal(&a.resolve(ctx), &b.resolve(ctx)),
            Condition::Lt(a, b) => compare_numbers(a, b, ctx).is_some_and(|o| o == std::cmp::Ordering::Less),
            Condition::Le(a, b) => {
                compare_numbers(a, b, ctx).is_some_and(|o| o != std::cmp::Ordering::Greater)
            }
            Condition::Gt(a, b) => {
                compare_numbers(a, b, ctx).is_some_and(|o| o == std::cmp::Ordering::Greater)
            }
            Condition::Ge(a, b) => {
                compare_numbers(a, b, ctx).is_some_and(|o| o != std::cmp::Ordering::Less)
            }
            Condition::And(children) => !children.is_empty() && children.iter().all(|c| c.evaluate(ctx)),
            Condition::Or(children) => children.iter().any(|c| c.evaluate(ctx)),
            Condition::Not(inner) => !inner.evaluate(ctx),
            Condition::In { needle, haystack } => {
                let needle_val = needle.resolve(ctx);
                let haystack_val = haystack.resolve(ctx);
                match (&needle_val, &haystack_val) {
                    (Value::String(n), Value::String(h)) => h.contains(n.as_str()),
                    (n, Value::Array(items)) => items.iter().any(|item| values_equal(item, n)),
                    _ => false,
                }
            }
            // `Var`/`Lit` are only meaningful as operands; evaluated bare,
            // coerce their resolved value to a JSON boolean (fail-closed
            // on anything else).
            Condition::Var(_) | Condition::Lit(_) => {
                matches!(self.resolve(ctx), Value::Bool(true))
            }
        }
    }

    /// Resolve this node to a concrete JSON value: `Lit` returns its
    /// value, `Var` reads the dotted path from `ctx`, and any other node
    /// (evaluated as an operand) resolves to its boolean result.
    fn resolve(&self, ctx: &Value) -> Value {
        match self {
            Condition::Lit(v) => v.clone(),
            Condition::Var(path) => resolve_path(ctx, path).cloned().unwrap_or(Value::Null),
            other => Value::Bool(other.evaluate(ctx)),
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    a == b
}

fn compare_numbers(a: &Condition, b: &Condition, ctx: &Value) -> Option<std::cmp::Ordering> {
    let av = a.resolve(ctx);
    let bv = b.resolve(ctx);
    let af = av.as_f64()?;
    let bf = bv.as_f64()?;
    af.partial_cmp(&bf)
}

fn resolve_path<'a>(ctx: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = ctx;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

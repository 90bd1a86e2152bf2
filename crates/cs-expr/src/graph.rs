//! Arena of expression nodes.
//!
//! The graph owns every node exactly once; parents refer to children by
//! [`ExprId`] handle, so a node referenced from several places is shared
//! structurally (a DAG). Handles are never invalidated — nodes are only
//! appended, never removed.

use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Handle to a node in a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(pub(crate) u32);

/// One expression node. Children are handles into the owning graph.
#[derive(Debug, Clone)]
pub(crate) enum ExprKind {
    /// Estimated or fixed parameter, one shared index namespace:
    /// ids below the free-vector length are free, the rest are fixed.
    Beta { literal_id: usize, name: String },
    /// Row-data variable, reads `data[row][column]`.
    Variable { column: usize, name: String },
    /// Monte Carlo draw, reads `draws[individual][draw][draw_id]`.
    Draws { draw_id: usize, name: String },
    /// Externally bound integration variable.
    RandomVariable { rv_id: usize, name: String },
    /// Compile-time constant.
    Numeric { value: f64 },

    UnaryMinus(ExprId),
    Exp(ExprId),
    Log(ExprId),
    NormalCdf(ExprId),
    MonteCarlo(ExprId),
    PanelTrajectory(ExprId),
    Integrate { child: ExprId, rv_id: usize },
    Derive { child: ExprId, literal_id: usize },

    Add(ExprId, ExprId),
    Sub(ExprId, ExprId),
    Mul(ExprId, ExprId),
    Div(ExprId, ExprId),
    Pow(ExprId, ExprId),
    And(ExprId, ExprId),
    Or(ExprId, ExprId),
    Equal(ExprId, ExprId),
    NotEqual(ExprId, ExprId),
    Less(ExprId, ExprId),
    LessOrEqual(ExprId, ExprId),
    Greater(ExprId, ExprId),
    GreaterOrEqual(ExprId, ExprId),

    /// N-ary sum.
    MultSum(Vec<ExprId>),
    /// Integer-keyed selector: evaluates `key`, then only the matching branch.
    Elem { key: ExprId, branches: BTreeMap<i64, ExprId> },
    /// Logit log-probability: per alternative id, (utility, availability).
    LogLogit { choice: ExprId, alternatives: BTreeMap<i64, (ExprId, ExprId)> },
}

/// Arena-owned expression DAG.
///
/// Built either programmatically through the constructor methods below or by
/// the formula deserializer. Immutable during evaluation: [`Graph::evaluate`]
/// takes `&self`, so a fully built graph is `Sync` and can be shared —
/// as long as each thread brings its own [`Context`](crate::Context).
#[derive(Debug, Default, Clone)]
pub struct Graph {
    pub(crate) nodes: Vec<ExprKind>,
}

impl Graph {
    /// Empty graph.
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, kind: ExprKind) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(kind);
        id
    }

    pub(crate) fn kind(&self, id: ExprId) -> &ExprKind {
        &self.nodes[id.0 as usize]
    }

    // ── Leaf constructors ──────────────────────────────────────────

    /// Parameter literal (free if `literal_id` is below the free-vector
    /// length at evaluation time, fixed otherwise).
    pub fn beta(&mut self, literal_id: usize, name: &str) -> ExprId {
        self.push(ExprKind::Beta { literal_id, name: name.to_string() })
    }

    /// Row-data variable.
    pub fn variable(&mut self, column: usize, name: &str) -> ExprId {
        self.push(ExprKind::Variable { column, name: name.to_string() })
    }

    /// Monte Carlo draw variable.
    pub fn draws(&mut self, draw_id: usize, name: &str) -> ExprId {
        self.push(ExprKind::Draws { draw_id, name: name.to_string() })
    }

    /// Integration (random) variable.
    pub fn random_variable(&mut self, rv_id: usize, name: &str) -> ExprId {
        self.push(ExprKind::RandomVariable { rv_id, name: name.to_string() })
    }

    /// Numeric constant.
    pub fn numeric(&mut self, value: f64) -> ExprId {
        self.push(ExprKind::Numeric { value })
    }

    // ── Unary constructors ─────────────────────────────────────────

    /// `-a`
    pub fn neg(&mut self, a: ExprId) -> ExprId {
        self.push(ExprKind::UnaryMinus(a))
    }

    /// `exp(a)`
    pub fn exp(&mut self, a: ExprId) -> ExprId {
        self.push(ExprKind::Exp(a))
    }

    /// `ln(a)`
    pub fn log(&mut self, a: ExprId) -> ExprId {
        self.push(ExprKind::Log(a))
    }

    /// Standard normal CDF of `a`.
    pub fn normal_cdf(&mut self, a: ExprId) -> ExprId {
        self.push(ExprKind::NormalCdf(a))
    }

    /// Average of `a` over the current individual's draws.
    pub fn monte_carlo(&mut self, a: ExprId) -> ExprId {
        self.push(ExprKind::MonteCarlo(a))
    }

    /// Product of `a` over the current individual's panel rows.
    pub fn panel_trajectory(&mut self, a: ExprId) -> ExprId {
        self.push(ExprKind::PanelTrajectory(a))
    }

    /// Integral of `a` over random variable `rv_id`'s domain (the real line).
    pub fn integrate(&mut self, a: ExprId, rv_id: usize) -> ExprId {
        self.push(ExprKind::Integrate { child: a, rv_id })
    }

    /// Partial derivative of `a` with respect to `literal_id`, as a value.
    pub fn derive(&mut self, a: ExprId, literal_id: usize) -> ExprId {
        self.push(ExprKind::Derive { child: a, literal_id })
    }

    // ── Binary constructors ────────────────────────────────────────

    /// `a + b`
    pub fn add(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.push(ExprKind::Add(a, b))
    }

    /// `a - b`
    pub fn sub(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.push(ExprKind::Sub(a, b))
    }

    /// `a * b`
    pub fn mul(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.push(ExprKind::Mul(a, b))
    }

    /// `a / b`
    pub fn div(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.push(ExprKind::Div(a, b))
    }

    /// `a ^ b`
    pub fn pow(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.push(ExprKind::Pow(a, b))
    }

    /// `a && b` (0/1 valued)
    pub fn and(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.push(ExprKind::And(a, b))
    }

    /// `a || b` (0/1 valued)
    pub fn or(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.push(ExprKind::Or(a, b))
    }

    /// `a == b` (0/1 valued)
    pub fn equal(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.push(ExprKind::Equal(a, b))
    }

    /// `a != b` (0/1 valued)
    pub fn not_equal(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.push(ExprKind::NotEqual(a, b))
    }

    /// `a < b` (0/1 valued)
    pub fn less(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.push(ExprKind::Less(a, b))
    }

    /// `a <= b` (0/1 valued)
    pub fn less_or_equal(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.push(ExprKind::LessOrEqual(a, b))
    }

    /// `a > b` (0/1 valued)
    pub fn greater(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.push(ExprKind::Greater(a, b))
    }

    /// `a >= b` (0/1 valued)
    pub fn greater_or_equal(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.push(ExprKind::GreaterOrEqual(a, b))
    }

    // ── N-ary constructors ─────────────────────────────────────────

    /// Sum of `terms`.
    pub fn mult_sum(&mut self, terms: Vec<ExprId>) -> ExprId {
        self.push(ExprKind::MultSum(terms))
    }

    /// Keyed selector over `branches`.
    pub fn elem(&mut self, key: ExprId, branches: BTreeMap<i64, ExprId>) -> ExprId {
        self.push(ExprKind::Elem { key, branches })
    }

    /// Logit log-probability node; `alternatives` maps an alternative id to
    /// its (utility, availability) pair.
    pub fn log_logit(
        &mut self,
        choice: ExprId,
        alternatives: BTreeMap<i64, (ExprId, ExprId)>,
    ) -> ExprId {
        self.push(ExprKind::LogLogit { choice, alternatives })
    }

    // ── Structure queries ──────────────────────────────────────────

    /// Whether the subgraph under `id` contains at least one parameter
    /// literal whose index is in `literal_ids`.
    ///
    /// The test is against the *passed* list, not against "any parameter":
    /// composite derivative rules rely on this to skip subtrees that
    /// provably contribute zero, and the non-differentiable kinds rely on it
    /// to stay evaluable when none of the requested parameters is inside.
    pub fn contains_literals(&self, id: ExprId, literal_ids: &[usize]) -> bool {
        match self.kind(id) {
            ExprKind::Beta { literal_id, .. } => literal_ids.contains(literal_id),
            ExprKind::Variable { .. }
            | ExprKind::Draws { .. }
            | ExprKind::RandomVariable { .. }
            | ExprKind::Numeric { .. } => false,
            ExprKind::UnaryMinus(a)
            | ExprKind::Exp(a)
            | ExprKind::Log(a)
            | ExprKind::NormalCdf(a)
            | ExprKind::MonteCarlo(a)
            | ExprKind::PanelTrajectory(a)
            | ExprKind::Integrate { child: a, .. }
            | ExprKind::Derive { child: a, .. } => self.contains_literals(*a, literal_ids),
            ExprKind::Add(a, b)
            | ExprKind::Sub(a, b)
            | ExprKind::Mul(a, b)
            | ExprKind::Div(a, b)
            | ExprKind::Pow(a, b)
            | ExprKind::And(a, b)
            | ExprKind::Or(a, b)
            | ExprKind::Equal(a, b)
            | ExprKind::NotEqual(a, b)
            | ExprKind::Less(a, b)
            | ExprKind::LessOrEqual(a, b)
            | ExprKind::Greater(a, b)
            | ExprKind::GreaterOrEqual(a, b) => {
                self.contains_literals(*a, literal_ids) || self.contains_literals(*b, literal_ids)
            }
            ExprKind::MultSum(terms) => {
                terms.iter().any(|t| self.contains_literals(*t, literal_ids))
            }
            ExprKind::Elem { key, branches } => {
                self.contains_literals(*key, literal_ids)
                    || branches.values().any(|b| self.contains_literals(*b, literal_ids))
            }
            ExprKind::LogLogit { choice, alternatives } => {
                self.contains_literals(*choice, literal_ids)
                    || alternatives.values().any(|(u, a)| {
                        self.contains_literals(*u, literal_ids)
                            || self.contains_literals(*a, literal_ids)
                    })
            }
        }
    }

    /// Human-readable name of the node's kind, for error messages.
    pub(crate) fn kind_name(&self, id: ExprId) -> &'static str {
        match self.kind(id) {
            ExprKind::Beta { .. } => "Beta",
            ExprKind::Variable { .. } => "Variable",
            ExprKind::Draws { .. } => "Draws",
            ExprKind::RandomVariable { .. } => "RandomVariable",
            ExprKind::Numeric { .. } => "Numeric",
            ExprKind::UnaryMinus(_) => "UnaryMinus",
            ExprKind::Exp(_) => "exp",
            ExprKind::Log(_) => "log",
            ExprKind::NormalCdf(_) => "normalCdf",
            ExprKind::MonteCarlo(_) => "MonteCarlo",
            ExprKind::PanelTrajectory(_) => "PanelLikelihoodTrajectory",
            ExprKind::Integrate { .. } => "Integrate",
            ExprKind::Derive { .. } => "Derive",
            ExprKind::Add(..) => "Plus",
            ExprKind::Sub(..) => "Minus",
            ExprKind::Mul(..) => "Times",
            ExprKind::Div(..) => "Divide",
            ExprKind::Pow(..) => "Power",
            ExprKind::And(..) => "And",
            ExprKind::Or(..) => "Or",
            ExprKind::Equal(..) => "Equal",
            ExprKind::NotEqual(..) => "NotEqual",
            ExprKind::Less(..) => "Less",
            ExprKind::LessOrEqual(..) => "LessOrEqual",
            ExprKind::Greater(..) => "Greater",
            ExprKind::GreaterOrEqual(..) => "GreaterOrEqual",
            ExprKind::MultSum(_) => "MultSum",
            ExprKind::Elem { .. } => "Elem",
            ExprKind::LogLogit { .. } => "LogLogit",
        }
    }

    /// Infix/prefix rendering of the subtree under `id`, for diagnostics.
    pub fn print(&self, id: ExprId) -> String {
        match self.kind(id) {
            ExprKind::Beta { name, .. } | ExprKind::Variable { name, .. } => name.clone(),
            ExprKind::Draws { draw_id, name } => format!("{name}[{draw_id}]"),
            ExprKind::RandomVariable { rv_id, name } => format!("{name}[{rv_id}]"),
            ExprKind::Numeric { value } => format!("{value}"),
            ExprKind::UnaryMinus(a) => format!("(-{})", self.print(*a)),
            ExprKind::Exp(a) => format!("exp({})", self.print(*a)),
            ExprKind::Log(a) => format!("log({})", self.print(*a)),
            ExprKind::NormalCdf(a) => format!("normalCdf({})", self.print(*a)),
            ExprKind::MonteCarlo(a) => format!("MonteCarlo({})", self.print(*a)),
            ExprKind::PanelTrajectory(a) => {
                format!("PanelLikelihoodTrajectory({})", self.print(*a))
            }
            ExprKind::Integrate { child, rv_id } => {
                format!("Integrate({},{rv_id})", self.print(*child))
            }
            ExprKind::Derive { child, literal_id } => {
                format!("Derive({},{literal_id})", self.print(*child))
            }
            ExprKind::Add(a, b) => self.print_infix(*a, "+", *b),
            ExprKind::Sub(a, b) => self.print_infix(*a, "-", *b),
            ExprKind::Mul(a, b) => self.print_infix(*a, "*", *b),
            ExprKind::Div(a, b) => self.print_infix(*a, "/", *b),
            ExprKind::Pow(a, b) => self.print_infix(*a, "^", *b),
            ExprKind::And(a, b) => self.print_infix(*a, "&&", *b),
            ExprKind::Or(a, b) => self.print_infix(*a, "||", *b),
            ExprKind::Equal(a, b) => self.print_infix(*a, "==", *b),
            ExprKind::NotEqual(a, b) => self.print_infix(*a, "!=", *b),
            ExprKind::Less(a, b) => self.print_infix(*a, "<", *b),
            ExprKind::LessOrEqual(a, b) => self.print_infix(*a, "<=", *b),
            ExprKind::Greater(a, b) => self.print_infix(*a, ">", *b),
            ExprKind::GreaterOrEqual(a, b) => self.print_infix(*a, ">=", *b),
            ExprKind::MultSum(terms) => {
                let mut s = String::from("(");
                for (i, t) in terms.iter().enumerate() {
                    if i > 0 {
                        s.push('+');
                    }
                    s.push_str(&self.print(*t));
                }
                s.push(')');
                s
            }
            ExprKind::Elem { key, branches } => {
                let mut s = format!("Elem({}", self.print(*key));
                for (alt, e) in branches {
                    let _ = write!(s, ",{alt}:{}", self.print(*e));
                }
                s.push(')');
                s
            }
            ExprKind::LogLogit { choice, alternatives } => {
                let mut s = format!("LogLogit({}", self.print(*choice));
                for (alt, (u, a)) in alternatives {
                    let _ = write!(s, ",{alt}:{}[{}]", self.print(*u), self.print(*a));
                }
                s.push(')');
                s
            }
        }
    }

    fn print_infix(&self, a: ExprId, op: &str, b: ExprId) -> String {
        format!("({}{op}{})", self.print(a), self.print(b))
    }
}

//! Deserialization of `<Kind>{id}(args…)` strings into a [`Formula`].
//!
//! A formula is reconstructed from an ordered list of serialized units, one
//! node each. Every unit's argument list refers to previously defined units
//! by identifier; identifiers are resolved through a running table, so a
//! unit seen again under the same identifier yields the already-built node
//! (DAG deduplication by construction). The node of the *last* unit becomes
//! the root — earlier units exist to be referenced.
//!
//! All construction errors are fatal: no partial graph is ever returned.

use std::collections::{BTreeMap, HashMap};

use cs_core::{Error, Result};
use cs_expr::{Context, Derivatives, ExprId, Graph};

use crate::scan::{extract_delimited, parse_real_prefix, split_fields};

/// What a named literal reads from at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    /// Estimated (or fixed) parameter.
    Parameter,
    /// Row-data column.
    Variable,
}

/// A named literal found while deserializing, with its index and node.
#[derive(Debug, Clone)]
pub struct Literal {
    /// Display name from the encoding.
    pub name: String,
    /// Index into the parameter namespace or the data row.
    pub index: usize,
    /// Parameter or data variable.
    pub kind: LiteralKind,
    /// The shared node in the graph.
    pub node: ExprId,
}

/// A deserialized formula: the owning node graph, its root, and the literal
/// view used to map display names onto parameter indices.
#[derive(Debug)]
pub struct Formula {
    graph: Graph,
    root: ExprId,
    by_serial: HashMap<String, ExprId>,
    literals: Vec<Literal>,
}

impl Formula {
    /// Deserialize one or more units; the last one becomes the root.
    pub fn parse<S: AsRef<str>>(formulas: &[S]) -> Result<Self> {
        let mut builder = Builder::default();
        let (first, rest) = formulas
            .split_first()
            .ok_or_else(|| Error::MalformedEncoding("no formulas supplied".to_string()))?;
        let mut root = builder.process(first.as_ref())?;
        for f in rest {
            root = builder.process(f.as_ref())?;
        }
        log::debug!(
            "deserialized {} node(s) ({} literal(s)) from {} unit(s)",
            builder.graph.len(),
            builder.literals.len(),
            formulas.len()
        );
        Ok(Formula {
            graph: builder.graph,
            root,
            by_serial: builder.by_serial,
            literals: builder.literals,
        })
    }

    /// Root node handle.
    pub fn root(&self) -> ExprId {
        self.root
    }

    /// The node graph itself.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Number of distinct nodes built (shared subexpressions count once).
    pub fn node_count(&self) -> usize {
        self.graph.len()
    }

    /// Node built for a serialized identifier, if any.
    pub fn node_id(&self, serial: &str) -> Option<ExprId> {
        self.by_serial.get(serial).copied()
    }

    /// Literals (parameters and data variables) in encounter order.
    pub fn literals(&self) -> &[Literal] {
        &self.literals
    }

    /// Parameter index of a named estimated parameter, for assembling the
    /// literal-id list handed to [`evaluate`](Formula::evaluate).
    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.literals
            .iter()
            .find(|l| l.kind == LiteralKind::Parameter && l.name == name)
            .map(|l| l.index)
    }

    /// Evaluate the root under `ctx`; see [`Graph::evaluate`].
    pub fn evaluate(
        &self,
        ctx: &Context<'_>,
        literal_ids: &[usize],
        gradient: bool,
        hessian: bool,
    ) -> Result<Derivatives> {
        self.graph.evaluate(self.root, ctx, literal_ids, gradient, hessian)
    }

    /// Value of the root under `ctx`, no derivatives.
    pub fn value(&self, ctx: &Context<'_>) -> Result<f64> {
        self.graph.value(self.root, ctx)
    }

    /// Diagnostic rendering of the root expression.
    pub fn print(&self) -> String {
        self.graph.print(self.root)
    }
}

#[derive(Default)]
struct Builder {
    graph: Graph,
    by_serial: HashMap<String, ExprId>,
    literals: Vec<Literal>,
}

fn parse_usize(s: &str) -> Result<usize> {
    s.trim()
        .parse::<usize>()
        .map_err(|_| Error::MalformedEncoding(format!("invalid index: {s:?}")))
}

fn parse_i64(s: &str) -> Result<i64> {
    s.trim()
        .parse::<i64>()
        .map_err(|_| Error::MalformedEncoding(format!("invalid alternative id: {s:?}")))
}

impl Builder {
    /// Build (or look up) the node of one serialized unit.
    fn process(&mut self, f: &str) -> Result<ExprId> {
        let kind = extract_delimited('<', '>', f)?.to_string();
        let serial = extract_delimited('{', '}', f)?.to_string();
        if let Some(&existing) = self.by_serial.get(&serial) {
            // identifier already built: share the node, build nothing
            return Ok(existing);
        }

        let items = split_fields(f, ',');
        let node = match kind.as_str() {
            "Beta" | "Variable" | "DefineVariable" => {
                let name = extract_delimited('"', '"', f)?.to_string();
                let index = parse_usize(extract_delimited('[', ']', f)?)?;
                let (node, literal_kind) = if kind == "Beta" {
                    (self.graph.beta(index, &name), LiteralKind::Parameter)
                } else {
                    (self.graph.variable(index, &name), LiteralKind::Variable)
                };
                self.literals.push(Literal { name, index, kind: literal_kind, node });
                node
            }
            "bioDraws" => {
                let name = extract_delimited('"', '"', f)?;
                let index = parse_usize(extract_delimited('[', ']', f)?)?;
                self.graph.draws(index, name)
            }
            "RandomVariable" => {
                let name = extract_delimited('"', '"', f)?;
                let index = parse_usize(extract_delimited('[', ']', f)?)?;
                self.graph.random_variable(index, name)
            }
            "Numeric" => {
                let field = items.get(1).ok_or_else(|| {
                    Error::MalformedEncoding(format!("Numeric without a value: {f:?}"))
                })?;
                let value = parse_real_prefix(field)?;
                self.graph.numeric(value)
            }

            "Plus" | "Minus" | "Times" | "Divide" | "Power" | "And" | "Or" | "Equal"
            | "NotEqual" | "Less" | "LessOrEqual" | "Greater" | "GreaterOrEqual" => {
                let declared = parse_usize(extract_delimited('(', ')', f)?)?;
                let supplied = items.len() - 1;
                if declared != 2 || supplied < 2 {
                    return Err(Error::ArityMismatch { kind, declared, supplied });
                }
                let l = self.lookup(items[1])?;
                let r = self.lookup(items[2])?;
                match kind.as_str() {
                    "Plus" => self.graph.add(l, r),
                    "Minus" => self.graph.sub(l, r),
                    "Times" => self.graph.mul(l, r),
                    "Divide" => self.graph.div(l, r),
                    "Power" => self.graph.pow(l, r),
                    "And" => self.graph.and(l, r),
                    "Or" => self.graph.or(l, r),
                    "Equal" => self.graph.equal(l, r),
                    "NotEqual" => self.graph.not_equal(l, r),
                    "Less" => self.graph.less(l, r),
                    "LessOrEqual" => self.graph.less_or_equal(l, r),
                    "Greater" => self.graph.greater(l, r),
                    _ => self.graph.greater_or_equal(l, r),
                }
            }

            "UnaryMinus" | "MonteCarlo" | "bioNormalCdf" | "PanelLikelihoodTrajectory"
            | "exp" | "log" => {
                let field = items.get(1).ok_or_else(|| {
                    Error::MalformedEncoding(format!("{kind} without a child: {f:?}"))
                })?;
                let child = self.lookup(field)?;
                match kind.as_str() {
                    "UnaryMinus" => self.graph.neg(child),
                    "MonteCarlo" => self.graph.monte_carlo(child),
                    "bioNormalCdf" => self.graph.normal_cdf(child),
                    "PanelLikelihoodTrajectory" => self.graph.panel_trajectory(child),
                    "exp" => self.graph.exp(child),
                    _ => self.graph.log(child),
                }
            }

            "Derive" | "Integrate" => {
                if items.len() < 3 {
                    return Err(Error::MalformedEncoding(format!(
                        "{kind} needs a child and a literal index: {f:?}"
                    )));
                }
                let child = self.lookup(items[1])?;
                let index = parse_usize(items[2])?;
                if kind == "Derive" {
                    self.graph.derive(child, index)
                } else {
                    self.graph.integrate(child, index)
                }
            }

            "bioMultSum" => {
                let declared = parse_usize(extract_delimited('(', ')', f)?)?;
                let supplied = items.len() - 1;
                if supplied < declared {
                    return Err(Error::ArityMismatch { kind, declared, supplied });
                }
                let mut terms = Vec::with_capacity(declared);
                for item in &items[1..=declared] {
                    terms.push(self.lookup(item)?);
                }
                self.graph.mult_sum(terms)
            }

            "Elem" => {
                let declared = parse_usize(extract_delimited('(', ')', f)?)?;
                if items.len() < 2 + 2 * declared {
                    let supplied = items.len().saturating_sub(2) / 2;
                    return Err(Error::ArityMismatch { kind, declared, supplied });
                }
                let key = self.lookup(items[1])?;
                let mut branches = BTreeMap::new();
                for i in 0..declared {
                    let alt = parse_i64(items[2 + 2 * i])?;
                    let expr = self.lookup(items[2 + 2 * i + 1])?;
                    branches.insert(alt, expr);
                }
                self.graph.elem(key, branches)
            }

            "bioLogLogit" => {
                let declared = parse_usize(extract_delimited('(', ')', f)?)?;
                if items.len() < 2 + 3 * declared {
                    let supplied = items.len().saturating_sub(2) / 3;
                    return Err(Error::ArityMismatch { kind, declared, supplied });
                }
                let choice = self.lookup(items[1])?;
                let mut alternatives = BTreeMap::new();
                for i in 0..declared {
                    let alt = parse_i64(items[2 + 3 * i])?;
                    let util = self.lookup(items[2 + 3 * i + 1])?;
                    let avail = self.lookup(items[2 + 3 * i + 2])?;
                    alternatives.insert(alt, (util, avail));
                }
                self.graph.log_logit(choice, alternatives)
            }

            _ => return Err(Error::UnknownExpressionKind(kind)),
        };

        self.by_serial.insert(serial, node);
        Ok(node)
    }

    fn lookup(&self, key: &str) -> Result<ExprId> {
        let key = key.trim();
        self.by_serial
            .get(key)
            .copied()
            .ok_or_else(|| Error::DanglingReference(key.to_string()))
    }
}

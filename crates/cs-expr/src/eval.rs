//! Evaluation and exact differentiation of graph nodes.
//!
//! One recursive pass computes the value and, on request, the gradient and
//! Hessian with respect to the caller's literal-id list. Composite rules are
//! the classical ones (sum, product, quotient, power, chain); subtrees that
//! provably contain none of the requested literals are evaluated value-only,
//! which both skips dead work and keeps non-differentiable kinds evaluable
//! when the requested parameters are elsewhere in the formula.

use crate::context::{Context, RvBinding};
use crate::derivatives::Derivatives;
use crate::graph::{ExprId, ExprKind, Graph};
use crate::math::{norm_cdf, norm_pdf};
use crate::quad;
use cs_core::{Error, Result};

/// Gradient entry of a bundle, zero when the part is absent.
fn g(b: &Derivatives, k: usize) -> f64 {
    b.gradient.as_ref().map_or(0.0, |g| g[k])
}

/// Hessian entry of a bundle, zero when the part is absent.
fn h(b: &Derivatives, k: usize, l: usize) -> f64 {
    b.hessian.as_ref().map_or(0.0, |h| h[k][l])
}

impl Graph {
    /// Evaluate node `id` under `ctx`, differentiating against
    /// `literal_ids` when `gradient` / `hessian` are set.
    ///
    /// Requesting the Hessian without the gradient is an
    /// [`Error::InvalidRequest`]. The returned bundle is freshly sized to
    /// `literal_ids`; nothing is retained between calls.
    ///
    /// Evaluation is plainly recursive; pathologically deep formulas
    /// (very long selector or sum chains) are bounded by the thread stack.
    pub fn evaluate(
        &self,
        id: ExprId,
        ctx: &Context<'_>,
        literal_ids: &[usize],
        gradient: bool,
        hessian: bool,
    ) -> Result<Derivatives> {
        if hessian && !gradient {
            return Err(Error::InvalidRequest(
                "the Hessian can only be computed together with the gradient",
            ));
        }
        self.eval_node(id, ctx, literal_ids, gradient, hessian)
    }

    /// Value of node `id` under `ctx`, no derivatives.
    pub fn value(&self, id: ExprId, ctx: &Context<'_>) -> Result<f64> {
        self.eval_node(id, ctx, &[], false, false).map(|d| d.value)
    }

    #[allow(clippy::needless_range_loop)]
    fn eval_node(
        &self,
        id: ExprId,
        ctx: &Context<'_>,
        ids: &[usize],
        gradient: bool,
        hessian: bool,
    ) -> Result<Derivatives> {
        let n = ids.len();
        match self.kind(id) {
            // ── Leaves ─────────────────────────────────────────────
            ExprKind::Beta { literal_id, .. } => {
                let n_free = ctx.parameters.len();
                let value = if *literal_id < n_free {
                    ctx.parameters[*literal_id]
                } else {
                    *ctx.fixed_parameters.get(literal_id - n_free).ok_or(Error::OutOfRange {
                        what: "literal",
                        index: *literal_id,
                        extent: n_free + ctx.fixed_parameters.len(),
                    })?
                };
                let mut out = Derivatives::zeroed(n, gradient, hessian);
                out.value = value;
                // unit gradient at the literal's own position(s);
                // Hessian stays zero (the literal is linear in itself)
                if let Some(gv) = out.gradient.as_mut() {
                    for (k, lit) in ids.iter().enumerate() {
                        if lit == literal_id {
                            gv[k] = 1.0;
                        }
                    }
                }
                Ok(out)
            }
            ExprKind::Variable { column, .. } => {
                let data = ctx.data.ok_or(Error::MissingBinding("row data table"))?;
                let r = ctx.row.ok_or(Error::MissingBinding("row index"))?;
                let row = data.get(r).ok_or(Error::OutOfRange {
                    what: "row",
                    index: r,
                    extent: data.len(),
                })?;
                let value = *row.get(*column).ok_or(Error::OutOfRange {
                    what: "variable",
                    index: *column,
                    extent: row.len(),
                })?;
                let mut out = Derivatives::zeroed(n, gradient, hessian);
                out.value = value;
                Ok(out)
            }
            ExprKind::Draws { draw_id, .. } => {
                let draws = ctx.draws.ok_or(Error::MissingBinding("draw table"))?;
                let ind = ctx.individual.ok_or(Error::MissingBinding("individual index"))?;
                let d = ctx.draw.ok_or(Error::MissingBinding(
                    "draw index (draws used outside a MonteCarlo node?)",
                ))?;
                let per_individual = draws.get(ind).ok_or(Error::OutOfRange {
                    what: "individual",
                    index: ind,
                    extent: draws.len(),
                })?;
                let per_draw = per_individual.get(d).ok_or(Error::OutOfRange {
                    what: "draw",
                    index: d,
                    extent: per_individual.len(),
                })?;
                let value = *per_draw.get(*draw_id).ok_or(Error::OutOfRange {
                    what: "draw variable",
                    index: *draw_id,
                    extent: per_draw.len(),
                })?;
                let mut out = Derivatives::zeroed(n, gradient, hessian);
                out.value = value;
                Ok(out)
            }
            ExprKind::RandomVariable { rv_id, .. } => {
                let value = ctx.rv_value(*rv_id).ok_or(Error::MissingBinding(
                    "random variable value (evaluated outside an Integrate node?)",
                ))?;
                let mut out = Derivatives::zeroed(n, gradient, hessian);
                out.value = value;
                Ok(out)
            }
            ExprKind::Numeric { value } => {
                let mut out = Derivatives::zeroed(n, gradient, hessian);
                out.value = *value;
                Ok(out)
            }

            // ── Linear combinators ─────────────────────────────────
            ExprKind::Add(a, b) => {
                let mut out = self.eval_node(*a, ctx, ids, gradient, hessian)?;
                let rb = self.eval_node(*b, ctx, ids, gradient, hessian)?;
                out.add_scaled(&rb, 1.0);
                Ok(out)
            }
            ExprKind::Sub(a, b) => {
                let mut out = self.eval_node(*a, ctx, ids, gradient, hessian)?;
                let rb = self.eval_node(*b, ctx, ids, gradient, hessian)?;
                out.add_scaled(&rb, -1.0);
                Ok(out)
            }
            ExprKind::MultSum(terms) => {
                let mut acc = Derivatives::zeroed(n, gradient, hessian);
                for t in terms {
                    let b = self.eval_node(*t, ctx, ids, gradient, hessian)?;
                    acc.add_scaled(&b, 1.0);
                }
                Ok(acc)
            }
            ExprKind::UnaryMinus(a) => {
                let mut out = self.eval_node(*a, ctx, ids, gradient, hessian)?;
                out.scale(-1.0);
                Ok(out)
            }

            // ── Products, quotients, powers ────────────────────────
            ExprKind::Mul(a, b) => {
                let ac = gradient && self.contains_literals(*a, ids);
                let bc = gradient && self.contains_literals(*b, ids);
                let la = self.eval_node(*a, ctx, ids, ac, hessian && ac)?;
                let lb = self.eval_node(*b, ctx, ids, bc, hessian && bc)?;
                let mut out = Derivatives::zeroed(n, gradient, hessian);
                out.value = la.value * lb.value;
                if let Some(gv) = out.gradient.as_mut() {
                    for k in 0..n {
                        gv[k] = g(&la, k) * lb.value + la.value * g(&lb, k);
                    }
                }
                if let Some(hm) = out.hessian.as_mut() {
                    for k in 0..n {
                        for l in 0..n {
                            hm[k][l] = h(&la, k, l) * lb.value
                                + g(&la, k) * g(&lb, l)
                                + g(&lb, k) * g(&la, l)
                                + la.value * h(&lb, k, l);
                        }
                    }
                }
                Ok(out)
            }
            ExprKind::Div(a, b) => {
                let ac = gradient && self.contains_literals(*a, ids);
                let bc = gradient && self.contains_literals(*b, ids);
                let la = self.eval_node(*a, ctx, ids, ac, hessian && ac)?;
                let lb = self.eval_node(*b, ctx, ids, bc, hessian && bc)?;
                if lb.value == 0.0 {
                    return Err(Error::NumericDomain(format!(
                        "division by zero in {}",
                        self.print(id)
                    )));
                }
                let inv = 1.0 / lb.value;
                let f = la.value * inv;
                let mut out = Derivatives::zeroed(n, gradient, hessian);
                out.value = f;
                if let Some(gv) = out.gradient.as_mut() {
                    for k in 0..n {
                        gv[k] = (g(&la, k) - f * g(&lb, k)) * inv;
                    }
                }
                if let Some(hm) = out.hessian.as_mut() {
                    for k in 0..n {
                        for l in 0..n {
                            hm[k][l] = h(&la, k, l) * inv
                                - (g(&la, k) * g(&lb, l)
                                    + g(&la, l) * g(&lb, k)
                                    + la.value * h(&lb, k, l))
                                    * inv
                                    * inv
                                + 2.0 * la.value * g(&lb, k) * g(&lb, l) * inv * inv * inv;
                        }
                    }
                }
                Ok(out)
            }
            ExprKind::Pow(a, b) => {
                let ac = gradient && self.contains_literals(*a, ids);
                let bc = gradient && self.contains_literals(*b, ids);
                let la = self.eval_node(*a, ctx, ids, ac, hessian && ac)?;
                let lb = self.eval_node(*b, ctx, ids, bc, hessian && bc)?;
                let base = la.value;
                let expo = lb.value;
                if base < 0.0 && expo.fract() != 0.0 {
                    return Err(Error::NumericDomain(format!(
                        "negative base {base} raised to non-integer exponent {expo}"
                    )));
                }
                if base == 0.0 && expo < 0.0 {
                    return Err(Error::NumericDomain(format!(
                        "zero base raised to negative exponent {expo}"
                    )));
                }
                let f = base.powf(expo);
                let mut out = Derivatives::zeroed(n, gradient, hessian);
                out.value = f;
                if gradient && bc {
                    // the exponent varies: d f = f (b' ln a + b a'/a), needs ln a
                    if base <= 0.0 {
                        return Err(Error::NumericDomain(format!(
                            "power with varying exponent requires a positive base, got {base}"
                        )));
                    }
                    let lnb = base.ln();
                    let u: Vec<f64> =
                        (0..n).map(|k| g(&lb, k) * lnb + expo * g(&la, k) / base).collect();
                    if let Some(gv) = out.gradient.as_mut() {
                        for k in 0..n {
                            gv[k] = f * u[k];
                        }
                    }
                    if let Some(hm) = out.hessian.as_mut() {
                        for k in 0..n {
                            for l in 0..n {
                                let du = h(&lb, k, l) * lnb
                                    + (g(&lb, k) * g(&la, l) + g(&lb, l) * g(&la, k)) / base
                                    + expo
                                        * (h(&la, k, l) / base
                                            - g(&la, k) * g(&la, l) / (base * base));
                                hm[k][l] = f * (u[k] * u[l] + du);
                            }
                        }
                    }
                } else if gradient && ac {
                    // plain power rule, valid for non-positive bases with
                    // integer exponents
                    let fp = if expo == 0.0 { 0.0 } else { expo * base.powf(expo - 1.0) };
                    let c2 = expo * (expo - 1.0);
                    let fpp = if c2 == 0.0 { 0.0 } else { c2 * base.powf(expo - 2.0) };
                    if let Some(gv) = out.gradient.as_mut() {
                        for k in 0..n {
                            gv[k] = fp * g(&la, k);
                        }
                    }
                    if let Some(hm) = out.hessian.as_mut() {
                        for k in 0..n {
                            for l in 0..n {
                                hm[k][l] = fpp * g(&la, k) * g(&la, l) + fp * h(&la, k, l);
                            }
                        }
                    }
                }
                Ok(out)
            }

            // ── Chain-rule unaries ─────────────────────────────────
            ExprKind::Exp(a) => {
                let la = self.eval_node(*a, ctx, ids, gradient, hessian)?;
                let e = la.value.exp();
                let mut out = Derivatives::zeroed(n, gradient, hessian);
                out.value = e;
                if let Some(gv) = out.gradient.as_mut() {
                    for k in 0..n {
                        gv[k] = e * g(&la, k);
                    }
                }
                if let Some(hm) = out.hessian.as_mut() {
                    for k in 0..n {
                        for l in 0..n {
                            hm[k][l] = e * (h(&la, k, l) + g(&la, k) * g(&la, l));
                        }
                    }
                }
                Ok(out)
            }
            ExprKind::Log(a) => {
                let la = self.eval_node(*a, ctx, ids, gradient, hessian)?;
                if la.value <= 0.0 {
                    return Err(Error::NumericDomain(format!(
                        "log of non-positive value {} in {}",
                        la.value,
                        self.print(id)
                    )));
                }
                let v = la.value;
                let mut out = Derivatives::zeroed(n, gradient, hessian);
                out.value = v.ln();
                if let Some(gv) = out.gradient.as_mut() {
                    for k in 0..n {
                        gv[k] = g(&la, k) / v;
                    }
                }
                if let Some(hm) = out.hessian.as_mut() {
                    for k in 0..n {
                        for l in 0..n {
                            hm[k][l] = h(&la, k, l) / v - g(&la, k) * g(&la, l) / (v * v);
                        }
                    }
                }
                Ok(out)
            }
            ExprKind::NormalCdf(a) => {
                let la = self.eval_node(*a, ctx, ids, gradient, hessian)?;
                let v = la.value;
                let p = norm_pdf(v);
                let mut out = Derivatives::zeroed(n, gradient, hessian);
                out.value = norm_cdf(v);
                if let Some(gv) = out.gradient.as_mut() {
                    for k in 0..n {
                        gv[k] = p * g(&la, k);
                    }
                }
                if let Some(hm) = out.hessian.as_mut() {
                    // φ'(v) = −v φ(v)
                    for k in 0..n {
                        for l in 0..n {
                            hm[k][l] = p * h(&la, k, l) - v * p * g(&la, k) * g(&la, l);
                        }
                    }
                }
                Ok(out)
            }

            // ── Boolean kinds (0/1 valued, never differentiable) ───
            ExprKind::And(a, b)
            | ExprKind::Or(a, b)
            | ExprKind::Equal(a, b)
            | ExprKind::NotEqual(a, b)
            | ExprKind::Less(a, b)
            | ExprKind::LessOrEqual(a, b)
            | ExprKind::Greater(a, b)
            | ExprKind::GreaterOrEqual(a, b) => {
                self.eval_boolean(id, *a, *b, ctx, ids, gradient, hessian)
            }

            // ── Selection ──────────────────────────────────────────
            ExprKind::Elem { key, branches } => {
                let kv = self.eval_node(*key, ctx, ids, false, false)?.value;
                let k = kv.round() as i64;
                let branch = branches.get(&k).copied().ok_or(Error::UnknownKey(k))?;
                // only the matched branch is evaluated and differentiated
                self.eval_node(branch, ctx, ids, gradient, hessian)
            }

            // ── Discrete choice ────────────────────────────────────
            ExprKind::LogLogit { choice, alternatives } => {
                let chosen = self.eval_node(*choice, ctx, ids, false, false)?.value.round() as i64;
                if !alternatives.contains_key(&chosen) {
                    return Err(Error::UnknownKey(chosen));
                }

                // availability is a value-only question
                let mut avail: Vec<(i64, ExprId)> = Vec::with_capacity(alternatives.len());
                for (&alt, &(util, availability)) in alternatives {
                    let a = self.eval_node(availability, ctx, ids, false, false)?.value;
                    if a != 0.0 {
                        avail.push((alt, util));
                    }
                }
                let Some(chosen_idx) = avail.iter().position(|&(alt, _)| alt == chosen) else {
                    return Err(Error::UnavailableAlternative(chosen));
                };

                // only available alternatives enter the choice set
                let mut bundles = Vec::with_capacity(avail.len());
                for &(_, util) in &avail {
                    bundles.push(self.eval_node(util, ctx, ids, gradient, hessian)?);
                }

                // log-sum-exp with max shift for stability
                let vmax = bundles.iter().map(|b| b.value).fold(f64::NEG_INFINITY, f64::max);
                let denom: f64 = bundles.iter().map(|b| (b.value - vmax).exp()).sum();
                let cb = &bundles[chosen_idx];

                let mut out = Derivatives::zeroed(n, gradient, hessian);
                out.value = cb.value - vmax - denom.ln();
                if gradient {
                    let probs: Vec<f64> =
                        bundles.iter().map(|b| (b.value - vmax).exp() / denom).collect();
                    // p̄[k] = Σ_j P_j ∂V_j[k]
                    let mut pbar = vec![0.0; n];
                    for (j, b) in bundles.iter().enumerate() {
                        for k in 0..n {
                            pbar[k] += probs[j] * g(b, k);
                        }
                    }
                    if let Some(gv) = out.gradient.as_mut() {
                        for k in 0..n {
                            gv[k] = g(cb, k) - pbar[k];
                        }
                    }
                    if let Some(hm) = out.hessian.as_mut() {
                        for k in 0..n {
                            for l in 0..n {
                                let mut s = h(cb, k, l) + pbar[k] * pbar[l];
                                for (j, b) in bundles.iter().enumerate() {
                                    s -= probs[j] * (h(b, k, l) + g(b, k) * g(b, l));
                                }
                                hm[k][l] = s;
                            }
                        }
                    }
                }
                Ok(out)
            }

            // ── Index-sweeping combinators ─────────────────────────
            ExprKind::MonteCarlo(child) => {
                let draws = ctx.draws.ok_or(Error::MissingBinding("draw table"))?;
                let ind = ctx.individual.ok_or(Error::MissingBinding("individual index"))?;
                let per_individual = draws.get(ind).ok_or(Error::OutOfRange {
                    what: "individual",
                    index: ind,
                    extent: draws.len(),
                })?;
                if per_individual.is_empty() {
                    return Err(Error::MissingBinding("non-empty draw table"));
                }
                let w = 1.0 / per_individual.len() as f64;
                let mut acc = Derivatives::zeroed(n, gradient, hessian);
                for d in 0..per_individual.len() {
                    let inner = ctx.at_draw(d);
                    let b = self.eval_node(*child, &inner, ids, gradient, hessian)?;
                    acc.add_scaled(&b, w);
                }
                Ok(acc)
            }
            ExprKind::PanelTrajectory(child) => {
                let map = ctx.data_map.ok_or(Error::MissingBinding("panel data map"))?;
                let ind = ctx.individual.ok_or(Error::MissingBinding("individual index"))?;
                let rows = map.get(ind).ok_or(Error::OutOfRange {
                    what: "individual",
                    index: ind,
                    extent: map.len(),
                })?;
                if rows.is_empty() {
                    return Err(Error::MissingBinding("non-empty panel data map"));
                }
                // running product, binary product rule applied per factor;
                // the Hessian update must see the previous gradient and the
                // gradient update the previous value, hence the order
                let mut value = 1.0;
                let mut grad = vec![0.0; if gradient { n } else { 0 }];
                let mut hess = vec![vec![0.0; n]; if hessian { n } else { 0 }];
                for &r in rows {
                    let inner = ctx.at_row(r);
                    let b = self.eval_node(*child, &inner, ids, gradient, hessian)?;
                    if b.value == 0.0 {
                        log::warn!(
                            "panel trajectory factor is exactly zero at row {r}; \
                             the trajectory product collapses to zero"
                        );
                    }
                    if hessian {
                        for k in 0..n {
                            for l in 0..n {
                                hess[k][l] = hess[k][l] * b.value
                                    + grad[k] * g(&b, l)
                                    + grad[l] * g(&b, k)
                                    + value * h(&b, k, l);
                            }
                        }
                    }
                    if gradient {
                        for k in 0..n {
                            grad[k] = grad[k] * b.value + value * g(&b, k);
                        }
                    }
                    value *= b.value;
                }
                Ok(Derivatives {
                    value,
                    gradient: gradient.then_some(grad),
                    hessian: hessian.then_some(hess),
                })
            }
            ExprKind::Integrate { child, rv_id } => {
                let (child, rv_id) = (*child, *rv_id);
                quad::integrate_bundle(
                    |x| {
                        let binding = RvBinding { id: rv_id, value: x, parent: ctx.rv };
                        let inner = ctx.with_rv(&binding);
                        self.eval_node(child, &inner, ids, gradient, hessian)
                    },
                    n,
                    gradient,
                    hessian,
                )
            }

            // ── Symbolic derivative as a value ─────────────────────
            ExprKind::Derive { child, literal_id } => {
                let (child, lit) = (*child, *literal_id);
                if !gradient {
                    let inner = self.eval_node(child, ctx, &[lit], true, false)?;
                    return Ok(Derivatives::value_only(g(&inner, 0)));
                }
                // third-order derivatives are out of scope
                if hessian && self.contains_literals(child, ids) {
                    return Err(Error::NotDifferentiable("Derive"));
                }
                // differentiate the child against [lit, ids...]; row 0 of
                // the child's Hessian is this node's gradient
                let mut ids2 = Vec::with_capacity(n + 1);
                ids2.push(lit);
                ids2.extend_from_slice(ids);
                let inner = self.eval_node(child, ctx, &ids2, true, true)?;
                let mut out = Derivatives::zeroed(n, gradient, hessian);
                out.value = g(&inner, 0);
                if let Some(gv) = out.gradient.as_mut() {
                    for k in 0..n {
                        gv[k] = h(&inner, 0, k + 1);
                    }
                }
                Ok(out)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_boolean(
        &self,
        id: ExprId,
        a: ExprId,
        b: ExprId,
        ctx: &Context<'_>,
        ids: &[usize],
        gradient: bool,
        hessian: bool,
    ) -> Result<Derivatives> {
        // a 0/1 step is not differentiable wherever a requested literal is
        // inside — even when both operands are smooth in it; a subtree
        // without any requested literal reports exact zeros instead
        if (gradient || hessian) && self.contains_literals(id, ids) {
            return Err(Error::NotDifferentiable(self.kind_name(id)));
        }
        let lv = self.eval_node(a, ctx, ids, false, false)?.value;
        let rv = self.eval_node(b, ctx, ids, false, false)?.value;
        #[allow(clippy::float_cmp)]
        let truth = match self.kind(id) {
            ExprKind::And(..) => lv != 0.0 && rv != 0.0,
            ExprKind::Or(..) => lv != 0.0 || rv != 0.0,
            ExprKind::Equal(..) => lv == rv,
            ExprKind::NotEqual(..) => lv != rv,
            ExprKind::Less(..) => lv < rv,
            ExprKind::LessOrEqual(..) => lv <= rv,
            ExprKind::Greater(..) => lv > rv,
            ExprKind::GreaterOrEqual(..) => lv >= rv,
            _ => unreachable!("eval_boolean called on a non-boolean kind"),
        };
        let mut out = Derivatives::zeroed(ids.len(), gradient, hessian);
        out.value = if truth { 1.0 } else { 0.0 };
        Ok(out)
    }
}

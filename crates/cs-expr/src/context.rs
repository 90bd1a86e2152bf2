//! External state read by the graph during evaluation.
//!
//! A [`Context`] bundles everything a formula needs beyond its own
//! structure: the free and fixed parameter vectors, the row-data table, the
//! Monte Carlo draw table, the panel data map, and the current
//! row/individual/draw position. The caller owns all of it; the context only
//! borrows. Re-evaluating the same graph over many rows or parameter
//! estimates means rebuilding (or copying — the context is `Copy`) this
//! small struct, never touching the graph.
//!
//! Combinator nodes that internally sweep an index (Monte Carlo over draws,
//! panel trajectories over rows, `Integrate` over a random variable's
//! domain) derive a shadowed copy of the caller's context per inner
//! evaluation, so the caller's own context is never mutated.
//!
//! A graph plus one context must be driven from a single thread at a time;
//! nothing here synchronizes concurrent mutation of the borrowed tables.

/// One bound random-variable value, linked to the bindings enclosing it.
///
/// `Integrate` nodes push one of these per quadrature point; nested
/// integrals chain through `parent`. Lookup walks the chain innermost-first,
/// so the nearest enclosing integral wins.
#[derive(Debug, Clone, Copy)]
pub struct RvBinding<'a> {
    /// Identifier of the random variable being bound.
    pub id: usize,
    /// Its value at the current integration point.
    pub value: f64,
    /// Binding of the enclosing integral, if any.
    pub parent: Option<&'a RvBinding<'a>>,
}

/// Borrowed evaluation state: parameter vectors, data tables and the current
/// position in them.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    /// Free (estimated) parameter vector.
    pub parameters: &'a [f64],
    /// Fixed parameter vector; a literal with id ≥ `parameters.len()` reads
    /// here at `id - parameters.len()`.
    pub fixed_parameters: &'a [f64],
    /// Row-data table, rows × variables.
    pub data: Option<&'a [Vec<f64>]>,
    /// Draw table, individuals × draws × draw-variables.
    pub draws: Option<&'a [Vec<Vec<f64>>]>,
    /// Panel data map: for each individual, the indices of its rows.
    pub data_map: Option<&'a [Vec<usize>]>,
    /// Current row index into `data`.
    pub row: Option<usize>,
    /// Current individual index into `draws` / `data_map`.
    pub individual: Option<usize>,
    /// Current draw index (set internally by Monte Carlo nodes).
    pub draw: Option<usize>,
    /// Innermost random-variable binding (set internally by `Integrate`).
    pub rv: Option<&'a RvBinding<'a>>,
}

impl<'a> Context<'a> {
    /// Context with only parameter vectors bound.
    pub fn new(parameters: &'a [f64], fixed_parameters: &'a [f64]) -> Self {
        Self {
            parameters,
            fixed_parameters,
            data: None,
            draws: None,
            data_map: None,
            row: None,
            individual: None,
            draw: None,
            rv: None,
        }
    }

    /// Bind the row-data table.
    pub fn with_data(mut self, data: &'a [Vec<f64>]) -> Self {
        self.data = Some(data);
        self
    }

    /// Bind the draw table.
    pub fn with_draws(mut self, draws: &'a [Vec<Vec<f64>>]) -> Self {
        self.draws = Some(draws);
        self
    }

    /// Bind the panel data map (individual → row indices).
    pub fn with_data_map(mut self, data_map: &'a [Vec<usize>]) -> Self {
        self.data_map = Some(data_map);
        self
    }

    /// Position the context on a row.
    pub fn at_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }

    /// Position the context on an individual.
    pub fn at_individual(mut self, individual: usize) -> Self {
        self.individual = Some(individual);
        self
    }

    /// Position the context on a draw.
    pub fn at_draw(mut self, draw: usize) -> Self {
        self.draw = Some(draw);
        self
    }

    /// Shadow this context with one more random-variable binding.
    pub fn with_rv<'b>(&self, binding: &'b RvBinding<'b>) -> Context<'b>
    where
        'a: 'b,
    {
        Context {
            parameters: self.parameters,
            fixed_parameters: self.fixed_parameters,
            data: self.data,
            draws: self.draws,
            data_map: self.data_map,
            row: self.row,
            individual: self.individual,
            draw: self.draw,
            rv: Some(binding),
        }
    }

    /// Value of random variable `id`, if some enclosing integral bound it.
    pub fn rv_value(&self, id: usize) -> Option<f64> {
        let mut cur = self.rv;
        while let Some(b) = cur {
            if b.id == id {
                return Some(b.value);
            }
            cur = b.parent;
        }
        None
    }
}

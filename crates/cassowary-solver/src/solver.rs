//! The simplex tableau: an incremental implementation of the Cassowary
//! linear-arithmetic constraint solving algorithm (Badros, Borning &
//! Stuckey, 2001), grounded directly on `gtkconstraintsolver.c`.

use std::collections::HashMap;
use std::fmt;

use cassowary_core::{near_zero, ChangeObserver, Expression, Relation, Strength, Variable, VariableSet};

use crate::constraint::{Arena, ConstraintData, ConstraintRef, EditInfo, StayInfo};
use crate::error::SolverError;

/// Tolerance used by `remove_constraint`'s exit-variable ratio test; the GTK
/// source uses `G_APPROX_VALUE(x, y, 0.0001)` here specifically (distinct
/// from the `1e-3` used elsewhere in expression algebra).
const RATIO_EPSILON: f64 = 1e-4;

fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}

/// Debug counters exposed via [`Solver::statistics`] (spec §6).
#[derive(Debug, Clone, Copy, Default)]
pub struct Statistics {
    pub variables: u64,
    pub slack_vars: u64,
    pub artificial_vars: u64,
    pub dummy_vars: u64,
    pub stay_vars: usize,
    pub optimize_count: u64,
}

/// An incremental Cassowary constraint solver.
///
/// Owns a simplex tableau (spec §4.2.1): `rows` maps each basic variable to
/// the expression that defines it; `columns` is the reverse index, mapping
/// each parametric variable to the set of basic variables whose row mentions
/// it. A solver is single-threaded (spec §5): every method takes `&mut self`
/// and runs to completion with no suspension points.
pub struct Solver {
    columns: HashMap<Variable, VariableSet>,
    rows: HashMap<Variable, Expression>,

    external_rows: VariableSet,
    external_parametric_vars: VariableSet,

    infeasible_rows: Vec<Variable>,
    stay_error_vars: Vec<(Variable, Variable)>,

    error_vars: HashMap<ConstraintRef, VariableSet>,
    marker_vars: HashMap<ConstraintRef, Variable>,

    edit_var_map: HashMap<Variable, EditInfo>,
    stay_var_map: HashMap<Variable, StayInfo>,

    objective: Variable,
    constraints: Arena,

    var_counter: u64,
    slack_counter: u64,
    dummy_counter: u64,
    artificial_counter: u64,
    optimize_count: u64,
    freeze_count: u32,

    auto_solve: bool,
    needs_solving: bool,
    in_edit_phase: bool,
}

impl Default for Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver {
    pub fn new() -> Self {
        let objective = Variable::new_objective(Some("Z"));
        let mut rows = HashMap::new();
        rows.insert(objective.clone(), Expression::from_constant(0.0));

        Self {
            columns: HashMap::new(),
            rows,
            external_rows: VariableSet::new(),
            external_parametric_vars: VariableSet::new(),
            infeasible_rows: Vec::new(),
            stay_error_vars: Vec::new(),
            error_vars: HashMap::new(),
            marker_vars: HashMap::new(),
            edit_var_map: HashMap::new(),
            stay_var_map: HashMap::new(),
            objective,
            constraints: Arena::default(),
            var_counter: 0,
            slack_counter: 0,
            dummy_counter: 0,
            artificial_counter: 0,
            optimize_count: 0,
            freeze_count: 0,
            auto_solve: true,
            needs_solving: false,
            in_edit_phase: false,
        }
    }

    /// Creates a fresh external variable. `prefix`/`name` are for debug
    /// display only.
    pub fn create_variable(&mut self, prefix: Option<&str>, name: Option<&str>, value: f64) -> Variable {
        self.var_counter += 1;
        Variable::new_regular(prefix, name, value)
    }

    // -- column/row bookkeeping (§4.2.1) -----------------------------------

    fn track_added_variable(&mut self, variable: &Variable, subject: Option<&Variable>) {
        if let Some(subject) = subject {
            self.insert_column_variable(variable, Some(subject));
        }
    }

    fn track_removed_variable(&mut self, variable: &Variable, subject: Option<&Variable>) {
        if let Some(set) = self.columns.get_mut(variable) {
            if let Some(subject) = subject {
                set.remove(subject);
            }
        }
    }

    fn insert_column_variable(&mut self, param_var: &Variable, row_var: Option<&Variable>) {
        let cset = self.columns.entry(param_var.clone()).or_default();
        if let Some(row_var) = row_var {
            cset.add(row_var.clone());
        }
    }

    fn insert_error_variable(&mut self, constraint: ConstraintRef, variable: &Variable) {
        self.error_vars.entry(constraint).or_default().add(variable.clone());
    }

    fn reset_stay_constants(&mut self) {
        let pairs = self.stay_error_vars.clone();
        for (first, second) in pairs {
            if self.rows.contains_key(&first) {
                self.rows.get_mut(&first).unwrap().constant = 0.0;
            } else if self.rows.contains_key(&second) {
                self.rows.get_mut(&second).unwrap().constant = 0.0;
            }
        }
    }

    fn set_external_variables(&mut self) {
        let parametrics: Vec<Variable> = self.external_parametric_vars.iter().cloned().collect();
        for variable in parametrics {
            if self.rows.contains_key(&variable) {
                continue;
            }
            variable.set_value(0.0);
        }

        let rows: Vec<Variable> = self.external_rows.iter().cloned().collect();
        for variable in rows {
            let constant = self.rows.get(&variable).map_or(0.0, |e| e.constant);
            variable.set_value(constant);
        }

        self.needs_solving = false;
    }

    fn add_row(&mut self, variable: Variable, expression: Expression) {
        let terms: Vec<(Variable, f64)> = expression.iter().map(|(v, c)| (v.clone(), c)).collect();
        for (t_v, _) in &terms {
            self.insert_column_variable(t_v, Some(&variable));
            if t_v.is_external() {
                self.external_parametric_vars.add(t_v.clone());
            }
        }
        if variable.is_external() {
            self.external_rows.add(variable.clone());
        }
        self.rows.insert(variable, expression);
    }

    fn remove_column(&mut self, variable: &Variable) {
        if let Some(cset) = self.columns.get(variable).cloned() {
            for v in cset.iter() {
                if let Some(row) = self.rows.get_mut(v) {
                    row.remove_term(variable);
                }
            }
        }
        self.columns.remove(variable);
        if variable.is_external() {
            self.external_rows.remove(variable);
            self.external_parametric_vars.remove(variable);
        }
    }

    fn remove_row(&mut self, variable: &Variable) -> Expression {
        let e = self.rows.remove(variable).expect("remove_row: no such basic variable");
        let terms: Vec<Variable> = e.iter().map(|(v, _)| v.clone()).collect();
        for t_v in terms {
            if let Some(cset) = self.columns.get_mut(&t_v) {
                cset.remove(variable);
            }
        }
        self.infeasible_rows.retain(|v| v != variable);
        if variable.is_external() {
            self.external_rows.remove(variable);
        }
        e
    }

    fn substitute_out(&mut self, old_variable: &Variable, expression: &Expression) {
        if let Some(cset) = self.columns.get(old_variable).cloned() {
            for v in cset.iter() {
                let mut row = self.rows.remove(v).expect("substitute_out: column points at a missing row");
                row.substitute_out(old_variable, expression, Some(v), Some(self));
                if v.is_restricted() && row.constant < 0.0 {
                    self.infeasible_rows.push(v.clone());
                }
                self.rows.insert(v.clone(), row);
            }
        }

        if old_variable.is_external() {
            self.external_rows.add(old_variable.clone());
            self.external_parametric_vars.remove(old_variable);
        }
        self.columns.remove(old_variable);
    }

    fn pivot(&mut self, entry_var: &Variable, exit_var: &Variable) {
        let mut expr = self.remove_row(exit_var);
        expr.change_subject(exit_var.clone(), entry_var);
        self.substitute_out(entry_var, &expr);

        if entry_var.is_external() {
            self.external_parametric_vars.remove(entry_var);
        }

        self.add_row(entry_var.clone(), expr);
    }

    // -- optimize / dual optimize (§4.2.4, §4.2.5) -------------------------

    /// Primal simplex: drives `z`'s row to its minimum by repeatedly
    /// pivoting in the first pivotable term (scanning `z`'s row in reverse)
    /// whose coefficient is negative — the anti-cycling entry rule
    /// `gtk_constraint_solver_optimize` actually uses, not a full scan for
    /// the globally most-negative coefficient.
    fn optimize(&mut self, z: &Variable) {
        self.optimize_count += 1;

        loop {
            let z_row = self.rows.get(z).expect("optimize: objective row missing");

            let mut entry: Option<Variable> = None;
            let mut objective_coefficient = 0.0;
            for (t_v, t_c) in z_row.iter().rev() {
                if t_v.is_pivotable() && t_c < objective_coefficient {
                    entry = Some(t_v.clone());
                    objective_coefficient = t_c;
                    break;
                }
            }

            if objective_coefficient >= -1e-8 {
                break;
            }
            let entry = entry.unwrap();

            let column_vars = self.columns.get(&entry).cloned().unwrap_or_default();
            let mut min_ratio = f64::MAX;
            let mut exit: Option<Variable> = None;
            for v in column_vars.iter() {
                if !v.is_pivotable() {
                    continue;
                }
                if let Some(expr) = self.rows.get(v) {
                    let coeff = expr.coefficient(&entry);
                    if coeff < 0.0 {
                        let r = -expr.constant / coeff;
                        if r < min_ratio {
                            min_ratio = r;
                            exit = Some(v.clone());
                        }
                    }
                }
            }

            let Some(exit) = exit else {
                tracing::debug!("unbounded objective variable during optimization");
                break;
            };

            self.pivot(&entry, &exit);
        }
    }

    /// Drains `infeasible_rows`, pivoting each back to feasibility via the
    /// dual simplex ratio test (spec §4.2.5).
    fn dual_optimize(&mut self) {
        while let Some(exit_var) = self.infeasible_rows.pop() {
            if !self.rows.contains_key(&exit_var) {
                continue;
            }
            if self.rows[&exit_var].constant >= 0.0 {
                continue;
            }

            let mut ratio = f64::MAX;
            let mut entry: Option<Variable> = None;
            {
                let expr = &self.rows[&exit_var];
                let z_row = &self.rows[&self.objective];
                for (t_v, t_c) in expr.iter() {
                    if t_c > 0.0 && t_v.is_pivotable() {
                        let r = z_row.coefficient(t_v) / t_c;
                        if r < ratio {
                            ratio = r;
                            entry = Some(t_v.clone());
                        }
                    }
                }
            }

            match entry {
                Some(entry) => self.pivot(&entry, &exit_var),
                None => {
                    tracing::error!("dual_optimize: no entry candidate; solver state is suspect");
                    break;
                }
            }
        }
    }

    fn delta_edit_constant(&mut self, delta: f64, plus_error_var: &Variable, minus_error_var: &Variable) {
        if let Some(expr) = self.rows.get_mut(plus_error_var) {
            let new_constant = expr.constant + delta;
            expr.constant = new_constant;
            if new_constant < 0.0 {
                self.infeasible_rows.push(plus_error_var.clone());
            }
            return;
        }

        if let Some(expr) = self.rows.get_mut(minus_error_var) {
            let new_constant = expr.constant - delta;
            expr.constant = new_constant;
            if new_constant < 0.0 {
                self.infeasible_rows.push(minus_error_var.clone());
            }
            return;
        }

        let Some(column_set) = self.columns.get(minus_error_var).cloned() else {
            tracing::error!("delta_edit_constant: columns unset for edit variable");
            return;
        };

        for basic_var in column_set.iter() {
            let Some(expr) = self.rows.get_mut(basic_var) else {
                continue;
            };
            let coeff = expr.coefficient(minus_error_var);
            let new_constant = expr.constant + coeff * delta;
            expr.constant = new_constant;
            if basic_var.is_restricted() && new_constant < 0.0 {
                self.infeasible_rows.push(basic_var.clone());
            }
        }
    }

    // -- normalization / direct-add vs artificial (§4.2.2, §4.2.3) ---------

    fn choose_subject(&self, expression: &mut Expression) -> Option<Variable> {
        let terms: Vec<(Variable, f64)> = expression.iter().rev().map(|(v, c)| (v.clone(), c)).collect();

        let mut subject: Option<Variable> = None;
        let mut found_unrestricted = false;
        let mut found_new_restricted = false;

        for (t_v, t_c) in &terms {
            if found_unrestricted {
                if !t_v.is_restricted() && !self.columns.contains_key(t_v) {
                    return Some(t_v.clone());
                }
            } else if t_v.is_restricted() {
                if !found_new_restricted && !t_v.is_dummy() && *t_c < 0.0 {
                    let eligible = match self.columns.get(t_v) {
                        None => true,
                        Some(cset) => cset.is_singleton() && self.columns.contains_key(&self.objective),
                    };
                    if eligible {
                        subject = Some(t_v.clone());
                        found_new_restricted = true;
                    }
                }
            } else {
                subject = Some(t_v.clone());
                found_unrestricted = true;
            }
        }

        if subject.is_some() {
            return subject;
        }

        let mut dummy_subject: Option<Variable> = None;
        let mut coeff = 0.0;
        for (t_v, t_c) in &terms {
            if !t_v.is_dummy() {
                return None;
            }
            if !self.columns.contains_key(t_v) {
                dummy_subject = Some(t_v.clone());
                coeff = *t_c;
            }
        }

        if !near_zero(expression.constant) {
            tracing::debug!("unable to satisfy required constraint (choose_subject)");
            return None;
        }

        if coeff > 0.0 {
            expression.multiply_by(-1.0);
        }

        dummy_subject
    }

    fn try_adding_directly(&mut self, mut expression: Expression) -> Result<(), Expression> {
        let Some(subject) = self.choose_subject(&mut expression) else {
            return Err(expression);
        };

        expression.new_subject(&subject);
        if self.columns.contains_key(&subject) {
            self.substitute_out(&subject, &expression);
        }
        self.add_row(subject, expression);
        Ok(())
    }

    fn add_with_artificial_variable(&mut self, expression: Expression) {
        self.artificial_counter += 1;

        let av = Variable::new_slack(Some("a"));
        let az = Variable::new_objective(Some("az"));

        self.add_row(az.clone(), expression.clone());
        self.add_row(av.clone(), expression);

        self.optimize(&az);

        let satisfied = near_zero(self.rows[&az].constant);
        if !satisfied {
            tracing::debug!("unable to satisfy a required constraint (add)");
            self.remove_column(&av);
            self.remove_row(&az);
            return;
        }

        if self.rows.contains_key(&av) {
            if self.rows[&av].is_constant() {
                self.remove_row(&av);
                self.remove_row(&az);
                return;
            }

            let entry_var = self.rows[&av].iter().find(|(v, _)| v.is_pivotable()).map(|(v, _)| v.clone());
            match entry_var {
                Some(entry_var) => self.pivot(&entry_var, &av),
                None => return,
            }
        }

        debug_assert!(!self.rows.contains_key(&av));
        self.remove_column(&av);
        self.remove_row(&az);
    }

    /// Rewrites the constraint's raw expression into normal form, adding
    /// whatever slack/error/dummy variables its relation and strength call
    /// for, and wiring them into the objective row (spec §4.2.2).
    fn new_expression(&mut self, constraint_ref: ConstraintRef) -> (Expression, Option<Variable>, Option<Variable>, f64) {
        let (cn_expr, relation, weight, is_required, is_stay, is_edit) = {
            let data = &self.constraints[constraint_ref];
            (
                data.expression.clone(),
                data.relation,
                data.weight,
                Strength::custom(data.weight).is_required(),
                data.is_stay,
                data.is_edit,
            )
        };

        let mut expr = Expression::from_constant(cn_expr.constant);
        let terms: Vec<(Variable, f64)> = cn_expr.iter().map(|(v, c)| (v.clone(), c)).collect();
        for (t_v, t_c) in terms {
            match self.rows.get(&t_v).cloned() {
                None => expr.add_variable(t_v, t_c, None, None),
                Some(row) => expr.add_expression(&row, t_c, None, None),
            }
        }

        let mut eplus = None;
        let mut eminus = None;
        let mut prev_constant = 0.0;
        let objective = self.objective.clone();

        if relation != Relation::Equal {
            self.slack_counter += 1;
            let slack_var = Variable::new_slack(Some("s"));
            expr.set_variable(slack_var.clone(), -1.0);
            self.marker_vars.insert(constraint_ref, slack_var);

            if !is_required {
                self.slack_counter += 1;
                let eminus_var = Variable::new_slack(Some("em"));
                expr.set_variable(eminus_var.clone(), 1.0);
                self.rows.get_mut(&objective).unwrap().set_variable(eminus_var.clone(), weight);
                self.insert_error_variable(constraint_ref, &eminus_var);
                self.track_added_variable(&eminus_var, Some(&objective));
            }
        } else if is_required {
            self.dummy_counter += 1;
            let dummy_var = Variable::new_dummy(Some("dummy"));
            eplus = Some(dummy_var.clone());
            eminus = Some(dummy_var.clone());
            prev_constant = cn_expr.constant;
            expr.set_variable(dummy_var.clone(), 1.0);
            self.marker_vars.insert(constraint_ref, dummy_var);
        } else {
            self.slack_counter += 1;
            let eplus_var = Variable::new_slack(Some("ep"));
            let eminus_var = Variable::new_slack(Some("em"));
            expr.set_variable(eplus_var.clone(), -1.0);
            expr.set_variable(eminus_var.clone(), 1.0);
            self.marker_vars.insert(constraint_ref, eplus_var.clone());

            {
                let z_row = self.rows.get_mut(&objective).unwrap();
                z_row.set_variable(eplus_var.clone(), weight);
                z_row.set_variable(eminus_var.clone(), weight);
            }
            self.track_added_variable(&eplus_var, Some(&objective));
            self.track_added_variable(&eminus_var, Some(&objective));
            self.insert_error_variable(constraint_ref, &eplus_var);
            self.insert_error_variable(constraint_ref, &eminus_var);

            if is_stay {
                self.stay_error_vars.push((eplus_var, eminus_var));
            } else if is_edit {
                eplus = Some(eplus_var);
                eminus = Some(eminus_var);
                prev_constant = cn_expr.constant;
            }
        }

        if expr.constant < 0.0 {
            expr.multiply_by(-1.0);
        }

        (expr, eplus, eminus, prev_constant)
    }

    fn undo_error_contribution(&mut self, v: &Variable, weight: f64) {
        let objective = self.objective.clone();
        let mut z_row = self.rows.remove(&objective).expect("objective row always present");
        match self.rows.get(v).cloned() {
            None => z_row.add_variable(v.clone(), weight, Some(&objective), Some(self)),
            Some(row) => z_row.add_expression(&row, weight, Some(&objective), Some(self)),
        }
        self.rows.insert(objective, z_row);
    }

    fn add_constraint_internal(&mut self, constraint_ref: ConstraintRef) {
        let (expr, eplus, eminus, prev_constant) = self.new_expression(constraint_ref);

        let (is_stay, is_edit, variable) = {
            let data = &self.constraints[constraint_ref];
            (data.is_stay, data.is_edit, data.variable.clone())
        };

        if is_stay {
            let variable = variable.expect("stay constraint carries its target variable");
            self.stay_var_map.insert(
                variable,
                StayInfo {
                    constraint: constraint_ref,
                },
            );
        } else if is_edit {
            let variable = variable.expect("edit constraint carries its target variable");
            self.edit_var_map.insert(
                variable,
                EditInfo {
                    constraint: constraint_ref,
                    eplus: eplus.expect("edit constraint normalizes to an eplus/eminus pair"),
                    eminus: eminus.expect("edit constraint normalizes to an eplus/eminus pair"),
                    prev_constant,
                },
            );
        }

        if let Err(expr) = self.try_adding_directly(expr) {
            self.add_with_artificial_variable(expr);
        }

        self.needs_solving = true;
        if self.auto_solve {
            let objective = self.objective.clone();
            self.optimize(&objective);
            self.set_external_variables();
        }
    }

    // -- public API (spec §6) ----------------------------------------------

    /// Adds `variable <relation> expression` (weighted by `strength`) to the
    /// tableau. `expression` is required unless `relation` is `Equal` and
    /// `variable` alone is the whole constraint.
    pub fn add_constraint(
        &mut self,
        variable: Option<&Variable>,
        relation: Relation,
        expression: Option<Expression>,
        strength: Strength,
    ) -> ConstraintRef {
        let expr = match expression {
            None => {
                Expression::from_variable(variable.expect("add_constraint: no variable and no expression").clone())
            }
            Some(mut expr) => {
                if let Some(variable) = variable {
                    match relation {
                        Relation::Equal | Relation::LessOrEqual => {
                            expr.add_variable(variable.clone(), -1.0, None, None);
                        }
                        Relation::GreaterOrEqual => {
                            expr.multiply_by(-1.0);
                            expr.add_variable(variable.clone(), 1.0, None, None);
                        }
                    }
                }
                expr
            }
        };

        let data = ConstraintData {
            variable: None,
            relation,
            expression: expr,
            weight: strength.value(),
            is_stay: false,
            is_edit: false,
        };
        let constraint_ref = self.constraints.insert(data);
        self.add_constraint_internal(constraint_ref);
        constraint_ref
    }

    /// Adds an equality constraint pinning `variable` to its current value,
    /// at `strength` (spec §4.2.2 "stay constraint").
    pub fn add_stay_variable(&mut self, variable: &Variable, strength: Strength) -> ConstraintRef {
        let mut expr = Expression::from_constant(variable.value());
        expr.add_variable(variable.clone(), -1.0, None, None);

        let data = ConstraintData {
            variable: Some(variable.clone()),
            relation: Relation::Equal,
            expression: expr,
            weight: strength.value(),
            is_stay: true,
            is_edit: false,
        };
        let constraint_ref = self.constraints.insert(data);
        self.add_constraint_internal(constraint_ref);
        constraint_ref
    }

    pub fn remove_stay_variable(&mut self, variable: &Variable) {
        match self.stay_var_map.get(variable).map(|si| si.constraint) {
            Some(constraint_ref) => self.remove_constraint(constraint_ref),
            None => tracing::error!("unknown stay variable"),
        }
    }

    pub fn has_stay_variable(&self, variable: &Variable) -> bool {
        self.stay_var_map.contains_key(variable)
    }

    /// Adds an editable equality constraint on `variable`, required before
    /// `suggest_value` may target it (spec §4.2.6).
    pub fn add_edit_variable(&mut self, variable: &Variable, strength: Strength) -> ConstraintRef {
        let mut expr = Expression::from_constant(variable.value());
        expr.add_variable(variable.clone(), -1.0, None, None);

        let data = ConstraintData {
            variable: Some(variable.clone()),
            relation: Relation::Equal,
            expression: expr,
            weight: strength.value(),
            is_stay: false,
            is_edit: true,
        };
        let constraint_ref = self.constraints.insert(data);
        self.add_constraint_internal(constraint_ref);
        constraint_ref
    }

    pub fn remove_edit_variable(&mut self, variable: &Variable) {
        match self.edit_var_map.get(variable).map(|ei| ei.constraint) {
            Some(constraint_ref) => self.remove_constraint(constraint_ref),
            None => tracing::error!("unknown edit variable"),
        }
    }

    pub fn has_edit_variable(&self, variable: &Variable) -> bool {
        self.edit_var_map.contains_key(variable)
    }

    /// Removes a constraint from the tableau (spec §4.2.9). A stale or
    /// alien `ConstraintRef` is a no-op (spec §5).
    pub fn remove_constraint(&mut self, constraint_ref: ConstraintRef) {
        if !self.constraints.contains(constraint_ref) {
            return;
        }

        self.needs_solving = true;
        self.reset_stay_constants();

        let weight = self.constraints[constraint_ref].weight;
        let error_vars = self.error_vars.get(&constraint_ref).cloned();

        if let Some(error_vars) = &error_vars {
            let members: Vec<Variable> = error_vars.iter().cloned().collect();
            for v in &members {
                self.undo_error_contribution(v, weight);
            }
        }

        let Some(marker) = self.marker_vars.remove(&constraint_ref) else {
            tracing::error!("remove_constraint: constraint has no marker variable");
            return;
        };

        if !self.rows.contains_key(&marker) {
            if let Some(set) = self.columns.get(&marker).cloned() {
                let mut exit_var: Option<Variable> = None;
                let mut min_ratio = 0.0;

                for v in set.iter() {
                    if !v.is_restricted() {
                        continue;
                    }
                    let Some(e) = self.rows.get(v) else { continue };
                    let coeff = e.coefficient(&marker);
                    if coeff < 0.0 {
                        let r = -e.constant / coeff;
                        if exit_var.is_none() || r < min_ratio || approx_eq(r, min_ratio, RATIO_EPSILON) {
                            min_ratio = r;
                            exit_var = Some(v.clone());
                        }
                    }
                }

                if exit_var.is_none() {
                    for v in set.iter() {
                        if !v.is_restricted() {
                            continue;
                        }
                        let Some(e) = self.rows.get(v) else { continue };
                        let coeff = e.coefficient(&marker);
                        let r = if !approx_eq(coeff, 0.0, RATIO_EPSILON) { e.constant / coeff } else { 0.0 };
                        if exit_var.is_none() || r < min_ratio {
                            min_ratio = r;
                            exit_var = Some(v.clone());
                        }
                    }
                }

                if exit_var.is_none() {
                    if set.is_empty() {
                        self.remove_column(&marker);
                    } else {
                        for v in set.iter() {
                            if *v != self.objective {
                                exit_var = Some(v.clone());
                                break;
                            }
                        }
                    }
                }

                if let Some(exit_var) = exit_var {
                    self.pivot(&marker, &exit_var);
                }
            }
        }

        if self.rows.contains_key(&marker) {
            self.remove_row(&marker);
        }

        if let Some(error_vars) = &error_vars {
            for v in error_vars.iter() {
                if *v != marker {
                    self.remove_column(v);
                }
            }
        }

        let (is_stay, is_edit, variable) = {
            let data = &self.constraints[constraint_ref];
            (data.is_stay, data.is_edit, data.variable.clone())
        };

        if is_stay {
            if let Some(error_vars) = &error_vars {
                let mut ev = error_vars.clone();
                let mut remaining = Vec::new();
                for (first, second) in &self.stay_error_vars {
                    let mut found = false;
                    if ev.remove(first) {
                        found = true;
                    }
                    if ev.remove(second) {
                        found = false;
                    }
                    if !found {
                        remaining.push((first.clone(), second.clone()));
                    }
                }
                self.stay_error_vars = remaining;
            }
            if let Some(variable) = &variable {
                self.stay_var_map.remove(variable);
            }
        } else if is_edit {
            if let Some(variable) = &variable {
                if let Some(ei) = self.edit_var_map.remove(variable) {
                    self.remove_column(&ei.eminus);
                }
            }
        }

        self.error_vars.remove(&constraint_ref);

        if self.auto_solve {
            let objective = self.objective.clone();
            self.optimize(&objective);
            self.set_external_variables();
        }

        self.constraints.remove(constraint_ref);
    }

    /// Begins an edit phase: `suggest_value` is only legal between a
    /// `begin_edit`/`end_edit` pair (spec §4.2.6).
    pub fn begin_edit(&mut self) {
        if self.edit_var_map.is_empty() {
            tracing::error!("begin_edit: solver has no editable variables");
            return;
        }
        self.infeasible_rows.clear();
        self.reset_stay_constants();
        self.in_edit_phase = true;
    }

    pub fn end_edit(&mut self) {
        self.in_edit_phase = false;
        self.resolve();
        self.edit_var_map.clear();
    }

    /// Suggests `value` for an edit variable mid edit-phase, propagating
    /// the delta into the tableau without a full re-solve (spec §4.2.6).
    pub fn suggest_value(&mut self, variable: &Variable, value: f64) -> Result<(), SolverError> {
        if !self.edit_var_map.contains_key(variable) {
            tracing::error!("suggest_value: variable is not editable");
            return Err(SolverError::NotAnEditVariable);
        }
        if !self.in_edit_phase {
            tracing::error!("suggest_value: solver is not in an edit phase");
            return Err(SolverError::NotInEditPhase);
        }

        let (eplus, eminus, prev_constant) = {
            let ei = &self.edit_var_map[variable];
            (ei.eplus.clone(), ei.eminus.clone(), ei.prev_constant)
        };
        let delta = value - prev_constant;
        self.edit_var_map.get_mut(variable).unwrap().prev_constant = value;
        self.delta_edit_constant(delta, &eplus, &eminus);
        Ok(())
    }

    /// Re-solves the tableau: dual-optimizes away any infeasible rows, then
    /// commits external variable values (spec §4.2.6, §4.2.7).
    pub fn resolve(&mut self) {
        self.dual_optimize();
        self.set_external_variables();
        self.infeasible_rows.clear();
        self.reset_stay_constants();
        self.needs_solving = false;
    }

    /// Suspends auto-solving. Nestable; matching `thaw` calls re-enable it.
    pub fn freeze(&mut self) {
        self.freeze_count += 1;
        self.auto_solve = false;
    }

    /// Reverses one `freeze`. Once the nesting count reaches zero,
    /// auto-solve resumes and the tableau is resolved.
    pub fn thaw(&mut self) {
        if self.freeze_count == 0 {
            return;
        }
        self.freeze_count -= 1;
        if self.freeze_count == 0 {
            self.auto_solve = true;
            self.resolve();
        }
    }

    /// Removes every constraint and resets the tableau to a fresh state,
    /// without invalidating the `Solver` itself.
    pub fn clear(&mut self) {
        self.constraints.clear();
        self.external_rows = VariableSet::new();
        self.external_parametric_vars = VariableSet::new();
        self.error_vars.clear();
        self.marker_vars.clear();
        self.edit_var_map.clear();
        self.stay_var_map.clear();

        self.infeasible_rows.clear();
        self.stay_error_vars.clear();

        self.rows.clear();
        self.columns.clear();

        self.objective = Variable::new_objective(Some("Z"));
        self.rows.insert(self.objective.clone(), Expression::from_constant(0.0));

        self.slack_counter = 0;
        self.dummy_counter = 0;
        self.artificial_counter = 0;
        self.freeze_count = 0;

        self.needs_solving = false;
        self.auto_solve = true;
    }

    pub fn statistics(&self) -> Statistics {
        Statistics {
            variables: self.var_counter,
            slack_vars: self.slack_counter,
            artificial_vars: self.artificial_counter,
            dummy_vars: self.dummy_counter,
            stay_vars: self.stay_var_map.len(),
            optimize_count: self.optimize_count,
        }
    }
}

impl ChangeObserver for Solver {
    fn note_added_variable(&mut self, variable: &Variable, subject: Option<&Variable>) {
        self.track_added_variable(variable, subject);
    }

    fn note_removed_variable(&mut self, variable: &Variable, subject: Option<&Variable>) {
        self.track_removed_variable(variable, subject);
    }
}

impl fmt::Display for Solver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tableau info:")?;
        writeln!(f, "Rows: {} (= {} constraints)", self.rows.len(), self.rows.len().saturating_sub(1))?;
        writeln!(f, "Columns: {}", self.columns.len())?;
        writeln!(f, "Infeasible rows: {}", self.infeasible_rows.len())?;
        writeln!(f, "External basic variables: {}", self.external_rows.len())?;
        writeln!(f, "External parametric variables: {}", self.external_parametric_vars.len())?;
        write!(f, "Constraints: {}", self.constraints.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.001
    }

    #[test]
    fn scenario_1_simple_equality() {
        let mut solver = Solver::new();
        let x = solver.create_variable(None, Some("x"), 167.0);
        let y = solver.create_variable(None, Some("y"), 2.0);

        solver.add_constraint(Some(&x), Relation::Equal, Some(Expression::from_variable(y.clone())), Strength::REQUIRED);

        assert!(approx(x.value(), y.value()));
        assert!(approx(x.value(), 0.0));
    }

    #[test]
    fn scenario_2_stays() {
        let mut solver = Solver::new();
        let x = solver.create_variable(None, Some("x"), 5.0);
        let y = solver.create_variable(None, Some("y"), 10.0);

        solver.add_stay_variable(&x, Strength::WEAK);
        solver.add_stay_variable(&y, Strength::WEAK);

        assert!(approx(x.value(), 5.0));
        assert!(approx(y.value(), 10.0));
    }

    #[test]
    fn scenario_3_paper_example() {
        let mut solver = Solver::new();
        let left = solver.create_variable(None, Some("left"), 0.0);
        let middle = solver.create_variable(None, Some("middle"), 0.0);
        let right = solver.create_variable(None, Some("right"), 0.0);

        // middle = (left + right) / 2  <=>  2*middle - left - right = 0
        let mut mid_expr = Expression::from_variable(left.clone());
        mid_expr.add_term(right.clone(), 1.0);
        mid_expr.multiply_by(0.5);
        solver.add_constraint(Some(&middle), Relation::Equal, Some(mid_expr), Strength::REQUIRED);

        // right = left + 10
        let mut right_expr = Expression::from_variable(left.clone());
        right_expr.constant = 10.0;
        solver.add_constraint(Some(&right), Relation::Equal, Some(right_expr), Strength::REQUIRED);

        // right <= 100
        solver.add_constraint(Some(&right), Relation::LessOrEqual, Some(Expression::from_constant(100.0)), Strength::REQUIRED);

        // left >= 0
        solver.add_constraint(Some(&left), Relation::GreaterOrEqual, Some(Expression::from_constant(0.0)), Strength::REQUIRED);

        assert!(left.value() >= -0.001);
        assert!(right.value() <= 100.001);
        assert!(approx(right.value() - left.value(), 10.0));
        assert!(approx(middle.value() * 2.0, left.value() + right.value()));

        middle.set_value(45.0);
        solver.add_stay_variable(&middle, Strength::WEAK);
        solver.resolve();

        assert!(approx(left.value(), 40.0));
        assert!(approx(middle.value(), 45.0));
        assert!(approx(right.value(), 50.0));
    }

    #[test]
    fn scenario_4_edit_with_required_strength() {
        let mut solver = Solver::new();
        let a = solver.create_variable(None, Some("a"), 0.0);
        solver.add_stay_variable(&a, Strength::STRONG);

        solver.add_edit_variable(&a, Strength::REQUIRED);
        solver.begin_edit();

        solver.suggest_value(&a, 2.0).unwrap();
        solver.resolve();
        assert!(approx(a.value(), 2.0));

        solver.suggest_value(&a, 10.0).unwrap();
        solver.resolve();
        assert!(approx(a.value(), 10.0));

        solver.end_edit();
    }

    #[test]
    fn scenario_5_edit_propagation() {
        let mut solver = Solver::new();
        let a = solver.create_variable(None, Some("a"), 0.0);
        let b = solver.create_variable(None, Some("b"), 0.0);

        solver.add_stay_variable(&a, Strength::STRONG);
        solver.add_constraint(Some(&a), Relation::Equal, Some(Expression::from_variable(b.clone())), Strength::REQUIRED);
        solver.resolve();
        assert!(approx(a.value(), 0.0));
        assert!(approx(b.value(), 0.0));

        solver.add_edit_variable(&a, Strength::REQUIRED);
        solver.begin_edit();

        solver.suggest_value(&a, 2.0).unwrap();
        solver.resolve();
        assert!(approx(a.value(), 2.0));
        assert!(approx(b.value(), 2.0));

        solver.suggest_value(&a, 10.0).unwrap();
        solver.resolve();
        assert!(approx(a.value(), 10.0));
        assert!(approx(b.value(), 10.0));

        solver.suggest_value(&a, 12.0).unwrap();
        solver.resolve();
        assert!(approx(a.value(), 12.0));
        assert!(approx(b.value(), 12.0));
    }

    #[test]
    fn scenario_6_cassowary_unstable_system() {
        let mut solver = Solver::new();
        let x = solver.create_variable(None, Some("x"), 0.0);
        let y = solver.create_variable(None, Some("y"), 0.0);

        // x <= y
        solver.add_constraint(Some(&x), Relation::LessOrEqual, Some(Expression::from_variable(y.clone())), Strength::REQUIRED);
        // y = x + 3
        let mut y_expr = Expression::from_variable(x.clone());
        y_expr.constant = 3.0;
        solver.add_constraint(Some(&y), Relation::Equal, Some(y_expr), Strength::REQUIRED);

        solver.add_constraint(Some(&x), Relation::Equal, Some(Expression::from_constant(10.0)), Strength::WEAK);
        solver.add_constraint(Some(&y), Relation::Equal, Some(Expression::from_constant(10.0)), Strength::WEAK);

        let first = (approx(x.value(), 10.0) && approx(y.value(), 13.0)) || (approx(x.value(), 7.0) && approx(y.value(), 10.0));
        assert!(first);

        let (x_before, y_before) = (x.value(), y.value());
        solver.clear();

        let x2 = solver.create_variable(None, Some("x"), 0.0);
        let y2 = solver.create_variable(None, Some("y"), 0.0);
        solver.add_constraint(Some(&x2), Relation::LessOrEqual, Some(Expression::from_variable(y2.clone())), Strength::REQUIRED);
        let mut y2_expr = Expression::from_variable(x2.clone());
        y2_expr.constant = 3.0;
        solver.add_constraint(Some(&y2), Relation::Equal, Some(y2_expr), Strength::REQUIRED);
        solver.add_constraint(Some(&x2), Relation::Equal, Some(Expression::from_constant(10.0)), Strength::WEAK);
        solver.add_constraint(Some(&y2), Relation::Equal, Some(Expression::from_constant(10.0)), Strength::WEAK);

        assert!(approx(x2.value(), x_before));
        assert!(approx(y2.value(), y_before));
    }

    #[test]
    fn weight_hierarchy_required_beats_weak() {
        let mut solver = Solver::new();
        let x = solver.create_variable(None, Some("x"), 0.0);

        solver.add_constraint(Some(&x), Relation::Equal, Some(Expression::from_constant(5.0)), Strength::REQUIRED);
        solver.add_constraint(Some(&x), Relation::Equal, Some(Expression::from_constant(100.0)), Strength::WEAK);

        assert!(approx(x.value(), 5.0));
    }

    #[test]
    fn weight_hierarchy_strong_beats_many_medium() {
        let mut solver = Solver::new();
        let x = solver.create_variable(None, Some("x"), 0.0);

        solver.add_constraint(Some(&x), Relation::Equal, Some(Expression::from_constant(5.0)), Strength::STRONG);
        for target in 0..50 {
            solver.add_constraint(Some(&x), Relation::Equal, Some(Expression::from_constant(target as f64)), Strength::MEDIUM);
        }

        assert!(approx(x.value(), 5.0));
    }

    #[test]
    fn remove_undoes_constraint() {
        // A required constraint is the only thing pinning `x`; once it is
        // removed, `x` has no constraints left and reverts to its
        // unconstrained default of 0, rather than lingering at the pinned
        // value.
        let mut solver = Solver::new();
        let x = solver.create_variable(None, Some("x"), 3.0);

        let c = solver.add_constraint(Some(&x), Relation::Equal, Some(Expression::from_constant(99.0)), Strength::REQUIRED);
        assert!(approx(x.value(), 99.0));

        solver.remove_constraint(c);
        solver.resolve();
        assert!(approx(x.value(), 0.0));
    }

    #[test]
    fn remove_constraint_decouples_variables() {
        // `y` is pinned to `x + 10` by a required equality; editing `x`
        // drags `y` along. Once the equality is removed, `y` stops
        // tracking `x`.
        let mut solver = Solver::new();
        let x = solver.create_variable(None, Some("x"), 0.0);
        let y = solver.create_variable(None, Some("y"), 0.0);

        let mut expr = Expression::from_variable(x.clone());
        expr.constant = 10.0;
        let c = solver.add_constraint(Some(&y), Relation::Equal, Some(expr), Strength::REQUIRED);

        solver.add_edit_variable(&x, Strength::REQUIRED);
        solver.begin_edit();
        solver.suggest_value(&x, 5.0).unwrap();
        solver.resolve();
        assert!(approx(y.value(), 15.0));
        solver.end_edit();

        solver.remove_constraint(c);

        solver.add_edit_variable(&x, Strength::REQUIRED);
        solver.begin_edit();
        let y_before = y.value();
        solver.suggest_value(&x, 42.0).unwrap();
        solver.resolve();
        assert!(approx(y.value(), y_before));
        solver.end_edit();
    }

    #[test]
    fn idempotent_resolve_does_not_move_values() {
        let mut solver = Solver::new();
        let x = solver.create_variable(None, Some("x"), 3.0);
        solver.add_stay_variable(&x, Strength::WEAK);
        solver.resolve();
        let first = x.value();
        solver.resolve();
        assert_eq!(first, x.value());
    }

    #[test]
    fn stale_constraint_ref_remove_is_a_no_op() {
        let mut solver = Solver::new();
        let x = solver.create_variable(None, Some("x"), 3.0);
        let c = solver.add_stay_variable(&x, Strength::WEAK);
        solver.remove_constraint(c);
        // removing the same (now stale) ref again must not panic
        solver.remove_constraint(c);
    }

    #[test]
    fn suggest_value_outside_edit_phase_is_an_error() {
        let mut solver = Solver::new();
        let a = solver.create_variable(None, Some("a"), 0.0);
        solver.add_edit_variable(&a, Strength::REQUIRED);
        assert_eq!(solver.suggest_value(&a, 5.0), Err(SolverError::NotInEditPhase));
    }

    #[test]
    fn suggest_value_on_non_edit_variable_is_an_error() {
        let mut solver = Solver::new();
        let a = solver.create_variable(None, Some("a"), 0.0);
        assert_eq!(solver.suggest_value(&a, 5.0), Err(SolverError::NotAnEditVariable));
    }

    #[test]
    fn freeze_defers_commit_until_matching_thaw() {
        let mut solver = Solver::new();
        let x = solver.create_variable(None, Some("x"), 1.0);
        solver.add_stay_variable(&x, Strength::WEAK);

        solver.freeze();
        solver.add_constraint(Some(&x), Relation::Equal, Some(Expression::from_constant(50.0)), Strength::REQUIRED);
        // Frozen: commit has not happened, though internal state already reflects the new constraint.
        solver.thaw();
        assert!(approx(x.value(), 50.0));
    }

    #[test]
    fn nested_freeze_only_thaws_at_zero() {
        let mut solver = Solver::new();
        let x = solver.create_variable(None, Some("x"), 1.0);
        solver.add_stay_variable(&x, Strength::WEAK);

        solver.freeze();
        solver.freeze();
        solver.add_constraint(Some(&x), Relation::Equal, Some(Expression::from_constant(9.0)), Strength::REQUIRED);
        solver.thaw();
        assert!(!solver.auto_solve);
        solver.thaw();
        assert!(approx(x.value(), 9.0));
    }

    #[test]
    fn unsatisfiable_required_constraint_is_logged() {
        use std::sync::{Arc, Mutex};

        #[derive(Clone, Default)]
        struct Capture(Arc<Mutex<Vec<u8>>>);

        impl std::io::Write for Capture {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        impl<'w> tracing_subscriber::fmt::MakeWriter<'w> for Capture {
            type Writer = Capture;
            fn make_writer(&'w self) -> Self::Writer {
                self.clone()
            }
        }

        let capture = Capture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut solver = Solver::new();
            let x = solver.create_variable(None, Some("x"), 0.0);
            solver.add_constraint(Some(&x), Relation::Equal, Some(Expression::from_constant(5.0)), Strength::REQUIRED);
            solver.add_constraint(Some(&x), Relation::Equal, Some(Expression::from_constant(10.0)), Strength::REQUIRED);
        });

        let log = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(log.contains("unable to satisfy a required constraint"), "log output: {log}");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn objective_monotonicity_never_increases(values in proptest::collection::vec(-50.0f64..50.0, 2..6)) {
            let mut solver = Solver::new();
            let vars: Vec<Variable> = values
                .iter()
                .map(|v| solver.create_variable(None, None, *v))
                .collect();

            for v in &vars {
                solver.add_stay_variable(v, Strength::WEAK);
            }
            for (v, target) in vars.iter().zip(values.iter()) {
                solver.add_constraint(Some(v), Relation::Equal, Some(Expression::from_constant(target + 1000.0)), Strength::MEDIUM);
            }
            // No panics, and the tableau stays internally consistent: every
            // column entry still points at a row that actually mentions it.
            solver.resolve();
            for (param, cset) in solver.columns.iter() {
                for basic in cset.iter() {
                    let row = solver.rows.get(basic).expect("column points at a live row");
                    prop_assert!(row.contains(param));
                }
            }
        }

        #[test]
        fn remove_undoes_random_required_constraint(initial in -20.0f64..20.0, target in -20.0f64..20.0) {
            let mut solver = Solver::new();
            let x = solver.create_variable(None, None, initial);

            let c = solver.add_constraint(Some(&x), Relation::Equal, Some(Expression::from_constant(target)), Strength::REQUIRED);
            prop_assert!((x.value() - target).abs() < 1e-6);

            solver.remove_constraint(c);
            solver.resolve();

            prop_assert!((x.value() - 0.0).abs() < 1e-6);
        }
    }
}

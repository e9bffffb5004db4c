use indexmap::IndexMap;
use qadmm_core::math::{scalar, RealNumber};
use qadmm_core::problem::{
    Bounds, CouplingConstraints, CscMatrix, EqualityConstraints, InequalityConstraints, ProblemError,
    ProblemModel,
};
use qadmm_core::solution::AdmmResult;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarKind {
    Binary,
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sense {
    LessEqual,
    GreaterEqual,
    Equal,
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("variable `{0}` declared twice")]
    DuplicateVariable(String),
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),
    #[error("constraint `{0}` has no terms")]
    EmptyConstraint(String),
    #[error(transparent)]
    Problem(#[from] ProblemError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Variable<T> {
    kind: VarKind,
    lower: T,
    upper: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearConstraint<T> {
    pub name: String,
    pub terms: IndexMap<String, T>,
    pub sense: Sense,
    pub rhs: T,
}

/// Named-variable front end producing a [`ProblemModel`].
///
/// Variables may be declared in any order; the built model lists binaries
/// first, each group in declaration order. Constraints are routed by the
/// variables they touch:
///
/// * binary-only `=` rows become `Gx = b`;
/// * `=` rows touching a continuous variable become a `<=`/`>=` pair;
/// * `>=` rows are negated into `<=`;
/// * `<=` rows land in the binary, continuous or coupling block.
#[derive(Debug, Clone)]
pub struct ModelBuilder<T> {
    variables: IndexMap<String, Variable<T>>,
    quadratic: Vec<(String, String, T)>,
    linear: IndexMap<String, T>,
    constant: T,
    constraints: Vec<LinearConstraint<T>>,
    error: Option<String>,
}

impl<T> Default for ModelBuilder<T>
where
    T: RealNumber,
{
    fn default() -> Self {
        Self {
            variables: IndexMap::new(),
            quadratic: Vec::new(),
            linear: IndexMap::new(),
            constant: T::zero(),
            constraints: Vec::new(),
            error: None,
        }
    }
}

type Row<T> = (Vec<(usize, T)>, T);

impl<T> ModelBuilder<T>
where
    T: RealNumber,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn declare(mut self, name: String, variable: Variable<T>) -> Self {
        if self.variables.contains_key(&name) {
            self.error.get_or_insert(name);
        } else {
            self.variables.insert(name, variable);
        }
        self
    }

    pub fn binary(self, name: impl Into<String>) -> Self {
        self.declare(
            name.into(),
            Variable {
                kind: VarKind::Binary,
                lower: T::zero(),
                upper: T::one(),
            },
        )
    }

    /// Continuous variable with `lower <= u <= upper`; infinite bounds are allowed.
    pub fn continuous(self, name: impl Into<String>, lower: T, upper: T) -> Self {
        self.declare(
            name.into(),
            Variable {
                kind: VarKind::Continuous,
                lower,
                upper,
            },
        )
    }

    pub fn linear_term(mut self, name: impl Into<String>, coefficient: T) -> Self {
        *self.linear.entry(name.into()).or_insert_with(T::zero) += coefficient;
        self
    }

    /// Adds `coefficient * a * b` to the objective.
    pub fn quadratic_term(mut self, a: impl Into<String>, b: impl Into<String>, coefficient: T) -> Self {
        self.quadratic.push((a.into(), b.into(), coefficient));
        self
    }

    pub fn constant(mut self, value: T) -> Self {
        self.constant += value;
        self
    }

    pub fn constraint(mut self, name: impl Into<String>, terms: &[(&str, T)], sense: Sense, rhs: T) -> Self {
        let mut merged = IndexMap::new();
        for (var, coefficient) in terms {
            *merged.entry((*var).to_string()).or_insert_with(T::zero) += *coefficient;
        }
        self.constraints.push(LinearConstraint {
            name: name.into(),
            terms: merged,
            sense,
            rhs,
        });
        self
    }

    pub fn build(self) -> Result<BuiltModel<T>, BuildError> {
        if let Some(name) = self.error {
            return Err(BuildError::DuplicateVariable(name));
        }
        let binary_names: Vec<String> = self
            .variables
            .iter()
            .filter(|(_, var)| var.kind == VarKind::Binary)
            .map(|(name, _)| name.clone())
            .collect();
        let continuous: Vec<(&String, &Variable<T>)> = self
            .variables
            .iter()
            .filter(|(_, var)| var.kind == VarKind::Continuous)
            .collect();
        let n = binary_names.len();
        let l = continuous.len();
        let index: IndexMap<&str, usize> = binary_names
            .iter()
            .map(String::as_str)
            .chain(continuous.iter().map(|(name, _)| name.as_str()))
            .enumerate()
            .map(|(i, name)| (name, i))
            .collect();
        let lookup = |name: &str| {
            index
                .get(name)
                .copied()
                .ok_or_else(|| BuildError::UnknownVariable(name.to_string()))
        };

        let mut triplets = Vec::with_capacity(2 * self.quadratic.len());
        let two = scalar::<T>(2.0);
        for (a, b, coefficient) in &self.quadratic {
            let (i, j) = (lookup(a.as_str())?, lookup(b.as_str())?);
            if i == j {
                triplets.push((i, i, two * *coefficient));
            } else {
                triplets.push((i, j, *coefficient));
                triplets.push((j, i, *coefficient));
            }
        }
        let mut linear = vec![T::zero(); n + l];
        for (name, coefficient) in &self.linear {
            linear[lookup(name.as_str())?] += *coefficient;
        }

        let mut equalities: Vec<Row<T>> = Vec::new();
        let mut binary_rows: Vec<Row<T>> = Vec::new();
        let mut continuous_rows: Vec<Row<T>> = Vec::new();
        let mut coupling_rows: Vec<Row<T>> = Vec::new();
        for constraint in &self.constraints {
            if constraint.terms.is_empty() {
                return Err(BuildError::EmptyConstraint(constraint.name.clone()));
            }
            let entries = constraint
                .terms
                .iter()
                .map(|(name, coefficient)| Ok((lookup(name.as_str())?, *coefficient)))
                .collect::<Result<Vec<_>, BuildError>>()?;
            let negated: Vec<(usize, T)> = entries.iter().map(|(i, c)| (*i, -*c)).collect();
            let touches_continuous = entries.iter().any(|(i, _)| *i >= n);
            let rows = match constraint.sense {
                Sense::LessEqual => vec![(entries, constraint.rhs)],
                Sense::GreaterEqual => vec![(negated, -constraint.rhs)],
                Sense::Equal if !touches_continuous => {
                    equalities.push((entries, constraint.rhs));
                    continue;
                }
                Sense::Equal => vec![(entries, constraint.rhs), (negated, -constraint.rhs)],
            };
            for (row, rhs) in rows {
                let has_binary = row.iter().any(|(i, _)| *i < n);
                let has_continuous = row.iter().any(|(i, _)| *i >= n);
                match (has_binary, has_continuous) {
                    (true, true) => coupling_rows.push((row, rhs)),
                    (false, true) => continuous_rows.push((row, rhs)),
                    _ => binary_rows.push((row, rhs)),
                }
            }
        }

        let model = ProblemModel {
            num_binary: n,
            num_continuous: l,
            quadratic: CscMatrix::from_triplets(n + l, n + l, &triplets),
            linear,
            constant: self.constant,
            equalities: (!equalities.is_empty()).then(|| {
                let (matrix, rhs) = assemble(&equalities, n, 0);
                EqualityConstraints { matrix, rhs }
            }),
            binary_inequalities: (!binary_rows.is_empty()).then(|| {
                let (matrix, rhs) = assemble(&binary_rows, n, 0);
                InequalityConstraints { matrix, rhs }
            }),
            coupling: (!coupling_rows.is_empty()).then(|| {
                let binary_part: Vec<Row<T>> = coupling_rows
                    .iter()
                    .map(|(row, rhs)| (row.iter().copied().filter(|(i, _)| *i < n).collect(), *rhs))
                    .collect();
                let continuous_part: Vec<Row<T>> = coupling_rows
                    .iter()
                    .map(|(row, rhs)| (row.iter().copied().filter(|(i, _)| *i >= n).collect(), *rhs))
                    .collect();
                let (binary_matrix, rhs) = assemble(&binary_part, n, 0);
                let (continuous_matrix, _) = assemble(&continuous_part, l, n);
                CouplingConstraints {
                    binary_matrix,
                    continuous_matrix,
                    rhs,
                }
            }),
            continuous_inequalities: (!continuous_rows.is_empty()).then(|| {
                let (matrix, rhs) = assemble(&continuous_rows, l, n);
                InequalityConstraints { matrix, rhs }
            }),
            continuous_bounds: (l > 0).then(|| Bounds {
                lower: continuous.iter().map(|(_, var)| var.lower).collect(),
                upper: continuous.iter().map(|(_, var)| var.upper).collect(),
            }),
        };
        model.validate()?;
        Ok(BuiltModel {
            model,
            binary_names,
            continuous_names: continuous.iter().map(|(name, _)| (*name).clone()).collect(),
        })
    }
}

fn assemble<T: RealNumber>(rows: &[Row<T>], ncols: usize, offset: usize) -> (CscMatrix<T>, Vec<T>) {
    let triplets: Vec<(usize, usize, T)> = rows
        .iter()
        .enumerate()
        .flat_map(|(r, (row, _))| row.iter().map(move |(i, c)| (r, *i - offset, *c)))
        .collect();
    let rhs = rows.iter().map(|(_, rhs)| *rhs).collect();
    (CscMatrix::from_triplets(rows.len(), ncols, &triplets), rhs)
}

/// A built model together with the names of its columns.
#[derive(Debug, Clone)]
pub struct BuiltModel<T> {
    pub model: ProblemModel<T>,
    pub binary_names: Vec<String>,
    pub continuous_names: Vec<String>,
}

impl<T> BuiltModel<T>
where
    T: RealNumber,
{
    /// Maps a result back onto variable names, binaries first.
    pub fn assignment(&self, result: &AdmmResult<T>) -> IndexMap<String, T> {
        self.binary_names
            .iter()
            .zip(result.binary.iter())
            .chain(self.continuous_names.iter().zip(result.continuous.iter()))
            .map(|(name, value)| (name.clone(), *value))
            .collect()
    }
}

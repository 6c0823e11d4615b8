use serde::{Deserialize, Serialize};

use crate::engine::EngineError;

/// Interaction model as supplied by the user: a style name plus coefficient
/// rows. The driver never looks inside; engines resolve it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionModel {
    pub style: String,
    pub coeffs: Vec<PairCoeff>,
}

/// One `pair_coeff`-style row. `i` and `j` are type numbers or `*`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairCoeff {
    pub i: String,
    pub j: String,
    pub params: Vec<f64>,
}

impl Default for InteractionModel {
    fn default() -> Self {
        InteractionModel {
            style: "hertz".to_string(),
            coeffs: vec![PairCoeff {
                i: "*".to_string(),
                j: "*".to_string(),
                params: vec![1.0, 1.0],
            }],
        }
    }
}

pub trait Interaction {
    fn potential(&self, dr: f64) -> f64;
    /// Magnitude of the repulsive force at separation `dr`.
    fn force(&self, dr: f64) -> f64;
    fn cutoff(&self) -> f64;
}

/// Hertzian soft sphere: `U(r) = 2/5 eps (1 - r/sigma)^(5/2)` for `r < sigma`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HertzianInteraction {
    pub epsilon: f64,
    pub sigma: f64,
}

impl Interaction for HertzianInteraction {
    fn potential(&self, dr: f64) -> f64 {
        if dr >= self.sigma {
            return 0.0;
        }
        0.4 * self.epsilon * (1.0 - dr / self.sigma).powf(2.5)
    }

    fn force(&self, dr: f64) -> f64 {
        if dr >= self.sigma {
            return 0.0;
        }
        (self.epsilon / self.sigma) * (1.0 - dr / self.sigma).powf(1.5)
    }

    fn cutoff(&self) -> f64 {
        self.sigma
    }
}

/// Dense type-by-type table of resolved pair interactions.
#[derive(Debug, Clone, PartialEq)]
pub struct PairTable {
    ntypes: usize,
    pairs: Vec<HertzianInteraction>,
}

impl PairTable {
    /// Resolves `model` for `ntypes` atom types. Later rows override earlier
    /// ones, and every pair must end up covered.
    pub fn resolve(model: &InteractionModel, ntypes: usize) -> Result<PairTable, EngineError> {
        if model.style != "hertz" {
            return Err(EngineError::invalid(format!(
                "unsupported interaction style '{}'",
                model.style
            )));
        }

        let mut slots: Vec<Option<HertzianInteraction>> = vec![None; ntypes * ntypes];
        for coeff in &model.coeffs {
            let (epsilon, sigma) = match coeff.params.as_slice() {
                [epsilon, sigma] => (*epsilon, *sigma),
                _ => {
                    return Err(EngineError::invalid(format!(
                        "hertz coefficients for {} {} need 'epsilon sigma', got {} values",
                        coeff.i,
                        coeff.j,
                        coeff.params.len()
                    )))
                }
            };
            if !(epsilon.is_finite() && sigma.is_finite()) || epsilon < 0.0 || sigma <= 0.0 {
                return Err(EngineError::invalid(format!(
                    "hertz coefficients for {} {} out of range (epsilon {}, sigma {})",
                    coeff.i, coeff.j, epsilon, sigma
                )));
            }
            let pair = HertzianInteraction { epsilon, sigma };
            for a in select(&coeff.i, ntypes)? {
                for b in select(&coeff.j, ntypes)? {
                    slots[(a - 1) * ntypes + (b - 1)] = Some(pair);
                    slots[(b - 1) * ntypes + (a - 1)] = Some(pair);
                }
            }
        }

        let mut pairs = Vec::with_capacity(slots.len());
        for (index, slot) in slots.into_iter().enumerate() {
            let pair = slot.ok_or_else(|| {
                EngineError::invalid(format!(
                    "no pair coefficients for types {} {}",
                    index / ntypes + 1,
                    index % ntypes + 1
                ))
            })?;
            pairs.push(pair);
        }
        Ok(PairTable { ntypes, pairs })
    }

    /// Interaction between 1-based types `a` and `b`.
    pub fn get(&self, a: usize, b: usize) -> &HertzianInteraction {
        &self.pairs[(a - 1) * self.ntypes + (b - 1)]
    }

    pub fn max_cutoff(&self) -> f64 {
        self.pairs.iter().map(|p| p.cutoff()).fold(0.0, f64::max)
    }
}

fn select(selector: &str, ntypes: usize) -> Result<Vec<usize>, EngineError> {
    if selector == "*" {
        return Ok((1..=ntypes).collect());
    }
    match selector.parse::<usize>() {
        Ok(kind) if kind >= 1 && kind <= ntypes => Ok(vec![kind]),
        _ => Err(EngineError::invalid(format!(
            "pair type '{}' does not name one of {} atom types",
            selector, ntypes
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hertz_force_is_minus_potential_slope() {
        let pair = HertzianInteraction {
            epsilon: 2.0,
            sigma: 1.5,
        };
        let r = 0.7;
        let h = 1e-6;
        let slope = (pair.potential(r + h) - pair.potential(r - h)) / (2.0 * h);
        assert!((pair.force(r) + slope).abs() < 1e-6);
        assert_eq!(pair.force(1.5), 0.0);
        assert_eq!(pair.potential(2.0), 0.0);
    }

    #[test]
    fn wildcards_then_specific_rows() {
        let model = InteractionModel {
            style: "hertz".into(),
            coeffs: vec![
                PairCoeff {
                    i: "*".into(),
                    j: "*".into(),
                    params: vec![1.0, 1.0],
                },
                PairCoeff {
                    i: "1".into(),
                    j: "2".into(),
                    params: vec![3.0, 1.2],
                },
            ],
        };
        let table = PairTable::resolve(&model, 3).unwrap();
        assert_eq!(table.get(2, 1).epsilon, 3.0);
        assert_eq!(table.get(1, 2).sigma, 1.2);
        assert_eq!(table.get(3, 3).epsilon, 1.0);
        assert_eq!(table.max_cutoff(), 1.2);
    }

    #[test]
    fn uncovered_pairs_are_reported() {
        let model = InteractionModel {
            style: "hertz".into(),
            coeffs: vec![PairCoeff {
                i: "1".into(),
                j: "1".into(),
                params: vec![1.0, 1.0],
            }],
        };
        let err = PairTable::resolve(&model, 2).unwrap_err();
        assert_eq!(err.to_string(), "no pair coefficients for types 1 2");
    }

    #[test]
    fn unknown_style_and_types_are_rejected() {
        let mut model = InteractionModel::default();
        model.style = "eam/alloy".into();
        assert!(PairTable::resolve(&model, 1).is_err());

        let mut model = InteractionModel::default();
        model.coeffs[0].j = "4".into();
        assert!(PairTable::resolve(&model, 2).is_err());
    }
}

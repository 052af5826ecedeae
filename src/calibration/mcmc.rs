use super::seed::feasible_seed;
use super::{Bounds, CalibrationAlgorithm, CalibrationResult, CalibrationTrait, fine_tune};
use crate::cost::CostFunction;

use emcee::{EnsembleSampler, Guess, Prob};
use ndarray::Array2;
use rand::prelude::*;
use rand_distr::StandardNormal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Relative scatter of the initial walker positions around the seed
const WALKER_SCATTER: f64 = 0.01;
const WALKER_ATTEMPTS: usize = 100;
const WALKER_RNG_SEED: u64 = 0;

/// MCMC sampler for the cost function
///
/// The likelihood is `exp(-cost / 2)`, so for weighted residuals it is the Gaussian likelihood,
/// and the prior is uniform within the bounds. The sampler is the Affine-Invariant Ensemble
/// Sampler by Goodman & Weare (2010), the best sample is returned together with the samples of
/// the second half of the chain as the parameter distribution. Walkers start in a small ball
/// around the initial guess.
///
/// Optionally, if `fine_tuning_algorithm` is `Some`, it sends the best guess from MCMC to the
/// next optimization as an initial guess and returns its result, the distribution is kept.
///
/// This sampler doesn't report a diagnostic of its own, `cost` of the result is the cost of the
/// best sample.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename = "Mcmc")]
pub struct McmcFit {
    pub niterations: u32,
    pub nwalkers: u32,
    pub fine_tuning_algorithm: Option<Box<CalibrationAlgorithm>>,
}

impl McmcFit {
    /// `nwalkers` is increased to at least twice the number of parameters and rounded up to an
    /// even number when sampling
    pub fn new(
        niterations: u32,
        nwalkers: u32,
        fine_tuning_algorithm: Option<CalibrationAlgorithm>,
    ) -> Self {
        assert!(niterations > 0, "niterations must be positive");
        Self {
            niterations,
            nwalkers,
            fine_tuning_algorithm: fine_tuning_algorithm.map(|x| x.into()),
        }
    }

    #[inline]
    pub fn default_niterations() -> u32 {
        5000
    }

    #[inline]
    pub fn default_nwalkers() -> u32 {
        10
    }

    #[inline]
    pub fn default_fine_tuning_algorithm() -> Option<CalibrationAlgorithm> {
        None
    }

    fn walkers(&self, ndim: usize) -> usize {
        let n = usize::max(self.nwalkers as usize, 2 * ndim);
        n + n % 2
    }
}

impl Default for McmcFit {
    fn default() -> Self {
        Self::new(
            Self::default_niterations(),
            Self::default_nwalkers(),
            Self::default_fine_tuning_algorithm(),
        )
    }
}

struct McmcProblem<'a> {
    cost: &'a CostFunction,
}

impl McmcProblem<'_> {
    fn params(guess: &Guess) -> Vec<f64> {
        guess.values.iter().map(|&x| x as f64).collect()
    }
}

impl Prob for McmcProblem<'_> {
    fn lnlike(&self, params: &Guess) -> f32 {
        match self.cost.cost(&Self::params(params)).feasible() {
            Some(value) => (-0.5 * value) as f32,
            None => f32::NEG_INFINITY,
        }
    }

    fn lnprior(&self, params: &Guess) -> f32 {
        if self.cost.bounds().contains(&Self::params(params)) {
            0.0
        } else {
            f32::NEG_INFINITY
        }
    }
}

/// Walkers scattered around `x`, every walker is feasible or equals `x`
fn initial_walkers(
    cost: &CostFunction,
    bounds: &Bounds,
    x: &[f64],
    nwalkers: usize,
) -> Vec<Guess> {
    let mut rng = StdRng::seed_from_u64(WALKER_RNG_SEED);
    let problem = McmcProblem { cost };
    (0..nwalkers)
        .map(|_| {
            (0..WALKER_ATTEMPTS)
                .map(|_| {
                    let scattered: Vec<_> = x
                        .iter()
                        .map(|&x| {
                            let eps: f64 = rng.sample(StandardNormal);
                            x * (1.0 + WALKER_SCATTER * eps)
                        })
                        .collect();
                    let clipped = bounds.clip_to_interior(&scattered);
                    Guess::new(&clipped.iter().map(|&x| x as f32).collect::<Vec<_>>())
                })
                .find(|guess| (problem.lnprior(guess) + problem.lnlike(guess)).is_finite())
                .unwrap_or_else(|| Guess::new(&x.iter().map(|&x| x as f32).collect::<Vec<_>>()))
        })
        .collect()
}

impl CalibrationTrait for McmcFit {
    fn calibrate(&self, cost: &CostFunction, x0: &[f64]) -> CalibrationResult {
        let (seed, seed_cost) = match feasible_seed(cost, x0, 16) {
            Ok(seed) => seed,
            Err(clipped) => return CalibrationResult::failure(clipped),
        };
        let ndim = seed.len();
        let nwalkers = self.walkers(ndim);
        let problem = McmcProblem { cost };
        let guesses = initial_walkers(cost, cost.bounds(), &seed, nwalkers);

        let mut sampler = match EnsembleSampler::new(nwalkers, ndim, &problem) {
            Ok(sampler) => sampler,
            Err(error) => {
                log::error!("cannot create MCMC sampler: {error:?}");
                return CalibrationResult::new(cost, seed, false);
            }
        };

        let burn_in = self.niterations as usize / 2;
        let mut best_x = seed.clone();
        let mut best_lnprob = (-0.5 * seed_cost) as f32;
        let mut chain = Vec::new();
        let mut iteration = 0;
        let sampling = sampler.sample(&guesses, self.niterations as usize, |step| {
            for (position, &lnprob) in step.pos.iter().zip(step.lnprob.iter()) {
                if lnprob > best_lnprob {
                    best_x = McmcProblem::params(position);
                    best_lnprob = lnprob;
                }
                if iteration >= burn_in {
                    chain.extend(position.values.iter().map(|&x| x as f64));
                }
            }
            iteration += 1;
        });
        if let Err(error) = sampling {
            log::warn!("MCMC sampling stopped with error: {error:?}");
        }

        let distribution = Array2::from_shape_vec((chain.len() / ndim, ndim), chain).ok();
        let mcmc_result = CalibrationResult {
            distribution,
            ..CalibrationResult::new(cost, best_x, true)
        };
        let mcmc_result = if mcmc_result.cost.is_some() {
            mcmc_result
        } else {
            CalibrationResult {
                distribution: mcmc_result.distribution,
                ..CalibrationResult::new(cost, seed, false)
            }
        };

        fine_tune(self.fine_tuning_algorithm.as_deref(), cost, mcmc_result)
    }
}

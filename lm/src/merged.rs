//! Composition of several language models into one.
//!
//! Three merge policies:
//!
//! - *overlay*: later components replace earlier ones word by word; the
//!   order of the components matters, the last probability wins.
//! - *linear interpolation*: weighted sum of component probabilities.
//! - *log-linear interpolation*: weighted product, sharpening the
//!   distribution where components agree.
//!
//! Overlay and log-linear merging have no cheap normalization factor, so
//! the final limited result list is normalized explicitly when requested.

use std::collections::BTreeMap;

use crate::dictionary::Dictionary;
use crate::model::{LanguageModel, PredictOptions, PredictResult};

/// How component results are reduced into one distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    Overlay,
    LinearInterpolation,
    LogLinearInterpolation,
}

/// A language model merging the predictions of its component models.
///
/// Components are borrowed, not owned; the merged model is a view over
/// models whose lifetime the caller manages.
pub struct MergedModel<'a> {
    components: Vec<&'a dyn LanguageModel>,
    policy: MergePolicy,
    weights: Vec<f64>,
}

impl<'a> MergedModel<'a> {
    pub fn new(policy: MergePolicy, components: Vec<&'a dyn LanguageModel>) -> Self {
        Self {
            components,
            policy,
            weights: Vec::new(),
        }
    }

    pub fn with_weights(
        policy: MergePolicy,
        components: Vec<&'a dyn LanguageModel>,
        weights: Vec<f64>,
    ) -> Self {
        Self {
            components,
            policy,
            weights,
        }
    }

    pub fn set_weights(&mut self, weights: Vec<f64>) {
        self.weights = weights;
    }

    /// Pad missing weights with the default of 1.0.
    fn padded_weights(&self) -> Vec<f64> {
        let mut weights = self.weights.clone();
        weights.resize(self.components.len(), 1.0);
        weights
    }

    /// May components be asked for a limited result list without changing
    /// the outcome?
    fn can_limit_components(&self) -> bool {
        matches!(self.policy, MergePolicy::Overlay)
    }

    fn needs_normalization(&self) -> bool {
        matches!(
            self.policy,
            MergePolicy::Overlay | MergePolicy::LogLinearInterpolation
        )
    }

    fn merge(
        &self,
        dst: &mut BTreeMap<String, f64>,
        values: Vec<PredictResult>,
        model_index: usize,
        weights: &[f64],
        weight_sum: f64,
    ) {
        match self.policy {
            MergePolicy::Overlay => {
                // last component wins
                for r in values {
                    dst.insert(r.word, r.p);
                }
            }
            MergePolicy::LinearInterpolation => {
                let weight = weights[model_index] / weight_sum;
                for r in values {
                    *dst.entry(r.word).or_insert(0.0) += weight * r.p;
                }
            }
            MergePolicy::LogLinearInterpolation => {
                let weight = weights[model_index];
                for r in values {
                    let e = dst.entry(r.word).or_insert(1.0);
                    *e *= r.p.powf(weight);
                }
            }
        }
    }

    /// Interpolated probability of a single n-gram; only meaningful for
    /// linear interpolation where the result stays normalized.
    pub fn interpolated_probability(&self, ngram: &[&str]) -> f64 {
        let weights = self.padded_weights();
        let weight_sum: f64 = weights.iter().sum();

        self.components
            .iter()
            .enumerate()
            .map(|(i, c)| weights[i] / weight_sum * c.get_probability(ngram))
            .sum()
    }
}

impl LanguageModel for MergedModel<'_> {
    fn dictionary(&self) -> &Dictionary {
        self.components
            .first()
            .expect("merged model has at least one component")
            .dictionary()
    }

    fn is_model_valid(&self) -> bool {
        self.components.iter().all(|c| c.is_model_valid())
    }

    fn predict(
        &self,
        context: &[&str],
        limit: Option<usize>,
        options: PredictOptions,
    ) -> Vec<PredictResult> {
        let weights = self.padded_weights();
        let weight_sum: f64 = weights.iter().sum::<f64>().max(f64::MIN_POSITIVE);

        let can_limit = self.can_limit_components();

        // Components normalize themselves; without a limit their sorting
        // is wasted work and skipped.
        let mut component_options = options | PredictOptions::NORMALIZE;
        if !can_limit {
            component_options |= PredictOptions::NO_SORT;
        }

        let mut map: BTreeMap<String, f64> = BTreeMap::new();
        for (i, component) in self.components.iter().enumerate() {
            let rs = component.predict(
                context,
                if can_limit { limit } else { None },
                component_options,
            );
            self.merge(&mut map, rs, i, &weights, weight_sum);
        }

        let mut results: Vec<PredictResult> = map
            .into_iter()
            .map(|(word, p)| PredictResult { word, p })
            .collect();

        if !options.contains(PredictOptions::NO_SORT) {
            // Stable sort keeps words of equal probability in a fixed
            // order while the context changes little by little.
            results.sort_by(|a, b| b.p.partial_cmp(&a.p).unwrap_or(std::cmp::Ordering::Equal));
        }

        let result_size = match limit {
            Some(limit) if limit < results.len() => limit,
            _ => results.len(),
        };

        // Normalization factors for overlay and log-linear interpolation
        // are hard to come by; normalize the limited results instead.
        if options.contains(PredictOptions::NORMALIZE) && self.needs_normalization() {
            let psum: f64 = results.iter().map(|r| r.p).sum();
            if psum > 0.0 {
                for r in results.iter_mut().take(result_size) {
                    r.p /= psum;
                }
            }
        }

        results.truncate(result_size);
        results
    }
}

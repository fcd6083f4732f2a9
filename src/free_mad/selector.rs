//! The deterministic multi-level tie-break chain: score → validator
//! confidence → lexicographic → seeded random.

use crate::free_mad::types::TieBreak;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

pub struct AnswerSelector {
    tie_break: TieBreak,
    seed: u64,
}

impl AnswerSelector {
    pub fn new(tie_break: TieBreak, seed: u64) -> Self {
        AnswerSelector { tie_break, seed }
    }

    /// Strict four-step cascade. `scores` is expected to already be
    /// normalized; `confidence` defaults to `0.0` for any answer absent
    /// from the map.
    pub fn select(
        &self,
        scores: &HashMap<String, f64>,
        confidence: &HashMap<String, f64>,
        answers: &HashMap<String, String>,
    ) -> String {
        if scores.is_empty() {
            return answers.keys().next().cloned().unwrap_or_default();
        }

        let max_score = scores
            .values()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        let mut top: Vec<&String> = scores
            .iter()
            .filter(|(_, &sc)| sc == max_score)
            .map(|(ans, _)| ans)
            .collect();
        if top.len() == 1 {
            return top[0].clone();
        }

        let max_conf = top
            .iter()
            .map(|ans| confidence.get(*ans).copied().unwrap_or(0.0))
            .fold(f64::NEG_INFINITY, f64::max);
        top.retain(|ans| confidence.get(*ans).copied().unwrap_or(0.0) == max_conf);
        if top.len() == 1 {
            return top[0].clone();
        }

        top.sort();
        match self.tie_break {
            TieBreak::Deterministic => top[0].clone(),
            TieBreak::Random => {
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
                top.choose(&mut rng).cloned().cloned().unwrap_or_default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn empty_scores_falls_back_to_first_answer() {
        let sel = AnswerSelector::new(TieBreak::Deterministic, 1);
        let answers: HashMap<String, String> =
            [("id1".to_string(), "text".to_string())].into_iter().collect();
        assert_eq!(sel.select(&HashMap::new(), &HashMap::new(), &answers), "id1");
    }

    #[test]
    fn empty_scores_and_answers_returns_empty_string() {
        let sel = AnswerSelector::new(TieBreak::Deterministic, 1);
        assert_eq!(sel.select(&HashMap::new(), &HashMap::new(), &HashMap::new()), "");
    }

    #[test]
    fn single_max_score_wins_outright() {
        let sel = AnswerSelector::new(TieBreak::Deterministic, 1);
        let scores = scores(&[("a", 1.0), ("b", 2.0)]);
        assert_eq!(sel.select(&scores, &HashMap::new(), &HashMap::new()), "b");
    }

    #[test]
    fn deterministic_tiebreak_picks_lexicographic_min() {
        let sel = AnswerSelector::new(TieBreak::Deterministic, 1);
        let scores = scores(&[("BBB", 5.0), ("AAA", 5.0)]);
        assert_eq!(sel.select(&scores, &HashMap::new(), &HashMap::new()), "AAA");
    }

    #[test]
    fn confidence_breaks_score_ties_before_lexicographic() {
        let sel = AnswerSelector::new(TieBreak::Deterministic, 1);
        let scores = scores(&[("AAA", 5.0), ("BBB", 5.0)]);
        let conf = scores(&[("AAA", 0.2), ("BBB", 0.9)]);
        assert_eq!(sel.select(&scores, &conf, &HashMap::new()), "BBB");
    }

    #[test]
    fn random_tiebreak_is_reproducible_for_a_given_seed() {
        let scores = scores(&[("AAA", 5.0), ("BBB", 5.0), ("CCC", 5.0)]);
        let sel1 = AnswerSelector::new(TieBreak::Random, 999);
        let sel2 = AnswerSelector::new(TieBreak::Random, 999);
        assert_eq!(
            sel1.select(&scores, &HashMap::new(), &HashMap::new()),
            sel2.select(&scores, &HashMap::new(), &HashMap::new())
        );
    }
}

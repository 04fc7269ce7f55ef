use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Kind of coaching message shown when the move changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageCategory {
    Start,
    Encourage,
    Transition,
    Finish,
}

/// Source of the mid-routine choice between encouragement and transition cues.
pub trait MessageSelector {
    fn mid_routine(&mut self) -> MessageCategory;
}

impl<F> MessageSelector for F
where
    F: FnMut() -> MessageCategory,
{
    fn mid_routine(&mut self) -> MessageCategory {
        self()
    }
}

/// Picks "encourage" with a fixed probability, "transition" otherwise.
#[derive(Debug, Clone)]
pub struct RandomSelector<R> {
    rng: R,
    encourage_probability: f64,
}

impl<R: Rng> RandomSelector<R> {
    pub fn new(rng: R, encourage_probability: f64) -> Self {
        Self {
            rng,
            encourage_probability: encourage_probability.clamp(0.0, 1.0),
        }
    }
}

impl RandomSelector<StdRng> {
    /// Deterministic selector for reproducible sessions.
    pub fn seeded(seed: u64, encourage_probability: f64) -> Self {
        Self::new(StdRng::seed_from_u64(seed), encourage_probability)
    }

    pub fn from_entropy(encourage_probability: f64) -> Self {
        Self::new(StdRng::from_entropy(), encourage_probability)
    }
}

impl<R: Rng> MessageSelector for RandomSelector<R> {
    fn mid_routine(&mut self) -> MessageCategory {
        if self.rng.gen_bool(self.encourage_probability) {
            MessageCategory::Encourage
        } else {
            MessageCategory::Transition
        }
    }
}

/// Category for the move at `index` of a routine with `len` moves: the first
/// move starts, the trailing `finish_fraction` finishes, the rest ask `selector`.
pub fn categorize(
    index: usize,
    len: usize,
    finish_fraction: f64,
    selector: &mut dyn MessageSelector,
) -> MessageCategory {
    if index == 0 {
        MessageCategory::Start
    } else if index as f64 >= len as f64 * (1.0 - finish_fraction) {
        MessageCategory::Finish
    } else {
        selector.mid_routine()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_and_final_moves_have_fixed_categories() {
        let mut never = || -> MessageCategory { panic!("selector must not be consulted") };

        assert_eq!(categorize(0, 20, 0.15, &mut never), MessageCategory::Start);
        assert_eq!(categorize(17, 20, 0.15, &mut never), MessageCategory::Finish);
        assert_eq!(categorize(19, 20, 0.15, &mut never), MessageCategory::Finish);
    }

    #[test]
    fn middle_moves_use_the_selector() {
        let mut scripted = || MessageCategory::Transition;
        assert_eq!(categorize(5, 20, 0.15, &mut scripted), MessageCategory::Transition);
    }

    #[test]
    fn seeded_selection_is_reproducible() {
        let mut a = RandomSelector::seeded(7, 0.5);
        let mut b = RandomSelector::seeded(7, 0.5);
        let left: Vec<_> = (0..32).map(|_| a.mid_routine()).collect();
        let right: Vec<_> = (0..32).map(|_| b.mid_routine()).collect();
        assert_eq!(left, right);
    }

    #[test]
    fn extreme_probabilities_are_deterministic() {
        let mut always = RandomSelector::seeded(1, 1.0);
        let mut never = RandomSelector::seeded(1, 0.0);
        assert_eq!(always.mid_routine(), MessageCategory::Encourage);
        assert_eq!(never.mid_routine(), MessageCategory::Transition);
    }
}

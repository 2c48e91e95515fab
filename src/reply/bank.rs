//! Canned phrases: image lead-ins and error fallbacks.

use rand::RngCore;
use rand::seq::SliceRandom;

use crate::config::BotConfig;

/// Static response phrases, immutable after load.
#[derive(Debug, Clone, Default)]
pub struct ResponseBank {
    pub selfie: Vec<String>,
    pub photo: Vec<String>,
    pub error: Vec<String>,
}

impl ResponseBank {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            selfie: config.selfie_responses.clone(),
            photo: config.photo_responses.clone(),
            error: config.error_responses.clone(),
        }
    }

    pub fn random_selfie<'a>(&'a self, rng: &mut dyn RngCore) -> Option<&'a str> {
        self.selfie.choose(rng).map(String::as_str)
    }

    pub fn random_photo<'a>(&'a self, rng: &mut dyn RngCore) -> Option<&'a str> {
        self.photo.choose(rng).map(String::as_str)
    }

    pub fn random_error<'a>(&'a self, rng: &mut dyn RngCore) -> Option<&'a str> {
        self.error.choose(rng).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand::rngs::mock::StepRng;

    use super::*;

    fn bank() -> ResponseBank {
        ResponseBank {
            selfie: vec!["Here's me".into(), "Cheese!".into()],
            photo: vec!["Here you go".into()],
            error: vec!["Oops".into(), "Brain freeze".into(), "Hmm?".into()],
        }
    }

    #[test]
    fn zero_rng_picks_first() {
        let mut rng = StepRng::new(0, 0);
        assert_eq!(bank().random_selfie(&mut rng), Some("Here's me"));
        assert_eq!(bank().random_error(&mut rng), Some("Oops"));
    }

    #[test]
    fn picks_are_members_of_the_bank() {
        let bank = bank();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let pick = bank.random_error(&mut rng).unwrap();
            assert!(bank.error.iter().any(|e| e == pick));
        }
    }

    #[test]
    fn same_seed_same_picks() {
        let bank = bank();
        let mut a = StdRng::seed_from_u64(99);
        let mut b = StdRng::seed_from_u64(99);
        for _ in 0..10 {
            assert_eq!(bank.random_error(&mut a), bank.random_error(&mut b));
        }
    }

    #[test]
    fn empty_bank_yields_none() {
        let mut rng = StepRng::new(0, 0);
        assert_eq!(ResponseBank::default().random_photo(&mut rng), None);
    }
}

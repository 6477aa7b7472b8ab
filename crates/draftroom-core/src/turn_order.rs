// Turn order generation: base ordering (random or manual) expanded into the
// flat sequence of team-turns for the whole draft.

use std::collections::HashSet;
use std::fmt;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::DraftError;

/// How the base order is repeated across rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftMode {
    /// Every round uses the same order.
    Linear,
    /// Every other round reverses the order.
    #[default]
    Snake,
}

impl fmt::Display for DraftMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DraftMode::Linear => write!(f, "linear"),
            DraftMode::Snake => write!(f, "snake"),
        }
    }
}

/// ChaCha-based generator seeded from the operating system's entropy source.
pub fn secure_rng() -> StdRng {
    StdRng::from_os_rng()
}

/// Draw a uniform random permutation of the team ids.
pub fn random_base_order<R: Rng + ?Sized>(team_ids: &[String], rng: &mut R) -> Vec<String> {
    let mut order = team_ids.to_vec();
    order.shuffle(rng);
    order
}

/// Check that `order` is a permutation of exactly `team_ids`.
pub fn validate_manual_order(team_ids: &[String], order: &[String]) -> Result<(), DraftError> {
    let expected: HashSet<&str> = team_ids.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();

    for id in order {
        if !expected.contains(id.as_str()) {
            return Err(DraftError::InvalidTurnOrder(format!(
                "team `{id}` is not in this session"
            )));
        }
        if !seen.insert(id.as_str()) {
            return Err(DraftError::InvalidTurnOrder(format!(
                "team `{id}` appears more than once"
            )));
        }
    }

    if let Some(missing) = team_ids.iter().find(|id| !seen.contains(id.as_str())) {
        return Err(DraftError::InvalidTurnOrder(format!(
            "team `{missing}` is missing from the order"
        )));
    }

    Ok(())
}

/// Repeat a base order for `rounds` rounds.
///
/// Snake mode reverses odd-indexed (0-based) rounds.
pub fn expand_rounds(base: &[String], rounds: usize, mode: DraftMode) -> Vec<String> {
    let mut sequence = Vec::with_capacity(base.len() * rounds);
    for round in 0..rounds {
        if mode == DraftMode::Snake && round % 2 == 1 {
            sequence.extend(base.iter().rev().cloned());
        } else {
            sequence.extend(base.iter().cloned());
        }
    }
    sequence
}

/// Produce the full turn sequence for a draft.
///
/// A manual order bypasses randomization entirely but must name every team
/// exactly once. Without one, the base order is shuffled with `rng`.
pub fn generate<R: Rng + ?Sized>(
    team_ids: &[String],
    rounds: usize,
    mode: DraftMode,
    manual_order: Option<&[String]>,
    rng: &mut R,
) -> Result<Vec<String>, DraftError> {
    if team_ids.is_empty() {
        return Err(DraftError::InvalidTurnOrder("no teams".into()));
    }
    if rounds == 0 {
        return Err(DraftError::InvalidTurnOrder("rounds must be > 0".into()));
    }

    let base = match manual_order {
        Some(order) => {
            validate_manual_order(team_ids, order)?;
            order.to_vec()
        }
        None => random_base_order(team_ids, rng),
    };

    Ok(expand_rounds(&base, rounds, mode))
}

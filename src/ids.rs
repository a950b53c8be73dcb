use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Deserialize;

/// Produces candidate identifiers. Zero is never a valid id; the allocator
/// discards zero and any candidate that is still in use.
pub trait IdSource: Send {
    fn next_candidate(&mut self) -> u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IdAllocation {
    #[default]
    Random,
    Sequential,
}

impl IdAllocation {
    /// Builds a source that draws from `1..=ceiling`.
    pub fn source(self, ceiling: u64) -> Box<dyn IdSource> {
        match self {
            Self::Random => Box::new(RandomIds::new(ceiling)),
            Self::Sequential => Box::new(SequentialIds::new(ceiling)),
        }
    }
}

pub struct RandomIds {
    rng: StdRng,
    ceiling: u64,
}

impl RandomIds {
    pub fn new(ceiling: u64) -> Self {
        Self::with_rng(StdRng::from_entropy(), ceiling)
    }

    pub fn with_rng(rng: StdRng, ceiling: u64) -> Self {
        Self {
            rng,
            ceiling: ceiling.max(1),
        }
    }
}

impl IdSource for RandomIds {
    fn next_candidate(&mut self) -> u64 {
        self.rng.gen_range(1..=self.ceiling)
    }
}

pub struct SequentialIds {
    next: u64,
    ceiling: u64,
}

impl SequentialIds {
    pub fn new(ceiling: u64) -> Self {
        Self {
            next: 1,
            ceiling: ceiling.max(1),
        }
    }
}

impl IdSource for SequentialIds {
    fn next_candidate(&mut self) -> u64 {
        let id = self.next;
        self.next = if id >= self.ceiling { 1 } else { id + 1 };
        id
    }
}

/// Draws candidates until one is nonzero and not reported live by `in_use`.
///
/// There is no retry limit. The caller must guarantee the namespace is not
/// exhausted, which holds for any realistic number of live overlays.
pub fn allocate<F>(source: &mut dyn IdSource, in_use: F) -> u64
where
    F: Fn(u64) -> bool,
{
    loop {
        let candidate = source.next_candidate();
        if candidate == 0 {
            continue;
        }
        if in_use(candidate) {
            log::trace!("id {candidate} already live, retrying");
            continue;
        }
        return candidate;
    }
}

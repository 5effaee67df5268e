use rand::seq::SliceRandom;
use rand::Rng;

use crate::quiz::nonverbal::NonverbalKind;
use crate::quiz::verbal::VerbalKind;
use crate::quiz::{Category, Question};

#[derive(Debug, Clone, Default)]
pub struct Pool {
    verbal: Vec<Question>,
    nonverbal: Vec<Question>,
}

/// Generates `verbal_count` verbal questions followed by `nonverbal_count` nonverbal ones,
/// numbered sequentially from 1.
pub fn generate_pool<R: Rng + ?Sized>(verbal_count: usize, nonverbal_count: usize, rng: &mut R) -> Pool {
    let mut next_id = 1u32;
    let mut take_id = || {
        let id = next_id;
        next_id += 1;
        id
    };

    let mut verbal = Vec::with_capacity(verbal_count);
    for _ in 0..verbal_count {
        let draft = VerbalKind::random(rng).draft(rng);
        verbal.push(Question::assemble(take_id(), Category::Verbal, draft, rng));
    }

    let mut nonverbal = Vec::with_capacity(nonverbal_count);
    for _ in 0..nonverbal_count {
        let draft = NonverbalKind::random(rng).draft(rng);
        let question = Question::assemble(take_id(), Category::Nonverbal, draft, rng);
        if !question.has_distinct_options() {
            log::warn!("Question {} kept colliding options {:?}", question.id, question.options);
        }
        nonverbal.push(question);
    }

    Pool { verbal, nonverbal }
}

impl Pool {
    pub fn category(&self, category: Category) -> &[Question] {
        match category {
            Category::Verbal => &self.verbal,
            Category::Nonverbal => &self.nonverbal,
        }
    }

    pub fn len(&self) -> usize {
        self.verbal.len() + self.nonverbal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verbal.is_empty() && self.nonverbal.is_empty()
    }

    /// Samples up to `verbal_pick` and `nonverbal_pick` questions without replacement
    /// and returns them interleaved in random order.
    pub fn draw_attempt<R: Rng + ?Sized>(&self, verbal_pick: usize, nonverbal_pick: usize, rng: &mut R) -> Vec<Question> {
        let mut picked = self
            .verbal
            .choose_multiple(rng, verbal_pick)
            .cloned()
            .collect::<Vec<_>>();
        picked.extend(self.nonverbal.choose_multiple(rng, nonverbal_pick).cloned());
        picked.shuffle(rng);
        picked
    }
}

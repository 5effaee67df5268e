pub mod attempt;
pub mod nonverbal;
pub mod pool;
pub mod scoring;
pub mod verbal;

use rand::seq::SliceRandom;
use rand::Rng;

pub const OPTION_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Verbal,
    Nonverbal,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Verbal, Category::Nonverbal];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Verbal => "verbal",
            Category::Nonverbal => "nonverbal",
        }
    }

    /// Label shown to respondents.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Verbal => "言語",
            Category::Nonverbal => "非言語",
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Question {
    pub id: u32,
    pub category: Category,
    pub prompt: String,
    pub options: [String; OPTION_COUNT],
    /// 1-based position of the correct option.
    pub answer: usize,
}

impl Question {
    /// Shuffles the correct answer in with its distractors and records where it landed.
    pub fn assemble<R: Rng + ?Sized>(id: u32, category: Category, draft: Draft, rng: &mut R) -> Self {
        let Draft {
            prompt,
            correct,
            distractors: [d1, d2, d3],
        } = draft;

        // Track the correct option by slot, not by value, so a colliding
        // distractor can never steal the answer index.
        let mut slots = [(correct, true), (d1, false), (d2, false), (d3, false)];
        slots.shuffle(rng);

        let answer = slots
            .iter()
            .position(|(_, is_correct)| *is_correct)
            .map_or(1, |i| i + 1);
        let options = slots.map(|(text, _)| text);

        Self {
            id,
            category,
            prompt,
            options,
            answer,
        }
    }

    pub fn has_distinct_options(&self) -> bool {
        all_distinct(self.options.iter().map(String::as_str))
    }
}

/// A question before it gets an id and a shuffled option order.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub prompt: String,
    pub correct: String,
    pub distractors: [String; 3],
}

impl Draft {
    pub fn has_distinct_options(&self) -> bool {
        all_distinct(
            std::iter::once(self.correct.as_str()).chain(self.distractors.iter().map(String::as_str)),
        )
    }
}

fn all_distinct<'a>(items: impl Iterator<Item = &'a str>) -> bool {
    let items = items.collect::<Vec<_>>();
    items
        .iter()
        .enumerate()
        .all(|(i, a)| items[i + 1..].iter().all(|b| a != b))
}

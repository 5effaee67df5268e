use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::error::AttemptError;
use crate::quiz::scoring::{self, Reference, ResultRecord};
use crate::quiz::{Category, Question, OPTION_COUNT};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Phase {
    #[default]
    NotStarted,
    InProgress,
    Submitted,
    TimedOut,
    Scored,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Respondent {
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Item {
    pub question: Question,
    /// 1-based option picked by the respondent.
    pub selected: Option<usize>,
}

impl Item {
    pub fn is_correct(&self) -> bool {
        self.selected == Some(self.question.answer)
    }
}

/// What the front end needs to draw the current item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemView<'a> {
    pub position: usize,
    pub total: usize,
    pub answered: usize,
    pub remaining: Duration,
    pub category: Category,
    pub prompt: &'a str,
    pub options: &'a [String; OPTION_COUNT],
    pub selected: Option<usize>,
}

/// One respondent's timed run through a sampled set of questions.
///
/// The deadline is checked lazily: every interaction compares `now` against
/// the start instant and moves the attempt to [`Phase::TimedOut`] once the
/// limit has been reached.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Attempt {
    phase: Phase,
    respondent: Option<Respondent>,
    items: Vec<Item>,
    current: usize,
    started_at: Option<DateTime<Utc>>,
    time_limit_secs: i64,
}

impl Attempt {
    pub fn new(time_limit: Duration) -> Self {
        Self {
            phase: Phase::NotStarted,
            respondent: None,
            items: Vec::new(),
            current: 0,
            started_at: None,
            time_limit_secs: time_limit.num_seconds(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn respondent(&self) -> Option<&Respondent> {
        self.respondent.as_ref()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn answered(&self) -> usize {
        self.items.iter().filter(|item| item.selected.is_some()).count()
    }

    pub fn time_limit(&self) -> Duration {
        Duration::seconds(self.time_limit_secs)
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        match self.started_at {
            Some(started_at) => (self.time_limit() - (now - started_at)).max(Duration::zero()),
            None => self.time_limit(),
        }
    }

    pub fn start(
        &mut self,
        name: &str,
        email: Option<&str>,
        questions: Vec<Question>,
        now: DateTime<Utc>,
    ) -> Result<(), AttemptError> {
        if self.phase != Phase::NotStarted {
            return Err(AttemptError::WrongPhase(self.phase));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(AttemptError::EmptyName);
        }
        if questions.is_empty() {
            return Err(AttemptError::NoQuestions);
        }

        self.respondent = Some(Respondent {
            name: name.to_string(),
            email: email.map(str::trim).filter(|e| !e.is_empty()).map(str::to_string),
        });
        self.items = questions
            .into_iter()
            .map(|question| Item {
                question,
                selected: None,
            })
            .collect();
        self.current = 0;
        self.started_at = Some(now);
        self.phase = Phase::InProgress;
        Ok(())
    }

    /// Moves to [`Phase::TimedOut`] if the limit has passed.
    pub fn check_deadline(&mut self, now: DateTime<Utc>) -> Result<(), AttemptError> {
        if self.phase != Phase::InProgress {
            return Err(AttemptError::WrongPhase(self.phase));
        }
        if self.remaining(now) <= Duration::zero() {
            self.phase = Phase::TimedOut;
            return Err(AttemptError::Expired);
        }
        Ok(())
    }

    /// Records `option` (1-based) for the current item, replacing any earlier pick.
    pub fn select(&mut self, option: usize, now: DateTime<Utc>) -> Result<(), AttemptError> {
        self.check_deadline(now)?;
        if !(1..=OPTION_COUNT).contains(&option) {
            return Err(AttemptError::InvalidOption(option));
        }
        if let Some(item) = self.items.get_mut(self.current) {
            item.selected = Some(option);
        }
        Ok(())
    }

    pub fn next(&mut self, now: DateTime<Utc>) -> Result<(), AttemptError> {
        self.check_deadline(now)?;
        self.current = (self.current + 1).min(self.items.len().saturating_sub(1));
        Ok(())
    }

    pub fn previous(&mut self, now: DateTime<Utc>) -> Result<(), AttemptError> {
        self.check_deadline(now)?;
        self.current = self.current.saturating_sub(1);
        Ok(())
    }

    pub fn go_to(&mut self, index: usize, now: DateTime<Utc>) -> Result<(), AttemptError> {
        self.check_deadline(now)?;
        if index >= self.items.len() {
            return Err(AttemptError::InvalidItem(index));
        }
        self.current = index;
        Ok(())
    }

    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<(), AttemptError> {
        self.check_deadline(now)?;
        self.phase = Phase::Submitted;
        Ok(())
    }

    /// Scores a submitted or timed-out attempt. Only the first call succeeds.
    pub fn score(&mut self, reference: &Reference, timestamp: NaiveDateTime) -> Result<ResultRecord, AttemptError> {
        match self.phase {
            Phase::Submitted | Phase::TimedOut => {}
            other => return Err(AttemptError::WrongPhase(other)),
        }
        let record = scoring::score(self, reference, timestamp);
        self.phase = Phase::Scored;
        Ok(record)
    }

    pub fn view(&self, now: DateTime<Utc>) -> Option<ItemView<'_>> {
        let item = self.items.get(self.current)?;
        Some(ItemView {
            position: self.current + 1,
            total: self.items.len(),
            answered: self.answered(),
            remaining: self.remaining(now),
            category: item.question.category,
            prompt: &item.question.prompt,
            options: &item.question.options,
            selected: item.selected,
        })
    }
}

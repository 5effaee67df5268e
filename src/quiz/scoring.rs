use chrono::NaiveDateTime;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::quiz::attempt::{Attempt, Phase};
use crate::quiz::Category;

/// History below this size is not trusted for normalization.
pub const MIN_HISTORY: usize = 20;

pub const SYNTHETIC_MEAN: f64 = 60.0;
pub const SYNTHETIC_STD_DEV: f64 = 12.0;
pub const SYNTHETIC_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ReferenceSource {
    History,
    Synthetic,
}

/// The distribution an attempt's percentage is ranked against.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Reference {
    pub source: ReferenceSource,
    pub mean: f64,
    pub std_dev: f64,
    /// Historical records behind the reference, 0 for the synthetic fallback.
    pub points: usize,
}

impl Reference {
    /// Uses `history` when it has at least [`MIN_HISTORY`] points and some spread,
    /// otherwise a synthetic Normal(60, 12) sample.
    pub fn from_history<R: Rng + ?Sized>(history: &[f64], rng: &mut R) -> Self {
        if history.len() >= MIN_HISTORY {
            let (mean, std_dev) = mean_and_std_dev(history);
            if std_dev > 0.0 {
                return Self {
                    source: ReferenceSource::History,
                    mean,
                    std_dev,
                    points: history.len(),
                };
            }
            log::debug!("history of {} points has no spread, using synthetic reference", history.len());
        }
        Self::synthetic(rng)
    }

    pub fn synthetic<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let (mean, std_dev) = mean_and_std_dev(&synthetic_sample(rng));
        Self {
            source: ReferenceSource::Synthetic,
            mean,
            std_dev,
            points: 0,
        }
    }

    /// `50 + 10 * (pct - mean) / std_dev`, or 50 for a reference without spread.
    pub fn standard_score(&self, pct: f64) -> f64 {
        if self.std_dev > 0.0 {
            50.0 + 10.0 * (pct - self.mean) / self.std_dev
        } else {
            50.0
        }
    }
}

pub fn synthetic_sample<R: Rng + ?Sized>(rng: &mut R) -> Vec<f64> {
    (0..SYNTHETIC_SIZE)
        .map(|_| {
            let z: f64 = rng.sample(StandardNormal);
            SYNTHETIC_MEAN + SYNTHETIC_STD_DEV * z
        })
        .collect()
}

/// Mean and population standard deviation. `(0, 0)` for an empty slice.
pub fn mean_and_std_dev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CategoryScore {
    pub correct: usize,
    pub total: usize,
}

impl CategoryScore {
    pub fn pct(&self) -> f64 {
        percentage(self.correct, self.total)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResultRecord {
    pub timestamp: NaiveDateTime,
    pub name: String,
    pub email: String,
    pub verbal: CategoryScore,
    pub nonverbal: CategoryScore,
    pub total_correct: usize,
    pub total_questions: usize,
    pub total_pct: f64,
    pub standard_score: f64,
    pub reference_source: ReferenceSource,
    pub reference_points: usize,
    pub timed_out: bool,
    /// 1-based selections in attempt order, `;`-joined, empty for unanswered.
    pub verbal_answers: String,
    pub nonverbal_answers: String,
}

impl ResultRecord {
    pub fn category(&self, category: Category) -> CategoryScore {
        match category {
            Category::Verbal => self.verbal,
            Category::Nonverbal => self.nonverbal,
        }
    }
}

pub fn percentage(correct: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64 * 100.0
    }
}

/// Computes the result of `attempt` against `reference`. Reads only; scoring the
/// same attempt twice gives the same record.
pub fn score(attempt: &Attempt, reference: &Reference, timestamp: NaiveDateTime) -> ResultRecord {
    let tally = |category: Category| {
        let items = attempt
            .items()
            .iter()
            .filter(|item| item.question.category == category);
        CategoryScore {
            correct: items.clone().filter(|item| item.is_correct()).count(),
            total: items.count(),
        }
    };
    let answers = |category: Category| {
        attempt
            .items()
            .iter()
            .filter(|item| item.question.category == category)
            .map(|item| item.selected.map(|s| s.to_string()).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(";")
    };

    let verbal = tally(Category::Verbal);
    let nonverbal = tally(Category::Nonverbal);
    let total_correct = attempt.items().iter().filter(|item| item.is_correct()).count();
    let total_questions = attempt.items().len();
    let total_pct = percentage(total_correct, total_questions);

    let respondent = attempt.respondent();
    ResultRecord {
        timestamp,
        name: respondent.map(|r| r.name.clone()).unwrap_or_default(),
        email: respondent.and_then(|r| r.email.clone()).unwrap_or_default(),
        verbal,
        nonverbal,
        total_correct,
        total_questions,
        total_pct,
        standard_score: reference.standard_score(total_pct),
        reference_source: reference.source,
        reference_points: reference.points,
        timed_out: attempt.phase() == Phase::TimedOut,
        verbal_answers: answers(Category::Verbal),
        nonverbal_answers: answers(Category::Nonverbal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::pool::generate_pool;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn timestamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 4, 1)
            .and_then(|d| d.and_hms_opt(10, 30, 0))
            .unwrap()
    }

    fn submitted(select: impl Fn(usize, usize) -> Option<usize>) -> Attempt {
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let pool = generate_pool(20, 20, &mut rng);
        let questions = pool.draw_attempt(5, 5, &mut rng);
        let now = Utc.with_ymd_and_hms(2025, 4, 1, 10, 0, 0).unwrap();

        let mut attempt = Attempt::new(Duration::minutes(50));
        attempt.start("Hanako", Some("hanako@example.com"), questions, now).unwrap();
        for index in 0..attempt.items().len() {
            attempt.go_to(index, now).unwrap();
            let answer = attempt.items()[index].question.answer;
            if let Some(option) = select(index, answer) {
                attempt.select(option, now).unwrap();
            }
        }
        attempt.submit(now).unwrap();
        attempt
    }

    #[test]
    fn test_mean_and_std_dev() {
        let (mean, std_dev) = mean_and_std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(mean, 5.0);
        assert_eq!(std_dev, 2.0);
        assert_eq!(mean_and_std_dev(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_history_reference_formula() {
        let mut history = vec![50.0; 19];
        history.push(70.0);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let reference = Reference::from_history(&history, &mut rng);

        assert_eq!(reference.source, ReferenceSource::History);
        assert_eq!(reference.points, 20);
        assert!((reference.mean - 51.0).abs() < 1e-12);
        assert!((reference.std_dev - 19f64.sqrt()).abs() < 1e-12);
        assert!((reference.standard_score(60.0) - 70.64741604835055).abs() < 1e-9);
    }

    #[test]
    fn test_flat_history_falls_back_to_synthetic() {
        let history = vec![65.0; MIN_HISTORY];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let reference = Reference::from_history(&history, &mut rng);

        assert_eq!(reference.source, ReferenceSource::Synthetic);
        assert_eq!(reference.points, 0);
        assert!(reference.std_dev > 0.0);
        assert!(reference.standard_score(65.0).is_finite());
    }

    #[test]
    fn test_short_history_falls_back_to_synthetic() {
        let history = (0..MIN_HISTORY - 1).map(|i| i as f64 * 3.0).collect::<Vec<_>>();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let reference = Reference::from_history(&history, &mut rng);
        assert_eq!(reference.source, ReferenceSource::Synthetic);
    }

    #[test]
    fn test_synthetic_sample_shape() {
        let mut rng = ChaCha8Rng::seed_from_u64(12345);
        let sample = synthetic_sample(&mut rng);
        assert_eq!(sample.len(), SYNTHETIC_SIZE);

        let (mean, std_dev) = mean_and_std_dev(&sample);
        assert!((mean - SYNTHETIC_MEAN).abs() < 2.0, "mean {}", mean);
        assert!((std_dev - SYNTHETIC_STD_DEV).abs() < 2.0, "std dev {}", std_dev);
    }

    #[test]
    fn test_flat_reference_scores_fifty() {
        let reference = Reference {
            source: ReferenceSource::Synthetic,
            mean: 60.0,
            std_dev: 0.0,
            points: 0,
        };
        assert_eq!(reference.standard_score(90.0), 50.0);
    }

    #[test]
    fn test_score_counts_and_serializes_answers() {
        // every even item answered correctly, odd items left blank
        let attempt = submitted(|index, answer| (index % 2 == 0).then_some(answer));
        let reference = Reference {
            source: ReferenceSource::History,
            mean: 50.0,
            std_dev: 10.0,
            points: 25,
        };
        let record = score(&attempt, &reference, timestamp());

        assert_eq!(record.total_questions, 10);
        assert_eq!(record.total_correct, 5);
        assert_eq!(record.verbal.correct + record.nonverbal.correct, 5);
        assert_eq!(record.verbal.total, 5);
        assert_eq!(record.total_pct, 50.0);
        assert_eq!(record.standard_score, 50.0);
        assert_eq!(record.reference_points, 25);
        assert_eq!(record.email, "hanako@example.com");

        let answered = record
            .verbal_answers
            .split(';')
            .chain(record.nonverbal_answers.split(';'))
            .filter(|s| !s.is_empty())
            .count();
        assert_eq!(answered, 5);
        assert_eq!(record.verbal_answers.split(';').count(), 5);
    }

    #[test]
    fn test_wrong_answers_count_as_incorrect() {
        let attempt = submitted(|_, answer| Some(answer % 4 + 1));
        let reference = Reference::synthetic(&mut ChaCha8Rng::seed_from_u64(3));
        let record = score(&attempt, &reference, timestamp());

        assert_eq!(record.total_correct, 0);
        assert_eq!(record.total_pct, 0.0);
        assert!(record.standard_score < 50.0);
        assert!(!record.verbal_answers.contains(";;"));
    }

    #[test]
    fn test_scoring_is_idempotent() {
        let attempt = submitted(|index, answer| Some(if index % 3 == 0 { answer } else { 1 }));
        let reference = Reference::synthetic(&mut ChaCha8Rng::seed_from_u64(9));

        let first = score(&attempt, &reference, timestamp());
        let second = score(&attempt, &reference, timestamp());
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_attempt_scores_zero_percent() {
        let attempt = Attempt::new(Duration::minutes(50));
        let reference = Reference::synthetic(&mut ChaCha8Rng::seed_from_u64(1));
        let record = score(&attempt, &reference, timestamp());

        assert_eq!(record.total_questions, 0);
        assert_eq!(record.total_pct, 0.0);
        assert_eq!(record.verbal.pct(), 0.0);
        assert_eq!(record.verbal_answers, "");
    }
}

use teloxide::utils::html;

use crate::quiz::scoring::{ReferenceSource, ResultRecord};
use crate::quiz::Category;

const BINS: usize = 10;
const BAR_WIDTH: usize = 16;

/// Result summary sent once an attempt is scored.
pub fn render_result(record: &ResultRecord) -> String {
    let mut lines = vec!["<b>✅ 結果</b>".to_string()];
    if record.timed_out {
        lines.push("時間切れのため、回答済みの問題で採点しました。".to_string());
    }
    lines.push(format!("氏名: {}", html::escape(&record.name)));
    if !record.email.is_empty() {
        lines.push(format!("メール: {}", html::escape(&record.email)));
    }
    for category in Category::ALL {
        let score = record.category(category);
        lines.push(format!(
            "{}: {} / {} ({:.1}%)",
            category.label(),
            score.correct,
            score.total,
            score.pct()
        ));
    }
    lines.push(format!(
        "総合: {} / {} ({:.1}%)",
        record.total_correct, record.total_questions, record.total_pct
    ));
    lines.push(format!("偏差値（参考）: T = {:.1}", record.standard_score));
    match record.reference_source {
        ReferenceSource::History => {
            lines.push(format!("(シート内の過去{}件を基に算出)", record.reference_points))
        }
        ReferenceSource::Synthetic => {
            lines.push("(過去データ不足のため仮の分布を基に算出)".to_string())
        }
    }
    lines.join("\n")
}

/// Text histogram of `values` over 0–100 in ten bins, with `pct`'s bin marked.
pub fn render_histogram(values: &[f64], pct: f64) -> String {
    let counts = bin_counts(values);
    let peak = counts.iter().copied().max().unwrap_or(0).max(1);
    let marked = bin_of(pct);

    let mut lines = Vec::with_capacity(BINS + 1);
    lines.push(format!("正答率の分布 (n={})", values.len()));
    for (bin, count) in counts.iter().enumerate() {
        let bar = "█".repeat((count * BAR_WIDTH + peak - 1) / peak);
        let marker = if bin == marked {
            format!(" ◀ あなた: {:.1}%", pct)
        } else {
            String::new()
        };
        lines.push(format!(
            "{:>3}-{:<3} {:<pad$} {}{}",
            bin * 10,
            bin * 10 + 10,
            bar,
            count,
            marker,
            pad = BAR_WIDTH
        ));
    }
    format!("<pre>{}</pre>", lines.join("\n"))
}

fn bin_of(value: f64) -> usize {
    ((value.clamp(0.0, 100.0) / 10.0) as usize).min(BINS - 1)
}

fn bin_counts(values: &[f64]) -> [usize; BINS] {
    let mut counts = [0; BINS];
    for value in values.iter().filter(|v| v.is_finite()) {
        counts[bin_of(*value)] += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::scoring::CategoryScore;
    use chrono::NaiveDate;

    fn record() -> ResultRecord {
        ResultRecord {
            timestamp: NaiveDate::from_ymd_opt(2025, 4, 1)
                .and_then(|d| d.and_hms_opt(9, 0, 0))
                .unwrap(),
            name: "<Taro>".to_string(),
            email: String::new(),
            verbal: CategoryScore { correct: 30, total: 35 },
            nonverbal: CategoryScore { correct: 14, total: 35 },
            total_correct: 44,
            total_questions: 70,
            total_pct: 62.857142857142854,
            standard_score: 52.38,
            reference_source: ReferenceSource::History,
            reference_points: 24,
            timed_out: true,
            verbal_answers: String::new(),
            nonverbal_answers: String::new(),
        }
    }

    #[test]
    fn test_result_lines() {
        let text = render_result(&record());
        assert!(text.contains("時間切れ"));
        assert!(text.contains("氏名: &lt;Taro&gt;"));
        assert!(!text.contains("メール"));
        assert!(text.contains("言語: 30 / 35 (85.7%)"));
        assert!(text.contains("非言語: 14 / 35 (40.0%)"));
        assert!(text.contains("総合: 44 / 70 (62.9%)"));
        assert!(text.contains("T = 52.4"));
        assert!(text.contains("過去24件"));
    }

    #[test]
    fn test_bins_include_upper_edge() {
        assert_eq!(bin_of(0.0), 0);
        assert_eq!(bin_of(9.99), 0);
        assert_eq!(bin_of(10.0), 1);
        assert_eq!(bin_of(100.0), 9);
        assert_eq!(bin_of(-5.0), 0);
        assert_eq!(bin_counts(&[5.0, 15.0, 15.5, 100.0, f64::NAN]), [1, 2, 0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_histogram_marks_respondent() {
        let text = render_histogram(&[55.0, 58.0, 61.0, 72.0], 57.1);
        assert!(text.starts_with("<pre>"));
        assert!(text.contains("(n=4)"));

        let marked = text.lines().find(|l| l.contains("あなた")).unwrap();
        assert!(marked.trim_start().starts_with("50-60"));
        assert!(marked.contains("57.1%"));
        assert_eq!(text.matches("あなた").count(), 1);
    }

    #[test]
    fn test_histogram_of_nothing() {
        let text = render_histogram(&[], 0.0);
        assert!(text.contains("(n=0)"));
        assert!(!text.contains('█'));
    }
}

//! Pure scoring over a finished answer sheet.
//!
//! Scoring runs exactly once per session, at the terminal transition, and
//! everything here is integer arithmetic so the same sheet always produces
//! the same percentage on every platform.

/// Minimum percentage required to pass.
pub const PASS_THRESHOLD_PERCENT: u32 = 80;

/// Result of scoring one answer sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreSummary {
    pub correct_count: u32,
    pub total_questions: u32,
    pub score_percent: u32,
    pub passed: bool,
}

/// Integer percentage of `correct` out of `total`, rounded half up.
///
/// A zero `total` yields 0 rather than dividing; callers that consider an
/// empty sheet invalid reject it before scoring.
#[must_use]
pub fn percentage(correct: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let c = u64::from(correct);
    let t = u64::from(total);
    // (c / t) * 100 rounded half up, kept in integers.
    let percent = (200 * c + t) / (2 * t);
    u32::try_from(percent).unwrap_or(u32::MAX)
}

/// True when `percent` meets the pass threshold.
#[must_use]
pub fn is_passing(percent: u32) -> bool {
    percent >= PASS_THRESHOLD_PERCENT
}

/// Scores an answer sheet against the correct choice per question.
///
/// `answers` and `correct_choices` are positionally aligned; an unanswered
/// slot (`None`) never matches. The summary's `passed` flag is the raw
/// threshold check and does not know about withdrawal, which forces a fail
/// at the session layer.
#[must_use]
pub fn score(answers: &[Option<usize>], correct_choices: &[usize]) -> ScoreSummary {
    let correct_count = answers
        .iter()
        .zip(correct_choices.iter())
        .filter(|(answer, correct)| **answer == Some(**correct))
        .count();
    let correct_count = u32::try_from(correct_count).unwrap_or(u32::MAX);
    let total_questions = u32::try_from(correct_choices.len()).unwrap_or(u32::MAX);
    let score_percent = percentage(correct_count, total_questions);

    ScoreSummary {
        correct_count,
        total_questions,
        score_percent,
        passed: is_passing(score_percent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_correct_is_100() {
        assert_eq!(percentage(50, 50), 100);
    }

    #[test]
    fn none_correct_is_0() {
        assert_eq!(percentage(0, 50), 0);
    }

    #[test]
    fn rounds_half_up() {
        // 5/8 = 62.5 rounds up.
        assert_eq!(percentage(5, 8), 63);
        // 3/8 = 37.5 rounds up.
        assert_eq!(percentage(3, 8), 38);
        // 38/50 = 76 exactly.
        assert_eq!(percentage(38, 50), 76);
        // 1/3 = 33.33.. rounds down.
        assert_eq!(percentage(1, 3), 33);
        // 2/3 = 66.66.. rounds up.
        assert_eq!(percentage(2, 3), 67);
    }

    #[test]
    fn zero_total_is_0() {
        assert_eq!(percentage(0, 0), 0);
    }

    #[test]
    fn threshold_is_inclusive() {
        assert!(is_passing(80));
        assert!(!is_passing(79));
        // 40/50 sits exactly on the threshold.
        assert!(is_passing(percentage(40, 50)));
        assert!(!is_passing(percentage(39, 50)));
    }

    #[test]
    fn scores_answer_sheet() {
        let correct = vec![1, 0, 2, 1];
        let answers = vec![Some(1), Some(2), Some(2), None];
        let summary = score(&answers, &correct);
        assert_eq!(summary.correct_count, 2);
        assert_eq!(summary.total_questions, 4);
        assert_eq!(summary.score_percent, 50);
        assert!(!summary.passed);
    }

    #[test]
    fn unanswered_never_matches() {
        let correct = vec![0, 0];
        let answers = vec![None, None];
        let summary = score(&answers, &correct);
        assert_eq!(summary.correct_count, 0);
        assert_eq!(summary.score_percent, 0);
    }

    #[test]
    fn perfect_sheet_passes() {
        let correct = vec![3, 1];
        let answers = vec![Some(3), Some(1)];
        let summary = score(&answers, &correct);
        assert_eq!(summary.score_percent, 100);
        assert!(summary.passed);
    }
}

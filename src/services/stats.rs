use chrono::{DateTime, Utc};

use crate::models::stats::{JobStats, ScoreDistribution, StatsBreakdown, StatsTiming};
use crate::models::verification::{DeliveryState, EmailVerification};

const EXCELLENT_MIN_SCORE: i32 = 90;
const GOOD_MIN_SCORE: i32 = 70;
const FAIR_MIN_SCORE: i32 = 50;

/// Aggregate per-email results into the job's summary report.
///
/// Order-independent. Averages over an empty list are zero.
pub fn compute_stats(
    results: &[EmailVerification],
    started_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> JobStats {
    let count = results.len() as u64;
    let mut stats = JobStats {
        total: count,
        processed: count,
        ..Default::default()
    };

    let mut score_sum: i64 = 0;

    for result in results {
        match result.state {
            DeliveryState::Deliverable => stats.deliverable += 1,
            DeliveryState::Undeliverable => stats.undeliverable += 1,
            DeliveryState::Risky => stats.risky += 1,
            DeliveryState::Unknown => stats.unknown += 1,
        }

        tally_breakdown(&mut stats.breakdown, result);
        bucket_score(&mut stats.score_distribution, result.score);
        score_sum += i64::from(result.score);
    }

    stats.average_score = rounded_average(score_sum, count);

    let total_duration = (now - started_at).num_milliseconds().max(0);
    stats.timing = StatsTiming {
        started_at: now - chrono::Duration::milliseconds(total_duration),
        completed_at: now,
        total_duration,
        average_duration: if count == 0 {
            0
        } else {
            total_duration / count as i64
        },
    };

    stats
}

fn tally_breakdown(breakdown: &mut StatsBreakdown, result: &EmailVerification) {
    let checks = &result.checks;
    if checks.disposable.is_disposable {
        breakdown.disposable += 1;
    }
    if checks.role.is_role {
        breakdown.role_based += 1;
    }
    if checks.free_provider.is_free {
        breakdown.free_provider += 1;
    }
    if checks.smtp.catch_all {
        breakdown.catch_all += 1;
    }
    if !checks.syntax.valid {
        breakdown.syntax_errors += 1;
    }
    if !checks.dns.valid {
        breakdown.dns_errors += 1;
    }
    if checks.typo.has_typo {
        breakdown.typos_detected += 1;
    }
}

fn bucket_score(distribution: &mut ScoreDistribution, score: i32) {
    if score >= EXCELLENT_MIN_SCORE {
        distribution.excellent += 1;
    } else if score >= GOOD_MIN_SCORE {
        distribution.good += 1;
    } else if score >= FAIR_MIN_SCORE {
        distribution.fair += 1;
    } else {
        distribution.poor += 1;
    }
}

/// Integer average rounded half-up.
fn rounded_average(sum: i64, count: u64) -> i64 {
    if count == 0 {
        return 0;
    }
    let count = count as i64;
    (2 * sum + count).div_euclid(2 * count)
}

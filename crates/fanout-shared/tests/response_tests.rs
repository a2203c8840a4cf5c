//! Tests for response.rs (success policy and summary rules)

use chrono::Utc;
use fanout_shared::lane::{LaneConfig, LanePayload, LaneResult, LaneStatus};
use fanout_shared::response::{all_lanes_failed, evaluate_success, LaneSummary, SuccessPolicy};

fn completed(name: &str) -> LaneResult {
    let config = LaneConfig::new(name, 1_000);
    LaneResult::completed(&config, 1_000, 1_000, Utc::now(), 10, LanePayload::answer("ok"))
}

fn partial(name: &str) -> LaneResult {
    let config = LaneConfig::new(name, 1_000);
    let payload = LanePayload::default().mark_partial();
    LaneResult::completed(&config, 1_000, 1_000, Utc::now(), 10, payload)
}

fn failed(name: &str) -> LaneResult {
    let config = LaneConfig::new(name, 1_000);
    LaneResult::failed(&config, 1_000, 1_000, Utc::now(), 5, "boom".to_string())
}

fn timed_out(name: &str) -> LaneResult {
    let config = LaneConfig::new(name, 1_000);
    LaneResult::timed_out(&config, 1_000, 1_000, Utc::now(), "timeout")
}

fn required(mut r: LaneResult) -> LaneResult {
    r.required = true;
    r
}

#[test]
fn test_one_data_lane_is_enough() {
    let results = vec![
        completed("web"),
        failed("vector"),
        required(failed("synthesis")),
    ];
    assert!(evaluate_success(&SuccessPolicy::default(), &results));
}

#[test]
fn test_synthesis_alone_is_enough() {
    let results = vec![
        failed("web"),
        timed_out("vector"),
        required(completed("synthesis")),
    ];
    assert!(evaluate_success(&SuccessPolicy::default(), &results));
}

#[test]
fn test_nothing_completed_fails() {
    let results = vec![failed("web"), required(timed_out("synthesis"))];
    assert!(!evaluate_success(&SuccessPolicy::default(), &results));
    assert!(all_lanes_failed(&results));
}

#[test]
fn test_required_lane_without_partial_results() {
    let policy = SuccessPolicy {
        return_partial_results: false,
        ..SuccessPolicy::default()
    };
    let results = vec![completed("web"), required(timed_out("synthesis"))];
    assert!(!evaluate_success(&policy, &results));
}

#[test]
fn test_strict_required_lanes_overrides_partial_results() {
    let results = vec![completed("web"), required(timed_out("synthesis"))];

    let lenient = SuccessPolicy::default();
    assert!(evaluate_success(&lenient, &results));

    let strict = SuccessPolicy {
        strict_required_lanes: true,
        ..SuccessPolicy::default()
    };
    assert!(!evaluate_success(&strict, &results));
}

#[test]
fn test_no_lane_requirement_tolerates_skips() {
    let config = LaneConfig::new("video", 1_000);
    let results = vec![
        LaneResult::skipped(&config, 0, "no budget for intent"),
        LaneResult::deferred(&LaneConfig::new("web", 1_000), 1_000, "budget exhausted"),
    ];

    assert!(!evaluate_success(&SuccessPolicy::default(), &results));

    let relaxed = SuccessPolicy {
        require_at_least_one_lane: false,
        ..SuccessPolicy::default()
    };
    assert!(evaluate_success(&relaxed, &results));
    assert!(!all_lanes_failed(&results));
}

#[test]
fn test_no_lane_requirement_still_fails_when_everything_failed() {
    let relaxed = SuccessPolicy {
        require_at_least_one_lane: false,
        ..SuccessPolicy::default()
    };
    let results = vec![failed("web"), timed_out("vector")];
    assert!(!evaluate_success(&relaxed, &results));
}

#[test]
fn test_summary_counts() {
    let results = vec![
        completed("web"),
        partial("fusion"),
        failed("vector"),
        timed_out("knowledge_graph"),
        LaneResult::skipped(&LaneConfig::new("video", 1_000), 0, "no budget for intent"),
        LaneResult::deferred(&LaneConfig::new("synthesis", 1_000), 0, "budget exhausted"),
    ];
    let summary = LaneSummary::from_results(&results);
    assert_eq!(summary.successful_lanes, 1);
    assert_eq!(summary.partial_lanes, 1);
    assert_eq!(summary.failed_lanes, 2);
    assert_eq!(summary.skipped_lanes, 1);
    assert_eq!(summary.deferred_lanes, 1);
    assert_eq!(summary.total_lanes, 6);
    assert_eq!(results[1].status, LaneStatus::Completed);
}

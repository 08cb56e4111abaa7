//! 状态机与可用率判定的性质测试

use chrono::{TimeZone, Utc};
use pingbot::monitor::uptime::{summarize, LATENCY_CEILING_MS};
use pingbot::monitor::{evaluate, is_available_check, is_probe_success, LivenessState};
use pingbot::probe::{ProbeOutcome, TransportErrorKind, TRANSPORT_FAILURE_STATUS};
use pingbot::store::ProbeLog;

fn outcome_for(code: u16) -> ProbeOutcome {
    if code == TRANSPORT_FAILURE_STATUS {
        ProbeOutcome::transport_failure(TransportErrorKind::Connect, "connection refused", 12)
    } else {
        ProbeOutcome::response(code, 12)
    }
}

/// 所有长度为 `len` 的探测序列
fn sequences(alphabet: &[u16], len: usize) -> Vec<Vec<u16>> {
    let mut all = vec![Vec::new()];
    for _ in 0..len {
        all = all
            .into_iter()
            .flat_map(|prefix| {
                alphabet.iter().map(move |code| {
                    let mut next = prefix.clone();
                    next.push(*code);
                    next
                })
            })
            .collect();
    }
    all
}

#[test]
fn test_alerts_match_up_to_down_edges() {
    let alphabet = [200, 302, 404, 500, TRANSPORT_FAILURE_STATUS];

    for sequence in sequences(&alphabet, 5) {
        let mut is_down = false;
        let mut alerts = 0;
        let mut edges = 0;
        let mut previous_up = true;

        for code in &sequence {
            let transition = evaluate(is_down, true, &outcome_for(*code));
            if transition.alert_due {
                alerts += 1;
            }

            let up = (200..400).contains(code);
            if previous_up && !up {
                edges += 1;
            }
            previous_up = up;

            // 持久化状态只由最近一次探测决定
            assert_eq!(transition.is_down(), !up, "sequence {sequence:?}");
            is_down = transition.is_down();
        }

        assert_eq!(alerts, edges, "sequence {sequence:?}");
    }
}

#[test]
fn test_disabled_email_never_alerts_but_tracks_state() {
    for sequence in sequences(&[200, 500], 6) {
        let mut is_down = false;
        for code in &sequence {
            let transition = evaluate(is_down, false, &outcome_for(*code));
            assert!(!transition.alert_due);
            if transition.previous == LivenessState::Up && transition.next == LivenessState::Down {
                assert!(transition.entered_down_episode());
            }
            is_down = transition.is_down();
        }
    }
}

#[test]
fn test_predicate_boundaries() {
    assert!(!is_probe_success(&ProbeOutcome::response(199, 1)));
    assert!(is_probe_success(&ProbeOutcome::response(200, 1)));
    assert!(is_probe_success(&ProbeOutcome::response(399, 1)));
    assert!(!is_probe_success(&ProbeOutcome::response(400, 1)));

    // 状态机不看延迟，可用率统计看
    let slow = ProbeOutcome::response(200, LATENCY_CEILING_MS);
    assert!(is_probe_success(&slow));
    assert!(!is_available_check(200, LATENCY_CEILING_MS));
    assert!(is_available_check(200, LATENCY_CEILING_MS - 1));
    assert!(!is_available_check(TRANSPORT_FAILURE_STATUS, 5));
}

#[test]
fn test_summarize_counts_slow_checks_as_failures() {
    let base = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
    let samples = [(200, 100), (301, 100), (200, 30_000), (0, 4_000), (503, 80), (204, 10)];
    let logs: Vec<ProbeLog> = samples
        .iter()
        .enumerate()
        .map(|(i, (status_code, latency_ms))| ProbeLog {
            id: i as u64 + 1,
            target_id: 1,
            status_code: *status_code,
            latency_ms: *latency_ms,
            created_at: base + chrono::Duration::seconds(5 * i as i64),
        })
        .collect();

    let report = summarize(&logs, 24);
    assert_eq!(report.total_checks, 6);
    assert_eq!(report.successful_checks, 3);
    assert_eq!(report.uptime_percentage, 50.0);
    assert_eq!(report.downtime_minutes, 90);
    assert_eq!(report.period_hours, 24);
}

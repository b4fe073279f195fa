use crate::event::{Event, EventKind, EventPublisher};
use crate::plugin::ConcurrentEventListener;
use crate::result::{Status, TestResult};
use std::sync::{Arc, Mutex, PoisonError};

/// 성공 종료 코드.
pub const EXIT_DEFAULT: u8 = 0x0;
/// 실패 종료 코드.
pub const EXIT_ERRORS: u8 = 0x1;

/// 가장 심각한 결과 상태.
pub fn most_severe(results: &[TestResult]) -> Option<Status> {
    results.iter().map(|result| result.status).max()
}

/// 가장 덜 심각한 결과 상태.
pub fn least_severe(results: &[TestResult]) -> Option<Status> {
    results.iter().map(|result| result.status).min()
}

/// 결과 목록과 정책으로 종료 코드를 계산한다.
///
/// wip 모드는 "아직 통과하면 안 되는" 시나리오를 돌리는 모드이므로 하나라도
/// Passed 가 있으면 실패다. 일반 모드는 가장 심각한 결과가 strict 기준으로
/// 성공인지를 본다.
pub fn exit_status_for(results: &[TestResult], strict: bool, wip: bool) -> u8 {
    if wip {
        return match least_severe(results) {
            Some(Status::Passed) => EXIT_ERRORS,
            _ => EXIT_DEFAULT,
        };
    }
    match most_severe(results) {
        Some(status) if !status.is_ok(strict) => EXIT_ERRORS,
        _ => EXIT_DEFAULT,
    }
}

/// ScenarioFinished 결과를 누적해 최종 종료 코드를 계산하는 리스너이다.
#[derive(Debug)]
pub struct ExitStatus {
    strict: bool,
    wip: bool,
    results: Arc<Mutex<Vec<TestResult>>>,
}

impl ExitStatus {
    /// 정책 플래그로 생성한다.
    pub fn new(strict: bool, wip: bool) -> Self {
        Self {
            strict,
            wip,
            results: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 지금까지 관찰한 결과 수.
    pub fn observed(&self) -> usize {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// 상태별 집계. 심각도 오름차순이다.
    pub fn summary(&self) -> Vec<(Status, usize)> {
        let results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
        let mut counts: Vec<(Status, usize)> = Vec::new();
        for result in results.iter() {
            match counts.iter_mut().find(|(status, _)| *status == result.status) {
                Some((_, count)) => *count += 1,
                None => counts.push((result.status, 1)),
            }
        }
        counts.sort();
        counts
    }

    /// 최종 종료 코드. 결과가 없으면 성공이다.
    pub fn exit_status(&self) -> u8 {
        let results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
        if results.is_empty() {
            return EXIT_DEFAULT;
        }
        exit_status_for(&results, self.strict, self.wip)
    }
}

impl ConcurrentEventListener for ExitStatus {
    fn set_event_publisher(&self, publisher: &dyn EventPublisher) {
        let results = Arc::clone(&self.results);
        publisher.register_handler(
            EventKind::ScenarioFinished,
            Arc::new(move |event: &Event| -> anyhow::Result<()> {
                if let Event::ScenarioFinished { result, .. } = event {
                    results
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(result.clone());
                }
                Ok(())
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventBus;
    use crate::pickle::Pickle;
    use std::time::Duration;

    fn results(statuses: &[Status]) -> Vec<TestResult> {
        statuses
            .iter()
            .map(|status| TestResult::new(*status, Duration::ZERO))
            .collect()
    }

    fn status(statuses: &[Status], strict: bool, wip: bool) -> u8 {
        exit_status_for(&results(statuses), strict, wip)
    }

    #[test]
    fn normal_mode_uses_most_severe_result() {
        assert_eq!(EXIT_DEFAULT, status(&[Status::Passed, Status::Passed], false, false));
        assert_eq!(EXIT_ERRORS, status(&[Status::Passed, Status::Failed], false, false));
        assert_eq!(EXIT_ERRORS, status(&[Status::Ambiguous], false, false));
        assert_eq!(EXIT_DEFAULT, status(&[Status::Skipped, Status::Passed], true, false));
    }

    #[test]
    fn strict_mode_fails_pending_and_undefined() {
        assert_eq!(EXIT_ERRORS, status(&[Status::Pending], true, false));
        assert_eq!(EXIT_DEFAULT, status(&[Status::Pending], false, false));
        assert_eq!(EXIT_ERRORS, status(&[Status::Passed, Status::Undefined], true, false));
        assert_eq!(EXIT_DEFAULT, status(&[Status::Passed, Status::Undefined], false, false));
    }

    #[test]
    fn wip_mode_fails_when_anything_passed() {
        assert_eq!(EXIT_ERRORS, status(&[Status::Passed], false, true));
        assert_eq!(EXIT_DEFAULT, status(&[Status::Failed], false, true));
        assert_eq!(EXIT_ERRORS, status(&[Status::Failed, Status::Passed], false, true));
        assert_eq!(EXIT_DEFAULT, status(&[Status::Skipped, Status::Undefined], true, true));
    }

    #[test]
    fn listener_accumulates_finished_scenarios_only() {
        let exit = ExitStatus::new(false, false);
        assert_eq!(EXIT_DEFAULT, exit.exit_status());

        let bus = EventBus::new();
        exit.set_event_publisher(&bus);
        let pickle = Arc::new(Pickle::new("a.feature", 1, "a"));
        bus.publish(Event::ScenarioStarted {
            instant: bus.instant(),
            pickle: pickle.clone(),
        });
        assert_eq!(0, exit.observed());

        for s in [Status::Passed, Status::Failed, Status::Passed] {
            bus.publish(Event::ScenarioFinished {
                instant: bus.instant(),
                pickle: pickle.clone(),
                result: TestResult::new(s, Duration::ZERO),
            });
        }
        assert_eq!(3, exit.observed());
        assert_eq!(EXIT_ERRORS, exit.exit_status());
        assert_eq!(
            vec![(Status::Passed, 2), (Status::Failed, 1)],
            exit.summary()
        );
    }
}

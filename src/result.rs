use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// 시나리오/Step 결과의 심각도이다. 선언 순서가 곧 심각도 순서다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// 정상 통과.
    Passed,
    /// 실행되지 않고 건너뜀.
    Skipped,
    /// 구현 대기 중.
    Pending,
    /// 매칭되는 Step 정의가 없음.
    Undefined,
    /// 둘 이상의 Step 정의가 매칭됨.
    Ambiguous,
    /// 실패.
    Failed,
}

impl Status {
    /// strict 설정을 고려해 종료 코드상 성공으로 볼 수 있는지 판정한다.
    pub fn is_ok(self, strict: bool) -> bool {
        self.is_always_ok() || (!strict && self.is_ok_when_not_strict())
    }

    fn is_always_ok(self) -> bool {
        matches!(self, Status::Passed | Status::Skipped)
    }

    fn is_ok_when_not_strict(self) -> bool {
        matches!(self, Status::Pending | Status::Undefined)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::Passed => "passed",
            Status::Skipped => "skipped",
            Status::Pending => "pending",
            Status::Undefined => "undefined",
            Status::Ambiguous => "ambiguous",
            Status::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// 시나리오 또는 Step 한 번의 실행 결과이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    /// 결과 상태.
    pub status: Status,
    /// 소요 시간.
    pub duration: Duration,
    /// 실패 시 오류 메시지.
    pub error: Option<String>,
}

impl TestResult {
    /// 오류 정보 없이 결과를 생성한다.
    pub fn new(status: Status, duration: Duration) -> Self {
        Self {
            status,
            duration,
            error: None,
        }
    }

    /// 오류 메시지를 포함한 Failed 결과를 생성한다.
    pub fn failed(duration: Duration, error: impl Into<String>) -> Self {
        Self {
            status: Status::Failed,
            duration,
            error: Some(error.into()),
        }
    }

    /// 오류 메시지를 덧붙인다.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

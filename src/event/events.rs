use crate::pickle::Pickle;
use crate::result::TestResult;
use std::sync::Arc;
use std::time::SystemTime;

/// 구독 시 사용하는 이벤트 종류 태그이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    RunStarted,
    SourceRead,
    SnippetsSuggested,
    ScenarioStarted,
    StepStarted,
    StepFinished,
    ScenarioFinished,
    RunFinished,
}

impl EventKind {
    /// 모든 종류.
    pub const ALL: [EventKind; 8] = [
        EventKind::RunStarted,
        EventKind::SourceRead,
        EventKind::SnippetsSuggested,
        EventKind::ScenarioStarted,
        EventKind::StepStarted,
        EventKind::StepFinished,
        EventKind::ScenarioFinished,
        EventKind::RunFinished,
    ];
}

/// 실행 수명 주기 이벤트이다. 발행 이후에는 변경되지 않는다.
#[derive(Debug, Clone)]
pub enum Event {
    /// 실행 시작. 어떤 시나리오보다 먼저 한 번 발행된다.
    RunStarted { instant: SystemTime },
    /// Feature 원문을 읽었음을 알린다.
    SourceRead {
        instant: SystemTime,
        uri: String,
        source: String,
    },
    /// 정의되지 않은 Step에 대한 구현 스니펫 제안.
    SnippetsSuggested {
        instant: SystemTime,
        uri: String,
        step_lines: Vec<u32>,
        snippets: Vec<String>,
    },
    /// 시나리오 실행 시작.
    ScenarioStarted {
        instant: SystemTime,
        pickle: Arc<Pickle>,
    },
    /// Step 실행 시작.
    StepStarted {
        instant: SystemTime,
        pickle: Arc<Pickle>,
        index: usize,
    },
    /// Step 실행 종료.
    StepFinished {
        instant: SystemTime,
        pickle: Arc<Pickle>,
        index: usize,
        result: TestResult,
    },
    /// 시나리오 실행 종료와 최종 결과.
    ScenarioFinished {
        instant: SystemTime,
        pickle: Arc<Pickle>,
        result: TestResult,
    },
    /// 실행 종료. 항상 마지막에 발행된다.
    RunFinished { instant: SystemTime },
}

impl Event {
    /// 이벤트 종류 태그.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::RunStarted { .. } => EventKind::RunStarted,
            Event::SourceRead { .. } => EventKind::SourceRead,
            Event::SnippetsSuggested { .. } => EventKind::SnippetsSuggested,
            Event::ScenarioStarted { .. } => EventKind::ScenarioStarted,
            Event::StepStarted { .. } => EventKind::StepStarted,
            Event::StepFinished { .. } => EventKind::StepFinished,
            Event::ScenarioFinished { .. } => EventKind::ScenarioFinished,
            Event::RunFinished { .. } => EventKind::RunFinished,
        }
    }

    /// 발행 시각.
    pub fn instant(&self) -> SystemTime {
        match self {
            Event::RunStarted { instant }
            | Event::SourceRead { instant, .. }
            | Event::SnippetsSuggested { instant, .. }
            | Event::ScenarioStarted { instant, .. }
            | Event::StepStarted { instant, .. }
            | Event::StepFinished { instant, .. }
            | Event::ScenarioFinished { instant, .. }
            | Event::RunFinished { instant } => *instant,
        }
    }

    /// 시나리오 범위 이벤트라면 해당 Pickle을 반환한다.
    pub fn pickle(&self) -> Option<&Arc<Pickle>> {
        match self {
            Event::ScenarioStarted { pickle, .. }
            | Event::StepStarted { pickle, .. }
            | Event::StepFinished { pickle, .. }
            | Event::ScenarioFinished { pickle, .. } => Some(pickle),
            _ => None,
        }
    }
}

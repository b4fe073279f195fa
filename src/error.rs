use crate::filter::TagExpressionError;
use crate::pickle::Pickle;

/// 실행 시작 전에 드러나는 설정 오류이다. 발생하면 실행은 시작되지 않는다.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 태그 표현식 문법 오류.
    #[error("잘못된 태그 표현식입니다: {0}")]
    TagExpression(#[from] TagExpressionError),
    /// 이름 필터 정규식 컴파일 실패.
    #[error("잘못된 이름 필터 패턴입니다: {pattern}")]
    NamePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    /// 알 수 없는 정렬 전략.
    #[error("알 수 없는 시나리오 정렬 전략입니다: {0}")]
    UnknownOrder(String),
    /// 잘못된 `path:line` 표기.
    #[error("라인 번호를 해석할 수 없습니다: {0}")]
    FeatureLine(String),
    /// 동시 실행 폭이 0인 경우.
    #[error("threads 값은 1 이상이어야 합니다.")]
    ZeroThreads,
    /// RunnerSupplier 가 지정되지 않은 경우.
    #[error("RunnerSupplier가 지정되지 않았습니다.")]
    MissingRunnerSupplier,
    /// 설정 파일 읽기 실패.
    #[error("설정 파일을 읽을 수 없습니다: {0}")]
    Io(#[from] std::io::Error),
    /// 설정 YAML 파싱 실패.
    #[error("설정 YAML을 파싱할 수 없습니다: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// 시나리오 하나가 실행 중 던진, 복구되지 않은 오류이다.
#[derive(Debug, thiserror::Error)]
#[error("시나리오 실행 실패 ({uri}:{line}): {source}")]
pub struct ScenarioError {
    /// 실패한 시나리오 URI.
    pub uri: String,
    /// 실패한 시나리오 라인.
    pub line: u32,
    /// 원인 오류.
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl ScenarioError {
    /// Pickle과 원인 오류로부터 생성한다.
    pub fn new(pickle: &Pickle, source: anyhow::Error) -> Self {
        Self {
            uri: pickle.uri.clone(),
            line: pickle.line,
            source: source.into(),
        }
    }

    /// 특정 시나리오에 귀속되지 않는 워커 오류로부터 생성한다.
    pub fn worker(source: anyhow::Error) -> Self {
        Self {
            uri: "<worker>".to_string(),
            line: 0,
            source: source.into(),
        }
    }
}

/// 실행 전체를 실패로 만드는 오류이다.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// 정확히 하나의 시나리오가 실패한 경우.
    #[error(transparent)]
    Scenario(ScenarioError),
    /// 둘 이상의 시나리오가 실패한 경우. 제출 순서대로 모두 보존한다.
    #[error("{}개의 시나리오가 실행 중 실패했습니다.", .0.len())]
    Composite(Vec<ScenarioError>),
    /// 대기 중 취소되어 남은 작업이 중단된 경우.
    #[error("실행이 중단되었습니다.")]
    Aborted,
}

impl RunError {
    /// 프로세스 종료 코드. 중단은 집계 결과와 무관하게 별도 코드로 구분한다.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::Aborted => 2,
            RunError::Scenario(_) | RunError::Composite(_) => 1,
        }
    }

    /// 포함된 시나리오 오류 목록.
    pub fn scenario_errors(&self) -> &[ScenarioError] {
        match self {
            RunError::Scenario(err) => std::slice::from_ref(err),
            RunError::Composite(errors) => errors,
            RunError::Aborted => &[],
        }
    }
}

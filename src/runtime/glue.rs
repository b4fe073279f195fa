use super::runner::ScenarioRunner;
use crate::event::{Event, EventBus};
use crate::pickle::{Pickle, PickleStep};
use crate::result::{Status, TestResult};
use std::sync::Arc;
use std::time::Instant;

/// Step 본문. 해석한 Glue 를 빌려 실행된다.
pub type StepBody<'a> = Box<dyn FnOnce() -> anyhow::Result<()> + 'a>;

/// Step 문장을 해석한 결과이다.
pub enum StepMatch<'a> {
    /// 정확히 하나의 구현이 매칭됨.
    Defined(StepBody<'a>),
    /// 매칭되는 구현이 없음.
    Undefined,
    /// 둘 이상이 매칭됨. 후보 패턴 목록을 담는다.
    Ambiguous(Vec<String>),
}

/// Step 본문이 아직 구현되지 않았음을 알리는 오류이다.
///
/// Step 본문이 이 오류를 반환하면 결과는 Failed 가 아니라 Pending 이 된다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct PendingException(pub String);

impl Default for PendingException {
    fn default() -> Self {
        Self("TODO: implement me".to_string())
    }
}

/// "Step 문장 → 호출 가능한 구현" 해석 능력이다.
///
/// Glue 인스턴스는 워커마다 하나씩 만들어지므로 Step 간 상태를 자유롭게 가져도 된다.
pub trait Glue: Send {
    /// Step 문장을 구현으로 해석한다.
    fn resolve(&mut self, step: &PickleStep) -> StepMatch<'_>;

    /// 시나리오 시작 전 상태를 준비한다. 실패는 복구되지 않은 실행 오류로 취급된다.
    fn start_scenario(&mut self, _pickle: &Pickle) -> anyhow::Result<()> {
        Ok(())
    }

    /// 시나리오 종료 후 상태를 정리한다.
    fn finish_scenario(&mut self, _pickle: &Pickle) -> anyhow::Result<()> {
        Ok(())
    }

    /// 정의되지 않은 Step 에 대한 구현 스니펫.
    fn snippet(&self, step: &PickleStep) -> String {
        format!(
            "#[step(\"^{}$\")]\nfn step() -> anyhow::Result<()> {{\n    Err(PendingException::default().into())\n}}",
            regex::escape(&step.text)
        )
    }
}

/// 아무 구현도 갖지 않는 Glue. 모든 Step 이 Undefined 가 된다.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGlue;

impl Glue for NoGlue {
    fn resolve(&mut self, _step: &PickleStep) -> StepMatch<'_> {
        StepMatch::Undefined
    }
}

/// [`Glue`] 로 Step 을 하나씩 실행하는 [`ScenarioRunner`] 이다.
///
/// 처음으로 통과하지 못한 Step 이후의 Step 은 본문을 실행하지 않고 Skipped 로
/// 기록한다. 시나리오 결과는 Step 결과 중 가장 심각한 것이다.
#[derive(Debug)]
pub struct GlueRunner<G> {
    glue: G,
    dry_run: bool,
}

impl<G: Glue> GlueRunner<G> {
    /// Glue 와 dry-run 여부로 생성한다.
    pub fn new(glue: G, dry_run: bool) -> Self {
        Self { glue, dry_run }
    }

    /// 내부 Glue 참조.
    pub fn glue(&self) -> &G {
        &self.glue
    }

    fn run_step(&mut self, step: &PickleStep, skip: bool) -> (TestResult, Option<String>) {
        let started = Instant::now();
        let mut snippet = None;
        let (status, error) = match self.glue.resolve(step) {
            StepMatch::Undefined => (Status::Undefined, None),
            StepMatch::Ambiguous(candidates) => (
                Status::Ambiguous,
                Some(format!("모호한 Step 정의: {}", candidates.join(", "))),
            ),
            StepMatch::Defined(_) if skip => (Status::Skipped, None),
            StepMatch::Defined(body) => match body() {
                Ok(()) => (Status::Passed, None),
                Err(err) => match err.downcast_ref::<PendingException>() {
                    Some(pending) => (Status::Pending, Some(pending.to_string())),
                    None => (Status::Failed, Some(format!("{err:#}"))),
                },
            },
        };
        if status == Status::Undefined {
            snippet = Some(self.glue.snippet(step));
        }
        let mut result = TestResult::new(status, started.elapsed());
        result.error = error;
        (result, snippet)
    }
}

impl<G: Glue> ScenarioRunner for GlueRunner<G> {
    fn run_pickle(&mut self, pickle: &Arc<Pickle>, bus: &EventBus) -> anyhow::Result<TestResult> {
        let started = Instant::now();
        self.glue.start_scenario(pickle)?;

        let mut worst: Option<TestResult> = None;
        let mut skip = self.dry_run;
        for (index, step) in pickle.steps.iter().enumerate() {
            bus.publish(Event::StepStarted {
                instant: bus.instant(),
                pickle: Arc::clone(pickle),
                index,
            });
            let (result, snippet) = self.run_step(step, skip);
            if let Some(snippet) = snippet {
                bus.publish(Event::SnippetsSuggested {
                    instant: bus.instant(),
                    uri: pickle.uri.clone(),
                    step_lines: vec![step.line],
                    snippets: vec![snippet],
                });
            }
            bus.publish(Event::StepFinished {
                instant: bus.instant(),
                pickle: Arc::clone(pickle),
                index,
                result: result.clone(),
            });
            if result.status != Status::Passed {
                skip = true;
            }
            if worst.as_ref().is_none_or(|w| result.status > w.status) {
                worst = Some(result);
            }
        }

        self.glue.finish_scenario(pickle)?;
        let status = worst.as_ref().map_or(Status::Passed, |w| w.status);
        let mut result = TestResult::new(status, started.elapsed());
        result.error = worst.and_then(|w| w.error);
        Ok(result)
    }
}

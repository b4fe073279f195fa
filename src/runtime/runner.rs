use crate::event::EventBus;
use crate::pickle::Pickle;
use crate::result::TestResult;
use std::sync::Arc;

/// 시나리오 하나를 실행하는 실행 컨텍스트이다.
///
/// 호출은 블로킹이며 오래 걸릴 수 있다. 인스턴스는 한 워커가 독점하므로
/// 내부 상태에 잠금이 필요 없다.
pub trait ScenarioRunner: Send {
    /// Step을 실행하고 최종 결과를 반환한다. Step 단위 이벤트는 `bus` 로 발행한다.
    fn run_pickle(&mut self, pickle: &Arc<Pickle>, bus: &EventBus) -> anyhow::Result<TestResult>;
}

/// 워커마다 독립된 [`ScenarioRunner`] 를 만들어 주는 공급자이다.
pub trait RunnerSupplier: Send + Sync {
    /// 새 실행 컨텍스트를 생성한다.
    fn create(&self) -> Box<dyn ScenarioRunner>;
}

impl<F> RunnerSupplier for F
where
    F: Fn() -> Box<dyn ScenarioRunner> + Send + Sync,
{
    fn create(&self) -> Box<dyn ScenarioRunner> {
        self()
    }
}

use super::runner::{RunnerSupplier, ScenarioRunner};
use crate::error::{RunError, ScenarioError};
use crate::event::{Event, EventBus};
use crate::pickle::{Feature, Pickle};
use crate::result::TestResult;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::any::Any;
use std::collections::{HashSet, VecDeque};
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 시나리오 실행 방식이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    /// 호출한 스레드에서 하나씩, 실행 컨텍스트 하나를 공유한다.
    SingleThreaded,
    /// 고정 크기 워커 풀. 워커마다 실행 컨텍스트를 따로 가진다.
    Pooled(NonZeroUsize),
}

impl Concurrency {
    /// 워커 수로부터 실행 방식을 고른다.
    pub fn from_threads(threads: NonZeroUsize) -> Self {
        if threads.get() == 1 {
            Concurrency::SingleThreaded
        } else {
            Concurrency::Pooled(threads)
        }
    }
}

/// 실행 결과. 복구되지 않은 시나리오 오류를 제출 순서대로 담는다.
#[derive(Debug, Default)]
pub struct RunOutcome {
    /// 시나리오 실행 오류 목록. 모두 성공했다면 비어 있다.
    pub errors: Vec<ScenarioError>,
}

impl RunOutcome {
    /// 오류가 하나도 없는지 여부.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// 오류가 하나면 그대로, 여럿이면 묶어서 실패로 변환한다.
    pub fn into_result(mut self) -> Result<(), RunError> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(RunError::Scenario(self.errors.remove(0))),
            _ => Err(RunError::Composite(self.errors)),
        }
    }
}

type Queue = Arc<Mutex<VecDeque<(usize, Arc<Pickle>)>>>;
type WorkerHandle = JoinHandle<Vec<(usize, ScenarioError)>>;

/// 정렬된 Pickle 목록을 실행 컨텍스트에 배분하고 수명 주기 이벤트를 발행한다.
pub struct ExecutionScheduler {
    bus: Arc<EventBus>,
    supplier: Arc<dyn RunnerSupplier>,
    concurrency: Concurrency,
}

impl ExecutionScheduler {
    /// 버스, 실행 컨텍스트 공급자, 실행 방식으로 생성한다.
    pub fn new(
        bus: Arc<EventBus>,
        supplier: Arc<dyn RunnerSupplier>,
        concurrency: Concurrency,
    ) -> Self {
        Self {
            bus,
            supplier,
            concurrency,
        }
    }

    /// 실행 방식.
    pub fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    /// 전체 실행을 수행한다.
    ///
    /// RunStarted, Feature별 SourceRead 를 먼저 발행하고 `pickles` 를 주어진
    /// 순서대로 배분한다. 시나리오 실패는 모아 두었다가 [`RunOutcome`] 으로
    /// 돌려주며, RunFinished 는 실패 여부와 무관하게 마지막에 발행된다.
    /// `cancel` 이 취소되면 남은 작업을 멈추고 즉시 [`RunError::Aborted`] 를 반환한다.
    pub async fn run(
        &self,
        features: &[Feature],
        pickles: Vec<Arc<Pickle>>,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunError> {
        self.bus.publish(Event::RunStarted {
            instant: self.bus.instant(),
        });
        let mut seen = HashSet::new();
        for feature in features {
            if !seen.insert(feature.uri.as_str()) {
                continue;
            }
            self.bus.publish(Event::SourceRead {
                instant: self.bus.instant(),
                uri: feature.uri.clone(),
                source: feature.source.clone(),
            });
        }

        let errors = match self.concurrency {
            Concurrency::SingleThreaded => self.run_sequential(&pickles, cancel)?,
            Concurrency::Pooled(width) => self.run_pooled(pickles, width, cancel).await?,
        };

        self.bus.publish(Event::RunFinished {
            instant: self.bus.instant(),
        });
        Ok(RunOutcome { errors })
    }

    fn run_sequential(
        &self,
        pickles: &[Arc<Pickle>],
        cancel: &CancellationToken,
    ) -> Result<Vec<ScenarioError>, RunError> {
        let mut runner: Option<Box<dyn ScenarioRunner>> = None;
        let mut errors = Vec::new();
        for pickle in pickles {
            if cancel.is_cancelled() {
                tracing::warn!("실행이 취소되어 남은 시나리오를 건너뜁니다.");
                return Err(RunError::Aborted);
            }
            if let Err(err) = execute_pickle(&mut runner, self.supplier.as_ref(), pickle, &self.bus)
            {
                errors.push(err);
            }
        }
        Ok(errors)
    }

    async fn run_pooled(
        &self,
        pickles: Vec<Arc<Pickle>>,
        width: NonZeroUsize,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScenarioError>, RunError> {
        let workers = width.get().min(pickles.len());
        let queue: Queue = Arc::new(Mutex::new(pickles.into_iter().enumerate().collect()));
        let stop = cancel.child_token();

        let mut running: FuturesUnordered<WorkerHandle> = FuturesUnordered::new();
        for worker in 0..workers {
            let queue = Arc::clone(&queue);
            let supplier = Arc::clone(&self.supplier);
            let bus = Arc::clone(&self.bus);
            let stop = stop.clone();
            running.push(tokio::task::spawn_blocking(move || {
                drain_queue(worker, &queue, supplier.as_ref(), &bus, &stop)
            }));
        }

        let mut failures: Vec<(usize, ScenarioError)> = Vec::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let dropped = {
                        let mut pending = queue.lock().unwrap_or_else(PoisonError::into_inner);
                        let dropped = pending.len();
                        pending.clear();
                        dropped
                    };
                    tracing::warn!(dropped, "실행이 취소되었습니다. 시작되지 않은 시나리오를 버립니다.");
                    return Err(RunError::Aborted);
                }
                joined = running.next() => match joined {
                    Some(Ok(found)) => failures.extend(found),
                    Some(Err(err)) => {
                        tracing::error!("워커가 비정상 종료되었습니다: {err}");
                        failures.push((usize::MAX, ScenarioError::worker(err.into())));
                    }
                    None => break,
                },
            }
        }
        failures.sort_by_key(|(index, _)| *index);
        Ok(failures.into_iter().map(|(_, err)| err).collect())
    }
}

impl std::fmt::Debug for ExecutionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionScheduler")
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

/// 워커 하나의 수명. 큐가 빌 때까지 꺼내 실행하며 실행 컨텍스트는 처음 필요할 때 만든다.
fn drain_queue(
    worker: usize,
    queue: &Mutex<VecDeque<(usize, Arc<Pickle>)>>,
    supplier: &dyn RunnerSupplier,
    bus: &EventBus,
    stop: &CancellationToken,
) -> Vec<(usize, ScenarioError)> {
    let _span = tracing::debug_span!("runner", worker).entered();
    let mut runner: Option<Box<dyn ScenarioRunner>> = None;
    let mut failures = Vec::new();
    loop {
        if stop.is_cancelled() {
            break;
        }
        let next = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let Some((index, pickle)) = next else {
            break;
        };
        if let Err(err) = execute_pickle(&mut runner, supplier, &pickle, bus) {
            failures.push((index, err));
        }
    }
    failures
}

/// 시나리오 하나를 실행하고 Started/Finished 를 발행한다.
///
/// 실행 컨텍스트가 오류를 반환하거나 panic 하면 Failed 결과로 기록하고 오류를 돌려준다.
/// panic 한 실행 컨텍스트는 버리고 다음 시나리오에서 새로 만든다.
fn execute_pickle(
    slot: &mut Option<Box<dyn ScenarioRunner>>,
    supplier: &dyn RunnerSupplier,
    pickle: &Arc<Pickle>,
    bus: &EventBus,
) -> Result<(), ScenarioError> {
    bus.publish(Event::ScenarioStarted {
        instant: bus.instant(),
        pickle: Arc::clone(pickle),
    });
    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        slot.get_or_insert_with(|| supplier.create())
            .run_pickle(pickle, bus)
    }));
    let (result, failure) = match outcome {
        Ok(Ok(result)) => (result, None),
        Ok(Err(err)) => (
            TestResult::failed(started.elapsed(), format!("{err:#}")),
            Some(err),
        ),
        Err(payload) => {
            *slot = None;
            let err = anyhow::anyhow!("시나리오 실행 중 panic: {}", panic_message(&*payload));
            (
                TestResult::failed(started.elapsed(), err.to_string()),
                Some(err),
            )
        }
    };
    bus.publish(Event::ScenarioFinished {
        instant: bus.instant(),
        pickle: Arc::clone(pickle),
        result,
    });
    match failure {
        Some(err) => {
            tracing::error!(location = %pickle.location(), "시나리오 실행 중 예외 발생: {err:#}");
            Err(ScenarioError::new(pickle, err))
        }
        None => Ok(()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "알 수 없는 panic".to_string()
    }
}

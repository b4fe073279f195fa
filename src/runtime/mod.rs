mod exit_status;
mod glue;
mod runner;
mod scheduler;

pub use exit_status::{
    EXIT_DEFAULT, EXIT_ERRORS, ExitStatus, exit_status_for, least_severe, most_severe,
};
pub use glue::{Glue, GlueRunner, NoGlue, PendingException, StepBody, StepMatch};
pub use runner::{RunnerSupplier, ScenarioRunner};
pub use scheduler::{Concurrency, ExecutionScheduler, RunOutcome};

use crate::error::{ConfigError, RunError};
use crate::event::{CanonicalOrderEventPublisher, EventBus};
use crate::filter::Filters;
use crate::options::RuntimeOptions;
use crate::pickle::{Feature, Pickle};
use crate::plugin::{Plugin, Plugins};
use crate::result::Status;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type GlueFactory = Box<dyn Fn(bool) -> Box<dyn ScenarioRunner> + Send + Sync>;

/// 필터, 정렬, 스케줄러, 종료 코드 집계를 한데 묶은 실행 진입점이다.
pub struct Runtime {
    options: RuntimeOptions,
    bus: Arc<EventBus>,
    filters: Filters,
    scheduler: ExecutionScheduler,
    exit_status: Arc<ExitStatus>,
    canonical: Option<Arc<CanonicalOrderEventPublisher>>,
}

impl Runtime {
    /// 빌더를 생성한다.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// 이벤트 버스.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// 실행 설정.
    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// 순서 민감 리스너를 위한 정렬 발행자. 동시 실행이면서 해당 리스너가 있을 때만 존재한다.
    pub fn canonical_publisher(&self) -> Option<&Arc<CanonicalOrderEventPublisher>> {
        self.canonical.as_ref()
    }

    /// 필터를 통과한 Pickle을 정렬하고 개수 제한을 적용한 실행 목록을 만든다.
    pub fn select(&self, features: &[Feature]) -> Vec<Arc<Pickle>> {
        let matched: Vec<Arc<Pickle>> = features
            .iter()
            .flat_map(|feature| feature.pickles.iter())
            .filter(|pickle| self.filters.matches(pickle))
            .map(|pickle| Arc::new(pickle.clone()))
            .collect();
        let ordered = self.options.order.order(matched);
        self.filters.limit(ordered)
    }

    /// 취소 없이 전체 실행을 수행한다.
    pub async fn run(&self, features: &[Feature]) -> Result<(), RunError> {
        self.run_with_cancel(features, &CancellationToken::new())
            .await
    }

    /// 전체 실행을 수행한다. `cancel` 이 취소되면 [`RunError::Aborted`] 로 끝난다.
    pub async fn run_with_cancel(
        &self,
        features: &[Feature],
        cancel: &CancellationToken,
    ) -> Result<(), RunError> {
        let pickles = self.select(features);
        tracing::info!(
            selected = pickles.len(),
            order = %self.options.order,
            concurrency = ?self.scheduler.concurrency(),
            "시나리오 실행 시작"
        );
        let outcome = self.scheduler.run(features, pickles, cancel).await?;
        tracing::info!(errors = outcome.errors.len(), "시나리오 실행 종료");
        outcome.into_result()
    }

    /// 누적된 결과로 계산한 종료 코드.
    pub fn exit_status(&self) -> u8 {
        self.exit_status.exit_status()
    }

    /// 상태별 결과 집계.
    pub fn summary(&self) -> Vec<(Status, usize)> {
        self.exit_status.summary()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("options", &self.options)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

/// [`Runtime`] 구성 요소를 모아 검증한 뒤 생성한다.
#[derive(Default)]
pub struct RuntimeBuilder {
    options: RuntimeOptions,
    bus: Option<Arc<EventBus>>,
    supplier: Option<Arc<dyn RunnerSupplier>>,
    glue_factory: Option<GlueFactory>,
    plugins: Plugins,
}

impl RuntimeBuilder {
    /// 실행 설정을 지정한다.
    pub fn with_options(mut self, options: RuntimeOptions) -> Self {
        self.options = options;
        self
    }

    /// 외부에서 만든 버스를 사용한다.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// 실행 컨텍스트 공급자를 지정한다.
    pub fn with_runner_supplier(mut self, supplier: Arc<dyn RunnerSupplier>) -> Self {
        self.supplier = Some(supplier);
        self
    }

    /// 워커마다 `factory` 로 만든 Glue 를 [`GlueRunner`] 로 감싸 사용한다.
    ///
    /// dry-run 여부는 빌드 시점의 설정을 따른다.
    pub fn with_glue<G, F>(mut self, factory: F) -> Self
    where
        G: Glue + 'static,
        F: Fn() -> G + Send + Sync + 'static,
    {
        self.glue_factory = Some(Box::new(move |dry_run: bool| {
            Box::new(GlueRunner::new(factory(), dry_run)) as Box<dyn ScenarioRunner>
        }));
        self
    }

    /// 리스너를 추가한다.
    pub fn with_plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.add_plugin(plugin);
        self
    }

    /// 설정을 검증하고 리스너를 버스에 연결한다.
    pub fn build(self) -> Result<Runtime, ConfigError> {
        let RuntimeBuilder {
            options,
            bus,
            supplier,
            glue_factory,
            mut plugins,
        } = self;

        let threads = options.concurrency()?;
        let filters = Filters::new(&options)?;
        let supplier = match (supplier, glue_factory) {
            (Some(supplier), _) => supplier,
            (None, Some(factory)) => {
                let dry_run = options.dry_run;
                let supplier: Arc<dyn RunnerSupplier> =
                    Arc::new(move || -> Box<dyn ScenarioRunner> { factory(dry_run) });
                supplier
            }
            (None, None) => return Err(ConfigError::MissingRunnerSupplier),
        };
        let bus = bus.unwrap_or_default();

        let exit_status = Arc::new(ExitStatus::new(options.strict, options.wip));
        plugins.add_plugin(Plugin::Concurrent(exit_status.clone()));
        let canonical = if options.is_multi_threaded() {
            plugins.set_serial_event_bus_on_event_listener_plugins(&bus)
        } else {
            plugins.set_event_bus_on_event_listener_plugins(&bus);
            None
        };

        let scheduler =
            ExecutionScheduler::new(bus.clone(), supplier, Concurrency::from_threads(threads));
        tracing::debug!(?options, "Runtime 구성 완료");
        Ok(Runtime {
            options,
            bus,
            filters,
            scheduler,
            exit_status,
            canonical,
        })
    }
}

impl std::fmt::Debug for RuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeBuilder")
            .field("options", &self.options)
            .field("plugins", &self.plugins)
            .finish()
    }
}

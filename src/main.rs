use anyhow::Context;
use pickle_runtime::RunError;
use pickle_runtime::event::{Event, EventKind, EventPublisher};
use pickle_runtime::options::{RuntimeOptions, load_options_from_file};
use pickle_runtime::pickle::load_features_from_file;
use pickle_runtime::plugin::{EventListener, Plugin};
use pickle_runtime::runtime::{EXIT_ERRORS, NoGlue, Runtime};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Feature YAML 을 읽어 실행하고 집계된 종료 코드로 끝나는 진입점입니다.
fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    match run() {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::from(EXIT_ERRORS)
        }
    }
}

fn run() -> anyhow::Result<u8> {
    let mut args = std::env::args().skip(1);
    let features_path = args
        .next()
        .context("사용법: pickle-run <features.yaml> [options.yaml]")?;
    let options = match args.next() {
        Some(path) => load_options_from_file(Path::new(&path))
            .with_context(|| format!("설정 파일을 불러올 수 없습니다: {path}"))?,
        None => RuntimeOptions::default(),
    };
    let features = load_features_from_file(Path::new(&features_path))
        .with_context(|| format!("Feature 파일을 불러올 수 없습니다: {features_path}"))?;

    let runtime = Runtime::builder()
        .with_options(options)
        .with_glue(|| NoGlue)
        .with_plugin(Plugin::Serial(Arc::new(ProgressLogger)))
        .build()?;

    let executor = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("tokio 런타임을 만들 수 없습니다")?;
    let cancel = CancellationToken::new();
    let result = executor.block_on(async {
        let trigger = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("중단 요청을 받았습니다.");
                trigger.cancel();
            }
        });
        runtime.run_with_cancel(&features, &cancel).await
    });
    // 중단된 경우 아직 돌고 있는 워커를 기다리지 않는다.
    executor.shutdown_background();

    for (status, count) in runtime.summary() {
        tracing::info!("{status}: {count}");
    }
    let code = match result {
        Ok(()) => runtime.exit_status(),
        Err(RunError::Aborted) => RunError::Aborted.exit_code(),
        Err(err) => {
            for scenario in err.scenario_errors() {
                tracing::error!("{scenario}");
            }
            runtime.exit_status().max(err.exit_code())
        }
    };
    Ok(code)
}

/// 시나리오가 끝날 때마다 Feature 파일 순서로 결과를 기록한다.
struct ProgressLogger;

impl EventListener for ProgressLogger {
    fn set_event_publisher(&self, publisher: &dyn EventPublisher) {
        publisher.register_handler(
            EventKind::ScenarioFinished,
            Arc::new(|event: &Event| -> anyhow::Result<()> {
                if let Event::ScenarioFinished { pickle, result, .. } = event {
                    match &result.error {
                        Some(error) => tracing::info!(
                            "[{}] {} ({}) {error}",
                            result.status,
                            pickle.name,
                            pickle.location()
                        ),
                        None => tracing::info!(
                            "[{}] {} ({})",
                            result.status,
                            pickle.name,
                            pickle.location()
                        ),
                    }
                }
                Ok(())
            }),
        );
    }
}

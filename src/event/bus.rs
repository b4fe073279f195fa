use super::events::{Event, EventKind};
use parking_lot::ReentrantMutex;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

/// 이벤트 하나를 처리하는 콜백이다.
pub type EventHandler = Arc<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>;

/// 핸들러 등록 창구이다. 리스너는 이 트레이트만 본다.
pub trait EventPublisher: Send + Sync {
    /// `kind` 이벤트가 발행될 때 호출될 핸들러를 등록한다.
    fn register_handler(&self, kind: EventKind, handler: EventHandler);
}

/// 이벤트 종류별 핸들러 목록이다. 등록 순서를 보존한다.
#[derive(Default, Clone)]
pub(crate) struct HandlerRegistry {
    handlers: HashMap<EventKind, Vec<EventHandler>>,
}

impl HandlerRegistry {
    pub(crate) fn register(&mut self, kind: EventKind, handler: EventHandler) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    /// `kind` 에 등록된 핸들러의 사본.
    pub(crate) fn handlers(&self, kind: EventKind) -> Vec<EventHandler> {
        self.handlers.get(&kind).cloned().unwrap_or_default()
    }

    /// 등록된 핸들러를 순서대로 호출한다.
    pub(crate) fn dispatch(&self, event: &Event) {
        if let Some(handlers) = self.handlers.get(&event.kind()) {
            notify(handlers, event);
        }
    }

    fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }
}

/// 핸들러를 순서대로 호출한다. 실패한 핸들러는 기록만 하고 넘어간다.
pub(crate) fn notify(handlers: &[EventHandler], event: &Event) {
    for (position, handler) in handlers.iter().enumerate() {
        match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(kind = ?event.kind(), position, "이벤트 핸들러 실패: {err:#}");
            }
            Err(_) => {
                tracing::warn!(kind = ?event.kind(), position, "이벤트 핸들러가 panic 했습니다.");
            }
        }
    }
}

/// 실행 동안 메모리 안에서만 동작하는 동기식 발행/구독 버스이다.
///
/// `publish` 는 해당 종류의 모든 핸들러가 끝난 뒤 반환한다. 서로 다른 스레드의
/// 발행은 상호 배제되어 디스패치 도중 섞이지 않고, 같은 스레드의 핸들러는
/// 디스패치 도중에 다시 발행하거나 핸들러를 등록할 수 있다. 시나리오 간 순서는
/// 보장하지 않으며, 필요한 구독자는 [`CanonicalOrderEventPublisher`] 뒤에 둔다.
///
/// [`CanonicalOrderEventPublisher`]: super::CanonicalOrderEventPublisher
#[derive(Default)]
pub struct EventBus {
    dispatch: ReentrantMutex<()>,
    registry: Mutex<HandlerRegistry>,
}

impl EventBus {
    /// 빈 버스를 생성한다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 이벤트 타임스탬프에 쓰일 현재 시각.
    pub fn instant(&self) -> SystemTime {
        SystemTime::now()
    }

    /// 이벤트를 동기적으로 디스패치한다.
    pub fn publish(&self, event: Event) {
        let _serial = self.dispatch.lock();
        // 핸들러 호출 중에는 등록부 잠금을 잡지 않는다.
        let handlers = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers(event.kind());
        notify(&handlers, &event);
    }
}

impl EventPublisher for EventBus {
    fn register_handler(&self, kind: EventKind, handler: EventHandler) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .register(kind, handler);
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self
            .registry
            .lock()
            .map(|registry| registry.len())
            .unwrap_or_default();
        f.debug_struct("EventBus")
            .field("handlers", &handlers)
            .finish()
    }
}

use crate::event::{CanonicalOrderEventPublisher, EventBus, EventPublisher};
use std::sync::Arc;

/// 단일 스레드, Feature 파일 순서를 가정하는 리스너이다.
///
/// 동시 실행에서는 [`CanonicalOrderEventPublisher`] 뒤에 연결된다.
pub trait EventListener: Send + Sync {
    /// 필요한 이벤트 핸들러를 등록한다.
    fn set_event_publisher(&self, publisher: &dyn EventPublisher);
}

/// 어떤 순서로든 이벤트를 받아도 되는 리스너이다. 항상 버스에 직접 연결된다.
pub trait ConcurrentEventListener: Send + Sync {
    /// 필요한 이벤트 핸들러를 등록한다.
    fn set_event_publisher(&self, publisher: &dyn EventPublisher);
}

/// 등록된 리스너 하나.
#[derive(Clone)]
pub enum Plugin {
    /// 순서 민감 리스너.
    Serial(Arc<dyn EventListener>),
    /// 순서 무관 리스너.
    Concurrent(Arc<dyn ConcurrentEventListener>),
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Plugin::Serial(_) => f.write_str("Plugin::Serial"),
            Plugin::Concurrent(_) => f.write_str("Plugin::Concurrent"),
        }
    }
}

/// 리스너 목록과 버스 연결 방식을 관리한다.
#[derive(Debug, Default)]
pub struct Plugins {
    plugins: Vec<Plugin>,
}

impl Plugins {
    /// 빈 목록을 생성한다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 리스너를 추가한다.
    pub fn add_plugin(&mut self, plugin: Plugin) {
        self.plugins.push(plugin);
    }

    /// 모든 리스너를 버스에 직접 연결한다.
    pub fn set_event_bus_on_event_listener_plugins(&self, bus: &EventBus) {
        for plugin in &self.plugins {
            match plugin {
                Plugin::Serial(listener) => listener.set_event_publisher(bus),
                Plugin::Concurrent(listener) => listener.set_event_publisher(bus),
            }
        }
    }

    /// 순서 민감 리스너는 정렬 발행자 뒤에, 나머지는 버스에 직접 연결한다.
    ///
    /// 정렬 발행자는 순서 민감 리스너가 있을 때만 만들어진다.
    pub fn set_serial_event_bus_on_event_listener_plugins(
        &self,
        bus: &EventBus,
    ) -> Option<Arc<CanonicalOrderEventPublisher>> {
        let mut canonical: Option<Arc<CanonicalOrderEventPublisher>> = None;
        for plugin in &self.plugins {
            match plugin {
                Plugin::Serial(listener) => {
                    let publisher = canonical.get_or_insert_with(|| {
                        let publisher = Arc::new(CanonicalOrderEventPublisher::new());
                        publisher.attach(bus);
                        publisher
                    });
                    listener.set_event_publisher(&**publisher);
                }
                Plugin::Concurrent(listener) => listener.set_event_publisher(bus),
            }
        }
        canonical
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, EventKind};
    use crate::pickle::Pickle;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StartedRecorder {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl StartedRecorder {
        fn register(&self, publisher: &dyn EventPublisher) {
            let seen = self.seen.clone();
            publisher.register_handler(
                EventKind::ScenarioStarted,
                Arc::new(move |event: &Event| -> anyhow::Result<()> {
                    if let Some(pickle) = event.pickle() {
                        seen.lock().expect("잠금 실패").push(pickle.location());
                    }
                    Ok(())
                }),
            );
        }
    }

    impl EventListener for StartedRecorder {
        fn set_event_publisher(&self, publisher: &dyn EventPublisher) {
            self.register(publisher);
        }
    }

    struct ConcurrentRecorder(StartedRecorder);

    impl ConcurrentEventListener for ConcurrentRecorder {
        fn set_event_publisher(&self, publisher: &dyn EventPublisher) {
            self.0.register(publisher);
        }
    }

    fn publish_out_of_order(bus: &EventBus) {
        bus.publish(Event::RunStarted {
            instant: bus.instant(),
        });
        for (uri, line) in [("b.feature", 1), ("a.feature", 5), ("a.feature", 1)] {
            bus.publish(Event::ScenarioStarted {
                instant: bus.instant(),
                pickle: Arc::new(Pickle::new(uri, line, "")),
            });
        }
        bus.publish(Event::RunFinished {
            instant: bus.instant(),
        });
    }

    #[test]
    fn serial_listeners_see_canonical_order_and_concurrent_see_arrival_order() {
        let serial = Arc::new(StartedRecorder::default());
        let concurrent = Arc::new(ConcurrentRecorder(StartedRecorder::default()));
        let mut plugins = Plugins::new();
        plugins.add_plugin(Plugin::Serial(serial.clone()));
        plugins.add_plugin(Plugin::Concurrent(concurrent.clone()));

        let bus = EventBus::new();
        let canonical = plugins.set_serial_event_bus_on_event_listener_plugins(&bus);
        assert!(canonical.is_some());
        publish_out_of_order(&bus);

        assert_eq!(
            vec!["a.feature:1", "a.feature:5", "b.feature:1"],
            *serial.seen.lock().expect("잠금 실패")
        );
        assert_eq!(
            vec!["b.feature:1", "a.feature:5", "a.feature:1"],
            *concurrent.0.seen.lock().expect("잠금 실패")
        );
    }

    #[test]
    fn direct_wiring_keeps_arrival_order() {
        let serial = Arc::new(StartedRecorder::default());
        let mut plugins = Plugins::new();
        plugins.add_plugin(Plugin::Serial(serial.clone()));
        let bus = EventBus::new();
        plugins.set_event_bus_on_event_listener_plugins(&bus);
        publish_out_of_order(&bus);
        assert_eq!(
            vec!["b.feature:1", "a.feature:5", "a.feature:1"],
            *serial.seen.lock().expect("잠금 실패")
        );
    }
}

use super::bus::{EventBus, EventHandler, EventPublisher, HandlerRegistry};
use super::events::{Event, EventKind};
use std::cmp::Ordering;
use std::sync::{Arc, Mutex, PoisonError};

/// 동시 실행에서 뒤섞인 이벤트를 Feature 파일 순서로 되돌리는 전순서 비교 함수이다.
///
/// RunStarted < SourceRead < SnippetsSuggested < 시나리오 이벤트 < RunFinished.
/// 시나리오 이벤트끼리는 `(uri, line)` 으로 비교하고, 같은 시나리오 안에서는
/// Started, Step 이벤트(인덱스순, 시작이 먼저), Finished 순이다.
pub fn canonical_order(a: &Event, b: &Event) -> Ordering {
    let (rank_a, rank_b) = (rank(a), rank(b));
    if rank_a != rank_b {
        return rank_a.cmp(&rank_b);
    }
    match (a.pickle(), b.pickle()) {
        (Some(left), Some(right)) => left.cmp(right).then_with(|| phase(a).cmp(&phase(b))),
        _ => Ordering::Equal,
    }
}

fn rank(event: &Event) -> u8 {
    match event.kind() {
        EventKind::RunStarted => 0,
        EventKind::SourceRead => 1,
        EventKind::SnippetsSuggested => 2,
        EventKind::ScenarioStarted
        | EventKind::StepStarted
        | EventKind::StepFinished
        | EventKind::ScenarioFinished => 3,
        EventKind::RunFinished => 4,
    }
}

/// 같은 시나리오 안에서의 위치.
fn phase(event: &Event) -> (u8, usize, u8) {
    match event {
        Event::ScenarioStarted { .. } => (0, 0, 0),
        Event::StepStarted { index, .. } => (1, *index, 0),
        Event::StepFinished { index, .. } => (1, *index, 1),
        _ => (2, 0, 0),
    }
}

/// 버스의 모든 이벤트를 모아 두었다가 RunFinished 시점에 정렬해 재발행한다.
///
/// 단일 스레드를 가정하는 리스너는 이 발행자에 핸들러를 등록한다.
#[derive(Default)]
pub struct CanonicalOrderEventPublisher {
    queue: Mutex<Vec<Event>>,
    registry: Mutex<HandlerRegistry>,
}

impl CanonicalOrderEventPublisher {
    /// 빈 발행자를 생성한다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 버스의 모든 이벤트 종류를 구독한다.
    pub fn attach(self: &Arc<Self>, bus: &EventBus) {
        for kind in EventKind::ALL {
            let publisher = Arc::clone(self);
            bus.register_handler(
                kind,
                Arc::new(move |event: &Event| -> anyhow::Result<()> {
                    publisher.handle(event);
                    Ok(())
                }),
            );
        }
    }

    /// 이벤트를 버퍼에 넣고, RunFinished 라면 정렬된 순서로 흘려보낸다.
    pub fn handle(&self, event: &Event) {
        let drained = {
            let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            queue.push(event.clone());
            if event.kind() != EventKind::RunFinished {
                return;
            }
            std::mem::take(&mut *queue)
        };
        let mut ordered = drained;
        // 안정 정렬이므로 같은 키의 이벤트는 도착 순서를 유지한다.
        ordered.sort_by(canonical_order);
        // 핸들러 호출 중에는 등록부 잠금을 잡지 않는다.
        let registry = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for event in &ordered {
            registry.dispatch(event);
        }
    }
}

impl EventPublisher for CanonicalOrderEventPublisher {
    fn register_handler(&self, kind: EventKind, handler: EventHandler) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .register(kind, handler);
    }
}

impl std::fmt::Debug for CanonicalOrderEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let buffered = self
            .queue
            .lock()
            .map(|queue| queue.len())
            .unwrap_or_default();
        f.debug_struct("CanonicalOrderEventPublisher")
            .field("buffered", &buffered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pickle::Pickle;
    use crate::result::{Status, TestResult};
    use std::time::{Duration, SystemTime};

    fn now() -> SystemTime {
        SystemTime::now()
    }

    fn started(uri: &str, line: u32) -> Event {
        Event::ScenarioStarted {
            instant: now(),
            pickle: Arc::new(Pickle::new(uri, line, "")),
        }
    }

    fn finished(uri: &str, line: u32) -> Event {
        Event::ScenarioFinished {
            instant: now(),
            pickle: Arc::new(Pickle::new(uri, line, "")),
            result: TestResult::new(Status::Passed, Duration::ZERO),
        }
    }

    fn step(uri: &str, line: u32, index: usize, done: bool) -> Event {
        let pickle = Arc::new(Pickle::new(uri, line, ""));
        if done {
            Event::StepFinished {
                instant: now(),
                pickle,
                index,
                result: TestResult::new(Status::Passed, Duration::ZERO),
            }
        } else {
            Event::StepStarted {
                instant: now(),
                pickle,
                index,
            }
        }
    }

    /// 오름차순으로 나열된 이벤트 목록.
    fn ascending() -> Vec<Event> {
        vec![
            Event::RunStarted { instant: now() },
            Event::SourceRead {
                instant: now(),
                uri: "uri".into(),
                source: "source".into(),
            },
            Event::SnippetsSuggested {
                instant: now(),
                uri: "uri".into(),
                step_lines: Vec::new(),
                snippets: Vec::new(),
            },
            started("feature1", 1),
            step("feature1", 1, 0, false),
            step("feature1", 1, 0, true),
            step("feature1", 1, 1, false),
            step("feature1", 1, 1, true),
            finished("feature1", 1),
            started("feature1", 9),
            finished("feature1", 9),
            started("feature1", 11),
            started("feature2", 1),
            Event::RunFinished { instant: now() },
        ]
    }

    #[test]
    fn every_pair_compares_by_position() {
        let events = ascending();
        for (i, a) in events.iter().enumerate() {
            for (j, b) in events.iter().enumerate() {
                assert_eq!(
                    i.cmp(&j),
                    canonical_order(a, b),
                    "{:?} vs {:?}",
                    a.kind(),
                    b.kind()
                );
            }
        }
    }

    #[test]
    fn same_kind_without_scenario_compares_equal() {
        let a = Event::SourceRead {
            instant: now(),
            uri: "b".into(),
            source: String::new(),
        };
        let b = Event::SourceRead {
            instant: now(),
            uri: "a".into(),
            source: String::new(),
        };
        assert_eq!(Ordering::Equal, canonical_order(&a, &b));
        assert_eq!(
            Ordering::Less,
            canonical_order(
                &Event::RunStarted { instant: now() },
                &Event::RunFinished { instant: now() }
            )
        );
    }

    #[test]
    fn publisher_replays_buffer_in_canonical_order_on_run_finished() {
        let bus = EventBus::new();
        let publisher = Arc::new(CanonicalOrderEventPublisher::new());
        publisher.attach(&bus);
        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in EventKind::ALL {
            let seen = seen.clone();
            publisher.register_handler(
                kind,
                Arc::new(move |event: &Event| -> anyhow::Result<()> {
                    let label = match event.pickle() {
                        Some(p) => format!("{:?}@{}", event.kind(), p.location()),
                        None => format!("{:?}", event.kind()),
                    };
                    seen.lock().expect("잠금 실패").push(label);
                    Ok(())
                }),
            );
        }

        bus.publish(Event::RunStarted { instant: now() });
        bus.publish(started("b.feature", 4));
        bus.publish(started("a.feature", 2));
        bus.publish(finished("a.feature", 2));
        bus.publish(Event::SourceRead {
            instant: now(),
            uri: "a.feature".into(),
            source: String::new(),
        });
        bus.publish(finished("b.feature", 4));
        assert!(seen.lock().expect("잠금 실패").is_empty());

        bus.publish(Event::RunFinished { instant: now() });

        assert_eq!(
            vec![
                "RunStarted",
                "SourceRead",
                "ScenarioStarted@a.feature:2",
                "ScenarioFinished@a.feature:2",
                "ScenarioStarted@b.feature:4",
                "ScenarioFinished@b.feature:4",
                "RunFinished",
            ],
            *seen.lock().expect("잠금 실패")
        );
    }

    #[test]
    fn replayed_handlers_may_reenter_the_bus_and_publisher() {
        let bus = Arc::new(EventBus::new());
        let publisher = Arc::new(CanonicalOrderEventPublisher::new());
        publisher.attach(&bus);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (weak_bus, weak_publisher) = (Arc::downgrade(&bus), Arc::downgrade(&publisher));
        let sink = seen.clone();
        publisher.register_handler(
            EventKind::ScenarioStarted,
            Arc::new(move |event: &Event| -> anyhow::Result<()> {
                if let (Some(bus), Some(publisher)) =
                    (weak_bus.upgrade(), weak_publisher.upgrade())
                {
                    let late = sink.clone();
                    publisher.register_handler(
                        EventKind::RunStarted,
                        Arc::new(move |_: &Event| -> anyhow::Result<()> {
                            late.lock().expect("잠금 실패").push("late".to_string());
                            Ok(())
                        }),
                    );
                    bus.publish(Event::SourceRead {
                        instant: bus.instant(),
                        uri: "a.feature".into(),
                        source: String::new(),
                    });
                }
                if let Some(pickle) = event.pickle() {
                    sink.lock().expect("잠금 실패").push(pickle.location());
                }
                Ok(())
            }),
        );

        bus.publish(Event::RunStarted { instant: now() });
        bus.publish(started("a.feature", 1));
        bus.publish(Event::RunFinished { instant: now() });

        assert_eq!(vec!["a.feature:1"], *seen.lock().expect("잠금 실패"));
    }
}

use crate::error::ConfigError;
use crate::pickle::Pickle;
use once_cell::sync::Lazy;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// 필터링된 시나리오 목록의 실행 순서를 결정하는 전략이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PickleOrder {
    /// 선언 순서 그대로.
    Declaration,
    /// `(uri, line)` 사전순.
    Lexical,
    /// 사전순의 역순.
    Reverse,
    /// 시드 기반의 재현 가능한 무작위 순서.
    Random {
        /// 셔플 시드.
        seed: u64,
    },
}

impl PickleOrder {
    /// 같은 원소 집합의 순열을 반환한다.
    ///
    /// 결과는 입력, 전략, 시드에만 의존한다.
    pub fn order<T: Borrow<Pickle>>(&self, mut pickles: Vec<T>) -> Vec<T> {
        match self {
            PickleOrder::Declaration => {}
            PickleOrder::Lexical => sort_lexically(&mut pickles),
            PickleOrder::Reverse => {
                sort_lexically(&mut pickles);
                pickles.reverse();
            }
            PickleOrder::Random { seed } => {
                // 입력 순서와 무관하게 같은 집합이면 같은 순열이 나오도록 먼저 정렬한다.
                sort_lexically(&mut pickles);
                let mut rng = StdRng::seed_from_u64(*seed);
                pickles.shuffle(&mut rng);
            }
        }
        pickles
    }
}

fn sort_lexically<T: Borrow<Pickle>>(pickles: &mut [T]) {
    pickles.sort_by(|a, b| a.borrow().cmp(b.borrow()));
}

impl FromStr for PickleOrder {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        static RANDOM: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^random(?::(\d+))?$").expect("정규식 컴파일 실패"));
        match s.trim() {
            "declaration" | "none" => return Ok(PickleOrder::Declaration),
            "lexical" => return Ok(PickleOrder::Lexical),
            "reverse" => return Ok(PickleOrder::Reverse),
            _ => {}
        }
        let caps = RANDOM
            .captures(s.trim())
            .ok_or_else(|| ConfigError::UnknownOrder(s.to_string()))?;
        let seed = match caps.get(1) {
            Some(seed) => seed
                .as_str()
                .parse::<u64>()
                .map_err(|_| ConfigError::UnknownOrder(s.to_string()))?,
            None => {
                let seed = rand::random::<u64>();
                tracing::info!(seed, "무작위 정렬 시드를 생성했습니다. 재현하려면 random:{seed} 를 사용하세요.");
                seed
            }
        };
        Ok(PickleOrder::Random { seed })
    }
}

impl TryFrom<String> for PickleOrder {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PickleOrder> for String {
    fn from(order: PickleOrder) -> Self {
        order.to_string()
    }
}

impl fmt::Display for PickleOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PickleOrder::Declaration => f.write_str("declaration"),
            PickleOrder::Lexical => f.write_str("lexical"),
            PickleOrder::Reverse => f.write_str("reverse"),
            PickleOrder::Random { seed } => write!(f, "random:{seed}"),
        }
    }
}

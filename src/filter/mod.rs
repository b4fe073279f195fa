mod predicates;
mod tag_expression;

pub use predicates::{LinePredicate, NamePredicate, PicklePredicate, TagPredicate};
pub use tag_expression::{TagExpression, TagExpressionError};

use crate::error::ConfigError;
use crate::options::RuntimeOptions;
use crate::pickle::Pickle;
use regex::Regex;

/// 설정된 술어를 AND로 결합한 필터와 실행 개수 제한기이다.
#[derive(Debug)]
pub struct Filters {
    /// 설정이 존재하는 술어만 담긴다.
    predicates: Vec<Box<dyn PicklePredicate>>,
    /// 최대 실행 개수. 1 미만이면 제한하지 않는다.
    limit: usize,
}

impl Filters {
    /// 설정으로부터 필터를 구성한다. 표현식이나 패턴 오류는 여기서 드러난다.
    pub fn new(options: &RuntimeOptions) -> Result<Self, ConfigError> {
        let mut predicates: Vec<Box<dyn PicklePredicate>> = Vec::new();
        if !options.tag_expressions.is_empty() {
            let expressions = options
                .tag_expressions
                .iter()
                .map(|raw| TagExpression::parse(raw))
                .collect::<Result<Vec<_>, _>>()?;
            predicates.push(Box::new(TagPredicate::new(expressions)));
        }
        if !options.name_filters.is_empty() {
            let patterns = options
                .name_filters
                .iter()
                .map(|raw| {
                    Regex::new(raw).map_err(|source| ConfigError::NamePattern {
                        pattern: raw.clone(),
                        source,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            predicates.push(Box::new(NamePredicate::new(patterns)));
        }
        if !options.line_filters.is_empty() {
            predicates.push(Box::new(LinePredicate::new(options.line_filters.clone())));
        }
        Ok(Self {
            predicates,
            limit: options.limit,
        })
    }

    /// 모든 술어를 통과하는지 판정한다.
    pub fn matches(&self, pickle: &Pickle) -> bool {
        self.predicates.iter().all(|predicate| predicate.test(pickle))
    }

    /// 정렬이 끝난 목록에서 앞쪽 `limit` 개만 남긴다.
    pub fn limit<T>(&self, mut pickles: Vec<T>) -> Vec<T> {
        if self.limit >= 1 && self.limit < pickles.len() {
            pickles.truncate(self.limit);
        }
        pickles
    }
}

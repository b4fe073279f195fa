use super::tag_expression::TagExpression;
use crate::pickle::Pickle;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

/// Pickle 하나를 통과시킬지 판정하는 순수 함수이다.
pub trait PicklePredicate: Debug + Send + Sync {
    /// 통과 여부를 반환한다.
    fn test(&self, pickle: &Pickle) -> bool;
}

/// 설정된 모든 태그 표현식을 만족해야 통과한다.
#[derive(Debug, Clone)]
pub struct TagPredicate {
    expressions: Vec<TagExpression>,
}

impl TagPredicate {
    /// 파싱된 표현식 목록으로 생성한다.
    pub fn new(expressions: Vec<TagExpression>) -> Self {
        Self { expressions }
    }
}

impl PicklePredicate for TagPredicate {
    fn test(&self, pickle: &Pickle) -> bool {
        self.expressions
            .iter()
            .all(|expression| expression.evaluate(&pickle.tags))
    }
}

/// 이름 패턴 중 하나라도 시나리오 이름에서 발견되면 통과한다.
#[derive(Debug, Clone)]
pub struct NamePredicate {
    patterns: Vec<Regex>,
}

impl NamePredicate {
    /// 컴파일된 정규식 목록으로 생성한다.
    pub fn new(patterns: Vec<Regex>) -> Self {
        Self { patterns }
    }
}

impl PicklePredicate for NamePredicate {
    fn test(&self, pickle: &Pickle) -> bool {
        self.patterns
            .iter()
            .any(|pattern| pattern.is_match(&pickle.name))
    }
}

/// URI별 허용 라인 집합에 걸리는 시나리오만 통과시킨다.
///
/// 맵에 없는 URI의 시나리오는 그대로 통과한다.
#[derive(Debug, Clone)]
pub struct LinePredicate {
    lines: BTreeMap<String, BTreeSet<u32>>,
}

impl LinePredicate {
    /// URI → 라인 집합 맵으로 생성한다.
    pub fn new(lines: BTreeMap<String, BTreeSet<u32>>) -> Self {
        Self { lines }
    }
}

impl PicklePredicate for LinePredicate {
    fn test(&self, pickle: &Pickle) -> bool {
        match self.lines.get(&pickle.uri) {
            Some(accepted) => pickle.lines().any(|line| accepted.contains(&line)),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_predicate_requires_every_expression() {
        let predicate = TagPredicate::new(vec![
            TagExpression::parse("@a or @b").expect("파싱 실패"),
            TagExpression::parse("not @wip").expect("파싱 실패"),
        ]);
        assert!(predicate.test(&Pickle::new("f", 1, "").with_tags(["@b"])));
        assert!(!predicate.test(&Pickle::new("f", 1, "").with_tags(["@b", "@wip"])));
        assert!(!predicate.test(&Pickle::new("f", 1, "")));
    }

    #[test]
    fn name_predicate_matches_any_pattern_anywhere_in_name() {
        let predicate = NamePredicate::new(vec![
            Regex::new("^Eat").expect("정규식"),
            Regex::new("belly").expect("정규식"),
        ]);
        assert!(predicate.test(&Pickle::new("f", 1, "Eating cukes")));
        assert!(predicate.test(&Pickle::new("f", 1, "a full belly")));
        assert!(!predicate.test(&Pickle::new("f", 1, "Drinking")));
    }

    #[test]
    fn line_predicate_passes_unlisted_uris() {
        let mut lines = BTreeMap::new();
        lines.insert("a.feature".to_string(), BTreeSet::from([3, 12]));
        let predicate = LinePredicate::new(lines);

        assert!(predicate.test(&Pickle::new("a.feature", 3, "")));
        assert!(!predicate.test(&Pickle::new("a.feature", 7, "")));
        assert!(predicate.test(&Pickle::new("b.feature", 7, "")));

        let mut row = Pickle::new("a.feature", 14, "");
        row.locations.push(12);
        assert!(predicate.test(&row));
    }
}

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::path::Path;

/// Pickle을 구성하는 단일 Step 문장이다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickleStep {
    /// Step 본문 문장.
    pub text: String,
    /// 소스 파일 내 라인 번호.
    #[serde(default)]
    pub line: u32,
}

/// 완전히 해석된 실행 단위 시나리오이다.
///
/// 식별자는 `(uri, line)` 쌍이며 비교/해시도 이 쌍만 사용한다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pickle {
    /// 소속 Feature의 URI. YAML 로더가 채운다.
    #[serde(default)]
    pub uri: String,
    /// 시나리오 시작 라인.
    pub line: u32,
    /// 표시 이름.
    pub name: String,
    /// 태그 목록 (`@` 포함).
    #[serde(default)]
    pub tags: Vec<String>,
    /// 실행할 Step 목록.
    #[serde(default)]
    pub steps: Vec<PickleStep>,
    /// 라인 필터가 추가로 인정하는 위치 (예: Examples 행).
    #[serde(default)]
    pub locations: Vec<u32>,
}

impl Pickle {
    /// 최소 필드로 Pickle을 생성한다.
    pub fn new(uri: impl Into<String>, line: u32, name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            line,
            name: name.into(),
            tags: Vec::new(),
            steps: Vec::new(),
            locations: Vec::new(),
        }
    }

    /// 태그를 덧붙인 사본을 반환한다.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Step을 덧붙인 사본을 반환한다.
    pub fn with_step(mut self, line: u32, text: impl Into<String>) -> Self {
        self.steps.push(PickleStep {
            text: text.into(),
            line,
        });
        self
    }

    /// `uri:line` 형태의 위치 문자열.
    pub fn location(&self) -> String {
        format!("{}:{}", self.uri, self.line)
    }

    /// 라인 필터 판정에 쓰이는 모든 라인을 순회한다.
    pub fn lines(&self) -> impl Iterator<Item = u32> + '_ {
        std::iter::once(self.line).chain(self.locations.iter().copied())
    }
}

impl PartialEq for Pickle {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri && self.line == other.line
    }
}

impl Eq for Pickle {}

impl Hash for Pickle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uri.hash(state);
        self.line.hash(state);
    }
}

impl PartialOrd for Pickle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pickle {
    /// URI 사전순, 같으면 라인 오름차순.
    fn cmp(&self, other: &Self) -> Ordering {
        self.uri
            .cmp(&other.uri)
            .then_with(|| self.line.cmp(&other.line))
    }
}

/// 하나의 Feature 소스와 그로부터 파생된 Pickle 목록이다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    /// 소스 URI.
    pub uri: String,
    /// SourceRead 이벤트에 실리는 원문.
    #[serde(default)]
    pub source: String,
    /// 선언 순서대로의 Pickle 목록.
    #[serde(default)]
    pub pickles: Vec<Pickle>,
}

impl Feature {
    /// 비어 있는 Feature를 생성한다.
    pub fn new(uri: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            source: source.into(),
            pickles: Vec::new(),
        }
    }

    /// Pickle을 추가하면서 URI를 Feature 기준으로 맞춘다.
    pub fn with_pickle(mut self, mut pickle: Pickle) -> Self {
        pickle.uri = self.uri.clone();
        self.pickles.push(pickle);
        self
    }

    fn stamp_uri(&mut self) {
        for pickle in &mut self.pickles {
            pickle.uri = self.uri.clone();
        }
    }
}

/// YAML 파일을 읽어 Feature 목록으로 역직렬화한다.
pub fn load_features_from_file(path: &Path) -> anyhow::Result<Vec<Feature>> {
    let mut file = File::open(path)?;
    load_features_from_reader(&mut file)
}

/// Reader에서 YAML을 읽어 Feature 목록으로 파싱한다.
pub fn load_features_from_reader<R: Read>(reader: &mut R) -> anyhow::Result<Vec<Feature>> {
    let mut buf = String::new();
    reader.read_to_string(&mut buf)?;
    let mut features: Vec<Feature> = serde_yaml::from_str(&buf)?;
    for feature in &mut features {
        feature.stamp_uri();
    }
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_ignores_everything_but_uri_and_line() {
        let a = Pickle::new("a.feature", 3, "first").with_tags(["@x"]);
        let b = Pickle::new("a.feature", 3, "renamed");
        assert_eq!(a, b);
        assert!(Pickle::new("a.feature", 9, "") < Pickle::new("b.feature", 1, ""));
        assert!(Pickle::new("a.feature", 2, "") < Pickle::new("a.feature", 10, ""));
    }

    /// 로더가 Feature URI를 하위 Pickle에 복사하는지 확인한다.
    #[test]
    fn loader_stamps_feature_uri_on_pickles() {
        let yaml = r#"
- uri: features/belly.feature
  source: "Feature: Belly"
  pickles:
    - name: a few cukes
      line: 3
      tags: ["@smoke"]
      steps:
        - text: I have 42 cukes in my belly
          line: 4
    - name: outline row
      line: 12
      locations: [9]
"#;
        let features = load_features_from_reader(&mut yaml.as_bytes()).expect("YAML 파싱 실패");
        assert_eq!(1, features.len());
        let pickles = &features[0].pickles;
        assert_eq!("features/belly.feature", pickles[0].uri);
        assert_eq!("features/belly.feature:12", pickles[1].location());
        assert_eq!(vec![12, 9], pickles[1].lines().collect::<Vec<_>>());
        assert_eq!("I have 42 cukes in my belly", pickles[0].steps[0].text);
    }
}

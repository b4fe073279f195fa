use crate::error::ConfigError;
use crate::order::PickleOrder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Read;
use std::num::NonZeroUsize;
use std::path::Path;

/// 한 번의 실행에 사용되는 읽기 전용 설정이다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeOptions {
    /// 동시 실행 워커 수. 1이면 단일 스레드로 실행한다.
    pub threads: usize,
    /// Pending/Undefined 를 실패로 간주할지 여부.
    pub strict: bool,
    /// 통과한 시나리오가 있으면 실패로 보는 wip 모드.
    pub wip: bool,
    /// Step 본문을 실행하지 않고 모두 Skipped 처리한다.
    pub dry_run: bool,
    /// 시나리오 정렬 전략.
    pub order: PickleOrder,
    /// 실행할 최대 시나리오 수. 0이면 제한 없음.
    pub limit: usize,
    /// 모두 만족해야 하는 태그 표현식 목록.
    pub tag_expressions: Vec<String>,
    /// 시나리오 이름 정규식 목록.
    pub name_filters: Vec<String>,
    /// URI별 허용 라인.
    pub line_filters: BTreeMap<String, BTreeSet<u32>>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            strict: false,
            wip: false,
            dry_run: false,
            order: PickleOrder::Declaration,
            limit: 0,
            tag_expressions: Vec::new(),
            name_filters: Vec::new(),
            line_filters: BTreeMap::new(),
        }
    }
}

impl RuntimeOptions {
    /// 워커가 둘 이상인지 여부.
    pub fn is_multi_threaded(&self) -> bool {
        self.threads > 1
    }

    /// 검증된 워커 수를 반환한다.
    pub fn concurrency(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.threads).ok_or(ConfigError::ZeroThreads)
    }

    /// `path/to.feature:3:7` 표기를 해석해 라인 필터에 합친다.
    ///
    /// 라인이 없는 경로는 필터에 영향을 주지 않는다.
    pub fn add_feature_with_lines(&mut self, raw: &str) -> Result<(), ConfigError> {
        let (uri, lines) = parse_feature_with_lines(raw)?;
        if !lines.is_empty() {
            self.line_filters.entry(uri).or_default().extend(lines);
        }
        Ok(())
    }
}

/// `uri:line:line...` 문자열을 URI와 라인 집합으로 나눈다.
pub fn parse_feature_with_lines(raw: &str) -> Result<(String, BTreeSet<u32>), ConfigError> {
    let mut parts: Vec<&str> = raw.split(':').collect();
    let mut lines = BTreeSet::new();
    // 뒤에서부터 숫자 세그먼트만 라인으로 본다. `C:\..` 같은 경로 구분자는 그대로 둔다.
    while parts.len() > 1 {
        let Some(last) = parts.last() else { break };
        if last.is_empty() || !last.chars().all(|c| c.is_ascii_digit()) {
            break;
        }
        let line = last
            .parse::<u32>()
            .map_err(|_| ConfigError::FeatureLine(raw.to_string()))?;
        lines.insert(line);
        parts.pop();
    }
    Ok((parts.join(":"), lines))
}

/// YAML 파일을 읽어 RuntimeOptions로 역직렬화한다.
pub fn load_options_from_file(path: &Path) -> Result<RuntimeOptions, ConfigError> {
    let mut file = File::open(path)?;
    load_options_from_reader(&mut file)
}

/// Reader에서 YAML을 읽어 RuntimeOptions로 파싱한다.
pub fn load_options_from_reader<R: Read>(reader: &mut R) -> Result<RuntimeOptions, ConfigError> {
    let mut buf = String::new();
    reader.read_to_string(&mut buf)?;
    if buf.trim().is_empty() {
        return Ok(RuntimeOptions::default());
    }
    let options: RuntimeOptions = serde_yaml::from_str(&buf)?;
    options.concurrency()?;
    Ok(options)
}

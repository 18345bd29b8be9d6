//! 扫描目标来源
//!
//! 验证模式直接使用给定的完整域名；生成模式把字典中的每个词与每个主域名拼接。

use itertools::Itertools;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::SetupError;
use crate::model::QueryRecord;
use crate::state::RunState;
use crate::subdata;
use crate::util::chose_dns;

/// 字典或域名列表的来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSource {
    Names(Vec<String>),
    File(PathBuf),
    Stdin,
    BuiltIn,
}

/// 每行去掉首尾空白，跳过空行
fn read_lines<R: BufRead>(reader: R) -> io::Result<Vec<String>> {
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    Ok(lines)
}

impl TargetSource {
    pub fn load(&self) -> Result<Vec<String>, SetupError> {
        match self {
            TargetSource::Names(names) => Ok(names
                .iter()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect()),
            TargetSource::File(path) => {
                let input_err = |source| SetupError::Input {
                    path: path.display().to_string(),
                    source,
                };
                let file = File::open(path).map_err(input_err)?;
                read_lines(BufReader::new(file)).map_err(input_err)
            }
            TargetSource::Stdin => read_lines(io::stdin().lock()).map_err(|source| SetupError::Input {
                path: "<stdin>".to_string(),
                source,
            }),
            TargetSource::BuiltIn => Ok(subdata::get_default_sub_next_data()
                .into_iter()
                .map(String::from)
                .collect()),
        }
    }
}

/// 统一为小写、去掉末尾的点
fn normalize(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

fn dedup(names: &[String]) -> Vec<String> {
    names.iter().map(|n| normalize(n)).filter(|n| !n.is_empty()).unique().collect()
}

/// 生成要查询的完整域名
#[derive(Debug, Clone)]
pub enum FeedMode {
    /// 每一项已经是完整域名
    Verify,
    /// 字典词 × 主域名
    Generate { domains: Vec<String> },
}

pub struct TargetFeed {
    words: Vec<String>,
    mode: FeedMode,
    dns: Vec<Ipv4Addr>,
    state: Arc<RunState>,
}

impl TargetFeed {
    /// 字典词和主域名先规范化再去重，重复的输入只查询一次
    pub fn new(words: Vec<String>, mode: FeedMode, dns: Vec<Ipv4Addr>, state: Arc<RunState>) -> Self {
        let words = dedup(&words);
        let mode = match mode {
            FeedMode::Verify => FeedMode::Verify,
            FeedMode::Generate { domains } => FeedMode::Generate {
                domains: dedup(&domains),
            },
        };
        TargetFeed {
            words,
            mode,
            dns,
            state,
        }
    }

    /// 按投递顺序产生的域名
    pub fn targets(&self) -> Box<dyn Iterator<Item = String> + Send + '_> {
        match &self.mode {
            FeedMode::Verify => Box::new(self.words.iter().cloned()),
            FeedMode::Generate { domains } => Box::new(
                self.words
                    .iter()
                    .cartesian_product(domains.iter())
                    .map(|(word, domain)| format!("{}.{}", word, domain)),
            ),
        }
    }

    /// 预计的目标总数
    pub fn total(&self) -> usize {
        match &self.mode {
            FeedMode::Verify => self.words.len(),
            FeedMode::Generate { domains } => self.words.len() * domains.len(),
        }
    }

    /// 把所有目标投递到发送队列，返回投递数量
    ///
    /// 队列满时等待发送端消费，结束后标记目标已投递完毕。
    pub async fn run(self, work: mpsc::Sender<QueryRecord>) -> usize {
        let mut fed = 0;
        for domain in self.targets() {
            if !self.state.is_running() {
                break;
            }
            let record = QueryRecord::new(domain, chose_dns(&self.dns));
            self.state.track_fresh();
            if work.send(record).await.is_err() {
                self.state.settle_fresh();
                break;
            }
            fed += 1;
        }
        self.state.mark_feed_done();
        log::debug!("目标投递完成，共 {} 个", fed);
        fed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use std::io::{Cursor, Write};

    fn dns() -> Vec<Ipv4Addr> {
        vec![Ipv4Addr::new(8, 8, 8, 8)]
    }

    #[test]
    fn lines_are_trimmed_and_blank_skipped() {
        let input = Cursor::new("www\n\n  mail  \r\n\t\napi\n");
        assert_eq!(read_lines(input).unwrap(), vec!["www", "mail", "api"]);
    }

    #[test]
    fn file_source_reads_wordlist() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "a\n\n b \nc").unwrap();
        let words = TargetSource::File(file.path().to_path_buf()).load().unwrap();
        assert_eq!(words, vec!["a", "b", "c"]);

        let missing = TargetSource::File(PathBuf::from("/nonexistent/words.txt")).load();
        assert!(matches!(missing, Err(SetupError::Input { .. })));
    }

    #[test]
    fn generate_mode_is_cartesian() {
        let state = RunState::new(Ledger::new(8, None).unwrap());
        let feed = TargetFeed::new(
            vec!["www".into(), "mail".into()],
            FeedMode::Generate {
                domains: vec!["a.com".into(), "B.com.".into()],
            },
            dns(),
            state,
        );
        let targets: Vec<_> = feed.targets().collect();
        assert_eq!(targets, vec!["www.a.com", "www.b.com", "mail.a.com", "mail.b.com"]);
        assert_eq!(feed.total(), 4);
    }

    #[tokio::test]
    async fn duplicate_names_are_fed_once() {
        let state = RunState::new(Ledger::new(8, None).unwrap());
        let feed = TargetFeed::new(
            vec!["a.example.com".into(), "A.example.com.".into(), "b.example.com".into(), "a.example.com".into()],
            FeedMode::Verify,
            dns(),
            state.clone(),
        );
        assert_eq!(feed.total(), 2);
        let (tx, mut rx) = mpsc::channel(8);

        assert_eq!(feed.run(tx).await, 2);
        let mut fed = Vec::new();
        while let Some(record) = rx.recv().await {
            fed.push(record.domain);
        }
        assert_eq!(fed, vec!["a.example.com", "b.example.com"]);

        let generated = TargetFeed::new(
            vec!["www".into(), "WWW".into(), "mail".into()],
            FeedMode::Generate {
                domains: vec!["example.com".into(), "example.com.".into()],
            },
            dns(),
            state,
        );
        let targets: Vec<_> = generated.targets().collect();
        assert_eq!(targets, vec!["www.example.com", "mail.example.com"]);
        assert_eq!(generated.total(), 2);
    }

    #[tokio::test]
    async fn empty_source_finishes_immediately() {
        let state = RunState::new(Ledger::new(8, None).unwrap());
        let feed = TargetFeed::new(Vec::new(), FeedMode::Verify, dns(), state.clone());
        let (tx, mut rx) = mpsc::channel(4);

        assert_eq!(feed.run(tx).await, 0);
        assert!(rx.recv().await.is_none());
        assert!(state.feed_done());
        assert!(state.should_drain());
    }

    #[tokio::test]
    async fn records_are_fresh_and_tracked() {
        let state = RunState::new(Ledger::new(8, None).unwrap());
        let feed = TargetFeed::new(vec!["X.example.com".into()], FeedMode::Verify, dns(), state.clone());
        let (tx, mut rx) = mpsc::channel(4);

        assert_eq!(feed.run(tx).await, 1);
        let record = rx.recv().await.unwrap();
        assert_eq!(record.domain, "x.example.com");
        assert!(record.is_fresh());
        assert_eq!(state.queued_fresh(), 1);
        assert!(!state.should_drain());
    }
}
